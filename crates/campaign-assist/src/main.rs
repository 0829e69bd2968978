use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter};

use campaign_assist::config::{default_config_path, load_config};
use campaign_assist::db::default_database_path;
use campaign_assist::{
    resolve_credential, AnalysisWorkflow, AssistError, AssistEvent, CampaignStore, Config,
    ConfigError, Database, DatabaseError, DraftTarget, FormSnapshot, HttpAnalysisService,
    JobReport, JobStatus, NewCampaign, PollerConfig, SqliteCampaignStore,
};

#[derive(Parser, Debug)]
#[command(name = "campaign-assist")]
#[command(about = "Analyze campaign landing pages and fill in campaign drafts")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.campaign-assist/config.json)
    #[arg(short, long, global = true, env = "CAMPAIGN_ASSIST_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a page for analysis and reconcile the result into a draft
    Analyze {
        url: String,

        /// Existing campaign to update instead of creating a new draft
        #[arg(long)]
        campaign: Option<String>,

        /// Name for a new campaign draft
        #[arg(long, default_value = "")]
        name: String,
    },
    /// Print a stored campaign draft as JSON
    Show { id: String },
    /// Mark drafts whose job was abandoned by an earlier run as failed
    Sweep {
        #[arg(long, default_value_t = 900)]
        max_age_secs: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    let installed = if json {
        tracing::subscriber::set_global_default(registry.with(fmt::layer().json()))
    } else {
        tracing::subscriber::set_global_default(registry.with(fmt::layer()))
    };
    if let Err(e) = installed {
        eprintln!("Failed to install log subscriber: {}", e);
    }
    // Library code logs through the `log` facade.
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("Failed to bridge log records: {}", e);
    }
}

async fn run(cli: Cli) -> Result<ExitCode, AssistError> {
    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = load_config(&config_path)?;
    info!("Loaded config from {}", config_path.display());

    let store = Arc::new(open_store(&config)?);
    let workflow = Arc::new(build_workflow(&config, Arc::clone(&store))?);

    match cli.command {
        Command::Analyze {
            url,
            campaign,
            name,
        } => analyze(workflow, store, url, campaign, name).await,
        Command::Show { id } => {
            let draft = store
                .get(&id)
                .await?
                .ok_or(DatabaseError::NotFound(id))?;
            println!("{}", serde_json::to_string_pretty(&draft)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Sweep { max_age_secs } => {
            let cleared = workflow
                .clear_stale_jobs(Duration::from_secs(max_age_secs))
                .await?;
            println!("Cleared {} stale draft(s)", cleared);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn open_store(config: &Config) -> Result<SqliteCampaignStore, AssistError> {
    let path = match &config.database.path {
        Some(path) => path.clone(),
        None => default_database_path().ok_or(ConfigError::NoConfigPath)?,
    };
    info!("Using database {}", path.display());
    Ok(SqliteCampaignStore::new(Database::open(&path)?))
}

fn build_workflow(
    config: &Config,
    store: Arc<SqliteCampaignStore>,
) -> Result<AnalysisWorkflow, AssistError> {
    let credential = resolve_credential(&config.service)?;
    let service = HttpAnalysisService::new(&config.service, Some(credential))
        .map_err(AssistError::ServiceClient)?;

    Ok(AnalysisWorkflow::new(
        Arc::new(service),
        store,
        PollerConfig::from(&config.polling),
        Default::default(),
    ))
}

async fn analyze(
    workflow: Arc<AnalysisWorkflow>,
    store: Arc<SqliteCampaignStore>,
    url: String,
    campaign: Option<String>,
    name: String,
) -> Result<ExitCode, AssistError> {
    let (target, snapshot) = match campaign {
        Some(id) => {
            let draft = store
                .get(&id)
                .await?
                .ok_or_else(|| DatabaseError::NotFound(id.clone()))?;
            (DraftTarget::Existing(id), FormSnapshot::from(&draft))
        }
        None => (
            DraftTarget::New(NewCampaign::new(name, url.clone())),
            FormSnapshot::default(),
        ),
    };
    let (_form, form_rx) = watch::channel(snapshot);

    let interrupt = Arc::clone(&workflow);
    if let Err(e) = ctrlc::set_handler(move || interrupt.shutdown()) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }

    let mut events = workflow.events().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                AssistEvent::Notice { kind, message, .. } => warn!("{}: {}", kind, message),
                AssistEvent::Completed { suggested_tags, .. } if !suggested_tags.is_empty() => {
                    info!("Suggested tags: {}", suggested_tags.join(", "))
                }
                _ => {}
            }
        }
    });

    let handle = workflow.start(&url, target, form_rx).await?;
    info!(
        "Job {} started for campaign {}",
        handle.job_id(),
        handle.campaign_id()
    );

    let mut progress = handle.progress();
    tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let current = progress.borrow_and_update().clone();
            info!(
                "{} {}",
                current.state,
                current.progress_message.as_deref().unwrap_or("")
            );
        }
    });

    let campaign_id = handle.campaign_id().to_string();
    let report = handle.wait().await?;

    let code = match &report {
        JobReport::Reconciled(ack) if ack.status == JobStatus::Completed => ExitCode::SUCCESS,
        JobReport::Cancelled { .. } => ExitCode::from(130),
        _ => ExitCode::FAILURE,
    };

    if let Some(draft) = store.get(&campaign_id).await? {
        println!("{}", serde_json::to_string_pretty(&draft)?);
    }
    Ok(code)
}

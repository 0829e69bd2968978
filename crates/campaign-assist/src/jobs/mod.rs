//! The analysis job lifecycle: submit, poll, reconcile.

pub mod poller;
pub mod reconciler;
pub mod state;
pub mod submitter;
pub mod workflow;

pub use poller::{
    FailureCause, JobPoller, PollOutcome, PollProgress, PollerConfig, TerminalOutcome,
};
pub use reconciler::{merge_field, merged_update, FormSnapshot, ReconcileAck, ReconciliationWriter};
pub use state::{IllegalTransition, PollEvent, PollState};
pub use submitter::{DraftTarget, JobSubmitter, SubmittedJob};
pub use workflow::{AnalysisHandle, AnalysisWorkflow, JobReport};

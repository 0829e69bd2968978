//! Campaign repository: raw row access for the `campaigns` table.

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Row};

use super::{Database, DatabaseError};

/// A raw campaign row from the database.
#[derive(Debug, Clone)]
pub struct CampaignRow {
    pub id: String,
    pub name: String,
    pub url: String,
    /// JSON array of strings.
    pub tags: String,
    pub description: String,
    pub product_description: String,
    pub target_audience: String,
    pub job_id: Option<String>,
    pub job_status: Option<String>,
    pub job_submitted_at: Option<String>,
    pub job_completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl CampaignRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            url: row.get("url")?,
            tags: row.get("tags")?,
            description: row.get("description")?,
            product_description: row.get("product_description")?,
            target_audience: row.get("target_audience")?,
            job_id: row.get("job_id")?,
            job_status: row.get("job_status")?,
            job_submitted_at: row.get("job_submitted_at")?,
            job_completed_at: row.get("job_completed_at")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Columns a partial update may touch. `id` and `created_at` are never updated.
pub const UPDATABLE_COLUMNS: &[&str] = &[
    "name",
    "url",
    "tags",
    "description",
    "product_description",
    "target_audience",
    "job_id",
    "job_status",
    "job_submitted_at",
    "job_completed_at",
];

/// Inserts a new campaign row.
pub fn insert(db: &Database, row: &CampaignRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO campaigns (id, name, url, tags, description, product_description,
             target_audience, job_id, job_status, job_submitted_at, job_completed_at,
             created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                row.id,
                row.name,
                row.url,
                row.tags,
                row.description,
                row.product_description,
                row.target_audience,
                row.job_id,
                row.job_status,
                row.job_submitted_at,
                row.job_completed_at,
                row.created_at,
                row.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a campaign by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<CampaignRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM campaigns WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], CampaignRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Campaigns with a job in flight (non-null `job_id`), oldest submission first.
pub fn find_in_flight(db: &Database) -> Result<Vec<CampaignRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM campaigns WHERE job_id IS NOT NULL ORDER BY job_submitted_at ASC",
        )?;
        let rows = stmt
            .query_map([], CampaignRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Updates only the given columns of one campaign, plus `updated_at`.
///
/// When `expected_job_id` is set, the row is only touched while its `job_id`
/// still equals it. Returns the number of rows changed (0 or 1).
pub fn update_columns(
    db: &Database,
    id: &str,
    expected_job_id: Option<&str>,
    columns: &[(&'static str, Value)],
    updated_at: &str,
) -> Result<usize, DatabaseError> {
    if let Some((name, _)) = columns
        .iter()
        .find(|(name, _)| !UPDATABLE_COLUMNS.contains(name))
    {
        return Err(DatabaseError::InvalidColumn(name.to_string()));
    }

    db.with_conn(|conn| {
        let mut assignments = Vec::with_capacity(columns.len() + 1);
        let mut values: Vec<Value> = Vec::with_capacity(columns.len() + 3);

        for (name, value) in columns {
            values.push(value.clone());
            assignments.push(format!("{} = ?{}", name, values.len()));
        }
        values.push(Value::Text(updated_at.to_string()));
        assignments.push(format!("updated_at = ?{}", values.len()));

        values.push(Value::Text(id.to_string()));
        let mut sql = format!(
            "UPDATE campaigns SET {} WHERE id = ?{}",
            assignments.join(", "),
            values.len()
        );
        if let Some(job_id) = expected_job_id {
            values.push(Value::Text(job_id.to_string()));
            sql.push_str(&format!(" AND job_id = ?{}", values.len()));
        }

        let changed = conn.execute(&sql, params_from_iter(values.iter()))?;
        Ok(changed)
    })
}

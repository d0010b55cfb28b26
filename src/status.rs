//! Status Reader (C8): read-only progress and result assembly for a job ID.
//! Every read is scoped by `site_id` so one tenant can never observe
//! another's job.

use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use crate::db::jobs::{self, JobStatus};
use crate::db::pool::Pool;
use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub completed: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_html: Option<HashMap<String, String>>,
}

/// Fetch the status of `job_id`, verifying it belongs to `site_id`.
/// `completed_html` is a best-effort concatenation of translated fragments in
/// document order per locale, falling back to source text for any fragment
/// that never got a translation; full HTML reconstruction is out of scope.
pub async fn read_status(pool: &Pool, site_id: Uuid, job_id: Uuid) -> Result<StatusReport> {
    let job = jobs::read_job(pool, site_id, job_id).await?;
    let status = job.status_enum()?;

    let progress = match status {
        JobStatus::Processing | JobStatus::Completed => {
            let (completed, total) = jobs::count_translated(pool, job_id).await?;
            Some(Progress { completed, total })
        }
        JobStatus::Pending | JobStatus::Failed => None,
    };

    let completed_html = if status == JobStatus::Completed {
        Some(assemble_completed_html(pool, job_id).await?)
    } else {
        None
    };

    Ok(StatusReport { status, progress, completed_html })
}

async fn assemble_completed_html(pool: &Pool, job_id: Uuid) -> Result<HashMap<String, String>> {
    let units = jobs::read_units(pool, job_id).await?;

    let mut by_target: HashMap<String, Vec<&jobs::WorkUnit>> = HashMap::new();
    for unit in &units {
        by_target.entry(unit.target_lang.clone()).or_default().push(unit);
    }

    let mut out = HashMap::new();
    for (target_lang, group) in by_target {
        let joined = group
            .iter()
            .map(|u| u.translated_text.as_deref().unwrap_or(&u.source_text))
            .collect::<Vec<_>>()
            .join(" ");
        out.insert(target_lang, joined);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    // `read_status`'s tenant-ownership check and progress/completed_html
    // assembly are exercised against a real Postgres instance under
    // `tests/status_test.rs` alongside the worker and intake flows they
    // depend on.
}

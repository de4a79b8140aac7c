use tracing::{info, warn};

use crate::job::JobError;
use crate::store::Store;

pub const RESTART_REASON: &str = "server restarted during processing";

/// Fails every job left `pending`, `preparing` or `training` by a previous
/// process. Must run before the orchestrator accepts submissions.
pub fn recover_interrupted(store: &dyn Store) -> Result<Vec<String>, JobError> {
    let mut recovered = Vec::new();
    for mut job in store.list_jobs()? {
        if job.status.is_terminal() {
            continue;
        }
        let previous = job.status;
        job.fail("Interrupted", RESTART_REASON)?;
        store.save_job(&job)?;
        warn!(job_id = %job.id, from = %previous, "job interrupted by restart marked failed");
        recovered.push(job.id);
    }
    if !recovered.is_empty() {
        info!(count = recovered.len(), "recovery pass finished");
    }
    Ok(recovered)
}

use serde_json::json;
use tiny_http::Request;

use ferrite_trainer::job::{JobSpec, JobStatus};
use ferrite_trainer::Error;

use crate::handlers::page_request;
use crate::routes::{json_response, read_json, HandlerResult};
use crate::state::AppState;
use crate::util::auth::bearer_identity;
use crate::util::query::{parse_query, query_get};

// ---------------------------------------------------------------------------
// POST /training/jobs
// ---------------------------------------------------------------------------

pub fn submit(request: &mut Request, state: &AppState) -> HandlerResult {
    let identity = bearer_identity(request)
        .ok_or_else(|| Error::Unauthorized("job submission requires an Authorization: Bearer identity".into()))?;
    let spec: JobSpec = read_json(request)?;
    let job = state.services.orchestrator.submit(spec, &identity)?;
    Ok(json_response(201, &json!({ "job": job })))
}

// ---------------------------------------------------------------------------
// GET /training/jobs?page&limit&status
// ---------------------------------------------------------------------------

pub fn list(query: &str, state: &AppState) -> HandlerResult {
    let pairs = parse_query(query);
    let page = page_request(&pairs)?;
    let status = query_get(&pairs, "status")
        .map(|s| JobStatus::parse(s).ok_or_else(|| Error::Validation(format!("unknown job status {s:?}"))))
        .transpose()?;
    let jobs = state.services.orchestrator.list(status, page)?;
    Ok(json_response(200, &jobs))
}

pub fn get(id: &str, state: &AppState) -> HandlerResult {
    let job = state.services.orchestrator.get(id)?;
    Ok(json_response(200, &json!({ "job": job })))
}

/// Acknowledges the request; a running job reaches `failed` at its next step.
pub fn cancel(id: &str, state: &AppState) -> HandlerResult {
    let job = state.services.orchestrator.cancel(id)?;
    Ok(json_response(202, &json!({ "job": job })))
}

pub fn delete(id: &str, state: &AppState) -> HandlerResult {
    state.services.orchestrator.delete(id)?;
    Ok(json_response(200, &json!({ "deleted": id })))
}

use serde::Deserialize;
use serde_json::json;
use tiny_http::Request;

use ferrite_trainer::dataset::ImagingKind;

use crate::handlers::page_request;
use crate::routes::{json_response, read_json, HandlerResult};
use crate::state::AppState;
use crate::util::query::parse_query;

#[derive(Deserialize)]
struct RegisterBody {
    id: String,
    name: String,
    #[serde(default)]
    kind: Option<ImagingKind>,
}

/// POST /datasets: scans `<base>/datasets/<id>` and stores the record.
pub fn register(request: &mut Request, state: &AppState) -> HandlerResult {
    let body: RegisterBody = read_json(request)?;
    let dataset =
        state.services.register_dataset(&body.id, &body.name, body.kind.unwrap_or(ImagingKind::Other))?;
    Ok(json_response(201, &json!({ "dataset": dataset })))
}

pub fn list(query: &str, state: &AppState) -> HandlerResult {
    let page = page_request(&parse_query(query))?;
    let datasets = state.services.datasets(page)?;
    Ok(json_response(200, &datasets))
}

pub fn get(id: &str, state: &AppState) -> HandlerResult {
    let dataset = state.services.dataset(id)?;
    Ok(json_response(200, &json!({ "dataset": dataset })))
}

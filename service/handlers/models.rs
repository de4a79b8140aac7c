use serde::Deserialize;
use serde_json::json;
use tiny_http::Request;

use ferrite_trainer::registry::{ModelQuery, ModelStatus, ModelType};
use ferrite_trainer::Error;

use crate::handlers::page_request;
use crate::routes::{header_value, json_response, read_body, read_json, HandlerResult};
use crate::state::AppState;
use crate::util::multipart::{extract_boundary, file_parts};
use crate::util::query::{parse_query, query_get};

#[derive(Deserialize)]
struct StatusBody {
    status: String,
}

// ---------------------------------------------------------------------------
// GET /models?type&status&search&page&limit
// ---------------------------------------------------------------------------

pub fn list(query: &str, state: &AppState) -> HandlerResult {
    let pairs = parse_query(query);
    let model_type = query_get(&pairs, "type")
        .map(|t| ModelType::parse(t).ok_or_else(|| Error::Validation(format!("unknown model type {t:?}"))))
        .transpose()?;
    let status = query_get(&pairs, "status")
        .map(|s| ModelStatus::parse(s).ok_or_else(|| Error::Validation(format!("unknown model status {s:?}"))))
        .transpose()?;
    let query = ModelQuery {
        model_type,
        status,
        search: query_get(&pairs, "search").map(str::to_owned),
        page: page_request(&pairs)?,
    };
    let models = state.services.registry.list(&query)?;
    Ok(json_response(200, &models))
}

pub fn get(id: &str, state: &AppState) -> HandlerResult {
    let model = state.services.registry.get(id)?;
    Ok(json_response(200, &json!({ "model": model })))
}

// ---------------------------------------------------------------------------
// PATCH /models/:id/status   {"status": "active"}
// ---------------------------------------------------------------------------

pub fn set_status(request: &mut Request, id: &str, state: &AppState) -> HandlerResult {
    let body: StatusBody = read_json(request)?;
    let status = ModelStatus::parse(&body.status)
        .ok_or_else(|| Error::Validation(format!("unknown model status {:?}", body.status)))?;
    let model = state.services.set_model_status(id, status)?;
    Ok(json_response(200, &json!({ "model": model })))
}

pub fn sync(state: &AppState) -> HandlerResult {
    let report = state.services.registry.sync()?;
    Ok(json_response(200, &json!({ "report": report })))
}

// ---------------------------------------------------------------------------
// POST /models/:id/test   multipart/form-data, one or more image parts
// ---------------------------------------------------------------------------

pub fn test(request: &mut Request, id: &str, state: &AppState) -> HandlerResult {
    let content_type = header_value(request, "Content-Type").unwrap_or_default();
    if !content_type.starts_with("multipart/form-data") {
        return Err(Error::Validation("expected a multipart/form-data upload".into()));
    }
    let boundary = extract_boundary(&content_type)
        .ok_or_else(|| Error::Validation("multipart upload without a boundary".into()))?;
    let body = read_body(request)?;
    let mut images = file_parts(&body, &boundary);

    match images.len() {
        0 => Err(Error::Validation("no image file was uploaded".into())),
        1 => {
            let image = images.remove(0);
            let prediction = state.services.inference.predict(id, &image)?;
            Ok(json_response(200, &json!({ "prediction": prediction })))
        }
        _ => {
            let batch = state.services.inference.batch_predict(id, &images)?;
            Ok(json_response(200, &json!({ "batch": batch })))
        }
    }
}

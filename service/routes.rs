use std::io::{Cursor, Read};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tiny_http::{Header, Method, Request, Response, StatusCode};
use tracing::{debug, error, warn};

use ferrite_trainer::Error;

use crate::handlers;
use crate::state::SharedState;
use crate::util::query::url_decode;

pub type HttpResponse = Response<Cursor<Vec<u8>>>;
pub type HandlerResult = Result<HttpResponse, Error>;

const MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

pub fn json_response<T: Serialize>(status: u16, body: &T) -> HttpResponse {
    match serde_json::to_vec(body) {
        Ok(bytes) => raw_json(status, bytes),
        Err(e) => {
            error!(error = %e, "cannot serialize response");
            raw_json(500, br#"{"error":{"kind":"Internal","message":"internal error"}}"#.to_vec())
        }
    }
}

fn raw_json(status: u16, bytes: Vec<u8>) -> HttpResponse {
    let len = bytes.len();
    let headers = Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]).into_iter().collect();
    Response::new(StatusCode(status), headers, Cursor::new(bytes), Some(len), None)
}

/// HTTP status for a stable error kind.
pub fn status_for(kind: &str) -> u16 {
    match kind {
        "ValidationError" | "DatasetNotReady" | "DecodeError" => 400,
        "Unauthorized" => 401,
        "Conflict" | "ModelAlreadyRegistered" => 409,
        k if k == "NotFound" || k.ends_with("NotFound") => 404,
        _ => 500,
    }
}

/// `{"error":{"kind","message"}}`. Internal failures are logged and reported
/// with a generic message.
pub fn error_response(err: &Error) -> HttpResponse {
    let kind = err.kind();
    let message = if err.is_internal() {
        error!(kind, error = %err, "request failed");
        "internal error".to_owned()
    } else {
        err.to_string()
    };
    json_response(status_for(kind), &json!({ "error": { "kind": kind, "message": message } }))
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub fn header_value(request: &Request, name: &'static str) -> Option<String> {
    request.headers().iter().find(|h| h.field.equiv(name)).map(|h| h.value.as_str().to_owned())
}

pub fn read_body(request: &mut Request) -> Result<Vec<u8>, Error> {
    let mut body = Vec::new();
    request
        .as_reader()
        .take(MAX_BODY_BYTES + 1)
        .read_to_end(&mut body)
        .map_err(|e| Error::Validation(format!("cannot read request body: {e}")))?;
    if body.len() as u64 > MAX_BODY_BYTES {
        return Err(Error::Validation(format!("request body exceeds {MAX_BODY_BYTES} bytes")));
    }
    Ok(body)
}

pub fn read_json<T: DeserializeOwned>(request: &mut Request) -> Result<T, Error> {
    let body = read_body(request)?;
    serde_json::from_slice(&body).map_err(|e| Error::Validation(format!("invalid JSON body: {e}")))
}

// ---------------------------------------------------------------------------
// Request dispatcher
// ---------------------------------------------------------------------------

/// Routes one request and writes the response. Runs on its own thread.
pub fn dispatch(mut request: Request, state: SharedState) {
    let method = request.method().clone();
    let url = request.url().to_owned();

    let (path, query) = match url.split_once('?') {
        Some((p, q)) => (p.to_owned(), q.to_owned()),
        None => (url.clone(), String::new()),
    };
    let decoded: Vec<String> = path.split('/').filter(|s| !s.is_empty()).map(url_decode).collect();
    let segments: Vec<&str> = decoded.iter().map(String::as_str).collect();

    let result = match (&method, segments.as_slice()) {
        (Method::Get, ["health"]) => Ok(health(&state)),

        // ── Training jobs ────────────────────────────────────────────────
        (Method::Post, ["training", "jobs"]) => handlers::jobs::submit(&mut request, &state),
        (Method::Get, ["training", "jobs"]) => handlers::jobs::list(&query, &state),
        (Method::Get, ["training", "jobs", id]) => handlers::jobs::get(id, &state),
        (Method::Patch, ["training", "jobs", id, "cancel"]) => handlers::jobs::cancel(id, &state),
        (Method::Delete, ["training", "jobs", id]) => handlers::jobs::delete(id, &state),

        // ── Model registry ───────────────────────────────────────────────
        (Method::Get, ["models"]) => handlers::models::list(&query, &state),
        (Method::Post, ["models", "sync"]) => handlers::models::sync(&state),
        (Method::Get, ["models", id]) => handlers::models::get(id, &state),
        (Method::Patch, ["models", id, "status"]) => handlers::models::set_status(&mut request, id, &state),
        (Method::Post, ["models", id, "test"]) => handlers::models::test(&mut request, id, &state),

        // ── Datasets ─────────────────────────────────────────────────────
        (Method::Post, ["datasets"]) => handlers::datasets::register(&mut request, &state),
        (Method::Get, ["datasets"]) => handlers::datasets::list(&query, &state),
        (Method::Get, ["datasets", id]) => handlers::datasets::get(id, &state),

        _ => Err(Error::NotFound(format!("no route for {method} {path}"))),
    };

    let response = match result {
        Ok(response) => {
            debug!(%method, %path, "request handled");
            response
        }
        Err(e) => {
            debug!(%method, %path, kind = e.kind(), "request rejected");
            error_response(&e)
        }
    };
    if let Err(e) = request.respond(response) {
        warn!(%method, %path, error = %e, "cannot write response");
    }
}

fn health(state: &SharedState) -> HttpResponse {
    json_response(
        200,
        &json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "uptimeSecs": state.started_at.elapsed().as_secs(),
            "activeJobs": state.services.orchestrator.active_jobs(),
            "cachedModels": state.services.inference.cached_models(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::status_for;

    #[test]
    fn kinds_map_to_http_statuses() {
        assert_eq!(status_for("ValidationError"), 400);
        assert_eq!(status_for("DatasetNotReady"), 400);
        assert_eq!(status_for("Unauthorized"), 401);
        assert_eq!(status_for("JobNotFound"), 404);
        assert_eq!(status_for("DatasetNotFound"), 404);
        assert_eq!(status_for("NotFound"), 404);
        assert_eq!(status_for("ModelAlreadyRegistered"), 409);
        assert_eq!(status_for("StoreWriteError"), 500);
        assert_eq!(status_for("Internal"), 500);
    }
}

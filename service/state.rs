use std::sync::Arc;
use std::time::Instant;

use ferrite_trainer::Services;

/// Process-wide state handed to every request thread.
pub struct AppState {
    pub services: Services,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(services: Services) -> AppState {
        AppState { services, started_at: Instant::now() }
    }
}

pub type SharedState = Arc<AppState>;

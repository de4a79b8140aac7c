/// ferrite-trainer service
///
/// JSON API over the training job orchestrator, the model registry and the
/// inference runtime. Served by a synchronous tiny_http server.
///
/// Run with:
///   cargo run --release -- --base-dir data
///
/// Routes:
///   /training/jobs   submit, list, inspect, cancel, delete training jobs
///   /models          catalog queries, status changes, sync, test predictions
///   /datasets        register and list datasets found under <base>/datasets
///   /health          liveness
mod handlers;
mod routes;
mod state;
mod util;

use std::process;
use std::sync::Arc;

use clap::Parser;
use tiny_http::Server;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ferrite_trainer::{ServiceConfig, Services};
use state::AppState;

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ferrite_trainer=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServiceConfig::parse();
    let bind = config.bind;

    let services = match Services::open(config) {
        Ok(services) => services,
        Err(e) => {
            error!(error = %e, "cannot open the service store");
            process::exit(1);
        }
    };
    let server = match Server::http(bind) {
        Ok(server) => server,
        Err(e) => {
            error!(%bind, error = %e, "cannot bind HTTP server");
            process::exit(1);
        }
    };
    info!(%bind, base_dir = %services.config.base_dir.display(), "ferrite-trainer listening");

    let state = Arc::new(AppState::new(services));

    // One thread per request so a slow upload or prediction never blocks the
    // other clients.
    for request in server.incoming_requests() {
        let state = Arc::clone(&state);
        std::thread::spawn(move || routes::dispatch(request, state));
    }
}

pub mod math;
pub mod activation;
pub mod layers;
pub mod network;
pub mod loss;
pub mod optim;
pub mod train;

pub mod image;
pub mod dataset;
pub mod store;
pub mod page;
pub mod job;
pub mod registry;
pub mod inference;

pub mod app;
pub mod config;
pub mod error;

// Convenience re-exports
pub use math::Tensor;
pub use activation::ActivationFunction;
pub use network::{Architecture, Network};
pub use loss::CrossEntropyLoss;
pub use optim::Adam;
pub use train::train_loop;
pub use app::Services;
pub use config::ServiceConfig;
pub use error::{Error, Result};

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::Parser;

use crate::store::RetryPolicy;

/// Runtime configuration of the training service.
#[derive(Debug, Clone, Parser)]
#[command(name = "ferrite-trainer", version, about = "Training job orchestrator and model registry")]
pub struct ServiceConfig {
    /// Directory holding `datasets/`, `models/` and `store/`
    #[arg(long, env = "FERRITE_BASE_DIR", default_value = "data")]
    pub base_dir: PathBuf,

    /// Address the HTTP API listens on
    #[arg(long, env = "FERRITE_BIND", default_value = "127.0.0.1:7878")]
    pub bind: SocketAddr,

    /// Jobs allowed to train at the same time
    #[arg(long, env = "FERRITE_MAX_JOBS", default_value_t = 2)]
    pub max_concurrent_jobs: usize,

    /// Attempts per job status write before giving up
    #[arg(long, env = "FERRITE_STATUS_RETRIES", default_value_t = 3)]
    pub status_write_retries: u32,

    /// Serve random predictions instead of running stored models
    #[arg(long, env = "FERRITE_MOCK_INFERENCE", default_value_t = false)]
    pub mock_inference: bool,
}

impl ServiceConfig {
    /// Defaults for everything but the base directory.
    pub fn for_base_dir(base_dir: impl AsRef<Path>) -> ServiceConfig {
        ServiceConfig {
            base_dir: base_dir.as_ref().to_path_buf(),
            bind: SocketAddr::from(([127, 0, 0, 1], 7878)),
            max_concurrent_jobs: 2,
            status_write_retries: 3,
            mock_inference: false,
        }
    }

    pub fn datasets_dir(&self) -> PathBuf {
        self.base_dir.join("datasets")
    }

    pub fn models_dir(&self) -> PathBuf {
        self.base_dir.join("models")
    }

    pub fn store_dir(&self) -> PathBuf {
        self.base_dir.join("store")
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.status_write_retries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_match_for_base_dir() {
        let parsed = ServiceConfig::try_parse_from(["ferrite-trainer", "--base-dir", "/srv/ml"]).unwrap();
        let built = ServiceConfig::for_base_dir("/srv/ml");
        assert_eq!(parsed.bind, built.bind);
        assert_eq!(parsed.max_concurrent_jobs, 2);
        assert_eq!(parsed.status_write_retries, 3);
        assert!(!parsed.mock_inference);
        assert_eq!(parsed.models_dir(), PathBuf::from("/srv/ml/models"));
        assert_eq!(parsed.store_dir(), PathBuf::from("/srv/ml/store"));
    }

    #[test]
    fn flags_override_defaults() {
        let parsed = ServiceConfig::try_parse_from([
            "ferrite-trainer",
            "--max-concurrent-jobs",
            "4",
            "--mock-inference",
            "--bind",
            "0.0.0.0:9000",
        ])
        .unwrap();
        assert_eq!(parsed.max_concurrent_jobs, 4);
        assert!(parsed.mock_inference);
        assert_eq!(parsed.bind.port(), 9000);
        assert_eq!(parsed.retry_policy().attempts, 3);
    }
}

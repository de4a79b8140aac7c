use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::store::StoreError;

/// Bounded retry with linear backoff (`backoff × attempt`) for store writes.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy { attempts: 3, backoff: Duration::from_millis(50) }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32) -> RetryPolicy {
        RetryPolicy { attempts, ..RetryPolicy::default() }
    }

    /// Runs `op` until it succeeds or `attempts` tries have failed, returning
    /// the last error. At least one attempt is always made.
    pub fn run<T>(&self, what: &str, mut op: impl FnMut() -> Result<T, StoreError>) -> Result<T, StoreError> {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(v) => return Ok(v),
                Err(e) if attempt < attempts => {
                    warn!(what, attempt, error = %e, "store write failed, retrying");
                    thread::sleep(self.backoff * attempt);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

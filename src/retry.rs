use std::thread;
use std::time::Duration;

use log::warn;

use crate::error::{PoseError, TraceFailure};

/// Errors that may succeed when the same operation is repeated
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for PoseError {
    fn is_transient(&self) -> bool {
        PoseError::is_transient(self)
    }
}

impl Transient for TraceFailure {
    fn is_transient(&self) -> bool {
        self.error.is_transient()
    }
}

/// Bounded retry with growing backoff for transient I/O failures
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::new(0)
    }

    /// Delay before retry number `attempt` (1-based): base * 1.5^(attempt-1), capped.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1.5f64.powi(attempt.saturating_sub(1) as i32);
        let secs = self.base_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }

    /// Run `op`, repeating it while it fails transiently and retries remain.
    pub fn run<T, E, F>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        E: Transient + std::fmt::Display,
        F: FnMut() -> Result<T, E>,
    {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.delay(attempt);
                    warn!(
                        "{what} failed ({err}), retry {attempt}/{} in {:.2}s",
                        self.max_retries,
                        delay.as_secs_f64()
                    );
                    thread::sleep(delay);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

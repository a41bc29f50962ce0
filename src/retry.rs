use crate::error::{ErrorKind, Result};

use log::warn;
use rand::Rng;
use std::time::Duration;

/// Bounded retry of a single register operation.
///
/// Only errors whose [`ErrorKind`] satisfies the predicate are retried; any
/// other failure is returned straight away. Waits between attempts are drawn
/// uniformly from `[min_wait, max_wait]`.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_attempts: u32,
    min_wait: Duration,
    max_wait: Duration,
    retry_on: fn(ErrorKind) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            min_wait: Duration::from_millis(300),
            max_wait: Duration::from_millis(900),
            retry_on: ErrorKind::is_transient,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, min_wait: Duration, max_wait: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            min_wait: min_wait.min(max_wait),
            max_wait,
            ..Self::default()
        }
    }

    /// No waiting between attempts; tests use this.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    pub fn retry_on(mut self, predicate: fn(ErrorKind) -> bool) -> Self {
        self.retry_on = predicate;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn run<T, F>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut attempt = 1;
        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.max_attempts && (self.retry_on)(err.kind()) => {
                    let wait = self.wait();
                    warn!(
                        "attempt {}/{} failed: {}, retrying in {:?}",
                        attempt, self.max_attempts, err, wait
                    );
                    std::thread::sleep(wait);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn wait(&self) -> Duration {
        if self.max_wait <= self.min_wait {
            return self.min_wait;
        }
        rand::rng().random_range(self.min_wait..=self.max_wait)
    }
}

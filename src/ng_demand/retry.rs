// ng_demand - Natural gas demand index from api.weather.gov forecasts
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_DELAY_MILLIS: u64 = 1000;

/// Errors that may succeed if the same request is made again.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// How many times to attempt a call to an external service and how long to wait between attempts.
///
/// The default is a fixed delay. A `backoff` multiplier greater than 1 grows the delay after
/// each failed attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
            delay,
            backoff: 1.0,
        }
    }

    /// Make exactly one attempt.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn with_backoff(mut self, backoff: f64) -> Self {
        self.backoff = backoff.max(1.0);
        self
    }

    /// Delay before the attempt after `attempt` (1-based) fails.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let millis = self.delay.as_millis() as f64 * self.backoff.powi(exp);
        Duration::from_millis(millis.round() as u64)
    }

    /// Run `op` until it succeeds, returns an error that isn't transient, or runs out of attempts.
    /// The last error is returned when every attempt fails.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Transient + Display,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if attempt < self.max_attempts && e.is_transient() => {
                    let delay = self.delay_after(attempt);
                    tracing::debug!(
                        message = "retrying failed request",
                        operation = operation,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                    );

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, Duration::from_millis(DEFAULT_DELAY_MILLIS))
    }
}

#[cfg(test)]
mod tests {
    use super::{RetryPolicy, Transient};
    use std::cell::Cell;
    use std::fmt;
    use std::time::Duration;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Flaky,
        Fatal,
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl Transient for TestError {
        fn is_transient(&self) -> bool {
            matches!(self, Self::Flaky)
        }
    }

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_stops_at_max_attempts() {
        let calls = Cell::new(0);
        let res: Result<(), TestError> = fast(3)
            .run("test", || {
                calls.set(calls.get() + 1);
                async { Err(TestError::Flaky) }
            })
            .await;

        assert_eq!(Err(TestError::Flaky), res);
        assert_eq!(3, calls.get());
    }

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let calls = Cell::new(0);
        let res = fast(5)
            .run("test", || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Err(TestError::Flaky)
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(Ok(3), res);
        assert_eq!(3, calls.get());
    }

    #[tokio::test]
    async fn test_does_not_retry_fatal() {
        let calls = Cell::new(0);
        let res: Result<(), TestError> = fast(5)
            .run("test", || {
                calls.set(calls.get() + 1);
                async { Err(TestError::Fatal) }
            })
            .await;

        assert_eq!(Err(TestError::Fatal), res);
        assert_eq!(1, calls.get());
    }

    #[test]
    fn test_delay_after() {
        let fixed = RetryPolicy::new(3, Duration::from_millis(100));
        assert_eq!(Duration::from_millis(100), fixed.delay_after(1));
        assert_eq!(Duration::from_millis(100), fixed.delay_after(2));

        let backoff = fixed.with_backoff(2.0);
        assert_eq!(Duration::from_millis(100), backoff.delay_after(1));
        assert_eq!(Duration::from_millis(400), backoff.delay_after(3));
    }

    #[test]
    fn test_at_least_one_attempt() {
        assert_eq!(1, RetryPolicy::new(0, Duration::ZERO).max_attempts);
        assert_eq!(1, RetryPolicy::none().max_attempts);
    }
}

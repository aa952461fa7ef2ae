//! Fixed-interval polling for resources that take a while to come up.
//!
//! A freshly applied instance needs time to boot and start its server; a
//! probe simply asks again at a fixed interval until an attempt budget is
//! spent.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Attempt budget and spacing for a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl PollSchedule {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// 30 attempts, 5 seconds apart: enough for an EC2 instance to boot.
    pub fn instance_boot() -> Self {
        Self::new(30, Duration::from_secs(5))
    }
}

/// Every attempt failed.
#[derive(Debug)]
pub struct PollExhausted<E> {
    pub attempts: u32,
    /// Error from the final attempt, `None` if no attempt was made.
    pub last_error: Option<E>,
}

/// Call `attempt` until it succeeds or the schedule is spent.
///
/// The closure receives the 1-based attempt number. There is no sleep after
/// the final attempt.
pub async fn poll<F, Fut, T, E>(
    schedule: PollSchedule,
    mut attempt: F,
) -> Result<T, PollExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut last_error = None;

    for n in 1..=schedule.max_attempts {
        match attempt(n).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                debug!(
                    target: "infra_tests.probe",
                    attempt = n,
                    max_attempts = schedule.max_attempts,
                    error = %e,
                    "Attempt failed"
                );
                last_error = Some(e);
            }
        }

        if n < schedule.max_attempts {
            sleep(schedule.interval).await;
        }
    }

    Err(PollExhausted {
        attempts: schedule.max_attempts,
        last_error,
    })
}

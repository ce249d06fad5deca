//! Bounded polling for asynchronous external state
//!
//! Anything that waits for an external job or for eventual visibility goes
//! through [`poll_until`]: a capped number of checks, exponential backoff
//! between them, an explicit terminal predicate and an overall deadline.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Deadline for the whole poll, checks and sleeps included.
    pub timeout: Duration,
}

impl PollPolicy {
    /// Sleep before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<S> {
    /// The check returned a terminal state.
    Terminal { state: S, attempts: u32 },
    /// Every attempt returned a non-terminal state.
    Exhausted { last: S, attempts: u32 },
    /// The deadline passed first.
    TimedOut,
}

/// Check until `is_terminal` accepts the state, attempts run out or the
/// deadline passes. A check error aborts the poll immediately.
pub async fn poll_until<S, E, F, Fut, P>(
    policy: &PollPolicy,
    mut check: F,
    is_terminal: P,
) -> Result<PollOutcome<S>, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<S, E>>,
    P: Fn(&S) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);

    let polling = async {
        let mut attempt = 1;
        loop {
            let state = match check().await {
                Ok(state) => state,
                Err(e) => return Err(e),
            };
            if is_terminal(&state) {
                return Ok(PollOutcome::Terminal {
                    state,
                    attempts: attempt,
                });
            }
            if attempt >= max_attempts {
                return Ok(PollOutcome::Exhausted {
                    last: state,
                    attempts: attempt,
                });
            }
            let wait = policy.backoff(attempt);
            debug!(attempt, max_attempts, ?wait, "Poll state not terminal, backing off");
            tokio::time::sleep(wait).await;
            attempt += 1;
        }
    };

    match tokio::time::timeout(policy.timeout, polling).await {
        Ok(outcome) => outcome,
        Err(_) => Ok(PollOutcome::TimedOut),
    }
}

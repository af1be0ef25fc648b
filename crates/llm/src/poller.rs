use std::time::Duration;

use snafu::{ResultExt, Snafu};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::provider::{GenAiProvider, Operation, ProviderError};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_POLL_ATTEMPTS: u32 = 90;

/// Bounds for driving a long-running job to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Maximum number of status refreshes. `None` polls until the job is done.
    pub max_attempts: Option<u32>,
    /// Wall-clock budget measured from the start of polling.
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: Some(DEFAULT_MAX_POLL_ATTEMPTS),
            timeout: None,
        }
    }
}

impl PollPolicy {
    pub fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            max_attempts: None,
            timeout: None,
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum PollError {
    #[snafu(display("{source}"))]
    Refresh {
        stage: &'static str,
        operation: String,
        attempt: u32,
        source: ProviderError,
    },
    #[snafu(display("operation '{operation}' was still running after {attempts} status checks"))]
    AttemptsExhausted {
        stage: &'static str,
        operation: String,
        attempts: u32,
    },
    #[snafu(display("operation '{operation}' did not finish within {timeout:?}"))]
    TimedOut {
        stage: &'static str,
        operation: String,
        timeout: Duration,
    },
    #[snafu(display("polling of operation '{operation}' was cancelled"))]
    Cancelled {
        stage: &'static str,
        operation: String,
    },
}

pub type PollResult<T> = Result<T, PollError>;

/// Drives one operation from pending to done with strictly sequential refreshes.
pub struct OperationPoller<'a> {
    provider: &'a dyn GenAiProvider,
    policy: PollPolicy,
    cancel: CancellationToken,
}

impl<'a> OperationPoller<'a> {
    pub fn new(provider: &'a dyn GenAiProvider, policy: PollPolicy) -> Self {
        Self {
            provider,
            policy,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn run(&self, initial: Operation) -> PollResult<Operation> {
        let deadline = self.policy.timeout.map(|timeout| Instant::now() + timeout);
        let mut operation = initial;
        let mut attempts = 0_u32;

        while !operation.done {
            if let Some(max_attempts) = self.policy.max_attempts
                && attempts >= max_attempts
            {
                tracing::warn!(
                    operation = %operation.name,
                    attempts,
                    "giving up on operation after reaching the refresh limit"
                );
                return AttemptsExhaustedSnafu {
                    stage: "poll-attempt-limit",
                    operation: operation.name,
                    attempts,
                }
                .fail();
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return CancelledSnafu {
                        stage: "poll-wait",
                        operation: operation.name,
                    }
                    .fail();
                }
                _ = wait_for(deadline) => {
                    return self.timed_out("poll-wait", operation.name, attempts);
                }
                _ = tokio::time::sleep(self.policy.interval) => {}
            }

            attempts += 1;
            let operation_name = operation.name.clone();
            let refreshed = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return CancelledSnafu {
                        stage: "poll-refresh",
                        operation: operation_name,
                    }
                    .fail();
                }
                _ = wait_for(deadline) => {
                    return self.timed_out("poll-refresh", operation_name, attempts);
                }
                refreshed = self.provider.refresh_operation(&operation) => refreshed,
            };
            operation = refreshed.context(RefreshSnafu {
                stage: "poll-refresh",
                operation: operation_name,
                attempt: attempts,
            })?;

            tracing::debug!(
                operation = %operation.name,
                attempt = attempts,
                done = operation.done,
                "refreshed long-running operation"
            );
        }

        Ok(operation)
    }

    fn timed_out(&self, stage: &'static str, operation: String, attempts: u32) -> PollResult<Operation> {
        let timeout = self.policy.timeout.unwrap_or_default();
        tracing::warn!(
            operation = %operation,
            attempts,
            ?timeout,
            "operation exceeded its polling budget"
        );
        TimedOutSnafu {
            stage,
            operation,
            timeout,
        }
        .fail()
    }
}

/// Resolves at `deadline`, or never when there is none.
async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

//! Fixed-delay retries for single node calls.

use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use alloy::transports::TransportError;
use backon::{ConstantBuilder, Retryable};
use tokio::time::timeout;
use tracing::{Instrument, Span};

use crate::HistoryError;

/// Default delay between two attempts of the same call.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);
/// Default upper bound for a single attempt.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Why a single attempt did not produce a value.
#[derive(Debug)]
enum AttemptFailure {
    Rpc(TransportError),
    Empty,
    Timeout,
}

/// Per-invocation bookkeeping. Lives exactly as long as one [`RetryExecutor::execute`] call.
struct RetryContext {
    operation: &'static str,
    attempts_made: AtomicUsize,
    max_attempts: usize,
}

impl RetryContext {
    fn new(operation: &'static str, max_attempts: usize) -> Self {
        Self { operation, attempts_made: AtomicUsize::new(0), max_attempts }
    }

    fn begin_attempt(&self) -> usize {
        self.attempts_made.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn attempts_made(&self) -> usize {
        self.attempts_made.load(Ordering::SeqCst)
    }

    fn into_outcome<T>(self, result: Result<T, AttemptFailure>) -> Result<T, HistoryError> {
        result.map_err(|failure| match failure {
            AttemptFailure::Rpc(err) => HistoryError::from(err),
            AttemptFailure::Timeout => HistoryError::Timeout,
            AttemptFailure::Empty => {
                HistoryError::RetriesExhausted { attempts: self.attempts_made() }
            }
        })
    }
}

/// Runs a node call with a fixed attempt budget and a constant delay between attempts.
///
/// Both a transport error and an empty (`None`) answer count as a failed attempt. The call
/// returns on the first value, performs at most `max_attempts` invocations and surfaces
/// * the final transport error if the last attempt failed with one,
/// * [`HistoryError::Timeout`] if the last attempt timed out,
/// * [`HistoryError::RetriesExhausted`] if the last attempt came back empty.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    max_attempts: usize,
    delay: Duration,
    call_timeout: Duration,
    span: Span,
}

impl RetryExecutor {
    #[must_use]
    pub fn new(max_attempts: usize, span: Span) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay: DEFAULT_RETRY_DELAY,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            span,
        }
    }

    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Same settings with a different attempt budget.
    #[must_use]
    pub fn with_max_attempts(&self, max_attempts: usize) -> Self {
        Self { max_attempts: max_attempts.max(1), ..self.clone() }
    }

    #[must_use]
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Executes `call` until it yields a value or the attempt budget is spent.
    ///
    /// `operation` only labels log records.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &'static str,
        mut call: F,
    ) -> Result<T, HistoryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, TransportError>>,
    {
        let ctx = RetryContext::new(operation, self.max_attempts);
        let call_timeout = self.call_timeout;
        let strategy = ConstantBuilder::default()
            .with_delay(self.delay)
            .with_max_times(self.max_attempts - 1);

        let result = (|| {
            let operation = ctx.operation;
            let attempt = ctx.begin_attempt();
            let pending = call();
            async move {
                trace!(operation = operation, attempt = attempt, "Calling node");
                match timeout(call_timeout, pending).await {
                    Ok(Ok(Some(value))) => Ok(value),
                    Ok(Ok(None)) => Err(AttemptFailure::Empty),
                    Ok(Err(err)) => Err(AttemptFailure::Rpc(err)),
                    Err(_) => Err(AttemptFailure::Timeout),
                }
            }
        })
        .retry(strategy)
        .sleep(tokio::time::sleep)
        .notify(|failure: &AttemptFailure, delay: Duration| {
            let attempt = ctx.attempts_made();
            let max_attempts = ctx.max_attempts;
            match failure {
                AttemptFailure::Empty => warn!(
                    operation = ctx.operation,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis(),
                    "No results in node call, will retry"
                ),
                AttemptFailure::Rpc(err) => debug!(
                    operation = ctx.operation,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    error = %err,
                    "Problem interacting with node, will retry"
                ),
                AttemptFailure::Timeout => debug!(
                    operation = ctx.operation,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    "Node call timed out, will retry"
                ),
            }
        })
        .instrument(self.span.clone())
        .await;

        ctx.into_outcome(result)
    }
}

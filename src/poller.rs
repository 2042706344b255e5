//! Signature confirmation polling
//!
//! Polls the chain client at a fixed interval until the signature reaches the
//! required consistency level, fails on chain, or the timeout passes. Polling
//! is cancellable through a [`CancellationToken`]; cancellation only stops the
//! local wait, the transaction itself may still execute.

use solana_sdk::signature::Signature;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::chain::ChainClient;
use crate::types::ConsistencyLevel;

/// Terminal result of waiting for a signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmationResult {
    Confirmed,
    /// Executed with an error; `code` is the custom program error, if any
    FailedWithCode { code: Option<u32>, detail: String },
    /// Not confirmed in time; the transaction may still land later
    TimedOut,
}

pub struct ConfirmationPoller {
    chain: Arc<dyn ChainClient>,
    poll_interval: Duration,
    required_level: ConsistencyLevel,
}

impl ConfirmationPoller {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        poll_interval: Duration,
        required_level: ConsistencyLevel,
    ) -> Self {
        Self {
            chain,
            poll_interval,
            required_level,
        }
    }

    pub fn required_level(&self) -> ConsistencyLevel {
        self.required_level
    }

    /// Wait for `signature` to reach a terminal status
    ///
    /// Returns `None` when `cancel` fires first. Transient status-query errors
    /// are logged and polling continues until the deadline.
    pub async fn await_confirmation(
        &self,
        signature: &Signature,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Option<ConfirmationResult> {
        let deadline = Instant::now() + timeout;
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempts: u32 = 0;

        debug!(
            signature = %signature,
            timeout_ms = timeout.as_millis() as u64,
            required = %self.required_level,
            "Awaiting confirmation"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(signature = %signature, attempts, "Confirmation wait cancelled");
                    return None;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(signature = %signature, attempts, "Confirmation timed out");
                    return Some(ConfirmationResult::TimedOut);
                }
                _ = interval.tick() => {}
            }

            attempts += 1;

            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(signature = %signature, attempts, "Confirmation wait cancelled");
                    return None;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(signature = %signature, attempts, "Confirmation timed out");
                    return Some(ConfirmationResult::TimedOut);
                }
                status = self.chain.signature_status(signature) => status,
            };

            match status {
                Ok(Some(status)) => {
                    if let Some(err) = &status.err {
                        let code = status.program_error_code();
                        warn!(
                            signature = %signature,
                            attempts,
                            code = ?code,
                            error = %err,
                            "Transaction failed on chain"
                        );
                        return Some(ConfirmationResult::FailedWithCode {
                            code,
                            detail: err.to_string(),
                        });
                    }

                    if status.level >= self.required_level {
                        debug!(
                            signature = %signature,
                            attempts,
                            level = %status.level,
                            "Transaction confirmed"
                        );
                        return Some(ConfirmationResult::Confirmed);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    // keep polling, the endpoint may recover before the deadline
                    warn!(signature = %signature, attempts, error = %e, "Status query failed");
                }
            }
        }
    }
}

impl std::fmt::Debug for ConfirmationPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationPoller")
            .field("poll_interval", &self.poll_interval)
            .field("required_level", &self.required_level)
            .finish()
    }
}

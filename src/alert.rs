//! User-facing notices produced while minting

use serde::Serialize;
use std::time::Duration;

use crate::errors::MintError;
use crate::types::MintOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Success,
    Warning,
    Error,
}

/// Latest message for the alert banner
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertState {
    pub message: String,
    pub severity: AlertSeverity,
    /// `None` keeps the alert until it is replaced
    pub hide_after: Option<Duration>,
}

/// Caution alerts stay up long enough to be read
pub const LIKELY_FAILED_HIDE_AFTER: Duration = Duration::from_secs(8);

impl AlertState {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: AlertSeverity::Info,
            hide_after: None,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: AlertSeverity::Success,
            hide_after: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: AlertSeverity::Error,
            hide_after: None,
        }
    }

    pub fn hide_after(mut self, after: Duration) -> Self {
        self.hide_after = Some(after);
        self
    }

    /// Alert for an error, `None` for preconditions (rendered as a disabled control)
    pub fn from_error(err: &MintError) -> Option<Self> {
        if !err.is_alert() {
            return None;
        }
        let alert = match err {
            MintError::TransactionTimeout { .. } => Self {
                message: err.user_message(),
                severity: AlertSeverity::Warning,
                hide_after: None,
            },
            _ => Self::error(err.user_message()),
        };
        Some(alert)
    }

    pub fn from_outcome(outcome: &MintOutcome) -> Option<Self> {
        match outcome {
            MintOutcome::Success { .. } => Some(Self::success(outcome.user_message())),
            MintOutcome::LikelyFailedChargedFee { .. } => {
                Some(Self::error(outcome.user_message()).hide_after(LIKELY_FAILED_HIDE_AFTER))
            }
            MintOutcome::Failed(err) => Self::from_error(err),
        }
    }
}

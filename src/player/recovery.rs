//! Error classification and recovery policy
//!
//! Engine and sink failures are normalised into [`ErrorEvent`]s and mapped
//! to a [`RecoveryAction`] by [`decide`]. The function is pure apart from
//! the per-incident [`RecoveryBudget`] it updates, so every rule can be
//! exercised without a media engine.

use crate::engine::EngineErrorKind;
use crate::media::SinkErrorKind;
use crate::utils::config::RecoveryConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// User-visible message for an exhausted network retry budget
pub const NETWORK_FAILURE_MESSAGE: &str = "Network error: the stream could not be reached.";

/// User-visible message for an unrecoverable decode failure
pub const DECODE_FAILURE_MESSAGE: &str = "Playback error: the stream could not be decoded.";

/// User-visible message for unclassified fatal failures
pub const PLAYBACK_FAILURE_MESSAGE: &str = "Playback failed: this stream is not supported.";

/// Normalised error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Fetch failures; retried
    NetworkTransient,

    /// Decode failures; recovered once, then escalated
    MediaDecode,

    /// Unsupported or unclassified; aborts the session
    Fatal,
}

impl From<EngineErrorKind> for ErrorCategory {
    fn from(kind: EngineErrorKind) -> Self {
        match kind {
            EngineErrorKind::Network => ErrorCategory::NetworkTransient,
            EngineErrorKind::Media => ErrorCategory::MediaDecode,
            EngineErrorKind::Mux | EngineErrorKind::KeySystem | EngineErrorKind::Other => {
                ErrorCategory::Fatal
            }
        }
    }
}

impl From<SinkErrorKind> for ErrorCategory {
    fn from(kind: SinkErrorKind) -> Self {
        match kind {
            SinkErrorKind::Network => ErrorCategory::NetworkTransient,
            SinkErrorKind::Decode => ErrorCategory::MediaDecode,
            SinkErrorKind::Aborted | SinkErrorKind::SourceNotSupported => ErrorCategory::Fatal,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrorCategory::NetworkTransient => "network",
            ErrorCategory::MediaDecode => "media decode",
            ErrorCategory::Fatal => "fatal",
        };
        f.write_str(text)
    }
}

/// Normalised error signal from the engine or the sink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub category: ErrorCategory,

    /// Severity flag reported by the originating collaborator
    pub fatal: bool,

    /// Diagnostic text; only surfaced to the user on failure
    pub detail: String,
}

impl ErrorEvent {
    pub fn new(category: ErrorCategory, fatal: bool, detail: impl Into<String>) -> Self {
        Self {
            category,
            fatal,
            detail: detail.into(),
        }
    }

    pub fn network(fatal: bool, detail: impl Into<String>) -> Self {
        Self::new(ErrorCategory::NetworkTransient, fatal, detail)
    }

    pub fn decode(fatal: bool, detail: impl Into<String>) -> Self {
        Self::new(ErrorCategory::MediaDecode, fatal, detail)
    }

    pub fn fatal(detail: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Fatal, true, detail)
    }

    pub fn from_engine(kind: EngineErrorKind, fatal: bool, detail: impl Into<String>) -> Self {
        Self::new(kind.into(), fatal, detail)
    }

    /// Sink errors always stop the element, so they are fatal to playback
    pub fn from_sink(kind: SinkErrorKind) -> Self {
        Self::new(kind.into(), true, format!("media element reported {}", kind))
    }

    /// The same failure, escalated to the fatal tier
    pub fn escalated(&self) -> Self {
        Self {
            fatal: true,
            ..self.clone()
        }
    }
}

/// Why a session ended in `Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NetworkExhausted,
    Decode,
    Unsupported,
}

impl FailureKind {
    pub fn message(self) -> &'static str {
        match self {
            FailureKind::NetworkExhausted => NETWORK_FAILURE_MESSAGE,
            FailureKind::Decode => DECODE_FAILURE_MESSAGE,
            FailureKind::Unsupported => PLAYBACK_FAILURE_MESSAGE,
        }
    }

    /// Message shown to the user, with the diagnostic appended when present
    pub fn user_message(self, detail: &str) -> String {
        if detail.trim().is_empty() {
            self.message().to_string()
        } else {
            format!("{} ({})", self.message(), detail.trim())
        }
    }
}

/// What the controller should do about an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Nothing to do beyond logging
    Ignore,

    /// Ask the engine to resume loading after `delay`
    ResumeLoading { delay: Duration },

    /// Run the engine's decode recovery now, then settle after `settle_delay`
    RecoverDecode { settle_delay: Duration },

    /// Re-issue the load request after `delay`
    RetryLoad { delay: Duration, attempt: u32 },

    /// End the session
    Fail(FailureKind),
}

/// Per-incident retry bookkeeping
///
/// Both allowances are restored by a confirmed-progressing signal, so
/// budgets apply per incident rather than per session lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryBudget {
    pub network_retry_count: u32,
    pub decode_recovery_used: bool,
}

impl RecoveryBudget {
    /// Returns true when there was anything to reset
    pub fn reset(&mut self) -> bool {
        let dirty = self.network_retry_count > 0 || self.decode_recovery_used;
        *self = Self::default();
        dirty
    }
}

/// Map an error to an action, updating the budget
///
/// Rules, in precedence order:
/// 1. non-fatal network: count it and resume after a short delay (unbounded);
///    non-fatal decode: in-place decode recovery
/// 2. fatal network: bounded reload
/// 3. fatal decode: one engine recovery per incident, then fail
/// 4. fatal anything else: fail immediately
pub fn decide(event: &ErrorEvent, budget: &mut RecoveryBudget, config: &RecoveryConfig) -> RecoveryAction {
    match (event.fatal, event.category) {
        (false, ErrorCategory::NetworkTransient) => {
            budget.network_retry_count = budget.network_retry_count.saturating_add(1);
            RecoveryAction::ResumeLoading {
                delay: config.transient_resume_delay(),
            }
        }
        (false, ErrorCategory::MediaDecode) => RecoveryAction::RecoverDecode {
            settle_delay: config.decode_recovery_delay(),
        },
        (false, ErrorCategory::Fatal) => RecoveryAction::Ignore,
        (true, ErrorCategory::NetworkTransient) => {
            if budget.network_retry_count < config.max_network_retries {
                budget.network_retry_count += 1;
                RecoveryAction::RetryLoad {
                    delay: config.network_retry_delay(),
                    attempt: budget.network_retry_count,
                }
            } else {
                RecoveryAction::Fail(FailureKind::NetworkExhausted)
            }
        }
        (true, ErrorCategory::MediaDecode) => {
            if budget.decode_recovery_used {
                RecoveryAction::Fail(FailureKind::Decode)
            } else {
                budget.decode_recovery_used = true;
                RecoveryAction::RecoverDecode {
                    settle_delay: config.decode_recovery_delay(),
                }
            }
        }
        (true, ErrorCategory::Fatal) => RecoveryAction::Fail(FailureKind::Unsupported),
    }
}

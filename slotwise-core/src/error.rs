//! Error taxonomy shared by the scheduling and sync pipeline.
//!
//! Each variant carries a stable code (see [`codes`]) that is part of its
//! Display output and available through [`Error::code`].

use crate::allocator::ScheduleSummary;
use crate::sync_policy::SyncReport;

/// Stable error codes for programmatic handling.
pub mod codes {
    pub const VALIDATION: &str = "VALIDATION_ERROR";
    pub const QUOTA_EXCEEDED: &str = "QUOTA_EXCEEDED";
    pub const TRANSIENT_SYNC: &str = "TRANSIENT_SYNC_ERROR";
    pub const FATAL_SYNC: &str = "FATAL_SYNC_ERROR";
    pub const PERSISTENCE: &str = "PERSISTENCE_ERROR";
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed input, rejected before any scheduling work.
    #[error("[VALIDATION_ERROR] {0}")]
    Validation(String),

    /// Free-tier monthly cap reached.
    #[error("[QUOTA_EXCEEDED] {remaining} operations left this month, {requested} requested")]
    QuotaExceeded { requested: usize, remaining: u32 },

    /// A sync failure that stayed transient until retries ran out.
    #[error("[TRANSIENT_SYNC_ERROR] {0}")]
    TransientSync(String),

    /// A sync failure that is never retried.
    #[error("[FATAL_SYNC_ERROR] {0}")]
    FatalSync(String),

    /// Write-back to the task store failed. The computed schedule, or the
    /// report of the sync pass, is kept so the caller does not lose it.
    #[error("[PERSISTENCE_ERROR] {message}")]
    Persistence {
        message: String,
        summary: Option<Box<ScheduleSummary>>,
        report: Option<Box<SyncReport>>,
    },
}

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => codes::VALIDATION,
            Self::QuotaExceeded { .. } => codes::QUOTA_EXCEEDED,
            Self::TransientSync(_) => codes::TRANSIENT_SYNC,
            Self::FatalSync(_) => codes::FATAL_SYNC,
            Self::Persistence { .. } => codes::PERSISTENCE,
        }
    }

    /// Whether the whole request may be retried as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientSync(_) | Self::Persistence { .. })
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence {
            message: err.to_string(),
            summary: None,
            report: None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_code() {
        let e = Error::validation("user_id must be non-empty");
        assert_eq!(e.code(), "VALIDATION_ERROR");
        assert!(e.to_string().starts_with("[VALIDATION_ERROR]"));

        let q = Error::QuotaExceeded { requested: 5, remaining: 0 };
        assert_eq!(q.code(), codes::QUOTA_EXCEEDED);
        assert!(q.to_string().contains("5 requested"));
    }

    #[test]
    fn only_transient_and_persistence_are_retryable() {
        assert!(Error::TransientSync("timeout".into()).is_retryable());
        assert!(Error::persistence("disk full").is_retryable());
        assert!(!Error::FatalSync("Invalid signature".into()).is_retryable());
        assert!(!Error::validation("bad").is_retryable());
    }
}

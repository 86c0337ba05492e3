//! Error types used by the content service, its providers and transfers.
//!
//! This module defines three enums:
//!
//! - [`ServiceError`]: caller contract violations raised by the façade itself.
//! - [`ProviderError`]: errors raised by individual provider operations.
//! - [`TransferError`]: construction failures and terminal outcomes of an aggregate transfer.
//!
//! All of them provide `as_label` for logs/metrics. Only [`ServiceError`] ever
//! crosses the [`ContentService`](crate::ContentService) boundary; provider and
//! transfer faults are isolated and degrade the result instead.

use std::time::Duration;

use thiserror::Error;

use crate::provider::Operation;

/// # Errors produced by the content service façade.
///
/// These are programmer errors on the caller's side, e.g. asking for the
/// implementation advertisement before the service was initialized.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The operation requires a prior call to `init`.
    #[error("content service is not initialized")]
    NotInitialized,

    /// An argument violated the operation contract.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong with the argument.
        reason: String,
    },
}

impl ServiceError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use contentvisor::ServiceError;
    ///
    /// assert_eq!(ServiceError::NotInitialized.as_label(), "service_not_initialized");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ServiceError::NotInitialized => "service_not_initialized",
            ServiceError::InvalidArgument { .. } => "service_invalid_argument",
        }
    }
}

/// # Errors produced by provider operations.
///
/// Some are expected and silently tolerated by the aggregation layer
/// ([`ProviderError::Unsupported`]), others are logged and isolated to the
/// provider that raised them.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider does not implement this capability.
    #[error("operation {op:?} not supported")]
    Unsupported {
        /// The capability that was requested.
        op: Operation,
    },

    /// The provider refused the request up front (bad identifier, unknown share...).
    #[error("request rejected: {reason}")]
    Rejected {
        /// Why the provider refused.
        reason: String,
    },

    /// The operation started but failed.
    #[error("operation failed: {error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },

    /// The operation exceeded its configured time budget.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// The operation was cancelled before it completed.
    #[error("operation cancelled")]
    Canceled,

    /// The provider panicked while running the operation.
    #[error("provider panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },
}

impl ProviderError {
    /// Convenience constructor for [`ProviderError::Failed`].
    pub fn failed(error: impl Into<String>) -> Self {
        ProviderError::Failed {
            error: error.into(),
        }
    }

    /// Convenience constructor for [`ProviderError::Rejected`].
    pub fn rejected(reason: impl Into<String>) -> Self {
        ProviderError::Rejected {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use contentvisor::{Operation, ProviderError};
    ///
    /// let err = ProviderError::Unsupported { op: Operation::Share };
    /// assert_eq!(err.as_label(), "provider_unsupported");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ProviderError::Unsupported { .. } => "provider_unsupported",
            ProviderError::Rejected { .. } => "provider_rejected",
            ProviderError::Failed { .. } => "provider_failed",
            ProviderError::Timeout { .. } => "provider_timeout",
            ProviderError::Canceled => "provider_canceled",
            ProviderError::Panicked { .. } => "provider_panicked",
        }
    }

    /// True for the "capability missing" branch that aggregation treats as a no-op.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, ProviderError::Unsupported { .. })
    }
}

/// # Errors produced by aggregate transfers.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// No registered provider can retrieve content.
    #[error("no provider available for retrieval")]
    NoProviders,

    /// Every capable provider rejected the request synchronously.
    #[error("all providers rejected the request: {reasons:?}")]
    AllRejected {
        /// One entry per rejecting provider.
        reasons: Vec<String>,
    },

    /// Every child transfer failed.
    #[error("all provider transfers failed")]
    AllFailed,

    /// The transfer was cancelled before any child succeeded.
    #[error("transfer cancelled")]
    Canceled,
}

impl TransferError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TransferError::NoProviders => "transfer_no_providers",
            TransferError::AllRejected { .. } => "transfer_all_rejected",
            TransferError::AllFailed => "transfer_all_failed",
            TransferError::Canceled => "transfer_canceled",
        }
    }
}

/// Renders a `catch_unwind` payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

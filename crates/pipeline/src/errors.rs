//! Error and retry-policy types for the content pipeline domain.
//!
//! [`PipelineError`] covers conditions that stop a service call. Port-level
//! errors ([`ProviderError`], [`StoreError`], [`IngestError`]) are produced by
//! infrastructure adapters and classified here so the orchestrator can decide
//! how to react without knowing which adapter is plugged in.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{RunId, StageId, StageState};

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether a provider failure is worth one more attempt with the fallback model.
///
/// ## Rules
///
/// - `Retryable`: timeouts, transport failures, rate limiting, 5xx responses,
///   malformed or empty completions.
/// - `NonRetryable`: missing credentials and other 4xx responses. Another model
///   behind the same credentials would fail the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// A single attempt with the fallback model is allowed.
    Retryable,
    /// Go straight to the failure policy.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Port errors
// ---------------------------------------------------------------------------

/// Failure of a call to the completion provider.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProviderError {
    /// No API key is configured for the provider.
    #[error("No credentials configured for provider '{provider}'")]
    MissingCredentials {
        /// Provider name used in diagnostics.
        provider: String,
    },

    /// The request did not complete within the configured bound.
    #[error("Completion request timed out after {after:?}")]
    Timeout {
        /// The timeout that elapsed.
        after: Duration,
    },

    /// The request could not be sent or the response could not be read.
    #[error("Transport failure: {message}")]
    Transport {
        /// Underlying error text.
        message: String,
    },

    /// The provider answered with a non-2xx status.
    #[error("Provider returned HTTP {status}: {body}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The provider answered 2xx but the body held no usable completion.
    #[error("Malformed completion response: {message}")]
    Malformed {
        /// What was wrong with the body.
        message: String,
    },
}

impl ProviderError {
    /// Classifies this error for the fallback-model decision.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            ProviderError::MissingCredentials { .. } => RetryPolicy::NonRetryable,
            ProviderError::Http { status, .. } => match status {
                408 | 429 => RetryPolicy::Retryable,
                s if *s >= 500 => RetryPolicy::Retryable,
                _ => RetryPolicy::NonRetryable,
            },
            ProviderError::Timeout { .. }
            | ProviderError::Transport { .. }
            | ProviderError::Malformed { .. } => RetryPolicy::Retryable,
        }
    }
}

/// Failure of the persistence collaborator.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No run with this id exists for the tenant.
    #[error("Run {id} not found")]
    NotFound {
        /// The requested run.
        id: RunId,
    },

    /// The backing medium failed.
    #[error("Store I/O failure: {message}")]
    Io {
        /// Underlying error text.
        message: String,
    },

    /// A record could not be encoded or decoded.
    #[error("Store serialization failure: {message}")]
    Serialization {
        /// Underlying error text.
        message: String,
    },
}

/// Failure of the document-ingestion collaborator.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The webhook could not be reached.
    #[error("Ingestion transport failure: {message}")]
    Transport {
        /// Underlying error text.
        message: String,
    },

    /// The webhook answered with a non-2xx status.
    #[error("Ingestion webhook returned HTTP {status}")]
    Http {
        /// HTTP status code.
        status: u16,
    },

    /// The webhook answered 2xx with nothing usable.
    #[error("Ingestion webhook returned an empty analysis")]
    EmptyResponse,
}

// ---------------------------------------------------------------------------
// Domain errors
// ---------------------------------------------------------------------------

/// Invalid stage catalog or status value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CatalogError {
    /// A catalog must contain at least one stage.
    #[error("Stage catalog is empty")]
    Empty,

    /// A stage id appears more than once.
    #[error("Stage '{stage}' appears more than once in the catalog")]
    DuplicateStage {
        /// The repeated stage.
        stage: StageId,
    },

    /// A name that is not a stage id.
    #[error("Unknown stage '{name}'")]
    UnknownStage {
        /// The rejected name.
        name: String,
    },

    /// A status that does not map onto this catalog.
    #[error("Status '{status}' does not map to a stage in the catalog")]
    UnknownStatus {
        /// The rejected status.
        status: String,
    },
}

/// A touchpoint gate transition that the state machine does not allow.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Stage '{stage}' cannot {action} while {state}")]
pub struct GateError {
    /// Stage the transition was attempted on.
    pub stage: StageId,
    /// State the stage was in.
    pub state: StageState,
    /// Name of the attempted action.
    pub action: &'static str,
}

// ---------------------------------------------------------------------------
// Pipeline-level errors
// ---------------------------------------------------------------------------

/// Errors returned by pipeline service operations.
///
/// Persistence failures during a stage advance are *not* reported here; they
/// come back as notices so in-memory progress is never lost.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Another operation on the same run is still in flight.
    #[error("Run is busy with another operation")]
    Busy,

    /// The request was rejected before any network call.
    #[error("Validation failed: {message}")]
    Validation {
        /// Message suitable for showing inline.
        message: String,
    },

    /// The stage's state does not allow the requested action.
    #[error(transparent)]
    Gate(#[from] GateError),

    /// The catalog or a persisted status is inconsistent.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Strict failure policy: the completion call failed and the stage did not advance.
    #[error("Stage '{stage}' failed: {source}")]
    Provider {
        /// Stage whose call failed.
        stage: StageId,
        /// The provider failure.
        #[source]
        source: ProviderError,
    },

    /// Loading or listing runs failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Every stage has been approved; nothing is left to act on.
    #[error("Run is already completed")]
    RunCompleted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_classifies_http_statuses() {
        let http = |status| ProviderError::Http {
            status,
            body: String::new(),
        };
        assert_eq!(http(500).retry_policy(), RetryPolicy::Retryable);
        assert_eq!(http(429).retry_policy(), RetryPolicy::Retryable);
        assert_eq!(http(401).retry_policy(), RetryPolicy::NonRetryable);
        assert_eq!(
            ProviderError::MissingCredentials {
                provider: "openrouter".into()
            }
            .retry_policy(),
            RetryPolicy::NonRetryable
        );
        assert_eq!(
            ProviderError::Timeout {
                after: Duration::from_secs(45)
            }
            .retry_policy(),
            RetryPolicy::Retryable
        );
    }

    #[test]
    fn test_gate_error_message_names_stage_and_state() {
        let err = GateError {
            stage: StageId::Research,
            state: StageState::Pending,
            action: "approve",
        };
        assert_eq!(err.to_string(), "Stage 'research' cannot approve while pending");
    }
}

//! Error taxonomy for the computation boundary and the holdings store.

use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure of a gateway operation.
///
/// `Io`, `Encode` and `Spawn` are configuration-class: they will not go away
/// on retry. The rest describe what the external computation did.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("artifact I/O failed ({context}): {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode request payload: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Non-zero exit. `stderr` and `reported` are operator diagnostics only.
    #[error("external computation failed with exit code {}", display_code(.code))]
    Computation {
        code: Option<i32>,
        stderr: String,
        reported: Option<String>,
    },

    /// Zero exit, but stdout did not decode to the expected shape.
    #[error("external computation reported success but produced unusable output: {reason}")]
    MalformedSuccess { reason: String, stdout_len: usize },

    #[error("external computation timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("external computation cancelled")]
    Cancelled,

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "none (terminated by signal)".to_string(),
    }
}

impl GatewayError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        GatewayError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            GatewayError::Io { .. } | GatewayError::Encode(_) | GatewayError::Spawn { .. }
        )
    }

    /// Exit code of a failed computation, if any.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            GatewayError::Computation { code, .. } => *code,
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("holdings store I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("holdings store at {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

/// Failure of an upstream operation.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OrchestrationError {
    /// Message safe to show an end user. Never includes paths or stderr.
    pub fn user_message(&self) -> &'static str {
        match self {
            OrchestrationError::Gateway(GatewayError::InvalidRequest(_)) => {
                "The request was invalid."
            }
            OrchestrationError::Gateway(GatewayError::Timeout { .. }) => {
                "The computation took too long and was stopped. Please try again later."
            }
            OrchestrationError::Gateway(GatewayError::Cancelled) => "The request was cancelled.",
            _ => "The request could not be completed due to an internal error.",
        }
    }

    pub fn is_configuration(&self) -> bool {
        match self {
            OrchestrationError::Gateway(e) => e.is_configuration(),
            OrchestrationError::Store(_) => true,
        }
    }
}

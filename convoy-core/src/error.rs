// ABOUTME: Error taxonomy for remote service calls, the harness, and scenario state
// ABOUTME: ServiceError crosses the service boundary; HarnessError wraps it with actor/step context

use std::time::Duration;
use thiserror::Error;

/// Failures reported by a remote messaging service
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// Logon rejected
    #[error("authentication rejected: {0}")]
    Auth(String),

    /// Lookup returned nothing (not always fatal, see conversation helpers)
    #[error("not found: {0}")]
    NotFound(String),

    /// A posted item was not accepted
    #[error("send failed: {0}")]
    Send(String),

    /// Any other call accepted by the service that failed remotely
    #[error("remote error: {0}")]
    Remote(String),
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ServiceError::NotFound(_))
    }

    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Auth(_) => "auth",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Send(_) => "send",
            ServiceError::Remote(_) => "remote",
        }
    }
}

/// Failures of the orchestration harness itself
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("no actors configured")]
    NoActors,

    #[error("actor identity configured more than once: {0}")]
    DuplicateActor(String),

    #[error("logon failed for {identity}")]
    Logon {
        identity: String,
        #[source]
        source: ServiceError,
    },

    #[error("unknown actor: {0}")]
    UnknownActor(String),

    #[error("actor {0} is not logged on")]
    NotLoggedOn(String),

    #[error("step '{step}' failed")]
    Step {
        step: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("step '{step}' timed out after {after:?}")]
    StepTimeout { step: String, after: Duration },

    #[error("scenario pipeline already finished")]
    PipelineFinished,
}

impl HarnessError {
    /// Name of the step that broke the pipeline, if this is a step failure
    pub fn step_name(&self) -> Option<&str> {
        match self {
            HarnessError::Step { step, .. } | HarnessError::StepTimeout { step, .. } => Some(step),
            _ => None,
        }
    }
}

/// Misuse of the append-only scenario state
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state key '{0}' is already set")]
    KeyExists(String),

    #[error("state key '{0}' is not set")]
    Missing(String),

    #[error("value for state key '{key}' could not be encoded")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("state key '{key}' holds an incompatible value")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

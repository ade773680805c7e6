use std::fmt;

use crate::host::Phase;

/// Why the external module failed to become ready.
///
/// Cloned once per waiter: every caller coalesced onto the same attempt
/// observes the same outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// The script element reported an error, or could not be inserted.
    #[error("failed to load module script `{src}`: {reason}")]
    Script { src: String, reason: String },
    /// The completion callback was dropped without ever firing.
    #[error("module load was abandoned before it settled")]
    Abandoned,
}

impl LoadError {
    pub fn script(src: &str, reason: impl fmt::Display) -> Self {
        Self::Script {
            src: src.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// All errors produced by the shim.
#[derive(Debug, thiserror::Error)]
pub enum ShimError {
    /// No drawing-surface element with this id exists (or it is not a canvas).
    #[error("surface element `#{id}` is not available")]
    SurfaceUnavailable { id: String },

    #[error(transparent)]
    ModuleLoad(#[from] LoadError),

    /// A lifecycle call that the current phase does not allow.
    #[error("cannot {action} a surface host that is {phase}")]
    InvalidTransition { phase: Phase, action: &'static str },

    /// A host API call failed (listener registration, DOM access, ...).
    #[error("host environment error: {0}")]
    Environment(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ShimError>;

/// Shorthand constructors.
impl ShimError {
    pub fn surface_unavailable(id: &str) -> Self {
        Self::SurfaceUnavailable { id: id.to_string() }
    }

    pub fn environment(msg: impl fmt::Display) -> Self {
        Self::Environment(msg.to_string())
    }

    pub fn config(msg: impl fmt::Display) -> Self {
        Self::Config(msg.to_string())
    }

    /// True when the error came from the external module rather than the host.
    pub fn is_load_failure(&self) -> bool {
        matches!(self, Self::ModuleLoad(_))
    }
}

//! Runtime error types.

use crate::hmr::HmrStatus;

/// Failure while evaluating a module.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("module '{0}' is not defined")]
    NotDefined(String),

    #[error("module '{module}' failed to compile: {message}")]
    Compile { module: String, message: String },

    #[error("module '{module}' threw: {message}")]
    Thrown { module: String, message: String },
}

impl EvalError {
    /// Error raised from inside a module factory.
    pub fn thrown(module: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Thrown {
            module: module.into(),
            message: message.into(),
        }
    }
}

/// Failure fetching chunks or updates.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("chunk '{0}' not found")]
    ChunkNotFound(String),

    #[error("no update available for generation {0}")]
    NoUpdate(u64),

    #[error("transport failed: {0}")]
    Failed(String),
}

/// Failure of a dynamic import.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("no chunk provides module '{0}'")]
    UnknownModule(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// Failure of a hot update. Every variant except [`HmrError::Busy`] and
/// [`HmrError::Transport`] leaves the runtime in [`HmrStatus::Failed`],
/// which requires a full reload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HmrError {
    #[error("no module accepts the update of '{module}'")]
    NoAcceptBoundary { module: String },

    #[error("'{by}' declines updates of '{module}'")]
    Declined { module: String, by: String },

    #[error("re-evaluating '{module}' failed: {source}")]
    Evaluation {
        module: String,
        #[source]
        source: EvalError,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("hot update not possible while {status}")]
    Busy { status: HmrStatus },

    #[error("full reload required: {reason}")]
    ReloadRequired { reason: String },
}

impl HmrError {
    /// Whether this error moved the runtime to the terminal failed state.
    pub fn requires_reload(&self) -> bool {
        !matches!(self, Self::Busy { .. } | Self::Transport(_))
    }
}

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("data error: {0}")]
    Data(String),

    #[error("indicator error: {0}")]
    Indicator(String),

    #[error("detection error: {0}")]
    Detection(String),

    #[error("evaluation error: {0}")]
    Evaluation(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("cancellation requested")]
    Cancelled,

    #[error("instrument timed out after {0:?}")]
    Timeout(Duration),

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn data(msg: impl Into<String>) -> Self {
        EngineError::Data(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        EngineError::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        EngineError::Internal(msg.into())
    }

    /// Fatal errors abort the run; everything else becomes a Rejection.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Config(_) | EngineError::Internal(_))
    }
}

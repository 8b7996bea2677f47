use thiserror::Error;

/// Errors surfaced by the agent and its persistence layer.
///
/// Training underflow (fewer stored transitions than one batch) is not an
/// error; `Agent::train` documents it as a no-op.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("configured width {expected} does not match model width {got}")]
    ConfigMismatch { expected: usize, got: usize },

    #[error("malformed model bundle: {0}")]
    Deserialize(String),

    #[error("model storage failed: {0}")]
    Storage(#[from] std::io::Error),
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DialogueError {
    #[error("intent pipeline unavailable: {0}")]
    Intent(#[from] intent_parser::IntentError),
    #[error("invalid dialogue config: {0}")]
    InvalidConfig(String),
    #[error("failed to start dialogue worker: {0}")]
    Worker(String),
}

pub type Result<T, E = DialogueError> = std::result::Result<T, E>;

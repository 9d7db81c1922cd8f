use thiserror::Error;

#[derive(Debug, Error)]
pub enum IntentError {
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
    #[error("pattern compilation failed: {0}")]
    Pattern(#[from] regex::Error),
}

pub type Result<T, E = IntentError> = std::result::Result<T, E>;

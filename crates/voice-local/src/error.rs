use thiserror::Error;

pub type Result<T, E = VoiceError> = core::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("backend not available: {0}")]
    BackendUnavailable(String),
    #[error("transcription failed: {0}")]
    Transcription(String),
    #[error("audio device error: {0}")]
    Device(String),
    #[error("segment source error: {0}")]
    Source(String),
    #[error("operation cancelled")]
    Cancelled,
}

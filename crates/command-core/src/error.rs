use crate::Command;
use thiserror::Error;

pub type Result<T, E = DispatchError> = core::result::Result<T, E>;

/// Failures surfaced to the caller as `CoreResponse { kind: Error, .. }`.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("commande inconnue : {0}")]
    UnknownCommand(String),
    #[error("session inconnue : {0}")]
    UnknownSession(String),
    #[error("la commande {0} nécessite une session")]
    SessionRequired(Command),
    #[error("paramètre manquant pour {command} : {name}")]
    MissingParameter { command: Command, name: &'static str },
    #[error("échec de l'exécution : {0}")]
    Execution(String),
    #[error("metrics init error: {0}")]
    Metrics(String),
}

impl DispatchError {
    /// Short machine-readable label carried in `CoreResponse::status`.
    pub fn status(&self) -> &'static str {
        match self {
            DispatchError::UnknownCommand(_) => "unknown_command",
            DispatchError::UnknownSession(_) => "unknown_session",
            DispatchError::SessionRequired(_) => "session_required",
            DispatchError::MissingParameter { .. } => "missing_parameter",
            DispatchError::Execution(_) => "execution_failed",
            DispatchError::Metrics(_) => "internal",
        }
    }
}

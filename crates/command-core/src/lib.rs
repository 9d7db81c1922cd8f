//! command-core: the command dispatch protocol
//!
//! This crate owns the closed command vocabulary, the request/response
//! contract every front end speaks, session bookkeeping, the process-wide
//! shutdown signal and the executor that runs one command per request.

mod vocabulary;
pub use vocabulary::{Command, UnknownCommand, VOCABULARY_VERSION};

mod protocol;
pub use protocol::{CoreRequest, CoreResponse, DataMap, InterfaceKind, ResponseKind};

mod error;
pub use error::{DispatchError, Result};

mod shutdown;
pub use shutdown::ShutdownSignal;

mod session;
pub use session::{Session, SessionId, SessionRegistry};

mod metrics;
pub use metrics::DispatchMetrics;

mod handlers;

mod executor;
pub use executor::{
    ClusterSummary, ClusterView, CommandExecutor, Dispatcher, ExecutorConfig, OfflineResponder,
    PeerSummary, PromptResponder,
};

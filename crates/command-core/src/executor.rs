//! The central, session-agnostic command executor.

use crate::handlers;
use crate::{
    Command, CoreRequest, CoreResponse, DataMap, DispatchError, DispatchMetrics, InterfaceKind,
    Result, SessionId, SessionRegistry, ShutdownSignal,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Anything that turns a request into exactly one response.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, request: CoreRequest) -> CoreResponse;
}

/// General-purpose handling for free-form prompts (EXPLAIN, PROMPT).
pub trait PromptResponder: Send + Sync {
    fn respond(&self, prompt: &str, context: &DataMap) -> Result<String>;
}

/// Used when no language model is attached.
#[derive(Debug, Default)]
pub struct OfflineResponder;

impl PromptResponder for OfflineResponder {
    fn respond(&self, prompt: &str, _context: &DataMap) -> Result<String> {
        Ok(format!(
            "Je n'ai pas de modèle général pour traiter cela. Vous avez demandé : « {} ».",
            prompt.trim()
        ))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerSummary {
    pub instance_id: u32,
    pub role: String,
    pub healthy: bool,
    pub heartbeat_age_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub instance_id: u32,
    pub role: String,
    pub cluster_size: usize,
    pub healthy_peers: usize,
    pub unhealthy_peers: usize,
    pub peers: Vec<PeerSummary>,
}

/// Read-only view of the cooperating instances, when running clustered.
pub trait ClusterView: Send + Sync {
    fn summary(&self) -> ClusterSummary;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    pub assistant_name: String,
    pub version: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            assistant_name: "Assistant".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

type ShutdownHook = Box<dyn FnOnce() + Send>;
type Handler = fn(&CommandExecutor, &CoreRequest) -> Result<CoreResponse>;

/// Maps every tag to its handler. Exhaustive: a new variant does not compile
/// until it has a handler.
fn handler_for(command: Command) -> Handler {
    match command {
        Command::Help => handlers::help,
        Command::Status => handlers::status,
        Command::Time => handlers::time,
        Command::Date => handlers::date,
        Command::Version => handlers::version,
        Command::Capabilities => handlers::capabilities,
        Command::Echo => handlers::echo,
        Command::Analyze => handlers::analyze,
        Command::Explain => handlers::explain,
        Command::Prompt => handlers::prompt,
        Command::Quit => handlers::quit,
        Command::SessionInfo => handlers::session_info,
        Command::ClusterStatus => handlers::cluster_status,
    }
}

pub struct CommandExecutor {
    config: ExecutorConfig,
    sessions: SessionRegistry,
    shutdown: ShutdownSignal,
    responder: Box<dyn PromptResponder>,
    cluster: Option<Arc<dyn ClusterView>>,
    metrics: DispatchMetrics,
    started_at: Instant,
    shutdown_hooks: Mutex<Vec<ShutdownHook>>,
}

impl CommandExecutor {
    pub fn new(config: ExecutorConfig) -> Result<Self> {
        let metrics = DispatchMetrics::new().map_err(DispatchError::Metrics)?;
        Ok(Self {
            config,
            sessions: SessionRegistry::new(),
            shutdown: ShutdownSignal::new(),
            responder: Box::new(OfflineResponder),
            cluster: None,
            metrics,
            started_at: Instant::now(),
            shutdown_hooks: Mutex::new(Vec::new()),
        })
    }

    pub fn with_responder(mut self, responder: Box<dyn PromptResponder>) -> Self {
        self.responder = responder;
        self
    }

    pub fn with_cluster(mut self, cluster: Arc<dyn ClusterView>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// Share a signal created elsewhere (e.g. one a coordinator also watches).
    pub fn with_shutdown_signal(mut self, signal: ShutdownSignal) -> Self {
        self.shutdown = signal;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn metrics(&self) -> &DispatchMetrics {
        &self.metrics
    }

    pub fn cluster(&self) -> Option<&Arc<dyn ClusterView>> {
        self.cluster.as_ref()
    }

    pub fn responder(&self) -> &dyn PromptResponder {
        self.responder.as_ref()
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    pub fn create_session(&self, interface: InterfaceKind) -> SessionId {
        let id = self.sessions.create_session(interface);
        self.metrics.active_sessions.set(self.sessions.len() as i64);
        id
    }

    pub fn end_session(&self, id: &SessionId) -> bool {
        let ended = self.sessions.end_session(id);
        self.metrics.active_sessions.set(self.sessions.len() as i64);
        ended
    }

    /// End every open session, e.g. at teardown. Returns how many were open.
    pub fn end_all_sessions(&self) -> usize {
        let ended = self.sessions.end_all();
        self.metrics.active_sessions.set(0);
        if ended > 0 {
            tracing::info!(count = ended, "sessions ended");
        }
        ended
    }

    /// Register teardown work run once, by the first QUIT.
    pub fn on_shutdown(&self, hook: impl FnOnce() + Send + 'static) {
        self.shutdown_hooks.lock().push(Box::new(hook));
    }

    pub(crate) fn run_shutdown_hooks(&self) {
        let hooks = std::mem::take(&mut *self.shutdown_hooks.lock());
        tracing::debug!(count = hooks.len(), "running shutdown hooks");
        for hook in hooks {
            hook();
        }
    }

    pub fn execute(&self, request: CoreRequest) -> CoreResponse {
        let started = Instant::now();
        self.metrics.requests.inc();

        let response = match self.route(&request) {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(command = %request.command, interface = %request.interface, "dispatch error: {}", e);
                CoreResponse::error(e.status(), e.to_string())
            }
        };
        if response.is_error() {
            self.metrics.errors.inc();
        }
        tracing::debug!(
            command = %request.command,
            kind = ?response.kind,
            elapsed_us = started.elapsed().as_micros() as u64,
            "request executed"
        );
        response
    }

    fn route(&self, request: &CoreRequest) -> Result<CoreResponse> {
        let command: Command = request
            .command
            .parse()
            .map_err(|_| DispatchError::UnknownCommand(request.command.clone()))?;

        // QUIT is unconditional: no session or shutdown checks.
        if command != Command::Quit {
            if self.shutdown.is_triggered() {
                return Ok(CoreResponse::shutting_down());
            }
            match &request.session_id {
                Some(id) => {
                    if !self.sessions.touch(id) {
                        return Err(DispatchError::UnknownSession(id.to_string()));
                    }
                }
                None if command.requires_session() => {
                    return Err(DispatchError::SessionRequired(command));
                }
                None => {}
            }
        }

        handler_for(command)(self, request)
    }
}

impl Dispatcher for CommandExecutor {
    fn dispatch(&self, request: CoreRequest) -> CoreResponse {
        self.execute(request)
    }
}

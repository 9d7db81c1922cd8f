//! Front ends share one shape: raw input in, `CoreRequest` out; `CoreResponse`
//! in, native output out.

use crate::narration;
use command_core::{Command, CoreRequest, CoreResponse, InterfaceKind, ResponseKind, SessionId};
use intent_parser::{IntentPipeline, ResolveContext};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What a front end knows about the caller when translating input.
#[derive(Debug, Clone, Default)]
pub struct AdapterContext {
    pub session: Option<SessionId>,
    pub previous: Option<Command>,
}

impl AdapterContext {
    pub fn with_session(session: Option<SessionId>) -> Self {
        Self {
            session,
            previous: None,
        }
    }

    fn resolve_context(&self) -> ResolveContext {
        ResolveContext {
            previous: self.previous,
        }
    }
}

pub trait FrontendAdapter {
    type Output;

    fn interface(&self) -> InterfaceKind;

    /// Never fails: input that means nothing becomes a PROMPT request.
    fn translate_to_core(&self, input: &str, context: &AdapterContext) -> CoreRequest;

    fn translate_from_core(&self, response: &CoreResponse) -> Self::Output;
}

/// Terminal text front end. Lines starting with `/` are raw commands
/// (`/echo text=bonjour`); anything else goes through intent resolution.
pub struct CliAdapter {
    pipeline: Arc<IntentPipeline>,
}

impl CliAdapter {
    pub fn new(pipeline: Arc<IntentPipeline>) -> Self {
        Self { pipeline }
    }

    fn parse_raw(line: &str, context: &AdapterContext) -> CoreRequest {
        let mut words = line.split_whitespace();
        let tag = words.next().unwrap_or_default().to_uppercase();
        let mut request =
            CoreRequest::new(tag, InterfaceKind::Cli).with_session(context.session);

        let mut params: Vec<(String, String)> = Vec::new();
        for word in words {
            match word.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    params.push((key.to_string(), value.to_string()));
                }
                _ => match params.last_mut() {
                    Some((_, value)) => {
                        value.push(' ');
                        value.push_str(word);
                    }
                    None => params.push(("text".to_string(), word.to_string())),
                },
            }
        }
        for (key, value) in params {
            request = request.with_parameter(&key, value);
        }
        request.with_context("raw", line)
    }
}

impl FrontendAdapter for CliAdapter {
    type Output = String;

    fn interface(&self) -> InterfaceKind {
        InterfaceKind::Cli
    }

    fn translate_to_core(&self, input: &str, context: &AdapterContext) -> CoreRequest {
        let input = input.trim();
        if let Some(raw) = input.strip_prefix('/') {
            return Self::parse_raw(raw, context);
        }
        self.pipeline
            .resolve_with(input, &context.resolve_context())
            .to_request(InterfaceKind::Cli, context.session)
    }

    fn translate_from_core(&self, response: &CoreResponse) -> String {
        match response.kind {
            ResponseKind::Success | ResponseKind::Quit => response.message.clone(),
            ResponseKind::Error => format!("Erreur ({}) : {}", response.status, response.message),
        }
    }
}

/// What the speech front end does with a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpokenReply {
    pub text: String,
    pub should_vocalize: bool,
    /// The conversation is over; the front end should stop listening.
    pub terminal: bool,
}

/// Voice front end for already-transcribed text. Errors are narrated, never
/// read out raw.
pub struct SpeechAdapter {
    pipeline: Arc<IntentPipeline>,
}

impl SpeechAdapter {
    pub fn new(pipeline: Arc<IntentPipeline>) -> Self {
        Self { pipeline }
    }
}

impl FrontendAdapter for SpeechAdapter {
    type Output = SpokenReply;

    fn interface(&self) -> InterfaceKind {
        InterfaceKind::Sui
    }

    fn translate_to_core(&self, input: &str, context: &AdapterContext) -> CoreRequest {
        self.pipeline
            .resolve_with(input, &context.resolve_context())
            .to_request(InterfaceKind::Sui, context.session)
    }

    fn translate_from_core(&self, response: &CoreResponse) -> SpokenReply {
        let text = match response.kind {
            ResponseKind::Success if !response.message.trim().is_empty() => {
                response.message.trim().to_string()
            }
            ResponseKind::Success => "C'est fait.".to_string(),
            ResponseKind::Error | ResponseKind::Quit => {
                narration::narrate_error(response).to_string()
            }
        };
        SpokenReply {
            should_vocalize: !text.is_empty(),
            terminal: response.is_terminal(),
            text,
        }
    }
}

/// Programmatic front end speaking JSON. Input that is not a JSON request is
/// treated as text to resolve.
#[derive(Default)]
pub struct ApiAdapter {
    pipeline: Option<Arc<IntentPipeline>>,
}

impl ApiAdapter {
    pub fn new(pipeline: Arc<IntentPipeline>) -> Self {
        Self {
            pipeline: Some(pipeline),
        }
    }
}

impl FrontendAdapter for ApiAdapter {
    type Output = String;

    fn interface(&self) -> InterfaceKind {
        InterfaceKind::Api
    }

    fn translate_to_core(&self, input: &str, context: &AdapterContext) -> CoreRequest {
        match serde_json::from_str::<CoreRequest>(input) {
            Ok(mut request) => {
                request.interface = InterfaceKind::Api;
                if request.session_id.is_none() {
                    request.session_id = context.session;
                }
                request
            }
            Err(e) => {
                tracing::debug!("api input is not a request ({}), resolving as text", e);
                match &self.pipeline {
                    Some(pipeline) => pipeline
                        .resolve_with(input, &context.resolve_context())
                        .to_request(InterfaceKind::Api, context.session),
                    None => CoreRequest::new(Command::Prompt.tag(), InterfaceKind::Api)
                        .with_parameter("text", input)
                        .with_session(context.session),
                }
            }
        }
    }

    fn translate_from_core(&self, response: &CoreResponse) -> String {
        serde_json::to_string(response).unwrap_or_else(|e| {
            tracing::error!("failed to encode response: {}", e);
            r#"{"kind":"ERROR","status":"encoding_failed","message":"","data":{}}"#.to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use command_core::{CommandExecutor, ExecutorConfig};
    use intent_parser::PipelineConfig;
    use serde_json::Value;

    fn pipeline() -> Arc<IntentPipeline> {
        Arc::new(IntentPipeline::new(PipelineConfig::default()).unwrap())
    }

    fn executor() -> CommandExecutor {
        CommandExecutor::new(ExecutorConfig::default()).unwrap()
    }

    const NONSENSE: &[&str] = &[
        "zzxq wvvk",
        "?!?",
        "🙂🙂🙂",
        "/",
        "/frobnicate a=b",
        "{not json",
        "{\"command\":42}",
        "analyse",
        "explique",
        "ma session",
    ];

    fn round_trip<A: FrontendAdapter>(adapter: &A) -> Vec<A::Output> {
        let executor = executor();
        let ctx = AdapterContext::default();
        NONSENSE
            .iter()
            .map(|x| adapter.translate_from_core(&executor.execute(adapter.translate_to_core(x, &ctx))))
            .collect()
    }

    #[test]
    fn test_round_trip_never_fails() {
        let p = pipeline();
        let cli = round_trip(&CliAdapter::new(p.clone()));
        assert!(cli.iter().all(|s| !s.is_empty()));
        let spoken = round_trip(&SpeechAdapter::new(p.clone()));
        assert!(spoken.iter().all(|r| r.should_vocalize && !r.terminal));
        let api = round_trip(&ApiAdapter::new(p));
        for json in api {
            let v: Value = serde_json::from_str(&json).unwrap();
            assert!(v["kind"].is_string());
        }
    }

    #[test]
    fn test_nonsense_resolves_to_prompt() {
        let adapter = SpeechAdapter::new(pipeline());
        let req = adapter.translate_to_core("zzxq wvvk", &AdapterContext::default());
        assert_eq!(req.command, "PROMPT");
        assert_eq!(req.interface, InterfaceKind::Sui);
        assert_eq!(req.context["fallback_used"], Value::Bool(true));
    }

    #[test]
    fn test_polite_termination_is_vocalized_farewell() {
        let adapter = SpeechAdapter::new(pipeline());
        let executor = executor();
        let req = adapter.translate_to_core("C'est bon merci", &AdapterContext::default());
        assert_eq!(req.command, "QUIT");
        let response = executor.execute(req);
        assert!(response.is_success());
        assert_eq!(response.data["quit"], Value::Bool(true));
        let reply = adapter.translate_from_core(&response);
        assert!(reply.should_vocalize);
        assert!(reply.terminal);
        assert!(!reply.text.is_empty());
    }

    #[test]
    fn test_speech_errors_are_narrated() {
        let adapter = SpeechAdapter::new(pipeline());
        let reply = adapter.translate_from_core(&CoreResponse::error(
            "unknown_session",
            "session inconnue : 6f1c2a",
        ));
        assert!(!reply.text.contains("6f1c2a"));
        assert!(!reply.terminal);
    }

    #[test]
    fn test_cli_raw_command_syntax() {
        let adapter = CliAdapter::new(pipeline());
        let ctx = AdapterContext::default();
        let req = adapter.translate_to_core("/echo bonjour le monde", &ctx);
        assert_eq!(req.command, "ECHO");
        assert_eq!(req.parameter_str("text"), Some("bonjour le monde"));

        let req = adapter.translate_to_core("/analyze target=un deux trois", &ctx);
        assert_eq!(req.command, "ANALYZE");
        assert_eq!(req.parameter_str("target"), Some("un deux trois"));

        let out = adapter.translate_from_core(&executor().execute(
            adapter.translate_to_core("/nope", &ctx),
        ));
        assert!(out.starts_with("Erreur (unknown_command)"));
    }

    #[test]
    fn test_cli_resolves_free_text() {
        let adapter = CliAdapter::new(pipeline());
        let req = adapter.translate_to_core("quelle heure est-il", &AdapterContext::default());
        assert_eq!(req.command, "TIME");
        assert_eq!(req.interface, InterfaceKind::Cli);
        let out = adapter.translate_from_core(&executor().execute(req));
        assert!(out.starts_with("Il est "));
    }

    #[test]
    fn test_api_accepts_json_requests() {
        let adapter = ApiAdapter::new(pipeline());
        let executor = executor();
        let session = executor.create_session(InterfaceKind::Api);
        let ctx = AdapterContext::with_session(Some(session));
        let req = adapter.translate_to_core(r#"{"command":"SESSION_INFO","interface":"cli"}"#, &ctx);
        assert_eq!(req.interface, InterfaceKind::Api);
        assert_eq!(req.session_id, Some(session));

        let json = adapter.translate_from_core(&executor.execute(req));
        let v: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["kind"], "SUCCESS");
        assert_eq!(v["data"]["interface"], "api");
    }

    #[test]
    fn test_api_without_pipeline_forwards_prompt() {
        let adapter = ApiAdapter::default();
        let req = adapter.translate_to_core("bonjour", &AdapterContext::default());
        assert_eq!(req.command, "PROMPT");
        assert_eq!(req.parameter_str("text"), Some("bonjour"));
    }
}

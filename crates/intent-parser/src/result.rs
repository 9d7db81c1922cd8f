use command_core::{Command, CoreRequest, InterfaceKind, SessionId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Which stage of the cascade produced an intent.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    Termination,
    DirectMatch,
    Semantic,
    Pattern,
    Keyword,
    Fallback,
}

impl ResolutionMethod {
    /// Lower wins when two candidates score the same.
    pub fn priority(self) -> u8 {
        match self {
            ResolutionMethod::Termination => 0,
            ResolutionMethod::DirectMatch => 1,
            ResolutionMethod::Semantic => 2,
            ResolutionMethod::Pattern => 3,
            ResolutionMethod::Keyword => 4,
            ResolutionMethod::Fallback => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionMethod::Termination => "termination",
            ResolutionMethod::DirectMatch => "direct_match",
            ResolutionMethod::Semantic => "semantic",
            ResolutionMethod::Pattern => "pattern",
            ResolutionMethod::Keyword => "keyword",
            ResolutionMethod::Fallback => "fallback",
        }
    }
}

impl std::fmt::Display for ResolutionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stage's opinion about an utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub command: Command,
    pub confidence: f32,
    pub method: ResolutionMethod,
    pub parameters: HashMap<String, String>,
}

impl Candidate {
    pub fn new(command: Command, confidence: f32, method: ResolutionMethod) -> Self {
        Self {
            command,
            confidence: confidence.clamp(0.0, 1.0),
            method,
            parameters: HashMap::new(),
        }
    }

    pub fn with_parameter(mut self, key: &str, value: impl Into<String>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    /// Higher confidence wins; equal scores fall back to method priority.
    pub fn beats(&self, other: &Candidate) -> bool {
        if (self.confidence - other.confidence).abs() <= f32::EPSILON {
            self.method.priority() < other.method.priority()
        } else {
            self.confidence > other.confidence
        }
    }
}

/// Outcome of resolving one utterance. Built once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentResult {
    pub command: Command,
    pub confidence: f32,
    pub method: ResolutionMethod,
    pub parameters: HashMap<String, String>,
    pub processing_time: Duration,
    pub fallback_used: bool,
    /// Another command scored within the ambiguity margin of the winner.
    pub ambiguous: bool,
    /// The utterance as received.
    pub text: String,
}

impl IntentResult {
    pub(crate) fn from_candidate(
        text: &str,
        candidate: Candidate,
        processing_time: Duration,
        fallback_used: bool,
        ambiguous: bool,
    ) -> Self {
        Self {
            command: candidate.command,
            confidence: candidate.confidence,
            method: candidate.method,
            parameters: candidate.parameters,
            processing_time,
            fallback_used,
            ambiguous,
            text: text.to_string(),
        }
    }

    pub fn is_termination(&self) -> bool {
        self.command == Command::Quit
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    /// Build the request a front end submits for this intent. Intent
    /// metadata travels in the context map.
    pub fn to_request(&self, interface: InterfaceKind, session: Option<SessionId>) -> CoreRequest {
        let mut request = CoreRequest::new(self.command.tag(), interface).with_session(session);
        for (key, value) in &self.parameters {
            request = request.with_parameter(key, value.as_str());
        }
        request
            .with_context("utterance", self.text.as_str())
            .with_context("confidence", f64::from(self.confidence))
            .with_context("method", self.method.as_str())
            .with_context("fallback_used", self.fallback_used)
    }
}

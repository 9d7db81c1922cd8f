//! Detection of "I am done" utterances, including polite and indirect ones.
//!
//! Runs on normalized text and has absolute priority over every other stage:
//! a termination cue anywhere in the utterance wins, even when the rest of
//! the sentence asks for something else.

use crate::normalize::{edit_distance, normalize};
use crate::{Candidate, ResolutionMethod, Result};
use command_core::Command;
use regex::Regex;

/// Whole-utterance tokens on top of the vocabulary's QUIT triggers.
const EXTRA_TOKENS: &[&str] = &[
    "c est tout",
    "ca suffit",
    "fin",
    "termine",
    "fin de session",
    "fin de la conversation",
    "on arrete",
    "that s all",
];

const NEAR_MATCH_MIN_LEN: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct TerminationMatch {
    pub confidence: f32,
    /// Short label of the rule that fired, for logs.
    pub rule: &'static str,
}

pub struct TerminationDetector {
    tokens: Vec<String>,
    gratitude: Regex,
    closure: Regex,
    /// Asks the assistant itself to stop; enough on its own.
    stop_request: Regex,
    /// Bare stop verbs. They also stop other things ("arrête de répéter"),
    /// so they need gratitude or closure next to them.
    stop_verb: Regex,
    farewell: Regex,
}

impl TerminationDetector {
    pub fn new() -> Result<Self> {
        let mut tokens: Vec<String> = Command::Quit
            .triggers()
            .iter()
            .chain(EXTRA_TOKENS)
            .map(|t| normalize(t))
            .collect();
        tokens.dedup();

        Ok(Self {
            tokens,
            gratitude: Regex::new(
                r"\b(?:merci|thanks|thank you|je te remercie|je vous remercie)\b",
            )?,
            closure: Regex::new(
                r"\b(?:c est bon|c est tout|c est parfait|ca ira|ca suffit|ca sera tout|ce sera tout|on a fini|on a termine|j ai fini|j ai termine|j ai ce qu il me faut|that s all|that will be all|i m done)\b",
            )?,
            stop_request: Regex::new(
                r"\b(?:tu peux (?:t |te )?(?:arreter|taire|quitter|eteindre|partir)|vous pouvez (?:vous )?(?:arreter|taire|quitter)|arrete toi|eteins toi|tais toi|quitte|quitter|fin de (?:la )?(?:session|conversation)|you can stop|stop listening)\b",
            )?,
            stop_verb: Regex::new(r"\b(?:arrete|stop|termine)\b")?,
            farewell: Regex::new(
                r"\b(?:au revoir|bonne nuit|bonne soiree|bonne journee|a bientot|a plus tard|a la prochaine|goodbye|bye bye|see you)\b",
            )?,
        })
    }

    /// `normalized` must come from [`normalize`].
    pub fn detect(&self, normalized: &str) -> Option<TerminationMatch> {
        if normalized.is_empty() {
            return None;
        }
        if self.tokens.iter().any(|t| t == normalized) {
            return Some(hit(1.0, "token"));
        }
        if normalized.chars().count() >= NEAR_MATCH_MIN_LEN
            && self
                .tokens
                .iter()
                .filter(|t| t.chars().count() >= NEAR_MATCH_MIN_LEN)
                .any(|t| edit_distance(t, normalized) <= 1)
        {
            return Some(hit(0.9, "near_token"));
        }

        let words = normalized.split(' ').count();
        let gratitude = self.gratitude.is_match(normalized);
        let closure = self.closure.is_match(normalized);
        let stop_request = self.stop_request.is_match(normalized);
        let stop_verb = self.stop_verb.is_match(normalized);

        if gratitude && (closure || stop_request || stop_verb) {
            return Some(hit(0.95, "gratitude_with_cue"));
        }
        if stop_request {
            return Some(hit(0.9, "stop_request"));
        }
        if closure && stop_verb {
            return Some(hit(0.9, "closure_with_stop"));
        }
        if self.farewell.is_match(normalized) {
            return Some(hit(0.9, "farewell"));
        }
        if closure && words <= 4 {
            return Some(hit(0.85, "short_closure"));
        }
        if gratitude && words <= 3 {
            return Some(hit(0.8, "bare_thanks"));
        }
        None
    }

    pub(crate) fn candidate(&self, normalized: &str) -> Option<Candidate> {
        self.detect(normalized).map(|m| {
            tracing::debug!(rule = m.rule, confidence = m.confidence, "termination detected");
            Candidate::new(Command::Quit, m.confidence, ResolutionMethod::Termination)
        })
    }
}

fn hit(confidence: f32, rule: &'static str) -> TerminationMatch {
    TerminationMatch { confidence, rule }
}

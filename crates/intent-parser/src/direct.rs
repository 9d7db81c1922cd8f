use crate::normalize::{edit_distance, normalize};
use crate::{Candidate, ResolutionMethod};
use command_core::Command;

/// Politeness wrappers removed before whole-utterance comparison.
const PREFIXES: &[&str] = &[
    "est ce que tu peux me dire ",
    "peux tu me dire ",
    "tu peux me dire ",
    "dis moi ",
    "donne moi ",
];
const SUFFIXES: &[&str] = &[" s il te plait", " s il vous plait", " stp", " svp", " please"];

/// Utterances that replay the previous command.
const REPEAT: &[&str] = &["encore", "encore une fois", "again", "recommence"];

/// What the caller knows about the conversation so far.
#[derive(Debug, Clone, Default)]
pub struct ResolveContext {
    pub previous: Option<Command>,
}

/// Whole-utterance match against the vocabulary's trigger words.
pub struct DirectMatcher {
    entries: Vec<(Command, String)>,
    near_match_min_len: usize,
}

impl DirectMatcher {
    /// QUIT triggers are left to the termination detector.
    pub fn new(near_match_min_len: usize) -> Self {
        let entries = Command::ALL
            .into_iter()
            .filter(|c| *c != Command::Quit)
            .flat_map(|c| c.triggers().iter().map(move |t| (c, normalize(t))))
            .collect();
        Self {
            entries,
            near_match_min_len,
        }
    }

    fn strip_politeness(normalized: &str) -> &str {
        let mut text = normalized;
        for prefix in PREFIXES {
            if let Some(rest) = text.strip_prefix(prefix) {
                text = rest;
                break;
            }
        }
        for suffix in SUFFIXES {
            if let Some(rest) = text.strip_suffix(suffix) {
                text = rest;
                break;
            }
        }
        text
    }

    pub fn match_text(&self, normalized: &str, context: &ResolveContext) -> Option<Candidate> {
        let text = Self::strip_politeness(normalized);
        if text.is_empty() {
            return None;
        }

        if REPEAT.contains(&text) {
            return context
                .previous
                .filter(|c| !c.is_terminal())
                .map(|c| Candidate::new(c, 1.0, ResolutionMethod::DirectMatch));
        }

        if let Some((command, _)) = self.entries.iter().find(|(_, t)| t == text) {
            return Some(Candidate::new(*command, 1.0, ResolutionMethod::DirectMatch));
        }

        if text.chars().count() < self.near_match_min_len {
            return None;
        }
        let mut near = self
            .entries
            .iter()
            .filter(|(_, t)| t.chars().count() >= self.near_match_min_len)
            .filter(|(_, t)| edit_distance(t, text) <= 1)
            .map(|(c, _)| *c);
        let first = near.next()?;
        // Two different commands one typo away: not a direct match.
        if near.any(|c| c != first) {
            return None;
        }
        Some(Candidate::new(first, 1.0, ResolutionMethod::DirectMatch))
    }
}

//! Pluggable classification strategies.
//!
//! Each strategy scores the utterance independently and returns every
//! command it has an opinion about. The pipeline picks the winner.

use crate::normalize::{content_stems, is_stop_word};
use crate::{Candidate, ResolutionMethod, Result};
use command_core::Command;
use regex::Regex;

/// The utterance in both forms a strategy may need.
#[derive(Debug, Clone)]
pub struct UtteranceText {
    /// Trimmed input; parameters are extracted from here.
    pub raw: String,
    /// Folded matching form.
    pub normalized: String,
}

impl UtteranceText {
    pub fn new(raw: &str) -> Self {
        Self {
            raw: raw.trim().to_string(),
            normalized: crate::normalize(raw),
        }
    }

    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.normalized.split(' ').filter(|t| !t.is_empty())
    }
}

pub trait IntentStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Declares the tie-break priority of this strategy's candidates.
    fn method(&self) -> ResolutionMethod;

    /// Must not fail; an empty vector means "no opinion".
    fn try_resolve(&self, input: &UtteranceText) -> Vec<Candidate>;
}

/// Similarity against example phrasings, on stemmed content words.
pub struct SemanticStrategy {
    exemplars: Vec<(Command, Vec<String>)>,
}

/// Scores are scaled so that a perfect paraphrase stays below a direct match.
const SEMANTIC_CEILING: f32 = 0.95;

const EXEMPLARS: &[(Command, &[&str])] = &[
    (
        Command::Help,
        &[
            "quelles commandes connais tu",
            "comment je peux t utiliser",
            "montre moi les commandes disponibles",
            "which commands do you know",
        ],
    ),
    (
        Command::Status,
        &[
            "est ce que tout fonctionne correctement",
            "comment te portes tu",
            "donne moi ton etat",
            "are you working properly",
        ],
    ),
    (
        Command::Time,
        &[
            "donne moi l heure",
            "il est quelle heure maintenant",
            "tu as l heure",
            "tell me the time",
        ],
    ),
    (
        Command::Date,
        &[
            "quel jour sommes nous aujourd hui",
            "donne moi la date du jour",
            "what is today s date",
        ],
    ),
    (
        Command::Version,
        &["quelle est ta version", "tu tournes en quelle version"],
    ),
    (
        Command::Capabilities,
        &[
            "qu est ce que tu sais faire",
            "quelles sont tes capacites",
            "de quoi es tu capable",
        ],
    ),
    (Command::Echo, &["repete apres moi", "redis ce que je dis"]),
    (
        Command::Analyze,
        &["analyse ce texte", "fais une analyse de ce texte"],
    ),
    (
        Command::Explain,
        &["explique moi comment ca marche", "j aimerais une explication"],
    ),
    (
        Command::SessionInfo,
        &[
            "donne moi les informations de ma session",
            "depuis quand dure ma session",
        ],
    ),
    (
        Command::ClusterStatus,
        &[
            "combien d instances tournent",
            "etat des autres instances",
        ],
    ),
];

impl SemanticStrategy {
    pub fn new() -> Self {
        let exemplars = EXEMPLARS
            .iter()
            .flat_map(|(command, phrases)| {
                phrases
                    .iter()
                    .map(move |p| (*command, content_stems(&crate::normalize(p))))
            })
            .filter(|(_, stems)| !stems.is_empty())
            .collect();
        Self { exemplars }
    }

    /// Dice coefficient between two stem sets.
    fn similarity(a: &[String], b: &[String]) -> f32 {
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        let shared = a.iter().filter(|s| b.contains(s)).count();
        (2 * shared) as f32 / (a.len() + b.len()) as f32
    }
}

impl Default for SemanticStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentStrategy for SemanticStrategy {
    fn name(&self) -> &str {
        "semantic"
    }

    fn method(&self) -> ResolutionMethod {
        ResolutionMethod::Semantic
    }

    fn try_resolve(&self, input: &UtteranceText) -> Vec<Candidate> {
        let stems = content_stems(&input.normalized);
        let mut best: Vec<Candidate> = Vec::new();
        for (command, exemplar) in &self.exemplars {
            let score = Self::similarity(&stems, exemplar) * SEMANTIC_CEILING;
            if score <= 0.0 {
                continue;
            }
            match best.iter_mut().find(|c| c.command == *command) {
                Some(existing) if existing.confidence < score => existing.confidence = score,
                Some(_) => {}
                None => best.push(Candidate::new(*command, score, ResolutionMethod::Semantic)),
            }
        }
        best
    }
}

struct Pattern {
    command: Command,
    regex: Regex,
    confidence: f32,
    /// Named capture group copied into the parameters.
    parameter: Option<&'static str>,
}

/// Hand-written French and English phrasings, with parameter capture.
pub struct PatternStrategy {
    patterns: Vec<Pattern>,
}

impl PatternStrategy {
    pub fn new() -> Result<Self> {
        let table: &[(Command, &str, f32, Option<&'static str>)] = &[
            (
                Command::Echo,
                r"(?i)^\s*(?:r[ée]p[èée]te(?:\s+apr[èe]s\s+moi)?|redis|dis\s+apr[èe]s\s+moi|echo|repeat(?:\s+after\s+me)?)\s*[:,]?\s+(?P<text>.+?)\s*$",
                0.9,
                Some("text"),
            ),
            (
                Command::Analyze,
                r"(?i)\b(?:analyse|analyser|analyze|examine|examiner)\s+(?P<target>.+?)\s*[?.!]*$",
                0.85,
                Some("target"),
            ),
            (
                Command::Explain,
                r"(?i)\b(?:explique|expliquer|explain)(?:[-\s]+(?:moi|nous|me))?\s+(?P<topic>.+?)\s*[?.!]*$",
                0.85,
                Some("topic"),
            ),
            (
                Command::Time,
                r"(?i)\b(?:quelle\s+heure|l['’\s]heure|what\s+time)\b",
                0.85,
                None,
            ),
            (
                Command::Date,
                r"(?i)\b(?:quel\s+jour|quelle\s+date|la\s+date|date\s+d['’\s]aujourd|what\s+day)\b",
                0.85,
                None,
            ),
            (
                Command::Version,
                r"(?i)\b(?:quelle\s+version|version\s+actuelle|which\s+version)\b",
                0.8,
                None,
            ),
            (
                Command::Capabilities,
                r"(?i)\b(?:que\s+(?:sais|peux)[-\s]*tu\s+faire|qu['’\s]est[-\s]ce\s+que\s+tu\s+(?:sais|peux)\s+faire|tes\s+capacit[ée]s)\b",
                0.85,
                None,
            ),
            (
                Command::Help,
                r"(?i)\b(?:aide[-\s]*moi|besoin\s+d['’\s]aide|liste\s+des\s+commandes)\b",
                0.8,
                None,
            ),
            (
                Command::Status,
                r"(?i)\b(?:comment\s+(?:vas|va|allez)[-\s]*(?:tu|vous)|(?:ton|votre)\s+[ée]tat|tout\s+(?:va|fonctionne))\b",
                0.75,
                None,
            ),
            (
                Command::SessionInfo,
                r"(?i)\b(?:ma|cette|la)\s+session\b",
                0.8,
                None,
            ),
            (
                Command::ClusterStatus,
                r"(?i)\b(?:[ée]tat\s+du\s+cluster|les\s+(?:autres\s+)?instances)\b",
                0.8,
                None,
            ),
        ];

        let patterns = table
            .iter()
            .map(|(command, re, confidence, parameter)| {
                Ok(Pattern {
                    command: *command,
                    regex: Regex::new(re)?,
                    confidence: *confidence,
                    parameter: *parameter,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }
}

impl IntentStrategy for PatternStrategy {
    fn name(&self) -> &str {
        "pattern"
    }

    fn method(&self) -> ResolutionMethod {
        ResolutionMethod::Pattern
    }

    fn try_resolve(&self, input: &UtteranceText) -> Vec<Candidate> {
        let mut out = Vec::new();
        for pattern in &self.patterns {
            let Some(caps) = pattern.regex.captures(&input.raw) else {
                continue;
            };
            let mut candidate =
                Candidate::new(pattern.command, pattern.confidence, ResolutionMethod::Pattern);
            if let Some(name) = pattern.parameter {
                match caps.name(name).map(|m| m.as_str().trim()) {
                    Some(value) if !value.is_empty() => {
                        candidate = candidate.with_parameter(name, value);
                    }
                    _ => continue,
                }
            }
            out.push(candidate);
        }
        out
    }
}

const KEYWORDS: &[(Command, &[&str])] = &[
    (Command::Help, &["aide", "aider", "commandes", "help"]),
    (
        Command::Status,
        &["etat", "statut", "fonctionnes", "marches", "status"],
    ),
    (Command::Time, &["heure", "heures", "horloge", "time"]),
    (
        Command::Date,
        &["date", "jour", "aujourd", "calendrier", "today"],
    ),
    (Command::Version, &["version"]),
    (
        Command::Capabilities,
        &["capacites", "capable", "fonctionnalites", "capabilities"],
    ),
    (Command::Echo, &["repete", "repeter", "redis", "echo"]),
    (
        Command::Analyze,
        &["analyse", "analyser", "examine", "examiner", "analyze"],
    ),
    (
        Command::Explain,
        &["explique", "expliquer", "explication", "pourquoi", "explain"],
    ),
    (Command::SessionInfo, &["session"]),
    (Command::ClusterStatus, &["cluster", "instances", "noeuds"]),
];

/// Counts topic words per command.
pub struct KeywordStrategy {
    keywords: Vec<(Command, &'static [&'static str])>,
}

impl KeywordStrategy {
    pub fn new() -> Self {
        Self {
            keywords: KEYWORDS.to_vec(),
        }
    }

    fn score(hits: usize) -> f32 {
        (0.45 + 0.15 * hits as f32).min(0.8)
    }
}

impl Default for KeywordStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentStrategy for KeywordStrategy {
    fn name(&self) -> &str {
        "keyword"
    }

    fn method(&self) -> ResolutionMethod {
        ResolutionMethod::Keyword
    }

    fn try_resolve(&self, input: &UtteranceText) -> Vec<Candidate> {
        let tokens: Vec<&str> = input.tokens().filter(|t| !is_stop_word(t)).collect();
        self.keywords
            .iter()
            .filter_map(|(command, words)| {
                let hits = tokens
                    .iter()
                    .filter(|t| words.iter().any(|w| w == *t))
                    .count();
                (hits > 0).then(|| {
                    Candidate::new(*command, Self::score(hits), ResolutionMethod::Keyword)
                })
            })
            .collect()
    }
}

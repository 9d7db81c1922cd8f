//! The closed command vocabulary.
//!
//! Each tag owns everything other components need to know about it: its wire
//! tag, a description, the trigger phrases the direct matcher accepts and the
//! narration templates spoken around its execution. Adding a command means
//! adding a variant here and a handler in the executor table.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    Help,
    Status,
    Time,
    Date,
    Version,
    Capabilities,
    Echo,
    Analyze,
    Explain,
    Prompt,
    Quit,
    SessionInfo,
    ClusterStatus,
}

/// Bumped whenever a tag is added or removed.
pub const VOCABULARY_VERSION: u32 = 3;

impl Command {
    pub const ALL: [Command; 13] = [
        Command::Help,
        Command::Status,
        Command::Time,
        Command::Date,
        Command::Version,
        Command::Capabilities,
        Command::Echo,
        Command::Analyze,
        Command::Explain,
        Command::Prompt,
        Command::Quit,
        Command::SessionInfo,
        Command::ClusterStatus,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            Command::Help => "HELP",
            Command::Status => "STATUS",
            Command::Time => "TIME",
            Command::Date => "DATE",
            Command::Version => "VERSION",
            Command::Capabilities => "CAPABILITIES",
            Command::Echo => "ECHO",
            Command::Analyze => "ANALYZE",
            Command::Explain => "EXPLAIN",
            Command::Prompt => "PROMPT",
            Command::Quit => "QUIT",
            Command::SessionInfo => "SESSION_INFO",
            Command::ClusterStatus => "CLUSTER_STATUS",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        let wanted = tag.trim().replace(['-', ' '], "_").to_ascii_uppercase();
        Self::ALL.into_iter().find(|c| c.tag() == wanted)
    }

    pub fn description(self) -> &'static str {
        match self {
            Command::Help => "liste les commandes disponibles",
            Command::Status => "donne l'état de l'assistant",
            Command::Time => "donne l'heure",
            Command::Date => "donne la date du jour",
            Command::Version => "donne la version de l'assistant",
            Command::Capabilities => "décrit ce que l'assistant sait faire",
            Command::Echo => "répète un texte",
            Command::Analyze => "analyse un texte",
            Command::Explain => "explique un sujet",
            Command::Prompt => "transmet une demande libre",
            Command::Quit => "termine la session",
            Command::SessionInfo => "décrit la session courante",
            Command::ClusterStatus => "décrit les instances coopérantes",
        }
    }

    /// Whole-utterance phrases accepted by the direct matcher. Written in
    /// natural form; the matcher normalizes them.
    pub fn triggers(self) -> &'static [&'static str] {
        match self {
            Command::Help => &["aide", "aide-moi", "à l'aide", "help"],
            Command::Status => &["statut", "état", "état du système", "status"],
            Command::Time => &[
                "heure",
                "l'heure",
                "quelle heure",
                "quelle heure est-il",
                "il est quelle heure",
                "what time is it",
            ],
            Command::Date => &[
                "date",
                "la date",
                "quelle date",
                "quel jour sommes-nous",
                "on est quel jour",
                "what day is it",
            ],
            Command::Version => &["version", "quelle version"],
            Command::Capabilities => &[
                "capacités",
                "que sais-tu faire",
                "qu'est-ce que tu sais faire",
                "what can you do",
            ],
            Command::Quit => &[
                "quitter",
                "quit",
                "exit",
                "stop",
                "arrête",
                "arrête-toi",
                "au revoir",
                "bye",
                "goodbye",
            ],
            Command::SessionInfo => &["session", "ma session", "info session", "session info"],
            Command::ClusterStatus => &["cluster", "état du cluster", "instances", "cluster status"],
            Command::Echo | Command::Analyze | Command::Explain | Command::Prompt => &[],
        }
    }

    /// Said when the assistant has understood what it is about to do.
    pub fn announcement(self) -> &'static str {
        match self {
            Command::Help => "Je vous liste ce que je sais faire.",
            Command::Status => "Je vérifie mon état.",
            Command::Time => "Je regarde l'heure.",
            Command::Date => "Je regarde la date.",
            Command::Version => "Je vérifie ma version.",
            Command::Capabilities => "Je vous présente mes capacités.",
            Command::Echo => "Je répète.",
            Command::Analyze => "J'analyse cela.",
            Command::Explain => "Je prépare une explication.",
            Command::Prompt => "Je réfléchis à votre demande.",
            Command::Quit => "Très bien, je m'arrête.",
            Command::SessionInfo => "Je regarde votre session.",
            Command::ClusterStatus => "J'interroge les autres instances.",
        }
    }

    /// Template for the spoken result; `{message}` is replaced by the
    /// executor's message.
    pub fn completion_template(self) -> &'static str {
        match self {
            Command::Time | Command::Date => "{message}",
            Command::Analyze => "Résultat de l'analyse : {message}",
            Command::Explain | Command::Prompt => "{message}",
            Command::Quit => "{message}",
            Command::Help
            | Command::Status
            | Command::Version
            | Command::Capabilities
            | Command::Echo
            | Command::SessionInfo
            | Command::ClusterStatus => "Voilà. {message}",
        }
    }

    pub fn render_completion(self, message: &str) -> String {
        self.completion_template().replace("{message}", message.trim())
    }

    /// Commands that only make sense for a registered session.
    pub fn requires_session(self) -> bool {
        matches!(self, Command::SessionInfo)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Command::Quit)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCommand(pub String);

impl fmt::Display for UnknownCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown command: {}", self.0)
    }
}

impl std::error::Error for UnknownCommand {}

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::from_tag(s).ok_or_else(|| UnknownCommand(s.to_string()))
    }
}

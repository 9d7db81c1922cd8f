use intent_parser::normalize;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationAnswer {
    Yes,
    No,
    Unclear,
}

// Checked before YES so that "non merci" or "pas d'accord" read as refusals.
const NO_PHRASES: &[&str] = &[
    "non",
    "no",
    "nan",
    "annule",
    "annuler",
    "pas du tout",
    "pas d accord",
    "surtout pas",
    "laisse tomber",
    "stop",
    "negatif",
];

const YES_PHRASES: &[&str] = &[
    "oui",
    "ouais",
    "yes",
    "ok",
    "okay",
    "d accord",
    "vas y",
    "allez y",
    "confirme",
    "je confirme",
    "bien sur",
    "exactement",
    "c est ca",
    "tout a fait",
    "absolument",
];

fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    let padded = format!(" {normalized} ");
    padded.contains(&format!(" {phrase} "))
}

impl ConfirmationAnswer {
    /// Read a yes/no answer out of free text. Matches whole words only.
    pub fn parse(text: &str) -> Self {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return ConfirmationAnswer::Unclear;
        }
        if NO_PHRASES.iter().any(|p| contains_phrase(&normalized, p)) {
            ConfirmationAnswer::No
        } else if YES_PHRASES.iter().any(|p| contains_phrase(&normalized, p)) {
            ConfirmationAnswer::Yes
        } else {
            ConfirmationAnswer::Unclear
        }
    }
}

//! Everything the assistant says. Derived from the command and the response
//! status only; nothing here feeds back into state transitions.

use command_core::{Command, CoreResponse};
use intent_parser::IntentResult;

pub fn announcement(command: Command) -> &'static str {
    command.announcement()
}

pub fn completion(command: Command, response: &CoreResponse) -> String {
    let text = command.render_completion(&response.message);
    if text.trim().is_empty() {
        "C'est fait.".to_string()
    } else {
        text
    }
}

pub const EMPTY_UTTERANCE: &str = "Je n'ai rien entendu. Pouvez-vous répéter ?";
pub const TRANSCRIPTION_FAILED: &str =
    "Désolé, je n'ai pas réussi à comprendre ce que vous avez dit. Pouvez-vous répéter ?";
pub const CANCELLED: &str = "D'accord, j'annule.";
pub const CONFIRMATION_REPROMPT: &str = "Répondez par oui ou par non, s'il vous plaît.";

fn intended_action(command: Command) -> &'static str {
    match command {
        Command::Help => "afficher l'aide",
        Command::Status => "vérifier mon état",
        Command::Time => "vous donner l'heure",
        Command::Date => "vous donner la date",
        Command::Version => "vous donner ma version",
        Command::Capabilities => "vous présenter mes capacités",
        Command::Echo => "répéter votre phrase",
        Command::Analyze => "analyser ce texte",
        Command::Explain => "vous l'expliquer",
        Command::Prompt => "traiter cette demande",
        Command::Quit => "m'arrêter",
        Command::SessionInfo => "vous décrire votre session",
        Command::ClusterStatus => "interroger les autres instances",
    }
}

/// The yes/no question asked before executing a doubtful intent.
pub fn confirmation_question(intent: &IntentResult) -> String {
    if intent.fallback_used {
        let text = intent.text.trim();
        if text.is_empty() {
            return "Je ne suis pas sûr d'avoir compris. Dois-je continuer ?".to_string();
        }
        return format!("Je ne suis pas sûr d'avoir compris. Dois-je traiter « {text} » comme une question libre ?");
    }
    format!("Voulez-vous que je {} ?", intended_action(intent.command))
}

/// Short explanation of a failed request. The executor's message is never
/// repeated verbatim.
pub fn narrate_error(response: &CoreResponse) -> &'static str {
    match response.status.as_str() {
        "unknown_command" => "Désolé, je ne connais pas cette commande.",
        "unknown_session" => "Désolé, votre session n'est plus active.",
        "session_required" => "Cette commande nécessite une session ouverte.",
        "missing_parameter" => "Il me manque une information pour faire cela.",
        "execution_failed" => "Désolé, l'exécution a échoué.",
        "shutting_down" => "Je suis en train de m'arrêter.",
        _ => "Désolé, une erreur s'est produite.",
    }
}

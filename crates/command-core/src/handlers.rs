//! One function per command tag; wired up by `executor::handler_for`.

use crate::{
    Command, CommandExecutor, CoreRequest, CoreResponse, DispatchError, InterfaceKind, Result,
    VOCABULARY_VERSION,
};
use serde_json::{json, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

fn rfc3339(t: OffsetDateTime) -> Result<String> {
    t.format(&Rfc3339)
        .map_err(|e| DispatchError::Execution(format!("time formatting: {e}")))
}

fn required<'a>(req: &'a CoreRequest, command: Command, names: &[&'static str]) -> Result<&'a str> {
    names
        .iter()
        .find_map(|name| req.parameter_str(name))
        .ok_or(DispatchError::MissingParameter {
            command,
            name: names.first().copied().unwrap_or("text"),
        })
}

pub(crate) fn help(_exec: &CommandExecutor, _req: &CoreRequest) -> Result<CoreResponse> {
    let listed: Vec<&Command> = Command::ALL
        .iter()
        .filter(|c| !matches!(c, Command::Prompt))
        .collect();
    let names: Vec<String> = listed
        .iter()
        .map(|c| c.triggers().first().copied().unwrap_or(c.tag()).to_string())
        .collect();
    let commands: Vec<Value> = listed
        .iter()
        .map(|c| json!({ "tag": c.tag(), "description": c.description() }))
        .collect();
    Ok(CoreResponse::success(format!(
        "Je peux répondre à : {}. Vous pouvez aussi me demander d'analyser, d'expliquer ou de répéter un texte.",
        names.join(", ")
    ))
    .with_data("commands", commands))
}

pub(crate) fn status(exec: &CommandExecutor, _req: &CoreRequest) -> Result<CoreResponse> {
    let uptime = exec.uptime().as_secs();
    let sessions = exec.sessions().len();
    let by_interface: serde_json::Map<String, Value> = exec
        .sessions()
        .count_by_interface()
        .into_iter()
        .map(|(k, v)| (k.as_str().to_string(), json!(v)))
        .collect();
    let mut resp = CoreResponse::success(format!(
        "Tout fonctionne. {} session(s) active(s), en service depuis {} s.",
        sessions, uptime
    ))
    .with_data("uptime_s", uptime)
    .with_data("active_sessions", sessions)
    .with_data("sessions_by_interface", by_interface)
    .with_data("shutdown_requested", exec.shutdown_signal().is_triggered())
    .with_data("requests_total", exec.metrics().requests.get())
    .with_data("errors_total", exec.metrics().errors.get())
    .with_data("metrics", exec.metrics().encode_text());
    if let Some(cluster) = exec.cluster() {
        let summary = cluster.summary();
        resp = resp.with_data("role", summary.role.clone()).with_data(
            "cluster_size",
            summary.cluster_size,
        );
    }
    Ok(resp)
}

pub(crate) fn time(_exec: &CommandExecutor, _req: &CoreRequest) -> Result<CoreResponse> {
    let t = now();
    let clock = format!("{:02}:{:02}", t.hour(), t.minute());
    Ok(CoreResponse::success(format!("Il est {clock}."))
        .with_data("time", clock)
        .with_data("timestamp", rfc3339(t)?))
}

pub(crate) fn date(_exec: &CommandExecutor, _req: &CoreRequest) -> Result<CoreResponse> {
    let t = now();
    let day = format!("{:02}/{:02}/{}", t.day(), u8::from(t.month()), t.year());
    Ok(CoreResponse::success(format!("Nous sommes le {day}."))
        .with_data("date", day)
        .with_data("weekday", t.weekday().to_string())
        .with_data("timestamp", rfc3339(t)?))
}

pub(crate) fn version(exec: &CommandExecutor, _req: &CoreRequest) -> Result<CoreResponse> {
    let cfg = exec.config();
    Ok(CoreResponse::success(format!(
        "{} version {}.",
        cfg.assistant_name, cfg.version
    ))
    .with_data("version", cfg.version.clone())
    .with_data("vocabulary_version", VOCABULARY_VERSION))
}

pub(crate) fn capabilities(exec: &CommandExecutor, _req: &CoreRequest) -> Result<CoreResponse> {
    let tags: Vec<&str> = Command::ALL.iter().map(|c| c.tag()).collect();
    let interfaces: Vec<&str> = InterfaceKind::ALL.iter().map(|i| i.as_str()).collect();
    Ok(CoreResponse::success(format!(
        "Je comprends {} commandes, à l'écrit comme à l'oral.",
        tags.len()
    ))
    .with_data("commands", tags)
    .with_data("interfaces", interfaces)
    .with_data("clustered", exec.cluster().is_some()))
}

pub(crate) fn echo(_exec: &CommandExecutor, req: &CoreRequest) -> Result<CoreResponse> {
    let text = required(req, Command::Echo, &["text"])?;
    Ok(CoreResponse::success(text.to_string()).with_data("text", text))
}

pub(crate) fn analyze(_exec: &CommandExecutor, req: &CoreRequest) -> Result<CoreResponse> {
    let text = required(req, Command::Analyze, &["target", "text"])?;
    let stats = TextStats::of(text);
    Ok(CoreResponse::success(format!(
        "{} mot(s), {} phrase(s), {} caractère(s).",
        stats.words, stats.sentences, stats.chars
    ))
    .with_data("words", stats.words)
    .with_data("sentences", stats.sentences)
    .with_data("lines", stats.lines)
    .with_data("chars", stats.chars)
    .with_data("longest_word", stats.longest_word))
}

pub(crate) fn explain(exec: &CommandExecutor, req: &CoreRequest) -> Result<CoreResponse> {
    let topic = required(req, Command::Explain, &["topic", "text"])?;
    let answer = exec
        .responder()
        .respond(&format!("Explique : {topic}"), &req.context)?;
    Ok(CoreResponse::success(answer).with_data("topic", topic))
}

pub(crate) fn prompt(exec: &CommandExecutor, req: &CoreRequest) -> Result<CoreResponse> {
    let text = required(req, Command::Prompt, &["text"])?;
    let answer = exec.responder().respond(text, &req.context)?;
    Ok(CoreResponse::success(answer).with_data("prompt", text))
}

pub(crate) fn quit(exec: &CommandExecutor, req: &CoreRequest) -> Result<CoreResponse> {
    exec.metrics().quits.inc();
    let first = exec.shutdown_signal().trigger();
    if first {
        tracing::info!(interface = %req.interface, "shutdown requested");
        exec.run_shutdown_hooks();
    } else {
        tracing::debug!("shutdown already signaled, re-confirming");
    }
    Ok(CoreResponse::success("Au revoir, à bientôt !")
        .with_status("quit")
        .with_data("quit", true)
        .with_data("shutdown", true)
        .with_data("already_signaled", !first))
}

pub(crate) fn session_info(exec: &CommandExecutor, req: &CoreRequest) -> Result<CoreResponse> {
    let id = req
        .session_id
        .ok_or(DispatchError::SessionRequired(Command::SessionInfo))?;
    let session = exec
        .sessions()
        .get(&id)
        .ok_or_else(|| DispatchError::UnknownSession(id.to_string()))?;
    let age = session.age().whole_seconds().max(0);
    Ok(CoreResponse::success(format!(
        "Session {} ({}) ouverte depuis {} s.",
        id.short(),
        session.interface,
        age
    ))
    .with_data("session_id", id.to_string())
    .with_data("interface", session.interface.as_str())
    .with_data("created_at", rfc3339(session.created_at)?)
    .with_data("last_activity", rfc3339(session.last_activity)?)
    .with_data("age_s", age))
}

pub(crate) fn cluster_status(exec: &CommandExecutor, _req: &CoreRequest) -> Result<CoreResponse> {
    let Some(cluster) = exec.cluster() else {
        return Ok(CoreResponse::success("Je fonctionne en instance unique.")
            .with_data("clustered", false));
    };
    let summary = cluster.summary();
    let detail = serde_json::to_value(&summary)
        .map_err(|e| DispatchError::Execution(format!("cluster summary: {e}")))?;
    Ok(CoreResponse::success(format!(
        "Instance {} ({}) : {} instance(s) connue(s), {} pair(s) injoignable(s).",
        summary.instance_id, summary.role, summary.cluster_size, summary.unhealthy_peers
    ))
    .with_data("clustered", true)
    .with_data("cluster", detail))
}

struct TextStats {
    chars: usize,
    words: usize,
    lines: usize,
    sentences: usize,
    longest_word: String,
}

impl TextStats {
    fn of(text: &str) -> Self {
        let words: Vec<&str> = text
            .split(|c: char| !c.is_alphanumeric() && c != '\'' && c != '-')
            .filter(|w| !w.is_empty())
            .collect();
        let sentences = text
            .split(['.', '!', '?'])
            .filter(|s| !s.trim().is_empty())
            .count();
        let longest_word = words
            .iter()
            .max_by_key(|w| w.chars().count())
            .map(|w| w.to_string())
            .unwrap_or_default();
        Self {
            chars: text.chars().count(),
            words: words.len(),
            lines: text.lines().count().max(1),
            sentences,
            longest_word,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClusterSummary, ClusterView, ExecutorConfig};
    use std::sync::Arc;

    fn exec() -> CommandExecutor {
        CommandExecutor::new(ExecutorConfig::default()).unwrap()
    }

    fn req(command: Command) -> CoreRequest {
        CoreRequest::new(command.tag(), InterfaceKind::Cli)
    }

    #[test]
    fn test_time_message_contains_clock() {
        let resp = exec().execute(req(Command::Time));
        assert!(resp.is_success());
        let clock = resp.data.get("time").and_then(Value::as_str).unwrap();
        assert_eq!(clock.len(), 5);
        assert!(resp.message.contains(clock));
    }

    #[test]
    fn test_every_command_produces_a_response() {
        let exec = exec();
        let id = exec.create_session(InterfaceKind::Cli);
        for command in Command::ALL {
            if command == Command::Quit {
                continue;
            }
            let resp = exec.execute(
                req(command)
                    .with_session(Some(id))
                    .with_parameter("text", "bonjour le monde")
                    .with_parameter("topic", "les arcs-en-ciel"),
            );
            assert!(resp.is_success(), "{command} failed: {}", resp.message);
            assert!(!resp.message.is_empty());
        }
    }

    #[test]
    fn test_echo_without_text_is_missing_parameter() {
        let resp = exec().execute(req(Command::Echo));
        assert!(resp.is_error());
        assert_eq!(resp.status, "missing_parameter");
    }

    #[test]
    fn test_analyze_counts() {
        let resp = exec().execute(
            req(Command::Analyze).with_parameter("target", "Bonjour le monde. Comment ça va ?"),
        );
        assert_eq!(resp.data.get("words"), Some(&json!(6)));
        assert_eq!(resp.data.get("sentences"), Some(&json!(2)));
    }

    struct TwoNodes;

    impl ClusterView for TwoNodes {
        fn summary(&self) -> ClusterSummary {
            ClusterSummary {
                instance_id: 0,
                role: "master".into(),
                cluster_size: 2,
                healthy_peers: 0,
                unhealthy_peers: 1,
                peers: Vec::new(),
            }
        }
    }

    #[test]
    fn test_cluster_status_reports_summary() {
        let exec = exec().with_cluster(Arc::new(TwoNodes));
        let resp = exec.execute(req(Command::ClusterStatus));
        assert_eq!(resp.data.get("clustered"), Some(&json!(true)));
        assert!(resp.message.contains("master"));
        let status = exec.execute(req(Command::Status));
        assert_eq!(status.data.get("cluster_size"), Some(&json!(2)));
    }
}

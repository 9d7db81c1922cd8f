use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use command_core::{Command, CommandExecutor, Dispatcher, ExecutorConfig, VOCABULARY_VERSION};
use dialogue_engine::{
    AdapterContext, CliAdapter, DialogueConfig, DialogueEvent, DialogueMachine, FrontendAdapter,
    AUTO_EXECUTE_THRESHOLD,
};
use instance_coord::{assess_peers, now_millis, FileStatusStore, Health, StatusStore};
use intent_parser::{IntentPipeline, PipelineConfig};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use voice_local::{SpeechOutput, TranscriberChain};

#[derive(Parser, Debug)]
#[command(
    name = "vc",
    version,
    about = "Voice command assistant CLI",
    disable_help_subcommand = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve text to an intent without executing it
    Resolve {
        #[arg(required = true)]
        text: Vec<String>,
        /// Print the full intent as JSON
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Resolve and execute once; `/TAG key=value` lines bypass resolution
    Exec {
        #[arg(required = true)]
        text: Vec<String>,
        /// Print the raw response as JSON
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Text conversation on stdin, with confirmations, until the user says goodbye
    Chat {
        /// Minimum confidence for executing without asking
        #[arg(long, default_value_t = AUTO_EXECUTE_THRESHOLD)]
        threshold: f32,
        /// How long a confirmation question stays open
        #[arg(long, default_value_t = 60_000)]
        confirm_timeout_ms: u64,
    },
    /// List the command vocabulary
    Commands,
    /// Read a shared cluster directory and report instance health
    ClusterStatus {
        #[arg(long)]
        dir: PathBuf,
        #[arg(long, default_value_t = 1)]
        cluster_size: u32,
        #[arg(long, default_value_t = 5_000)]
        stale_after_ms: u64,
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Resolve { text, json } => resolve(&text.join(" "), json),
        Commands::Exec { text, json } => exec(&text.join(" "), json),
        Commands::Chat {
            threshold,
            confirm_timeout_ms,
        } => chat(threshold, confirm_timeout_ms),
        Commands::Commands => list_commands(),
        Commands::ClusterStatus {
            dir,
            cluster_size,
            stale_after_ms,
            json,
        } => cluster_status(dir, cluster_size, stale_after_ms, json),
    }
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn pipeline() -> Result<Arc<IntentPipeline>> {
    Ok(Arc::new(IntentPipeline::new(PipelineConfig::default())?))
}

fn resolve(text: &str, json: bool) -> Result<()> {
    let intent = pipeline()?.resolve(text);
    if json {
        println!("{}", serde_json::to_string_pretty(&intent)?);
        return Ok(());
    }
    println!(
        "{}\t{:.2}\t{}{}{}",
        intent.command,
        intent.confidence,
        intent.method,
        if intent.fallback_used { "\tfallback" } else { "" },
        if intent.ambiguous { "\tambiguous" } else { "" },
    );
    let mut params: Vec<_> = intent.parameters.iter().collect();
    params.sort();
    for (key, value) in params {
        println!("  {key} = {value}");
    }
    Ok(())
}

fn exec(text: &str, json: bool) -> Result<()> {
    let executor = CommandExecutor::new(ExecutorConfig::default())?;
    let adapter = CliAdapter::new(pipeline()?);
    let request = adapter.translate_to_core(text, &AdapterContext::default());
    info!("Executing {}", request.command);
    let response = executor.execute(request);
    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        println!("{}", adapter.translate_from_core(&response));
    }
    if response.is_error() {
        anyhow::bail!("command failed: {}", response.status);
    }
    Ok(())
}

/// Speech output for a terminal: prints what would be said.
struct ConsoleSpeech;

impl SpeechOutput for ConsoleSpeech {
    fn name(&self) -> &str {
        "console"
    }

    fn speak(&mut self, text: &str) -> bool {
        let mut out = std::io::stdout().lock();
        writeln!(out, "assistant> {text}").is_ok() && out.flush().is_ok()
    }
}

fn chat(threshold: f32, confirm_timeout_ms: u64) -> Result<()> {
    let executor = Arc::new(CommandExecutor::new(ExecutorConfig::default())?);
    let session = executor.create_session(command_core::InterfaceKind::Tui);
    let config = DialogueConfig {
        auto_execute_threshold: threshold,
        confirmation_timeout_ms: confirm_timeout_ms,
        interface: command_core::InterfaceKind::Tui,
        ..DialogueConfig::default()
    };
    let dispatcher: Arc<dyn Dispatcher> = executor.clone();
    let mut machine = DialogueMachine::new(
        config,
        pipeline()?,
        TranscriberChain::new(),
        Box::new(ConsoleSpeech),
        dispatcher,
    )?
    .with_session(Some(session));
    machine.set_event_callback(|event| {
        if let DialogueEvent::IntentResolved(intent) = event {
            info!(
                "Intent: {} via {} ({:.2})",
                intent.command, intent.method, intent.confidence
            );
        }
    });

    for line in std::io::stdin().lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        machine.submit_text(&line);
        if machine.is_finished() {
            break;
        }
    }
    executor.end_session(&session);
    Ok(())
}

fn list_commands() -> Result<()> {
    println!("vocabulary v{VOCABULARY_VERSION}");
    for command in Command::ALL {
        let triggers = command.triggers().join(", ");
        println!("{:<15}{}", command.tag(), command.description());
        if !triggers.is_empty() {
            println!("{:<15}  [{}]", "", triggers);
        }
    }
    Ok(())
}

fn cluster_status(dir: PathBuf, cluster_size: u32, stale_after_ms: u64, json: bool) -> Result<()> {
    if !dir.is_dir() {
        anyhow::bail!("no cluster directory at {}", dir.display());
    }
    let store = FileStatusStore::new(&dir)?;
    let records = store.snapshot()?;
    let peers = assess_peers(&records, cluster_size, None, now_millis(), stale_after_ms);

    if json {
        println!("{}", serde_json::to_string_pretty(&peers)?);
        return Ok(());
    }
    println!("cluster {} ({} expected)", dir.display(), cluster_size);
    for peer in &peers {
        let age = peer
            .heartbeat_age_ms
            .map_or_else(|| "-".to_string(), |ms| format!("{ms}ms"));
        let stopping = records
            .iter()
            .any(|r| r.instance_id == peer.instance_id && r.shutdown_requested);
        println!(
            "{}\t{}\t{}\t{}{}",
            peer.instance_id,
            peer.role,
            match peer.health {
                Health::Healthy => "healthy",
                Health::Unreachable => "unreachable",
            },
            age,
            if stopping { "\tshutdown requested" } else { "" },
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subcommands() {
        let cli = Cli::try_parse_from(["vc", "resolve", "quelle", "heure", "--json"]).unwrap();
        match cli.command {
            Commands::Resolve { text, json } => {
                assert_eq!(text.join(" "), "quelle heure");
                assert!(json);
            }
            other => panic!("unexpected {other:?}"),
        }

        let cli = Cli::try_parse_from([
            "vc",
            "cluster-status",
            "--dir",
            "/tmp/x",
            "--cluster-size",
            "3",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::ClusterStatus {
                cluster_size: 3,
                stale_after_ms: 5_000,
                ..
            }
        ));

        assert!(Cli::try_parse_from(["vc", "exec"]).is_err());
    }

    #[test]
    fn test_cluster_status_rejects_missing_directory() {
        let dir = std::env::temp_dir().join("vc-cli-no-such-cluster-dir");
        assert!(cluster_status(dir, 2, 1_000, false).is_err());
    }
}

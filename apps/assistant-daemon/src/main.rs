use anyhow::Result;
use clap::Parser;
use command_core::{
    Command, CommandExecutor, CoreRequest, Dispatcher, ExecutorConfig, InterfaceKind,
    ShutdownSignal,
};
use dialogue_engine::{
    AdapterContext, CliAdapter, DialogueConfig, DialogueEvent, DialogueMachine, FrontendAdapter,
    RunOutcome,
};
use instance_coord::{CoordinatorConfig, FileStatusStore, InstanceCoordinator};
use intent_parser::{IntentPipeline, PipelineConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use voice_local::plugin::{new_speech_backend, new_transcriber_backend, TranscriberBackendKind};
use voice_local::{
    spawn_capture, AssemblerConfig, AudioSegment, ScriptedSource, SegmentQueue,
    SpeechOnsetDetector, TranscriberChain,
};

#[derive(Parser, Debug)]
#[command(name = "assistant-daemon")]
#[command(about = "Voice command assistant daemon")]
struct Args {
    /// This process's instance id (0 is the master)
    #[arg(long, default_value_t = 0)]
    instance_id: u32,

    /// Number of cooperating instances; 1 disables cluster mode
    #[arg(long, default_value_t = 1)]
    cluster_size: u32,

    /// Shared status directory for cluster mode
    #[arg(long)]
    cluster_dir: Option<PathBuf>,

    #[arg(long, default_value_t = 1_000)]
    heartbeat_ms: u64,

    /// Peers silent for longer than this are reported unreachable
    #[arg(long, default_value_t = 5_000)]
    stale_after_ms: u64,

    /// Transcription backend (mock, whisper_cpp, vosk)
    #[arg(long, default_value = "mock")]
    transcriber: String,

    /// Scripted utterance for the mock transcriber; one spoken turn each
    #[arg(long = "say")]
    say: Vec<String>,

    /// Listen on the default microphone instead of a scripted source
    #[cfg(feature = "audio")]
    #[arg(long)]
    mic: bool,

    /// Energy at which a microphone segment counts as speech
    #[cfg(feature = "audio")]
    #[arg(long, default_value_t = 0.02)]
    speech_threshold: f32,

    /// Do not read commands from standard input
    #[arg(long)]
    no_stdin: bool,
}

impl Args {
    fn clustered(&self) -> bool {
        self.cluster_size > 1 || self.cluster_dir.is_some()
    }

    fn voice_enabled(&self) -> bool {
        #[cfg(feature = "audio")]
        if self.mic {
            return true;
        }
        !self.say.is_empty()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();

    let args = Args::parse();

    info!("assistant-daemon starting");
    info!("Instance: {} of {}", args.instance_id, args.cluster_size);

    let shutdown = ShutdownSignal::new();
    let mut executor = CommandExecutor::new(ExecutorConfig::default())
        .map_err(|e| anyhow::anyhow!("Failed to create executor: {}", e))?
        .with_shutdown_signal(shutdown.clone());

    let coordinator = if args.clustered() {
        let dir = args
            .cluster_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("voice-assistant-cluster"));
        let store = FileStatusStore::new(&dir)
            .map_err(|e| anyhow::anyhow!("Failed to open cluster directory: {}", e))?;
        let config = CoordinatorConfig {
            instance_id: args.instance_id,
            cluster_size: args.cluster_size,
            heartbeat_interval_ms: args.heartbeat_ms,
            stale_after_ms: args.stale_after_ms,
            ..CoordinatorConfig::default()
        };
        let coordinator = Arc::new(
            InstanceCoordinator::new(config, Arc::new(store), shutdown.clone())
                .map_err(|e| anyhow::anyhow!("Failed to create coordinator: {}", e))?,
        );
        executor = executor.with_cluster(coordinator.clone());
        info!("Cluster mode: {} in {}", coordinator.role(), dir.display());
        Some(coordinator)
    } else {
        None
    };
    let heartbeat = match &coordinator {
        Some(c) => Some(
            c.spawn_heartbeat()
                .map_err(|e| anyhow::anyhow!("Failed to start heartbeat: {}", e))?,
        ),
        None => None,
    };

    let executor = Arc::new(executor);
    executor.on_shutdown(|| info!("QUIT received, tearing down"));
    let pipeline = Arc::new(
        IntentPipeline::new(PipelineConfig::default())
            .map_err(|e| anyhow::anyhow!("Failed to init intent pipeline: {}", e))?,
    );

    let voice = if args.voice_enabled() {
        let executor = executor.clone();
        let pipeline = pipeline.clone();
        let shutdown = shutdown.clone();
        let voice_args = VoiceArgs::from(&args);
        Some(tokio::task::spawn_blocking(move || {
            run_voice_session(voice_args, executor, pipeline, shutdown)
        }))
    } else {
        None
    };

    if !args.no_stdin {
        tokio::spawn(run_text_frontend(
            executor.clone(),
            CliAdapter::new(pipeline.clone()),
        ));
    }

    tokio::select! {
        _ = shutdown.wait() => info!("Shutdown requested"),
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                warn!("Failed to listen for ctrl-c: {}", e);
            }
            info!("Interrupted");
            interrupt(&executor);
        }
    }

    if let Some(voice) = voice {
        match voice.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Voice session failed: {}", e),
            Err(e) => error!("Voice session panicked: {}", e),
        }
    }
    if let Some(heartbeat) = heartbeat {
        let _ = tokio::task::spawn_blocking(move || heartbeat.join()).await;
    }
    executor.end_all_sessions();

    info!(
        "assistant-daemon shutting down after {:.1}s",
        executor.uptime().as_secs_f64()
    );
    Ok(())
}

/// Ctrl-C takes the same path as a spoken or typed QUIT, so teardown hooks run.
fn interrupt(executor: &CommandExecutor) {
    let request = CoreRequest::new(Command::Quit.tag(), InterfaceKind::Internal);
    let response = executor.execute(request);
    if !response.is_terminal() {
        warn!("QUIT on interrupt was not terminal: {}", response.status);
        executor.shutdown_signal().trigger();
    }
}

struct VoiceArgs {
    transcriber: String,
    say: Vec<String>,
    #[cfg(feature = "audio")]
    mic: bool,
    #[cfg(feature = "audio")]
    speech_threshold: f32,
}

impl From<&Args> for VoiceArgs {
    fn from(args: &Args) -> Self {
        Self {
            transcriber: args.transcriber.clone(),
            say: args.say.clone(),
            #[cfg(feature = "audio")]
            mic: args.mic,
            #[cfg(feature = "audio")]
            speech_threshold: args.speech_threshold,
        }
    }
}

/// One scripted turn per utterance: a little leading silence, speech, then
/// enough silence to end it.
fn scripted_audio(turns: usize, sample_rate_hz: u32) -> Vec<AudioSegment> {
    let mut script = Vec::new();
    for _ in 0..turns {
        script.push(AudioSegment::silence(200, sample_rate_hz));
        script.extend(ScriptedSource::turn(600, 1_400, sample_rate_hz));
    }
    script
}

fn run_voice_session(
    args: VoiceArgs,
    executor: Arc<CommandExecutor>,
    pipeline: Arc<IntentPipeline>,
    shutdown: ShutdownSignal,
) -> Result<()> {
    let kind: TranscriberBackendKind = args.transcriber.parse()?;
    let transcriber = new_transcriber_backend(kind, args.say.clone())?;
    let speech = new_speech_backend()?;

    let queue = SegmentQueue::new(256usize.max(args.say.len() * 32));
    let mic = open_microphone(&args, &queue)?;
    let sample_rate_hz = mic
        .as_ref()
        .map_or(AssemblerConfig::default().sample_rate_hz, |(_, rate)| *rate);
    let config = DialogueConfig {
        assembler: AssemblerConfig {
            sample_rate_hz,
            ..AssemblerConfig::default()
        },
        ..DialogueConfig::default()
    };

    let capture = if mic.is_none() {
        let source = ScriptedSource::new(scripted_audio(args.say.len(), sample_rate_hz));
        Some(spawn_capture(source, queue.clone())?)
    } else {
        None
    };

    let session = executor.create_session(InterfaceKind::Sui);
    let dispatcher: Arc<dyn Dispatcher> = executor.clone();
    let mut machine = DialogueMachine::new(
        config,
        pipeline,
        TranscriberChain::new().with_engine(transcriber),
        speech,
        dispatcher,
    )?
    .with_session(Some(session))
    .with_hotword(Box::new(SpeechOnsetDetector));
    machine.set_event_callback(|event| match event {
        DialogueEvent::Narration(text) => println!("assistant> {text}"),
        DialogueEvent::IntentResolved(intent) => info!(
            "Intent: {} via {} ({:.2})",
            intent.command, intent.method, intent.confidence
        ),
        DialogueEvent::StateChanged { from, to } => tracing::debug!("{} -> {}", from, to),
        DialogueEvent::Response(_) | DialogueEvent::Finished => {}
    });

    let outcome = machine.run(&queue, &shutdown)?;
    if let Some(capture) = capture {
        capture.join();
    }
    executor.end_session(&session);
    match outcome {
        RunOutcome::Finished => info!("Voice session ended by the user"),
        RunOutcome::Shutdown => info!("Voice session stopped for shutdown"),
        RunOutcome::SourceExhausted => info!("Voice source exhausted"),
    }
    Ok(())
}

#[cfg(feature = "audio")]
fn open_microphone(
    args: &VoiceArgs,
    queue: &SegmentQueue,
) -> Result<Option<(voice_local::mic::MicStream, u32)>> {
    if !args.mic {
        return Ok(None);
    }
    let (stream, mic_config) =
        voice_local::mic::start_default_input_segments(queue.clone(), args.speech_threshold)?;
    info!(
        "Microphone started: {}Hz, {} channels",
        mic_config.sample_rate_hz, mic_config.channels
    );
    Ok(Some((stream, mic_config.sample_rate_hz)))
}

#[cfg(not(feature = "audio"))]
fn open_microphone(_args: &VoiceArgs, _queue: &SegmentQueue) -> Result<Option<((), u32)>> {
    Ok(None)
}

async fn run_text_frontend(executor: Arc<CommandExecutor>, adapter: CliAdapter) {
    // Stdin reads cannot be cancelled, so they live on a detached thread.
    let (tx, mut rx) = tokio::sync::mpsc::channel::<String>(16);
    std::thread::spawn(move || {
        use std::io::BufRead;
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.blocking_send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("stdin read failed: {}", e);
                    break;
                }
            }
        }
    });

    let session = executor.create_session(adapter.interface());
    let mut context = AdapterContext::with_session(Some(session));
    while let Some(line) = rx.recv().await {
        if line.trim().is_empty() {
            continue;
        }
        let request = adapter.translate_to_core(&line, &context);
        let command: Option<Command> = request.command.parse().ok();
        let response = executor.execute(request);
        println!("{}", adapter.translate_from_core(&response));
        if response.is_terminal() {
            break;
        }
        if response.is_success() {
            context.previous = command.filter(|c| !c.is_terminal());
        }
    }
    executor.end_session(&session);
}

fn setup_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

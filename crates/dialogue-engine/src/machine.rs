//! The dialogue state machine.
//!
//! One machine runs one utterance lifecycle at a time:
//! IDLE → LISTENING → PROCESSING → (INTENT_VALIDATION) → AWAIT_RESPONSE →
//! SPEAKING → IDLE. Transcription and intent resolution run on a worker
//! thread; every job carries the epoch it was started in and results from an
//! older epoch are dropped, which is how `cancel` discards in-flight work.

use crate::confirm::ConfirmationAnswer;
use crate::events::{DialogueEvent, EventCallback};
use crate::narration;
use crate::{DialogueError, DialogueState, Result};
use command_core::{
    Command, CoreResponse, Dispatcher, InterfaceKind, ResponseKind, SessionId, ShutdownSignal,
};
use intent_parser::{IntentPipeline, IntentResult, ResolutionMethod, ResolveContext};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use voice_local::{
    AssemblerConfig, AssemblerPoll, AudioSegment, FinalizedUtterance, HotwordDetector,
    SegmentQueue, SpeechOutput, TranscriberChain, UtteranceAssembler, VoiceError,
};

/// Minimum confidence for executing a strategy-resolved intent without asking.
pub const AUTO_EXECUTE_THRESHOLD: f32 = 0.85;

/// A termination at least this sure overrides a yes/no in a confirmation
/// reply. Weaker ones ("non merci", "oui c'est bon") are politeness around
/// the answer.
const REPLY_TERMINATION_MIN: f32 = 0.9;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueConfig {
    pub assembler: AssemblerConfig,
    pub auto_execute_threshold: f32,
    /// How long to wait for a yes/no before giving up.
    pub confirmation_timeout_ms: u64,
    /// Upper bound on how long `run` blocks before re-checking cancel and shutdown.
    pub tick_ms: u64,
    pub interface: InterfaceKind,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            assembler: AssemblerConfig::default(),
            auto_execute_threshold: AUTO_EXECUTE_THRESHOLD,
            confirmation_timeout_ms: 8_000,
            tick_ms: 50,
            interface: InterfaceKind::Sui,
        }
    }
}

impl DialogueConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.auto_execute_threshold > 0.0 && self.auto_execute_threshold <= 1.0) {
            return Err(DialogueError::InvalidConfig(format!(
                "auto_execute_threshold must be in (0, 1], got {}",
                self.auto_execute_threshold
            )));
        }
        if self.tick_ms == 0 || self.confirmation_timeout_ms == 0 {
            return Err(DialogueError::InvalidConfig(
                "tick_ms and confirmation_timeout_ms must be positive".to_string(),
            ));
        }
        if self.assembler.long_silence_ms <= self.assembler.short_silence_ms {
            return Err(DialogueError::InvalidConfig(
                "long_silence_ms must exceed short_silence_ms".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_millis(self.confirmation_timeout_ms)
    }
}

/// Whether an intent must be confirmed before it is executed.
///
/// Terminations and direct matches never are. Fallbacks, ambiguous results
/// and anything under `threshold` always are.
pub fn needs_validation(intent: &IntentResult, threshold: f32) -> bool {
    match intent.method {
        ResolutionMethod::Termination | ResolutionMethod::DirectMatch => false,
        _ => intent.fallback_used || intent.ambiguous || intent.confidence < threshold,
    }
}

/// Why [`DialogueMachine::run`] returned.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RunOutcome {
    /// The process-wide shutdown signal fired.
    Shutdown,
    /// The user ended the conversation.
    Finished,
    /// The segment queue was closed and drained.
    SourceExhausted,
}

#[derive(Default)]
struct ControlFlags {
    cancel: AtomicBool,
    paused: AtomicBool,
}

/// Cancel or pause a machine from another thread. Observed within one tick.
#[derive(Clone, Default)]
pub struct DialogueHandle {
    flags: Arc<ControlFlags>,
}

impl DialogueHandle {
    pub fn cancel(&self) {
        self.flags.cancel.store(true, Ordering::Release);
    }

    pub fn pause(&self) {
        self.flags.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.flags.paused.store(false, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.flags.paused.load(Ordering::Acquire)
    }

    fn take_cancel(&self) -> bool {
        self.flags.cancel.swap(false, Ordering::AcqRel)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum JobKind {
    Command,
    Confirmation,
}

#[derive(Debug)]
enum JobOutcome {
    Empty,
    Failed(String),
    Cancelled,
    Intent(IntentResult),
    Reply(Reply),
}

/// A reply to a confirmation question.
#[derive(Debug)]
enum Reply {
    Answer(ConfirmationAnswer),
    Termination(IntentResult),
}

fn read_reply(pipeline: &IntentPipeline, text: &str) -> Reply {
    let answer = ConfirmationAnswer::parse(text);
    match pipeline.detect_termination(text) {
        Some(quit)
            if answer == ConfirmationAnswer::Unclear
                || quit.confidence >= REPLY_TERMINATION_MIN =>
        {
            Reply::Termination(quit)
        }
        _ => Reply::Answer(answer),
    }
}

struct JobResult {
    epoch: u64,
    outcome: JobOutcome,
}

fn run_job(
    kind: JobKind,
    utterance: &FinalizedUtterance,
    transcriber: &Mutex<TranscriberChain>,
    pipeline: &IntentPipeline,
    context: &ResolveContext,
    cancelled: &AtomicBool,
) -> JobOutcome {
    let transcript = transcriber.lock().try_transcribe(utterance, cancelled);
    if cancelled.load(Ordering::Acquire) {
        return JobOutcome::Cancelled;
    }
    let text = match transcript {
        Ok(Some(t)) => t.text,
        Ok(None) => return JobOutcome::Empty,
        Err(VoiceError::Cancelled) => return JobOutcome::Cancelled,
        Err(e) => return JobOutcome::Failed(e.to_string()),
    };
    if text.trim().is_empty() {
        return JobOutcome::Empty;
    }
    match kind {
        JobKind::Command => JobOutcome::Intent(pipeline.resolve_with(&text, context)),
        JobKind::Confirmation => JobOutcome::Reply(read_reply(pipeline, &text)),
    }
}

pub struct DialogueMachine {
    config: DialogueConfig,
    state: DialogueState,
    assembler: UtteranceAssembler,
    pipeline: Arc<IntentPipeline>,
    transcriber: Arc<Mutex<TranscriberChain>>,
    speech: Box<dyn SpeechOutput + Send>,
    dispatcher: Arc<dyn Dispatcher>,
    hotword: Option<Box<dyn HotwordDetector + Send>>,
    session: Option<SessionId>,
    handle: DialogueHandle,
    callback: Option<EventCallback>,

    epoch: u64,
    job: Option<Arc<AtomicBool>>,
    results_tx: mpsc::Sender<JobResult>,
    results_rx: mpsc::Receiver<JobResult>,

    pending: Option<IntentResult>,
    validation_deadline: Option<Instant>,
    previous: Option<Command>,
    last_intent: Option<IntentResult>,
    last_response: Option<CoreResponse>,
    finished: bool,
}

impl DialogueMachine {
    pub fn new(
        config: DialogueConfig,
        pipeline: Arc<IntentPipeline>,
        transcriber: TranscriberChain,
        speech: Box<dyn SpeechOutput + Send>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<Self> {
        config.validate()?;
        let (results_tx, results_rx) = mpsc::channel();
        Ok(Self {
            assembler: UtteranceAssembler::new(config.assembler.clone()),
            config,
            state: DialogueState::Idle,
            pipeline,
            transcriber: Arc::new(Mutex::new(transcriber)),
            speech,
            dispatcher,
            hotword: None,
            session: None,
            handle: DialogueHandle::default(),
            callback: None,
            epoch: 0,
            job: None,
            results_tx,
            results_rx,
            pending: None,
            validation_deadline: None,
            previous: None,
            last_intent: None,
            last_response: None,
            finished: false,
        })
    }

    /// Attribute dispatched requests to a registered session.
    pub fn with_session(mut self, session: Option<SessionId>) -> Self {
        self.session = session;
        self
    }

    /// Wake from IDLE on audio instead of only on [`wake`](Self::wake).
    pub fn with_hotword(mut self, detector: Box<dyn HotwordDetector + Send>) -> Self {
        self.hotword = Some(detector);
        self
    }

    pub fn set_event_callback<F>(&mut self, callback: F)
    where
        F: Fn(&DialogueEvent) + Send + Sync + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    pub fn config(&self) -> &DialogueConfig {
        &self.config
    }

    pub fn state(&self) -> DialogueState {
        self.state
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_paused(&self) -> bool {
        self.handle.is_paused()
    }

    /// A transcription job is running.
    pub fn is_working(&self) -> bool {
        self.job.is_some()
    }

    pub fn last_intent(&self) -> Option<&IntentResult> {
        self.last_intent.as_ref()
    }

    pub fn last_response(&self) -> Option<&CoreResponse> {
        self.last_response.as_ref()
    }

    pub fn handle(&self) -> DialogueHandle {
        self.handle.clone()
    }

    /// Manual trigger: IDLE → LISTENING.
    pub fn wake(&mut self) -> bool {
        if self.finished || self.state != DialogueState::Idle {
            return false;
        }
        self.assembler.reset();
        if let Some(hotword) = self.hotword.as_mut() {
            hotword.reset();
        }
        self.transition(DialogueState::Listening);
        true
    }

    /// Suspend segment ingestion. Buffered audio is kept.
    pub fn pause(&mut self) {
        self.handle.pause();
        tracing::debug!(state = %self.state, "dialogue paused");
    }

    pub fn resume(&mut self) {
        self.handle.resume();
        tracing::debug!(state = %self.state, "dialogue resumed");
    }

    /// Back to IDLE from anywhere. In-flight transcription is asked to stop
    /// and whatever it eventually returns is ignored.
    pub fn cancel(&mut self) {
        self.epoch += 1;
        if let Some(flag) = self.job.take() {
            flag.store(true, Ordering::Release);
        }
        self.pending = None;
        self.validation_deadline = None;
        self.assembler.reset();
        if self.state != DialogueState::Idle {
            tracing::info!(from = %self.state, "dialogue cancelled");
            self.transition(DialogueState::Idle);
        }
    }

    pub fn feed_segment(&mut self, segment: AudioSegment) -> Result<()> {
        self.poll_handle();
        if self.finished || self.is_paused() {
            return Ok(());
        }
        match self.state {
            DialogueState::Idle => {
                let heard = match self.hotword.as_mut() {
                    Some(detector) => detector.detect(&segment),
                    None => false,
                };
                if heard && self.wake() {
                    // The waking segment starts the utterance.
                    self.assembler.feed(segment);
                    self.poll_assembler(JobKind::Command)?;
                }
            }
            DialogueState::Listening => {
                self.assembler.feed(segment);
                self.poll_assembler(JobKind::Command)?;
            }
            DialogueState::IntentValidation if self.job.is_none() => {
                self.assembler.feed(segment);
                self.poll_assembler(JobKind::Confirmation)?;
            }
            _ => tracing::trace!(state = %self.state, "segment ignored"),
        }
        Ok(())
    }

    /// Typed input. Treated as the confirmation answer while one is
    /// expected; otherwise resolved inline, skipping LISTENING.
    pub fn submit_text(&mut self, text: &str) {
        self.step();
        if self.finished {
            return;
        }
        match self.state {
            DialogueState::IntentValidation => {
                self.answer_confirmation(text);
            }
            DialogueState::Idle | DialogueState::Listening => {
                self.assembler.reset();
                self.transition(DialogueState::Processing);
                if text.trim().is_empty() {
                    self.narrate(narration::EMPTY_UTTERANCE);
                    self.transition(DialogueState::Idle);
                    return;
                }
                let context = ResolveContext {
                    previous: self.previous,
                };
                let intent = self.pipeline.resolve_with(text, &context);
                self.on_intent(intent);
            }
            _ => tracing::debug!(state = %self.state, "busy, text input ignored"),
        }
    }

    /// Apply a yes/no answer. `None` when no confirmation is pending.
    ///
    /// A termination ("au revoir") drops the pending intent and ends the
    /// conversation; it is reported as `No`.
    pub fn answer_confirmation(&mut self, text: &str) -> Option<ConfirmationAnswer> {
        if self.state != DialogueState::IntentValidation {
            return None;
        }
        let reply = read_reply(&self.pipeline, text);
        let answer = match &reply {
            Reply::Answer(answer) => *answer,
            Reply::Termination(_) => ConfirmationAnswer::No,
        };
        self.on_reply(reply);
        Some(answer)
    }

    /// Handle control requests, finished jobs and the confirmation timeout.
    /// Never blocks.
    pub fn step(&mut self) {
        self.poll_handle();
        while let Ok(result) = self.results_rx.try_recv() {
            self.accept_result(result);
        }
        self.check_validation_timeout();
    }

    /// Block up to `timeout` for the running job. Returns whether a result
    /// (current or stale) was handled.
    pub fn wait_for_worker(&mut self, timeout: Duration) -> bool {
        match self.results_rx.recv_timeout(timeout) {
            Ok(result) => {
                self.accept_result(result);
                self.step();
                true
            }
            Err(_) => {
                self.step();
                false
            }
        }
    }

    /// Drive the machine from a segment queue until shutdown, the end of the
    /// conversation, or the end of the source.
    pub fn run(&mut self, queue: &SegmentQueue, shutdown: &ShutdownSignal) -> Result<RunOutcome> {
        let tick = self.config.tick();
        tracing::info!(interface = %self.config.interface, "dialogue loop started");
        let outcome = loop {
            if self.finished {
                break RunOutcome::Finished;
            }
            if shutdown.is_triggered() {
                self.cancel();
                break RunOutcome::Shutdown;
            }
            self.step();
            if self.finished {
                continue;
            }
            if self.is_working() {
                self.wait_for_worker(tick);
                continue;
            }
            if self.is_paused() {
                shutdown.wait_timeout(tick);
                continue;
            }
            match queue.pop_timeout(tick) {
                Some(segment) => self.feed_segment(segment)?,
                None if queue.is_finished() => break RunOutcome::SourceExhausted,
                None => {}
            }
        };
        tracing::info!(?outcome, "dialogue loop stopped");
        Ok(outcome)
    }

    fn poll_handle(&mut self) {
        if self.handle.take_cancel() {
            self.cancel();
        }
    }

    fn poll_assembler(&mut self, kind: JobKind) -> Result<()> {
        let AssemblerPoll::Ready(utterance) = self.assembler.poll() else {
            return Ok(());
        };
        if utterance.is_empty() {
            match kind {
                JobKind::Command => {
                    self.narrate(narration::EMPTY_UTTERANCE);
                    self.transition(DialogueState::Idle);
                }
                JobKind::Confirmation => {
                    self.narrate(narration::CONFIRMATION_REPROMPT);
                    self.assembler.reset();
                }
            }
            return Ok(());
        }
        if kind == JobKind::Command {
            self.transition(DialogueState::Processing);
        }
        self.spawn_job(kind, utterance)
    }

    fn spawn_job(&mut self, kind: JobKind, utterance: FinalizedUtterance) -> Result<()> {
        self.epoch += 1;
        let epoch = self.epoch;
        let cancelled = Arc::new(AtomicBool::new(false));
        let transcriber = self.transcriber.clone();
        let pipeline = self.pipeline.clone();
        let context = ResolveContext {
            previous: self.previous,
        };
        let tx = self.results_tx.clone();
        let flag = cancelled.clone();
        tracing::debug!(epoch, ?kind, duration_ms = utterance.duration_ms, "starting transcription job");
        std::thread::Builder::new()
            .name("dialogue-worker".into())
            .spawn(move || {
                let outcome = run_job(kind, &utterance, &transcriber, &pipeline, &context, &flag);
                // The machine may already be gone.
                let _ = tx.send(JobResult { epoch, outcome });
            })
            .map_err(|e| {
                tracing::error!("failed to spawn dialogue worker: {}", e);
                self.transition(DialogueState::Idle);
                DialogueError::Worker(e.to_string())
            })?;
        self.job = Some(cancelled);
        Ok(())
    }

    fn accept_result(&mut self, result: JobResult) {
        if result.epoch != self.epoch || self.job.is_none() {
            tracing::debug!(epoch = result.epoch, current = self.epoch, "discarding stale job result");
            return;
        }
        self.job = None;
        match (self.state, result.outcome) {
            (_, JobOutcome::Cancelled) => {}
            (DialogueState::Processing, JobOutcome::Intent(intent)) => self.on_intent(intent),
            (DialogueState::Processing, JobOutcome::Empty) => {
                self.narrate(narration::EMPTY_UTTERANCE);
                self.transition(DialogueState::Idle);
            }
            (DialogueState::Processing, JobOutcome::Failed(reason)) => {
                tracing::warn!("transcription failed: {}", reason);
                self.narrate(narration::TRANSCRIPTION_FAILED);
                self.transition(DialogueState::Idle);
            }
            (DialogueState::IntentValidation, JobOutcome::Reply(reply)) => self.on_reply(reply),
            (DialogueState::IntentValidation, JobOutcome::Empty | JobOutcome::Failed(_)) => {
                self.narrate(narration::CONFIRMATION_REPROMPT);
                self.assembler.reset();
            }
            (state, outcome) => {
                tracing::warn!(%state, ?outcome, "job result does not fit current state");
            }
        }
    }

    fn on_intent(&mut self, intent: IntentResult) {
        tracing::info!(
            command = %intent.command,
            method = %intent.method,
            confidence = intent.confidence,
            fallback = intent.fallback_used,
            "intent resolved"
        );
        self.emit(&DialogueEvent::IntentResolved(intent.clone()));
        self.last_intent = Some(intent.clone());
        if needs_validation(&intent, self.config.auto_execute_threshold) {
            self.assembler.reset();
            self.validation_deadline = Some(Instant::now() + self.config.confirmation_timeout());
            self.transition(DialogueState::IntentValidation);
            self.narrate(&narration::confirmation_question(&intent));
            self.pending = Some(intent);
        } else {
            self.execute(intent);
        }
    }

    fn on_reply(&mut self, reply: Reply) {
        match reply {
            Reply::Answer(answer) => self.on_answer(answer),
            Reply::Termination(quit) => {
                tracing::info!(confidence = quit.confidence, "termination while awaiting confirmation");
                self.pending = None;
                self.validation_deadline = None;
                self.assembler.reset();
                self.emit(&DialogueEvent::IntentResolved(quit.clone()));
                self.last_intent = Some(quit.clone());
                self.execute(quit);
            }
        }
    }

    fn on_answer(&mut self, answer: ConfirmationAnswer) {
        tracing::debug!(?answer, "confirmation answer");
        match answer {
            ConfirmationAnswer::Yes => {
                self.validation_deadline = None;
                match self.pending.take() {
                    Some(intent) => self.execute(intent),
                    None => self.transition(DialogueState::Idle),
                }
            }
            ConfirmationAnswer::No => self.abandon_validation(),
            ConfirmationAnswer::Unclear => {
                self.narrate(narration::CONFIRMATION_REPROMPT);
                self.assembler.reset();
            }
        }
    }

    fn check_validation_timeout(&mut self) {
        if self.state != DialogueState::IntentValidation {
            return;
        }
        let expired = self
            .validation_deadline
            .is_some_and(|deadline| Instant::now() >= deadline);
        if expired {
            tracing::info!("confirmation timed out");
            self.epoch += 1;
            if let Some(flag) = self.job.take() {
                flag.store(true, Ordering::Release);
            }
            self.abandon_validation();
        }
    }

    fn abandon_validation(&mut self) {
        self.pending = None;
        self.validation_deadline = None;
        self.assembler.reset();
        self.narrate(narration::CANCELLED);
        self.transition(DialogueState::Idle);
    }

    fn execute(&mut self, intent: IntentResult) {
        let command = intent.command;
        self.narrate(narration::announcement(command));
        self.transition(DialogueState::AwaitResponse);

        let request = intent.to_request(self.config.interface, self.session);
        let response = self.dispatcher.dispatch(request);
        self.emit(&DialogueEvent::Response(response.clone()));

        match response.kind {
            ResponseKind::Error => {
                tracing::warn!(command = %command, status = %response.status, "command failed");
                self.narrate(narration::narrate_error(&response));
                self.last_response = Some(response);
                self.transition(DialogueState::Idle);
            }
            ResponseKind::Quit => {
                self.narrate(narration::narrate_error(&response));
                self.last_response = Some(response);
                self.transition(DialogueState::Idle);
                self.finish();
            }
            ResponseKind::Success => {
                self.transition(DialogueState::Speaking);
                let text = narration::completion(command, &response);
                self.narrate(&text);
                let terminal = response.is_terminal();
                if !command.is_terminal() {
                    self.previous = Some(command);
                }
                self.last_response = Some(response);
                self.transition(DialogueState::Idle);
                if terminal {
                    self.finish();
                }
            }
        }
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            tracing::info!("conversation finished");
            self.emit(&DialogueEvent::Finished);
        }
    }

    fn narrate(&mut self, text: &str) {
        self.emit(&DialogueEvent::Narration(text.to_string()));
        if !self.speech.speak(text) {
            tracing::warn!(output = self.speech.name(), "speech output failed");
        }
    }

    fn transition(&mut self, to: DialogueState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        tracing::debug!(%from, %to, "dialogue state");
        self.emit(&DialogueEvent::StateChanged { from, to });
    }

    fn emit(&self, event: &DialogueEvent) {
        if let Some(callback) = &self.callback {
            callback(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use command_core::{CommandExecutor, CoreRequest, ExecutorConfig};
    use intent_parser::PipelineConfig;
    use std::collections::HashMap;
    use voice_local::{
        spawn_capture, MockSpeech, MockTranscriber, ScriptedSource, SpeechOnsetDetector,
        Transcriber, Transcript,
    };

    const SR: u32 = 16000;

    /// Executes through a real executor and remembers every request.
    struct RecordingDispatcher {
        executor: CommandExecutor,
        requests: Mutex<Vec<CoreRequest>>,
    }

    impl RecordingDispatcher {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                executor: CommandExecutor::new(ExecutorConfig::default()).unwrap(),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn commands(&self) -> Vec<String> {
            self.requests.lock().iter().map(|r| r.command.clone()).collect()
        }
    }

    impl Dispatcher for RecordingDispatcher {
        fn dispatch(&self, request: CoreRequest) -> CoreResponse {
            self.requests.lock().push(request.clone());
            self.executor.execute(request)
        }
    }

    struct BrokenDispatcher;

    impl Dispatcher for BrokenDispatcher {
        fn dispatch(&self, _request: CoreRequest) -> CoreResponse {
            CoreResponse::error("execution_failed", "handler.rs:42 index out of bounds")
        }
    }

    struct SlowTranscriber {
        delay: Duration,
        text: String,
    }

    impl Transcriber for SlowTranscriber {
        fn name(&self) -> &str {
            "slow"
        }

        fn transcribe(&mut self, _audio: &FinalizedUtterance) -> voice_local::Result<Option<Transcript>> {
            std::thread::sleep(self.delay);
            Ok(Some(Transcript {
                text: self.text.clone(),
                confidence: 0.9,
                engine: "slow".to_string(),
            }))
        }
    }

    struct Harness {
        machine: DialogueMachine,
        spoken: Arc<Mutex<Vec<String>>>,
        events: Arc<Mutex<Vec<DialogueEvent>>>,
    }

    impl Harness {
        fn states(&self) -> Vec<DialogueState> {
            self.events
                .lock()
                .iter()
                .filter_map(|e| match e {
                    DialogueEvent::StateChanged { to, .. } => Some(*to),
                    _ => None,
                })
                .collect()
        }

        fn last_spoken(&self) -> Option<String> {
            self.spoken.lock().last().cloned()
        }

        fn speak_turn(&mut self) {
            for segment in ScriptedSource::turn(400, 1300, SR) {
                self.machine.feed_segment(segment).unwrap();
            }
        }

        fn settle(&mut self) {
            let deadline = Instant::now() + Duration::from_secs(5);
            while self.machine.is_working() && Instant::now() < deadline {
                self.machine.wait_for_worker(Duration::from_millis(20));
            }
        }
    }

    fn harness_with(
        config: DialogueConfig,
        transcriber: Box<dyn Transcriber + Send>,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Harness {
        let pipeline = Arc::new(IntentPipeline::new(PipelineConfig::default()).unwrap());
        let speech = MockSpeech::new();
        let spoken = speech.spoken();
        let mut machine = DialogueMachine::new(
            config,
            pipeline,
            TranscriberChain::new().with_engine(transcriber),
            Box::new(speech),
            dispatcher,
        )
        .unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        machine.set_event_callback(move |e| sink.lock().push(e.clone()));
        Harness {
            machine,
            spoken,
            events,
        }
    }

    fn harness(texts: &[&str], dispatcher: Arc<dyn Dispatcher>) -> Harness {
        harness_with(
            DialogueConfig::default(),
            Box::new(MockTranscriber::scripted("mock", texts.iter().copied())),
            dispatcher,
        )
    }

    fn intent(method: ResolutionMethod, confidence: f32) -> IntentResult {
        IntentResult {
            command: Command::Time,
            confidence,
            method,
            parameters: HashMap::new(),
            processing_time: Duration::ZERO,
            fallback_used: false,
            ambiguous: false,
            text: "heure".to_string(),
        }
    }

    #[test]
    fn test_auto_execute_threshold_is_locked() {
        assert_eq!(AUTO_EXECUTE_THRESHOLD, 0.85);
        let t = AUTO_EXECUTE_THRESHOLD;
        assert!(!needs_validation(&intent(ResolutionMethod::Pattern, 0.85), t));
        assert!(needs_validation(&intent(ResolutionMethod::Pattern, 0.84), t));
        assert!(!needs_validation(&intent(ResolutionMethod::DirectMatch, 1.0), t));
        assert!(!needs_validation(&intent(ResolutionMethod::Termination, 0.8), t));

        let mut doubtful = intent(ResolutionMethod::Semantic, 0.95);
        doubtful.ambiguous = true;
        assert!(needs_validation(&doubtful, t));
        let mut fallback = intent(ResolutionMethod::Fallback, 0.9);
        fallback.fallback_used = true;
        assert!(needs_validation(&fallback, t));
    }

    #[test]
    fn test_voice_round_trip() {
        let dispatcher = RecordingDispatcher::new();
        let mut h = harness(&["quelle heure est-il"], dispatcher.clone());
        assert!(h.machine.wake());
        h.speak_turn();
        assert_eq!(h.machine.state(), DialogueState::Processing);
        h.settle();

        assert_eq!(h.machine.state(), DialogueState::Idle);
        assert_eq!(
            h.states(),
            vec![
                DialogueState::Listening,
                DialogueState::Processing,
                DialogueState::AwaitResponse,
                DialogueState::Speaking,
                DialogueState::Idle,
            ]
        );
        assert_eq!(dispatcher.commands(), vec!["TIME".to_string()]);
        let spoken = h.spoken.lock().clone();
        assert_eq!(spoken[0], "Je regarde l'heure.");
        assert!(spoken[1].starts_with("Il est "));
        assert!(!h.machine.is_finished());
    }

    #[test]
    fn test_polite_termination_finishes_conversation() {
        let dispatcher = RecordingDispatcher::new();
        let mut h = harness(&["C'est bon merci"], dispatcher.clone());
        h.machine.wake();
        h.speak_turn();
        h.settle();

        assert!(h.machine.is_finished());
        assert!(h.machine.last_response().unwrap().is_terminal());
        assert_eq!(dispatcher.commands(), vec!["QUIT".to_string()]);
        assert!(!h.states().contains(&DialogueState::IntentValidation));
        assert_eq!(h.last_spoken().as_deref(), Some("Au revoir, à bientôt !"));
        assert!(matches!(h.events.lock().last(), Some(DialogueEvent::Finished)));
        assert!(!h.machine.wake());
    }

    #[test]
    fn test_fallback_requires_confirmation() {
        let dispatcher = RecordingDispatcher::new();
        let mut h = harness(&[], dispatcher.clone());
        h.machine.submit_text("raconte-moi une histoire de pirates");
        assert_eq!(h.machine.state(), DialogueState::IntentValidation);
        assert!(dispatcher.commands().is_empty());
        assert!(h.last_spoken().unwrap().contains("histoire de pirates"));

        assert_eq!(h.machine.answer_confirmation("hmm"), Some(ConfirmationAnswer::Unclear));
        assert_eq!(h.machine.state(), DialogueState::IntentValidation);

        assert_eq!(h.machine.answer_confirmation("oui"), Some(ConfirmationAnswer::Yes));
        assert_eq!(h.machine.state(), DialogueState::Idle);
        assert_eq!(dispatcher.commands(), vec!["PROMPT".to_string()]);
        assert!(h.machine.last_response().unwrap().is_success());
    }

    #[test]
    fn test_refused_confirmation_does_not_dispatch() {
        let dispatcher = RecordingDispatcher::new();
        let mut h = harness(&[], dispatcher.clone());
        h.machine.submit_text("raconte-moi une histoire de pirates");
        h.machine.submit_text("non merci");
        assert_eq!(h.machine.state(), DialogueState::Idle);
        assert!(dispatcher.commands().is_empty());
        assert_eq!(h.last_spoken().as_deref(), Some(narration::CANCELLED));
        assert_eq!(h.machine.answer_confirmation("oui"), None);
    }

    #[test]
    fn test_goodbye_during_confirmation_ends_conversation() {
        let dispatcher = RecordingDispatcher::new();
        let mut h = harness(&[], dispatcher.clone());
        h.machine.submit_text("raconte-moi une histoire de pirates");
        assert_eq!(h.machine.state(), DialogueState::IntentValidation);

        assert_eq!(h.machine.answer_confirmation("au revoir"), Some(ConfirmationAnswer::No));
        assert!(h.machine.is_finished());
        assert_eq!(dispatcher.commands(), vec!["QUIT".to_string()]);
        assert_eq!(h.machine.last_intent().unwrap().command, Command::Quit);
        assert!(h.machine.last_response().unwrap().is_terminal());
    }

    #[test]
    fn test_spoken_stop_during_confirmation_ends_conversation() {
        let dispatcher = RecordingDispatcher::new();
        let mut h = harness(
            &[
                "raconte-moi une histoire de pirates",
                "c'est bon merci, tu peux t'arrêter",
            ],
            dispatcher.clone(),
        );
        h.machine.wake();
        h.speak_turn();
        h.settle();
        assert_eq!(h.machine.state(), DialogueState::IntentValidation);

        h.speak_turn();
        h.settle();
        assert!(h.machine.is_finished());
        assert_eq!(dispatcher.commands(), vec!["QUIT".to_string()]);
    }

    #[test]
    fn test_spoken_confirmation() {
        let dispatcher = RecordingDispatcher::new();
        let mut h = harness(&["raconte-moi une histoire de pirates", "oui vas-y"], dispatcher.clone());
        h.machine.wake();
        h.speak_turn();
        h.settle();
        assert_eq!(h.machine.state(), DialogueState::IntentValidation);

        h.speak_turn();
        h.settle();
        assert_eq!(h.machine.state(), DialogueState::Idle);
        assert_eq!(dispatcher.commands(), vec!["PROMPT".to_string()]);
    }

    #[test]
    fn test_confirmation_timeout_counts_as_no() {
        let dispatcher = RecordingDispatcher::new();
        let config = DialogueConfig {
            confirmation_timeout_ms: 30,
            ..DialogueConfig::default()
        };
        let mut h = harness_with(
            config,
            Box::new(MockTranscriber::scripted("mock", Vec::<String>::new())),
            dispatcher.clone(),
        );
        h.machine.submit_text("raconte-moi une histoire de pirates");
        assert_eq!(h.machine.state(), DialogueState::IntentValidation);
        std::thread::sleep(Duration::from_millis(60));
        h.machine.step();
        assert_eq!(h.machine.state(), DialogueState::Idle);
        assert_eq!(h.last_spoken().as_deref(), Some(narration::CANCELLED));
        assert!(dispatcher.commands().is_empty());
    }

    #[test]
    fn test_cancel_discards_late_result() {
        let dispatcher = RecordingDispatcher::new();
        let mut h = harness_with(
            DialogueConfig::default(),
            Box::new(SlowTranscriber {
                delay: Duration::from_millis(150),
                text: "aide".to_string(),
            }),
            dispatcher.clone(),
        );
        h.machine.wake();
        h.speak_turn();
        assert_eq!(h.machine.state(), DialogueState::Processing);

        h.machine.handle().cancel();
        h.machine.step();
        assert_eq!(h.machine.state(), DialogueState::Idle);
        assert!(!h.machine.is_working());

        std::thread::sleep(Duration::from_millis(300));
        h.machine.step();
        assert_eq!(h.machine.state(), DialogueState::Idle);
        assert!(dispatcher.commands().is_empty());
        assert!(h.machine.last_intent().is_none());
    }

    #[test]
    fn test_transcription_failure_apologizes() {
        let dispatcher = RecordingDispatcher::new();
        let mut h = harness_with(
            DialogueConfig::default(),
            Box::new(MockTranscriber::failing("broken")),
            dispatcher.clone(),
        );
        h.machine.wake();
        h.speak_turn();
        h.settle();
        assert_eq!(h.machine.state(), DialogueState::Idle);
        assert_eq!(h.last_spoken().as_deref(), Some(narration::TRANSCRIPTION_FAILED));
        assert!(!h.states().contains(&DialogueState::IntentValidation));
        assert!(dispatcher.commands().is_empty());
    }

    #[test]
    fn test_silence_only_returns_to_idle() {
        let mut h = harness(&["jamais"], RecordingDispatcher::new());
        h.machine.wake();
        for _ in 0..13 {
            h.machine
                .feed_segment(AudioSegment::silence(100, SR))
                .unwrap();
        }
        assert_eq!(h.machine.state(), DialogueState::Idle);
        assert!(!h.machine.is_working());
        assert_eq!(h.last_spoken().as_deref(), Some(narration::EMPTY_UTTERANCE));
    }

    #[test]
    fn test_dispatch_error_never_speaks_raw_message() {
        let mut h = harness(&[], Arc::new(BrokenDispatcher));
        h.machine.submit_text("aide");
        assert_eq!(h.machine.state(), DialogueState::Idle);
        assert!(!h.states().contains(&DialogueState::Speaking));
        let spoken = h.spoken.lock().clone();
        assert!(spoken.iter().all(|s| !s.contains("handler.rs")));
        assert_eq!(h.last_spoken().as_deref(), Some("Désolé, l'exécution a échoué."));
    }

    #[test]
    fn test_pause_suspends_ingestion() {
        let dispatcher = RecordingDispatcher::new();
        let mut h = harness(&["aide"], dispatcher.clone());
        h.machine.wake();
        h.machine.pause();
        h.speak_turn();
        assert_eq!(h.machine.state(), DialogueState::Listening);
        assert!(!h.machine.is_working());

        h.machine.resume();
        h.speak_turn();
        h.settle();
        assert_eq!(dispatcher.commands(), vec!["HELP".to_string()]);
    }

    #[test]
    fn test_hotword_wakes_machine() {
        let pipeline = Arc::new(IntentPipeline::new(PipelineConfig::default()).unwrap());
        let mut machine = DialogueMachine::new(
            DialogueConfig::default(),
            pipeline,
            TranscriberChain::new(),
            Box::new(MockSpeech::new()),
            RecordingDispatcher::new(),
        )
        .unwrap()
        .with_hotword(Box::new(SpeechOnsetDetector));
        machine.feed_segment(AudioSegment::silence(100, SR)).unwrap();
        assert_eq!(machine.state(), DialogueState::Idle);
        machine.feed_segment(AudioSegment::speech(100, SR)).unwrap();
        assert_eq!(machine.state(), DialogueState::Listening);
    }

    #[test]
    fn test_repeat_uses_previous_command() {
        let dispatcher = RecordingDispatcher::new();
        let mut h = harness(&[], dispatcher.clone());
        h.machine.submit_text("version");
        h.machine.submit_text("encore");
        assert_eq!(
            dispatcher.commands(),
            vec!["VERSION".to_string(), "VERSION".to_string()]
        );
    }

    #[test]
    fn test_run_loop_ends_on_quit() {
        let dispatcher = RecordingDispatcher::new();
        let pipeline = Arc::new(IntentPipeline::new(PipelineConfig::default()).unwrap());
        let mut machine = DialogueMachine::new(
            DialogueConfig::default(),
            pipeline,
            TranscriberChain::new().with_engine(Box::new(MockTranscriber::scripted(
                "mock",
                ["au revoir"],
            ))),
            Box::new(MockSpeech::new()),
            dispatcher.clone(),
        )
        .unwrap()
        .with_hotword(Box::new(SpeechOnsetDetector));

        let queue = SegmentQueue::new(256);
        let mut script = vec![AudioSegment::silence(100, SR); 3];
        script.extend(ScriptedSource::turn(400, 1300, SR));
        let capture = spawn_capture(ScriptedSource::new(script), queue.clone()).unwrap();

        let outcome = machine.run(&queue, &ShutdownSignal::new()).unwrap();
        assert_eq!(outcome, RunOutcome::Finished);
        assert_eq!(dispatcher.commands(), vec!["QUIT".to_string()]);
        capture.join();
    }

    #[test]
    fn test_run_loop_stops_on_shutdown_or_exhaustion() {
        let mut h = harness(&[], RecordingDispatcher::new());
        let queue = SegmentQueue::new(8);
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();
        assert_eq!(h.machine.run(&queue, &shutdown).unwrap(), RunOutcome::Shutdown);

        queue.close();
        assert_eq!(
            h.machine.run(&queue, &ShutdownSignal::new()).unwrap(),
            RunOutcome::SourceExhausted
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = DialogueConfig {
            auto_execute_threshold: 0.0,
            ..DialogueConfig::default()
        };
        let pipeline = Arc::new(IntentPipeline::new(PipelineConfig::default()).unwrap());
        let res = DialogueMachine::new(
            config,
            pipeline,
            TranscriberChain::new(),
            Box::new(MockSpeech::new()),
            RecordingDispatcher::new(),
        );
        assert!(matches!(res, Err(DialogueError::InvalidConfig(_))));
    }
}

//! **Voice Interaction Coordinator** — the single owner of the interaction
//! state machine.
//!
//! All mutable state lives inside one spawned task that drains one queue of
//! messages: user commands, leaf events, and timer firings. Leaf callbacks
//! arrive on arbitrary tasks and are marshaled into this queue by pump tasks;
//! nothing mutates coordinator state from outside the loop. Two callbacks can
//! therefore never race on [`InteractionState`].
//!
//! Every command issued to a leaf carries a monotonically increasing
//! [`RequestToken`]; leaf events echo it, and the loop discards any event
//! whose token does not match the current in-flight token. Cancellation is:
//! invalidate the token synchronously, send best-effort stop/cancel to the
//! leaf, ignore whatever arrives late.

use crate::error::{
    ConfigError, CoordinatorError, ErrorClass, GenerationError, GuidanceResult, InteractionError,
    RecognitionError, SynthesisError,
};
use crate::fallback::FallbackResponder;
use crate::prefs::{PlaybackPreferences, PreferenceStore};
use crate::recognizer::{RecognizerEngine, RecognizerEvent};
use crate::responder::Responder;
use crate::response::{
    EmergencyCategory, GuidanceResponse, RequestToken, RequiredAction, TranscriptEvent,
    TranscriptKind,
};
use crate::synthesizer::{SynthesizerEngine, SynthesizerEvent, Utterance};
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

/// Why the coordinator is in [`InteractionState::Failed`].
#[derive(Debug, Clone, PartialEq)]
pub struct FailureReason {
    pub error: InteractionError,
    /// Recoverable failures auto-clear to idle after the configured delay;
    /// the rest stay failed until a user command.
    pub recoverable: bool,
}

/// The one observable interaction lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionState {
    Idle,
    Listening,
    Processing,
    Speaking,
    /// Bringing up continuous conversation mode.
    Connecting,
    /// Continuous conversation mode: listen → process → speak → listen,
    /// without returning to idle between turns.
    LiveActive,
    Failed(FailureReason),
}

impl InteractionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Processing => "processing",
            Self::Speaking => "speaking",
            Self::Connecting => "connecting",
            Self::LiveActive => "live_active",
            Self::Failed(_) => "failed",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Per-leaf readiness, computed once at initialization and updated only by
/// explicit re-probe. The coordinator never commands a leaf whose bit is
/// false; it routes around it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubsystemHealth {
    pub recognizer_ready: bool,
    pub synthesizer_ready: bool,
    pub responder_ready: bool,
}

impl SubsystemHealth {
    /// Minimum viable readiness: voice input or voice output, one is enough.
    pub fn minimum_viable(&self) -> bool {
        self.recognizer_ready || self.synthesizer_ready
    }
}

/// Coordinator timing knobs.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Watchdog for a recognition session that emits neither final nor error.
    pub recognition_timeout: Duration,
    /// Hard ceiling on a processing cycle, independent of the responder's own
    /// timeout. Past it, the cycle is answered from the fallback table and
    /// the primary's late result is discarded.
    pub processing_ceiling: Duration,
    /// Delay before a recoverable failure auto-clears to idle.
    pub failure_recovery_delay: Duration,
    /// Locale used for the single automatic retry after
    /// `SynthesisError::LanguageUnsupported`.
    pub language_fallback: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            recognition_timeout: Duration::from_secs(30),
            processing_ceiling: Duration::from_secs(10),
            failure_recovery_delay: Duration::from_millis(2500),
            language_fallback: "en-US".to_string(),
        }
    }
}

/// The three leaves plus the offline fallback, injected at construction.
pub struct Subsystems {
    pub recognizer: Arc<dyn RecognizerEngine>,
    pub synthesizer: Arc<dyn SynthesizerEngine>,
    /// `None` when no credential is configured: permanent-fallback mode.
    pub responder: Option<Arc<dyn Responder>>,
    pub fallback: FallbackResponder,
}

/// A classified, human-readable error as published on the event stream.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub message: String,
    pub class: ErrorClass,
    pub error: InteractionError,
    pub timestamp: DateTime<Utc>,
}

/// Events published to consumers alongside the state watch channel.
#[derive(Debug, Clone)]
pub enum CoordinatorEvent {
    Transcript(TranscriptEvent),
    Response(GuidanceResponse),
    /// Side-channel action request (never a state).
    ActionRequired(RequiredAction),
    Error(ErrorReport),
}

#[derive(Debug)]
enum Command {
    StartListening,
    StopListening,
    StopSpeaking,
    Shortcut(EmergencyCategory),
    StartLiveMode,
    ExitLiveMode,
    Reprobe,
    Shutdown,
}

#[derive(Debug)]
enum Msg {
    Command(Command),
    Recognizer(RecognizerEvent),
    Synthesizer(SynthesizerEvent),
    Generated {
        token: RequestToken,
        result: Result<GuidanceResponse, GenerationError>,
    },
    ProcessingCeiling { token: RequestToken },
    RecognitionDeadline { session: RequestToken },
    RecoveryElapsed { epoch: u64 },
}

/// Entry point: probe the leaves, spawn the serialized loop.
pub struct Coordinator;

impl Coordinator {
    /// Initialize and spawn the coordinator. Must run inside a tokio runtime.
    ///
    /// Initialization succeeds as long as the recognizer *or* the synthesizer
    /// is ready. A missing responder degrades to permanent-fallback mode and
    /// is not an error. If neither voice leaf is ready, this fails with
    /// [`ConfigError::NoSubsystemsAvailable`] and nothing is spawned —
    /// commands against a never-built handle cannot be silently queued.
    pub fn spawn(
        config: CoordinatorConfig,
        subsystems: Subsystems,
        prefs: PreferenceStore,
    ) -> Result<CoordinatorHandle, ConfigError> {
        let Subsystems {
            recognizer,
            synthesizer,
            responder,
            fallback,
        } = subsystems;

        let health = SubsystemHealth {
            recognizer_ready: recognizer.probe(),
            synthesizer_ready: synthesizer.probe(),
            responder_ready: responder.is_some(),
        };
        if !health.minimum_viable() {
            error!("initialization failed: recognizer and synthesizer both unready");
            return Err(ConfigError::NoSubsystemsAvailable);
        }
        if !health.responder_ready {
            info!("🛟 no responder credential — guidance will come from the offline table");
        }
        if !health.recognizer_ready {
            warn!("recognizer unready — voice input disabled, shortcuts still work");
        }
        if !health.synthesizer_ready {
            warn!("synthesizer unready — guidance will not be spoken");
        }

        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(InteractionState::Idle);
        let (events_tx, _keepalive) = broadcast::channel(64);
        let (rec_tx, mut rec_rx) = mpsc::unbounded_channel();
        let (syn_tx, mut syn_rx) = mpsc::unbounded_channel();

        // Pump tasks: leaf callbacks land here and are marshaled into the
        // serialized queue, never touching state directly.
        let pump = msg_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = rec_rx.recv().await {
                if pump.send(Msg::Recognizer(event)).is_err() {
                    break;
                }
            }
        });
        let pump = msg_tx.clone();
        tokio::spawn(async move {
            while let Some(event) = syn_rx.recv().await {
                if pump.send(Msg::Synthesizer(event)).is_err() {
                    break;
                }
            }
        });

        let prefs = Arc::new(prefs);
        let shared_health = Arc::new(RwLock::new(health));
        let task = CoordinatorTask {
            config,
            recognizer,
            synthesizer,
            responder,
            fallback,
            prefs: Arc::clone(&prefs),
            health,
            shared_health: Arc::clone(&shared_health),
            state_tx,
            events_tx: events_tx.clone(),
            msg_tx: msg_tx.clone(),
            rec_tx,
            syn_tx,
            next_token: RequestToken::ZERO,
            listening: None,
            speaking: None,
            processing: None,
            live_mode: false,
            failure_epoch: 0,
        };
        tokio::spawn(task.run(msg_rx));
        info!("✅ voice interaction coordinator initialized");

        Ok(CoordinatorHandle {
            msg_tx,
            state_rx,
            events_tx,
            health: shared_health,
            prefs,
        })
    }
}

/// Cheap-to-clone handle: imperative commands in, observable streams out.
#[derive(Clone)]
pub struct CoordinatorHandle {
    msg_tx: mpsc::UnboundedSender<Msg>,
    state_rx: watch::Receiver<InteractionState>,
    events_tx: broadcast::Sender<CoordinatorEvent>,
    health: Arc<RwLock<SubsystemHealth>>,
    prefs: Arc<PreferenceStore>,
}

impl CoordinatorHandle {
    /// Current state snapshot.
    pub fn state(&self) -> InteractionState {
        self.state_rx.borrow().clone()
    }

    /// Observable state stream.
    pub fn watch_state(&self) -> watch::Receiver<InteractionState> {
        self.state_rx.clone()
    }

    /// Observable transcript / response / action / error stream.
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinatorEvent> {
        self.events_tx.subscribe()
    }

    pub fn health(&self) -> SubsystemHealth {
        self.health.read().map(|guard| *guard).unwrap_or_default()
    }

    pub fn is_responder_online(&self) -> bool {
        self.health().responder_ready
    }

    pub fn preferences(&self) -> PlaybackPreferences {
        self.prefs.snapshot()
    }

    /// Replace playback preferences. Takes effect at the next speak command;
    /// an in-flight utterance keeps its snapshot.
    pub fn update_preferences(&self, prefs: PlaybackPreferences) {
        self.prefs.update(prefs);
    }

    pub fn start_listening(&self) -> GuidanceResult<()> {
        self.send(Command::StartListening)
    }

    pub fn stop_listening(&self) -> GuidanceResult<()> {
        self.send(Command::StopListening)
    }

    pub fn stop_speaking(&self) -> GuidanceResult<()> {
        self.send(Command::StopSpeaking)
    }

    /// Bypass recognition: trigger processing with a synthetic transcript for
    /// a fixed emergency category.
    pub fn shortcut(&self, category: EmergencyCategory) -> GuidanceResult<()> {
        self.send(Command::Shortcut(category))
    }

    pub fn start_live_mode(&self) -> GuidanceResult<()> {
        self.send(Command::StartLiveMode)
    }

    /// Cancel all in-flight subsystem commands, clear the current transcript
    /// and response, return to idle.
    pub fn exit_live_mode(&self) -> GuidanceResult<()> {
        self.send(Command::ExitLiveMode)
    }

    /// Re-probe subsystem readiness.
    pub fn reprobe(&self) -> GuidanceResult<()> {
        self.send(Command::Reprobe)
    }

    pub fn shutdown(&self) -> GuidanceResult<()> {
        self.send(Command::Shutdown)
    }

    fn send(&self, command: Command) -> GuidanceResult<()> {
        self.msg_tx
            .send(Msg::Command(command))
            .map_err(|_| CoordinatorError::ShuttingDown)
    }
}

struct SpeakingCycle {
    token: RequestToken,
    text: String,
    language_retried: bool,
}

struct ProcessingCycle {
    token: RequestToken,
    prompt: String,
    category: Option<EmergencyCategory>,
}

struct CoordinatorTask {
    config: CoordinatorConfig,
    recognizer: Arc<dyn RecognizerEngine>,
    synthesizer: Arc<dyn SynthesizerEngine>,
    responder: Option<Arc<dyn Responder>>,
    fallback: FallbackResponder,
    prefs: Arc<PreferenceStore>,
    health: SubsystemHealth,
    shared_health: Arc<RwLock<SubsystemHealth>>,
    state_tx: watch::Sender<InteractionState>,
    events_tx: broadcast::Sender<CoordinatorEvent>,
    msg_tx: mpsc::UnboundedSender<Msg>,
    rec_tx: mpsc::UnboundedSender<RecognizerEvent>,
    syn_tx: mpsc::UnboundedSender<SynthesizerEvent>,
    next_token: RequestToken,
    /// Token of the in-flight recognition session, if any.
    listening: Option<RequestToken>,
    speaking: Option<SpeakingCycle>,
    processing: Option<ProcessingCycle>,
    live_mode: bool,
    /// Guards stale recovery timers after the failure they were armed for.
    failure_epoch: u64,
}

impl CoordinatorTask {
    async fn run(mut self, mut msg_rx: mpsc::UnboundedReceiver<Msg>) {
        debug!("coordinator loop running");
        while let Some(msg) = msg_rx.recv().await {
            if let Msg::Command(Command::Shutdown) = msg {
                info!("🛑 coordinator shutting down");
                self.cancel_all("shutdown");
                break;
            }
            self.handle(msg);
        }
        debug!("coordinator loop ended");
    }

    fn handle(&mut self, msg: Msg) {
        match msg {
            Msg::Command(command) => self.handle_command(command),
            Msg::Recognizer(event) => self.handle_recognizer(event),
            Msg::Synthesizer(event) => self.handle_synthesizer(event),
            Msg::Generated { token, result } => self.handle_generated(token, result),
            Msg::ProcessingCeiling { token } => self.handle_ceiling(token),
            Msg::RecognitionDeadline { session } => self.handle_deadline(session),
            Msg::RecoveryElapsed { epoch } => self.handle_recovery(epoch),
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::StartListening => self.start_listening(false),
            Command::StopListening => self.stop_listening(),
            Command::StopSpeaking => self.stop_speaking(),
            Command::Shortcut(category) => self.handle_shortcut(category),
            Command::StartLiveMode => self.start_live_mode(),
            Command::ExitLiveMode => self.exit_live_mode(),
            Command::Reprobe => self.reprobe(),
            Command::Shutdown => unreachable!("handled in the run loop"),
        }
    }

    // ---- state plumbing ----------------------------------------------------

    fn state(&self) -> InteractionState {
        self.state_tx.borrow().clone()
    }

    fn set_state(&mut self, next: InteractionState) {
        if *self.state_tx.borrow() == next {
            return;
        }
        debug!(to = next.as_str(), "state transition");
        self.state_tx.send_replace(next);
    }

    /// State change for the common cycle. In live mode the published state
    /// stays `LiveActive` through the internal listen/process/speak phases.
    fn cycle_state(&mut self, next: InteractionState) {
        if self.live_mode {
            return;
        }
        self.set_state(next);
    }

    fn publish(&self, event: CoordinatorEvent) {
        // Send fails only when no consumer is subscribed; that is fine.
        let _ = self.events_tx.send(event);
    }

    fn publish_error(&self, error: InteractionError) {
        let report = ErrorReport {
            message: error.to_string(),
            class: error.class(),
            error,
            timestamp: Utc::now(),
        };
        match report.class {
            ErrorClass::Transient => warn!("transient failure: {}", report.message),
            ErrorClass::Blocking => error!("blocking failure: {}", report.message),
        }
        self.publish(CoordinatorEvent::Error(report));
    }

    fn next_token(&mut self) -> RequestToken {
        self.next_token = self.next_token.next();
        self.next_token
    }

    // ---- commands ----------------------------------------------------------

    fn start_listening(&mut self, rearm: bool) {
        match self.state() {
            InteractionState::Listening => {
                if !rearm {
                    warn!("start_listening ignored: already listening");
                }
                return;
            }
            InteractionState::Connecting | InteractionState::LiveActive if !rearm => {
                warn!("start_listening ignored: live mode owns recognition");
                return;
            }
            InteractionState::Speaking => self.halt_speaking(),
            InteractionState::Processing => self.abandon_processing("superseded by listening"),
            _ => {}
        }
        // A queued utterance can outlive its Speaking state (e.g. after a
        // recoverable failure); never talk over a new listening session.
        self.halt_speaking();

        if !self.health.recognizer_ready {
            self.publish_error(
                RecognitionError::AudioHardware("speech recognizer unavailable".to_string()).into(),
            );
            return;
        }

        let session = self.next_token();
        self.listening = Some(session);
        if let Err(error) = self.recognizer.start(session, self.rec_tx.clone()) {
            self.listening = None;
            self.enter_failure(error.into());
            return;
        }
        debug!(%session, "recognition session started");
        self.cycle_state(InteractionState::Listening);
        self.arm_recognition_deadline(session);
    }

    fn stop_listening(&mut self) {
        match self.state() {
            InteractionState::Listening => {}
            InteractionState::Connecting | InteractionState::LiveActive => {
                debug!("stop_listening ignored in live mode (use exit_live_mode)");
                return;
            }
            // Idle included: no state change, no command to the recognizer.
            _ => {
                debug!("stop_listening ignored: not listening");
                return;
            }
        }
        // Invalidate the session first: anything the engine still emits for
        // it is stale by the time it reaches the loop.
        if self.listening.take().is_some() {
            self.recognizer.stop();
        }
        self.set_state(InteractionState::Idle);
    }

    fn stop_speaking(&mut self) {
        if self.speaking.is_none() {
            debug!("stop_speaking ignored: nothing speaking");
            return;
        }
        self.halt_speaking();
        if self.live_mode {
            self.start_listening(true);
        } else {
            self.set_state(InteractionState::Idle);
        }
    }

    fn handle_shortcut(&mut self, category: EmergencyCategory) {
        info!(category = category.as_str(), "🚨 emergency shortcut");
        // Shortcut preempts whatever is in flight.
        if self.listening.take().is_some() {
            self.recognizer.cancel();
        }
        self.halt_speaking();
        self.abandon_processing("superseded by shortcut");

        let session = self.next_token();
        let transcript = category.synthetic_transcript().to_string();
        self.publish(CoordinatorEvent::Transcript(TranscriptEvent {
            text: transcript.clone(),
            kind: TranscriptKind::Final,
            session,
            timestamp: Utc::now(),
        }));
        self.begin_processing(transcript, Some(category));
    }

    fn start_live_mode(&mut self) {
        if self.live_mode {
            warn!("start_live_mode ignored: already live");
            return;
        }
        match self.state() {
            InteractionState::Idle | InteractionState::Failed(_) => {}
            other => {
                warn!(state = other.as_str(), "start_live_mode ignored: busy");
                return;
            }
        }
        if !self.health.recognizer_ready {
            self.publish_error(
                RecognitionError::AudioHardware("speech recognizer unavailable".to_string()).into(),
            );
            return;
        }

        info!("📡 entering live conversation mode");
        self.set_state(InteractionState::Connecting);
        let session = self.next_token();
        self.listening = Some(session);
        if let Err(error) = self.recognizer.start(session, self.rec_tx.clone()) {
            self.listening = None;
            self.enter_failure(error.into());
            return;
        }
        self.live_mode = true;
        self.set_state(InteractionState::LiveActive);
        self.arm_recognition_deadline(session);
    }

    fn exit_live_mode(&mut self) {
        info!("exiting emergency/live mode");
        self.cancel_all("exit live mode");
        self.live_mode = false;
        self.set_state(InteractionState::Idle);
    }

    fn reprobe(&mut self) {
        let health = SubsystemHealth {
            recognizer_ready: self.recognizer.probe(),
            synthesizer_ready: self.synthesizer.probe(),
            responder_ready: self.responder.is_some(),
        };
        info!(?health, "subsystem re-probe");
        self.health = health;
        if let Ok(mut guard) = self.shared_health.write() {
            *guard = health;
        }
    }

    // ---- recognition -------------------------------------------------------

    fn handle_recognizer(&mut self, event: RecognizerEvent) {
        let Some(session) = self.listening else {
            debug!(token = %event.session(), "discarding recognizer event: no session");
            return;
        };
        if event.session() != session {
            debug!(token = %event.session(), current = %session, "discarding stale recognizer event");
            return;
        }
        match event {
            RecognizerEvent::Ready { .. } => debug!(%session, "recognizer capturing"),
            RecognizerEvent::Partial { text, .. } => {
                self.publish(CoordinatorEvent::Transcript(TranscriptEvent {
                    text,
                    kind: TranscriptKind::Partial,
                    session,
                    timestamp: Utc::now(),
                }));
            }
            RecognizerEvent::Final { text, .. } => {
                self.listening = None;
                let text = text.trim().to_string();
                if text.is_empty() {
                    self.enter_failure(RecognitionError::NoSpeechDetected.into());
                    return;
                }
                info!(chars = text.len(), "final transcript");
                self.publish(CoordinatorEvent::Transcript(TranscriptEvent {
                    text: text.clone(),
                    kind: TranscriptKind::Final,
                    session,
                    timestamp: Utc::now(),
                }));
                self.begin_processing(text, None);
            }
            RecognizerEvent::Error { error, .. } => {
                self.listening = None;
                self.enter_failure(error.into());
            }
        }
    }

    fn arm_recognition_deadline(&self, session: RequestToken) {
        let deadline = self.config.recognition_timeout;
        let msg_tx = self.msg_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            let _ = msg_tx.send(Msg::RecognitionDeadline { session });
        });
    }

    fn handle_deadline(&mut self, session: RequestToken) {
        if self.listening != Some(session) {
            return;
        }
        warn!(%session, "recognizer emitted neither final nor error; imposing timeout");
        self.listening = None;
        self.recognizer.cancel();
        self.enter_failure(RecognitionError::Timeout.into());
    }

    // ---- processing --------------------------------------------------------

    fn begin_processing(&mut self, prompt: String, category: Option<EmergencyCategory>) {
        let token = self.next_token();
        self.processing = Some(ProcessingCycle {
            token,
            prompt: prompt.clone(),
            category,
        });
        self.cycle_state(InteractionState::Processing);

        let use_cloud = self.health.responder_ready && !self.prefs.snapshot().offline_only;
        let responder = if use_cloud { self.responder.clone() } else { None };
        match responder {
            Some(responder) => {
                let msg_tx = self.msg_tx.clone();
                tokio::spawn(async move {
                    let result = responder.generate(&prompt).await;
                    let _ = msg_tx.send(Msg::Generated { token, result });
                });
                let ceiling = self.config.processing_ceiling;
                let msg_tx = self.msg_tx.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(ceiling).await;
                    let _ = msg_tx.send(Msg::ProcessingCeiling { token });
                });
            }
            None => {
                let response = self.fallback_for_cycle();
                self.finish_processing(response);
            }
        }
    }

    fn handle_generated(
        &mut self,
        token: RequestToken,
        result: Result<GuidanceResponse, GenerationError>,
    ) {
        let Some(cycle) = self.processing.as_ref() else {
            debug!(%token, "discarding late generation result: no cycle");
            return;
        };
        if cycle.token != token {
            debug!(%token, current = %cycle.token, "discarding stale generation result");
            return;
        }
        match result {
            Ok(response) => self.finish_processing(response),
            Err(error) => {
                // Generation failures are never user-visible; the fallback
                // table answers instead.
                warn!(%error, "responder failed; answering offline");
                let response = self.fallback_for_cycle();
                self.finish_processing(response);
            }
        }
    }

    fn handle_ceiling(&mut self, token: RequestToken) {
        let Some(cycle) = self.processing.as_ref() else {
            return;
        };
        if cycle.token != token {
            return;
        }
        warn!(%token, "processing ceiling reached; abandoning primary responder");
        let response = self.fallback_for_cycle();
        self.finish_processing(response);
    }

    fn fallback_for_cycle(&self) -> GuidanceResponse {
        match self.processing.as_ref() {
            Some(cycle) => match cycle.category {
                Some(category) => self.fallback.respond_category(category),
                None => self.fallback.respond(&cycle.prompt),
            },
            None => self.fallback.respond(""),
        }
    }

    fn finish_processing(&mut self, response: GuidanceResponse) {
        self.processing = None;
        if let Some(ref action) = response.required_action {
            self.publish(CoordinatorEvent::ActionRequired(action.clone()));
        }
        let text = response.text.clone();
        self.publish(CoordinatorEvent::Response(response));

        let prefs = self.prefs.snapshot();
        if prefs.enabled && prefs.auto_speak && self.health.synthesizer_ready {
            self.issue_speak(text, prefs, false);
        } else {
            self.after_cycle();
        }
    }

    fn abandon_processing(&mut self, reason: &str) {
        if self.processing.take().is_some() {
            debug!(reason, "processing cycle abandoned");
        }
    }

    /// End of a guidance cycle: idle in the common flow, re-armed listening
    /// in live mode.
    fn after_cycle(&mut self) {
        if self.live_mode {
            self.start_listening(true);
        } else {
            self.set_state(InteractionState::Idle);
        }
    }

    // ---- speaking ----------------------------------------------------------

    fn issue_speak(&mut self, text: String, prefs: PlaybackPreferences, language_retried: bool) {
        let token = self.next_token();
        self.speaking = Some(SpeakingCycle {
            token,
            text: text.clone(),
            language_retried,
        });
        let utterance = Utterance { token, text, prefs };
        if let Err(error) = self.synthesizer.speak(utterance, self.syn_tx.clone()) {
            self.speaking = None;
            self.enter_failure(error.into());
            return;
        }
        debug!(%token, "utterance issued");
        self.cycle_state(InteractionState::Speaking);
    }

    fn handle_synthesizer(&mut self, event: SynthesizerEvent) {
        let Some(current) = self.speaking.as_ref().map(|cycle| cycle.token) else {
            debug!(token = %event.token(), "discarding synthesizer event: no utterance");
            return;
        };
        if event.token() != current {
            debug!(token = %event.token(), current = %current, "discarding stale synthesizer event");
            return;
        }
        match event {
            SynthesizerEvent::Started { .. } => debug!(%current, "utterance started"),
            SynthesizerEvent::Done { .. } => {
                debug!(%current, "utterance finished");
                self.speaking = None;
                self.after_cycle();
            }
            SynthesizerEvent::Error { error, .. } => {
                if let Some(cycle) = self.speaking.take() {
                    if matches!(error, SynthesisError::LanguageUnsupported(_))
                        && !cycle.language_retried
                    {
                        warn!(%error, locale = %self.config.language_fallback,
                            "retrying utterance with default locale");
                        let mut prefs = self.prefs.snapshot();
                        prefs.language = self.config.language_fallback.clone();
                        self.issue_speak(cycle.text, prefs, true);
                        return;
                    }
                }
                self.enter_failure(error.into());
            }
        }
    }

    /// Stop the active utterance, exactly one `stop` per active utterance.
    fn halt_speaking(&mut self) {
        if self.speaking.take().is_some() {
            self.synthesizer.stop();
        }
    }

    // ---- failure & recovery ------------------------------------------------

    fn enter_failure(&mut self, error: InteractionError) {
        let recoverable = error.is_recoverable();
        self.publish_error(error.clone());
        self.set_state(InteractionState::Failed(FailureReason { error, recoverable }));
        if recoverable {
            self.failure_epoch += 1;
            let epoch = self.failure_epoch;
            let delay = self.config.failure_recovery_delay;
            let msg_tx = self.msg_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = msg_tx.send(Msg::RecoveryElapsed { epoch });
            });
        }
    }

    fn handle_recovery(&mut self, epoch: u64) {
        if epoch != self.failure_epoch {
            return;
        }
        let InteractionState::Failed(reason) = self.state() else {
            return;
        };
        if !reason.recoverable {
            return;
        }
        debug!("auto-recovered from transient failure");
        if self.live_mode {
            self.set_state(InteractionState::LiveActive);
            self.start_listening(true);
        } else {
            self.set_state(InteractionState::Idle);
        }
    }

    fn cancel_all(&mut self, reason: &str) {
        if self.listening.take().is_some() {
            self.recognizer.cancel();
        }
        self.halt_speaking();
        self.abandon_processing(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimum_viable_readiness_needs_one_voice_leaf() {
        let mut health = SubsystemHealth::default();
        assert!(!health.minimum_viable());
        health.recognizer_ready = true;
        assert!(health.minimum_viable());
        health = SubsystemHealth {
            synthesizer_ready: true,
            ..SubsystemHealth::default()
        };
        assert!(health.minimum_viable());
    }

    #[test]
    fn config_defaults_are_ordered() {
        let config = CoordinatorConfig::default();
        // The coordinator ceiling must sit above a sane responder timeout and
        // below the recognition watchdog.
        assert!(config.processing_ceiling < config.recognition_timeout);
        assert!(config.failure_recovery_delay < config.processing_ceiling);
    }

    #[test]
    fn state_names() {
        assert_eq!(InteractionState::Idle.as_str(), "idle");
        assert_eq!(InteractionState::LiveActive.as_str(), "live_active");
        let failed = InteractionState::Failed(FailureReason {
            error: RecognitionError::NoSpeechDetected.into(),
            recoverable: true,
        });
        assert_eq!(failed.as_str(), "failed");
        assert!(failed.is_failed());
    }
}

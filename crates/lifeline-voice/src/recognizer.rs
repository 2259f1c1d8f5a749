//! **Recognizer Adapter** — wraps the platform speech-to-text engine behind a
//! small command interface and a token-tagged event stream.
//!
//! Implement [`RecognizerEngine`] for a real platform recognizer. Commands are
//! fire-and-forget; results arrive as [`RecognizerEvent`]s posted into the
//! sender handed to `start`. Engines never touch coordinator state directly —
//! every callback becomes a typed event drained by the coordinator's
//! serialized loop.
//!
//! Engine contract: exactly one of `Final`/`Error` per session. The
//! coordinator runs its own watchdog for engines that emit neither.

use crate::error::RecognitionError;
use crate::response::RequestToken;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Events emitted by a recognition session, tagged with the session token.
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    /// Engine is capturing audio.
    Ready { session: RequestToken },
    /// Best-effort partial transcript; superseded by later events.
    Partial { session: RequestToken, text: String },
    /// Terminal transcript for this session.
    Final { session: RequestToken, text: String },
    /// Terminal error for this session, classified at the adapter boundary.
    Error {
        session: RequestToken,
        error: RecognitionError,
    },
}

impl RecognizerEvent {
    pub fn session(&self) -> RequestToken {
        match self {
            Self::Ready { session }
            | Self::Partial { session, .. }
            | Self::Final { session, .. }
            | Self::Error { session, .. } => *session,
        }
    }
}

/// Command interface for a speech-to-text engine.
pub trait RecognizerEngine: Send + Sync {
    /// One-shot readiness probe, run at coordinator initialization and on
    /// explicit re-probe only.
    fn probe(&self) -> bool {
        true
    }

    /// Begin a bounded listening session. Returns once the command is issued;
    /// results arrive on `events`.
    fn start(
        &self,
        session: RequestToken,
        events: mpsc::UnboundedSender<RecognizerEvent>,
    ) -> Result<(), RecognitionError>;

    /// Request graceful finalization. May still yield a `Final` from buffered
    /// audio; whether the coordinator honors it is decided by token matching.
    fn stop(&self);

    /// Discard all in-flight results.
    fn cancel(&self);
}

/// Shared ordered call log for asserting cross-adapter command ordering in
/// tests (e.g. "synthesizer stop before recognizer start").
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().expect("call log poisoned").push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().expect("call log poisoned").clone()
    }
}

/// One step of a scripted recognition session.
#[derive(Debug, Clone)]
pub enum ScriptedStep {
    Ready,
    Partial(String),
    Final(String),
    Error(RecognitionError),
    /// Pause before the next step.
    Delay(Duration),
}

/// Test engine that plays back pre-programmed sessions and counts commands,
/// in the spirit of a placeholder backend with a configured response.
#[derive(Debug)]
pub struct ScriptedRecognizer {
    sessions: Mutex<VecDeque<Vec<ScriptedStep>>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    cancels: AtomicUsize,
    available: bool,
    log: Option<CallLog>,
}

impl ScriptedRecognizer {
    /// Engine with no scripted sessions: every start succeeds but stays
    /// silent (useful for watchdog and cancellation tests).
    pub fn silent() -> Self {
        Self::with_sessions(Vec::new())
    }

    pub fn with_sessions(sessions: Vec<Vec<ScriptedStep>>) -> Self {
        Self {
            sessions: Mutex::new(sessions.into()),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            cancels: AtomicUsize::new(0),
            available: true,
            log: None,
        }
    }

    /// Session that immediately yields one final transcript.
    pub fn with_final(text: impl Into<String>) -> Self {
        Self::with_sessions(vec![vec![ScriptedStep::Ready, ScriptedStep::Final(text.into())]])
    }

    /// Engine whose probe reports not-ready.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::silent()
        }
    }

    pub fn with_call_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn push_session(&self, steps: Vec<ScriptedStep>) {
        self.sessions
            .lock()
            .expect("session script poisoned")
            .push_back(steps);
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn cancel_count(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

impl RecognizerEngine for ScriptedRecognizer {
    fn probe(&self) -> bool {
        self.available
    }

    fn start(
        &self,
        session: RequestToken,
        events: mpsc::UnboundedSender<RecognizerEvent>,
    ) -> Result<(), RecognitionError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if let Some(ref log) = self.log {
            log.record("recognizer.start");
        }
        if !self.available {
            return Err(RecognitionError::AudioHardware(
                "scripted recognizer unavailable".to_string(),
            ));
        }
        let steps = self
            .sessions
            .lock()
            .expect("session script poisoned")
            .pop_front()
            .unwrap_or_default();
        tokio::spawn(async move {
            for step in steps {
                let event = match step {
                    ScriptedStep::Delay(pause) => {
                        tokio::time::sleep(pause).await;
                        continue;
                    }
                    ScriptedStep::Ready => RecognizerEvent::Ready { session },
                    ScriptedStep::Partial(text) => RecognizerEvent::Partial { session, text },
                    ScriptedStep::Final(text) => RecognizerEvent::Final { session, text },
                    ScriptedStep::Error(error) => RecognizerEvent::Error { session, error },
                };
                if events.send(event).is_err() {
                    debug!("scripted recognizer: event receiver dropped");
                    return;
                }
            }
        });
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if let Some(ref log) = self.log {
            log.record("recognizer.stop");
        }
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        if let Some(ref log) = self.log {
            log.record("recognizer.cancel");
        }
    }
}

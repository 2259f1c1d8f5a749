//! **Synthesizer Adapter** — wraps platform text-to-speech behind a command
//! interface and a token-tagged event stream.
//!
//! `speak` is exclusive at the coordinator level: an overlapping request is
//! preceded by exactly one `stop`, so an engine never speaks over a new
//! listening session. `stop` is idempotent.

use crate::error::SynthesisError;
use crate::prefs::PlaybackPreferences;
use crate::recognizer::CallLog;
use crate::response::RequestToken;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// One utterance request. Carries the preference snapshot taken when the
/// coordinator issued the command; a preference change mid-utterance does not
/// affect it.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub token: RequestToken,
    pub text: String,
    pub prefs: PlaybackPreferences,
}

/// Events emitted for an utterance, tagged with its token.
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesizerEvent {
    Started { token: RequestToken },
    Done { token: RequestToken },
    Error {
        token: RequestToken,
        error: SynthesisError,
    },
}

impl SynthesizerEvent {
    pub fn token(&self) -> RequestToken {
        match self {
            Self::Started { token } | Self::Done { token } | Self::Error { token, .. } => *token,
        }
    }
}

/// Command interface for a text-to-speech engine.
pub trait SynthesizerEngine: Send + Sync {
    /// One-shot readiness probe.
    fn probe(&self) -> bool {
        true
    }

    /// Speak one utterance. Must fail fast with a classified error if the
    /// engine is unavailable, never hang. Results arrive on `events`.
    fn speak(
        &self,
        utterance: Utterance,
        events: mpsc::UnboundedSender<SynthesizerEvent>,
    ) -> Result<(), SynthesisError>;

    /// Stop the current utterance. Idempotent.
    fn stop(&self);
}

/// Outcome a scripted synthesizer plays for one speak call.
#[derive(Debug, Clone)]
pub enum SpeakOutcome {
    /// Emit `Started`, wait, then emit `Done`.
    Complete { duration: Duration },
    /// Fail fast from the `speak` call itself.
    RejectWith(SynthesisError),
    /// Emit `Started`, then an `Error` event.
    FailWith(SynthesisError),
    /// Emit `Started` and never finish (for stop/interruption tests).
    Hang,
}

/// Test engine: plays back configured outcomes, records every spoken text
/// and counts commands.
#[derive(Debug)]
pub struct ScriptedSynthesizer {
    outcomes: Mutex<VecDeque<SpeakOutcome>>,
    spoken: Mutex<Vec<Utterance>>,
    speaks: AtomicUsize,
    stops: AtomicUsize,
    available: bool,
    log: Option<CallLog>,
}

impl Default for ScriptedSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedSynthesizer {
    /// Every utterance completes after a short scripted duration.
    pub fn new() -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            spoken: Mutex::new(Vec::new()),
            speaks: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
            available: true,
            log: None,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn with_outcomes(outcomes: Vec<SpeakOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            ..Self::new()
        }
    }

    pub fn with_call_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn push_outcome(&self, outcome: SpeakOutcome) {
        self.outcomes
            .lock()
            .expect("outcome script poisoned")
            .push_back(outcome);
    }

    pub fn speak_count(&self) -> usize {
        self.speaks.load(Ordering::SeqCst)
    }

    pub fn stop_count(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Every utterance handed to `speak`, in order.
    pub fn spoken(&self) -> Vec<Utterance> {
        self.spoken.lock().expect("spoken log poisoned").clone()
    }
}

impl SynthesizerEngine for ScriptedSynthesizer {
    fn probe(&self) -> bool {
        self.available
    }

    fn speak(
        &self,
        utterance: Utterance,
        events: mpsc::UnboundedSender<SynthesizerEvent>,
    ) -> Result<(), SynthesisError> {
        self.speaks.fetch_add(1, Ordering::SeqCst);
        if let Some(ref log) = self.log {
            log.record("synthesizer.speak");
        }
        if !self.available {
            return Err(SynthesisError::EngineUnavailable);
        }
        let outcome = self
            .outcomes
            .lock()
            .expect("outcome script poisoned")
            .pop_front()
            .unwrap_or(SpeakOutcome::Complete {
                duration: Duration::from_millis(10),
            });
        let token = utterance.token;
        self.spoken
            .lock()
            .expect("spoken log poisoned")
            .push(utterance);
        if let SpeakOutcome::RejectWith(ref error) = outcome {
            return Err(error.clone());
        }
        tokio::spawn(async move {
            let started = events.send(SynthesizerEvent::Started { token });
            if started.is_err() {
                debug!("scripted synthesizer: event receiver dropped");
                return;
            }
            match outcome {
                SpeakOutcome::Complete { duration } => {
                    tokio::time::sleep(duration).await;
                    let _ = events.send(SynthesizerEvent::Done { token });
                }
                SpeakOutcome::FailWith(error) => {
                    let _ = events.send(SynthesizerEvent::Error { token, error });
                }
                SpeakOutcome::Hang => {}
                SpeakOutcome::RejectWith(_) => unreachable!("handled before spawn"),
            }
        });
        Ok(())
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if let Some(ref log) = self.log {
            log.record("synthesizer.stop");
        }
    }
}

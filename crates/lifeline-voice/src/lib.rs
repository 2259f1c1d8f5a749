//! # Lifeline Voice - Emergency Guidance Coordination
//!
//! This crate implements the voice interaction coordinator for a spoken
//! emergency-guidance assistant: it owns the interaction state machine,
//! sequences speech-to-text, text-generation, and text-to-speech, and
//! degrades gracefully when any of them is unavailable.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 Voice Interaction Coordinator                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐     │
//! │  │  Recognizer  │ → │  Responder   │ → │ Synthesizer  │     │
//! │  │   Adapter    │   │ (cloud chat) │   │   Adapter    │     │
//! │  └──────────────┘   └──────┬───────┘   └──────────────┘     │
//! │         ↓                  ↓ on any failure      ↓           │
//! │   token-tagged      ┌──────────────┐      token-tagged       │
//! │     events          │   Fallback   │        events           │
//! │         ↓           │  (keyword    │          ↓              │
//! │  ┌───────────────── │   table)     │ ─────────────────┐     │
//! │  │        serialized event loop (one task, one queue)  │     │
//! │  └──────────────────────────────────────────────────── ┘     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every state transition runs on one task draining one queue; leaf
//! callbacks are marshaled into it as typed events tagged with request
//! tokens, so late results from superseded sessions are discarded instead of
//! racing the state machine. The fallback responder never fails, which
//! guarantees the user is never left without guidance.

pub mod coordinator;
pub mod error;
pub mod fallback;
pub mod prefs;
pub mod recognizer;
pub mod responder;
pub mod response;
pub mod synthesizer;

pub use coordinator::{
    Coordinator, CoordinatorConfig, CoordinatorEvent, CoordinatorHandle, ErrorReport,
    FailureReason, InteractionState, SubsystemHealth, Subsystems,
};
pub use error::{
    ConfigError, CoordinatorError, ErrorClass, GenerationError, GuidanceResult, InteractionError,
    RecognitionError, SynthesisError,
};
pub use fallback::FallbackResponder;
pub use prefs::{PlaybackPreferences, PreferenceReader, PreferenceStore, StaticPreferenceReader};
pub use recognizer::{CallLog, RecognizerEngine, RecognizerEvent, ScriptedRecognizer, ScriptedStep};
pub use responder::{
    CloudResponder, Responder, ResponderCredential, RetryPolicy, StaticResponder,
};
pub use response::{
    EmergencyCategory, GuidanceResponse, RequestToken, RequiredAction, TranscriptEvent,
    TranscriptKind,
};
pub use synthesizer::{
    ScriptedSynthesizer, SpeakOutcome, SynthesizerEngine, SynthesizerEvent, Utterance,
};

//! Error taxonomy for the voice guidance system.
//!
//! Leaf errors are classified at the adapter boundary — the coordinator never
//! sees a raw engine or transport error, only these variants. Each taxonomy
//! carries its own recoverability rules; the coordinator turns them into
//! transient or blocking failure states.

use thiserror::Error;

/// Result type alias for coordinator operations.
pub type GuidanceResult<T> = Result<T, CoordinatorError>;

/// Errors from the speech-recognition leaf.
///
/// `NoSpeechDetected` and `Timeout` are transient: the coordinator shows a
/// message and returns to idle on its own. `PermissionDenied` and
/// `AudioHardware` require user action before listening can work again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecognitionError {
    #[error("no speech detected")]
    NoSpeechDetected,

    #[error("recognition timed out")]
    Timeout,

    #[error("audio hardware error: {0}")]
    AudioHardware(String),

    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("recognition service busy")]
    ServiceBusy,

    #[error("recognition error: {0}")]
    Unknown(String),
}

impl RecognitionError {
    /// Whether the coordinator may auto-recover to idle after this error.
    /// `ServiceBusy` is treated as recoverable; the recovery delay doubles as
    /// its backoff.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::NoSpeechDetected | Self::Timeout | Self::ServiceBusy | Self::Unknown(_) => true,
            Self::AudioHardware(_) | Self::PermissionDenied => false,
        }
    }
}

/// Errors from the speech-synthesis leaf. Always recoverable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("synthesis engine unavailable")]
    EngineUnavailable,

    #[error("language not supported: {0}")]
    LanguageUnsupported(String),

    #[error("synthesis error: {0}")]
    Unknown(String),
}

/// Errors from the cloud text-generation leaf.
///
/// Never surfaced to the user: any of these silently routes the cycle to the
/// fallback responder and is logged for diagnostics only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    #[error("network failure: {0}")]
    Network(String),

    #[error("generation timed out")]
    Timeout,

    #[error("invalid API credential")]
    InvalidCredential,

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

/// Configuration-time errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No responder credential was provided. Degrades the responder to
    /// permanent-fallback mode at initialization; not a runtime error.
    #[error("no responder credential configured")]
    MissingCredential,

    /// Neither recognizer nor synthesizer is available. Fatal to
    /// initialization.
    #[error("no voice subsystems available (recognizer and synthesizer both unready)")]
    NoSubsystemsAvailable,
}

/// Command-level errors returned by [`CoordinatorHandle`] methods.
///
/// [`CoordinatorHandle`]: crate::coordinator::CoordinatorHandle
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("coordinator not initialized: {0}")]
    NotReady(#[from] ConfigError),

    #[error("coordinator is shutting down")]
    ShuttingDown,
}

/// A classified leaf error as published on the diagnostics stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InteractionError {
    #[error(transparent)]
    Recognition(#[from] RecognitionError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// User-visible failure class per the propagation policy: generation errors
/// degrade silently and never appear here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Shown briefly; the coordinator recovers on its own.
    Transient,
    /// Requires user acknowledgement or action.
    Blocking,
}

impl InteractionError {
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Recognition(e) => e.is_recoverable(),
            // Synthesis failures never strand the session.
            Self::Synthesis(_) => true,
            Self::Config(_) => false,
        }
    }

    pub fn class(&self) -> ErrorClass {
        if self.is_recoverable() {
            ErrorClass::Transient
        } else {
            ErrorClass::Blocking
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognition_recoverability() {
        assert!(RecognitionError::NoSpeechDetected.is_recoverable());
        assert!(RecognitionError::Timeout.is_recoverable());
        assert!(RecognitionError::ServiceBusy.is_recoverable());
        assert!(!RecognitionError::PermissionDenied.is_recoverable());
        assert!(!RecognitionError::AudioHardware("no mic".into()).is_recoverable());
    }

    #[test]
    fn synthesis_is_always_transient() {
        let err = InteractionError::from(SynthesisError::EngineUnavailable);
        assert_eq!(err.class(), ErrorClass::Transient);
        let err = InteractionError::from(SynthesisError::LanguageUnsupported("xx-XX".into()));
        assert_eq!(err.class(), ErrorClass::Transient);
    }

    #[test]
    fn config_errors_block() {
        let err = InteractionError::from(ConfigError::NoSubsystemsAvailable);
        assert_eq!(err.class(), ErrorClass::Blocking);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn permission_denied_blocks() {
        let err = InteractionError::from(RecognitionError::PermissionDenied);
        assert_eq!(err.class(), ErrorClass::Blocking);
    }

    #[test]
    fn config_error_wraps_into_not_ready() {
        let err = CoordinatorError::from(ConfigError::NoSubsystemsAvailable);
        assert_eq!(
            err,
            CoordinatorError::NotReady(ConfigError::NoSubsystemsAvailable)
        );
        assert!(err.to_string().contains("not initialized"));
    }
}

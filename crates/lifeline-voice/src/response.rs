//! Published data model: transcripts, guidance responses, emergency categories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Monotonic token attached to every command issued to a leaf. Leaf events
/// echo the token; the coordinator discards anything that does not match the
/// current in-flight token, which is how late results from superseded
/// sessions are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestToken(pub u64);

impl RequestToken {
    pub const ZERO: RequestToken = RequestToken(0);

    pub fn next(self) -> Self {
        RequestToken(self.0 + 1)
    }
}

impl fmt::Display for RequestToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Whether a transcript is still in flight or terminal for its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptKind {
    /// Best-effort; may be superseded by later partials or the final.
    Partial,
    /// Terminal for the listening cycle. Invalidates earlier partials.
    Final,
}

/// A transcript emitted by the recognizer, tagged with its session token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEvent {
    pub text: String,
    pub kind: TranscriptKind,
    pub session: RequestToken,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEvent {
    pub fn is_final(&self) -> bool {
        self.kind == TranscriptKind::Final
    }
}

/// An action the presentation layer should offer alongside the guidance text.
/// Emitted as a side-channel event, never a state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiredAction {
    /// Prompt the user to place an emergency call to the given number.
    CallEmergencyNumber(String),
    /// Open a static guide procedure by id.
    OpenProcedure(String),
}

/// One guidance answer, produced once per processing cycle by either the
/// cloud responder or the offline fallback. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidanceResponse {
    pub text: String,
    pub required_action: Option<RequiredAction>,
    /// Free-form metadata, e.g. `source` ("cloud" / "offline"), `urgency`.
    pub attributes: HashMap<String, String>,
}

impl GuidanceResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            required_action: None,
            attributes: HashMap::new(),
        }
    }

    pub fn with_action(mut self, action: RequiredAction) -> Self {
        self.required_action = Some(action);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// The `source` attribute, if set ("cloud" or "offline").
    pub fn source(&self) -> Option<&str> {
        self.attributes.get("source").map(String::as_str)
    }

    pub fn is_offline(&self) -> bool {
        self.source() == Some("offline")
    }
}

/// Fixed set of emergency categories for shortcuts and the fallback table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyCategory {
    CardiacArrest,
    AirwayObstruction,
    Hemorrhage,
    Burn,
    Stroke,
    Seizure,
    Anaphylaxis,
    Poisoning,
    Fracture,
    Hypothermia,
    HeatStroke,
}

impl EmergencyCategory {
    /// Classification order: more specific categories first — `HeatStroke`
    /// must precede `Stroke` so "heat stroke" text is not matched as a
    /// stroke.
    pub const ALL: [EmergencyCategory; 11] = [
        Self::CardiacArrest,
        Self::AirwayObstruction,
        Self::Hemorrhage,
        Self::Burn,
        Self::HeatStroke,
        Self::Stroke,
        Self::Seizure,
        Self::Anaphylaxis,
        Self::Poisoning,
        Self::Fracture,
        Self::Hypothermia,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CardiacArrest => "cardiac_arrest",
            Self::AirwayObstruction => "airway_obstruction",
            Self::Hemorrhage => "hemorrhage",
            Self::Burn => "burn",
            Self::Stroke => "stroke",
            Self::Seizure => "seizure",
            Self::Anaphylaxis => "anaphylaxis",
            Self::Poisoning => "poisoning",
            Self::Fracture => "fracture",
            Self::Hypothermia => "hypothermia",
            Self::HeatStroke => "heat_stroke",
        }
    }

    /// Parse a shortcut id (e.g. from the presentation layer).
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == raw.trim())
    }

    /// The synthetic transcript used when a shortcut bypasses recognition.
    pub fn synthetic_transcript(self) -> &'static str {
        match self {
            Self::CardiacArrest => "someone collapsed and is not breathing",
            Self::AirwayObstruction => "someone is choking and cannot breathe",
            Self::Hemorrhage => "severe bleeding that will not stop",
            Self::Burn => "someone has a serious burn",
            Self::Stroke => "possible stroke, face drooping and slurred speech",
            Self::Seizure => "someone is having a seizure",
            Self::Anaphylaxis => "severe allergic reaction, swelling and trouble breathing",
            Self::Poisoning => "someone swallowed something poisonous",
            Self::Fracture => "suspected broken bone",
            Self::Hypothermia => "someone is dangerously cold and unresponsive",
            Self::HeatStroke => "someone is overheated with hot dry skin and confusion",
        }
    }
}

impl fmt::Display for EmergencyCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

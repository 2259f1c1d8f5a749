//! Playback preferences: read-mostly, updated from any thread, snapshotted
//! by the coordinator at the moment a speak command is issued so an in-flight
//! utterance is never affected mid-speech.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::watch;

const RATE_RANGE: (f32, f32) = (0.5, 2.0);
const PITCH_RANGE: (f32, f32) = (0.5, 2.0);

/// Mutable playback parameters consumed by the synthesizer adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackPreferences {
    /// Master switch for spoken output.
    pub enabled: bool,
    /// Speech rate multiplier, clamped to [0.5, 2.0].
    pub rate: f32,
    /// Voice pitch multiplier, clamped to [0.5, 2.0].
    pub pitch: f32,
    /// Speak each guidance response automatically after processing.
    pub auto_speak: bool,
    /// Haptic pulse on state changes (consumed by the presentation layer).
    pub haptic_feedback: bool,
    /// BCP-47 language tag for synthesis, e.g. "en-US".
    pub language: String,
    /// Never contact the cloud responder; always answer from the fallback table.
    pub offline_only: bool,
}

impl Default for PlaybackPreferences {
    fn default() -> Self {
        Self {
            enabled: true,
            rate: 1.0,
            pitch: 1.0,
            auto_speak: true,
            haptic_feedback: false,
            language: "en-US".to_string(),
            offline_only: false,
        }
    }
}

impl PlaybackPreferences {
    /// Clamp numeric fields into their valid ranges.
    pub fn clamped(mut self) -> Self {
        self.rate = self.rate.clamp(RATE_RANGE.0, RATE_RANGE.1);
        self.pitch = self.pitch.clamp(PITCH_RANGE.0, PITCH_RANGE.1);
        self
    }

    /// Load initial preferences from a key-value reader. Unset or unparsable
    /// keys fall back to defaults.
    pub fn from_reader(reader: &dyn PreferenceReader) -> Self {
        let defaults = Self::default();
        Self {
            enabled: read_bool(reader, "voice.enabled", defaults.enabled),
            rate: read_f32(reader, "voice.rate", defaults.rate),
            pitch: read_f32(reader, "voice.pitch", defaults.pitch),
            auto_speak: read_bool(reader, "voice.auto_speak", defaults.auto_speak),
            haptic_feedback: read_bool(reader, "voice.haptic_feedback", defaults.haptic_feedback),
            language: reader
                .get("voice.language")
                .filter(|value| !value.trim().is_empty())
                .unwrap_or(defaults.language),
            offline_only: read_bool(reader, "voice.offline_only", defaults.offline_only),
        }
        .clamped()
    }
}

fn read_bool(reader: &dyn PreferenceReader, key: &str, default: bool) -> bool {
    reader
        .get(key)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

fn read_f32(reader: &dyn PreferenceReader, key: &str, default: f32) -> f32 {
    reader
        .get(key)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(default)
}

/// Key-value preference source (platform settings store, file, test map).
pub trait PreferenceReader: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// In-memory reader for tests and demos.
#[derive(Debug, Default)]
pub struct StaticPreferenceReader {
    values: HashMap<String, String>,
}

impl StaticPreferenceReader {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl PreferenceReader for StaticPreferenceReader {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Shared preference cell. Any thread may update; readers take snapshots.
#[derive(Debug)]
pub struct PreferenceStore {
    tx: watch::Sender<PlaybackPreferences>,
}

impl PreferenceStore {
    pub fn new(initial: PlaybackPreferences) -> Self {
        let (tx, _rx) = watch::channel(initial.clamped());
        Self { tx }
    }

    /// Replace the preferences. Values are clamped on the way in.
    pub fn update(&self, prefs: PlaybackPreferences) {
        self.tx.send_replace(prefs.clamped());
    }

    /// Immutable snapshot of the current preferences.
    pub fn snapshot(&self) -> PlaybackPreferences {
        self.tx.borrow().clone()
    }

    /// Subscribe to preference changes.
    pub fn watch(&self) -> watch::Receiver<PlaybackPreferences> {
        self.tx.subscribe()
    }
}

impl Default for PreferenceStore {
    fn default() -> Self {
        Self::new(PlaybackPreferences::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_clamps_out_of_range_values() {
        let store = PreferenceStore::default();
        store.update(PlaybackPreferences {
            rate: 9.0,
            pitch: 0.01,
            ..PlaybackPreferences::default()
        });
        let snapshot = store.snapshot();
        assert_eq!(snapshot.rate, 2.0);
        assert_eq!(snapshot.pitch, 0.5);
    }

    #[test]
    fn snapshot_is_unaffected_by_later_updates() {
        let store = PreferenceStore::default();
        let before = store.snapshot();
        store.update(PlaybackPreferences {
            rate: 1.5,
            ..PlaybackPreferences::default()
        });
        assert_eq!(before.rate, 1.0);
        assert_eq!(store.snapshot().rate, 1.5);
    }

    #[test]
    fn reader_fills_missing_keys_with_defaults() {
        let reader = StaticPreferenceReader::from_pairs([
            ("voice.rate", "1.8"),
            ("voice.language", "de-DE"),
            ("voice.auto_speak", "false"),
        ]);
        let prefs = PlaybackPreferences::from_reader(&reader);
        assert_eq!(prefs.rate, 1.8);
        assert_eq!(prefs.language, "de-DE");
        assert!(!prefs.auto_speak);
        assert!(prefs.enabled);
    }

    #[test]
    fn reader_ignores_garbage_values() {
        let reader = StaticPreferenceReader::from_pairs([("voice.rate", "fast")]);
        let prefs = PlaybackPreferences::from_reader(&reader);
        assert_eq!(prefs.rate, 1.0);
    }
}

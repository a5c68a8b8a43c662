use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::default_lang;
use crate::error::ChatError;
use crate::storage::KeyValueStore;

pub const PREFS_KEY: &str = "prefs";

pub const RATE_RANGE: (f64, f64) = (0.1, 10.0);
pub const PITCH_RANGE: (f64, f64) = (0.0, 2.0);

/// Speech preferences. Field names match the stored JSON record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub tts_enabled: bool,
    pub lang: String,
    pub rate: f64,
    pub pitch: f64,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            tts_enabled: true,
            lang: default_lang(),
            rate: 1.0,
            pitch: 1.0,
        }
    }
}

impl Preferences {
    pub fn with_lang(lang: &str) -> Self {
        Self {
            lang: lang.to_string(),
            ..Self::default()
        }
    }

    /// Copy every valid field of a stored record over `self`, leaving the
    /// rest untouched. Returns how many fields were taken.
    pub fn apply_record(&mut self, record: &Value, languages: &[String]) -> usize {
        let mut applied = 0;

        if let Some(enabled) = record.get("ttsEnabled").and_then(Value::as_bool) {
            self.tts_enabled = enabled;
            applied += 1;
        }

        if let Some(lang) = record.get("lang").and_then(Value::as_str) {
            if is_selectable_lang(lang, languages) {
                self.lang = lang.to_string();
                applied += 1;
            } else {
                debug!("Ignoring stored language {:?}", lang);
            }
        }

        if let Some(rate) = record.get("rate").and_then(Value::as_f64).filter(|r| r.is_finite()) {
            self.rate = rate;
            applied += 1;
        }

        if let Some(pitch) = record.get("pitch").and_then(Value::as_f64).filter(|p| p.is_finite()) {
            self.pitch = pitch;
            applied += 1;
        }

        applied
    }

    pub fn toggle_icon(&self) -> &'static str {
        if self.tts_enabled {
            "🔊"
        } else {
            "🔇"
        }
    }
}

/// A language the selector would accept: non-empty and, when a list is
/// configured, one of its entries.
pub fn is_selectable_lang(lang: &str, languages: &[String]) -> bool {
    !lang.is_empty() && (languages.is_empty() || languages.iter().any(|l| l == lang))
}

pub fn validate_rate(rate: f64) -> Result<f64, ChatError> {
    if rate.is_finite() && (RATE_RANGE.0..=RATE_RANGE.1).contains(&rate) {
        Ok(rate)
    } else {
        Err(ChatError::Config(format!(
            "rate must be between {} and {}",
            RATE_RANGE.0, RATE_RANGE.1
        )))
    }
}

pub fn validate_pitch(pitch: f64) -> Result<f64, ChatError> {
    if pitch.is_finite() && (PITCH_RANGE.0..=PITCH_RANGE.1).contains(&pitch) {
        Ok(pitch)
    } else {
        Err(ChatError::Config(format!(
            "pitch must be between {} and {}",
            PITCH_RANGE.0, PITCH_RANGE.1
        )))
    }
}

/// Reads and writes the single preferences record.
///
/// Failures never reach the user: they are logged and the in-memory values
/// stay in effect.
pub struct PreferenceStore {
    store: Box<dyn KeyValueStore>,
    languages: Vec<String>,
}

impl PreferenceStore {
    pub fn new(store: Box<dyn KeyValueStore>, languages: Vec<String>) -> Self {
        Self { store, languages }
    }

    pub fn load_into(&self, prefs: &mut Preferences) {
        let raw = match self.store.get(PREFS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("No stored preferences, using defaults");
                return;
            }
            Err(e) => {
                warn!("Failed to read preferences: {}", e);
                return;
            }
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(record) => {
                let applied = prefs.apply_record(&record, &self.languages);
                debug!("Loaded {} preference fields", applied);
            }
            Err(e) => warn!("Stored preferences are not valid JSON: {}", e),
        }
    }

    pub fn save(&mut self, prefs: &Preferences) {
        let record = match serde_json::to_string(prefs) {
            Ok(record) => record,
            Err(e) => {
                warn!("Failed to serialize preferences: {}", e);
                return;
            }
        };
        if let Err(e) = self.store.set(PREFS_KEY, &record) {
            warn!("Failed to save preferences: {}", e);
        }
    }

    pub fn raw(&self) -> Result<Option<String>, ChatError> {
        self.store.get(PREFS_KEY)
    }

    pub fn reset(&mut self) -> Result<(), ChatError> {
        self.store.remove(PREFS_KEY)
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }
}

//! Iteration records: one party's observations of one call attempt.
//!
//! Records are parsed once from a log line and never mutated afterwards —
//! every downstream component treats them as values.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Which endpoint produced a record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Party {
    Caller,
    Callee,
}

impl std::fmt::Display for Party {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Party::Caller => write!(f, "Caller"),
            Party::Callee => write!(f, "Callee"),
        }
    }
}

/// The wire sentinel for "this event never happened": the zero-value
/// instant. In memory the field is simply `None`; the sentinel exists so
/// interval comparisons can still order records with an unset endpoint.
pub fn unset_instant() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .unwrap_or_default()
        .and_hms_opt(0, 0, 0)
        .unwrap_or_default()
}

/// Collapse an optional instant to a concrete one for ordering, mapping
/// `None` to the zero-value sentinel (which sorts before every real time).
pub fn instant_or_unset(t: Option<NaiveDateTime>) -> NaiveDateTime {
    t.unwrap_or_else(unset_instant)
}

/// One speech-recognizer event as logged by an endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecognizerOutcome {
    /// Whether the recognizer matched a grammar rule.
    pub recognized: bool,

    /// Confidence in [0, 1]; 0.0 when not recognized.
    pub confidence: f64,

    /// Grammar property name of the matched rule, when recognized.
    pub grammar_property: Option<String>,

    /// Recognized text, when recognized.
    pub text: Option<String>,
}

impl RecognizerOutcome {
    /// An outcome for a detection the recognizer could not match.
    pub fn unrecognized() -> Self {
        Self {
            recognized: false,
            confidence: 0.0,
            grammar_property: None,
            text: None,
        }
    }
}

/// The observations both parties log for a call attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CallObservation {
    /// When the call connected on this side; `None` if it never did.
    pub connect_time: Option<NaiveDateTime>,

    /// When this side observed the call end.
    pub release_time: Option<NaiveDateTime>,

    /// When this side's detector first heard speech.
    pub speech_detection_time: Option<NaiveDateTime>,

    /// When this side started playing its prompt.
    pub speak_time: Option<NaiveDateTime>,

    /// Identifier of the remote party as seen by this side.
    pub remote_party: Option<String>,

    /// Audio asset this side played, as logged.
    pub wav_file_played: Option<String>,

    /// Recognizer events in detection order.
    pub recognitions: Vec<RecognizerOutcome>,
}

impl CallObservation {
    /// Grammar property names of every recognized event, case-folded.
    pub fn recognized_properties(&self) -> Vec<String> {
        self.recognitions
            .iter()
            .filter(|r| r.recognized)
            .filter_map(|r| r.grammar_property.as_deref())
            .map(str::to_lowercase)
            .collect()
    }

    /// Maximum confidence over every recognition of `property`
    /// (case-insensitive); 0.0 when the property was never recognized.
    pub fn confidence_for(&self, property: &str) -> f64 {
        self.recognitions
            .iter()
            .filter(|r| {
                r.grammar_property
                    .as_deref()
                    .is_some_and(|p| p.eq_ignore_ascii_case(property))
            })
            .map(|r| r.confidence)
            .fold(0.0, f64::max)
    }
}

/// The caller's record of one iteration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CallerRecord {
    #[serde(flatten)]
    pub obs: CallObservation,

    /// When dialing was initiated.
    pub place_call_time: Option<NaiveDateTime>,

    /// When this side asked to tear the call down.
    pub release_request_time: Option<NaiveDateTime>,
}

/// The callee's record of one iteration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CalleeRecord {
    #[serde(flatten)]
    pub obs: CallObservation,
}

//! Domain models for callcheck.
//!
//! Canonical definitions for the core entities:
//! - `CallerRecord` / `CalleeRecord`: one party's observations of a call
//! - `RecognizerOutcome`: one speech-recognizer event
//! - `ValidationErrors` / `IterationVerdict`: the verdict of an iteration
//! - `ParseError` / `AnalyzerError`: the error taxonomy

pub mod error;
pub mod record;
pub mod verdict;

pub use error::{AnalyzerError, ParseError, Result};
pub use record::{
    instant_or_unset, unset_instant, CallObservation, CalleeRecord, CallerRecord, Party,
    RecognizerOutcome,
};
pub use verdict::{
    AudioVolume, AudioVolumeConfidence, Category, IterationVerdict, SpeechOutcome, SpeechResult,
    ValidationErrors,
};

//! Error taxonomy for the analyzer.

use super::record::Party;

/// A log line that could not be decoded into an iteration record.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("expected at least {expected} tab-separated fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    #[error("trailing recognition fields must come in groups of 4, found a remainder of {remainder}")]
    RecognitionGroup { remainder: usize },

    #[error("bad timestamp {value:?}: {source}")]
    Timestamp {
        value: String,
        source: chrono::ParseError,
    },

    #[error("bad confidence value {value:?}")]
    Confidence { value: String },
}

/// Analyzer errors.
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("cannot open {path}: {source}")]
    InputUnavailable {
        path: String,
        source: std::io::Error,
    },

    #[error("malformed {party} record at line {line}: {source}")]
    MalformedRecord {
        party: Party,
        line: usize,
        source: ParseError,
    },

    #[error("grammar document error: {0}")]
    Grammar(#[from] quick_xml::Error),

    #[error("bad map file format at line {line}: expected <wavFilePath>\\t<propertyName>")]
    MapFileFormat { line: usize },

    #[error("waveform error: {0}")]
    Waveform(#[from] hound::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for analyzer operations.
pub type Result<T> = std::result::Result<T, AnalyzerError>;

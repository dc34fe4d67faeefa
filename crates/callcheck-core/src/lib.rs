//! Callcheck Core Library
//!
//! Offline analysis of voice-gateway acceptance-test runs: parses the
//! caller and callee event logs, causally matches them into iterations,
//! validates each iteration against a rule chain and renders aggregate
//! results.

pub mod aggregate;
pub mod analyzer;
pub mod audio;
pub mod codec;
pub mod domain;
pub mod grammar;
pub mod matcher;
pub mod rules;
pub mod telemetry;

pub use aggregate::{
    AggregateStats, MatchedRecordings, RecognizerTally, ReportSink, RunSummary, SummaryTally,
};
pub use analyzer::Analyzer;
pub use audio::{attenuation, PowerProfile};
pub use domain::{
    AnalyzerError, AudioVolume, AudioVolumeConfidence, CalleeRecord, CallerRecord, Category,
    IterationVerdict, ParseError, Party, Result, SpeechOutcome, SpeechResult, ValidationErrors,
};
pub use grammar::GrammarIndex;
pub use matcher::{causal_order, CausalMatcher, CausalOrder, MatchedPair, StreamFault};
pub use rules::RulePipeline;
pub use telemetry::init_tracing;

/// Callcheck version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

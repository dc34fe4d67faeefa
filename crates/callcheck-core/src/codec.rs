//! Record codec: one tab-separated log line per call iteration.
//!
//! The two endpoints write their logs independently; the formats share a
//! six-field base (connect, release, speech-detection, speak, remote party,
//! wav played) and the caller adds its place-call and release-request
//! instants. Trailing fields come in groups of exactly four, one group per
//! recognizer event. Absent strings are the literal token `null`; absent
//! instants are the zero-value timestamp, never a separate token.
//!
//! Parsing and serialization are pure; `parse(serialize(r)) == r`.

use chrono::NaiveDateTime;

use crate::domain::record::{
    unset_instant, CallObservation, CalleeRecord, CallerRecord, RecognizerOutcome,
};
use crate::domain::ParseError;

/// Written timestamp layout. Fixed and locale-independent.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

// Accepts any fractional-second width on input, including none.
const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

const NULL_TOKEN: &str = "null";

const CALLEE_BASE_FIELDS: usize = 6;
const CALLER_BASE_FIELDS: usize = 8;
const RECOGNITION_FIELDS: usize = 4;

/// Parse a timestamp token, mapping the zero-value sentinel to `None`.
pub fn parse_timestamp(token: &str) -> Result<Option<NaiveDateTime>, ParseError> {
    let instant = NaiveDateTime::parse_from_str(token, TIMESTAMP_PARSE_FORMAT).map_err(|e| {
        ParseError::Timestamp {
            value: token.to_string(),
            source: e,
        }
    })?;
    if instant == unset_instant() {
        Ok(None)
    } else {
        Ok(Some(instant))
    }
}

/// Format an optional timestamp, writing the zero-value sentinel for `None`.
pub fn format_timestamp(instant: Option<NaiveDateTime>) -> String {
    instant
        .unwrap_or_else(unset_instant)
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

fn parse_optional(token: &str) -> Option<String> {
    if token == NULL_TOKEN {
        None
    } else {
        Some(token.to_string())
    }
}

fn format_optional(value: Option<&str>) -> &str {
    value.unwrap_or(NULL_TOKEN)
}

fn parse_recognitions(tokens: &[&str]) -> Result<Vec<RecognizerOutcome>, ParseError> {
    let remainder = tokens.len() % RECOGNITION_FIELDS;
    if remainder != 0 {
        return Err(ParseError::RecognitionGroup { remainder });
    }
    tokens
        .chunks_exact(RECOGNITION_FIELDS)
        .map(|group| {
            let confidence = group[1]
                .trim()
                .parse::<f64>()
                .map_err(|_| ParseError::Confidence {
                    value: group[1].to_string(),
                })?;
            Ok(RecognizerOutcome {
                recognized: group[0].eq_ignore_ascii_case("recognized"),
                confidence,
                grammar_property: parse_optional(group[2]),
                text: parse_optional(group[3]),
            })
        })
        .collect()
}

fn serialize_recognitions(out: &mut String, recognitions: &[RecognizerOutcome]) {
    for rec in recognitions {
        let status = if rec.recognized {
            "RECOGNIZED"
        } else {
            "UNRECOGNIZED"
        };
        out.push('\t');
        out.push_str(status);
        out.push('\t');
        out.push_str(&rec.confidence.to_string());
        out.push('\t');
        out.push_str(format_optional(rec.grammar_property.as_deref()));
        out.push('\t');
        out.push_str(format_optional(rec.text.as_deref()));
    }
}

/// Parse one callee log line.
///
/// Field order: connect, release, speech-detection, speak, remote party,
/// wav played, then recognition groups.
pub fn parse_callee(line: &str) -> Result<CalleeRecord, ParseError> {
    let tokens: Vec<&str> = line.split('\t').collect();
    if tokens.len() < CALLEE_BASE_FIELDS {
        return Err(ParseError::FieldCount {
            expected: CALLEE_BASE_FIELDS,
            found: tokens.len(),
        });
    }
    Ok(CalleeRecord {
        obs: CallObservation {
            connect_time: parse_timestamp(tokens[0])?,
            release_time: parse_timestamp(tokens[1])?,
            speech_detection_time: parse_timestamp(tokens[2])?,
            speak_time: parse_timestamp(tokens[3])?,
            remote_party: parse_optional(tokens[4]),
            wav_file_played: parse_optional(tokens[5]),
            recognitions: parse_recognitions(&tokens[CALLEE_BASE_FIELDS..])?,
        },
    })
}

/// Parse one caller log line.
///
/// Field order: connect, release, place-call, release-request,
/// speech-detection, speak, remote party, wav played, then recognition
/// groups.
pub fn parse_caller(line: &str) -> Result<CallerRecord, ParseError> {
    let tokens: Vec<&str> = line.split('\t').collect();
    if tokens.len() < CALLER_BASE_FIELDS {
        return Err(ParseError::FieldCount {
            expected: CALLER_BASE_FIELDS,
            found: tokens.len(),
        });
    }
    Ok(CallerRecord {
        place_call_time: parse_timestamp(tokens[2])?,
        release_request_time: parse_timestamp(tokens[3])?,
        obs: CallObservation {
            connect_time: parse_timestamp(tokens[0])?,
            release_time: parse_timestamp(tokens[1])?,
            speech_detection_time: parse_timestamp(tokens[4])?,
            speak_time: parse_timestamp(tokens[5])?,
            remote_party: parse_optional(tokens[6]),
            wav_file_played: parse_optional(tokens[7]),
            recognitions: parse_recognitions(&tokens[CALLER_BASE_FIELDS..])?,
        },
    })
}

/// Serialize a callee record to its log-line form.
pub fn serialize_callee(record: &CalleeRecord) -> String {
    let obs = &record.obs;
    let mut out = format!(
        "{}\t{}\t{}\t{}\t{}\t{}",
        format_timestamp(obs.connect_time),
        format_timestamp(obs.release_time),
        format_timestamp(obs.speech_detection_time),
        format_timestamp(obs.speak_time),
        format_optional(obs.remote_party.as_deref()),
        format_optional(obs.wav_file_played.as_deref()),
    );
    serialize_recognitions(&mut out, &obs.recognitions);
    out
}

/// Serialize a caller record to its log-line form.
pub fn serialize_caller(record: &CallerRecord) -> String {
    let obs = &record.obs;
    let mut out = format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        format_timestamp(obs.connect_time),
        format_timestamp(obs.release_time),
        format_timestamp(record.place_call_time),
        format_timestamp(record.release_request_time),
        format_timestamp(obs.speech_detection_time),
        format_timestamp(obs.speak_time),
        format_optional(obs.remote_party.as_deref()),
        format_optional(obs.wav_file_played.as_deref()),
    );
    serialize_recognitions(&mut out, &obs.recognitions);
    out
}

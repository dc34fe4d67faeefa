//! Per-iteration verdicts.
//!
//! A verdict is produced once per matched record pair by the rule pipeline
//! and consumed read-only by the aggregator (which only stamps the audio
//! attenuation fields for passed iterations).

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::record::{CalleeRecord, CallerRecord};

bitflags! {
    /// Independent failure causes for one iteration. Flags may co-occur
    /// except where the rule pipeline short-circuits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ValidationErrors: u32 {
        /// Call never connected end to end.
        const FAILED_CALL = 1;
        /// Callee never observed the caller's hangup.
        const MISSING_HANGUP = 1 << 1;
        /// Callee did not play its prompt; the iteration is meaningless.
        const CALLEE_PROMPT_NOT_PLAYED = 1 << 2;
        /// Caller detected speech before any prompt was on the wire.
        const CALLER_NOISE_DETECTED = 1 << 3;
        /// Callee detected speech before either party spoke.
        const CALLEE_NOISE_DETECTED = 1 << 4;
        /// A party heard its own audio.
        const ECHO_DETECTED = 1 << 5;
        /// Caller spoke but the callee never heard it (barge-in failed).
        const CALLER_NOT_HEARD = 1 << 6;
        /// Callee spoke but the caller never heard it.
        const CALLEE_NOT_HEARD = 1 << 7;
        /// Event combination no correct scenario execution can produce.
        const BAD_SCENARIO_EXECUTION = 1 << 8;
    }
}

impl ValidationErrors {
    /// The subset of flags that classify an iteration as FAILED rather
    /// than INVALID.
    pub fn failure_flags() -> Self {
        Self::FAILED_CALL
            | Self::MISSING_HANGUP
            | Self::ECHO_DETECTED
            | Self::CALLER_NOISE_DETECTED
            | Self::CALLEE_NOISE_DETECTED
            | Self::CALLER_NOT_HEARD
            | Self::CALLEE_NOT_HEARD
    }
}

/// Overall classification of one iteration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Passed,
    Failed,
    /// The iteration did not execute a meaningful scenario and is ignored.
    Invalid,
}

impl Category {
    /// Derive the category from the final flag union.
    pub fn from_errors(errors: ValidationErrors) -> Self {
        if errors.is_empty() {
            Category::Passed
        } else if errors.intersects(ValidationErrors::failure_flags()) {
            Category::Failed
        } else {
            Category::Invalid
        }
    }
}

/// Classification of one side's recognizer output for the iteration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpeechOutcome {
    /// The other party's prompt was correctly recognized.
    Recognized,
    /// Speech was detected but nothing was recognized.
    Unrecognized,
    /// Something other than either party's prompt was recognized.
    Misrecognized,
    /// The caller's recognizer matched the caller's own prompt.
    CallerEcho,
    /// The callee's recognizer matched the callee's own prompt.
    CalleeEcho,
}

/// One side's speech-recognition sub-result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpeechResult {
    pub outcome: SpeechOutcome,
    /// Grammar property that was recognized; set only for `Recognized`.
    pub property: Option<String>,
    /// Max confidence of the recognized property; 0.0 otherwise.
    pub confidence: f64,
    /// Human-readable summary used in the iteration narrative.
    pub message: String,
}

/// Whether the recorded audio lost signal power against the played audio.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AudioVolume {
    Attenuated,
    NotAttenuated,
}

/// How much the attenuation heuristic trusts its own answer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AudioVolumeConfidence {
    Good,
    Low,
}

/// The verdict for one matched (or synthetically paired) iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationVerdict {
    pub errors: ValidationErrors,
    pub category: Category,
    pub caller: CallerRecord,
    pub callee: CalleeRecord,
    pub caller_speech: Option<SpeechResult>,
    pub callee_speech: Option<SpeechResult>,
    pub volume: AudioVolume,
    pub volume_confidence: AudioVolumeConfidence,
}

impl IterationVerdict {
    /// Build a verdict from the rule pipeline's flag union and sub-results.
    pub fn new(
        errors: ValidationErrors,
        caller: CallerRecord,
        callee: CalleeRecord,
        caller_speech: Option<SpeechResult>,
        callee_speech: Option<SpeechResult>,
    ) -> Self {
        Self {
            category: Category::from_errors(errors),
            errors,
            caller,
            callee,
            caller_speech,
            callee_speech,
            volume: AudioVolume::NotAttenuated,
            volume_confidence: AudioVolumeConfidence::Good,
        }
    }

    /// Seconds between the caller initiating the dial and the later of the
    /// two connect instants. `None` unless place-call and both connects
    /// are set.
    pub fn connect_latency(&self) -> Option<f64> {
        let placed = self.caller.place_call_time?;
        let caller_connect = self.caller.obs.connect_time?;
        let callee_connect = self.callee.obs.connect_time?;
        let later = caller_connect.max(callee_connect);
        Some(seconds_between(placed, later))
    }

    /// Seconds between the caller requesting teardown and the later of the
    /// two release instants. `None` unless the request and both releases
    /// are set.
    pub fn hangup_latency(&self) -> Option<f64> {
        let requested = self.caller.release_request_time?;
        let caller_release = self.caller.obs.release_time?;
        let callee_release = self.callee.obs.release_time?;
        let later = caller_release.max(callee_release);
        Some(seconds_between(requested, later))
    }

    /// Render the per-iteration report block.
    pub fn narrative(&self) -> String {
        let mut out = String::from("Result = ");

        match self.category {
            Category::Passed => out.push_str("Passed.\n"),
            Category::Failed => {
                out.push_str("Failed. Failure cause(s):\n");
                let causes = [
                    (ValidationErrors::FAILED_CALL, "Call could not be established"),
                    (
                        ValidationErrors::MISSING_HANGUP,
                        "Callee did not detect caller's hangup",
                    ),
                    (ValidationErrors::ECHO_DETECTED, "Echo detected"),
                    (
                        ValidationErrors::CALLEE_NOISE_DETECTED,
                        "Phantom noise detected by callee",
                    ),
                    (
                        ValidationErrors::CALLER_NOISE_DETECTED,
                        "Phantom noise detected by caller",
                    ),
                    (
                        ValidationErrors::CALLEE_NOT_HEARD,
                        "Caller could not detect audio from callee",
                    ),
                    (
                        ValidationErrors::CALLER_NOT_HEARD,
                        "Callee could not detect audio from caller",
                    ),
                ];
                for (flag, text) in causes {
                    if self.errors.contains(flag) {
                        out.push('\t');
                        out.push_str(text);
                        out.push('\n');
                    }
                }
            }
            Category::Invalid => {
                out.push_str("Ignored. Cause(s):\n");
                if self.errors.contains(ValidationErrors::BAD_SCENARIO_EXECUTION) {
                    out.push_str("\tBad scenario execution.\n");
                }
                if self
                    .errors
                    .contains(ValidationErrors::CALLEE_PROMPT_NOT_PLAYED)
                {
                    out.push_str("\tCallee did not speak over the audio channel.\n");
                }
            }
        }

        if let Some(latency) = self.connect_latency() {
            out.push_str(&format!("Call Connection Latency = {latency} sec\n"));
        }
        if let Some(latency) = self.hangup_latency() {
            out.push_str(&format!("Call Hangup Latency = {latency} sec\n"));
        }

        let caller_id = self.callee.obs.remote_party.as_deref().unwrap_or("unknown");
        out.push_str(&format!("Caller ID = {caller_id}\n"));

        if let Some(sp) = &self.caller_speech {
            out.push_str(&format!("Caller's speech recognizer result: {}\n", sp.message));
            if sp.outcome == SpeechOutcome::Recognized {
                out.push_str(&format!("Confidence of recognized speech = {}\n", sp.confidence));
            }
        }
        if let Some(sp) = &self.callee_speech {
            out.push_str(&format!("Callee's speech recognizer result: {}\n", sp.message));
            if sp.outcome == SpeechOutcome::Recognized {
                out.push_str(&format!("Confidence of recognized speech = {}\n", sp.confidence));
            }
        }

        if self.volume == AudioVolume::Attenuated {
            out.push_str("Audio volume attenuation experienced by either caller or callee.");
            match self.volume_confidence {
                AudioVolumeConfidence::Good => out.push_str(" Confidence level of analyzer: Good.\n"),
                AudioVolumeConfidence::Low => out.push_str(" Confidence level of analyzer: Low.\n"),
            }
        }
        out
    }
}

fn seconds_between(earlier: chrono::NaiveDateTime, later: chrono::NaiveDateTime) -> f64 {
    ((later - earlier).num_milliseconds() as f64 / 1000.0).abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> chrono::NaiveDateTime {
        NaiveDate::from_ymd_opt(2007, 2, 14)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn empty_errors_pass() {
        assert_eq!(Category::from_errors(ValidationErrors::empty()), Category::Passed);
    }

    #[test]
    fn failure_flags_classify_failed() {
        for flag in [
            ValidationErrors::FAILED_CALL,
            ValidationErrors::MISSING_HANGUP,
            ValidationErrors::ECHO_DETECTED,
            ValidationErrors::CALLER_NOISE_DETECTED,
            ValidationErrors::CALLEE_NOISE_DETECTED,
            ValidationErrors::CALLER_NOT_HEARD,
            ValidationErrors::CALLEE_NOT_HEARD,
        ] {
            assert_eq!(Category::from_errors(flag), Category::Failed);
        }
    }

    #[test]
    fn scenario_flags_classify_invalid() {
        assert_eq!(
            Category::from_errors(ValidationErrors::BAD_SCENARIO_EXECUTION),
            Category::Invalid
        );
        assert_eq!(
            Category::from_errors(ValidationErrors::CALLEE_PROMPT_NOT_PLAYED),
            Category::Invalid
        );
        // A failure flag wins over a scenario flag.
        assert_eq!(
            Category::from_errors(
                ValidationErrors::BAD_SCENARIO_EXECUTION | ValidationErrors::ECHO_DETECTED
            ),
            Category::Failed
        );
    }

    #[test]
    fn connect_latency_uses_later_side() {
        let mut caller = CallerRecord::default();
        caller.place_call_time = Some(at(10, 0, 0));
        caller.obs.connect_time = Some(at(10, 0, 2));
        let mut callee = CalleeRecord::default();
        callee.obs.connect_time = Some(at(10, 0, 3));

        let v = IterationVerdict::new(ValidationErrors::empty(), caller, callee, None, None);
        assert_eq!(v.connect_latency(), Some(3.0));
    }

    #[test]
    fn latency_is_none_when_a_timestamp_is_unset() {
        let mut caller = CallerRecord::default();
        caller.obs.connect_time = Some(at(10, 0, 2));
        let mut callee = CalleeRecord::default();
        callee.obs.connect_time = Some(at(10, 0, 3));

        // place_call_time unset
        let v = IterationVerdict::new(ValidationErrors::empty(), caller, callee, None, None);
        assert_eq!(v.connect_latency(), None);
        assert_eq!(v.hangup_latency(), None);
    }

    #[test]
    fn narrative_lists_every_set_failure_cause() {
        let v = IterationVerdict::new(
            ValidationErrors::ECHO_DETECTED | ValidationErrors::CALLER_NOISE_DETECTED,
            CallerRecord::default(),
            CalleeRecord::default(),
            None,
            None,
        );
        let text = v.narrative();
        assert!(text.starts_with("Result = Failed."));
        assert!(text.contains("Echo detected"));
        assert!(text.contains("Phantom noise detected by caller"));
        assert!(!text.contains("hangup"));
    }
}

//! Corpus-wide accumulation of iteration verdicts and report rendering.

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;

use serde::Serialize;
use tracing::warn;

use crate::audio::{self, PowerProfile};
use crate::domain::verdict::{
    AudioVolume, AudioVolumeConfidence, Category, IterationVerdict, SpeechOutcome, SpeechResult,
    ValidationErrors,
};
use crate::matcher::StreamFault;

/// Destination for report lines.
///
/// One method, one line, no trailing newline in the argument. Anything that
/// can be written to line by line qualifies.
pub trait ReportSink {
    fn write_line(&mut self, line: &str) -> io::Result<()>;
}

impl<W: io::Write> ReportSink for W {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        writeln!(self, "{line}")
    }
}

/// The renamed recordings of one genuinely matched iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedRecordings {
    pub caller_recorded: PathBuf,
    pub callee_recorded: PathBuf,
}

/// Per-side recognizer outcome tallies.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct RecognizerTally {
    pub recognized: usize,
    pub misrecognized: usize,
    pub unrecognized: usize,
    pub echo: usize,
    #[serde(skip)]
    confidence_sum: f64,
}

impl RecognizerTally {
    fn observe(&mut self, result: &SpeechResult) {
        match result.outcome {
            SpeechOutcome::Recognized => {
                self.recognized += 1;
                self.confidence_sum += result.confidence;
            }
            SpeechOutcome::Misrecognized => self.misrecognized += 1,
            SpeechOutcome::Unrecognized => self.unrecognized += 1,
            SpeechOutcome::CallerEcho | SpeechOutcome::CalleeEcho => self.echo += 1,
        }
    }

    /// Average confidence over recognized iterations, 0 when there were
    /// none.
    pub fn average_confidence(&self) -> f64 {
        if self.recognized > 0 {
            self.confidence_sum / self.recognized as f64
        } else {
            0.0
        }
    }
}

/// Running sum and maximum of one latency measure.
#[derive(Debug, Clone, Copy, Default)]
struct LatencyTally {
    sum: f64,
    max: f64,
}

impl LatencyTally {
    fn observe(&mut self, seconds: f64) {
        self.sum += seconds;
        if seconds > self.max {
            self.max = seconds;
        }
    }
}

/// Everything the run produced, accumulated verdict by verdict.
#[derive(Debug, Default)]
pub struct AggregateStats {
    iterations: Vec<IterationVerdict>,

    passed: usize,
    failed: usize,
    invalid: usize,

    call_failed: usize,
    missing_hangup: usize,
    echo_detected: usize,
    noise_detected: usize,
    // A side "not heard" is the other side's detection failure.
    caller_detection_failure: usize,
    callee_detection_failure: usize,

    caller_recognizer: RecognizerTally,
    callee_recognizer: RecognizerTally,

    connect_latency: LatencyTally,
    release_latency: LatencyTally,

    caller_ids: BTreeMap<String, usize>,

    attenuated: usize,
    low_confidence_attenuated: usize,
}

impl AggregateStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> usize {
        self.iterations.len()
    }

    pub fn iterations(&self) -> &[IterationVerdict] {
        &self.iterations
    }

    /// Fold one verdict in. For passing iterations with both recordings
    /// on disk, also runs the attenuation analysis in both directions and
    /// stamps the verdict's audio fields before storing it.
    pub fn record(&mut self, mut verdict: IterationVerdict, recordings: Option<&MatchedRecordings>) {
        if let Some(latency) = verdict.connect_latency() {
            self.connect_latency.observe(latency);
        }
        if let Some(latency) = verdict.hangup_latency() {
            self.release_latency.observe(latency);
        }
        if let Some(id) = verdict.callee.obs.remote_party.as_deref() {
            *self.caller_ids.entry(id.to_string()).or_insert(0) += 1;
        }

        match verdict.category {
            Category::Passed => {
                self.passed += 1;
                if let Some(recordings) = recordings {
                    self.analyze_attenuation(&mut verdict, recordings);
                }
            }
            Category::Failed => self.failed += 1,
            Category::Invalid => self.invalid += 1,
        }

        let errors = verdict.errors;
        if errors.contains(ValidationErrors::FAILED_CALL) {
            self.call_failed += 1;
        }
        if errors.contains(ValidationErrors::MISSING_HANGUP) {
            self.missing_hangup += 1;
        }
        if errors.intersects(
            ValidationErrors::CALLER_NOISE_DETECTED | ValidationErrors::CALLEE_NOISE_DETECTED,
        ) {
            self.noise_detected += 1;
        }
        if errors.contains(ValidationErrors::ECHO_DETECTED) {
            self.echo_detected += 1;
        }
        if errors.contains(ValidationErrors::CALLEE_NOT_HEARD) {
            self.caller_detection_failure += 1;
        }
        if errors.contains(ValidationErrors::CALLER_NOT_HEARD) {
            self.callee_detection_failure += 1;
        }

        if let Some(speech) = &verdict.caller_speech {
            self.caller_recognizer.observe(speech);
        }
        if let Some(speech) = &verdict.callee_speech {
            self.callee_recognizer.observe(speech);
        }

        self.iterations.push(verdict);
    }

    /// Each direction compares what one party played against what the
    /// other recorded. Missing or undecodable waveforms skip the analysis.
    fn analyze_attenuation(&mut self, verdict: &mut IterationVerdict, recordings: &MatchedRecordings) {
        let caller_leg = profile_pair(
            verdict.callee.obs.wav_file_played.as_deref(),
            &recordings.caller_recorded,
        );
        let callee_leg = profile_pair(
            verdict.caller.obs.wav_file_played.as_deref(),
            &recordings.callee_recorded,
        );
        let (Some(caller_leg), Some(callee_leg)) = (caller_leg, callee_leg) else {
            return;
        };

        let (caller_volume, caller_conf) = audio::attenuation(&caller_leg.0, &caller_leg.1);
        let (callee_volume, callee_conf) = audio::attenuation(&callee_leg.0, &callee_leg.1);

        if caller_volume == AudioVolume::Attenuated || callee_volume == AudioVolume::Attenuated {
            self.attenuated += 1;
            verdict.volume = AudioVolume::Attenuated;

            if caller_conf == AudioVolumeConfidence::Low || callee_conf == AudioVolumeConfidence::Low
            {
                verdict.volume_confidence = AudioVolumeConfidence::Low;
                self.low_confidence_attenuated += 1;
            }
        }
    }

    /// Render the full textual report. Summary sections first, then one
    /// narrative block per iteration in consumption order.
    pub fn write_report(&self, sink: &mut dyn ReportSink) -> io::Result<()> {
        let total = self.total();
        let pass_pct = if total > 0 {
            self.passed as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        sink.write_line("")?;
        sink.write_line("\t\t\tTEST SUMMARY")?;
        sink.write_line("****************************************************")?;
        sink.write_line("")?;
        sink.write_line(&format!("Pass Percentage = {}%", trunc3(pass_pct)))?;
        sink.write_line("")?;
        sink.write_line(&format!("Total Iterations = {total}"))?;
        sink.write_line(&format!("Passed Iterations = {}", self.passed))?;
        sink.write_line(&format!("Failed Iterations = {}", self.failed))?;
        if self.invalid > 0 {
            sink.write_line(&format!("Ignored Iterations = {}", self.invalid))?;
        }

        sink.write_line("")?;
        sink.write_line("Audio Quality:")?;
        sink.write_line(&format!("\tNum. calls having echo = {}", self.echo_detected))?;
        sink.write_line(&format!(
            "\tNum. calls having phantom noise = {}",
            self.noise_detected
        ))?;
        sink.write_line(&format!(
            "\tNum. calls where callee did not detect caller's audio = {}",
            self.callee_detection_failure
        ))?;
        sink.write_line(&format!(
            "\tNum. calls where caller did not detect callee's audio = {}",
            self.caller_detection_failure
        ))?;

        sink.write_line("")?;
        sink.write_line("Call Characteristics")?;
        sink.write_line(&format!(
            "\tNum. call establishment failures = {}",
            self.call_failed
        ))?;
        sink.write_line(&format!(
            "\tNum. calls where callee failed to detect hangup = {}",
            self.missing_hangup
        ))?;
        // Failed calls never connected, so they carry no latency.
        let connected = total.saturating_sub(self.call_failed);
        if connected > 0 {
            sink.write_line(&format!(
                "\tCall Connection Latency: Avg = {} sec. Max = {} sec",
                trunc3(self.connect_latency.sum / connected as f64),
                self.connect_latency.max
            ))?;
            sink.write_line(&format!(
                "\tCall Hangup Latency: Avg = {} sec. Max = {} sec",
                trunc3(self.release_latency.sum / connected as f64),
                self.release_latency.max
            ))?;
        }
        sink.write_line("")?;

        if !self.caller_ids.is_empty() {
            if self.caller_ids.len() == 1 {
                sink.write_line("Caller ID Detection: Consistent")?;
            } else {
                sink.write_line("Caller ID Detection: Inconsistent")?;
                sink.write_line("\tDifferent calls showed different caller IDs")?;
            }
            for (id, count) in &self.caller_ids {
                sink.write_line(&format!("\tCaller ID {id} was found in {count} calls"))?;
            }
            sink.write_line("")?;
        }

        self.write_recognizer_section(sink, "Caller", &self.caller_recognizer)?;
        sink.write_line("")?;
        self.write_recognizer_section(sink, "Callee", &self.callee_recognizer)?;

        if self.attenuated > 0 {
            let good = self.attenuated.saturating_sub(self.low_confidence_attenuated);
            sink.write_line("")?;
            sink.write_line("Audio Signal Strength Analysis")?;
            if good > 0 {
                sink.write_line(&format!(
                    "\tIterations with Reduced Volume (Good Confidence) = {good}"
                ))?;
            }
            if self.low_confidence_attenuated > 0 {
                sink.write_line(&format!(
                    "\tIterations with Reduced Volume (Low Confidence) = {}",
                    self.low_confidence_attenuated
                ))?;
            }
        }
        sink.write_line("****************************************************")?;

        sink.write_line("")?;
        sink.write_line("Individual Iteration Results")?;
        for (index, verdict) in self.iterations.iter().enumerate() {
            sink.write_line(&format!("Iteration {}", index + 1))?;
            for line in verdict.narrative().lines() {
                sink.write_line(line)?;
            }
            sink.write_line("")?;
        }
        Ok(())
    }

    fn write_recognizer_section(
        &self,
        sink: &mut dyn ReportSink,
        side: &str,
        tally: &RecognizerTally,
    ) -> io::Result<()> {
        sink.write_line(&format!("{side}'s Speech Recognizer's Outcome"))?;
        sink.write_line(&format!(
            "\tIterations with correctly recognized speech = {}",
            tally.recognized
        ))?;
        sink.write_line(&format!(
            "\tIterations with misrecognized speech = {}",
            tally.misrecognized
        ))?;
        sink.write_line(&format!(
            "\tIterations with unrecognized speech = {}",
            tally.unrecognized
        ))?;
        sink.write_line(&format!(
            "\tIterations where recognizer detected echo = {}",
            tally.echo
        ))?;
        sink.write_line(&format!(
            "\tAvg. Confidence of recognized speech = {}",
            trunc3(tally.average_confidence())
        ))
    }

    /// The machine-readable counterpart of the report.
    pub fn summary(&self, faults: &[StreamFault]) -> RunSummary {
        let total = self.total();
        RunSummary {
            total_iterations: total,
            passed: self.passed,
            failed: self.failed,
            invalid: self.invalid,
            pass_percentage: if total > 0 {
                self.passed as f64 / total as f64 * 100.0
            } else {
                0.0
            },
            call_failures: self.call_failed,
            missing_hangups: self.missing_hangup,
            echo_iterations: self.echo_detected,
            noise_iterations: self.noise_detected,
            caller_detection_failures: self.caller_detection_failure,
            callee_detection_failures: self.callee_detection_failure,
            caller_recognizer: SummaryTally::from(&self.caller_recognizer),
            callee_recognizer: SummaryTally::from(&self.callee_recognizer),
            avg_connect_latency_secs: self.average_latency(self.connect_latency.sum),
            max_connect_latency_secs: self.connect_latency.max,
            avg_hangup_latency_secs: self.average_latency(self.release_latency.sum),
            max_hangup_latency_secs: self.release_latency.max,
            caller_id_consistent: (!self.caller_ids.is_empty()).then(|| self.caller_ids.len() == 1),
            attenuated_iterations: self.attenuated,
            low_confidence_attenuations: self.low_confidence_attenuated,
            stream_faults: faults.to_vec(),
        }
    }

    fn average_latency(&self, sum: f64) -> Option<f64> {
        let connected = self.total().saturating_sub(self.call_failed);
        (connected > 0).then(|| sum / connected as f64)
    }
}

fn profile_pair(played: Option<&str>, recorded: &std::path::Path) -> Option<(PowerProfile, PowerProfile)> {
    let played = played?;
    let played_profile = match PowerProfile::from_wav(std::path::Path::new(played)) {
        Ok(profile) => profile,
        Err(err) => {
            warn!(file = played, %err, "skipping attenuation analysis");
            return None;
        }
    };
    let recorded_profile = match PowerProfile::from_wav(recorded) {
        Ok(profile) => profile,
        Err(err) => {
            warn!(file = %recorded.display(), %err, "skipping attenuation analysis");
            return None;
        }
    };
    Some((played_profile, recorded_profile))
}

/// Serializable run summary written alongside the textual report.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub total_iterations: usize,
    pub passed: usize,
    pub failed: usize,
    pub invalid: usize,
    pub pass_percentage: f64,
    pub call_failures: usize,
    pub missing_hangups: usize,
    pub echo_iterations: usize,
    pub noise_iterations: usize,
    pub caller_detection_failures: usize,
    pub callee_detection_failures: usize,
    pub caller_recognizer: SummaryTally,
    pub callee_recognizer: SummaryTally,
    pub avg_connect_latency_secs: Option<f64>,
    pub max_connect_latency_secs: f64,
    pub avg_hangup_latency_secs: Option<f64>,
    pub max_hangup_latency_secs: f64,
    pub caller_id_consistent: Option<bool>,
    pub attenuated_iterations: usize,
    pub low_confidence_attenuations: usize,
    pub stream_faults: Vec<StreamFault>,
}

/// Recognizer tallies with the average folded in for serialization.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SummaryTally {
    pub recognized: usize,
    pub misrecognized: usize,
    pub unrecognized: usize,
    pub echo: usize,
    pub avg_confidence: f64,
}

impl From<&RecognizerTally> for SummaryTally {
    fn from(tally: &RecognizerTally) -> Self {
        Self {
            recognized: tally.recognized,
            misrecognized: tally.misrecognized,
            unrecognized: tally.unrecognized,
            echo: tally.echo,
            avg_confidence: tally.average_confidence(),
        }
    }
}

/// Decimal truncation to at most three places, no rounding.
fn trunc3(value: f64) -> String {
    let rendered = value.to_string();
    match rendered.find('.') {
        Some(dot) if rendered.len() - dot > 4 => rendered[..dot + 4].to_string(),
        _ => rendered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::{CalleeRecord, CallerRecord};
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2007, 2, 14)
            .unwrap()
            .and_hms_opt(10, 0, s)
            .unwrap()
    }

    fn passing_verdict(caller_id: &str) -> IterationVerdict {
        let mut caller = CallerRecord::default();
        caller.place_call_time = Some(at(0));
        caller.release_request_time = Some(at(10));
        caller.obs.connect_time = Some(at(2));
        caller.obs.release_time = Some(at(11));
        let mut callee = CalleeRecord::default();
        callee.obs.connect_time = Some(at(3));
        callee.obs.release_time = Some(at(12));
        callee.obs.remote_party = Some(caller_id.to_string());
        IterationVerdict::new(ValidationErrors::empty(), caller, callee, None, None)
    }

    // ---- truncation ----

    #[test]
    fn trunc3_cuts_without_rounding() {
        assert_eq!(trunc3(33.33333333), "33.333");
        assert_eq!(trunc3(66.6667), "66.666");
        assert_eq!(trunc3(50.0), "50");
        assert_eq!(trunc3(0.25), "0.25");
    }

    // ---- accumulation ----

    #[test]
    fn counters_and_latencies_accumulate() {
        let mut stats = AggregateStats::new();
        stats.record(passing_verdict("1001"), None);

        let failed = IterationVerdict::new(
            ValidationErrors::FAILED_CALL,
            CallerRecord::default(),
            CalleeRecord::default(),
            None,
            None,
        );
        stats.record(failed, None);

        assert_eq!(stats.total(), 2);
        assert_eq!(stats.passed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.call_failed, 1);

        let summary = stats.summary(&[]);
        assert_eq!(summary.pass_percentage, 50.0);
        // Latency averaged over total - failed_call = 1 iteration. Connect
        // latency is placed(0) to later connect(3).
        assert_eq!(summary.avg_connect_latency_secs, Some(3.0));
        assert_eq!(summary.max_connect_latency_secs, 3.0);
        // Hangup: request(10) to later release(12).
        assert_eq!(summary.avg_hangup_latency_secs, Some(2.0));
        assert_eq!(summary.caller_id_consistent, Some(true));
    }

    #[test]
    fn distinct_caller_ids_flag_inconsistency() {
        let mut stats = AggregateStats::new();
        stats.record(passing_verdict("1001"), None);
        stats.record(passing_verdict("2002"), None);
        assert_eq!(stats.summary(&[]).caller_id_consistent, Some(false));
    }

    // ---- report rendering ----

    #[test]
    fn report_contains_summary_and_iteration_blocks() {
        let mut stats = AggregateStats::new();
        stats.record(passing_verdict("1001"), None);

        let mut buf: Vec<u8> = Vec::new();
        stats.write_report(&mut buf).unwrap();
        let report = String::from_utf8(buf).unwrap();

        assert!(report.contains("TEST SUMMARY"));
        assert!(report.contains("Pass Percentage = 100%"));
        assert!(report.contains("Total Iterations = 1"));
        assert!(report.contains("Caller ID Detection: Consistent"));
        assert!(report.contains("Caller ID 1001 was found in 1 calls"));
        assert!(report.contains("Individual Iteration Results"));
        assert!(report.contains("Iteration 1"));
        assert!(!report.contains("Audio Signal Strength Analysis"));
    }

    #[test]
    fn empty_run_renders_zero_percent() {
        let stats = AggregateStats::new();
        let mut buf: Vec<u8> = Vec::new();
        stats.write_report(&mut buf).unwrap();
        let report = String::from_utf8(buf).unwrap();
        assert!(report.contains("Pass Percentage = 0%"));
        assert!(!report.contains("Call Connection Latency"));
    }
}

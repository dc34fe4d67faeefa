//! Engine facade: ties the matcher, rule pipeline, attenuation analysis
//! and aggregation together over a set of opened inputs.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::aggregate::{AggregateStats, MatchedRecordings, ReportSink, RunSummary};
use crate::domain::error::{AnalyzerError, Result};
use crate::grammar::GrammarIndex;
use crate::matcher::{CausalMatcher, MatchedPair};
use crate::rules::RulePipeline;

/// One fully prepared analysis run.
///
/// Construction opens every input; a missing file fails here rather than
/// partway through the run.
pub struct Analyzer {
    caller_log: BufReader<File>,
    callee_log: BufReader<File>,
    grammar: GrammarIndex,
    results_dir: PathBuf,
}

impl Analyzer {
    pub fn open(
        caller_log: &Path,
        callee_log: &Path,
        grammar_file: &Path,
        map_file: &Path,
        results_dir: &Path,
    ) -> Result<Self> {
        let caller_log = BufReader::new(open_input(caller_log)?);
        let callee_log = BufReader::new(open_input(callee_log)?);
        let grammar = GrammarIndex::load(grammar_file, map_file)?;
        if !results_dir.is_dir() {
            return Err(AnalyzerError::InputUnavailable {
                path: results_dir.display().to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "results directory not found",
                ),
            });
        }
        Ok(Self {
            caller_log,
            callee_log,
            grammar,
            results_dir: results_dir.to_path_buf(),
        })
    }

    /// Drive the whole pipeline and render the report into `sink`.
    ///
    /// Verdicts are produced and reported in the order pairs come off the
    /// matcher.
    pub fn run(self, sink: &mut dyn ReportSink) -> Result<RunSummary> {
        let pipeline = RulePipeline::new(&self.grammar);
        let mut matcher = CausalMatcher::new(self.caller_log, self.callee_log);
        let mut stats = AggregateStats::new();

        let mut iteration = 0usize;
        while let Some(pair) = matcher.next_pair() {
            iteration += 1;
            let recordings = if pair.genuine {
                match_recordings(&self.results_dir, &pair)
            } else {
                None
            };
            let verdict = pipeline.evaluate(&pair.caller, &pair.callee);
            info!(
                iteration,
                category = ?verdict.category,
                errors = ?verdict.errors,
                "iteration judged"
            );
            stats.record(verdict, recordings.as_ref());
        }

        for fault in matcher.faults() {
            warn!(%fault, "stream fault");
        }

        stats.write_report(sink)?;
        Ok(stats.summary(matcher.faults()))
    }
}

/// Rename both recordings of a genuine pair to their `_matched` names and
/// hand the new paths back. Both originals must exist; rename failures are
/// logged and drop the recordings from the audio analysis.
fn match_recordings(results_dir: &Path, pair: &MatchedPair) -> Option<MatchedRecordings> {
    let caller_line = pair.caller_line?;
    let callee_line = pair.callee_line?;

    let caller_src = results_dir.join(format!("Caller_RecordedWav_{caller_line}.wav"));
    let callee_src = results_dir.join(format!("Callee_RecordedWav_{callee_line}.wav"));
    if !caller_src.is_file() || !callee_src.is_file() {
        debug!(
            caller = %caller_src.display(),
            callee = %callee_src.display(),
            "recordings not present, skipping audio analysis"
        );
        return None;
    }

    let caller_dst = results_dir.join(format!("Caller_RecordedWav_{caller_line}_matched.wav"));
    let callee_dst = results_dir.join(format!("Callee_RecordedWav_{callee_line}_matched.wav"));

    if let Err(err) = fs::rename(&caller_src, &caller_dst) {
        warn!(from = %caller_src.display(), %err, "failed to rename recording");
        return None;
    }
    if let Err(err) = fs::rename(&callee_src, &callee_dst) {
        warn!(from = %callee_src.display(), %err, "failed to rename recording");
        return None;
    }

    Some(MatchedRecordings {
        caller_recorded: caller_dst,
        callee_recorded: callee_dst,
    })
}

fn open_input(path: &Path) -> Result<File> {
    File::open(path).map_err(|source| AnalyzerError::InputUnavailable {
        path: path.display().to_string(),
        source,
    })
}

//! Causal matcher: pairs the caller and callee log streams.
//!
//! The two endpoints run as separate processes with independently fallible
//! hangup detection, so a record can be missing entirely or an endpoint can
//! answer a call whose true partner was already consumed by an earlier
//! mismatch. The matcher reads both streams in lock-step, keeps at most one
//! pending record per side, and classifies each pending pair by temporal
//! interval overlap. Every decision consumes at least one pending slot, so
//! matching always makes progress and every input line is consumed exactly
//! once.
//!
//! A line that fails to parse poisons its stream: no further records are
//! pulled from it, a fault is recorded, and the healthy stream drains by
//! pairing each remaining record with a synthetic empty counterpart.

use std::io::BufRead;

use serde::Serialize;
use tracing::{debug, trace};

use crate::codec;
use crate::domain::record::{instant_or_unset, CalleeRecord, CallerRecord, Party};

/// Causal relationship between one pending caller record and one pending
/// callee record. Total over all connect-time combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CausalOrder {
    /// Neither side connected; both records are degenerate but are emitted
    /// as a matched pair so the pipeline reports the failed call.
    BothUnset,
    /// Only the caller's connect time is unset.
    CallerUnset,
    /// Only the callee's connect time is unset.
    CalleeUnset,
    /// The intervals overlap: both records describe the same call.
    SameCall,
    /// The callee's interval lies entirely at or after the caller's
    /// release: the caller record's partner never arrived.
    CallerOrphaned,
    /// The callee's interval lies entirely at or before the caller's
    /// connect: the callee record has no sensible caller partner.
    CalleeOrphaned,
}

/// Classify the causal order of two pending records by interval overlap on
/// `[connect, release)`, with unset instants compared as the zero sentinel.
pub fn causal_order(caller: &CallerRecord, callee: &CalleeRecord) -> CausalOrder {
    match (caller.obs.connect_time, callee.obs.connect_time) {
        (None, None) => CausalOrder::BothUnset,
        (None, Some(_)) => CausalOrder::CallerUnset,
        (Some(_), None) => CausalOrder::CalleeUnset,
        (Some(caller_connect), Some(callee_connect)) => {
            let caller_release = instant_or_unset(caller.obs.release_time);
            let callee_release = instant_or_unset(callee.obs.release_time);
            if (caller_connect <= callee_connect && callee_connect < caller_release)
                || (callee_connect <= caller_connect && caller_connect < callee_release)
            {
                CausalOrder::SameCall
            } else if callee_connect >= caller_release {
                CausalOrder::CallerOrphaned
            } else {
                CausalOrder::CalleeOrphaned
            }
        }
    }
}

/// Matcher state, advanced as slots fill and streams end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherState {
    AwaitingCaller,
    AwaitingCallee,
    HaveBoth,
    CalleeExhausted,
    Done,
}

/// One emitted pair: a caller and callee record the pipeline should judge
/// together. Synthetic sides carry no line number.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedPair {
    pub caller: CallerRecord,
    pub callee: CalleeRecord,
    pub caller_line: Option<usize>,
    pub callee_line: Option<usize>,
    /// True when both sides are real records matched as the same call;
    /// only genuine pairs are eligible for recording matching.
    pub genuine: bool,
}

/// A stream defect that stopped further reads from one side.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StreamFault {
    pub party: Party,
    pub line: usize,
    pub reason: String,
}

impl std::fmt::Display for StreamFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} log line {}: {}", self.party, self.line, self.reason)
    }
}

struct LineSource<R: BufRead> {
    reader: R,
    line: usize,
    exhausted: bool,
    poisoned: bool,
}

impl<R: BufRead> LineSource<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            line: 0,
            exhausted: false,
            poisoned: false,
        }
    }

    fn live(&self) -> bool {
        !self.exhausted && !self.poisoned
    }

    /// Read the next line; `Ok(None)` at end of stream.
    fn next_line(&mut self) -> std::io::Result<Option<(usize, String)>> {
        let mut buf = String::new();
        let read = self.reader.read_line(&mut buf)?;
        if read == 0 {
            self.exhausted = true;
            return Ok(None);
        }
        self.line += 1;
        while buf.ends_with('\n') || buf.ends_with('\r') {
            buf.pop();
        }
        Ok(Some((self.line, buf)))
    }
}

/// Lock-step pairing of the two log streams.
pub struct CausalMatcher<R: BufRead, S: BufRead> {
    caller_src: LineSource<R>,
    callee_src: LineSource<S>,
    pending_caller: Option<(usize, CallerRecord)>,
    pending_callee: Option<(usize, CalleeRecord)>,
    state: MatcherState,
    faults: Vec<StreamFault>,
}

impl<R: BufRead, S: BufRead> CausalMatcher<R, S> {
    pub fn new(caller: R, callee: S) -> Self {
        Self {
            caller_src: LineSource::new(caller),
            callee_src: LineSource::new(callee),
            pending_caller: None,
            pending_callee: None,
            state: MatcherState::AwaitingCaller,
            faults: Vec::new(),
        }
    }

    pub fn state(&self) -> MatcherState {
        self.state
    }

    /// Stream defects observed so far (at most one per stream).
    pub fn faults(&self) -> &[StreamFault] {
        &self.faults
    }

    pub fn into_faults(self) -> Vec<StreamFault> {
        self.faults
    }

    fn fill_caller(&mut self) {
        while self.pending_caller.is_none() && self.caller_src.live() {
            self.state = MatcherState::AwaitingCaller;
            match self.caller_src.next_line() {
                Ok(Some((line, text))) => match codec::parse_caller(&text) {
                    Ok(record) => self.pending_caller = Some((line, record)),
                    Err(e) => self.poison(Party::Caller, line, e.to_string()),
                },
                Ok(None) => {}
                Err(e) => {
                    let line = self.caller_src.line + 1;
                    self.poison(Party::Caller, line, e.to_string());
                }
            }
        }
    }

    fn fill_callee(&mut self) {
        while self.pending_callee.is_none() && self.callee_src.live() {
            self.state = MatcherState::AwaitingCallee;
            match self.callee_src.next_line() {
                Ok(Some((line, text))) => match codec::parse_callee(&text) {
                    Ok(record) => self.pending_callee = Some((line, record)),
                    Err(e) => self.poison(Party::Callee, line, e.to_string()),
                },
                Ok(None) => {}
                Err(e) => {
                    let line = self.callee_src.line + 1;
                    self.poison(Party::Callee, line, e.to_string());
                }
            }
        }
    }

    fn poison(&mut self, party: Party, line: usize, reason: String) {
        let fault = StreamFault {
            party,
            line,
            reason,
        };
        debug!(%fault, "stream poisoned, no further records will be read from it");
        match party {
            Party::Caller => self.caller_src.poisoned = true,
            Party::Callee => self.callee_src.poisoned = true,
        }
        self.faults.push(fault);
    }

    /// Produce the next matched pair, or `None` when both streams are
    /// fully consumed.
    pub fn next_pair(&mut self) -> Option<MatchedPair> {
        loop {
            if self.state == MatcherState::Done {
                return None;
            }
            self.fill_caller();
            self.fill_callee();

            match (self.pending_caller.take(), self.pending_callee.take()) {
                (Some((caller_line, caller)), Some((callee_line, callee))) => {
                    self.state = MatcherState::HaveBoth;
                    let order = causal_order(&caller, &callee);
                    trace!(?order, caller_line, callee_line, "classified pending pair");
                    match order {
                        CausalOrder::SameCall | CausalOrder::BothUnset => {
                            return Some(MatchedPair {
                                caller,
                                callee,
                                caller_line: Some(caller_line),
                                callee_line: Some(callee_line),
                                genuine: true,
                            });
                        }
                        CausalOrder::CallerUnset => {
                            // The degenerate caller record stays pending and
                            // re-attempts against the next callee record.
                            self.pending_caller = Some((caller_line, caller));
                            return Some(MatchedPair {
                                caller: CallerRecord::default(),
                                callee,
                                caller_line: None,
                                callee_line: Some(callee_line),
                                genuine: false,
                            });
                        }
                        CausalOrder::CalleeUnset => {
                            self.pending_callee = Some((callee_line, callee));
                            return Some(MatchedPair {
                                caller,
                                callee: CalleeRecord::default(),
                                caller_line: Some(caller_line),
                                callee_line: None,
                                genuine: false,
                            });
                        }
                        CausalOrder::CallerOrphaned => {
                            self.pending_callee = Some((callee_line, callee));
                            return Some(MatchedPair {
                                caller,
                                callee: CalleeRecord::default(),
                                caller_line: Some(caller_line),
                                callee_line: None,
                                genuine: false,
                            });
                        }
                        CausalOrder::CalleeOrphaned => {
                            debug!(callee_line, "orphaned callee record discarded");
                            self.pending_caller = Some((caller_line, caller));
                            // No emission; read the next callee record.
                        }
                    }
                }
                (Some((caller_line, caller)), None) => {
                    // Callee stream over (exhausted or poisoned): drain the
                    // caller side against synthetic empty partners.
                    self.state = MatcherState::CalleeExhausted;
                    return Some(MatchedPair {
                        caller,
                        callee: CalleeRecord::default(),
                        caller_line: Some(caller_line),
                        callee_line: None,
                        genuine: false,
                    });
                }
                (None, Some((callee_line, callee))) => {
                    if self.caller_src.poisoned {
                        // A corrupted caller stream still owes the callee
                        // records a verdict each.
                        return Some(MatchedPair {
                            caller: CallerRecord::default(),
                            callee,
                            caller_line: None,
                            callee_line: Some(callee_line),
                            genuine: false,
                        });
                    }
                    // Caller log simply ended first; the remaining callee
                    // records have no possible partner.
                    debug!(callee_line, "callee record past end of caller log discarded");
                }
                (None, None) => {
                    self.state = MatcherState::Done;
                    return None;
                }
            }
        }
    }
}

impl<R: BufRead, S: BufRead> Iterator for CausalMatcher<R, S> {
    type Item = MatchedPair;

    fn next(&mut self) -> Option<MatchedPair> {
        self.next_pair()
    }
}

//! Settle buffer for retrieval rounds on the learner.
//!
//! A round opens with the first cross-checked holder report for a file and
//! collects further reports until a one-shot settle timer fires. A settled
//! round leaves a tombstone behind so that reports from slow holders are
//! dropped instead of reopening the round; the tombstone is cleared when
//! the learner next sees a retrieval request for the file.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::task::JoinHandle;
use tracing::debug;

use covey_types::ValidatedChunk;

enum Round {
    /// Reports are being collected and the settle timer is armed.
    Collecting {
        chunks: Vec<ValidatedChunk>,
        timer: JoinHandle<()>,
    },
    /// The round was flushed; reports arriving now are late.
    Flushed,
}

/// What happened to a recorded report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// First report of a fresh round; the settle timer was armed.
    Armed,
    /// Joined a round that was already collecting.
    Appended,
    /// The round had already settled; the report was dropped.
    Late,
}

/// Per-file retrieval rounds, alive only on the learner.
#[derive(Default)]
pub struct RetrievalRounds {
    rounds: Mutex<HashMap<String, Round>>,
}

impl RetrievalRounds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make way for a fresh round by dropping a settled round's tombstone.
    ///
    /// A round that is still collecting keeps collecting; incoming reports
    /// for the new request simply join it.
    pub fn begin(&self, file_name: &str) {
        let mut rounds = self.rounds.lock().expect("rounds lock poisoned");
        if matches!(rounds.get(file_name), Some(Round::Flushed)) {
            debug!(file_name, "clearing settled retrieval round");
            rounds.remove(file_name);
        }
    }

    /// Record cross-checked chunks into a file's round.
    ///
    /// `arm` is called to start the settle timer when this report opens the
    /// round. Within a round the first report of a chunk name wins; later
    /// copies of the same chunk are ignored.
    pub fn record(
        &self,
        file_name: &str,
        mut validated: Vec<ValidatedChunk>,
        arm: impl FnOnce() -> JoinHandle<()>,
    ) -> RecordOutcome {
        let mut rounds = self.rounds.lock().expect("rounds lock poisoned");
        match rounds.get_mut(file_name) {
            None => {
                let timer = arm();
                rounds.insert(
                    file_name.to_string(),
                    Round::Collecting {
                        chunks: validated,
                        timer,
                    },
                );
                RecordOutcome::Armed
            }
            Some(Round::Collecting { chunks, .. }) => {
                validated.retain(|candidate| {
                    !chunks
                        .iter()
                        .any(|known| known.record.chunk_name == candidate.record.chunk_name)
                });
                chunks.extend(validated);
                RecordOutcome::Appended
            }
            Some(Round::Flushed) => RecordOutcome::Late,
        }
    }

    /// Settle a round: take its chunks and leave the tombstone behind.
    ///
    /// Returns `None` when there is nothing to flush, e.g. the round was
    /// cancelled after the timer task was already scheduled.
    pub fn settle(&self, file_name: &str) -> Option<Vec<ValidatedChunk>> {
        let mut rounds = self.rounds.lock().expect("rounds lock poisoned");
        let round = rounds.get_mut(file_name)?;
        match std::mem::replace(round, Round::Flushed) {
            Round::Collecting { chunks, .. } => Some(chunks),
            Round::Flushed => None,
        }
    }

    /// Drop every round and cancel armed timers, for when the node loses
    /// the learner role.
    pub fn cancel_all(&self) {
        let mut rounds = self.rounds.lock().expect("rounds lock poisoned");
        for round in rounds.values() {
            if let Round::Collecting { timer, .. } = round {
                timer.abort();
            }
        }
        rounds.clear();
    }

    /// Whether a round for this file is currently collecting reports.
    pub fn is_collecting(&self, file_name: &str) -> bool {
        let rounds = self.rounds.lock().expect("rounds lock poisoned");
        matches!(rounds.get(file_name), Some(Round::Collecting { .. }))
    }

    /// Whether a settled round's tombstone exists for this file.
    pub fn is_settled(&self, file_name: &str) -> bool {
        let rounds = self.rounds.lock().expect("rounds lock poisoned");
        matches!(rounds.get(file_name), Some(Round::Flushed))
    }
}

impl std::fmt::Debug for RetrievalRounds {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rounds = self.rounds.lock().expect("rounds lock poisoned");
        f.debug_struct("RetrievalRounds")
            .field("rounds", &rounds.len())
            .finish_non_exhaustive()
    }
}

use std::collections::{BTreeMap, VecDeque};
use std::fmt::Debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestDecision<R> {
    /// `sequence` is the next expected one. Apply it, then `record()` the result.
    Apply,
    /// Already applied. Answer with the recorded result, don't apply again.
    Duplicate(R),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SequenceError {
    // Fatal to the scope. Every later message for the scope fails with `ScopeFailed`.
    #[error("Sequence gap: expected {expected}, received {received}")]
    Gap { expected: u64, received: u64 },
    #[error("Scope failed earlier on out of order sequence {failed_at}")]
    ScopeFailed { failed_at: u64 },
    // Duplicate of a result that has aged out of the retention window.
    #[error("Sequence {sequence} already applied, recorded result no longer retained")]
    Expired { sequence: u64 },
}

#[derive(Debug)]
struct ScopeState<R> {
    next_expected: u64,
    // Most recent results, oldest first.
    results: VecDeque<(u64, R)>,
    failed_at: Option<u64>,
}

impl<R> Default for ScopeState<R> {
    fn default() -> Self {
        ScopeState {
            next_expected: 0,
            results: VecDeque::new(),
            failed_at: None,
        }
    }
}

/// Receiving side. Enforces strict in-order delivery per scope and replays recorded results for
/// retransmitted sequence numbers, giving exactly-once application across retries.
#[derive(Debug)]
pub struct ReceiveSequencer<S: Ord, R: Clone> {
    scopes: BTreeMap<S, ScopeState<R>>,
    retained_results: usize,
}

impl<S: Ord + Clone + Debug, R: Clone> ReceiveSequencer<S, R> {
    pub fn new(retained_results: usize) -> Self {
        ReceiveSequencer {
            scopes: BTreeMap::new(),
            retained_results: retained_results.max(1),
        }
    }

    pub fn ingest(&mut self, scope: &S, sequence: u64) -> Result<IngestDecision<R>, SequenceError> {
        let state = self.scopes.entry(scope.clone()).or_default();

        if let Some(failed_at) = state.failed_at {
            return Err(SequenceError::ScopeFailed { failed_at });
        }

        if sequence == state.next_expected {
            return Ok(IngestDecision::Apply);
        }

        if sequence < state.next_expected {
            return state
                .results
                .iter()
                .find(|(recorded, _)| *recorded == sequence)
                .map(|(_, result)| IngestDecision::Duplicate(result.clone()))
                .ok_or(SequenceError::Expired { sequence });
        }

        let expected = state.next_expected;
        state.failed_at = Some(sequence);
        Err(SequenceError::Gap {
            expected,
            received: sequence,
        })
    }

    /// Record the outcome of applying `sequence`, which must be the one `ingest()` just accepted.
    pub fn record(&mut self, scope: &S, sequence: u64, result: R) {
        let retained_results = self.retained_results;
        let state = self.scopes.entry(scope.clone()).or_default();
        debug_assert_eq!(sequence, state.next_expected, "recorded out of order for {:?}", scope);

        state.results.push_back((sequence, result));
        while state.results.len() > retained_results {
            state.results.pop_front();
        }
        state.next_expected = sequence + 1;
    }

    pub fn last_applied(&self, scope: &S) -> Option<u64> {
        self.scopes
            .get(scope)
            .and_then(|state| state.next_expected.checked_sub(1))
    }

    pub fn is_failed(&self, scope: &S) -> bool {
        self.scopes.get(scope).map_or(false, |state| state.failed_at.is_some())
    }

    /// Number of scopes with state.
    pub fn scopes(&self) -> usize {
        self.scopes.len()
    }

    /// Drop every scope matching `predicate`. Used when a client generation retires or a scope
    /// is torn down.
    pub fn purge<F: Fn(&S) -> bool>(&mut self, predicate: F) {
        self.scopes.retain(|scope, _| !predicate(scope));
    }
}

//! Heuristic mix and lookahead depth used for one game.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ledger::OutcomeRecord;

/// Deepest lookahead a policy may request.
pub const MAX_LOOKAHEAD: u8 = 3;

/// Move-scoring heuristic picked per decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Heuristic {
    /// Prefer the direction that merges the highest adjacent equal pair.
    MergeHighestPair,
    /// Prefer the direction whose simulated move scores the most points.
    MaximizeSimulatedScore,
}

/// Complementary probabilities of the two heuristics; `a1 + a2 == 1`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    /// Probability of [`Heuristic::MergeHighestPair`].
    pub a1: f64,
    /// Probability of [`Heuristic::MaximizeSimulatedScore`].
    pub a2: f64,
}

impl Weights {
    pub fn new(a1: f64) -> Self {
        let a1 = a1.clamp(0.0, 1.0);
        Weights { a1, a2: 1.0 - a1 }
    }
}

/// Immutable configuration a game is played with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Policy {
    pub lookahead: u8,
    pub weights: Weights,
}

impl Policy {
    /// `lookahead` is capped at [`MAX_LOOKAHEAD`]; `heuristic_weight` is clamped to `[0, 1]`.
    pub fn new(lookahead: u8, heuristic_weight: f64) -> Self {
        Policy { lookahead: lookahead.min(MAX_LOOKAHEAD), weights: Weights::new(heuristic_weight) }
    }

    /// Draw a lookahead uniformly from `0..=3` and a weight uniformly from `[0, 1)`.
    pub fn randomize<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let lookahead = rng.gen_range(0..=MAX_LOOKAHEAD);
        let a1: f64 = rng.gen();
        Policy { lookahead, weights: Weights { a1, a2: 1.0 - a1 } }
    }

    /// Map a uniform sample in `[0, 1)` onto a heuristic.
    #[inline]
    pub fn choose_heuristic(&self, sample: f64) -> Heuristic {
        if sample < self.weights.a1 { Heuristic::MergeHighestPair } else { Heuristic::MaximizeSimulatedScore }
    }

    /// First-trial record of this policy finishing with `score`.
    pub fn serialize(&self, score: u64) -> OutcomeRecord {
        let score = score as f64;
        OutcomeRecord { count: 1, lookahead: self.lookahead, weights: self.weights, score, best_score: score }
    }

    /// Recover the policy and its averaged score from a record.
    pub fn deserialize(record: &OutcomeRecord) -> (Policy, f64) {
        (Policy { lookahead: record.lookahead, weights: record.weights }, record.score)
    }

    /// Exact key match used by the outcome ledger.
    #[inline]
    pub fn matches(&self, record: &OutcomeRecord) -> bool {
        record.lookahead == self.lookahead && record.weights.a1 == self.weights.a1 && record.weights.a2 == self.weights.a2
    }
}

impl std::fmt::Display for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "lookahead={} a1={:.4} a2={:.4}", self.lookahead, self.weights.a1, self.weights.a2)
    }
}

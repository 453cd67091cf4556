//! Persisted per-policy outcome statistics and between-game policy rotation.
//!
//! The ledger is a JSON array stored under a single key:
//! `[{"count": 3, "lookahead": 1, "weights": {"a1": 0.4, "a2": 0.6}, "score": 812.5, "bestScore": 2300.0}, ...]`.
//! It is read and rewritten in full once per finished game.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use log::{info, warn};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::policy::{Policy, Weights};

/// Aggregated results of every game played with one policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    /// Games played with this policy.
    pub count: u32,
    pub lookahead: u8,
    pub weights: Weights,
    /// Running score, updated as `(score + new) / count` before `count` is bumped.
    pub score: f64,
    #[serde(rename = "bestScore", default)]
    pub best_score: f64,
}

impl OutcomeRecord {
    #[inline]
    pub fn policy(&self) -> Policy { Policy { lookahead: self.lookahead, weights: self.weights } }

    /// Fold a new final score into this record.
    ///
    /// A stored `count` of 0 is read as 1.
    pub fn update(&mut self, final_score: f64) {
        self.count = self.count.max(1);
        self.score = (self.score + final_score) / self.count as f64;
        if final_score > self.best_score {
            self.best_score = final_score;
        }
        self.count += 1;
    }
}

/// Key/value blob storage the ledger is persisted in.
pub trait Storage {
    /// Stored value for `key`, `None` if nothing was stored yet.
    fn get(&self, key: &str) -> Result<Option<String>, LedgerError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), LedgerError>;
}

/// Process-local storage, lost on exit.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    values: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self { Self::default() }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, LedgerError> { Ok(self.values.get(key).cloned()) }

    fn set(&mut self, key: &str, value: &str) -> Result<(), LedgerError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One `<key>.json` file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self { FileStorage { dir: dir.into() } }

    pub fn path_for(&self, key: &str) -> PathBuf { self.dir.join(format!("{key}.json")) }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, LedgerError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), LedgerError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Chooses the policy for the next game once the current one is retired.
pub trait PolicySelector {
    fn next_policy(&mut self, records: &[OutcomeRecord], rng: &mut dyn RngCore) -> Policy;
}

/// Draw a fresh uniform policy, ignoring history.
#[derive(Debug, Clone, Copy, Default)]
pub struct UniformReroll;

impl PolicySelector for UniformReroll {
    fn next_policy(&mut self, _records: &[OutcomeRecord], rng: &mut dyn RngCore) -> Policy { Policy::randomize(rng) }
}

/// Result of recording one finished game.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    /// The record after the update.
    pub record: OutcomeRecord,
    /// Policy to play the next game with.
    pub next_policy: Policy,
    /// Whether `next_policy` was freshly drawn.
    pub rotated: bool,
}

/// Outcome ledger over a [`Storage`] backend.
pub struct Ledger<S: Storage> {
    storage: S,
    key: String,
    rotate_after: u32,
    selector: Box<dyn PolicySelector + Send>,
}

impl<S: Storage> Ledger<S> {
    pub fn new(storage: S, key: impl Into<String>, rotate_after: u32) -> Self {
        Ledger { storage, key: key.into(), rotate_after, selector: Box::new(UniformReroll) }
    }

    /// Replace the policy rotation strategy.
    pub fn with_selector(mut self, selector: impl PolicySelector + Send + 'static) -> Self {
        self.selector = Box::new(selector);
        self
    }

    pub fn storage(&self) -> &S { &self.storage }

    /// Persisted records for display; unreadable data reads as an empty ledger.
    pub fn load(&self) -> Vec<OutcomeRecord> {
        self.read_records().unwrap_or_else(|e| {
            warn!("could not read ledger '{}': {e}", self.key);
            Vec::new()
        })
    }

    /// Absent or malformed data is an empty ledger; storage failures propagate.
    fn read_records(&self) -> Result<Vec<OutcomeRecord>, LedgerError> {
        let Some(raw) = self.storage.get(&self.key)? else {
            return Ok(Vec::new());
        };
        Ok(parse_records(&raw).unwrap_or_else(|e| {
            warn!("discarding malformed ledger '{}': {e}", self.key);
            Vec::new()
        }))
    }

    /// Fold `final_score` into the record for `policy` and persist the ledger.
    ///
    /// Once the record has been tried `rotate_after` times the selector draws
    /// a new policy for the next game; otherwise `policy` is kept. A failed
    /// read returns the error without touching the stored ledger.
    pub fn record_outcome(
        &mut self,
        policy: &Policy,
        final_score: u64,
        rng: &mut dyn RngCore,
    ) -> Result<Recorded, LedgerError> {
        let mut records = self.read_records()?;
        let idx = match records.iter().position(|r| policy.matches(r)) {
            Some(i) => {
                records[i].update(final_score as f64);
                i
            }
            None => {
                records.push(policy.serialize(final_score));
                records.len() - 1
            }
        };
        let record = records[idx].clone();

        let (next_policy, rotated) = if record.count >= self.rotate_after {
            (self.selector.next_policy(&records, rng), true)
        } else {
            (*policy, false)
        };

        self.storage.set(&self.key, &serde_json::to_string(&records)?)?;
        info!(
            "game over: score={final_score} policy=[{policy}] trials={} avg={:.1} best={:.0}",
            record.count, record.score, record.best_score
        );
        if rotated {
            info!("policy retired after {} trials, next=[{next_policy}]", record.count);
        }
        Ok(Recorded { record, next_policy, rotated })
    }
}

/// Parse a persisted ledger, skipping `null` entries.
pub fn parse_records(raw: &str) -> Result<Vec<OutcomeRecord>, serde_json::Error> {
    let entries: Vec<Option<OutcomeRecord>> = serde_json::from_str(raw)?;
    Ok(entries.into_iter().flatten().collect())
}

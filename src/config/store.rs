//! Live key/value configuration shared by the pool sizer, the latency model
//! and configuration edits.
//!
//! Every access takes the lock for one short critical section and releases
//! it before returning. Callers get owned values or snapshots, never guards.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Key whose value is the desired number of workers.
pub const WORKERS_KEY: &str = "NumOfWorkers";

/// Thread-safe mapping from string key to non-negative integer.
#[derive(Debug, Default)]
pub struct ConfigStore {
    values: Mutex<HashMap<String, u64>>,
}

/// What an edit batch did, key by key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EditOutcome {
    /// Keys written, with their new values.
    pub applied: BTreeMap<String, u64>,
    /// Keys whose value was not a non-negative integer; left untouched.
    pub rejected: Vec<String>,
}

impl ConfigStore {
    pub fn new(initial: HashMap<String, u64>) -> Self {
        Self {
            values: Mutex::new(initial),
        }
    }

    pub fn get(&self, key: &str) -> Option<u64> {
        self.values.lock().get(key).copied()
    }

    pub fn set(&self, key: impl Into<String>, value: u64) {
        self.values.lock().insert(key.into(), value);
    }

    /// Sorted copy of every key.
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.values
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    /// Unsorted copy, cheaper when only lookups follow.
    pub fn lookup_table(&self) -> HashMap<String, u64> {
        self.values.lock().clone()
    }

    /// Desired worker count; 0 when the key is absent.
    pub fn desired_workers(&self) -> usize {
        self.get(WORKERS_KEY)
            .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
            .unwrap_or(0)
    }

    /// Validate each pair on its own and apply the valid ones in one
    /// critical section. Invalid pairs leave the previous value in place.
    pub fn apply_edit<I, K, V>(&self, pairs: I) -> EditOutcome
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let mut outcome = EditOutcome::default();
        let mut valid = Vec::new();
        for (key, raw) in pairs {
            let key = key.into();
            match parse_value(raw.as_ref()) {
                Some(value) => valid.push((key, value)),
                None => {
                    debug!(key = %key, raw = raw.as_ref(), "rejected config value");
                    outcome.rejected.push(key);
                }
            }
        }

        let mut values = self.values.lock();
        for (key, value) in valid {
            values.insert(key.clone(), value);
            outcome.applied.insert(key, value);
        }
        outcome
    }
}

/// Parse a config value: a base-10 integer that is not negative.
///
/// Goes through `i64` so that `+3` and `-0` are accepted like any integer
/// parse would, while `-1` is refused.
pub fn parse_value(raw: &str) -> Option<u64> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|n| u64::try_from(n).ok())
}

//! Cancellable deferred-task scheduling.
//!
//! All waiting in the engine (quiet-hours replay, retry sweeps,
//! escalation re-checks, confirmation expiry) is a scheduler entry, not
//! a blocking call or a wall-clock timer. Tasks are keyed by subject and
//! purpose; re-scheduling a key replaces the previous entry and any key
//! can be cancelled explicitly, so a resolved subject can never fire a
//! stale callback. The owning engine drives the queue from `tick(now)`.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a scheduled task will do when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPurpose {
    /// Re-evaluate a subject once their quiet hours end.
    QuietHoursReplay,
    /// Re-check a subject's silence after an emergency alert.
    EscalationRecheck,
    /// Resolve a confirmation request at full-window expiry.
    ConfirmationExpiry,
    /// Periodic re-delivery sweep of the retry queue.
    RetrySweep,
}

/// Scheduler key: one pending task per subject and purpose. Engine-wide
/// tasks (the retry sweep) carry no subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskKey {
    pub subject: Option<String>,
    pub purpose: TaskPurpose,
}

impl TaskKey {
    pub fn for_subject(subject: &str, purpose: TaskPurpose) -> Self {
        Self {
            subject: Some(subject.to_string()),
            purpose,
        }
    }

    pub fn global(purpose: TaskPurpose) -> Self {
        Self {
            subject: None,
            purpose,
        }
    }
}

/// Time-indexed queue of pending tasks.
#[derive(Debug, Default)]
pub struct TaskScheduler {
    seq: u64,
    by_time: BTreeMap<(DateTime<Utc>, u64), TaskKey>,
    by_key: HashMap<TaskKey, (DateTime<Utc>, u64)>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `key` to fire at `at`. An existing entry for the same
    /// key is replaced (re-arm semantics).
    pub fn schedule(&mut self, key: TaskKey, at: DateTime<Utc>) {
        self.cancel(&key);
        let slot = (at, self.seq);
        self.seq += 1;
        self.by_time.insert(slot, key.clone());
        self.by_key.insert(key, slot);
    }

    /// Cancel a pending task. Returns whether one was pending.
    pub fn cancel(&mut self, key: &TaskKey) -> bool {
        if let Some(slot) = self.by_key.remove(key) {
            self.by_time.remove(&slot);
            true
        } else {
            false
        }
    }

    /// Cancel every pending task for a subject.
    pub fn cancel_subject(&mut self, subject: &str) {
        let keys: Vec<TaskKey> = self
            .by_key
            .keys()
            .filter(|k| k.subject.as_deref() == Some(subject))
            .cloned()
            .collect();
        for key in keys {
            self.cancel(&key);
        }
    }

    /// Remove and return every task due at or before `now`, in firing
    /// order.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<TaskKey> {
        let mut fired = Vec::new();
        while let Some((&slot, _)) = self.by_time.iter().next() {
            if slot.0 > now {
                break;
            }
            let key = self.by_time.remove(&slot).unwrap();
            self.by_key.remove(&key);
            fired.push(key);
        }
        fired
    }

    /// When a pending task for `key` will fire, if any.
    pub fn scheduled_at(&self, key: &TaskKey) -> Option<DateTime<Utc>> {
        self.by_key.get(key).map(|slot| slot.0)
    }

    /// The next moment anything is due.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.by_time.keys().next().map(|slot| slot.0)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

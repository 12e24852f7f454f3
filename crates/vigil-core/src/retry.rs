//! Bounded re-delivery queue for alerts that failed on every channel.
//!
//! A fixed-interval sweep (driven by the engine's scheduler, default
//! every 30 seconds) re-dispatches items whose `next_attempt_at` has
//! elapsed. Delay grows linearly with the attempt number. The queue is
//! capped; when full, the oldest non-Emergency item is evicted first.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::level::{AlertEvent, AlertLevel};

/// Retry policy knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Seconds between sweeps of the queue.
    pub sweep_interval_secs: u32,
    /// Attempts before an item is dropped as a permanent failure.
    pub max_attempts: u32,
    /// Base re-delivery delay; attempt n waits `base * n`.
    pub base_delay_secs: u32,
    /// Maximum queued items.
    pub queue_cap: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 30,
            max_attempts: 3,
            base_delay_secs: 30,
            queue_cap: 64,
        }
    }
}

/// One alert awaiting re-delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryItem {
    pub alert: AlertEvent,
    /// Delivery attempts already made (the initial dispatch counts as one).
    pub attempt: u32,
    pub max_attempts: u32,
    pub next_attempt_at: DateTime<Utc>,
    pub enqueued_at: DateTime<Utc>,
}

/// The queue itself. Time-driven; the engine calls [`RetryQueue::due`]
/// on each sweep and re-enqueues items that failed again.
#[derive(Debug)]
pub struct RetryQueue {
    config: RetryConfig,
    items: Vec<RetryItem>,
}

impl RetryQueue {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            items: Vec::new(),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Queue an alert whose initial dispatch failed on every channel.
    /// Returns any item evicted to make room.
    pub fn enqueue(&mut self, alert: AlertEvent, now: DateTime<Utc>) -> Option<RetryItem> {
        let item = RetryItem {
            alert,
            attempt: 1,
            max_attempts: self.config.max_attempts,
            next_attempt_at: now + Duration::seconds(i64::from(self.config.base_delay_secs)),
            enqueued_at: now,
        };
        self.push(item)
    }

    /// Re-queue an item after another failed attempt. Returns the next
    /// attempt time, or `None` when the item has exhausted its attempts
    /// and was dropped.
    pub fn requeue(&mut self, mut item: RetryItem, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        item.attempt += 1;
        if item.attempt >= item.max_attempts {
            tracing::error!(
                alert_id = %item.alert.id,
                user_id = %item.alert.user_id,
                attempts = item.attempt,
                "alert delivery abandoned after max attempts"
            );
            return None;
        }
        let next = now + Duration::seconds(i64::from(self.config.base_delay_secs * item.attempt));
        item.next_attempt_at = next;
        self.push(item);
        Some(next)
    }

    fn push(&mut self, item: RetryItem) -> Option<RetryItem> {
        let mut evicted = None;
        if self.items.len() >= self.config.queue_cap {
            evicted = self.evict();
            if let Some(ref e) = evicted {
                tracing::warn!(
                    alert_id = %e.alert.id,
                    user_id = %e.alert.user_id,
                    "retry queue full, evicted oldest item"
                );
            }
        }
        self.items.push(item);
        evicted
    }

    /// Evict the oldest non-Emergency item, or the oldest outright if
    /// everything queued is an emergency.
    fn evict(&mut self) -> Option<RetryItem> {
        let pos = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, i)| i.alert.level < AlertLevel::Emergency)
            .min_by_key(|(_, i)| i.enqueued_at)
            .map(|(pos, _)| pos)
            .or_else(|| {
                self.items
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, i)| i.enqueued_at)
                    .map(|(pos, _)| pos)
            })?;
        Some(self.items.remove(pos))
    }

    /// Remove and return every item whose re-delivery time has come.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<RetryItem> {
        let mut due = Vec::new();
        let mut rest = Vec::with_capacity(self.items.len());
        for item in self.items.drain(..) {
            if item.next_attempt_at <= now {
                due.push(item);
            } else {
                rest.push(item);
            }
        }
        self.items = rest;
        due.sort_by_key(|i| i.next_attempt_at);
        due
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn pending_for(&self, user_id: &str) -> usize {
        self.items.iter().filter(|i| i.alert.user_id == user_id).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap()
    }

    fn alert(user: &str, level: AlertLevel) -> AlertEvent {
        AlertEvent::new(user, level, t0(), 1500.0)
    }

    #[test]
    fn test_enqueue_and_sweep_timing() {
        let mut q = RetryQueue::new(RetryConfig::default());
        q.enqueue(alert("u1", AlertLevel::Warning), t0());

        // Not due before the base delay elapses.
        assert!(q.due(t0() + Duration::seconds(29)).is_empty());
        let due = q.due(t0() + Duration::seconds(30));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].attempt, 1);
        assert!(q.is_empty());
    }

    #[test]
    fn test_requeue_delay_grows_linearly() {
        let mut q = RetryQueue::new(RetryConfig {
            max_attempts: 5,
            ..Default::default()
        });
        q.enqueue(alert("u1", AlertLevel::Warning), t0());

        let item = q.due(t0() + Duration::seconds(30)).remove(0);
        let now = t0() + Duration::seconds(30);
        assert_eq!(q.requeue(item, now), Some(now + Duration::seconds(60)));

        // Second attempt waits base * 2 = 60s.
        assert!(q.due(now + Duration::seconds(59)).is_empty());
        assert_eq!(q.due(now + Duration::seconds(60)).len(), 1);
    }

    #[test]
    fn test_exhausted_item_is_dropped_for_good() {
        let mut q = RetryQueue::new(RetryConfig::default());
        q.enqueue(alert("u1", AlertLevel::Warning), t0());

        let mut now = t0();
        for _ in 0..2 {
            now = now + Duration::minutes(5);
            let due = q.due(now);
            assert_eq!(due.len(), 1);
            for item in due {
                q.requeue(item, now);
            }
        }

        // Third attempt hit max_attempts = 3 and was dropped.
        assert!(q.is_empty());
        // It does not reappear on later sweeps.
        assert!(q.due(now + Duration::hours(1)).is_empty());
    }

    #[test]
    fn test_cap_evicts_oldest_non_emergency_first(){
        let mut q = RetryQueue::new(RetryConfig {
            queue_cap: 3,
            ..Default::default()
        });
        q.enqueue(alert("em", AlertLevel::Emergency), t0());
        q.enqueue(alert("w1", AlertLevel::Warning), t0() + Duration::seconds(1));
        q.enqueue(alert("w2", AlertLevel::Warning), t0() + Duration::seconds(2));

        let evicted = q.enqueue(alert("w3", AlertLevel::Danger), t0() + Duration::seconds(3));
        let evicted = evicted.expect("queue was full");
        // Oldest non-emergency goes first; the emergency survives.
        assert_eq!(evicted.alert.user_id, "w1");
        assert_eq!(q.len(), 3);
        assert_eq!(q.pending_for("em"), 1);
    }

    #[test]
    fn test_cap_evicts_oldest_emergency_when_all_emergency() {
        let mut q = RetryQueue::new(RetryConfig {
            queue_cap: 2,
            ..Default::default()
        });
        q.enqueue(alert("e1", AlertLevel::Emergency), t0());
        q.enqueue(alert("e2", AlertLevel::Emergency), t0() + Duration::seconds(1));

        let evicted = q.enqueue(alert("e3", AlertLevel::Emergency), t0() + Duration::seconds(2));
        assert_eq!(evicted.unwrap().alert.user_id, "e1");
    }

    #[test]
    fn test_due_returns_items_in_attempt_order() {
        let mut q = RetryQueue::new(RetryConfig::default());
        q.enqueue(alert("u1", AlertLevel::Warning), t0() + Duration::seconds(10));
        q.enqueue(alert("u2", AlertLevel::Warning), t0());

        let due = q.due(t0() + Duration::minutes(5));
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].alert.user_id, "u2");
        assert_eq!(due[1].alert.user_id, "u1");
    }
}

//! Alert suppression.
//!
//! Decides whether a computed alert should actually fire. The policy
//! owns the per-user alert history (24 hour retention, purged lazily on
//! each evaluation) and applies, in order: the recent-activity override,
//! per-level duplicate cooldowns, quiet hours, and the hourly rate
//! limit. First match wins.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::level::{AlertEvent, AlertLevel};

/// A daily do-not-disturb window. Supports overnight ranges that wrap
/// past midnight (e.g. 22:00-07:00).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuietHours {
    pub enabled: bool,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            enabled: false,
            start: NaiveTime::from_hms_opt(22, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
        }
    }
}

impl QuietHours {
    /// Whether a point in time falls inside the window.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        let t = at.time();
        if self.start <= self.end {
            t >= self.start && t < self.end
        } else {
            // Overnight window (e.g. 22:00 - 07:00)
            t >= self.start || t < self.end
        }
    }

    /// The moment the current window ends. Only meaningful when
    /// `contains(at)` is true.
    pub fn next_end(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let t = at.time();
        let date = if self.start > self.end && t >= self.start {
            // Evening side of an overnight window: ends tomorrow.
            at.date_naive() + chrono::Days::new(1)
        } else {
            at.date_naive()
        };
        date.and_time(self.end).and_utc()
    }
}

/// Per-user notification preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserNotificationPrefs {
    pub quiet_hours: QuietHours,
    pub max_alerts_per_hour: u32,
}

impl Default for UserNotificationPrefs {
    fn default() -> Self {
        Self {
            quiet_hours: QuietHours::default(),
            max_alerts_per_hour: 5,
        }
    }
}

/// Duplicate-suppression cooldowns per level, in minutes.
///
/// Cooldowns shrink as severity grows so that emergencies can re-fire
/// sooner than routine warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CooldownSchedule {
    pub warning_minutes: u32,
    pub danger_minutes: u32,
    pub emergency_minutes: u32,
}

impl Default for CooldownSchedule {
    fn default() -> Self {
        Self {
            warning_minutes: 360,
            danger_minutes: 120,
            emergency_minutes: 30,
        }
    }
}

impl CooldownSchedule {
    pub fn for_level(&self, level: AlertLevel) -> Duration {
        let minutes = match level {
            AlertLevel::Normal | AlertLevel::Warning => self.warning_minutes,
            AlertLevel::Danger => self.danger_minutes,
            AlertLevel::Emergency => self.emergency_minutes,
        };
        Duration::minutes(i64::from(minutes))
    }
}

/// Why a candidate alert was suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressReason {
    /// The subject showed activity inside the freshness window; the
    /// silence reading is a false positive.
    RecentActivity,
    /// Same level already fired inside its cooldown period.
    DuplicateCooldown,
    /// The hourly alert budget for this user is spent.
    RateLimited,
}

/// Outcome of a suppression check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Suppress(SuppressReason),
    /// Quiet hours: replay when the window ends instead of dropping.
    Defer { until: DateTime<Utc> },
}

/// Per-user fired-alert history with bounded retention.
#[derive(Debug, Default)]
struct AlertHistory {
    entries: HashMap<String, Vec<AlertEvent>>,
}

impl AlertHistory {
    fn purge(&mut self, user_id: &str, now: DateTime<Utc>, retention: Duration) {
        if let Some(list) = self.entries.get_mut(user_id) {
            list.retain(|e| now - e.computed_at < retention);
            if list.is_empty() {
                self.entries.remove(user_id);
            }
        }
    }

    fn record(&mut self, event: AlertEvent) {
        self.entries
            .entry(event.user_id.clone())
            .or_default()
            .push(event);
    }

    fn last_same_level(&self, user_id: &str, level: AlertLevel) -> Option<&AlertEvent> {
        self.entries
            .get(user_id)?
            .iter()
            .filter(|e| e.level == level)
            .max_by_key(|e| e.computed_at)
    }

    fn count_within(&self, user_id: &str, window: Duration, now: DateTime<Utc>) -> usize {
        self.entries
            .get(user_id)
            .map(|list| {
                list.iter()
                    .filter(|e| now - e.computed_at < window)
                    .count()
            })
            .unwrap_or(0)
    }

    fn len_for(&self, user_id: &str) -> usize {
        self.entries.get(user_id).map(Vec::len).unwrap_or(0)
    }
}

/// The suppression policy plus the history it maintains.
#[derive(Debug)]
pub struct SuppressionPolicy {
    cooldowns: CooldownSchedule,
    retention: Duration,
    history: AlertHistory,
}

impl SuppressionPolicy {
    pub fn new(cooldowns: CooldownSchedule, retention_hours: u32) -> Self {
        Self {
            cooldowns,
            retention: Duration::hours(i64::from(retention_hours)),
            history: AlertHistory::default(),
        }
    }

    /// Run the decision ladder for a candidate alert. An allowed event
    /// is appended to the history as a side effect.
    pub fn evaluate(
        &mut self,
        candidate: &AlertEvent,
        recent_activity: bool,
        prefs: &UserNotificationPrefs,
        now: DateTime<Utc>,
    ) -> Verdict {
        self.history.purge(&candidate.user_id, now, self.retention);

        if recent_activity {
            return Verdict::Suppress(SuppressReason::RecentActivity);
        }

        if let Some(prev) = self.history.last_same_level(&candidate.user_id, candidate.level) {
            if now - prev.computed_at < self.cooldowns.for_level(candidate.level) {
                return Verdict::Suppress(SuppressReason::DuplicateCooldown);
            }
        }

        if prefs.quiet_hours.contains(now) && candidate.level < AlertLevel::max_severity() {
            return Verdict::Defer {
                until: prefs.quiet_hours.next_end(now),
            };
        }

        let fired_last_hour = self
            .history
            .count_within(&candidate.user_id, Duration::hours(1), now);
        if fired_last_hour >= prefs.max_alerts_per_hour as usize {
            return Verdict::Suppress(SuppressReason::RateLimited);
        }

        self.history.record(candidate.clone());
        Verdict::Allow
    }

    /// How many alerts are retained for a user right now.
    pub fn history_len(&self, user_id: &str) -> usize {
        self.history.len_for(user_id)
    }
}

//! Silence classification.
//!
//! Turns "how long has this user been silent" into an ordered severity
//! level. Classification is a pure computation over the last heartbeat
//! timestamp, the effective threshold set and the calendar context --
//! no side effects, no clock access.

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity of a user's silence, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Normal,
    Warning,
    Danger,
    Emergency,
}

impl AlertLevel {
    /// Get numeric priority value (0-3)
    pub fn as_u8(self) -> u8 {
        match self {
            AlertLevel::Normal => 0,
            AlertLevel::Warning => 1,
            AlertLevel::Danger => 2,
            AlertLevel::Emergency => 3,
        }
    }

    /// Convert from numeric priority value
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => AlertLevel::Normal,
            1 => AlertLevel::Warning,
            2 => AlertLevel::Danger,
            _ => AlertLevel::Emergency,
        }
    }

    /// The highest severity level.
    pub fn max_severity() -> Self {
        AlertLevel::Emergency
    }
}

/// Per-installation silence thresholds, in minutes.
///
/// Defaults match the classic 24h / 48h / 72h ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdSet {
    pub warning_minutes: u32,
    pub danger_minutes: u32,
    pub emergency_minutes: u32,
}

impl Default for ThresholdSet {
    fn default() -> Self {
        Self {
            warning_minutes: 1440,
            danger_minutes: 2880,
            emergency_minutes: 4320,
        }
    }
}

/// Per-user threshold override. Any field present replaces the
/// corresponding installation default.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdOverride {
    pub warning_minutes: Option<u32>,
    pub danger_minutes: Option<u32>,
    pub emergency_minutes: Option<u32>,
}

impl ThresholdSet {
    /// Apply a per-user override, replacing any of the three values present.
    pub fn with_override(self, ovr: &ThresholdOverride) -> Self {
        Self {
            warning_minutes: ovr.warning_minutes.unwrap_or(self.warning_minutes),
            danger_minutes: ovr.danger_minutes.unwrap_or(self.danger_minutes),
            emergency_minutes: ovr.emergency_minutes.unwrap_or(self.emergency_minutes),
        }
    }

    /// Apply the active contextual multipliers. Multipliers compose
    /// multiplicatively and independently of each other.
    pub fn adjusted(
        self,
        ctx: CalendarContext,
        multipliers: &ContextualMultipliers,
    ) -> AdjustedThresholds {
        let mut factor = 1.0;
        if ctx.is_weekend {
            factor *= multipliers.weekend;
        }
        if ctx.is_night {
            factor *= multipliers.night;
        }
        if ctx.is_holiday {
            factor *= multipliers.holiday;
        }
        AdjustedThresholds {
            warning: f64::from(self.warning_minutes) * factor,
            danger: f64::from(self.danger_minutes) * factor,
            emergency: f64::from(self.emergency_minutes) * factor,
        }
    }
}

/// Threshold set after contextual adjustment, in fractional minutes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdjustedThresholds {
    pub warning: f64,
    pub danger: f64,
    pub emergency: f64,
}

/// Multiplicative threshold adjustments for calendar conditions.
///
/// Values above 1.0 slow the ladder down (alerts fire later), values
/// below 1.0 speed it up. Defaults: weekends 1.5x slower, nights 20%
/// faster, holidays 2x slower.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ContextualMultipliers {
    pub weekend: f64,
    pub night: f64,
    pub holiday: f64,
}

impl Default for ContextualMultipliers {
    fn default() -> Self {
        Self {
            weekend: 1.5,
            night: 0.8,
            holiday: 2.0,
        }
    }
}

/// Which calendar conditions are active for an evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarContext {
    pub is_weekend: bool,
    pub is_night: bool,
    pub is_holiday: bool,
}

/// Calendar rules used to derive a [`CalendarContext`] from a timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarRules {
    /// Hour at which night mode begins (inclusive).
    pub night_start_hour: u8,
    /// Hour at which night mode ends (inclusive).
    pub night_end_hour: u8,
    /// Holidays as "MM-DD" strings.
    pub holidays: Vec<String>,
}

impl Default for CalendarRules {
    fn default() -> Self {
        Self {
            night_start_hour: 22,
            night_end_hour: 6,
            holidays: Vec::new(),
        }
    }
}

impl CalendarContext {
    /// Derive the active calendar conditions for a point in time.
    pub fn for_time(at: DateTime<Utc>, rules: &CalendarRules) -> Self {
        let weekday = at.weekday();
        let is_weekend = weekday == chrono::Weekday::Sat || weekday == chrono::Weekday::Sun;

        let hour = at.hour();
        let is_night =
            hour >= u32::from(rules.night_start_hour) || hour <= u32::from(rules.night_end_hour);

        let date_str = format!("{:02}-{:02}", at.month(), at.day());
        let is_holiday = rules.holidays.iter().any(|h| h == &date_str);

        Self {
            is_weekend,
            is_night,
            is_holiday,
        }
    }
}

/// One fired (non-suppressed) alert. Immutable once created; retained
/// in the suppression history for 24 hours.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: Uuid,
    pub user_id: String,
    pub level: AlertLevel,
    pub computed_at: DateTime<Utc>,
    pub minutes_silent: f64,
}

impl AlertEvent {
    pub fn new(user_id: &str, level: AlertLevel, computed_at: DateTime<Utc>, minutes_silent: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            level,
            computed_at,
            minutes_silent,
        }
    }
}

/// Elapsed silence in fractional minutes.
pub fn minutes_silent(last_heartbeat_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - last_heartbeat_at).num_seconds() as f64 / 60.0
}

/// Classifies silence durations into alert levels.
#[derive(Debug, Clone)]
pub struct AlertLevelCalculator {
    multipliers: ContextualMultipliers,
}

impl AlertLevelCalculator {
    pub fn new(multipliers: ContextualMultipliers) -> Self {
        Self { multipliers }
    }

    /// Classify the silence since `last_heartbeat_at`.
    ///
    /// Ties resolve toward the higher severity: a silence exactly at a
    /// threshold is already at that threshold's level.
    pub fn level_for(
        &self,
        last_heartbeat_at: DateTime<Utc>,
        now: DateTime<Utc>,
        thresholds: ThresholdSet,
        ctx: CalendarContext,
    ) -> AlertLevel {
        let silent = minutes_silent(last_heartbeat_at, now);
        self.classify(silent, thresholds, ctx)
    }

    /// Classify an already-computed silence duration.
    pub fn classify(
        &self,
        minutes_silent: f64,
        thresholds: ThresholdSet,
        ctx: CalendarContext,
    ) -> AlertLevel {
        let adjusted = thresholds.adjusted(ctx, &self.multipliers);
        if minutes_silent >= adjusted.emergency {
            AlertLevel::Emergency
        } else if minutes_silent >= adjusted.danger {
            AlertLevel::Danger
        } else if minutes_silent >= adjusted.warning {
            AlertLevel::Warning
        } else {
            AlertLevel::Normal
        }
    }
}

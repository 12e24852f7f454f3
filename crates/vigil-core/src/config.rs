//! Engine configuration.
//!
//! All tuning knobs live in one serde/TOML-loadable structure.
//! Validation mirrors the admin rules the thresholds historically had:
//! every threshold between 1 and 168 hours, strictly ordered, and
//! cooldowns strictly decreasing with severity.

use serde::{Deserialize, Serialize};

use crate::confirmation::ConfirmationConfig;
use crate::error::ConfigError;
use crate::escalation::EscalationConfig;
use crate::level::{CalendarRules, ContextualMultipliers, ThresholdSet};
use crate::report::ServiceKind;
use crate::retry::RetryConfig;
use crate::suppression::CooldownSchedule;

/// Which public services receive outside reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicesConfig {
    pub medical: bool,
    pub police: bool,
    pub administrative: bool,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            medical: true,
            police: true,
            administrative: false,
        }
    }
}

impl ServicesConfig {
    /// The enabled services in reporting priority order.
    pub fn enabled(&self) -> Vec<ServiceKind> {
        let mut services = Vec::new();
        if self.medical {
            services.push(ServiceKind::Medical);
        }
        if self.police {
            services.push(ServiceKind::Police);
        }
        if self.administrative {
            services.push(ServiceKind::Administrative);
        }
        services
    }
}

/// Dispatch knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Per-channel time budget in seconds.
    pub channel_timeout_secs: u32,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            channel_timeout_secs: 10,
        }
    }
}

/// Full engine configuration.
///
/// Scalar fields come before the table-valued sections so the TOML
/// serializer can emit them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Freshness window for the recent-activity override, in minutes.
    pub recent_activity_window_minutes: u32,
    /// Alert history retention, in hours.
    pub history_retention_hours: u32,
    pub thresholds: ThresholdSet,
    pub multipliers: ContextualMultipliers,
    pub calendar: CalendarRules,
    pub cooldowns: CooldownSchedule,
    pub dispatch: DispatchConfig,
    pub retry: RetryConfig,
    pub escalation: EscalationConfig,
    pub confirmation: ConfirmationConfig,
    pub services: ServicesConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            recent_activity_window_minutes: 5,
            history_retention_hours: 24,
            thresholds: ThresholdSet::default(),
            multipliers: ContextualMultipliers::default(),
            calendar: CalendarRules::default(),
            cooldowns: CooldownSchedule::default(),
            dispatch: DispatchConfig::default(),
            retry: RetryConfig::default(),
            escalation: EscalationConfig::default(),
            confirmation: ConfirmationConfig::default(),
            services: ServicesConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(s).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseFailed(e.to_string()))
    }

    /// Check every invariant the engine relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        const MIN_MINUTES: u32 = 60;
        const MAX_MINUTES: u32 = 168 * 60;

        let ladder = [
            ("thresholds.warning_minutes", self.thresholds.warning_minutes),
            ("thresholds.danger_minutes", self.thresholds.danger_minutes),
            ("thresholds.emergency_minutes", self.thresholds.emergency_minutes),
        ];
        for (key, value) in ladder {
            if !(MIN_MINUTES..=MAX_MINUTES).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("must be between 1 and 168 hours, got {value} minutes"),
                });
            }
        }
        if self.thresholds.warning_minutes >= self.thresholds.danger_minutes {
            return Err(ConfigError::InvalidValue {
                key: "thresholds".to_string(),
                message: "warning must be below danger".to_string(),
            });
        }
        if self.thresholds.danger_minutes >= self.thresholds.emergency_minutes {
            return Err(ConfigError::InvalidValue {
                key: "thresholds".to_string(),
                message: "danger must be below emergency".to_string(),
            });
        }

        for (key, value) in [
            ("multipliers.weekend", self.multipliers.weekend),
            ("multipliers.night", self.multipliers.night),
            ("multipliers.holiday", self.multipliers.holiday),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("must be a positive number, got {value}"),
                });
            }
        }

        if self.cooldowns.warning_minutes <= self.cooldowns.danger_minutes
            || self.cooldowns.danger_minutes <= self.cooldowns.emergency_minutes
        {
            return Err(ConfigError::InvalidValue {
                key: "cooldowns".to_string(),
                message: "cooldowns must strictly decrease with severity".to_string(),
            });
        }

        if self.confirmation.early_window_minutes >= self.confirmation.full_window_minutes {
            return Err(ConfigError::InvalidValue {
                key: "confirmation.early_window_minutes".to_string(),
                message: "early window must be shorter than the full window".to_string(),
            });
        }
        if self.confirmation.max_contacts == 0 || self.confirmation.max_contacts > 3 {
            return Err(ConfigError::InvalidValue {
                key: "confirmation.max_contacts".to_string(),
                message: "must be between 1 and 3".to_string(),
            });
        }

        if self.retry.max_attempts == 0 || self.retry.queue_cap == 0 {
            return Err(ConfigError::InvalidValue {
                key: "retry".to_string(),
                message: "max_attempts and queue_cap must be positive".to_string(),
            });
        }
        if self.retry.sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "retry.sweep_interval_secs".to_string(),
                message: "must be positive".to_string(),
            });
        }

        if self.escalation.recheck_delay_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "escalation.recheck_delay_minutes".to_string(),
                message: "must be positive".to_string(),
            });
        }

        Ok(())
    }
}

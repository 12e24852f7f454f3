//! Sustained-emergency escalation state machine.
//!
//! One state per subject:
//!
//! ```text
//! Idle -> Armed -> Escalated(1) -> Escalated(2) -> ...
//!           \          \               \
//!            +----------+---------------+--> Resolved
//! ```
//!
//! An allowed Emergency alert arms the machine and the engine schedules
//! a single deferred re-check. Each re-check that still finds the
//! subject at Emergency level advances the escalation counter and
//! re-arms. A fresh heartbeat resolves the subject, which also cancels
//! the pending re-check -- a resolved subject must never fire a stale
//! one.

use std::collections::HashMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Escalation policy knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Minutes between an emergency alert and its re-check.
    pub recheck_delay_minutes: u32,
    /// Escalation level at which outside services are contacted in
    /// addition to the administrative notice.
    pub contact_services_at_level: u32,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            recheck_delay_minutes: 60,
            contact_services_at_level: 2,
        }
    }
}

/// Per-subject escalation state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "level")]
pub enum EscalationState {
    #[default]
    Idle,
    Armed,
    Escalated(u32),
    Resolved,
}

impl EscalationState {
    fn is_active(self) -> bool {
        matches!(self, EscalationState::Armed | EscalationState::Escalated(_))
    }
}

/// Tracks escalation state per subject. Side effects (scheduling,
/// notifying) belong to the engine; this type only decides transitions.
#[derive(Debug, Default)]
pub struct EscalationTracker {
    config: EscalationConfig,
    states: HashMap<String, EscalationState>,
}

impl EscalationTracker {
    pub fn new(config: EscalationConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
        }
    }

    pub fn state(&self, subject: &str) -> EscalationState {
        self.states.get(subject).copied().unwrap_or_default()
    }

    pub fn recheck_delay(&self) -> Duration {
        Duration::minutes(i64::from(self.config.recheck_delay_minutes))
    }

    /// React to an allowed Emergency-level alert. Returns `true` when
    /// the machine newly armed and a re-check must be scheduled; an
    /// already-armed or escalated subject keeps its pending re-check.
    pub fn arm(&mut self, subject: &str) -> bool {
        match self.state(subject) {
            EscalationState::Idle | EscalationState::Resolved => {
                self.states
                    .insert(subject.to_string(), EscalationState::Armed);
                true
            }
            EscalationState::Armed | EscalationState::Escalated(_) => false,
        }
    }

    /// A re-check fired and the subject is still at Emergency level.
    /// Advances the counter and returns the new escalation level, or
    /// `None` if the machine was not active (stale re-check).
    pub fn advance(&mut self, subject: &str) -> Option<u32> {
        let next = match self.state(subject) {
            EscalationState::Armed => 1,
            EscalationState::Escalated(n) => n + 1,
            EscalationState::Idle | EscalationState::Resolved => return None,
        };
        self.states
            .insert(subject.to_string(), EscalationState::Escalated(next));
        Some(next)
    }

    /// Whether this escalation level also contacts outside services.
    pub fn contacts_services(&self, escalation_level: u32) -> bool {
        escalation_level >= self.config.contact_services_at_level
    }

    /// A fresh heartbeat was observed. Returns `true` when the subject
    /// had an active escalation that is now resolved (the engine must
    /// cancel the pending re-check).
    pub fn resolve(&mut self, subject: &str) -> bool {
        if self.state(subject).is_active() {
            self.states
                .insert(subject.to_string(), EscalationState::Resolved);
            true
        } else {
            false
        }
    }
}

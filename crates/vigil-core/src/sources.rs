//! Collaborator contracts.
//!
//! The engine never talks to storage, transports or sensors directly --
//! everything it consumes arrives through one of these traits, injected
//! at construction. The engine is single-threaded cooperative, so the
//! traits carry no threading bounds; implementations that bridge to
//! async transports are expected to queue work and return promptly.

use std::cell::Cell;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::confirmation::ConfirmationRequest;
use crate::level::{AlertEvent, ThresholdSet};
use crate::report::{EmergencyReport, ServiceKind, SubjectProfile};
use crate::suppression::UserNotificationPrefs;

/// A single liveness signal from a monitored user's device.
///
/// Immutable once observed; the engine only ever reads the most recent
/// record per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Source of the latest heartbeat per user.
pub trait HeartbeatSource {
    /// The most recent heartbeat for a user, or `None` if the user has
    /// never been observed.
    fn latest(&self, user_id: &str) -> Option<HeartbeatRecord>;
}

/// Source of fine-grained activity signals (motion, app interaction).
pub trait ActivitySource {
    /// Whether any activity was observed within the freshness window.
    fn has_recent_activity(&self, user_id: &str, within_minutes: u32) -> bool;
}

/// Source of peer concern reports filed about a subject.
pub trait PeerReportSource {
    /// Whether a peer has flagged concern about this subject recently.
    fn has_recent_peer_report(&self, user_id: &str, within_hours: u32) -> bool;
}

/// Store of effective silence thresholds, per-user overrides applied.
pub trait ThresholdStore {
    fn get(&self, user_id: &str) -> ThresholdSet;
}

/// Store of per-user notification preferences (quiet hours, rate limit).
pub trait PrefsStore {
    /// Preferences for a user, or `None` to fall back to engine defaults.
    fn get(&self, user_id: &str) -> Option<UserNotificationPrefs>;
}

/// Store of subject profiles used to build outside reports and to find
/// a subject's peer contacts.
pub trait ProfileStore {
    fn get(&self, user_id: &str) -> Option<SubjectProfile>;
}

/// One notification medium (local system, push service, in-app banner).
/// Channels are tried strictly in the order they were registered.
pub trait Channel {
    /// Unique identifier (e.g. "local", "push", "banner").
    fn name(&self) -> &str;

    /// Deliver one alert. Must return promptly; the dispatcher treats a
    /// call that overruns the configured per-channel timeout as failed.
    fn send(&self, event: &AlertEvent) -> Result<(), Box<dyn std::error::Error>>;
}

/// Outside-report channel to public services.
pub trait EmergencyContactChannel {
    fn report(
        &self,
        report: &EmergencyReport,
        service: ServiceKind,
    ) -> Result<(), Box<dyn std::error::Error>>;
}

/// Fire-and-forget notifications to a subject's contacts. Transport
/// failures are non-fatal; the contact is simply absent from the
/// response set.
pub trait ConfirmationTransport {
    /// Ask a contact to answer a confirmation request.
    fn request(
        &self,
        contact_id: &str,
        request: &ConfirmationRequest,
    ) -> Result<(), Box<dyn std::error::Error>>;

    /// Ask a peer to check on a silent subject. Sent when an emergency
    /// is suspected but no peer has flagged concern yet.
    fn request_peer_check(
        &self,
        contact_id: &str,
        subject_user_id: &str,
    ) -> Result<(), Box<dyn std::error::Error>>;
}

/// Sink for escalation notices to an administrative operator.
pub trait AdminNotifier {
    fn notify(
        &self,
        user_id: &str,
        escalation_level: u32,
        minutes_silent: f64,
    ) -> Result<(), Box<dyn std::error::Error>>;
}

/// External log for confirmation requests that reached a terminal
/// status. Once recorded, the request is discarded from live memory.
pub trait CaseLog {
    fn record(&self, request: &ConfirmationRequest);
}

/// Time source. Injected so tests and replays control the clock.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used by tests and the
/// scenario-replay CLI.
#[derive(Debug)]
pub struct ManualClock {
    now: Cell<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        self.now.set(to);
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

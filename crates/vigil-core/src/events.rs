//! Engine event stream.
//!
//! Every externally observable decision produces an Event. The
//! embedding application drains them after driving the engine;
//! integrations and tests consume them instead of subscribing to
//! internal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::confirmation::ConfirmationStatus;
use crate::level::AlertLevel;
use crate::report::ServiceReportResult;
use crate::suppression::SuppressReason;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// Evaluation was skipped because the subject has no heartbeat data.
    EvaluationSkipped {
        user_id: String,
        reason: String,
        at: DateTime<Utc>,
    },
    /// An allowed alert was delivered through a channel. A fully failed
    /// dispatch produces `RetryScheduled` instead.
    AlertFired {
        alert_id: Uuid,
        user_id: String,
        level: AlertLevel,
        minutes_silent: f64,
        channel: String,
        at: DateTime<Utc>,
    },
    AlertSuppressed {
        user_id: String,
        level: AlertLevel,
        reason: SuppressReason,
        at: DateTime<Utc>,
    },
    /// Quiet hours: the alert replays when the window ends.
    AlertDeferred {
        user_id: String,
        level: AlertLevel,
        until: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    /// A failed delivery was queued for re-delivery.
    RetryScheduled {
        alert_id: Uuid,
        user_id: String,
        attempt: u32,
        next_attempt_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    /// Delivery was abandoned after exhausting all attempts.
    DeliveryAbandoned {
        alert_id: Uuid,
        user_id: String,
        attempts: u32,
        at: DateTime<Utc>,
    },
    /// An emergency alert armed the escalation machine.
    EscalationArmed {
        user_id: String,
        recheck_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    /// A re-check found the subject still silent and escalated.
    EscalationAdvanced {
        user_id: String,
        escalation_level: u32,
        services_contacted: bool,
        at: DateTime<Utc>,
    },
    /// A fresh heartbeat resolved the subject's episode.
    SubjectResolved {
        user_id: String,
        at: DateTime<Utc>,
    },
    /// No peer report existed yet; peers were asked to check in.
    PeerConfirmationRequested {
        user_id: String,
        contacts: Vec<String>,
        at: DateTime<Utc>,
    },
    ConfirmationOpened {
        request_id: Uuid,
        user_id: String,
        contacts: Vec<String>,
        expires_at: DateTime<Utc>,
        at: DateTime<Utc>,
    },
    ConfirmationResolved {
        request_id: Uuid,
        user_id: String,
        status: ConfirmationStatus,
        responses: usize,
        at: DateTime<Utc>,
    },
    /// A response arrived after the request had already resolved.
    LateResponseIgnored {
        request_id: Uuid,
        contact_id: String,
        at: DateTime<Utc>,
    },
    /// An outside report went to the public services.
    OutsideReportFiled {
        report_id: Uuid,
        user_id: String,
        results: Vec<ServiceReportResult>,
        at: DateTime<Utc>,
    },
}

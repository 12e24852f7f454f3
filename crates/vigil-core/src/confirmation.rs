//! Multi-party emergency confirmation protocol.
//!
//! Before an outside report is filed, up to three of the subject's
//! contacts are asked to corroborate. Two race paths exist: a response
//! inside the early sub-window (default 15 minutes) resolves the case
//! immediately on that single answer; otherwise responses accumulate
//! until the full window (default 30 minutes) expires and a majority
//! decides. Zero responses at expiry resolve toward `TimedOut`, which
//! counts as confirmation -- the protocol fails safe toward contacting
//! services rather than silently dropping a possible true emergency.
//!
//! The terminal status is set exactly once. Responses arriving after
//! resolution are reported as late and have no effect.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Confirmation protocol knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    /// Full response window in minutes.
    pub full_window_minutes: u32,
    /// Early single-response sub-window in minutes.
    pub early_window_minutes: u32,
    /// Contacts asked per request; extra contacts are ignored.
    pub max_contacts: usize,
    /// How far back a peer concern report counts as corroboration.
    pub peer_report_window_hours: u32,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            full_window_minutes: 30,
            early_window_minutes: 15,
            max_contacts: 3,
            peer_report_window_hours: 24,
        }
    }
}

/// A contact's answer to "is this a real emergency?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactDecision {
    Confirm,
    Deny,
}

/// Lifecycle status of a confirmation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationStatus {
    Pending,
    Confirmed,
    Denied,
    /// Full window expired with no responses at all. Treated as
    /// confirmation downstream.
    TimedOut,
}

impl ConfirmationStatus {
    pub fn is_terminal(self) -> bool {
        self != ConfirmationStatus::Pending
    }

    /// Whether this terminal status proceeds to an outside report.
    pub fn is_affirmative(self) -> bool {
        matches!(self, ConfirmationStatus::Confirmed | ConfirmationStatus::TimedOut)
    }
}

/// One corroboration request. Created at most once per subject per
/// emergency episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    pub id: Uuid,
    pub subject_user_id: String,
    pub contact_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// End of the early single-response sub-window.
    pub early_until: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub responses: BTreeMap<String, ContactDecision>,
    pub status: ConfirmationStatus,
}

impl ConfirmationRequest {
    fn majority(&self) -> ConfirmationStatus {
        let confirms = self
            .responses
            .values()
            .filter(|d| **d == ContactDecision::Confirm)
            .count();
        let denies = self.responses.len() - confirms;
        if self.responses.is_empty() {
            ConfirmationStatus::TimedOut
        } else if denies > confirms {
            ConfirmationStatus::Denied
        } else {
            // Majority confirm, or a tie: fail safe toward reporting.
            ConfirmationStatus::Confirmed
        }
    }
}

/// Effect of recording a contact response.
#[derive(Debug)]
pub enum ResponseEffect {
    /// The early-exit path resolved the request on this response.
    Resolved(ConfirmationRequest),
    /// Recorded; resolution waits for the full window.
    Recorded,
    /// The request already reached a terminal status; no effect.
    Late,
}

/// Holds the live confirmation requests and enforces the protocol.
#[derive(Debug, Default)]
pub struct ConfirmationCoordinator {
    config: ConfirmationConfig,
    active: HashMap<Uuid, ConfirmationRequest>,
    by_subject: HashMap<String, Uuid>,
    /// Subjects whose episode already produced a terminal request;
    /// cleared when the subject resolves.
    episode_done: HashSet<String>,
    /// Ids of requests that reached a terminal status, so late
    /// responses can be told apart from unknown requests.
    resolved_ids: HashSet<Uuid>,
}

impl ConfirmationCoordinator {
    pub fn new(config: ConfirmationConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &ConfirmationConfig {
        &self.config
    }

    /// Open a request for a subject. Returns `None` when one is already
    /// pending or this episode already had its request. Contacts beyond
    /// the cap are ignored.
    pub fn open(
        &mut self,
        subject: &str,
        contacts: &[String],
        now: DateTime<Utc>,
    ) -> Option<&ConfirmationRequest> {
        if self.by_subject.contains_key(subject) || self.episode_done.contains(subject) {
            return None;
        }
        let contact_ids: Vec<String> = contacts
            .iter()
            .take(self.config.max_contacts)
            .cloned()
            .collect();
        if contact_ids.is_empty() {
            return None;
        }

        let request = ConfirmationRequest {
            id: Uuid::new_v4(),
            subject_user_id: subject.to_string(),
            contact_ids,
            created_at: now,
            early_until: now + Duration::minutes(i64::from(self.config.early_window_minutes)),
            expires_at: now + Duration::minutes(i64::from(self.config.full_window_minutes)),
            responses: BTreeMap::new(),
            status: ConfirmationStatus::Pending,
        };
        let id = request.id;
        self.by_subject.insert(subject.to_string(), id);
        self.active.insert(id, request);
        self.active.get(&id)
    }

    pub fn active_for(&self, subject: &str) -> Option<&ConfirmationRequest> {
        self.by_subject
            .get(subject)
            .and_then(|id| self.active.get(id))
    }

    /// Whether this episode already produced a terminal request.
    pub fn episode_done(&self, subject: &str) -> bool {
        self.episode_done.contains(subject)
    }

    /// Record a contact's answer. Inside the early sub-window a single
    /// answer resolves the request immediately; afterwards it is kept
    /// for the majority decision at expiry. The first answer per
    /// contact wins.
    pub fn record_response(
        &mut self,
        request_id: Uuid,
        contact_id: &str,
        decision: ContactDecision,
        now: DateTime<Utc>,
    ) -> Result<ResponseEffect, CoreError> {
        let request = match self.active.get_mut(&request_id) {
            Some(r) => r,
            None if self.resolved_ids.contains(&request_id) => {
                return Ok(ResponseEffect::Late);
            }
            None => return Err(CoreError::UnknownConfirmation(request_id)),
        };

        if !request.contact_ids.iter().any(|c| c == contact_id) {
            return Err(CoreError::UnknownContact {
                request_id,
                contact_id: contact_id.to_string(),
            });
        }

        request
            .responses
            .entry(contact_id.to_string())
            .or_insert(decision);

        if now < request.early_until {
            let status = match decision {
                ContactDecision::Confirm => ConfirmationStatus::Confirmed,
                ContactDecision::Deny => ConfirmationStatus::Denied,
            };
            let resolved = self.finish(request_id, status).expect("request is active");
            return Ok(ResponseEffect::Resolved(resolved));
        }

        Ok(ResponseEffect::Recorded)
    }

    /// Resolve a subject's pending request at full-window expiry by
    /// majority of the responses received. Returns the terminal
    /// request, or `None` when nothing was pending.
    pub fn resolve_expired(&mut self, subject: &str) -> Option<ConfirmationRequest> {
        let id = *self.by_subject.get(subject)?;
        let status = self.active.get(&id)?.majority();
        self.finish(id, status)
    }

    /// Abort a pending request because the subject showed life. The
    /// request resolves as denied: the emergency hypothesis is refuted.
    /// Also re-opens the episode for any future silence.
    pub fn abort_on_resolution(&mut self, subject: &str) -> Option<ConfirmationRequest> {
        let aborted = self
            .by_subject
            .get(subject)
            .copied()
            .and_then(|id| self.finish(id, ConfirmationStatus::Denied));
        self.episode_done.remove(subject);
        aborted
    }

    fn finish(&mut self, id: Uuid, status: ConfirmationStatus) -> Option<ConfirmationRequest> {
        let mut request = self.active.remove(&id)?;
        debug_assert!(status.is_terminal());
        request.status = status;
        self.by_subject.remove(&request.subject_user_id);
        self.episode_done.insert(request.subject_user_id.clone());
        self.resolved_ids.insert(id);
        Some(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap()
    }

    fn contacts(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("c{i}")).collect()
    }

    fn coordinator() -> ConfirmationCoordinator {
        ConfirmationCoordinator::new(ConfirmationConfig::default())
    }

    #[test]
    fn test_open_caps_contacts_at_three() {
        let mut c = coordinator();
        let request = c.open("u1", &contacts(5), t0()).unwrap();
        assert_eq!(request.contact_ids, vec!["c1", "c2", "c3"]);
        assert_eq!(request.status, ConfirmationStatus::Pending);
        assert_eq!(request.expires_at, t0() + Duration::minutes(30));
    }

    #[test]
    fn test_open_once_per_episode() {
        let mut c = coordinator();
        let id = c.open("u1", &contacts(2), t0()).unwrap().id;
        assert!(c.open("u1", &contacts(2), t0()).is_none());

        // Terminal but unresolved episode: still no second request.
        c.record_response(id, "c1", ContactDecision::Deny, t0() + Duration::minutes(5))
            .unwrap();
        assert!(c.open("u1", &contacts(2), t0() + Duration::hours(1)).is_none());
    }

    #[test]
    fn test_early_denial_aborts_immediately() {
        let mut c = coordinator();
        let id = c.open("u1", &contacts(3), t0()).unwrap().id;

        let effect = c
            .record_response(id, "c1", ContactDecision::Deny, t0() + Duration::minutes(5))
            .unwrap();
        match effect {
            ResponseEffect::Resolved(r) => {
                assert_eq!(r.status, ConfirmationStatus::Denied);
                assert!(!r.status.is_affirmative());
            }
            other => panic!("expected early resolution, got {other:?}"),
        }
        assert!(c.active_for("u1").is_none());
    }

    #[test]
    fn test_early_confirmation_proceeds_immediately() {
        let mut c = coordinator();
        let id = c.open("u1", &contacts(3), t0()).unwrap().id;

        let effect = c
            .record_response(id, "c2", ContactDecision::Confirm, t0() + Duration::minutes(14))
            .unwrap();
        match effect {
            ResponseEffect::Resolved(r) => {
                assert_eq!(r.status, ConfirmationStatus::Confirmed);
                assert!(r.status.is_affirmative());
            }
            other => panic!("expected early resolution, got {other:?}"),
        }
    }

    #[test]
    fn test_response_after_early_window_waits_for_expiry() {
        let mut c = coordinator();
        let id = c.open("u1", &contacts(3), t0()).unwrap().id;

        // Minute 20: past the early window, only recorded.
        let effect = c
            .record_response(id, "c1", ContactDecision::Confirm, t0() + Duration::minutes(20))
            .unwrap();
        assert!(matches!(effect, ResponseEffect::Recorded));
        assert!(c.active_for("u1").is_some());

        // Expiry resolves by majority of what arrived.
        let resolved = c.resolve_expired("u1").unwrap();
        assert_eq!(resolved.status, ConfirmationStatus::Confirmed);
    }

    #[test]
    fn test_majority_denial_at_expiry() {
        let mut c = coordinator();
        let id = c.open("u1", &contacts(3), t0()).unwrap().id;
        let late = t0() + Duration::minutes(20);

        c.record_response(id, "c1", ContactDecision::Deny, late).unwrap();
        c.record_response(id, "c2", ContactDecision::Deny, late).unwrap();
        c.record_response(id, "c3", ContactDecision::Confirm, late).unwrap();

        let resolved = c.resolve_expired("u1").unwrap();
        assert_eq!(resolved.status, ConfirmationStatus::Denied);
    }

    #[test]
    fn test_zero_responses_times_out_as_affirmative() {
        let mut c = coordinator();
        c.open("u1", &contacts(3), t0()).unwrap();

        let resolved = c.resolve_expired("u1").unwrap();
        assert_eq!(resolved.status, ConfirmationStatus::TimedOut);
        assert!(resolved.status.is_affirmative());
    }

    #[test]
    fn test_tie_resolves_toward_confirmation() {
        let mut c = coordinator();
        let id = c.open("u1", &contacts(2), t0()).unwrap().id;
        let late = t0() + Duration::minutes(20);

        c.record_response(id, "c1", ContactDecision::Confirm, late).unwrap();
        c.record_response(id, "c2", ContactDecision::Deny, late).unwrap();

        let resolved = c.resolve_expired("u1").unwrap();
        assert_eq!(resolved.status, ConfirmationStatus::Confirmed);
    }

    #[test]
    fn test_late_response_has_no_effect() {
        let mut c = coordinator();
        let id = c.open("u1", &contacts(2), t0()).unwrap().id;
        c.record_response(id, "c1", ContactDecision::Deny, t0() + Duration::minutes(3))
            .unwrap();

        let effect = c
            .record_response(id, "c2", ContactDecision::Confirm, t0() + Duration::minutes(8))
            .unwrap();
        assert!(matches!(effect, ResponseEffect::Late));
    }

    #[test]
    fn test_unknown_request_is_an_error() {
        let mut c = coordinator();
        let err = c
            .record_response(Uuid::new_v4(), "c1", ContactDecision::Confirm, t0())
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownConfirmation(_)));
    }

    #[test]
    fn test_unnamed_contact_is_an_error() {
        let mut c = coordinator();
        let id = c.open("u1", &contacts(2), t0()).unwrap().id;
        let err = c
            .record_response(id, "stranger", ContactDecision::Confirm, t0())
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownContact { .. }));
    }

    #[test]
    fn test_first_answer_per_contact_wins() {
        let mut c = coordinator();
        let id = c.open("u1", &contacts(2), t0()).unwrap().id;
        let late = t0() + Duration::minutes(20);

        c.record_response(id, "c1", ContactDecision::Deny, late).unwrap();
        c.record_response(id, "c1", ContactDecision::Confirm, late).unwrap();

        let resolved = c.resolve_expired("u1").unwrap();
        assert_eq!(resolved.responses.len(), 1);
        assert_eq!(resolved.status, ConfirmationStatus::Denied);
    }

    #[test]
    fn test_abort_on_resolution_reopens_episode() {
        let mut c = coordinator();
        c.open("u1", &contacts(2), t0()).unwrap();

        let aborted = c.abort_on_resolution("u1").unwrap();
        assert_eq!(aborted.status, ConfirmationStatus::Denied);

        // A fresh silence episode may open a new request.
        assert!(c.open("u1", &contacts(2), t0() + Duration::hours(5)).is_some());
    }
}

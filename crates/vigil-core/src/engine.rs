//! The alert engine.
//!
//! One engine instance owns all live state (suppression history, retry
//! queue, escalation machines, confirmation requests, scheduled tasks)
//! and talks to the outside world only through the injected
//! collaborators. It is single-threaded cooperative: nothing inside
//! blocks, and everything that "waits" is a scheduler entry fired from
//! [`AlertEngine::tick`].
//!
//! Per-subject ordering is enforced by construction -- every public
//! operation takes `&mut self` and runs to completion, so history
//! mutations and confirmation transitions for a subject can never
//! interleave.

use std::collections::HashSet;
use std::rc::Rc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::confirmation::{
    ConfirmationCoordinator, ConfirmationRequest, ConfirmationStatus, ContactDecision,
    ResponseEffect,
};
use crate::dispatch::NotificationDispatcher;
use crate::error::Result;
use crate::escalation::{EscalationState, EscalationTracker};
use crate::events::Event;
use crate::level::{minutes_silent, AlertEvent, AlertLevel, AlertLevelCalculator, CalendarContext};
use crate::report::{file_report, EmergencyReport};
use crate::retry::RetryQueue;
use crate::scheduler::{TaskKey, TaskPurpose, TaskScheduler};
use crate::sources::{
    ActivitySource, AdminNotifier, CaseLog, Channel, Clock, ConfirmationTransport,
    EmergencyContactChannel, HeartbeatSource, PeerReportSource, PrefsStore, ProfileStore,
    ThresholdStore,
};
use crate::suppression::{SuppressReason, SuppressionPolicy, Verdict};

/// Everything the engine consumes from the outside, injected once at
/// construction.
pub struct Collaborators {
    pub heartbeats: Box<dyn HeartbeatSource>,
    pub activity: Box<dyn ActivitySource>,
    pub peer_reports: Box<dyn PeerReportSource>,
    pub thresholds: Box<dyn ThresholdStore>,
    pub prefs: Box<dyn PrefsStore>,
    pub profiles: Box<dyn ProfileStore>,
    pub channels: Vec<Box<dyn Channel>>,
    pub emergency_contact: Box<dyn EmergencyContactChannel>,
    pub confirmation_transport: Box<dyn ConfirmationTransport>,
    pub admin: Box<dyn AdminNotifier>,
    pub case_log: Box<dyn CaseLog>,
    pub clock: Rc<dyn Clock>,
}

/// What one evaluation pass decided for a subject.
#[derive(Debug, Clone, PartialEq)]
pub enum EvaluationOutcome {
    /// No heartbeat data; nothing can be said about this subject.
    Skipped { reason: String },
    /// Silence is below every threshold.
    Normal,
    /// An alert was allowed and dispatched (`channel` names the
    /// delivering channel; `None` means every channel failed and the
    /// alert went to the retry queue).
    Fired {
        level: AlertLevel,
        channel: Option<String>,
    },
    Suppressed {
        level: AlertLevel,
        reason: SuppressReason,
    },
    Deferred {
        level: AlertLevel,
        until: DateTime<Utc>,
    },
}

/// Result of submitting a confirmation response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// This response resolved the request (early-exit path).
    Resolved(ConfirmationStatus),
    /// Recorded; the request stays pending until the window expires.
    Recorded,
    /// The request had already resolved; the response was ignored.
    Late,
}

/// Snapshot of a pending confirmation for status queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmationSnapshot {
    pub request_id: Uuid,
    pub status: ConfirmationStatus,
    pub responses: usize,
    pub expires_at: DateTime<Utc>,
}

/// Point-in-time view of a subject inside the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectStatus {
    pub user_id: String,
    pub escalation: EscalationState,
    pub active_confirmation: Option<ConfirmationSnapshot>,
    pub alerts_retained: usize,
    pub retries_pending: usize,
}

/// The engine. See the module docs for the ownership and concurrency
/// story.
pub struct AlertEngine {
    config: EngineConfig,
    heartbeats: Box<dyn HeartbeatSource>,
    activity: Box<dyn ActivitySource>,
    peer_reports: Box<dyn PeerReportSource>,
    thresholds: Box<dyn ThresholdStore>,
    prefs: Box<dyn PrefsStore>,
    profiles: Box<dyn ProfileStore>,
    emergency_contact: Box<dyn EmergencyContactChannel>,
    confirmation_transport: Box<dyn ConfirmationTransport>,
    admin: Box<dyn AdminNotifier>,
    case_log: Box<dyn CaseLog>,
    clock: Rc<dyn Clock>,

    calculator: AlertLevelCalculator,
    suppression: SuppressionPolicy,
    dispatcher: NotificationDispatcher,
    retry: RetryQueue,
    scheduler: TaskScheduler,
    escalation: EscalationTracker,
    confirmation: ConfirmationCoordinator,

    /// Subjects already asked for a peer check-in this episode.
    peer_check_requested: HashSet<String>,
    events: Vec<Event>,
}

impl AlertEngine {
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let Collaborators {
            heartbeats,
            activity,
            peer_reports,
            thresholds,
            prefs,
            profiles,
            channels,
            emergency_contact,
            confirmation_transport,
            admin,
            case_log,
            clock,
        } = collaborators;

        let dispatcher = NotificationDispatcher::new(
            channels,
            config.dispatch.channel_timeout_secs,
            clock.clone(),
        );

        let mut engine = Self {
            calculator: AlertLevelCalculator::new(config.multipliers),
            suppression: SuppressionPolicy::new(config.cooldowns, config.history_retention_hours),
            dispatcher,
            retry: RetryQueue::new(config.retry),
            scheduler: TaskScheduler::new(),
            escalation: EscalationTracker::new(config.escalation),
            confirmation: ConfirmationCoordinator::new(config.confirmation),
            peer_check_requested: HashSet::new(),
            events: Vec::new(),
            config,
            heartbeats,
            activity,
            peer_reports,
            thresholds,
            prefs,
            profiles,
            emergency_contact,
            confirmation_transport,
            admin,
            case_log,
            clock,
        };

        let first_sweep = engine.clock.now() + engine.sweep_interval();
        engine
            .scheduler
            .schedule(TaskKey::global(TaskPurpose::RetrySweep), first_sweep);

        Ok(engine)
    }

    fn sweep_interval(&self) -> Duration {
        Duration::seconds(i64::from(self.config.retry.sweep_interval_secs))
    }

    /// Evaluate one subject's current silence and act on it.
    pub fn evaluate(&mut self, user_id: &str) -> EvaluationOutcome {
        let now = self.clock.now();

        let Some(heartbeat) = self.heartbeats.latest(user_id) else {
            // Fail closed: no data is not "normal" and not "emergency".
            let reason = "no heartbeat data".to_string();
            tracing::warn!(user_id, "evaluation skipped: no heartbeat data");
            self.events.push(Event::EvaluationSkipped {
                user_id: user_id.to_string(),
                reason: reason.clone(),
                at: now,
            });
            return EvaluationOutcome::Skipped { reason };
        };

        let thresholds = self.thresholds.get(user_id);
        let ctx = CalendarContext::for_time(now, &self.config.calendar);
        let silent = minutes_silent(heartbeat.timestamp, now);
        let level = self.calculator.classify(silent, thresholds, ctx);

        if level == AlertLevel::Normal {
            self.resolve_subject(user_id, now);
            return EvaluationOutcome::Normal;
        }

        let candidate = AlertEvent::new(user_id, level, now, silent);
        let recent_activity = self
            .activity
            .has_recent_activity(user_id, self.config.recent_activity_window_minutes);
        let prefs = self.prefs.get(user_id).unwrap_or_default();

        match self.suppression.evaluate(&candidate, recent_activity, &prefs, now) {
            Verdict::Suppress(reason) => {
                tracing::debug!(user_id, ?level, ?reason, "alert suppressed");
                self.events.push(Event::AlertSuppressed {
                    user_id: user_id.to_string(),
                    level,
                    reason,
                    at: now,
                });
                EvaluationOutcome::Suppressed { level, reason }
            }
            Verdict::Defer { until } => {
                self.scheduler.schedule(
                    TaskKey::for_subject(user_id, TaskPurpose::QuietHoursReplay),
                    until,
                );
                self.events.push(Event::AlertDeferred {
                    user_id: user_id.to_string(),
                    level,
                    until,
                    at: now,
                });
                EvaluationOutcome::Deferred { level, until }
            }
            Verdict::Allow => {
                let channel = self.dispatch_alert(&candidate, now);

                if level == AlertLevel::Emergency {
                    self.arm_escalation(user_id, now);
                    self.consider_confirmation(user_id, now);
                }

                EvaluationOutcome::Fired { level, channel }
            }
        }
    }

    /// Evaluate a batch of subjects. Each subject is independent; one
    /// subject's outcome never affects the others.
    pub fn evaluate_all(&mut self, user_ids: &[String]) -> Vec<(String, EvaluationOutcome)> {
        user_ids
            .iter()
            .map(|id| (id.clone(), self.evaluate(id)))
            .collect()
    }

    /// Drive every scheduled task that is due. Call this from the
    /// embedding loop; nothing in the engine fires on its own.
    pub fn tick(&mut self) {
        let now = self.clock.now();
        for key in self.scheduler.due(now) {
            match (key.purpose, key.subject) {
                (TaskPurpose::RetrySweep, _) => {
                    self.sweep_retries(now);
                    let next = now + self.sweep_interval();
                    self.scheduler
                        .schedule(TaskKey::global(TaskPurpose::RetrySweep), next);
                }
                (TaskPurpose::QuietHoursReplay, Some(subject)) => {
                    self.evaluate(&subject);
                }
                (TaskPurpose::EscalationRecheck, Some(subject)) => {
                    self.run_escalation_recheck(&subject, now);
                }
                (TaskPurpose::ConfirmationExpiry, Some(subject)) => {
                    self.run_confirmation_expiry(&subject, now);
                }
                (purpose, None) => {
                    tracing::warn!(?purpose, "scheduled task without subject ignored");
                }
            }
        }
    }

    /// Record a contact's answer to a pending confirmation request.
    pub fn submit_confirmation_response(
        &mut self,
        request_id: Uuid,
        contact_id: &str,
        decision: ContactDecision,
    ) -> Result<ResponseOutcome> {
        let now = self.clock.now();
        match self
            .confirmation
            .record_response(request_id, contact_id, decision, now)?
        {
            ResponseEffect::Resolved(request) => {
                // The early-exit path won; cancel the expiry timer.
                self.scheduler.cancel(&TaskKey::for_subject(
                    &request.subject_user_id,
                    TaskPurpose::ConfirmationExpiry,
                ));
                let status = request.status;
                self.finish_confirmation(request, now);
                Ok(ResponseOutcome::Resolved(status))
            }
            ResponseEffect::Recorded => Ok(ResponseOutcome::Recorded),
            ResponseEffect::Late => {
                tracing::info!(%request_id, contact_id, "late confirmation response ignored");
                self.events.push(Event::LateResponseIgnored {
                    request_id,
                    contact_id: contact_id.to_string(),
                    at: now,
                });
                Ok(ResponseOutcome::Late)
            }
        }
    }

    /// Point-in-time view of one subject.
    pub fn get_status(&self, user_id: &str) -> SubjectStatus {
        SubjectStatus {
            user_id: user_id.to_string(),
            escalation: self.escalation.state(user_id),
            active_confirmation: self.confirmation.active_for(user_id).map(|r| {
                ConfirmationSnapshot {
                    request_id: r.id,
                    status: r.status,
                    responses: r.responses.len(),
                    expires_at: r.expires_at,
                }
            }),
            alerts_retained: self.suppression.history_len(user_id),
            retries_pending: self.retry.pending_for(user_id),
        }
    }

    /// Take every event produced since the last drain.
    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// When the next scheduled task is due, for embedding loops that
    /// want to sleep precisely.
    pub fn next_task_due(&self) -> Option<DateTime<Utc>> {
        self.scheduler.next_due()
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn dispatch_alert(&mut self, alert: &AlertEvent, now: DateTime<Utc>) -> Option<String> {
        let outcome = self.dispatcher.dispatch(alert);
        match outcome.delivered_via {
            Some(via) => {
                self.events.push(Event::AlertFired {
                    alert_id: alert.id,
                    user_id: alert.user_id.clone(),
                    level: alert.level,
                    minutes_silent: alert.minutes_silent,
                    channel: via.clone(),
                    at: now,
                });
                Some(via)
            }
            None => {
                self.retry.enqueue(alert.clone(), now);
                let next_attempt_at =
                    now + Duration::seconds(i64::from(self.config.retry.base_delay_secs));
                self.events.push(Event::RetryScheduled {
                    alert_id: alert.id,
                    user_id: alert.user_id.clone(),
                    attempt: 1,
                    next_attempt_at,
                    at: now,
                });
                None
            }
        }
    }

    fn sweep_retries(&mut self, now: DateTime<Utc>) {
        for item in self.retry.due(now) {
            let outcome = self.dispatcher.dispatch(&item.alert);
            if let Some(via) = outcome.delivered_via {
                self.events.push(Event::AlertFired {
                    alert_id: item.alert.id,
                    user_id: item.alert.user_id.clone(),
                    level: item.alert.level,
                    minutes_silent: item.alert.minutes_silent,
                    channel: via,
                    at: now,
                });
                continue;
            }

            let alert_id = item.alert.id;
            let user_id = item.alert.user_id.clone();
            let attempts_made = item.attempt + 1;
            match self.retry.requeue(item, now) {
                Some(next_attempt_at) => self.events.push(Event::RetryScheduled {
                    alert_id,
                    user_id,
                    attempt: attempts_made,
                    next_attempt_at,
                    at: now,
                }),
                None => self.events.push(Event::DeliveryAbandoned {
                    alert_id,
                    user_id,
                    attempts: attempts_made,
                    at: now,
                }),
            }
        }
    }

    fn arm_escalation(&mut self, user_id: &str, now: DateTime<Utc>) {
        if self.escalation.arm(user_id) {
            let recheck_at = now + self.escalation.recheck_delay();
            self.scheduler.schedule(
                TaskKey::for_subject(user_id, TaskPurpose::EscalationRecheck),
                recheck_at,
            );
            self.events.push(Event::EscalationArmed {
                user_id: user_id.to_string(),
                recheck_at,
                at: now,
            });
        }
    }

    fn run_escalation_recheck(&mut self, subject: &str, now: DateTime<Utc>) {
        let Some(heartbeat) = self.heartbeats.latest(subject) else {
            // Cannot evaluate; keep the machine armed and try again later.
            tracing::warn!(subject, "escalation re-check skipped: no heartbeat data");
            self.scheduler.schedule(
                TaskKey::for_subject(subject, TaskPurpose::EscalationRecheck),
                now + self.escalation.recheck_delay(),
            );
            return;
        };

        let thresholds = self.thresholds.get(subject);
        let ctx = CalendarContext::for_time(now, &self.config.calendar);
        let silent = minutes_silent(heartbeat.timestamp, now);
        let level = self.calculator.classify(silent, thresholds, ctx);

        if level < AlertLevel::Emergency {
            self.resolve_subject(subject, now);
            return;
        }

        let Some(escalation_level) = self.escalation.advance(subject) else {
            return;
        };

        if let Err(e) = self.admin.notify(subject, escalation_level, silent) {
            tracing::warn!(subject, error = %e, "admin escalation notice failed");
        }

        let services_contacted = self.escalation.contacts_services(escalation_level);
        if services_contacted {
            let reported_by = self
                .profiles
                .get(subject)
                .map(|p| p.peer_ids)
                .unwrap_or_default();
            self.file_outside_report(subject, silent, reported_by, now);
        }

        self.scheduler.schedule(
            TaskKey::for_subject(subject, TaskPurpose::EscalationRecheck),
            now + self.escalation.recheck_delay(),
        );
        self.events.push(Event::EscalationAdvanced {
            user_id: subject.to_string(),
            escalation_level,
            services_contacted,
            at: now,
        });
    }

    fn consider_confirmation(&mut self, user_id: &str, now: DateTime<Utc>) {
        if self.confirmation.active_for(user_id).is_some()
            || self.confirmation.episode_done(user_id)
        {
            return;
        }

        let Some(profile) = self.profiles.get(user_id) else {
            tracing::warn!(user_id, "no profile; cannot run confirmation protocol");
            return;
        };
        if profile.peer_ids.is_empty() {
            tracing::warn!(user_id, "no peer contacts; cannot run confirmation protocol");
            return;
        }

        let window_hours = self.confirmation.config().peer_report_window_hours;
        if !self.peer_reports.has_recent_peer_report(user_id, window_hours) {
            // No corroboration yet: ask the peers to check in and defer.
            if self.peer_check_requested.insert(user_id.to_string()) {
                let max = self.confirmation.config().max_contacts;
                let contacts: Vec<String> =
                    profile.peer_ids.iter().take(max).cloned().collect();
                for contact in &contacts {
                    if let Err(e) = self
                        .confirmation_transport
                        .request_peer_check(contact, user_id)
                    {
                        tracing::warn!(user_id, contact, error = %e, "peer check request failed");
                    }
                }
                self.events.push(Event::PeerConfirmationRequested {
                    user_id: user_id.to_string(),
                    contacts,
                    at: now,
                });
            }
            return;
        }

        let Some(request) = self
            .confirmation
            .open(user_id, &profile.peer_ids, now)
            .cloned()
        else {
            return;
        };

        for contact in &request.contact_ids {
            if let Err(e) = self.confirmation_transport.request(contact, &request) {
                tracing::warn!(user_id, contact, error = %e, "confirmation request transport failed");
            }
        }
        self.scheduler.schedule(
            TaskKey::for_subject(user_id, TaskPurpose::ConfirmationExpiry),
            request.expires_at,
        );
        self.events.push(Event::ConfirmationOpened {
            request_id: request.id,
            user_id: user_id.to_string(),
            contacts: request.contact_ids.clone(),
            expires_at: request.expires_at,
            at: now,
        });
    }

    fn run_confirmation_expiry(&mut self, subject: &str, now: DateTime<Utc>) {
        if let Some(request) = self.confirmation.resolve_expired(subject) {
            self.finish_confirmation(request, now);
        }
    }

    /// Handle a request that just reached a terminal status: emit the
    /// resolution, file the outside report when affirmative, persist to
    /// the case log and drop from live memory.
    fn finish_confirmation(&mut self, request: ConfirmationRequest, now: DateTime<Utc>) {
        self.events.push(Event::ConfirmationResolved {
            request_id: request.id,
            user_id: request.subject_user_id.clone(),
            status: request.status,
            responses: request.responses.len(),
            at: now,
        });

        if request.status.is_affirmative() {
            let subject = &request.subject_user_id;
            let silent = self
                .heartbeats
                .latest(subject)
                .map(|hb| minutes_silent(hb.timestamp, now))
                .unwrap_or(0.0);
            let reported_by: Vec<String> = if request.responses.is_empty() {
                request.contact_ids.clone()
            } else {
                request
                    .responses
                    .iter()
                    .filter(|(_, d)| **d == ContactDecision::Confirm)
                    .map(|(c, _)| c.clone())
                    .collect()
            };
            self.file_outside_report(subject, silent, reported_by, now);
        }

        self.case_log.record(&request);
    }

    fn file_outside_report(
        &mut self,
        subject: &str,
        silent: f64,
        reported_by: Vec<String>,
        now: DateTime<Utc>,
    ) {
        let Some(profile) = self.profiles.get(subject) else {
            tracing::error!(subject, "no profile; outside report cannot be built");
            return;
        };

        let report = EmergencyReport::new(profile, silent, reported_by, now);
        let services = self.config.services.enabled();
        let results = file_report(self.emergency_contact.as_ref(), &services, &report);

        self.events.push(Event::OutsideReportFiled {
            report_id: report.report_id,
            user_id: subject.to_string(),
            results,
            at: now,
        });
    }

    /// A fresh heartbeat brought the subject back below every
    /// threshold: stop the escalation machine, cancel its re-check,
    /// and abort any pending confirmation.
    fn resolve_subject(&mut self, user_id: &str, now: DateTime<Utc>) {
        if self.escalation.resolve(user_id) {
            self.scheduler
                .cancel(&TaskKey::for_subject(user_id, TaskPurpose::EscalationRecheck));
            self.events.push(Event::SubjectResolved {
                user_id: user_id.to_string(),
                at: now,
            });
        }

        if let Some(aborted) = self.confirmation.abort_on_resolution(user_id) {
            self.scheduler
                .cancel(&TaskKey::for_subject(user_id, TaskPurpose::ConfirmationExpiry));
            self.events.push(Event::ConfirmationResolved {
                request_id: aborted.id,
                user_id: user_id.to_string(),
                status: aborted.status,
                responses: aborted.responses.len(),
                at: now,
            });
            self.case_log.record(&aborted);
        }

        self.peer_check_requested.remove(user_id);
    }
}

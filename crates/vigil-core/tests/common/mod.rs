//! Shared test harness: scripted collaborators around a manual clock.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use vigil_core::confirmation::ConfirmationRequest;
use vigil_core::engine::{AlertEngine, Collaborators};
use vigil_core::level::{AlertEvent, ThresholdSet};
use vigil_core::report::{EmergencyReport, ServiceKind, SubjectProfile};
use vigil_core::sources::{
    ActivitySource, AdminNotifier, CaseLog, Channel, Clock, ConfirmationTransport,
    EmergencyContactChannel, HeartbeatRecord, HeartbeatSource, ManualClock, PeerReportSource,
    PrefsStore, ProfileStore, ThresholdStore,
};
use vigil_core::suppression::UserNotificationPrefs;
use vigil_core::EngineConfig;

/// Wednesday noon, far from weekends, nights and holidays.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap()
}

pub struct TestWorld {
    pub clock: Rc<ManualClock>,
    pub heartbeats: Rc<RefCell<HashMap<String, DateTime<Utc>>>>,
    pub recent_activity: Rc<Cell<bool>>,
    pub peer_report: Rc<Cell<bool>>,
    pub profiles: Rc<RefCell<HashMap<String, SubjectProfile>>>,
    pub prefs: Rc<RefCell<HashMap<String, UserNotificationPrefs>>>,
    pub local_ok: Rc<Cell<bool>>,
    pub push_ok: Rc<Cell<bool>>,
    pub delivered: Rc<RefCell<Vec<(String, AlertEvent)>>>,
    pub failing_services: Rc<RefCell<Vec<ServiceKind>>>,
    pub reports: Rc<RefCell<Vec<(ServiceKind, EmergencyReport)>>>,
    pub confirmation_requests: Rc<RefCell<Vec<(String, Uuid)>>>,
    pub peer_checks: Rc<RefCell<Vec<(String, String)>>>,
    pub admin_notices: Rc<RefCell<Vec<(String, u32)>>>,
    pub case_log: Rc<RefCell<Vec<ConfirmationRequest>>>,
}

impl TestWorld {
    pub fn new() -> Self {
        Self {
            clock: Rc::new(ManualClock::new(t0())),
            heartbeats: Rc::new(RefCell::new(HashMap::new())),
            recent_activity: Rc::new(Cell::new(false)),
            peer_report: Rc::new(Cell::new(false)),
            profiles: Rc::new(RefCell::new(HashMap::new())),
            prefs: Rc::new(RefCell::new(HashMap::new())),
            local_ok: Rc::new(Cell::new(true)),
            push_ok: Rc::new(Cell::new(true)),
            delivered: Rc::new(RefCell::new(Vec::new())),
            failing_services: Rc::new(RefCell::new(Vec::new())),
            reports: Rc::new(RefCell::new(Vec::new())),
            confirmation_requests: Rc::new(RefCell::new(Vec::new())),
            peer_checks: Rc::new(RefCell::new(Vec::new())),
            admin_notices: Rc::new(RefCell::new(Vec::new())),
            case_log: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn engine(&self, config: EngineConfig) -> AlertEngine {
        let collaborators = Collaborators {
            heartbeats: Box::new(MapHeartbeats(self.heartbeats.clone())),
            activity: Box::new(FlagActivity(self.recent_activity.clone())),
            peer_reports: Box::new(FlagPeerReport(self.peer_report.clone())),
            thresholds: Box::new(DefaultThresholds),
            prefs: Box::new(MapPrefs(self.prefs.clone())),
            profiles: Box::new(MapProfiles(self.profiles.clone())),
            channels: vec![
                Box::new(TestChannel {
                    name: "local",
                    ok: self.local_ok.clone(),
                    delivered: self.delivered.clone(),
                }),
                Box::new(TestChannel {
                    name: "push",
                    ok: self.push_ok.clone(),
                    delivered: self.delivered.clone(),
                }),
            ],
            emergency_contact: Box::new(TestEmergencyChannel {
                failing: self.failing_services.clone(),
                reports: self.reports.clone(),
            }),
            confirmation_transport: Box::new(TestTransport {
                requests: self.confirmation_requests.clone(),
                peer_checks: self.peer_checks.clone(),
            }),
            admin: Box::new(TestAdmin(self.admin_notices.clone())),
            case_log: Box::new(TestCaseLog(self.case_log.clone())),
            clock: self.clock.clone(),
        };
        AlertEngine::new(config, collaborators).unwrap()
    }

    pub fn set_heartbeat(&self, user_id: &str, at: DateTime<Utc>) {
        self.heartbeats.borrow_mut().insert(user_id.to_string(), at);
    }

    /// Place the user's last heartbeat `minutes` before the current
    /// clock reading.
    pub fn set_silence(&self, user_id: &str, minutes: i64) {
        self.set_heartbeat(user_id, self.clock.now() - Duration::minutes(minutes));
    }

    pub fn add_profile(&self, user_id: &str, peers: &[&str]) {
        let profile = SubjectProfile {
            user_id: user_id.to_string(),
            name: format!("{user_id} name"),
            address: "12 Test Street".to_string(),
            peer_ids: peers.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        };
        self.profiles
            .borrow_mut()
            .insert(user_id.to_string(), profile);
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}

struct MapHeartbeats(Rc<RefCell<HashMap<String, DateTime<Utc>>>>);

impl HeartbeatSource for MapHeartbeats {
    fn latest(&self, user_id: &str) -> Option<HeartbeatRecord> {
        self.0.borrow().get(user_id).map(|t| HeartbeatRecord {
            user_id: user_id.to_string(),
            timestamp: *t,
        })
    }
}

struct FlagActivity(Rc<Cell<bool>>);

impl ActivitySource for FlagActivity {
    fn has_recent_activity(&self, _user_id: &str, _within_minutes: u32) -> bool {
        self.0.get()
    }
}

struct FlagPeerReport(Rc<Cell<bool>>);

impl PeerReportSource for FlagPeerReport {
    fn has_recent_peer_report(&self, _user_id: &str, _within_hours: u32) -> bool {
        self.0.get()
    }
}

struct DefaultThresholds;

impl ThresholdStore for DefaultThresholds {
    fn get(&self, _user_id: &str) -> ThresholdSet {
        ThresholdSet::default()
    }
}

struct MapPrefs(Rc<RefCell<HashMap<String, UserNotificationPrefs>>>);

impl PrefsStore for MapPrefs {
    fn get(&self, user_id: &str) -> Option<UserNotificationPrefs> {
        self.0.borrow().get(user_id).copied()
    }
}

struct MapProfiles(Rc<RefCell<HashMap<String, SubjectProfile>>>);

impl ProfileStore for MapProfiles {
    fn get(&self, user_id: &str) -> Option<SubjectProfile> {
        self.0.borrow().get(user_id).cloned()
    }
}

struct TestChannel {
    name: &'static str,
    ok: Rc<Cell<bool>>,
    delivered: Rc<RefCell<Vec<(String, AlertEvent)>>>,
}

impl Channel for TestChannel {
    fn name(&self) -> &str {
        self.name
    }

    fn send(&self, event: &AlertEvent) -> Result<(), Box<dyn std::error::Error>> {
        if self.ok.get() {
            self.delivered
                .borrow_mut()
                .push((self.name.to_string(), event.clone()));
            Ok(())
        } else {
            Err("channel down".into())
        }
    }
}

struct TestEmergencyChannel {
    failing: Rc<RefCell<Vec<ServiceKind>>>,
    reports: Rc<RefCell<Vec<(ServiceKind, EmergencyReport)>>>,
}

impl EmergencyContactChannel for TestEmergencyChannel {
    fn report(
        &self,
        report: &EmergencyReport,
        service: ServiceKind,
    ) -> Result<(), Box<dyn std::error::Error>> {
        if self.failing.borrow().contains(&service) {
            return Err(format!("{} unreachable", service.name()).into());
        }
        self.reports.borrow_mut().push((service, report.clone()));
        Ok(())
    }
}

struct TestTransport {
    requests: Rc<RefCell<Vec<(String, Uuid)>>>,
    peer_checks: Rc<RefCell<Vec<(String, String)>>>,
}

impl ConfirmationTransport for TestTransport {
    fn request(
        &self,
        contact_id: &str,
        request: &ConfirmationRequest,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.requests
            .borrow_mut()
            .push((contact_id.to_string(), request.id));
        Ok(())
    }

    fn request_peer_check(
        &self,
        contact_id: &str,
        subject_user_id: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.peer_checks
            .borrow_mut()
            .push((contact_id.to_string(), subject_user_id.to_string()));
        Ok(())
    }
}

struct TestAdmin(Rc<RefCell<Vec<(String, u32)>>>);

impl AdminNotifier for TestAdmin {
    fn notify(
        &self,
        user_id: &str,
        escalation_level: u32,
        _minutes_silent: f64,
    ) -> Result<(), Box<dyn std::error::Error>> {
        self.0
            .borrow_mut()
            .push((user_id.to_string(), escalation_level));
        Ok(())
    }
}

struct TestCaseLog(Rc<RefCell<Vec<ConfirmationRequest>>>);

impl CaseLog for TestCaseLog {
    fn record(&self, request: &ConfirmationRequest) {
        self.0.borrow_mut().push(request.clone());
    }
}

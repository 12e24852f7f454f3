//! Scenario replay: drives a real engine with a scripted clock and
//! prints the event stream as JSON lines.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use chrono::{DateTime, Duration, Utc};
use clap::Args;
use serde::Deserialize;
use vigil_core::confirmation::{ConfirmationRequest, ContactDecision};
use vigil_core::engine::{AlertEngine, Collaborators};
use vigil_core::level::{AlertEvent, ThresholdSet};
use vigil_core::report::{EmergencyReport, ServiceKind, SubjectProfile};
use vigil_core::sources::{
    ActivitySource, AdminNotifier, CaseLog, Channel, Clock, ConfirmationTransport,
    EmergencyContactChannel, HeartbeatRecord, HeartbeatSource, ManualClock, PeerReportSource,
    PrefsStore, ProfileStore, ThresholdStore,
};
use vigil_core::suppression::UserNotificationPrefs;

#[derive(Args)]
pub struct SimulateArgs {
    /// Scenario file (TOML)
    file: PathBuf,
    /// Configuration file for engine settings
    #[arg(long)]
    config: Option<PathBuf>,
    /// Real-time pause between steps, in milliseconds
    #[arg(long, default_value = "0")]
    pace_ms: u64,
}

#[derive(Debug, Deserialize)]
struct Scenario {
    /// Simulated clock at the first step.
    start: DateTime<Utc>,
    #[serde(default)]
    users: Vec<ScenarioUser>,
    #[serde(default)]
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
struct ScenarioUser {
    id: String,
    last_heartbeat: Option<DateTime<Utc>>,
    #[serde(default)]
    peers: Vec<String>,
    #[serde(default)]
    peer_report: bool,
    #[serde(default)]
    recent_activity: bool,
}

#[derive(Debug, Deserialize)]
struct Step {
    /// Minutes to advance the simulated clock before acting.
    #[serde(default)]
    advance_minutes: i64,
    /// Users whose heartbeat refreshes to the simulated "now".
    #[serde(default)]
    heartbeat: Vec<String>,
    /// Users to evaluate this step.
    #[serde(default)]
    evaluate: Vec<String>,
    /// Whether to fire due scheduled tasks this step.
    #[serde(default)]
    tick: bool,
    /// Confirmation responses arriving this step.
    #[serde(default)]
    respond: Vec<Response>,
}

#[derive(Debug, Deserialize)]
struct Response {
    user: String,
    contact: String,
    decision: ContactDecision,
}

pub fn run(args: SimulateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(&args.file)?;
    let scenario: Scenario = toml::from_str(&raw)?;
    let config = super::config::load(args.config)?;

    let clock = Rc::new(ManualClock::new(scenario.start));
    let heartbeats = Rc::new(RefCell::new(HashMap::new()));
    let mut activity = HashMap::new();
    let mut peer_reports = HashMap::new();
    let mut profiles = HashMap::new();

    for user in &scenario.users {
        if let Some(at) = user.last_heartbeat {
            heartbeats.borrow_mut().insert(user.id.clone(), at);
        }
        activity.insert(user.id.clone(), user.recent_activity);
        peer_reports.insert(user.id.clone(), user.peer_report);
        profiles.insert(
            user.id.clone(),
            SubjectProfile {
                user_id: user.id.clone(),
                name: user.id.clone(),
                peer_ids: user.peers.clone(),
                ..Default::default()
            },
        );
    }

    let collaborators = Collaborators {
        heartbeats: Box::new(SharedHeartbeats(heartbeats.clone())),
        activity: Box::new(StaticActivity(activity)),
        peer_reports: Box::new(StaticPeerReports(peer_reports)),
        thresholds: Box::new(ConfigThresholds(config.thresholds)),
        prefs: Box::new(NoPrefs),
        profiles: Box::new(StaticProfiles(profiles)),
        channels: vec![Box::new(ConsoleChannel)],
        emergency_contact: Box::new(ConsoleEmergencyChannel),
        confirmation_transport: Box::new(ConsoleTransport),
        admin: Box::new(ConsoleAdmin),
        case_log: Box::new(ConsoleCaseLog),
        clock: clock.clone(),
    };
    let mut engine = AlertEngine::new(config, collaborators)?;

    for (index, step) in scenario.steps.iter().enumerate() {
        if step.advance_minutes > 0 {
            clock.advance(Duration::minutes(step.advance_minutes));
        }
        pause(args.pace_ms);

        for user in &step.heartbeat {
            heartbeats.borrow_mut().insert(user.clone(), clock.now());
        }
        if step.tick {
            engine.tick();
        }
        for user in &step.evaluate {
            engine.evaluate(user);
        }
        for response in &step.respond {
            let Some(snapshot) = engine.get_status(&response.user).active_confirmation else {
                eprintln!(
                    "step {index}: no pending confirmation for {}, response dropped",
                    response.user
                );
                continue;
            };
            engine.submit_confirmation_response(
                snapshot.request_id,
                &response.contact,
                response.decision,
            )?;
        }

        for event in engine.drain_events() {
            println!("{}", serde_json::to_string(&event)?);
        }
    }

    Ok(())
}

fn pause(pace_ms: u64) {
    if pace_ms == 0 {
        return;
    }
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("tokio runtime");
    runtime.block_on(tokio::time::sleep(std::time::Duration::from_millis(pace_ms)));
}

struct SharedHeartbeats(Rc<RefCell<HashMap<String, DateTime<Utc>>>>);

impl HeartbeatSource for SharedHeartbeats {
    fn latest(&self, user_id: &str) -> Option<HeartbeatRecord> {
        self.0.borrow().get(user_id).map(|t| HeartbeatRecord {
            user_id: user_id.to_string(),
            timestamp: *t,
        })
    }
}

struct StaticActivity(HashMap<String, bool>);

impl ActivitySource for StaticActivity {
    fn has_recent_activity(&self, user_id: &str, _within_minutes: u32) -> bool {
        self.0.get(user_id).copied().unwrap_or(false)
    }
}

struct StaticPeerReports(HashMap<String, bool>);

impl PeerReportSource for StaticPeerReports {
    fn has_recent_peer_report(&self, user_id: &str, _within_hours: u32) -> bool {
        self.0.get(user_id).copied().unwrap_or(false)
    }
}

struct ConfigThresholds(ThresholdSet);

impl ThresholdStore for ConfigThresholds {
    fn get(&self, _user_id: &str) -> ThresholdSet {
        self.0
    }
}

struct NoPrefs;

impl PrefsStore for NoPrefs {
    fn get(&self, _user_id: &str) -> Option<UserNotificationPrefs> {
        None
    }
}

struct StaticProfiles(HashMap<String, SubjectProfile>);

impl ProfileStore for StaticProfiles {
    fn get(&self, user_id: &str) -> Option<SubjectProfile> {
        self.0.get(user_id).cloned()
    }
}

struct ConsoleChannel;

impl Channel for ConsoleChannel {
    fn name(&self) -> &str {
        "console"
    }

    fn send(&self, event: &AlertEvent) -> Result<(), Box<dyn std::error::Error>> {
        eprintln!(
            "[deliver] {} level={:?} silent={:.0}min",
            event.user_id, event.level, event.minutes_silent
        );
        Ok(())
    }
}

struct ConsoleEmergencyChannel;

impl EmergencyContactChannel for ConsoleEmergencyChannel {
    fn report(
        &self,
        report: &EmergencyReport,
        service: ServiceKind,
    ) -> Result<(), Box<dyn std::error::Error>> {
        eprintln!(
            "[report:{}] subject={} silent={:.0}min reported_by={:?}",
            service.name(),
            report.subject.user_id,
            report.minutes_silent,
            report.reported_by
        );
        Ok(())
    }
}

struct ConsoleTransport;

impl ConfirmationTransport for ConsoleTransport {
    fn request(
        &self,
        contact_id: &str,
        request: &ConfirmationRequest,
    ) -> Result<(), Box<dyn std::error::Error>> {
        eprintln!(
            "[confirm?] contact={contact_id} subject={} expires={}",
            request.subject_user_id, request.expires_at
        );
        Ok(())
    }

    fn request_peer_check(
        &self,
        contact_id: &str,
        subject_user_id: &str,
    ) -> Result<(), Box<dyn std::error::Error>> {
        eprintln!("[check-in?] contact={contact_id} subject={subject_user_id}");
        Ok(())
    }
}

struct ConsoleAdmin;

impl AdminNotifier for ConsoleAdmin {
    fn notify(
        &self,
        user_id: &str,
        escalation_level: u32,
        minutes_silent: f64,
    ) -> Result<(), Box<dyn std::error::Error>> {
        eprintln!("[admin] subject={user_id} escalation={escalation_level} silent={minutes_silent:.0}min");
        Ok(())
    }
}

struct ConsoleCaseLog;

impl CaseLog for ConsoleCaseLog {
    fn record(&self, request: &ConfirmationRequest) {
        eprintln!(
            "[case-log] request={} subject={} status={:?} responses={}",
            request.id,
            request.subject_user_id,
            request.status,
            request.responses.len()
        );
    }
}

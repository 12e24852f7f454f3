//! Outside emergency reports.
//!
//! Once a confirmed emergency exists, the engine files a report with each
//! enabled public service through the injected contact channel. A failure
//! on one service never stops the attempts on the remaining services.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::level::AlertLevel;
use crate::sources::EmergencyContactChannel;

/// A public service that can receive an emergency report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// Emergency medical dispatch.
    Medical,
    /// Police.
    Police,
    /// Local administrative welfare office.
    Administrative,
}

impl ServiceKind {
    pub fn name(self) -> &'static str {
        match self {
            ServiceKind::Medical => "medical",
            ServiceKind::Police => "police",
            ServiceKind::Administrative => "administrative",
        }
    }
}

/// A phone contact included in a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub name: String,
    pub phone: String,
}

/// Everything the engine knows about a monitored subject that belongs in
/// an outside report. Owned by an external profile collaborator; the
/// engine only reads it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectProfile {
    pub user_id: String,
    pub name: String,
    pub address: String,
    pub detail_address: Option<String>,
    pub postal_code: Option<String>,
    pub blood_type: Option<String>,
    pub medical_conditions: Vec<String>,
    pub medications: Vec<String>,
    /// Phone contacts to include in an outside report.
    pub emergency_contacts: Vec<EmergencyContact>,
    /// Peer user ids watching this subject, used for confirmation requests.
    pub peer_ids: Vec<String>,
}

/// The report handed to the outside-report collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyReport {
    pub report_id: Uuid,
    pub subject: SubjectProfile,
    pub level: AlertLevel,
    pub minutes_silent: f64,
    /// Peers who took part in corroborating the emergency.
    pub reported_by: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl EmergencyReport {
    pub fn new(
        subject: SubjectProfile,
        minutes_silent: f64,
        reported_by: Vec<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            report_id: Uuid::new_v4(),
            subject,
            level: AlertLevel::Emergency,
            minutes_silent,
            reported_by,
            created_at,
        }
    }
}

/// Per-service outcome of filing a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceReportResult {
    pub service: ServiceKind,
    pub success: bool,
    pub detail: Option<String>,
}

/// File a report with each enabled service, continuing through failures.
pub fn file_report(
    channel: &dyn EmergencyContactChannel,
    services: &[ServiceKind],
    report: &EmergencyReport,
) -> Vec<ServiceReportResult> {
    let mut results = Vec::with_capacity(services.len());
    for &service in services {
        match channel.report(report, service) {
            Ok(()) => {
                tracing::info!(service = service.name(), report_id = %report.report_id, "outside report filed");
                results.push(ServiceReportResult {
                    service,
                    success: true,
                    detail: None,
                });
            }
            Err(e) => {
                tracing::error!(service = service.name(), report_id = %report.report_id, error = %e, "outside report failed");
                results.push(ServiceReportResult {
                    service,
                    success: false,
                    detail: Some(e.to_string()),
                });
            }
        }
    }
    results
}

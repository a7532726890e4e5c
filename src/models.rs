use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Citizen,
    Moderator,
    Volunteer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Citizen => "citizen",
            Role::Moderator => "moderator",
            Role::Volunteer => "volunteer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub fullname: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub rejection_count: u32,
    #[serde(default)]
    pub is_suspended: bool,
    #[serde(default)]
    pub suspended_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub suspended_by: Option<String>,
    #[serde(default)]
    pub suspension_reason: Option<String>,
}

impl User {
    pub fn has_phone(&self) -> bool {
        !self.phone.trim().is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub fullname: String,
    pub email: String,
    pub password: String,
    pub phone: String,
    pub role: Role,
}

/// Shallow patch applied by `users::update_user`. `None` leaves a field untouched;
/// the nested options on the suspension fields allow clearing them.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub fullname: Option<String>,
    pub phone: Option<String>,
    pub password: Option<String>,
    pub rejection_count: Option<u32>,
    pub is_suspended: Option<bool>,
    pub suspended_until: Option<Option<DateTime<Utc>>>,
    pub suspended_by: Option<Option<String>>,
    pub suspension_reason: Option<Option<String>>,
}

impl UserPatch {
    pub fn clear_suspension() -> Self {
        Self {
            is_suspended: Some(false),
            suspended_until: Some(None),
            suspended_by: Some(None),
            suspension_reason: Some(None),
            ..Self::default()
        }
    }

    pub fn apply(self, user: &mut User) {
        if let Some(fullname) = self.fullname {
            user.fullname = fullname;
        }
        if let Some(phone) = self.phone {
            user.phone = phone;
        }
        if let Some(password) = self.password {
            user.password = password;
        }
        if let Some(count) = self.rejection_count {
            user.rejection_count = count;
        }
        if let Some(suspended) = self.is_suspended {
            user.is_suspended = suspended;
        }
        if let Some(until) = self.suspended_until {
            user.suspended_until = until;
        }
        if let Some(by) = self.suspended_by {
            user.suspended_by = by;
        }
        if let Some(reason) = self.suspension_reason {
            user.suspension_reason = reason;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum IssueType {
    IllegalDumping,
    OverflowingBin,
    MissedCollection,
    DamagedBin,
    HazardousWaste,
    Other,
}

impl IssueType {
    pub fn label(&self) -> &'static str {
        match self {
            IssueType::IllegalDumping => "Illegal Dumping",
            IssueType::OverflowingBin => "Overflowing Bin",
            IssueType::MissedCollection => "Missed Collection",
            IssueType::DamagedBin => "Damaged Bin",
            IssueType::HazardousWaste => "Hazardous Waste",
            IssueType::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Location {
    Coordinates {
        latitude: f64,
        longitude: f64,
    },
    #[serde(rename_all = "camelCase")]
    Manual {
        address: String,
        city: String,
        postal_code: String,
    },
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Coordinates {
                latitude,
                longitude,
            } => write!(f, "Lat: {latitude:.4}, Lng: {longitude:.4}"),
            Location::Manual {
                address,
                city,
                postal_code,
            } => write!(f, "{address}, {city}, {postal_code}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ReportStatus {
    Pending,
    Verified,
    Rejected,
    InProgress,
    Resolved,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Verified => "verified",
            ReportStatus::Rejected => "rejected",
            ReportStatus::InProgress => "in-progress",
            ReportStatus::Resolved => "resolved",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub user_email: String,
    pub issue_type: IssueType,
    pub description: String,
    pub photo: String,
    pub location: Location,
    pub status: ReportStatus,
    pub instant_verification: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub verified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub verified_by: Option<String>,
    #[serde(default)]
    pub verification_method: Option<String>,
    #[serde(default)]
    pub instant_verification_completed: bool,
    #[serde(default)]
    pub rejected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rejected_by: Option<String>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub assigned_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assigned_volunteer_id: Option<Uuid>,
    #[serde(default)]
    pub assigned_volunteer: Option<String>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completion_photo: Option<String>,
    #[serde(default)]
    pub completion_notes: Option<String>,
}

impl Report {
    pub fn awaits_instant_verification(&self) -> bool {
        self.instant_verification && self.status == ReportStatus::Pending
    }
}

/// Finished inputs handed over by the capture collaborators.
#[derive(Debug, Clone, Default)]
pub struct NewReport {
    pub issue_type: Option<IssueType>,
    pub description: String,
    pub photo: Option<String>,
    pub location: Option<Location>,
    pub instant_verification: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Assigned,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Assigned => "assigned",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub report_id: Uuid,
    pub volunteer_id: Uuid,
    pub volunteer_name: String,
    pub status: TaskStatus,
    pub assigned_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completion_photo: Option<String>,
    #[serde(default)]
    pub completion_notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum PerformanceReportType {
    QualityIssues,
    BehavioralIssues,
    AttendanceIssues,
    PositivePerformance,
    SafetyViolations,
    OtherIssues,
}

impl PerformanceReportType {
    pub fn label(&self) -> &'static str {
        match self {
            PerformanceReportType::QualityIssues => "Quality of Work Issues",
            PerformanceReportType::BehavioralIssues => "Behavioral Issues",
            PerformanceReportType::AttendanceIssues => "Attendance Issues",
            PerformanceReportType::PositivePerformance => "Positive Performance",
            PerformanceReportType::SafetyViolations => "Safety Violations",
            PerformanceReportType::OtherIssues => "Other Issues",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceReport {
    pub report_id: Uuid,
    pub task_id: Uuid,
    pub waste_report_id: Uuid,
    pub volunteer_id: Uuid,
    pub volunteer_name: String,
    pub volunteer_email: String,
    pub report_type: PerformanceReportType,
    pub performance_rating: u8,
    pub description: String,
    pub evidence_notes: String,
    pub moderator_id: Uuid,
    pub moderator_name: String,
    pub created_at: DateTime<Utc>,
    pub is_positive: bool,
}

#[derive(Debug, Clone)]
pub struct NewPerformanceReport {
    pub task_id: Uuid,
    pub report_type: Option<PerformanceReportType>,
    pub performance_rating: u8,
    pub description: String,
    pub evidence_notes: String,
    pub confirmed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WarningLevel {
    None,
    Low,
    Medium,
    High,
}

impl WarningLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            WarningLevel::None => "none",
            WarningLevel::Low => "low",
            WarningLevel::Medium => "medium",
            WarningLevel::High => "high",
        }
    }
}

impl fmt::Display for WarningLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub total_reports: usize,
    pub positive_reports: usize,
    pub negative_reports: usize,
    pub average_rating: f64,
    pub recent_reports: Vec<PerformanceReport>,
    pub warning_level: WarningLevel,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DashboardStats {
    pub total_reports: usize,
    pub pending_reports: usize,
    pub resolved_reports: usize,
    pub total_citizens: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskStats {
    pub total_tasks: usize,
    pub active_tasks: usize,
    pub completed_tasks: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_serializes_with_type_tag() {
        let manual = Location::Manual {
            address: "12 Elm Street".to_string(),
            city: "Springfield".to_string(),
            postal_code: "12345".to_string(),
        };
        let value = serde_json::to_value(&manual).unwrap();
        assert_eq!(value["type"], "manual");
        assert_eq!(value["postalCode"], "12345");

        let coords: Location =
            serde_json::from_str(r#"{"type":"coordinates","latitude":1.5,"longitude":-2.25}"#)
                .unwrap();
        assert_eq!(
            coords,
            Location::Coordinates {
                latitude: 1.5,
                longitude: -2.25
            }
        );
    }

    #[test]
    fn statuses_use_kebab_case_strings() {
        let value = serde_json::to_value(ReportStatus::InProgress).unwrap();
        assert_eq!(value, "in-progress");
        let issue: IssueType = serde_json::from_str(r#""overflowing-bin""#).unwrap();
        assert_eq!(issue, IssueType::OverflowingBin);
    }

    #[test]
    fn clear_suspension_patch_resets_all_fields() {
        let mut user = User {
            id: Uuid::new_v4(),
            fullname: "Avery Lee".to_string(),
            email: "avery@example.com".to_string(),
            password: "secret1".to_string(),
            phone: String::new(),
            role: Role::Citizen,
            created_at: Utc::now(),
            rejection_count: 6,
            is_suspended: true,
            suspended_until: Some(Utc::now()),
            suspended_by: Some("Mod".to_string()),
            suspension_reason: Some("spam".to_string()),
        };
        UserPatch::clear_suspension().apply(&mut user);
        assert!(!user.is_suspended);
        assert!(user.suspended_until.is_none());
        assert!(user.suspended_by.is_none());
        assert!(user.suspension_reason.is_none());
        assert_eq!(user.rejection_count, 6);
    }
}

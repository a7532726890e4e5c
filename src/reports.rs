use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::context::Context;
use crate::error::{AppError, Result};
use crate::models::{
    DashboardStats, IssueType, Location, NewReport, Report, ReportStatus, Role, User, UserPatch,
};
use crate::store::Store;
use crate::users;

pub const MAX_DESCRIPTION_LEN: usize = 500;
pub const NO_REASON: &str = "No reason provided";
pub const INSTANT_VERIFICATION_METHOD: &str = "WhatsApp Video Call";
const DEFAULT_COUNTRY_CODE: &str = "91";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportEvent {
    Verify,
    Reject,
    Refuse,
    Assign,
    Resolve,
    Override(ReportStatus),
}

impl ReportEvent {
    fn describe(&self) -> String {
        match self {
            ReportEvent::Verify => "verified".to_string(),
            ReportEvent::Reject | ReportEvent::Refuse => "rejected".to_string(),
            ReportEvent::Assign => "in-progress".to_string(),
            ReportEvent::Resolve => "resolved".to_string(),
            ReportEvent::Override(target) => format!("{target} (override)"),
        }
    }
}

/// The report state machine. Overrides never produce verified, rejected or
/// resolved, and never leave the terminal states.
pub fn next_status(current: ReportStatus, event: ReportEvent) -> Option<ReportStatus> {
    use ReportStatus::{InProgress, Pending, Rejected, Resolved, Verified};

    match (current, event) {
        (Pending, ReportEvent::Verify) => Some(Verified),
        (Pending, ReportEvent::Reject) => Some(Rejected),
        (Verified | InProgress, ReportEvent::Refuse) => Some(Rejected),
        (Verified | InProgress, ReportEvent::Assign) => Some(InProgress),
        (InProgress, ReportEvent::Resolve) => Some(Resolved),
        (Verified | InProgress, ReportEvent::Override(target @ (Pending | InProgress)))
            if target != current =>
        {
            Some(target)
        }
        _ => None,
    }
}

pub fn transition(report: &Report, event: ReportEvent) -> Result<ReportStatus> {
    next_status(report.status, event).ok_or_else(|| AppError::InvalidTransition {
        from: report.status.to_string(),
        to: event.describe(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstantOutcome {
    Verify,
    Reject { reason: String },
}

pub fn submit<S: Store>(ctx: &mut Context<S>, input: NewReport) -> Result<Report> {
    ctx.settle(|ctx| {
        let citizen = ctx.require_role(Role::Citizen)?;

        let photo = input
            .photo
            .filter(|photo| !photo.trim().is_empty())
            .ok_or_else(|| AppError::Validation("please upload or capture a photo".to_string()))?;
        let location = input
            .location
            .ok_or_else(|| AppError::Validation("please provide a location".to_string()))?;
        validate_location(&location)?;
        let issue_type = input
            .issue_type
            .ok_or_else(|| AppError::Validation("issue type is required".to_string()))?;
        let description = input.description.trim();
        if description.is_empty() {
            return Err(AppError::Validation("description is required".to_string()));
        }

        let report = Report {
            id: Uuid::new_v4(),
            user_id: citizen.id,
            user_name: citizen.fullname.clone(),
            user_email: citizen.email.clone(),
            issue_type,
            description: description.chars().take(MAX_DESCRIPTION_LEN).collect(),
            photo,
            location,
            status: ReportStatus::Pending,
            instant_verification: input.instant_verification,
            created_at: Utc::now(),
            verified_at: None,
            verified_by: None,
            verification_method: None,
            instant_verification_completed: false,
            rejected_at: None,
            rejected_by: None,
            rejection_reason: None,
            assigned_at: None,
            assigned_volunteer_id: None,
            assigned_volunteer: None,
            resolved_at: None,
            completion_photo: None,
            completion_notes: None,
        };
        ctx.store.upsert_report(report.clone())?;

        tracing::info!(
            report_id = %report.id,
            user_id = %citizen.id,
            issue_type = ?report.issue_type,
            "Report submitted"
        );
        ctx.success("Report submitted successfully");
        Ok(report)
    })
}

fn validate_location(location: &Location) -> Result<()> {
    match location {
        Location::Coordinates {
            latitude,
            longitude,
        } => {
            if !(-90.0..=90.0).contains(latitude) || !(-180.0..=180.0).contains(longitude) {
                return Err(AppError::Validation(
                    "coordinates are out of range".to_string(),
                ));
            }
        }
        Location::Manual {
            address,
            city,
            postal_code,
        } => {
            if address.trim().is_empty() || city.trim().is_empty() || postal_code.trim().is_empty()
            {
                return Err(AppError::Validation(
                    "please fill in all location fields".to_string(),
                ));
            }
        }
    }
    Ok(())
}

pub fn verify<S: Store>(ctx: &mut Context<S>, report_id: Uuid) -> Result<Report> {
    ctx.settle(|ctx| {
        let moderator = ctx.require_role(Role::Moderator)?;
        let mut report = load(ctx, report_id)?;
        report.status = transition(&report, ReportEvent::Verify)?;
        report.verified_at = Some(Utc::now());
        report.verified_by = Some(moderator.fullname.clone());
        ctx.store.upsert_report(report.clone())?;

        tracing::info!(report_id = %report.id, moderator_id = %moderator.id, "Report verified");
        ctx.success("Report verified successfully. You can now assign a volunteer");
        Ok(report)
    })
}

/// The number a moderator calls before recording an instant verification outcome.
pub fn instant_verification_contact<S: Store>(
    ctx: &mut Context<S>,
    report_id: Uuid,
) -> Result<String> {
    ctx.settle(|ctx| {
        ctx.require_role(Role::Moderator)?;
        let report = load(ctx, report_id)?;
        let citizen = instant_verification_citizen(ctx, &report)?;
        Ok(dialing_number(&citizen.phone))
    })
}

pub fn instant_verify<S: Store>(
    ctx: &mut Context<S>,
    report_id: Uuid,
    outcome: InstantOutcome,
) -> Result<Report> {
    ctx.settle(|ctx| {
        let moderator = ctx.require_role(Role::Moderator)?;
        let mut report = load(ctx, report_id)?;
        instant_verification_citizen(ctx, &report)?;

        let now = Utc::now();
        match outcome {
            InstantOutcome::Verify => {
                report.status = transition(&report, ReportEvent::Verify)?;
                report.verified_at = Some(now);
                report.verified_by = Some(moderator.fullname.clone());
            }
            InstantOutcome::Reject { reason } => {
                let reason = reason.trim();
                if reason.is_empty() {
                    return Err(AppError::Policy(
                        "a reason is required to reject after instant verification".to_string(),
                    ));
                }
                report.status = transition(&report, ReportEvent::Reject)?;
                report.rejected_at = Some(now);
                report.rejected_by = Some(moderator.fullname.clone());
                report.rejection_reason = Some(reason.to_string());
            }
        }
        report.instant_verification_completed = true;
        report.verification_method = Some(INSTANT_VERIFICATION_METHOD.to_string());
        ctx.store.upsert_report(report.clone())?;

        tracing::info!(
            report_id = %report.id,
            status = %report.status,
            "Instant verification recorded"
        );
        if report.status == ReportStatus::Rejected {
            record_rejection(ctx, &report)?;
            ctx.success("Report rejected after instant verification");
        } else {
            ctx.success("Report verified successfully via instant verification");
        }
        Ok(report)
    })
}

fn instant_verification_citizen<S: Store>(ctx: &Context<S>, report: &Report) -> Result<User> {
    if !report.instant_verification {
        return Err(AppError::Policy(
            "the citizen did not request instant verification".to_string(),
        ));
    }
    match ctx.store.find_user(&report.user_email)? {
        Some(citizen) if citizen.has_phone() => Ok(citizen),
        _ => Err(AppError::Policy(
            "citizen phone number not available".to_string(),
        )),
    }
}

/// Digits only, with the default country code prepended when missing.
pub fn dialing_number(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.starts_with(DEFAULT_COUNTRY_CODE) {
        digits
    } else {
        format!("{DEFAULT_COUNTRY_CODE}{digits}")
    }
}

pub fn reject<S: Store>(
    ctx: &mut Context<S>,
    report_id: Uuid,
    reason: Option<&str>,
) -> Result<Report> {
    ctx.settle(|ctx| {
        let moderator = ctx.require_role(Role::Moderator)?;
        let mut report = load(ctx, report_id)?;
        report.status = transition(&report, ReportEvent::Reject)?;
        report.rejected_at = Some(Utc::now());
        report.rejected_by = Some(moderator.fullname.clone());
        report.rejection_reason = Some(
            reason
                .map(str::trim)
                .filter(|reason| !reason.is_empty())
                .unwrap_or(NO_REASON)
                .to_string(),
        );
        ctx.store.upsert_report(report.clone())?;

        tracing::info!(report_id = %report.id, moderator_id = %moderator.id, "Report rejected");
        record_rejection(ctx, &report)?;
        ctx.success("Report rejected");
        Ok(report)
    })
}

/// Rejects a verified or in-progress report, revoking any volunteer assignment.
pub fn refuse<S: Store>(
    ctx: &mut Context<S>,
    report_id: Uuid,
    reason: &str,
    confirmed: bool,
) -> Result<Report> {
    ctx.settle(|ctx| {
        let moderator = ctx.require_role(Role::Moderator)?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(AppError::Policy(
                "a reason is required to refuse a report".to_string(),
            ));
        }
        if !confirmed {
            return Err(AppError::Validation(
                "refusing a report must be confirmed".to_string(),
            ));
        }

        let mut report = load(ctx, report_id)?;
        report.status = transition(&report, ReportEvent::Refuse)?;
        report.rejected_at = Some(Utc::now());
        report.rejected_by = Some(moderator.fullname.clone());
        report.rejection_reason = Some(reason.to_string());
        report.assigned_volunteer_id = None;
        report.assigned_volunteer = None;
        ctx.store.upsert_report(report.clone())?;
        let removed = ctx.store.remove_tasks_for_report(report.id)?;

        tracing::info!(
            report_id = %report.id,
            moderator_id = %moderator.id,
            removed_tasks = removed,
            "Report refused"
        );
        record_rejection(ctx, &report)?;
        ctx.success("Report refused successfully");
        Ok(report)
    })
}

fn record_rejection<S: Store>(ctx: &mut Context<S>, report: &Report) -> Result<()> {
    let Some(citizen) = ctx.store.find_user(&report.user_email)? else {
        tracing::warn!(report_id = %report.id, "Rejected report has no matching citizen");
        return Ok(());
    };

    let count = citizen.rejection_count + 1;
    users::update_user(
        ctx,
        &citizen.email,
        UserPatch {
            rejection_count: Some(count),
            ..UserPatch::default()
        },
    )?;

    if count >= ctx.policy.rejection_warning_threshold {
        tracing::warn!(user_id = %citizen.id, rejection_count = count, "Citizen eligible for suspension");
        ctx.warning(format!(
            "Citizen \"{}\" now has {count} rejected reports and can be suspended",
            report.user_name
        ));
    }
    Ok(())
}

/// Status override. Resolution belongs to task completion and the
/// verification gate to verify/reject, so only pending and in-progress are
/// reachable, and never while a task is attached.
pub fn override_status<S: Store>(
    ctx: &mut Context<S>,
    report_id: Uuid,
    target: ReportStatus,
) -> Result<Report> {
    ctx.settle(|ctx| {
        ctx.require_role(Role::Moderator)?;
        let mut report = load(ctx, report_id)?;
        let status = transition(&report, ReportEvent::Override(target))?;
        if ctx.store.find_task_for_report(report.id)?.is_some() {
            return Err(AppError::Policy(
                "report has a volunteer task; refuse it or let the task complete".to_string(),
            ));
        }

        if status == ReportStatus::Pending {
            report.verified_at = None;
            report.verified_by = None;
            report.assigned_at = None;
            report.assigned_volunteer_id = None;
            report.assigned_volunteer = None;
        }
        report.status = status;
        ctx.store.upsert_report(report.clone())?;

        tracing::info!(report_id = %report.id, status = %report.status, "Report status overridden");
        ctx.success("Report status updated successfully");
        Ok(report)
    })
}

pub(crate) fn load<S: Store>(ctx: &Context<S>, report_id: Uuid) -> Result<Report> {
    ctx.store
        .find_report(report_id)?
        .ok_or_else(|| AppError::NotFound(format!("report {report_id}")))
}

/// Instant-verification requests still pending first, then newest first.
pub fn review_order(a: &Report, b: &Report) -> Ordering {
    b.awaits_instant_verification()
        .cmp(&a.awaits_instant_verification())
        .then_with(|| b.created_at.cmp(&a.created_at))
}

#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub status: Option<ReportStatus>,
    pub issue_type: Option<IssueType>,
    pub search: Option<String>,
}

impl ReportFilter {
    pub fn matches(&self, report: &Report) -> bool {
        let status_match = self.status.map_or(true, |status| report.status == status);
        let type_match = self
            .issue_type
            .map_or(true, |issue_type| report.issue_type == issue_type);
        let search_match = match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(term) => {
                let term = term.to_lowercase();
                report.user_name.to_lowercase().contains(&term)
                    || report.user_email.to_lowercase().contains(&term)
            }
        };
        status_match && type_match && search_match
    }
}

pub fn filter_reports<S: Store>(ctx: &Context<S>, filter: &ReportFilter) -> Result<Vec<Report>> {
    let mut reports: Vec<Report> = ctx
        .store
        .reports()?
        .into_iter()
        .filter(|report| filter.matches(report))
        .collect();
    reports.sort_by(review_order);
    Ok(reports)
}

pub fn reports_for_citizen<S: Store>(ctx: &Context<S>, user_id: Uuid) -> Result<Vec<Report>> {
    let mut reports: Vec<Report> = ctx
        .store
        .reports()?
        .into_iter()
        .filter(|report| report.user_id == user_id)
        .collect();
    reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(reports)
}

pub fn dashboard_stats<S: Store>(ctx: &Context<S>, reports: &[Report]) -> Result<DashboardStats> {
    Ok(DashboardStats {
        total_reports: reports.len(),
        pending_reports: reports
            .iter()
            .filter(|report| report.status == ReportStatus::Pending)
            .count(),
        resolved_reports: reports
            .iter()
            .filter(|report| report.status == ReportStatus::Resolved)
            .count(),
        total_citizens: users::users_by_role(ctx, Role::Citizen)?.len(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timing {
    Waiting(Duration),
    InProgressFor(Duration),
    ResolvedIn(Duration),
    /// Resolved but `resolved_at` was never stamped.
    MissingResolvedAt,
    Closed,
}

pub fn timing(report: &Report, now: DateTime<Utc>) -> Timing {
    match report.status {
        ReportStatus::Pending | ReportStatus::Verified => Timing::Waiting(now - report.created_at),
        ReportStatus::InProgress => Timing::InProgressFor(now - report.created_at),
        ReportStatus::Resolved => match report.resolved_at {
            Some(resolved_at) => Timing::ResolvedIn(resolved_at - report.created_at),
            None => Timing::MissingResolvedAt,
        },
        ReportStatus::Rejected => Timing::Closed,
    }
}

pub fn format_span(span: Duration) -> String {
    let days = span.num_days();
    let hours = span.num_hours() % 24;
    let hour_label = if hours == 1 { "hour" } else { "hours" };
    if days > 0 {
        let day_label = if days == 1 { "day" } else { "days" };
        format!("{days} {day_label} {hours} {hour_label}")
    } else {
        format!("{hours} {hour_label}")
    }
}

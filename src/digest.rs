use std::collections::HashMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::context::Context;
use crate::error::Result;
use crate::models::{
    DashboardStats, IssueType, PerformanceSummary, Report, ReportStatus, Role, User,
};
use crate::performance;
use crate::reports::{self, Timing};
use crate::store::Store;
use crate::{suspension, users};

pub struct IssueTypeSummary {
    pub issue_type: IssueType,
    pub count: usize,
    pub resolved: usize,
}

pub fn summarize_by_issue_type(reports: &[Report]) -> Vec<IssueTypeSummary> {
    let mut map: HashMap<IssueType, (usize, usize)> = HashMap::new();

    for report in reports {
        let entry = map.entry(report.issue_type).or_insert((0, 0));
        entry.0 += 1;
        if report.status == ReportStatus::Resolved {
            entry.1 += 1;
        }
    }

    let mut summaries: Vec<IssueTypeSummary> = map
        .into_iter()
        .map(|(issue_type, (count, resolved))| IssueTypeSummary {
            issue_type,
            count,
            resolved,
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.issue_type.label().cmp(b.issue_type.label()))
    });
    summaries
}

pub struct Digest<'a> {
    pub generated_at: DateTime<Utc>,
    pub stats: DashboardStats,
    pub reports: &'a [Report],
    pub volunteers: Vec<(User, PerformanceSummary)>,
    pub candidates: Vec<User>,
}

/// Volunteers with at least one performance report, highest warning first.
pub fn collect<'a, S: Store>(ctx: &Context<S>, reports: &'a [Report]) -> Result<Digest<'a>> {
    let log = ctx.store.performance_reports()?;
    let mut volunteers: Vec<(User, PerformanceSummary)> = users::users_by_role(ctx, Role::Volunteer)?
        .into_iter()
        .filter_map(|volunteer| {
            performance::summarize(&log, volunteer.id).map(|summary| (volunteer, summary))
        })
        .collect();
    volunteers.sort_by(|a, b| {
        b.1.warning_level
            .cmp(&a.1.warning_level)
            .then_with(|| a.0.fullname.cmp(&b.0.fullname))
    });

    Ok(Digest {
        generated_at: Utc::now(),
        stats: reports::dashboard_stats(ctx, reports)?,
        reports,
        volunteers,
        candidates: suspension::suspension_candidates(ctx)?,
    })
}

pub fn build_digest(digest: &Digest<'_>) -> String {
    let mut output = String::new();
    let stats = &digest.stats;

    let _ = writeln!(output, "# Waste Reporting Digest");
    let _ = writeln!(
        output,
        "Generated {}",
        digest.generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Overview");
    let _ = writeln!(output, "- Total reports: {}", stats.total_reports);
    let _ = writeln!(output, "- Pending review: {}", stats.pending_reports);
    let _ = writeln!(output, "- Resolved: {}", stats.resolved_reports);
    let _ = writeln!(output, "- Registered citizens: {}", stats.total_citizens);

    let _ = writeln!(output);
    let _ = writeln!(output, "## Issue Mix");
    let summaries = summarize_by_issue_type(digest.reports);
    if summaries.is_empty() {
        let _ = writeln!(output, "No reports filed yet.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} reports ({} resolved)",
                summary.issue_type.label(),
                summary.count,
                summary.resolved
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Resolution Times");
    let mut resolved = 0usize;
    let mut gaps = Vec::new();
    for report in digest.reports {
        match reports::timing(report, digest.generated_at) {
            Timing::ResolvedIn(span) => {
                resolved += 1;
                let _ = writeln!(
                    output,
                    "- {} at {}: resolved in {}",
                    report.issue_type.label(),
                    report.location,
                    reports::format_span(span)
                );
            }
            Timing::MissingResolvedAt => gaps.push(report),
            _ => {}
        }
    }
    if resolved == 0 {
        let _ = writeln!(output, "No resolved reports with a recorded resolution time.");
    }
    if !gaps.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "### Missing resolution timestamps");
        for report in gaps {
            let _ = writeln!(output, "- Report {} is resolved without resolvedAt", report.id);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Volunteer Performance");
    if digest.volunteers.is_empty() {
        let _ = writeln!(output, "No performance reports recorded.");
    } else {
        for (volunteer, summary) in digest.volunteers.iter() {
            let _ = writeln!(
                output,
                "- {} ({}): {} reports, avg rating {:.1}, {} negative, warning {}",
                volunteer.fullname,
                volunteer.email,
                summary.total_reports,
                summary.average_rating,
                summary.negative_reports,
                summary.warning_level
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Suspension Candidates");
    if digest.candidates.is_empty() {
        let _ = writeln!(output, "No citizens at the rejection threshold.");
    } else {
        for citizen in digest.candidates.iter() {
            let _ = writeln!(
                output,
                "- {} ({}) with {} rejected reports",
                citizen.fullname, citizen.email, citizen.rejection_count
            );
        }
    }

    output
}

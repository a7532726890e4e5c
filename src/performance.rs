use chrono::Utc;
use uuid::Uuid;

use crate::context::Context;
use crate::error::{AppError, Result};
use crate::models::{
    NewPerformanceReport, PerformanceReport, PerformanceReportType, PerformanceSummary, Role,
    TaskStatus, WarningLevel,
};
use crate::store::Store;

pub const MIN_DESCRIPTION_LEN: usize = 20;
pub const RECENT_REPORTS: usize = 5;

pub fn is_negative(report: &PerformanceReport) -> bool {
    report.performance_rating <= 2
}

pub fn is_positive(report_type: PerformanceReportType, rating: u8) -> bool {
    rating >= 4 || report_type == PerformanceReportType::PositivePerformance
}

/// First match wins: three or more negatives is high, two negatives or a
/// sub-3 average is medium, a single negative is low.
pub fn warning_level(negative_reports: usize, average_rating: f64) -> WarningLevel {
    if negative_reports >= 3 {
        WarningLevel::High
    } else if negative_reports == 2 || average_rating < 3.0 {
        WarningLevel::Medium
    } else if negative_reports == 1 {
        WarningLevel::Low
    } else {
        WarningLevel::None
    }
}

pub fn summarize(log: &[PerformanceReport], volunteer_id: Uuid) -> Option<PerformanceSummary> {
    let mut reports: Vec<&PerformanceReport> = log
        .iter()
        .filter(|report| report.volunteer_id == volunteer_id)
        .collect();
    if reports.is_empty() {
        return None;
    }
    reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let total_reports = reports.len();
    let positive_reports = reports.iter().filter(|report| report.is_positive).count();
    let negative_reports = reports.iter().filter(|report| is_negative(report)).count();
    let rating_sum: u32 = reports
        .iter()
        .map(|report| u32::from(report.performance_rating))
        .sum();
    let average_rating = rating_sum as f64 / total_reports as f64;

    Some(PerformanceSummary {
        total_reports,
        positive_reports,
        negative_reports,
        average_rating,
        recent_reports: reports
            .iter()
            .take(RECENT_REPORTS)
            .map(|report| (*report).clone())
            .collect(),
        warning_level: warning_level(negative_reports, average_rating),
    })
}

/// Appends a moderator's review of a completed task and returns the
/// volunteer's refreshed summary.
pub fn record_performance_report<S: Store>(
    ctx: &mut Context<S>,
    input: NewPerformanceReport,
) -> Result<(PerformanceReport, PerformanceSummary)> {
    ctx.settle(|ctx| {
        let moderator = ctx.require_role(Role::Moderator)?;

        let report_type = input
            .report_type
            .ok_or_else(|| AppError::Validation("please select a report type".to_string()))?;
        if !(1..=5).contains(&input.performance_rating) {
            return Err(AppError::Validation(
                "performance rating must be between 1 and 5".to_string(),
            ));
        }
        let description = input.description.trim();
        if description.chars().count() < MIN_DESCRIPTION_LEN {
            return Err(AppError::Validation(format!(
                "description must be at least {MIN_DESCRIPTION_LEN} characters"
            )));
        }
        if !input.confirmed {
            return Err(AppError::Validation(
                "performance report must be confirmed".to_string(),
            ));
        }

        let task = ctx
            .store
            .find_task(input.task_id)?
            .ok_or_else(|| AppError::NotFound(format!("task {}", input.task_id)))?;
        if task.status != TaskStatus::Completed {
            return Err(AppError::Policy(
                "only completed tasks can be reviewed".to_string(),
            ));
        }
        let waste_report = ctx
            .store
            .find_report(task.report_id)?
            .ok_or_else(|| AppError::NotFound(format!("report {}", task.report_id)))?;
        let volunteer = ctx
            .store
            .find_user_by_id(task.volunteer_id)?
            .ok_or_else(|| AppError::NotFound(format!("volunteer {}", task.volunteer_id)))?;

        let record = PerformanceReport {
            report_id: Uuid::new_v4(),
            task_id: task.id,
            waste_report_id: waste_report.id,
            volunteer_id: volunteer.id,
            volunteer_name: volunteer.fullname.clone(),
            volunteer_email: volunteer.email.clone(),
            report_type,
            performance_rating: input.performance_rating,
            description: description.to_string(),
            evidence_notes: input.evidence_notes.trim().to_string(),
            moderator_id: moderator.id,
            moderator_name: moderator.fullname.clone(),
            created_at: Utc::now(),
            is_positive: is_positive(report_type, input.performance_rating),
        };
        ctx.store.append_performance_report(record.clone())?;

        let log = ctx.store.performance_reports()?;
        let summary = summarize(&log, volunteer.id).ok_or_else(|| {
            AppError::NotFound(format!("performance log for volunteer {}", volunteer.id))
        })?;

        tracing::info!(
            volunteer_id = %volunteer.id,
            task_id = %task.id,
            rating = record.performance_rating,
            warning_level = %summary.warning_level,
            "Performance report recorded"
        );
        if summary.warning_level == WarningLevel::High {
            tracing::warn!(volunteer_id = %volunteer.id, "Volunteer performance warning is high");
        }
        ctx.success(format!(
            "Performance report submitted for {}",
            volunteer.fullname
        ));
        Ok((record, summary))
    })
}

pub fn performance_summary<S: Store>(
    ctx: &Context<S>,
    volunteer_id: Uuid,
) -> Result<Option<PerformanceSummary>> {
    Ok(summarize(&ctx.store.performance_reports()?, volunteer_id))
}

/// Every record for the volunteer, newest first.
pub fn performance_history<S: Store>(
    ctx: &Context<S>,
    volunteer_id: Uuid,
) -> Result<Vec<PerformanceReport>> {
    let mut history: Vec<PerformanceReport> = ctx
        .store
        .performance_reports()?
        .into_iter()
        .filter(|report| report.volunteer_id == volunteer_id)
        .collect();
    history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(history)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::fixtures::context;
    use crate::store::MemoryStore;
    use crate::tasks::{self, tests::verified_crew};
    use chrono::Duration;

    fn logged(volunteer_id: Uuid, rating: u8, minutes_ago: i64) -> PerformanceReport {
        let report_type = if rating >= 4 {
            PerformanceReportType::PositivePerformance
        } else {
            PerformanceReportType::QualityIssues
        };
        PerformanceReport {
            report_id: Uuid::new_v4(),
            task_id: Uuid::new_v4(),
            waste_report_id: Uuid::new_v4(),
            volunteer_id,
            volunteer_name: "Vic Okafor".to_string(),
            volunteer_email: "vic@example.com".to_string(),
            report_type,
            performance_rating: rating,
            description: "Left the site partially cleaned".to_string(),
            evidence_notes: String::new(),
            moderator_id: Uuid::new_v4(),
            moderator_name: "Morgan Reyes".to_string(),
            created_at: Utc::now() - Duration::minutes(minutes_ago),
            is_positive: is_positive(report_type, rating),
        }
    }

    fn review(task_id: Uuid, rating: u8) -> NewPerformanceReport {
        NewPerformanceReport {
            task_id,
            report_type: Some(PerformanceReportType::QualityIssues),
            performance_rating: rating,
            description: "Bags were left beside the bin overnight".to_string(),
            evidence_notes: "Photo from a neighbour".to_string(),
            confirmed: true,
        }
    }

    /// Runs a task through assignment and completion; the moderator is signed in afterwards.
    fn completed_task(ctx: &mut Context<MemoryStore>) -> (Uuid, Uuid) {
        let crew = verified_crew(ctx);
        let (_, task) = tasks::assign(ctx, crew.report.id, "vic@example.com").unwrap();
        ctx.begin_session(crew.volunteer.clone());
        tasks::start_task(ctx, task.id).unwrap();
        tasks::complete_task(ctx, task.id, Some("data:image/png;base64,CC".to_string()), "")
            .unwrap();
        ctx.begin_session(crew.moderator);
        (task.id, crew.volunteer.id)
    }

    #[test]
    fn warning_level_follows_precedence() {
        assert_eq!(warning_level(3, 4.0), WarningLevel::High);
        assert_eq!(warning_level(2, 4.5), WarningLevel::Medium);
        assert_eq!(warning_level(0, 2.5), WarningLevel::Medium);
        assert_eq!(warning_level(1, 2.0), WarningLevel::Medium);
        assert_eq!(warning_level(1, 3.5), WarningLevel::Low);
        assert_eq!(warning_level(0, 4.2), WarningLevel::None);
    }

    #[test]
    fn three_negatives_are_high_even_with_good_average() {
        let volunteer = Uuid::new_v4();
        let mut log: Vec<PerformanceReport> = (0..3).map(|i| logged(volunteer, 2, i)).collect();
        log.extend((3..9).map(|i| logged(volunteer, 5, i)));

        let summary = summarize(&log, volunteer).unwrap();
        assert_eq!(summary.total_reports, 9);
        assert_eq!(summary.negative_reports, 3);
        assert!((summary.average_rating - 4.0).abs() < f64::EPSILON);
        assert_eq!(summary.warning_level, WarningLevel::High);
    }

    #[test]
    fn summary_keeps_five_most_recent() {
        let volunteer = Uuid::new_v4();
        let mut log: Vec<PerformanceReport> = (0..7).map(|i| logged(volunteer, 4, i)).collect();
        log.push(logged(Uuid::new_v4(), 1, 0));
        log.reverse();

        let summary = summarize(&log, volunteer).unwrap();
        assert_eq!(summary.total_reports, 7);
        assert_eq!(summary.positive_reports, 7);
        assert_eq!(summary.recent_reports.len(), RECENT_REPORTS);
        assert!(summary
            .recent_reports
            .windows(2)
            .all(|pair| pair[0].created_at >= pair[1].created_at));
        assert_eq!(summary.warning_level, WarningLevel::None);
    }

    #[test]
    fn no_reports_means_no_summary() {
        assert!(summarize(&[], Uuid::new_v4()).is_none());
    }

    #[test]
    fn positive_flag_uses_rating_or_type() {
        assert!(is_positive(PerformanceReportType::PositivePerformance, 1));
        assert!(is_positive(PerformanceReportType::SafetyViolations, 4));
        assert!(!is_positive(PerformanceReportType::OtherIssues, 3));
    }

    #[test]
    fn record_validates_input() {
        let mut ctx = context();
        let (task_id, _) = completed_task(&mut ctx);

        let mut no_type = review(task_id, 3);
        no_type.report_type = None;
        let out_of_range = review(task_id, 6);
        let mut short = review(task_id, 3);
        short.description = "   too short     ".to_string();
        let mut unconfirmed = review(task_id, 3);
        unconfirmed.confirmed = false;

        for input in [no_type, out_of_range, short, unconfirmed] {
            assert!(matches!(
                record_performance_report(&mut ctx, input),
                Err(AppError::Validation(_))
            ));
        }
        assert!(ctx.store.performance_reports().unwrap().is_empty());
    }

    #[test]
    fn record_requires_completed_task() {
        let mut ctx = context();
        let crew = verified_crew(&mut ctx);
        let (_, task) = tasks::assign(&mut ctx, crew.report.id, "vic@example.com").unwrap();
        assert!(matches!(
            record_performance_report(&mut ctx, review(task.id, 3)),
            Err(AppError::Policy(_))
        ));
        assert!(matches!(
            record_performance_report(&mut ctx, review(Uuid::new_v4(), 3)),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn recorded_reports_drive_the_summary() {
        let mut ctx = context();
        let (task_id, volunteer_id) = completed_task(&mut ctx);

        let (record, summary) = record_performance_report(&mut ctx, review(task_id, 2)).unwrap();
        assert!(!record.is_positive);
        assert_eq!(record.volunteer_email, "vic@example.com");
        assert_eq!(record.moderator_name, "Morgan Reyes");
        assert_eq!(summary.negative_reports, 1);
        assert_eq!(summary.warning_level, WarningLevel::Medium);

        record_performance_report(&mut ctx, review(task_id, 5)).unwrap();
        let summary = performance_summary(&ctx, volunteer_id).unwrap().unwrap();
        assert_eq!(summary.total_reports, 2);
        assert_eq!(summary.warning_level, WarningLevel::Low);

        assert_eq!(performance_history(&ctx, volunteer_id).unwrap().len(), 2);
    }

    #[test]
    fn history_is_newest_first() {
        let mut ctx = context();
        let volunteer = Uuid::new_v4();
        for (rating, minutes_ago) in [(3, 30), (5, 5), (1, 60)] {
            ctx.store
                .append_performance_report(logged(volunteer, rating, minutes_ago))
                .unwrap();
        }
        ctx.store
            .append_performance_report(logged(Uuid::new_v4(), 4, 0))
            .unwrap();

        let ratings: Vec<u8> = performance_history(&ctx, volunteer)
            .unwrap()
            .iter()
            .map(|report| report.performance_rating)
            .collect();
        assert_eq!(ratings, vec![5, 3, 1]);
    }
}

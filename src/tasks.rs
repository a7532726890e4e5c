use chrono::Utc;
use uuid::Uuid;

use crate::context::Context;
use crate::error::{AppError, Result};
use crate::models::{IssueType, Report, Role, Task, TaskStats, TaskStatus, User};
use crate::reports::{self, ReportEvent};
use crate::store::Store;

impl TaskStatus {
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Assigned, TaskStatus::InProgress)
                | (TaskStatus::InProgress, TaskStatus::Completed)
        )
    }
}

/// Assigns (or reassigns) the volunteer for a verified or in-progress report.
/// A report carries at most one task; reassignment resets it to assigned.
pub fn assign<S: Store>(
    ctx: &mut Context<S>,
    report_id: Uuid,
    volunteer_email: &str,
) -> Result<(Report, Task)> {
    ctx.settle(|ctx| {
        ctx.require_role(Role::Moderator)?;
        let volunteer = find_volunteer(ctx, volunteer_email)?;
        let mut report = reports::load(ctx, report_id)?;
        let status = reports::transition(&report, ReportEvent::Assign)?;

        let now = Utc::now();
        let task = match ctx.store.find_task_for_report(report.id)? {
            Some(existing) => Task {
                volunteer_id: volunteer.id,
                volunteer_name: volunteer.fullname.clone(),
                status: TaskStatus::Assigned,
                assigned_at: now,
                started_at: None,
                ..existing
            },
            None => Task {
                id: Uuid::new_v4(),
                report_id: report.id,
                volunteer_id: volunteer.id,
                volunteer_name: volunteer.fullname.clone(),
                status: TaskStatus::Assigned,
                assigned_at: now,
                started_at: None,
                completed_at: None,
                completion_photo: None,
                completion_notes: None,
            },
        };

        report.status = status;
        report.assigned_at = Some(now);
        report.assigned_volunteer_id = Some(volunteer.id);
        report.assigned_volunteer = Some(volunteer.fullname.clone());

        ctx.store.upsert_task(task.clone())?;
        ctx.store.upsert_report(report.clone())?;

        tracing::info!(
            report_id = %report.id,
            task_id = %task.id,
            volunteer_id = %volunteer.id,
            "Volunteer assigned"
        );
        ctx.success(format!("Task assigned to {}", volunteer.fullname));
        Ok((report, task))
    })
}

fn find_volunteer<S: Store>(ctx: &Context<S>, email: &str) -> Result<User> {
    match ctx.store.find_user(email)? {
        Some(user) if user.role == Role::Volunteer => Ok(user),
        Some(_) => Err(AppError::Validation(format!("{email} is not a volunteer"))),
        None => Err(AppError::NotFound(format!("volunteer {email}"))),
    }
}

pub fn start_task<S: Store>(ctx: &mut Context<S>, task_id: Uuid) -> Result<Task> {
    ctx.settle(|ctx| {
        let volunteer = ctx.require_role(Role::Volunteer)?;
        let mut task = owned_task(ctx, task_id, &volunteer)?;
        advance(&mut task, TaskStatus::InProgress)?;
        task.started_at = Some(Utc::now());
        ctx.store.upsert_task(task.clone())?;

        tracing::info!(task_id = %task.id, volunteer_id = %volunteer.id, "Task started");
        ctx.success("Task started. Good luck!");
        Ok(task)
    })
}

/// Completes an in-progress task and resolves its report in the same step,
/// sharing one timestamp, photo and note between the two records.
pub fn complete_task<S: Store>(
    ctx: &mut Context<S>,
    task_id: Uuid,
    photo: Option<String>,
    notes: &str,
) -> Result<(Task, Report)> {
    ctx.settle(|ctx| {
        let volunteer = ctx.require_role(Role::Volunteer)?;
        let photo = photo
            .filter(|photo| !photo.trim().is_empty())
            .ok_or_else(|| {
                AppError::Policy("please upload a completion photo".to_string())
            })?;

        let mut task = owned_task(ctx, task_id, &volunteer)?;
        let mut report = reports::load(ctx, task.report_id)?;
        advance(&mut task, TaskStatus::Completed)?;
        report.status = reports::transition(&report, ReportEvent::Resolve)?;

        let now = Utc::now();
        let notes = notes.trim().to_string();
        task.completed_at = Some(now);
        task.completion_photo = Some(photo.clone());
        task.completion_notes = Some(notes.clone());
        report.resolved_at = Some(now);
        report.completion_photo = Some(photo);
        report.completion_notes = Some(notes);

        ctx.store.upsert_task(task.clone())?;
        ctx.store.upsert_report(report.clone())?;

        tracing::info!(
            task_id = %task.id,
            report_id = %report.id,
            volunteer_id = %volunteer.id,
            "Task completed"
        );
        ctx.success("Task completed successfully. Thank you for your service!");
        Ok((task, report))
    })
}

fn owned_task<S: Store>(ctx: &Context<S>, task_id: Uuid, volunteer: &User) -> Result<Task> {
    let task = ctx
        .store
        .find_task(task_id)?
        .ok_or_else(|| AppError::NotFound(format!("task {task_id}")))?;
    if task.volunteer_id != volunteer.id {
        return Err(AppError::Unauthorized(format!(
            "volunteer assigned to task {task_id}"
        )));
    }
    Ok(task)
}

fn advance(task: &mut Task, next: TaskStatus) -> Result<()> {
    if !task.status.can_transition_to(next) {
        return Err(AppError::InvalidTransition {
            from: task.status.to_string(),
            to: next.to_string(),
        });
    }
    task.status = next;
    Ok(())
}

/// Newest assignment first.
pub fn tasks_for_volunteer<S: Store>(ctx: &Context<S>, volunteer_id: Uuid) -> Result<Vec<Task>> {
    let mut tasks: Vec<Task> = ctx
        .store
        .tasks()?
        .into_iter()
        .filter(|task| task.volunteer_id == volunteer_id)
        .collect();
    tasks.sort_by(|a, b| b.assigned_at.cmp(&a.assigned_at));
    Ok(tasks)
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub issue_type: Option<IssueType>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task, report: &Report) -> bool {
        self.status.map_or(true, |status| task.status == status)
            && self
                .issue_type
                .map_or(true, |issue_type| report.issue_type == issue_type)
    }
}

/// A volunteer's tasks paired with their reports. Tasks whose report is
/// gone are left out.
pub fn filter_tasks<S: Store>(
    ctx: &Context<S>,
    volunteer_id: Uuid,
    filter: &TaskFilter,
) -> Result<Vec<(Task, Report)>> {
    let mut rows = Vec::new();
    for task in tasks_for_volunteer(ctx, volunteer_id)? {
        let Some(report) = ctx.store.find_report(task.report_id)? else {
            tracing::debug!(task_id = %task.id, "Task has no report on file");
            continue;
        };
        if filter.matches(&task, &report) {
            rows.push((task, report));
        }
    }
    Ok(rows)
}

pub fn task_stats(tasks: &[Task]) -> TaskStats {
    TaskStats {
        total_tasks: tasks.len(),
        active_tasks: tasks
            .iter()
            .filter(|task| task.status != TaskStatus::Completed)
            .count(),
        completed_tasks: tasks
            .iter()
            .filter(|task| task.status == TaskStatus::Completed)
            .count(),
    }
}

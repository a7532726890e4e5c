use chrono::{DateTime, Duration, Utc};

use crate::context::Context;
use crate::error::{AppError, Result};
use crate::models::{Role, User, UserPatch};
use crate::store::Store;
use crate::users;

pub const DEFAULT_SUSPENSION_REASON: &str = "Multiple report rejections";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuspensionCheck {
    Active,
    Expired,
    Blocked {
        until: DateTime<Utc>,
        days_remaining: i64,
    },
    Permanent,
}

pub fn evaluate(user: &User, now: DateTime<Utc>) -> SuspensionCheck {
    if !user.is_suspended {
        return SuspensionCheck::Active;
    }
    match user.suspended_until {
        Some(until) if now < until => SuspensionCheck::Blocked {
            until,
            days_remaining: days_remaining(until - now),
        },
        Some(_) => SuspensionCheck::Expired,
        None => SuspensionCheck::Permanent,
    }
}

/// Whole days left, rounded up.
pub fn days_remaining(remaining: Duration) -> i64 {
    let day = Duration::days(1).num_milliseconds();
    let millis = remaining.num_milliseconds();
    if millis <= 0 {
        return 0;
    }
    (millis + day - 1) / day
}

pub fn login<S: Store>(
    ctx: &mut Context<S>,
    email: &str,
    password: &str,
    role: Role,
) -> Result<User> {
    ctx.settle(|ctx| {
        let mut user =
            users::verify_login(ctx, email, password, role)?.ok_or(AppError::InvalidCredentials)?;

        if user.role == Role::Citizen {
            let reason = user
                .suspension_reason
                .clone()
                .unwrap_or_else(|| DEFAULT_SUSPENSION_REASON.to_string());
            match evaluate(&user, Utc::now()) {
                SuspensionCheck::Active => {}
                SuspensionCheck::Expired => {
                    user = users::update_user(ctx, &user.email, UserPatch::clear_suspension())?;
                    tracing::info!(user_id = %user.id, "Expired suspension lifted at login");
                }
                SuspensionCheck::Blocked {
                    until,
                    days_remaining,
                } => {
                    tracing::warn!(user_id = %user.id, %until, "Login blocked by suspension");
                    return Err(AppError::Suspended {
                        until,
                        days_remaining,
                        reason,
                    });
                }
                SuspensionCheck::Permanent => {
                    tracing::warn!(user_id = %user.id, "Login blocked by permanent suspension");
                    return Err(AppError::PermanentlySuspended { reason });
                }
            }
        }

        ctx.begin_session(user.clone());
        ctx.success(format!(
            "Welcome back, {}! Logged in as {}",
            user.fullname, user.role
        ));
        Ok(user)
    })
}

pub fn logout<S: Store>(ctx: &mut Context<S>) -> Option<User> {
    let user = ctx.end_session();
    if let Some(user) = &user {
        tracing::debug!(user_id = %user.id, "Session ended");
    }
    user
}

fn suspension_end(now: DateTime<Utc>, days: u32) -> Result<DateTime<Utc>> {
    Duration::try_days(i64::from(days))
        .and_then(|length| now.checked_add_signed(length))
        .ok_or_else(|| AppError::Validation("suspension length is out of range".to_string()))
}

/// Suspends an active citizen. `days == 0` is permanent.
pub fn suspend<S: Store>(
    ctx: &mut Context<S>,
    citizen_email: &str,
    days: u32,
    reason: &str,
) -> Result<User> {
    ctx.settle(|ctx| {
        let moderator = ctx.require_role(Role::Moderator)?;
        let citizen = find_citizen(ctx, citizen_email)?;
        if citizen.is_suspended {
            return Err(AppError::Policy(format!(
                "{} is already suspended; extend or lift the suspension instead",
                citizen.email
            )));
        }
        if reason.trim().is_empty() {
            return Err(AppError::Policy(
                "a reason is required to suspend an account".to_string(),
            ));
        }

        let until = match days {
            0 => None,
            days => Some(suspension_end(Utc::now(), days)?),
        };
        let updated = users::update_user(
            ctx,
            &citizen.email,
            UserPatch {
                is_suspended: Some(true),
                suspended_until: Some(until),
                suspended_by: Some(Some(moderator.fullname.clone())),
                suspension_reason: Some(Some(reason.trim().to_string())),
                ..UserPatch::default()
            },
        )?;

        tracing::info!(
            user_id = %updated.id,
            moderator_id = %moderator.id,
            days,
            "Citizen suspended"
        );
        match until {
            Some(until) => ctx.success(format!(
                "Account suspended for {days} day(s). Suspension ends {}",
                until.date_naive()
            )),
            None => ctx.success("Account permanently suspended"),
        }
        Ok(updated)
    })
}

/// Replaces the end date of a current suspension with now + `days`.
pub fn extend<S: Store>(
    ctx: &mut Context<S>,
    citizen_email: &str,
    days: u32,
    reason: Option<&str>,
) -> Result<User> {
    ctx.settle(|ctx| {
        let moderator = ctx.require_role(Role::Moderator)?;
        let citizen = find_citizen(ctx, citizen_email)?;
        if !citizen.is_suspended {
            return Err(AppError::Policy(format!(
                "{} is not suspended",
                citizen.email
            )));
        }
        if days < 1 {
            return Err(AppError::Validation(
                "extension must be at least one day".to_string(),
            ));
        }

        let reason = reason
            .map(str::trim)
            .filter(|reason| !reason.is_empty())
            .map(str::to_string)
            .or_else(|| citizen.suspension_reason.clone())
            .unwrap_or_else(|| DEFAULT_SUSPENSION_REASON.to_string());
        let until = suspension_end(Utc::now(), days)?;
        let updated = users::update_user(
            ctx,
            &citizen.email,
            UserPatch {
                is_suspended: Some(true),
                suspended_until: Some(Some(until)),
                suspended_by: Some(Some(moderator.fullname.clone())),
                suspension_reason: Some(Some(reason)),
                ..UserPatch::default()
            },
        )?;

        tracing::info!(user_id = %updated.id, days, "Suspension extended");
        ctx.success(format!(
            "Suspension extended by {days} day(s). New end date {}",
            until.date_naive()
        ));
        Ok(updated)
    })
}

pub fn lift<S: Store>(ctx: &mut Context<S>, citizen_email: &str) -> Result<User> {
    ctx.settle(|ctx| {
        ctx.require_role(Role::Moderator)?;
        let citizen = find_citizen(ctx, citizen_email)?;
        if !citizen.is_suspended {
            return Err(AppError::Policy(format!(
                "{} is not suspended",
                citizen.email
            )));
        }
        let updated = users::update_user(ctx, &citizen.email, UserPatch::clear_suspension())?;
        tracing::info!(user_id = %updated.id, "Suspension lifted");
        ctx.success("Suspension removed successfully");
        Ok(updated)
    })
}

/// Citizens at or above the warning threshold who are not suspended yet.
pub fn suspension_candidates<S: Store>(ctx: &Context<S>) -> Result<Vec<User>> {
    let threshold = ctx.policy.rejection_warning_threshold;
    Ok(ctx
        .store
        .users_by_role(Role::Citizen)?
        .into_iter()
        .filter(|user| user.rejection_count >= threshold && !user.is_suspended)
        .collect())
}

fn find_citizen<S: Store>(ctx: &Context<S>, email: &str) -> Result<User> {
    match ctx.store.find_user(email)? {
        Some(user) if user.role == Role::Citizen => Ok(user),
        Some(_) => Err(AppError::Validation(format!("{email} is not a citizen"))),
        None => Err(AppError::NotFound(format!("user {email}"))),
    }
}

use chrono::Utc;
use uuid::Uuid;

use crate::context::Context;
use crate::error::{AppError, Result};
use crate::models::{NewUser, PerformanceSummary, Role, User, UserPatch, WarningLevel};
use crate::performance;
use crate::store::Store;

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn add_user<S: Store>(ctx: &mut Context<S>, data: NewUser) -> Result<User> {
    ctx.settle(|ctx| {
        let fullname = data.fullname.trim().to_string();
        let email = data.email.trim().to_string();
        if fullname.is_empty() || email.is_empty() {
            return Err(AppError::Validation(
                "full name and email are required".to_string(),
            ));
        }
        validate_password(&data.password)?;
        if ctx.store.find_user(&email)?.is_some() {
            return Err(AppError::Conflict(email));
        }

        let user = User {
            id: Uuid::new_v4(),
            fullname,
            email,
            password: data.password,
            phone: data.phone.trim().to_string(),
            role: data.role,
            created_at: Utc::now(),
            rejection_count: 0,
            is_suspended: false,
            suspended_until: None,
            suspended_by: None,
            suspension_reason: None,
        };
        ctx.store.upsert_user(user.clone())?;

        tracing::info!(user_id = %user.id, role = %user.role, "User registered");
        ctx.success(format!("Account created for {} as {}", user.email, user.role));
        Ok(user)
    })
}

pub fn find_by_email<S: Store>(ctx: &Context<S>, email: &str) -> Result<Option<User>> {
    ctx.store.find_user(email)
}

/// Exact password and role match. Every mismatch looks the same to the caller.
pub fn verify_login<S: Store>(
    ctx: &Context<S>,
    email: &str,
    password: &str,
    role: Role,
) -> Result<Option<User>> {
    Ok(ctx
        .store
        .find_user(email)?
        .filter(|user| user.password == password && user.role == role))
}

pub fn update_user<S: Store>(ctx: &mut Context<S>, email: &str, patch: UserPatch) -> Result<User> {
    let mut user = ctx
        .store
        .find_user(email)?
        .ok_or_else(|| AppError::NotFound(format!("user {email}")))?;
    patch.apply(&mut user);
    ctx.store.upsert_user(user.clone())?;
    Ok(user)
}

pub fn delete_user<S: Store>(ctx: &mut Context<S>, email: &str) -> Result<bool> {
    ctx.settle(|ctx| {
        let removed = ctx.store.remove_user(email)?;
        if removed {
            tracing::info!(%email, "User deleted");
            ctx.success(format!("User {email} deleted"));
        } else {
            ctx.warning(format!("No account registered for {email}; nothing deleted"));
        }
        Ok(removed)
    })
}

pub fn users_by_role<S: Store>(ctx: &Context<S>, role: Role) -> Result<Vec<User>> {
    ctx.store.users_by_role(role)
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub search: Option<String>,
}

impl UserFilter {
    /// Search is a case-insensitive substring of the name or email.
    pub fn matches(&self, user: &User) -> bool {
        let role_match = self.role.map_or(true, |role| user.role == role);
        let search_match = match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(term) => {
                let term = term.to_lowercase();
                user.fullname.to_lowercase().contains(&term)
                    || user.email.to_lowercase().contains(&term)
            }
        };
        role_match && search_match
    }
}

/// One row of the moderator's account overview.
#[derive(Debug, Clone)]
pub struct UserListing {
    pub user: User,
    /// Citizen at the rejection threshold who is not suspended yet.
    pub action_required: bool,
    pub performance: Option<PerformanceSummary>,
}

impl UserListing {
    pub fn performance_warning(&self) -> bool {
        self.performance.as_ref().map_or(false, |summary| {
            matches!(
                summary.warning_level,
                WarningLevel::Medium | WarningLevel::High
            )
        })
    }
}

pub fn user_listings<S: Store>(ctx: &Context<S>, filter: &UserFilter) -> Result<Vec<UserListing>> {
    ctx.require_role(Role::Moderator)?;
    let threshold = ctx.policy.rejection_warning_threshold;
    let log = ctx.store.performance_reports()?;

    Ok(ctx
        .store
        .users()?
        .into_iter()
        .filter(|user| filter.matches(user))
        .map(|user| {
            let action_required = user.role == Role::Citizen
                && user.rejection_count >= threshold
                && !user.is_suspended;
            let performance = match user.role {
                Role::Volunteer => performance::summarize(&log, user.id),
                _ => None,
            };
            UserListing {
                user,
                action_required,
                performance,
            }
        })
        .collect())
}

pub fn update_profile<S: Store>(ctx: &mut Context<S>, fullname: &str, phone: &str) -> Result<User> {
    ctx.settle(|ctx| {
        let current = signed_in(ctx)?;
        if fullname.trim().is_empty() {
            return Err(AppError::Validation("full name is required".to_string()));
        }
        let updated = update_user(
            ctx,
            &current.email,
            UserPatch {
                fullname: Some(fullname.trim().to_string()),
                phone: Some(phone.trim().to_string()),
                ..UserPatch::default()
            },
        )?;
        ctx.begin_session(updated.clone());
        ctx.success("Profile updated successfully");
        Ok(updated)
    })
}

pub fn change_password<S: Store>(
    ctx: &mut Context<S>,
    current_password: &str,
    new_password: &str,
) -> Result<User> {
    ctx.settle(|ctx| {
        let current = signed_in(ctx)?;
        if current.password != current_password {
            return Err(AppError::Validation(
                "current password is incorrect".to_string(),
            ));
        }
        validate_password(new_password)?;
        let updated = update_user(
            ctx,
            &current.email,
            UserPatch {
                password: Some(new_password.to_string()),
                ..UserPatch::default()
            },
        )?;
        ctx.begin_session(updated.clone());
        ctx.success("Password updated successfully");
        Ok(updated)
    })
}

fn signed_in<S: Store>(ctx: &Context<S>) -> Result<User> {
    ctx.session()
        .cloned()
        .ok_or_else(|| AppError::Unauthorized("any role".to_string()))
}

fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::fixtures::{context, user};
    use crate::context::NoticeKind;
    use crate::models::{PerformanceReport, PerformanceReportType};

    fn performance_entry(volunteer_id: Uuid, rating: u8) -> PerformanceReport {
        PerformanceReport {
            report_id: Uuid::new_v4(),
            task_id: Uuid::new_v4(),
            waste_report_id: Uuid::new_v4(),
            volunteer_id,
            volunteer_name: "Kiara Patel".to_string(),
            volunteer_email: "sam@example.com".to_string(),
            report_type: PerformanceReportType::AttendanceIssues,
            performance_rating: rating,
            description: "Arrived two hours after the agreed slot".to_string(),
            evidence_notes: String::new(),
            moderator_id: Uuid::new_v4(),
            moderator_name: "Morgan Reyes".to_string(),
            created_at: Utc::now(),
            is_positive: false,
        }
    }

    fn signup(email: &str, role: Role) -> NewUser {
        NewUser {
            fullname: "Kiara Patel".to_string(),
            email: email.to_string(),
            password: "secret1".to_string(),
            phone: "555-0134".to_string(),
            role,
        }
    }

    #[test]
    fn add_user_sets_rejection_and_suspension_defaults() {
        let mut ctx = context();
        let user = add_user(&mut ctx, signup("kiara@example.com", Role::Citizen)).unwrap();
        assert_eq!(user.rejection_count, 0);
        assert!(!user.is_suspended);
        assert!(user.suspended_until.is_none());
        assert_eq!(ctx.notices()[0].kind, NoticeKind::Success);
    }

    #[test]
    fn duplicate_email_is_refused_case_insensitively() {
        let mut ctx = context();
        add_user(&mut ctx, signup("kiara@example.com", Role::Citizen)).unwrap();
        let err = add_user(&mut ctx, signup("KIARA@example.com", Role::Volunteer)).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(ctx.store.users().unwrap().len(), 1);
    }

    #[test]
    fn short_password_is_refused() {
        let mut ctx = context();
        let mut data = signup("kiara@example.com", Role::Citizen);
        data.password = "abc".to_string();
        assert!(matches!(
            add_user(&mut ctx, data),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn verify_login_requires_password_and_role() {
        let mut ctx = context();
        add_user(&mut ctx, signup("kiara@example.com", Role::Citizen)).unwrap();

        assert!(verify_login(&ctx, "Kiara@Example.com", "secret1", Role::Citizen)
            .unwrap()
            .is_some());
        assert!(verify_login(&ctx, "kiara@example.com", "wrong", Role::Citizen)
            .unwrap()
            .is_none());
        assert!(verify_login(&ctx, "kiara@example.com", "secret1", Role::Moderator)
            .unwrap()
            .is_none());
        assert!(verify_login(&ctx, "nobody@example.com", "secret1", Role::Citizen)
            .unwrap()
            .is_none());
    }

    #[test]
    fn update_user_reports_missing_email() {
        let mut ctx = context();
        let err = update_user(&mut ctx, "ghost@example.com", UserPatch::default()).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn update_user_merges_only_given_fields() {
        let mut ctx = context();
        add_user(&mut ctx, signup("kiara@example.com", Role::Citizen)).unwrap();
        let updated = update_user(
            &mut ctx,
            "kiara@example.com",
            UserPatch {
                phone: Some("555-9999".to_string()),
                ..UserPatch::default()
            },
        )
        .unwrap();
        assert_eq!(updated.phone, "555-9999");
        assert_eq!(updated.fullname, "Kiara Patel");
    }

    #[test]
    fn change_password_checks_current_password() {
        let mut ctx = context();
        let user = add_user(&mut ctx, signup("kiara@example.com", Role::Citizen)).unwrap();
        ctx.begin_session(user);

        assert!(change_password(&mut ctx, "wrong", "newsecret").is_err());
        assert!(change_password(&mut ctx, "secret1", "short").is_err());
        let updated = change_password(&mut ctx, "secret1", "newsecret").unwrap();
        assert_eq!(updated.password, "newsecret");
        assert_eq!(ctx.session().unwrap().password, "newsecret");
    }

    #[test]
    fn delete_user_removes_record() {
        let mut ctx = context();
        add_user(&mut ctx, signup("kiara@example.com", Role::Citizen)).unwrap();
        ctx.take_notices();
        assert!(delete_user(&mut ctx, "kiara@example.com").unwrap());
        assert!(find_by_email(&ctx, "kiara@example.com").unwrap().is_none());
        assert_eq!(ctx.take_notices()[0].kind, NoticeKind::Success);

        assert!(!delete_user(&mut ctx, "kiara@example.com").unwrap());
        let notices = ctx.take_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::Warning);
    }

    #[test]
    fn user_filter_matches_role_and_search() {
        let mut ctx = context();
        add_user(&mut ctx, signup("kiara@example.com", Role::Citizen)).unwrap();
        let mut volunteer = signup("sam@example.com", Role::Volunteer);
        volunteer.fullname = "Sam Ito".to_string();
        add_user(&mut ctx, volunteer).unwrap();
        ctx.begin_session(user("Morgan Reyes", "morgan@example.com", Role::Moderator));

        let by_role = UserFilter {
            role: Some(Role::Volunteer),
            ..UserFilter::default()
        };
        let listed = user_listings(&ctx, &by_role).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].user.email, "sam@example.com");

        let by_name = UserFilter {
            search: Some("PATEL".to_string()),
            ..UserFilter::default()
        };
        let listed = user_listings(&ctx, &by_name).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].user.fullname, "Kiara Patel");

        assert_eq!(user_listings(&ctx, &UserFilter::default()).unwrap().len(), 2);
    }

    #[test]
    fn user_listings_flag_citizens_needing_action() {
        let mut ctx = context();
        add_user(&mut ctx, signup("kiara@example.com", Role::Citizen)).unwrap();
        add_user(&mut ctx, signup("jules@example.com", Role::Citizen)).unwrap();
        for email in ["kiara@example.com", "jules@example.com"] {
            update_user(
                &mut ctx,
                email,
                UserPatch {
                    rejection_count: Some(5),
                    ..UserPatch::default()
                },
            )
            .unwrap();
        }
        update_user(
            &mut ctx,
            "jules@example.com",
            UserPatch {
                is_suspended: Some(true),
                ..UserPatch::default()
            },
        )
        .unwrap();
        ctx.begin_session(user("Morgan Reyes", "morgan@example.com", Role::Moderator));

        let listed = user_listings(&ctx, &UserFilter::default()).unwrap();
        let flagged: Vec<&str> = listed
            .iter()
            .filter(|listing| listing.action_required)
            .map(|listing| listing.user.email.as_str())
            .collect();
        assert_eq!(flagged, vec!["kiara@example.com"]);
    }

    #[test]
    fn user_listings_summarize_volunteer_performance() {
        let mut ctx = context();
        let volunteer = add_user(&mut ctx, signup("sam@example.com", Role::Volunteer)).unwrap();
        for rating in [2, 2] {
            ctx.store
                .append_performance_report(performance_entry(volunteer.id, rating))
                .unwrap();
        }
        ctx.begin_session(user("Morgan Reyes", "morgan@example.com", Role::Moderator));

        let listed = user_listings(&ctx, &UserFilter::default()).unwrap();
        let summary = listed[0].performance.as_ref().unwrap();
        assert_eq!(summary.total_reports, 2);
        assert_eq!(summary.warning_level, WarningLevel::Medium);
        assert!(listed[0].performance_warning());
    }

    #[test]
    fn user_listings_are_for_moderators() {
        let mut ctx = context();
        ctx.begin_session(user("Vic Okafor", "vic@example.com", Role::Volunteer));
        assert!(user_listings(&ctx, &UserFilter::default()).is_err());
    }
}

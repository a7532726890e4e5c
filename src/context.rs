use crate::error::{AppError, Result};
use crate::models::{Role, User};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Warning,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Rejection count at which moderators are warned that a citizen can be suspended.
    pub rejection_warning_threshold: u32,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            rejection_warning_threshold: 5,
        }
    }
}

/// Everything a core operation needs: the store, the signed-in user, the
/// policy thresholds, and the notices emitted so far.
pub struct Context<S: Store> {
    pub store: S,
    pub policy: Policy,
    session: Option<User>,
    notices: Vec<Notice>,
}

impl<S: Store> Context<S> {
    pub fn new(store: S, policy: Policy) -> Self {
        Self {
            store,
            policy,
            session: None,
            notices: Vec::new(),
        }
    }

    pub fn session(&self) -> Option<&User> {
        self.session.as_ref()
    }

    pub fn begin_session(&mut self, user: User) {
        self.session = Some(user);
    }

    pub fn end_session(&mut self) -> Option<User> {
        self.session.take()
    }

    pub fn require_role(&self, role: Role) -> Result<User> {
        match &self.session {
            Some(user) if user.role == role => Ok(user.clone()),
            _ => Err(AppError::Unauthorized(role.to_string())),
        }
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.push(NoticeKind::Success, message.into());
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.push(NoticeKind::Warning, message.into());
    }

    /// Runs one operation and reports a failure notice if it aborts.
    pub fn settle<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let result = op(self);
        if let Err(err) = &result {
            self.push(NoticeKind::Failure, err.to_string());
        }
        result
    }

    fn push(&mut self, kind: NoticeKind, message: String) {
        match kind {
            NoticeKind::Success => tracing::debug!(notice = %message, "Operation succeeded"),
            NoticeKind::Warning => tracing::warn!(notice = %message, "Operation warning"),
            NoticeKind::Failure => tracing::info!(notice = %message, "Operation aborted"),
        }
        self.notices.push(Notice { kind, message });
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::models::{IssueType, Location, NewReport};
    use crate::store::MemoryStore;

    pub fn context() -> Context<MemoryStore> {
        Context::new(MemoryStore::new(), Policy::default())
    }

    pub fn user(fullname: &str, email: &str, role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            fullname: fullname.to_string(),
            email: email.to_string(),
            password: "secret1".to_string(),
            phone: "555-0100".to_string(),
            role,
            created_at: Utc::now(),
            rejection_count: 0,
            is_suspended: false,
            suspended_until: None,
            suspended_by: None,
            suspension_reason: None,
        }
    }

    pub fn add(ctx: &mut Context<MemoryStore>, user: &User) {
        ctx.store.upsert_user(user.clone()).unwrap();
    }

    pub fn bin_report() -> NewReport {
        NewReport {
            issue_type: Some(IssueType::OverflowingBin),
            description: "Bin on the corner has been overflowing for days".to_string(),
            photo: Some("data:image/jpeg;base64,AAAA".to_string()),
            location: Some(Location::Coordinates {
                latitude: 40.7128,
                longitude: -74.006,
            }),
            instant_verification: false,
        }
    }
}

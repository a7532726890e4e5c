use chrono::{DateTime, Utc};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already registered: {0}")]
    Conflict(String),

    #[error("Not permitted: {0}")]
    Policy(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Login required as {0}")]
    Unauthorized(String),

    #[error("Account suspended until {until} ({days_remaining} day(s) remaining): {reason}")]
    Suspended {
        until: DateTime<Utc>,
        days_remaining: i64,
        reason: String,
    },

    #[error("Account permanently suspended: {reason}")]
    PermanentlySuspended { reason: String },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    /// Login mismatches, suspension blocks and role checks all abort without a session.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            AppError::InvalidCredentials
                | AppError::Unauthorized(_)
                | AppError::Suspended { .. }
                | AppError::PermanentlySuspended { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

use std::env;

use anyhow::Context as _;

use crate::context::Policy;

#[derive(Debug, Clone)]
pub struct Config {
    // Database configuration
    pub database_url: String,
    pub database_max_connections: u32,

    // Moderation policy
    pub rejection_warning_threshold: u32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Policy::default();

        Ok(Self {
            database_url: lookup("DATABASE_URL")
                .context("DATABASE_URL must be set to a production Postgres instance")?,
            database_max_connections: lookup("DATABASE_MAX_CONNECTIONS")
                .and_then(|value| value.parse().ok())
                .unwrap_or(5),
            rejection_warning_threshold: lookup("REJECTION_WARNING_THRESHOLD")
                .and_then(|value| value.parse().ok())
                .filter(|threshold| *threshold > 0)
                .unwrap_or(defaults.rejection_warning_threshold),
        })
    }

    pub fn policy(&self) -> Policy {
        Policy {
            rejection_warning_threshold: self.rejection_warning_threshold,
        }
    }
}

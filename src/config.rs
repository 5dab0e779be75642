use std::{env, net::SocketAddr, str::FromStr, time::Duration};

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub auth_user_header: String,
    /// Users registering with one of these addresses become administrators.
    pub admin_emails: Vec<String>,
    pub activity: ActivityConfig,
}

/// Tuning for the background activity-log worker.
#[derive(Debug, Clone)]
pub struct ActivityConfig {
    pub queue_capacity: usize,
    pub max_retries: u32,
    pub retry_base: Duration,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            max_retries: 3,
            retry_base: Duration::from_millis(100),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://trips.db?mode=rwc".to_string());
        let listen_addr: SocketAddr = parse_var("APP_LISTEN_ADDR", "127.0.0.1:3000")?;

        let auth_user_header = env::var("AUTH_USER_HEADER")
            .unwrap_or_else(|_| "x-user-id".to_string())
            .to_ascii_lowercase();

        let admin_emails = env::var("ADMIN_EMAILS")
            .unwrap_or_default()
            .split(',')
            .map(|email| email.trim().to_lowercase())
            .filter(|email| !email.is_empty())
            .collect();

        let activity = ActivityConfig {
            queue_capacity: parse_var("ACTIVITY_QUEUE_CAPACITY", "256")?,
            max_retries: parse_var("ACTIVITY_MAX_RETRIES", "3")?,
            retry_base: Duration::from_millis(parse_var("ACTIVITY_RETRY_BASE_MS", "100")?),
        };
        if activity.queue_capacity == 0 {
            return Err(AppError::Config(
                "ACTIVITY_QUEUE_CAPACITY must be at least 1".into(),
            ));
        }

        Ok(Self {
            database_url,
            listen_addr,
            auth_user_header,
            admin_emails,
            activity,
        })
    }
}

fn parse_var<T>(name: &str, default: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|err| AppError::Config(format!("invalid {name}: {err}")))
}

use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServiceConfig {
    pub name: String,
    pub version: String,
    pub bind_address: String,
    pub database_url: String,
    pub log_level: String,
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    pub otp_expiry_minutes: i64,
    pub otp_max_attempts: u32,
    pub smtp: SmtpConfig,
}

/// Mail relay settings. Consumed by the notification side, not by the
/// computation core; no value here changes declaration semantics.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

impl ServiceConfig {
    pub fn from_env(service_name: &str) -> anyhow::Result<Self> {
        let service_key = service_name.to_uppercase().replace("-", "_");

        Ok(Self {
            name: service_name.to_string(),
            version: env::var("SERVICE_VERSION").unwrap_or_else(|_| "1.0.0".to_string()),
            bind_address: env::var(format!("{}_SERVICE_BIND", service_key))
                .unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            database_url: env::var(format!("{}_DATABASE_URL", service_key))?,
            log_level: env::var("RUST_LOG")
                .unwrap_or_else(|_| "info".to_string()),
            jwt_secret: env::var("JWT_SECRET").unwrap_or_default(),
            jwt_expiry_hours: env::var("JWT_EXPIRY_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .unwrap_or(24),
            otp_expiry_minutes: env::var("OTP_EXPIRY_MINUTES")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            otp_max_attempts: env::var("OTP_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            smtp: SmtpConfig::from_env(),
        })
    }
}

impl SmtpConfig {
    fn from_env() -> Self {
        Self {
            host: env::var("SMTP_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: env::var("SMTP_PORT")
                .unwrap_or_else(|_| "587".to_string())
                .parse()
                .unwrap_or(587),
            username: env::var("SMTP_USERNAME").unwrap_or_default(),
            password: env::var("SMTP_PASSWORD").unwrap_or_default(),
            from_address: env::var("SMTP_FROM").unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .unwrap_or(20),
            min_connections: env::var("DB_MIN_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            connection_timeout: 30,
        }
    }
}

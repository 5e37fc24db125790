//! Process-wide settings.
//!
//! Read once from the environment (after `.env` is loaded) and shared as an
//! immutable `Arc<Settings>` for the lifetime of the process.

use crate::monitoring::{Bounds, CriticalPolicy, ThresholdTable};
use std::env;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

#[derive(Debug, Clone)]
pub struct SecuritySettings {
    pub jwt_secret: String,
}

#[derive(Debug, Clone)]
pub struct MailSettings {
    /// When absent, outgoing mail is logged instead of sent.
    pub sendgrid_api_key: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct MonitoringSettings {
    pub thresholds: ThresholdTable,
    pub critical: CriticalPolicy,
    pub low_stock_threshold: f64,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            thresholds: ThresholdTable::default(),
            critical: CriticalPolicy::default(),
            low_stock_threshold: 100.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    pub filter: String,
    pub json: bool,
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub server: ServerSettings,
    pub security: SecuritySettings,
    pub mail: MailSettings,
    pub monitoring: MonitoringSettings,
    pub telemetry: TelemetrySettings,
}

impl Settings {
    pub fn from_env() -> Result<Self, SettingsError> {
        let critical = CriticalPolicy {
            temperature: Bounds::between(
                parse_or("CRITICAL_TEMPERATURE_MIN", 10.0)?,
                parse_or("CRITICAL_TEMPERATURE_MAX", 32.0)?,
            ),
            humidity: Bounds::between(
                parse_or("CRITICAL_HUMIDITY_MIN", 30.0)?,
                parse_or("CRITICAL_HUMIDITY_MAX", 85.0)?,
            ),
            light: Bounds::at_least(parse_or("CRITICAL_LIGHT_MIN", 5.0)?),
        };

        Ok(Self {
            database_url: required("DATABASE_URL")?,
            server: ServerSettings {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
                port: parse_or("PORT", 3000)?,
                cors_origin: env::var("CORS_ORIGIN")
                    .unwrap_or_else(|_| "http://localhost:3000".into()),
            },
            security: SecuritySettings {
                jwt_secret: required("JWT_SECRET")?,
            },
            mail: MailSettings {
                sendgrid_api_key: env::var("SENDGRID_API_KEY").ok().filter(|k| !k.is_empty()),
                from: env::var("MAIL_FROM")
                    .unwrap_or_else(|_| "no-reply@poultry-farm.local".into()),
            },
            monitoring: MonitoringSettings {
                thresholds: ThresholdTable::default(),
                critical,
                low_stock_threshold: parse_or("LOW_STOCK_THRESHOLD", 100.0)?,
            },
            telemetry: TelemetrySettings {
                filter: env::var("RUST_LOG").unwrap_or_else(|_| {
                    "info,poultry_farm_server=info,sqlx=warn,sea_orm=warn".into()
                }),
                json: env::var("RUST_LOG_FORMAT").map(|f| f == "json").unwrap_or(false),
                otlp_endpoint: env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
            },
        })
    }

    /// Settings for tests and local tooling: no database url, fixed secret.
    pub fn for_secret(jwt_secret: impl Into<String>) -> Self {
        Self {
            database_url: String::new(),
            server: ServerSettings {
                host: "127.0.0.1".into(),
                port: 0,
                cors_origin: "http://localhost:3000".into(),
            },
            security: SecuritySettings {
                jwt_secret: jwt_secret.into(),
            },
            mail: MailSettings {
                sendgrid_api_key: None,
                from: "no-reply@poultry-farm.local".into(),
            },
            monitoring: MonitoringSettings::default(),
            telemetry: TelemetrySettings {
                filter: "info".into(),
                json: false,
                otlp_endpoint: None,
            },
        }
    }
}

fn required(name: &'static str) -> Result<String, SettingsError> {
    match env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(SettingsError::Missing(name)),
    }
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, SettingsError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| SettingsError::Invalid { name, value: raw }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment mutation is process-global, so every case lives in one test.
    #[test]
    fn from_env_reads_required_and_defaults() {
        env::remove_var("DATABASE_URL");
        env::set_var("JWT_SECRET", "s3cret");
        assert!(matches!(
            Settings::from_env(),
            Err(SettingsError::Missing("DATABASE_URL"))
        ));

        env::set_var("DATABASE_URL", "postgres://localhost/farm");
        env::remove_var("PORT");
        env::remove_var("LOW_STOCK_THRESHOLD");
        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.monitoring.low_stock_threshold, 100.0);
        assert_eq!(settings.monitoring.critical, CriticalPolicy::default());

        env::set_var("PORT", "not-a-port");
        assert!(matches!(
            Settings::from_env(),
            Err(SettingsError::Invalid { name: "PORT", .. })
        ));

        env::set_var("PORT", "8081");
        env::set_var("CRITICAL_TEMPERATURE_MAX", "35");
        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.server.port, 8081);
        assert_eq!(settings.monitoring.critical.temperature.max, Some(35.0));

        for name in ["PORT", "CRITICAL_TEMPERATURE_MAX", "DATABASE_URL", "JWT_SECRET"] {
            env::remove_var(name);
        }
    }
}

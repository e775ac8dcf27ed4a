use crate::domain::entities::{Priority, SlaPolicyTable, SlaTarget};
use crate::shared::utils::parse_duration;
use std::env;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub otel_exporter_endpoint: Option<String>,
    pub service_name: String,
    pub metrics_port: u16,
    pub escalation: EscalationConfig,
    pub notifier_webhook_url: Option<String>,
    pub sla_policy: SlaPolicyTable,
}

#[derive(Clone, Debug)]
pub struct EscalationConfig {
    pub sweep_interval: Duration,
    pub mark_horizon: Duration,
    pub mark_capacity: usize,
    pub max_matches_per_rule: i64,
    pub org_budget: Duration,
    pub notify_timeout: Duration,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(120),
            mark_horizon: Duration::from_secs(3600),
            mark_capacity: 10_000,
            max_matches_per_rule: 200,
            org_budget: Duration::from_secs(30),
            notify_timeout: Duration::from_secs(10),
        }
    }
}

fn duration_var(name: &'static str, default: &str) -> Result<Duration, ConfigError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    parse_duration(&raw).map_err(|reason| ConfigError::InvalidDuration { name, reason })
}

fn number_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value: raw }),
        Err(_) => Ok(default),
    }
}

/// `"<first response>,<resolution>"`, e.g. `"30m,8h"`.
pub fn parse_sla_target(raw: &str) -> Result<SlaTarget, String> {
    let (respond, resolve) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected '<respond>,<resolve>', got '{}'", raw))?;

    let to_chrono = |value: &str| -> Result<chrono::Duration, String> {
        let duration = parse_duration(value)?;
        chrono::Duration::from_std(duration).map_err(|e| e.to_string())
    };

    Ok(SlaTarget {
        first_response: to_chrono(respond)?,
        resolution: to_chrono(resolve)?,
    })
}

fn sla_policy_from_env() -> Result<SlaPolicyTable, ConfigError> {
    let mut table = SlaPolicyTable::default();

    for priority in Priority::ALL {
        let name = format!("SLA_POLICY_{}", priority.to_string().to_uppercase());
        if let Ok(raw) = env::var(&name) {
            let target = parse_sla_target(&raw).map_err(|reason| ConfigError::InvalidSlaPolicy {
                name: name.clone(),
                reason,
            })?;
            table = table.with_target(priority, target);
        }
    }

    table
        .validate()
        .map_err(|reason| ConfigError::InvalidSlaPolicy {
            name: "SLA_POLICY_*".to_string(),
            reason,
        })?;
    Ok(table)
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://livedesk.db?mode=rwc".to_string());

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let otel_exporter_endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok();

        let service_name = env::var("SERVICE_NAME").unwrap_or_else(|_| "livedesk".to_string());

        let metrics_port = env::var("METRICS_PORT")
            .unwrap_or_else(|_| "9000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let escalation = EscalationConfig {
            sweep_interval: duration_var("ESCALATION_SWEEP_INTERVAL", "2m")?,
            mark_horizon: duration_var("ESCALATION_MARK_HORIZON", "1h")?,
            mark_capacity: number_var("ESCALATION_MARK_CAPACITY", 10_000usize)?,
            max_matches_per_rule: number_var("ESCALATION_MAX_MATCHES_PER_RULE", 200i64)?,
            org_budget: duration_var("ESCALATION_ORG_BUDGET", "30s")?,
            notify_timeout: duration_var("NOTIFY_TIMEOUT", "10s")?,
        };

        let notifier_webhook_url = env::var("NOTIFIER_WEBHOOK_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let sla_policy = sla_policy_from_env()?;

        Ok(Config {
            database_url,
            server_host,
            server_port,
            otel_exporter_endpoint,
            service_name,
            metrics_port,
            escalation,
            notifier_webhook_url,
            sla_policy,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid duration for {name}: {reason}")]
    InvalidDuration { name: &'static str, reason: String },

    #[error("Invalid number for {name}: '{value}'")]
    InvalidNumber { name: &'static str, value: String },

    #[error("Invalid SLA policy {name}: {reason}")]
    InvalidSlaPolicy { name: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sla_target() {
        let target = parse_sla_target("30m,8h").unwrap();
        assert_eq!(target.first_response, chrono::Duration::minutes(30));
        assert_eq!(target.resolution, chrono::Duration::hours(8));
    }

    #[test]
    fn test_parse_sla_target_rejects_single_value() {
        assert!(parse_sla_target("30m").is_err());
        assert!(parse_sla_target("30m,soon").is_err());
    }

    #[test]
    fn test_escalation_defaults() {
        let defaults = EscalationConfig::default();
        assert_eq!(defaults.sweep_interval, Duration::from_secs(120));
        assert_eq!(defaults.mark_horizon, Duration::from_secs(3600));
        assert_eq!(defaults.max_matches_per_rule, 200);
    }
}

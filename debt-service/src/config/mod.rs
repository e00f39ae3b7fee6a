//! Configuration module for debt-service.

use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct DebtConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub settlement: SettlementConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// Upper bound on how long a settlement waits for invoice row locks.
    pub lock_timeout_ms: u64,
}

#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Roles allowed to record payments.
    pub settlement_roles: Vec<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"[REDACTED]")
            .field("settlement_roles", &self.settlement_roles)
            .finish()
    }
}

/// Parse a comma separated role list, dropping blanks.
pub fn parse_roles(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|r| r.trim())
        .filter(|r| !r.is_empty())
        .map(|r| r.to_string())
        .collect()
}

/// Parse `DEBT_LOCK_TIMEOUT_MS`. Zero is rejected: PostgreSQL reads a zero
/// `lock_timeout` as "wait forever".
pub fn parse_lock_timeout_ms(raw: Option<&str>) -> Result<u64, AppError> {
    match raw {
        None => Ok(DEFAULT_LOCK_TIMEOUT_MS),
        Some(value) => match value.trim().parse::<u64>() {
            Ok(0) => Err(AppError::ConfigError(anyhow::anyhow!(
                "DEBT_LOCK_TIMEOUT_MS must be greater than zero"
            ))),
            Ok(ms) => Ok(ms),
            Err(e) => Err(AppError::ConfigError(anyhow::anyhow!(
                "Invalid DEBT_LOCK_TIMEOUT_MS '{}': {}",
                value,
                e
            ))),
        },
    }
}

impl DebtConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "debt-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            },
            settlement: SettlementConfig {
                lock_timeout_ms: parse_lock_timeout_ms(
                    env::var("DEBT_LOCK_TIMEOUT_MS").ok().as_deref(),
                )?,
            },
            auth: AuthConfig {
                jwt_secret: env::var("JWT_SECRET").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("JWT_SECRET is required"))
                })?,
                settlement_roles: parse_roles(
                    &env::var("DEBT_SETTLEMENT_ROLES")
                        .unwrap_or_else(|_| "admin,accountant".to_string()),
                ),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roles_trims_and_skips_blanks() {
        assert_eq!(
            parse_roles(" admin, accountant ,,cashier "),
            vec!["admin", "accountant", "cashier"]
        );
        assert!(parse_roles("").is_empty());
    }

    #[test]
    fn test_lock_timeout_defaults_when_unset() {
        assert_eq!(parse_lock_timeout_ms(None).unwrap(), DEFAULT_LOCK_TIMEOUT_MS);
        assert_eq!(parse_lock_timeout_ms(Some(" 250 ")).unwrap(), 250);
    }

    #[test]
    fn test_zero_or_invalid_lock_timeout_is_rejected() {
        for raw in ["0", "-5", "soon"] {
            assert!(
                matches!(parse_lock_timeout_ms(Some(raw)), Err(AppError::ConfigError(_))),
                "value: {}",
                raw
            );
        }
    }
}

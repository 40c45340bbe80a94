use serde::Deserialize;
use std::env;

use crate::constants::{BPS_DENOM, DEFAULT_PLATFORM_FEE_BPS, STATUS_SYNC_INTERVAL_SECS};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,
    pub environment: String,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,

    // Admin access
    pub admin_manual_key: Option<String>,
    pub admin_addresses: Vec<String>,

    // Economics
    pub platform_fee_bps: u32,

    // Background jobs
    pub status_sync_interval_secs: u64,
    pub enable_auto_settlement: bool,

    // CORS
    pub cors_allowed_origins: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        Ok(Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),

            database_url: env::var("DATABASE_URL")?,
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()?,

            admin_manual_key: env::var("ADMIN_MANUAL_KEY").ok(),
            admin_addresses: parse_address_list(
                &env::var("ADMIN_ADDRESSES").unwrap_or_default(),
            ),

            platform_fee_bps: env::var("PLATFORM_FEE_BPS")
                .unwrap_or_else(|_| DEFAULT_PLATFORM_FEE_BPS.to_string())
                .parse()?,

            status_sync_interval_secs: env::var("STATUS_SYNC_INTERVAL_SECS")
                .unwrap_or_else(|_| STATUS_SYNC_INTERVAL_SECS.to_string())
                .parse()?,
            enable_auto_settlement: env::var("ENABLE_AUTO_SETTLEMENT")
                .map(|v| is_truthy(&v))
                .unwrap_or(false),

            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| "*".to_string()),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.database_url.trim().is_empty() {
            anyhow::bail!("DATABASE_URL is empty");
        }
        if self.platform_fee_bps > BPS_DENOM {
            anyhow::bail!(
                "PLATFORM_FEE_BPS must be at most {} (got {})",
                BPS_DENOM,
                self.platform_fee_bps
            );
        }
        if self.status_sync_interval_secs == 0 {
            anyhow::bail!("STATUS_SYNC_INTERVAL_SECS must be > 0");
        }

        let admin_key_missing = self
            .admin_manual_key
            .as_deref()
            .map(str::trim)
            .map_or(true, str::is_empty);
        if admin_key_missing {
            tracing::warn!("ADMIN_MANUAL_KEY is not set; admin endpoints are disabled");
        }
        if self.admin_addresses.is_empty() {
            tracing::warn!("ADMIN_ADDRESSES is empty; admin endpoints are disabled");
        }

        if self.cors_allowed_origins.trim().is_empty() {
            tracing::warn!("CORS_ALLOWED_ORIGINS is empty; requests may be blocked");
        }

        Ok(())
    }

    pub fn is_admin_address(&self, address: &str) -> bool {
        let candidate = address.trim().to_ascii_lowercase();
        self.admin_addresses.iter().any(|a| *a == candidate)
    }
}

fn parse_address_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn is_truthy(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    normalized == "1" || normalized == "true" || normalized == "yes" || normalized == "on"
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        host: "0.0.0.0".to_string(),
        port: 3000,
        environment: "development".to_string(),
        database_url: "postgres://localhost/cfl_test".to_string(),
        database_max_connections: 1,
        admin_manual_key: Some("test_admin_key".to_string()),
        admin_addresses: vec!["0x00000000000000000000000000000000000000aa".to_string()],
        platform_fee_bps: DEFAULT_PLATFORM_FEE_BPS,
        status_sync_interval_secs: STATUS_SYNC_INTERVAL_SECS,
        enable_auto_settlement: false,
        cors_allowed_origins: "*".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_list_is_trimmed_and_lowercased() {
        let list = parse_address_list(" 0xABC , ,0xdef,");
        assert_eq!(list, vec!["0xabc".to_string(), "0xdef".to_string()]);
    }

    #[test]
    fn admin_lookup_ignores_case() {
        let config = test_config();
        assert!(config.is_admin_address("0x00000000000000000000000000000000000000AA"));
        assert!(!config.is_admin_address("0x00000000000000000000000000000000000000bb"));
    }

    #[test]
    fn validate_rejects_fee_above_denominator() {
        let mut config = test_config();
        config.platform_fee_bps = BPS_DENOM + 1;
        assert!(config.validate().is_err());

        config.platform_fee_bps = BPS_DENOM;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_sync_interval() {
        let mut config = test_config();
        config.status_sync_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn truthy_flags() {
        assert!(is_truthy(" YES "));
        assert!(is_truthy("1"));
        assert!(!is_truthy("off"));
    }
}

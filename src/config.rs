//! Configuration management for the swap coordinator
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::monitor::RetryPolicy;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub coordinator: SchedulerConfig,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    pub order_book: OrderBookConfig,
    pub wallet: WalletConfig,
    pub chains: HashMap<String, ChainConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    pub poll_interval_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub max_consecutive_poll_failures: u32,
    pub default_order_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrderBookConfig {
    pub base_url: String,
    pub api_version: String,
    pub api_key: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// Maker address orders are signed for
    pub signer_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_url: String,
    pub enabled: bool,
}

/// Explicit configuration handed to the coordinator at construction
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub api_key: String,
    pub wallet_signer: String,
    pub chain_endpoints: HashMap<u64, String>,
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
    pub max_consecutive_poll_failures: u32,
    pub default_order_ttl: Duration,
}

impl CoordinatorConfig {
    pub fn supports_chain(&self, chain_id: u64) -> bool {
        self.chain_endpoints.contains_key(&chain_id)
    }
}

impl Settings {
    /// Load settings from configuration files
    pub fn load() -> Result<Self> {
        let config_path = env::var("SWAP_COORDINATOR_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::from_toml(&config_str)
    }

    /// Parse settings from TOML text after `${VAR}` substitution
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config_str = substitute_env_vars(raw);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.enabled_chains().len() < 2 {
            anyhow::bail!("At least two chains must be enabled for cross-chain swaps");
        }

        for (name, chain) in &self.chains {
            if chain.enabled && chain.rpc_url.is_empty() {
                anyhow::bail!("Chain {} has no RPC URL configured", name);
            }
        }

        if self.order_book.api_key.is_empty() {
            anyhow::bail!("order_book.api_key must be set");
        }

        if self.coordinator.poll_interval_ms == 0 {
            anyhow::bail!("coordinator.poll_interval_ms must be positive");
        }

        if self.coordinator.max_retries == 0 {
            anyhow::bail!("coordinator.max_retries must be at least 1");
        }

        if self.wallet.signer_address.is_empty() {
            tracing::warn!("No wallet signer configured - orders will carry an empty maker");
        }

        Ok(())
    }

    /// Get list of enabled chains
    pub fn enabled_chains(&self) -> Vec<(&String, &ChainConfig)> {
        self.chains.iter().filter(|(_, c)| c.enabled).collect()
    }

    /// Get chain config by chain ID
    pub fn get_chain_by_id(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.values().find(|c| c.chain_id == chain_id)
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            api_key: self.order_book.api_key.clone(),
            wallet_signer: self.wallet.signer_address.clone(),
            chain_endpoints: self
                .enabled_chains()
                .into_iter()
                .map(|(_, c)| (c.chain_id, c.rpc_url.clone()))
                .collect(),
            poll_interval: Duration::from_millis(self.coordinator.poll_interval_ms),
            retry: RetryPolicy {
                max_attempts: self.coordinator.max_retries,
                base_delay: Duration::from_millis(self.coordinator.retry_delay_ms),
                max_delay: Duration::from_millis(self.coordinator.max_retry_delay_ms),
            },
            max_consecutive_poll_failures: self.coordinator.max_consecutive_poll_failures,
            default_order_ttl: Duration::from_secs(self.coordinator.default_order_ttl_secs),
        }
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

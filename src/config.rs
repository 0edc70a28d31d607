use crate::domain::transaction::ProviderKind;
use crate::error::{GatewayError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Top-level gateway configuration, usually read from `gateways.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GatewayConfig {
    /// Base used to resolve relative callback URLs.
    pub base_url: String,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TransportConfig {
    #[serde(default = "default_true")]
    pub verify_tls: bool,
    pub timeout_secs: Option<u64>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            verify_tls: true,
            timeout_secs: None,
        }
    }
}

impl TransportConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    #[default]
    Soap,
    Http,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ProviderConfig {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub order: u32,
    pub name: String,
    pub callback_url: String,
    /// Overrides `transport.verify_tls` for legacy providers.
    pub verify_tls: Option<bool>,
    pub api_type: Option<ApiType>,
    #[serde(default)]
    pub credentials: BTreeMap<String, String>,
}

impl ProviderConfig {
    pub fn credential(&self, key: &str) -> Result<&str> {
        self.credentials
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| {
                GatewayError::Configuration(format!("missing credential [{key}] for [{}]", self.name))
            })
    }

    pub fn credential_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.credentials.get(key).map(String::as_str).unwrap_or(default)
    }
}

/// A selectable driver for UI listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverEntry {
    pub key: String,
    pub name: String,
}

impl GatewayConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| GatewayError::Configuration(format!("invalid gateway config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        url::Url::parse(&self.base_url)
            .map_err(|e| GatewayError::Configuration(format!("invalid base_url: {e}")))?;
        for key in self.providers.keys() {
            ProviderKind::from_str(key)?;
        }
        Ok(())
    }

    /// Configuration entries paired with their provider kind.
    pub fn configured(&self) -> impl Iterator<Item = (ProviderKind, &ProviderConfig)> {
        self.providers
            .iter()
            .filter_map(|(key, config)| ProviderKind::from_str(key).ok().map(|kind| (kind, config)))
    }

    pub fn provider(&self, kind: ProviderKind) -> Option<&ProviderConfig> {
        self.configured()
            .find(|(candidate, _)| *candidate == kind)
            .map(|(_, config)| config)
    }

    pub fn verify_tls_for(&self, provider: &ProviderConfig) -> bool {
        provider.verify_tls.unwrap_or(self.transport.verify_tls)
    }

    /// Active providers ordered by their configured `order`.
    pub fn active_drivers(&self) -> Vec<DriverEntry> {
        let mut active: Vec<(u32, DriverEntry)> = self
            .providers
            .iter()
            .filter(|(_, config)| config.active)
            .map(|(key, config)| {
                (
                    config.order,
                    DriverEntry {
                        key: key.clone(),
                        name: config.name.clone(),
                    },
                )
            })
            .collect();
        active.sort_by_key(|(order, _)| *order);
        active.into_iter().map(|(_, entry)| entry).collect()
    }
}

fn default_true() -> bool {
    true
}

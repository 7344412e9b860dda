use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ProviderError, ProviderResult};

pub const ENDPOINT_ENV: &str = "TMC_ENDPOINT";
pub const VMW_CLOUD_ENDPOINT_ENV: &str = "VMW_CLOUD_ENDPOINT";
pub const VMW_CLOUD_API_TOKEN_ENV: &str = "VMW_CLOUD_API_TOKEN";

const DEFAULT_VMW_CLOUD_ENDPOINT: &str = "console.cloud.vmware.com";

fn default_vmw_cloud_endpoint() -> String {
    DEFAULT_VMW_CLOUD_ENDPOINT.to_string()
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_poll_timeout_secs() -> u64 {
    1800
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProviderConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_vmw_cloud_endpoint")]
    pub vmw_cloud_endpoint: String,
    #[serde(default)]
    pub vmw_cloud_api_token: String,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            endpoint: String::new(),
            vmw_cloud_endpoint: default_vmw_cloud_endpoint(),
            vmw_cloud_api_token: String::new(),
            poll_interval_secs: default_poll_interval_secs(),
            poll_timeout_secs: default_poll_timeout_secs(),
        }
    }
}

/// How long and how often to wait on remote reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        PollSettings {
            interval: Duration::from_secs(default_poll_interval_secs()),
            timeout: Duration::from_secs(default_poll_timeout_secs()),
        }
    }
}

impl ProviderConfig {
    pub fn from_file(path: &str) -> ProviderResult<Self> {
        let file = std::fs::File::open(path).map_err(ProviderError::Io)?;
        let config = serde_yaml::from_reader(file).map_err(ProviderError::Serialization)?;
        Ok(config)
    }

    /// File settings (if any) overridden by the provider's environment variables.
    pub fn load(path: Option<&str>) -> ProviderResult<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup(ENDPOINT_ENV).filter(|v| !v.is_empty()) {
            self.endpoint = v;
        }
        if let Some(v) = lookup(VMW_CLOUD_ENDPOINT_ENV).filter(|v| !v.is_empty()) {
            self.vmw_cloud_endpoint = v;
        }
        if let Some(v) = lookup(VMW_CLOUD_API_TOKEN_ENV).filter(|v| !v.is_empty()) {
            self.vmw_cloud_api_token = v;
        }
    }

    pub fn validate(&self) -> ProviderResult<()> {
        if self.endpoint.trim().is_empty() {
            return Err(ProviderError::Config(format!(
                "endpoint is required (set it in the config file or {})",
                ENDPOINT_ENV
            )));
        }
        if self.vmw_cloud_api_token.trim().is_empty() {
            return Err(ProviderError::Config(format!(
                "vmw_cloud_api_token is required (set it in the config file or {})",
                VMW_CLOUD_API_TOKEN_ENV
            )));
        }
        if self.poll_interval_secs == 0 {
            return Err(ProviderError::Config("poll_interval_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn endpoint_url(&self) -> String {
        with_scheme(&self.endpoint)
    }

    pub fn vmw_cloud_url(&self) -> String {
        with_scheme(&self.vmw_cloud_endpoint)
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(self.poll_interval_secs),
            timeout: Duration::from_secs(self.poll_timeout_secs),
        }
    }
}

fn with_scheme(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    }
}

//! AWS provider configuration

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Region in which S3 buckets are created without a location constraint
pub const DEFAULT_REGION: &str = "us-east-1";

/// Environment variable overriding the poll interval, in milliseconds
pub const POLL_INTERVAL_ENV: &str = "STRATUS_POLL_INTERVAL_MS";

const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Time budgets of the waits and retries performed by the handlers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Wait for a gateway attachment to become available
    pub attach_secs: u64,

    /// Wait for a gateway attachment to go away
    pub detach_secs: u64,

    /// Retry budget for deletions blocked by dependents
    pub delete_secs: u64,

    /// Retry budget for reading back a freshly created object
    pub create_read_secs: u64,

    /// Time after which an attachment probe reports the expected state
    pub attach_grace_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            attach_secs: 60,
            detach_secs: 60,
            delete_secs: 300,
            create_read_secs: 30,
            attach_grace_secs: 10,
        }
    }
}

impl Timeouts {
    pub fn attach(&self) -> Duration {
        Duration::from_secs(self.attach_secs)
    }

    pub fn detach(&self) -> Duration {
        Duration::from_secs(self.detach_secs)
    }

    pub fn delete(&self) -> Duration {
        Duration::from_secs(self.delete_secs)
    }

    pub fn create_read(&self) -> Duration {
        Duration::from_secs(self.create_read_secs)
    }

    pub fn attach_grace(&self) -> Duration {
        Duration::from_secs(self.attach_grace_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwsConfig {
    pub region: String,
    pub poll_interval_ms: u64,
    pub timeouts: Timeouts,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            timeouts: Timeouts::default(),
        }
    }
}

impl AwsConfig {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            ..Default::default()
        }
    }

    /// Create AwsConfig from environment variables
    ///
    /// The region comes from `AWS_REGION`, then `AWS_DEFAULT_REGION`, then
    /// [`DEFAULT_REGION`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(region) = ["AWS_REGION", "AWS_DEFAULT_REGION"]
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        {
            config.region = region;
        }

        if let Ok(value) = std::env::var(POLL_INTERVAL_ENV) {
            config.poll_interval_ms = value.parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidEnv {
                    var: POLL_INTERVAL_ENV,
                    value: value.clone(),
                    reason: e.to_string(),
                }
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region.trim().is_empty() {
            return Err(ConfigError::InvalidSetting {
                field: "region",
                reason: "must not be empty".to_string(),
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidSetting {
                field: "poll_interval_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// S3 location constraint for buckets created in this region
    pub fn location_constraint(&self) -> Option<String> {
        (self.region != DEFAULT_REGION).then(|| self.region.clone())
    }
}

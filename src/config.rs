//! Configuration for the sensor agent.

use anyhow::Result;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub sensor: SensorConfig,
    pub channels: ChannelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SensorConfig {
    /// Maximum time the authorization hook waits for a verdict.
    #[serde(default = "default_auth_timeout_ms")]
    pub auth_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    #[serde(default = "default_auth_capacity")]
    pub auth_capacity: usize,
    #[serde(default = "default_notify_capacity")]
    pub notify_capacity: usize,
}

fn default_auth_timeout_ms() -> u64 {
    300
}

fn default_auth_capacity() -> usize {
    1024
}

fn default_notify_capacity() -> usize {
    8192
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(config::Environment::with_prefix("VIGIL").separator("_"))
            .set_default("sensor.auth_timeout_ms", 300u64)?
            .set_default("channels.auth_capacity", 1024u64)?
            .set_default("channels.notify_capacity", 8192u64)?;

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sensor: SensorConfig::default(),
            channels: ChannelConfig::default(),
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            auth_timeout_ms: default_auth_timeout_ms(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            auth_capacity: default_auth_capacity(),
            notify_capacity: default_notify_capacity(),
        }
    }
}

/*
 * SPDX-FileCopyrightText: Copyright (c) 2025 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::manager::{CloudProvider, ManagerConfig};
use crate::retry::RetryPolicy;

const DEFAULT_ENVIRONMENT: &str = "dev";
const DEFAULT_NUM_SHARDS: u32 = 1;
const DEFAULT_INVENTORY_FILE: &str = "/etc/kv-shard-mapping/inventory.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Logical cluster whose instances form the shard topology
    #[serde(default = "Defaults::environment")]
    pub environment: String,
    #[serde(default = "Defaults::num_shards")]
    pub num_shards: u32,
    #[serde(default = "Defaults::cloud_provider")]
    pub cloud_provider: CloudProvider,
    /// Time between the start of two discovery cycles
    #[serde(default = "Defaults::poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    /// JSON document listing the instance groups
    #[serde(default = "Defaults::inventory_file")]
    pub inventory_file: PathBuf,
    /// Address the `/metrics` and `/ready` endpoint listens on
    #[serde(default)]
    pub metrics_endpoint: Option<SocketAddr>,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Parameters for the cluster mappings manager. When empty, parameters
    /// are read from the environment instead.
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

pub struct Defaults;

impl Defaults {
    pub fn environment() -> String {
        DEFAULT_ENVIRONMENT.to_string()
    }
    pub fn num_shards() -> u32 {
        DEFAULT_NUM_SHARDS
    }
    pub fn cloud_provider() -> CloudProvider {
        CloudProvider::Gcp
    }
    pub fn poll_interval() -> Duration {
        Duration::from_secs(30)
    }
    pub fn inventory_file() -> PathBuf {
        DEFAULT_INVENTORY_FILE.into()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Could not read config file: {path}: {error}")]
    CouldNotRead { path: String, error: std::io::Error },
    #[error("Invalid TOML in config file: {path}: {error}")]
    InvalidToml {
        path: String,
        error: toml::de::Error,
    },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: Defaults::environment(),
            num_shards: Defaults::num_shards(),
            cloud_provider: Defaults::cloud_provider(),
            poll_interval: Defaults::poll_interval(),
            inventory_file: Defaults::inventory_file(),
            metrics_endpoint: None,
            otlp_endpoint: None,
            retry: RetryPolicy::default(),
            parameters: HashMap::new(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let cfg = std::fs::read_to_string(path).map_err(|error| ConfigError::CouldNotRead {
            path: path.to_string_lossy().to_string(),
            error,
        })?;
        toml::from_str::<Self>(&cfg).map_err(|error| ConfigError::InvalidToml {
            path: path.to_string_lossy().to_string(),
            error,
        })
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig::new(self.environment.clone(), self.num_shards)
            .with_retry_policy(self.retry.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults_for_empty_file() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            br#"
environment = "prod"
num_shards = 8
cloud_provider = "gcp"
poll_interval = "1m 30s"
inventory_file = "/tmp/inventory.json"
metrics_endpoint = "127.0.0.1:9090"

[retry]
max_delay = "10s"

[parameters]
project-id = "kv-prod"
"#,
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.environment, "prod");
        assert_eq!(config.num_shards, 8);
        assert_eq!(config.poll_interval, Duration::from_secs(90));
        assert_eq!(config.inventory_file, PathBuf::from("/tmp/inventory.json"));
        assert_eq!(
            config.metrics_endpoint,
            Some("127.0.0.1:9090".parse().unwrap())
        );
        assert_eq!(config.otlp_endpoint, None);
        assert_eq!(config.retry.max_delay, Duration::from_secs(10));
        assert_eq!(config.retry.min_delay, Duration::from_millis(500));
        assert_eq!(config.parameters["project-id"], "kv-prod");

        let manager_config = config.manager_config();
        assert_eq!(manager_config.environment, "prod");
        assert_eq!(manager_config.num_shards, 8);
        assert_eq!(manager_config.retry_policy.max_delay, Duration::from_secs(10));
    }

    #[test]
    fn test_unknown_cloud_provider() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"cloud_provider = \"azure\"\n").unwrap();

        assert!(matches!(
            Config::load(file.path()),
            Err(ConfigError::InvalidToml { .. })
        ));
    }

    #[test]
    fn test_missing_config_file() {
        let dir = tempfile::tempdir().unwrap();

        assert!(matches!(
            Config::load(&dir.path().join("config.toml")),
            Err(ConfigError::CouldNotRead { .. })
        ));
    }
}

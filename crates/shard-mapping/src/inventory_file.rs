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

//! An [`InstanceClient`] backed by a JSON inventory document on disk.
//!
//! Used for local clusters and tests, where there is no cloud provider API to
//! query. The document is re-read on every request, so editing it changes the
//! topology seen by the next discovery cycle.
//!
//! ```json
//! {
//!   "instance_groups": [
//!     {
//!       "project_id": "kv-dev",
//!       "environment": "dev",
//!       "instances": [
//!         {
//!           "service_status": "InService",
//!           "private_ip_address": "10.0.0.1",
//!           "labels": { "shard-num": "0" }
//!         }
//!       ]
//!     }
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::instance::{
    DescribeInstanceGroupInput, InstanceClient, InstanceClientError, InstanceInfo,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryFile {
    #[serde(default)]
    pub instance_groups: Vec<InstanceGroup>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceGroup {
    pub project_id: String,
    pub environment: String,
    #[serde(default)]
    pub instances: Vec<InstanceInfo>,
}

impl InstanceGroup {
    fn matches(&self, input: &DescribeInstanceGroupInput) -> bool {
        match input {
            DescribeInstanceGroupInput::Gcp(gcp) => {
                self.project_id == gcp.project_id && self.environment == gcp.environment
            }
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum InventoryFileError {
    #[error("Could not read instance inventory {path}: {error}")]
    Read { path: String, error: std::io::Error },
    #[error("Invalid instance inventory {path}: {error}")]
    Decode {
        path: String,
        error: serde_json::Error,
    },
}

impl From<InventoryFileError> for InstanceClientError {
    fn from(error: InventoryFileError) -> Self {
        InstanceClientError::Backend(Box::new(error))
    }
}

#[derive(Debug, Clone)]
pub struct InventoryFileClient {
    path: PathBuf,
}

impl InventoryFileClient {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<InventoryFile, InventoryFileError> {
        let path = self.path.to_string_lossy().to_string();
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|error| InventoryFileError::Read {
                path: path.clone(),
                error,
            })?;
        serde_json::from_str(&content).map_err(|error| InventoryFileError::Decode { path, error })
    }
}

#[async_trait]
impl InstanceClient for InventoryFileClient {
    async fn describe_instance_group_instances(
        &self,
        input: &DescribeInstanceGroupInput,
    ) -> Result<Vec<InstanceInfo>, InstanceClientError> {
        let inventory = self.load().await?;

        let instances: Vec<InstanceInfo> = inventory
            .instance_groups
            .into_iter()
            .filter(|group| group.matches(input))
            .flat_map(|group| group.instances)
            .collect();

        tracing::debug!(
            path = %self.path.display(),
            num_instances = instances.len(),
            "Loaded instance group members from inventory file"
        );

        Ok(instances)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::instance::{GcpDescribeInstanceGroupInput, InstanceServiceStatus};

    fn gcp_input(project_id: &str, environment: &str) -> DescribeInstanceGroupInput {
        DescribeInstanceGroupInput::Gcp(GcpDescribeInstanceGroupInput {
            project_id: project_id.to_string(),
            environment: environment.to_string(),
        })
    }

    fn inventory_file_error(err: InstanceClientError) -> InventoryFileError {
        match err {
            InstanceClientError::Backend(source) => *source
                .downcast::<InventoryFileError>()
                .expect("not an inventory file error"),
            other => panic!("unexpected error: {other}"),
        }
    }

    const INVENTORY: &str = r#"{
        "instance_groups": [
            {
                "project_id": "kv-dev",
                "environment": "dev",
                "instances": [
                    {"service_status": "InService", "private_ip_address": "10.0.0.1", "labels": {"shard-num": "0"}},
                    {"service_status": "PreService", "private_ip_address": "10.0.0.2", "labels": {"shard-num": "1"}}
                ]
            },
            {
                "project_id": "kv-dev",
                "environment": "qa",
                "instances": [
                    {"service_status": "InService", "private_ip_address": "10.9.0.1", "labels": {"shard-num": "0"}}
                ]
            },
            {
                "project_id": "kv-dev",
                "environment": "dev",
                "instances": [
                    {"service_status": "InService", "private_ip_address": "10.0.0.3"}
                ]
            }
        ]
    }"#;

    #[tokio::test]
    async fn test_filters_by_project_and_environment() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(INVENTORY.as_bytes()).unwrap();
        let client = InventoryFileClient::new(file.path());

        let instances = client
            .describe_instance_group_instances(&gcp_input("kv-dev", "dev"))
            .await
            .unwrap();
        let addresses: Vec<_> = instances
            .iter()
            .map(|i| i.private_ip_address.as_str())
            .collect();
        assert_eq!(addresses, vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
        assert_eq!(instances[1].service_status, InstanceServiceStatus::PreService);
        assert!(instances[2].labels.is_empty());

        let instances = client
            .describe_instance_group_instances(&gcp_input("kv-prod", "dev"))
            .await
            .unwrap();
        assert!(instances.is_empty());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let client = InventoryFileClient::new(dir.path().join("inventory.json"));

        let err = client
            .describe_instance_group_instances(&gcp_input("kv-dev", "dev"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Could not read instance inventory"));
        assert!(matches!(
            inventory_file_error(err),
            InventoryFileError::Read { .. }
        ));
    }

    #[tokio::test]
    async fn test_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{\"instance_groups\": [").unwrap();
        let client = InventoryFileClient::new(file.path());

        let err = client
            .describe_instance_group_instances(&gcp_input("kv-dev", "dev"))
            .await
            .unwrap_err();
        assert!(matches!(
            inventory_file_error(err),
            InventoryFileError::Decode { .. }
        ));
    }
}

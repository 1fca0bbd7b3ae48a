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

//! Cluster mappings managers resolve the current shard topology of the
//! cluster from the live instance inventory of a cloud provider.
//!
//! All providers share the retry and grouping logic in [`ClusterMappingsBase`].
//! The provider specific managers only decide how the instance inventory is
//! requested.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::ShardMappingError;
use crate::instance::{DescribeInstanceGroupInput, InstanceClient};
use crate::mapping::{ClusterMapping, group_instances_to_cluster_mappings};
use crate::parameters::{ParameterFetcher, get_required_parameter};
use crate::retry::{RetryPolicy, retry_until_ok};
use crate::telemetry::MetricsRecorder;

pub mod gcp;

pub use gcp::GcpClusterMappingsManager;

/// Name under which instance inventory queries are traced and recorded
pub const DESCRIBE_INSTANCE_GROUP_INSTANCES: &str = "DescribeInstanceGroupInstances";

/// Parameter holding the cloud project whose instances are queried
pub const PROJECT_ID_PARAMETER: &str = "project-id";

/// Resolves the shard topology of the cluster.
///
/// Implementations keep no state between calls. Every call queries the
/// instance inventory once (retrying until the query succeeds) and builds a
/// fresh mapping from that single response.
#[automock]
#[async_trait]
pub trait ClusterMappingsManager: Send + Sync {
    /// Returns the replica addresses for every shard of the cluster.
    ///
    /// Fails only if `cancel_token` is cancelled before the inventory could be
    /// fetched.
    async fn get_cluster_mappings(
        &self,
        cancel_token: &CancellationToken,
    ) -> Result<ClusterMapping, ShardMappingError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum CloudProvider {
    Gcp,
}

impl CloudProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloudProvider::Gcp => "gcp",
        }
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CloudProvider {
    type Err = ShardMappingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "gcp" | "gce" => Ok(CloudProvider::Gcp),
            other => Err(ShardMappingError::Config(format!(
                "unknown cloud provider '{other}'; expected one of gcp"
            ))),
        }
    }
}

impl TryFrom<String> for CloudProvider {
    type Error = ShardMappingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Settings which are fixed for the lifetime of a manager
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerConfig {
    /// Logical cluster whose instances are discovered
    pub environment: String,
    pub num_shards: u32,
    pub retry_policy: RetryPolicy,
}

impl ManagerConfig {
    pub fn new(environment: impl Into<String>, num_shards: u32) -> Self {
        Self {
            environment: environment.into(),
            num_shards,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    fn validate(&self) -> Result<(), ShardMappingError> {
        if self.num_shards == 0 {
            return Err(ShardMappingError::Config(
                "num_shards must be at least 1".to_string(),
            ));
        }
        if self.environment.trim().is_empty() {
            return Err(ShardMappingError::Config(
                "environment must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// The provider independent part of every manager
pub struct ClusterMappingsBase {
    config: ManagerConfig,
    instance_client: Arc<dyn InstanceClient>,
    metrics: Arc<dyn MetricsRecorder>,
}

impl ClusterMappingsBase {
    pub fn new(
        config: ManagerConfig,
        instance_client: Arc<dyn InstanceClient>,
        metrics: Arc<dyn MetricsRecorder>,
    ) -> Self {
        Self {
            config,
            instance_client,
            metrics,
        }
    }

    pub fn environment(&self) -> &str {
        &self.config.environment
    }

    pub fn num_shards(&self) -> usize {
        self.config.num_shards as usize
    }

    /// Fetches the members of the instance group described by `input` and
    /// groups them by shard
    pub async fn discover(
        &self,
        input: &DescribeInstanceGroupInput,
        cancel_token: &CancellationToken,
    ) -> Result<ClusterMapping, ShardMappingError> {
        let instances = retry_until_ok(
            DESCRIBE_INSTANCE_GROUP_INSTANCES,
            &self.config.retry_policy,
            self.metrics.as_ref(),
            cancel_token,
            || self.instance_client.describe_instance_group_instances(input),
        )
        .await?;

        let cluster_mappings = group_instances_to_cluster_mappings(
            &instances,
            self.num_shards(),
            self.metrics.as_ref(),
        );

        tracing::info!(
            environment = self.environment(),
            num_instances = instances.len(),
            num_replicas = cluster_mappings.total_replicas(),
            empty_shards = ?cluster_mappings.empty_shards(),
            "Resolved cluster mappings"
        );

        Ok(cluster_mappings)
    }
}

/// Builds the cluster mappings manager for `provider`.
///
/// Provider specific parameters are fetched from `parameter_fetcher` once,
/// here. A missing parameter or an invalid configuration fails construction.
pub fn create(
    provider: CloudProvider,
    config: ManagerConfig,
    instance_client: Arc<dyn InstanceClient>,
    metrics: Arc<dyn MetricsRecorder>,
    parameter_fetcher: &dyn ParameterFetcher,
) -> Result<Arc<dyn ClusterMappingsManager>, ShardMappingError> {
    config.validate()?;

    match provider {
        CloudProvider::Gcp => {
            let project_id = get_required_parameter(parameter_fetcher, PROJECT_ID_PARAMETER)?;
            tracing::info!(
                environment = %config.environment,
                num_shards = config.num_shards,
                project_id = %project_id,
                "Creating GCP cluster mappings manager"
            );
            Ok(Arc::new(GcpClusterMappingsManager::new(
                config,
                instance_client,
                metrics,
                project_id,
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::instance::{
        GcpDescribeInstanceGroupInput, InstanceInfo, InstanceServiceStatus, MockInstanceClient,
    };
    use crate::parameters::{MockParameterFetcher, ParameterError, StaticParameterFetcher};
    use crate::telemetry::NoopMetricsRecorder;

    fn parameters(project_id: &str) -> StaticParameterFetcher {
        StaticParameterFetcher::new(HashMap::from([(
            PROJECT_ID_PARAMETER.to_string(),
            project_id.to_string(),
        )]))
    }

    #[test]
    fn test_parse_cloud_provider() {
        assert_eq!("gcp".parse::<CloudProvider>().unwrap(), CloudProvider::Gcp);
        assert_eq!(" GCE ".parse::<CloudProvider>().unwrap(), CloudProvider::Gcp);
        assert!(matches!(
            "azure".parse::<CloudProvider>(),
            Err(ShardMappingError::Config(_))
        ));
    }

    #[test]
    fn test_create_requires_project_id() {
        let mut fetcher = MockParameterFetcher::new();
        fetcher
            .expect_get_parameter()
            .withf(|name| name == PROJECT_ID_PARAMETER)
            .times(1)
            .returning(|name| {
                Err(ParameterError::NotFound {
                    name: name.to_string(),
                })
            });

        let result = create(
            CloudProvider::Gcp,
            ManagerConfig::new("prod", 4),
            Arc::new(MockInstanceClient::new()),
            Arc::new(NoopMetricsRecorder),
            &fetcher,
        );

        assert!(matches!(
            result,
            Err(ShardMappingError::Parameter(ParameterError::NotFound { .. }))
        ));
    }

    #[test]
    fn test_create_rejects_empty_project_id() {
        let result = create(
            CloudProvider::Gcp,
            ManagerConfig::new("prod", 4),
            Arc::new(MockInstanceClient::new()),
            Arc::new(NoopMetricsRecorder),
            &parameters(""),
        );

        assert!(matches!(
            result,
            Err(ShardMappingError::Parameter(ParameterError::Empty { .. }))
        ));
    }

    #[test]
    fn test_create_rejects_zero_shards() {
        // The configuration is checked before any parameter is fetched
        let fetcher = MockParameterFetcher::new();

        let result = create(
            CloudProvider::Gcp,
            ManagerConfig::new("prod", 0),
            Arc::new(MockInstanceClient::new()),
            Arc::new(NoopMetricsRecorder),
            &fetcher,
        );

        assert!(matches!(result, Err(ShardMappingError::Config(_))));
    }

    #[tokio::test]
    async fn test_created_manager_queries_configured_project() {
        let mut client = MockInstanceClient::new();
        client
            .expect_describe_instance_group_instances()
            .withf(|input| {
                *input
                    == DescribeInstanceGroupInput::Gcp(GcpDescribeInstanceGroupInput {
                        project_id: "kv-prod".to_string(),
                        environment: "prod".to_string(),
                    })
            })
            .times(1)
            .returning(|_| {
                Ok(vec![InstanceInfo::new(
                    InstanceServiceStatus::InService,
                    "10.1.0.1",
                    [("shard-num", "1")],
                )])
            });

        let manager = create(
            CloudProvider::Gcp,
            ManagerConfig::new("prod", 2),
            Arc::new(client),
            Arc::new(NoopMetricsRecorder),
            &parameters("kv-prod"),
        )
        .unwrap();

        let mapping = manager
            .get_cluster_mappings(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(mapping.num_shards(), 2);
        assert!(mapping.replicas(0).unwrap().is_empty());
        assert!(mapping.replicas(1).unwrap().contains("10.1.0.1"));
    }
}

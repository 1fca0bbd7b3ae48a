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

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::{ClusterMappingsBase, ClusterMappingsManager, ManagerConfig};
use crate::error::ShardMappingError;
use crate::instance::{DescribeInstanceGroupInput, GcpDescribeInstanceGroupInput, InstanceClient};
use crate::mapping::ClusterMapping;
use crate::telemetry::MetricsRecorder;

/// Discovers the instance groups of a GCP project
pub struct GcpClusterMappingsManager {
    base: ClusterMappingsBase,
    project_id: String,
}

impl GcpClusterMappingsManager {
    pub fn new(
        config: ManagerConfig,
        instance_client: Arc<dyn InstanceClient>,
        metrics: Arc<dyn MetricsRecorder>,
        project_id: String,
    ) -> Self {
        Self {
            base: ClusterMappingsBase::new(config, instance_client, metrics),
            project_id,
        }
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn describe_instance_group_input(&self) -> DescribeInstanceGroupInput {
        DescribeInstanceGroupInput::Gcp(GcpDescribeInstanceGroupInput {
            project_id: self.project_id.clone(),
            environment: self.base.environment().to_string(),
        })
    }
}

#[async_trait]
impl ClusterMappingsManager for GcpClusterMappingsManager {
    async fn get_cluster_mappings(
        &self,
        cancel_token: &CancellationToken,
    ) -> Result<ClusterMapping, ShardMappingError> {
        let input = self.describe_instance_group_input();
        let span = tracing::info_span!(
            "get_cluster_mappings",
            provider = "gcp",
            project_id = %self.project_id,
            environment = %self.base.environment(),
        );

        self.base.discover(&input, cancel_token).instrument(span).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::instance::{
        InstanceClientError, InstanceInfo, InstanceServiceStatus, MockInstanceClient,
    };
    use crate::retry::RetryPolicy;
    use crate::telemetry::EventStatus;
    use crate::telemetry::test_support::RecordingMetricsRecorder;

    fn config(num_shards: u32) -> ManagerConfig {
        ManagerConfig::new("staging", num_shards).with_retry_policy(RetryPolicy {
            min_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            factor: 2.0,
            jitter: false,
        })
    }

    fn shard_instance(ip: &str, shard: &str) -> InstanceInfo {
        InstanceInfo::new(InstanceServiceStatus::InService, ip, [("shard-num", shard)])
    }

    #[tokio::test]
    async fn test_retries_until_inventory_is_available() {
        let mut client = MockInstanceClient::new();
        let mut calls = 0;
        client
            .expect_describe_instance_group_instances()
            .times(3)
            .returning(move |input| {
                assert_eq!(input.environment(), "staging");
                calls += 1;
                if calls < 3 {
                    Err(InstanceClientError::Request("503 Service Unavailable".to_string()))
                } else {
                    Ok(vec![
                        shard_instance("10.2.0.1", "0"),
                        shard_instance("10.2.0.2", "2"),
                        shard_instance("10.2.0.3", "2"),
                    ])
                }
            });
        let metrics = Arc::new(RecordingMetricsRecorder::default());

        let manager = GcpClusterMappingsManager::new(
            config(3),
            Arc::new(client),
            metrics.clone(),
            "kv-staging".to_string(),
        );
        assert_eq!(manager.project_id(), "kv-staging");

        let mapping = manager
            .get_cluster_mappings(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(mapping.num_shards(), 3);
        assert_eq!(mapping.replicas(0).unwrap().len(), 1);
        assert_eq!(mapping.empty_shards(), vec![1]);
        assert_eq!(mapping.replicas(2).unwrap().len(), 2);
        assert_eq!(
            metrics
                .events()
                .iter()
                .map(|(_, status)| *status)
                .collect::<Vec<_>>(),
            vec![EventStatus::Error, EventStatus::Error, EventStatus::Ok]
        );
    }

    #[tokio::test]
    async fn test_cancelled_discovery_returns_no_mapping() {
        let mut client = MockInstanceClient::new();
        client
            .expect_describe_instance_group_instances()
            .returning(|_| Err(InstanceClientError::Request("timeout".to_string())));

        let manager = GcpClusterMappingsManager::new(
            config(2),
            Arc::new(client),
            Arc::new(RecordingMetricsRecorder::default()),
            "kv-staging".to_string(),
        );

        let cancel_token = CancellationToken::new();
        let canceller = {
            let cancel_token = cancel_token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                cancel_token.cancel();
            })
        };

        let result = manager.get_cluster_mappings(&cancel_token).await;
        canceller.await.unwrap();

        assert!(matches!(
            result,
            Err(ShardMappingError::Cancelled {
                operation: "DescribeInstanceGroupInstances"
            })
        ));
    }

    #[tokio::test]
    async fn test_manager_keeps_no_state_between_cycles() {
        let mut client = MockInstanceClient::new();
        let mut calls = 0;
        client
            .expect_describe_instance_group_instances()
            .times(2)
            .returning(move |_| {
                calls += 1;
                if calls == 1 {
                    Ok(vec![shard_instance("10.3.0.1", "0")])
                } else {
                    Ok(vec![shard_instance("10.3.0.2", "1")])
                }
            });

        let manager = GcpClusterMappingsManager::new(
            config(2),
            Arc::new(client),
            Arc::new(RecordingMetricsRecorder::default()),
            "kv-staging".to_string(),
        );
        let cancel_token = CancellationToken::new();

        let first = manager.get_cluster_mappings(&cancel_token).await.unwrap();
        let second = manager.get_cluster_mappings(&cancel_token).await.unwrap();

        assert_eq!(first.empty_shards(), vec![1]);
        assert_eq!(second.empty_shards(), vec![0]);
        assert!(second.replicas(1).unwrap().contains("10.3.0.2"));
    }
}

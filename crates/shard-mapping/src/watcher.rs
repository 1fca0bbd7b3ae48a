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
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use tokio_util::sync::CancellationToken;

use crate::error::ShardMappingError;
use crate::manager::ClusterMappingsManager;
use crate::mapping::ClusterMapping;
use crate::telemetry::MetricsRecorder;

/// Read access to the last cluster mapping a watcher resolved
#[derive(Debug, Clone, Default)]
pub struct ClusterMappingsHandle {
    latest: Arc<ArcSwapOption<ClusterMapping>>,
}

impl ClusterMappingsHandle {
    /// The most recent successfully resolved mapping. `None` until the first
    /// discovery cycle finished.
    pub fn latest(&self) -> Option<Arc<ClusterMapping>> {
        self.latest.load_full()
    }

    pub fn is_ready(&self) -> bool {
        self.latest.load().is_some()
    }
}

/// Periodically runs discovery cycles and keeps the last known-good mapping.
///
/// Cycles never overlap. A failed cycle leaves the previous mapping in place.
pub struct ClusterMappingsWatcher {
    manager: Arc<dyn ClusterMappingsManager>,
    metrics: Arc<dyn MetricsRecorder>,
    poll_interval: Duration,
    handle: ClusterMappingsHandle,
}

impl ClusterMappingsWatcher {
    pub fn new(
        manager: Arc<dyn ClusterMappingsManager>,
        metrics: Arc<dyn MetricsRecorder>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            manager,
            metrics,
            poll_interval,
            handle: ClusterMappingsHandle::default(),
        }
    }

    pub fn handle(&self) -> ClusterMappingsHandle {
        self.handle.clone()
    }

    /// Runs a single discovery cycle and publishes its result
    pub async fn run_single_cycle(
        &self,
        cancel_token: &CancellationToken,
    ) -> Result<Arc<ClusterMapping>, ShardMappingError> {
        let start = Instant::now();
        let mapping = Arc::new(self.manager.get_cluster_mappings(cancel_token).await?);

        self.metrics.record_cluster_mapping(&mapping);
        self.handle.latest.store(Some(mapping.clone()));

        tracing::debug!(
            elapsed_ms = start.elapsed().as_millis(),
            num_replicas = mapping.total_replicas(),
            "Published cluster mappings"
        );
        Ok(mapping)
    }

    /// Runs discovery cycles every `poll_interval` until `cancel_token` is
    /// cancelled. Cancelling also aborts a cycle which is still retrying.
    pub async fn run(self, cancel_token: CancellationToken) {
        loop {
            let start = Instant::now();

            match self.run_single_cycle(&cancel_token).await {
                Ok(_) => {}
                Err(e) if cancel_token.is_cancelled() => {
                    tracing::info!(error = %e, "Cluster mappings watcher stop was requested");
                    return;
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        has_previous_mapping = self.handle.is_ready(),
                        "Discovery cycle failed, keeping the previous cluster mappings"
                    );
                }
            }

            let sleep_time = self.poll_interval.saturating_sub(start.elapsed());
            tokio::select! {
                _ = tokio::time::sleep(sleep_time) => {},
                _ = cancel_token.cancelled() => {
                    tracing::info!("Cluster mappings watcher stop was requested");
                    return;
                }
            }
        }
    }
}

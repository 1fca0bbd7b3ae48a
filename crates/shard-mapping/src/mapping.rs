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

use std::collections::HashSet;

use serde::Serialize;

use crate::instance::InstanceInfo;
use crate::labels::{LabelError, shard_number_from_labels};
use crate::telemetry::MetricsRecorder;

/// The replica addresses serving each shard of the cluster.
///
/// Always holds exactly `num_shards` entries. A shard without any eligible
/// instance maps to an empty set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ClusterMapping {
    shards: Vec<HashSet<String>>,
}

impl ClusterMapping {
    pub fn new(num_shards: usize) -> Self {
        Self {
            shards: vec![HashSet::new(); num_shards],
        }
    }

    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    /// Returns the replica addresses of a shard, or `None` if the shard is
    /// outside of the shard space
    pub fn replicas(&self, shard: usize) -> Option<&HashSet<String>> {
        self.shards.get(shard)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &HashSet<String>)> {
        self.shards.iter().enumerate()
    }

    /// Shards which currently have no replica at all
    pub fn empty_shards(&self) -> Vec<usize> {
        self.iter()
            .filter(|(_, replicas)| replicas.is_empty())
            .map(|(shard, _)| shard)
            .collect()
    }

    pub fn total_replicas(&self) -> usize {
        self.shards.iter().map(HashSet::len).sum()
    }

    pub fn into_inner(self) -> Vec<HashSet<String>> {
        self.shards
    }

    /// Adds a replica to a shard. Returns `false` if the shard is outside of
    /// the shard space or the address was already present.
    pub(crate) fn insert(&mut self, shard: usize, address: String) -> bool {
        match self.shards.get_mut(shard) {
            Some(replicas) => replicas.insert(address),
            None => false,
        }
    }
}

/// Why an instance did not contribute to a cluster mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    NotInService,
    MissingShardLabel,
    InvalidShardLabel,
    ShardOutOfRange,
    MissingPrivateIp,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotInService => "not_in_service",
            SkipReason::MissingShardLabel => "missing_shard_label",
            SkipReason::InvalidShardLabel => "invalid_shard_label",
            SkipReason::ShardOutOfRange => "shard_out_of_range",
            SkipReason::MissingPrivateIp => "missing_private_ip",
        }
    }
}

impl From<&LabelError> for SkipReason {
    fn from(err: &LabelError) -> Self {
        match err {
            LabelError::NotFound { .. } => SkipReason::MissingShardLabel,
            LabelError::InvalidArgument { .. } => SkipReason::InvalidShardLabel,
        }
    }
}

/// Determines the shard an instance serves, or why it can't serve any
fn assign_shard(instance: &InstanceInfo, num_shards: usize) -> Result<usize, SkipReason> {
    if !instance.is_in_service() {
        return Err(SkipReason::NotInService);
    }

    let shard_num = shard_number_from_labels(&instance.labels).map_err(|e| {
        tracing::debug!(
            private_ip_address = %instance.private_ip_address,
            error = %e,
            "Ignoring instance without usable shard label"
        );
        SkipReason::from(&e)
    })? as usize;

    if shard_num >= num_shards {
        return Err(SkipReason::ShardOutOfRange);
    }
    if instance.private_ip_address.is_empty() {
        return Err(SkipReason::MissingPrivateIp);
    }

    Ok(shard_num)
}

/// Groups the members of an instance group by the shard they serve.
///
/// Instances which are not in service, carry no valid shard label, serve a
/// shard outside of `[0, num_shards)` or have no private address yet are left
/// out. The result does not depend on the order of `instances`.
pub fn group_instances_to_cluster_mappings(
    instances: &[InstanceInfo],
    num_shards: usize,
    metrics: &dyn MetricsRecorder,
) -> ClusterMapping {
    let mut cluster_mappings = ClusterMapping::new(num_shards);

    for instance in instances {
        match assign_shard(instance, num_shards) {
            Ok(shard) => {
                cluster_mappings.insert(shard, instance.private_ip_address.clone());
            }
            Err(reason) => metrics.record_skipped_instance(reason),
        }
    }

    if !instances.is_empty() && cluster_mappings.total_replicas() == 0 {
        tracing::warn!(
            num_instances = instances.len(),
            num_shards,
            "None of the discovered instances is eligible to serve a shard"
        );
    }

    cluster_mappings
}

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

//! Shard topology resolution for the key-value cluster.
//!
//! A [`ClusterMappingsManager`] asks the cloud provider for the members of the
//! cluster's instance group and groups the in-service members by their
//! `shard-num` label. The result is a [`ClusterMapping`]: for every shard the
//! set of private addresses of its replicas.

pub mod config;
pub mod error;
pub mod instance;
pub mod inventory_file;
pub mod labels;
pub mod manager;
pub mod mapping;
pub mod metrics_endpoint;
pub mod parameters;
pub mod retry;
pub mod telemetry;
pub mod watcher;

pub use error::ShardMappingError;
pub use instance::{DescribeInstanceGroupInput, InstanceClient, InstanceInfo};
pub use manager::{CloudProvider, ClusterMappingsManager, ManagerConfig, create};
pub use mapping::{ClusterMapping, group_instances_to_cluster_mappings};
pub use watcher::{ClusterMappingsHandle, ClusterMappingsWatcher};

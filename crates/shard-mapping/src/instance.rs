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

//! The instance inventory as reported by a cloud provider, and the client
//! interface used to query it.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};

/// Health of an instance as reported by the provider's instance group API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InstanceServiceStatus {
    /// The instance is eligible to receive traffic
    InService,
    /// The instance is still booting or warming up
    PreService,
    /// The instance is being drained or terminated
    PostService,
    OutOfService,
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for InstanceServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstanceServiceStatus::InService => "InService",
            InstanceServiceStatus::PreService => "PreService",
            InstanceServiceStatus::PostService => "PostService",
            InstanceServiceStatus::OutOfService => "OutOfService",
            InstanceServiceStatus::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// A single member of an instance group.
///
/// Records are built from one provider response and never modified. They are
/// only used as input for assembling a cluster mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
    #[serde(default)]
    pub service_status: InstanceServiceStatus,
    /// Empty while the provider has not assigned an address yet
    #[serde(default)]
    pub private_ip_address: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl InstanceInfo {
    pub fn new<K, V>(
        service_status: InstanceServiceStatus,
        private_ip_address: impl Into<String>,
        labels: impl IntoIterator<Item = (K, V)>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            service_status,
            private_ip_address: private_ip_address.into(),
            labels: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn is_in_service(&self) -> bool {
        self.service_status == InstanceServiceStatus::InService
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcpDescribeInstanceGroupInput {
    pub project_id: String,
    /// Scopes the query to the instance groups of one logical cluster
    pub environment: String,
}

/// Provider specific request for the members of an instance group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescribeInstanceGroupInput {
    Gcp(GcpDescribeInstanceGroupInput),
}

impl DescribeInstanceGroupInput {
    pub fn environment(&self) -> &str {
        match self {
            DescribeInstanceGroupInput::Gcp(input) => &input.environment,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum InstanceClientError {
    #[error("Instance group request failed: {0}")]
    Request(String),
    /// Failure specific to the client implementation
    #[error("Instance group request failed: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

/// Queries a cloud provider for the members of an instance group.
///
/// Implementations are shared between discovery cycles and managers, and each
/// call must be self contained.
#[automock]
#[async_trait]
pub trait InstanceClient: Send + Sync {
    async fn describe_instance_group_instances(
        &self,
        input: &DescribeInstanceGroupInput,
    ) -> Result<Vec<InstanceInfo>, InstanceClientError>;
}

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

//! Metrics emitted while resolving the shard topology.

use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Gauge, Meter};

use crate::mapping::{ClusterMapping, SkipReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatus {
    Ok,
    Error,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Ok => "ok",
            EventStatus::Error => "error",
        }
    }
}

/// Sink for the telemetry of the cluster mappings components.
///
/// Passed explicitly to every component which emits metrics, so tests can
/// inject a no-op or recording implementation.
pub trait MetricsRecorder: Send + Sync {
    /// Records the outcome of a single attempt of a named operation
    fn increment_event_status(&self, event: &'static str, status: EventStatus);

    /// Records that an instance was left out of a cluster mapping
    fn record_skipped_instance(&self, reason: SkipReason);

    /// Records the amount of replicas per shard of a freshly built mapping
    fn record_cluster_mapping(&self, mapping: &ClusterMapping);
}

#[derive(Debug, Clone, Default)]
pub struct NoopMetricsRecorder;

impl MetricsRecorder for NoopMetricsRecorder {
    fn increment_event_status(&self, _event: &'static str, _status: EventStatus) {}

    fn record_skipped_instance(&self, _reason: SkipReason) {}

    fn record_cluster_mapping(&self, _mapping: &ClusterMapping) {}
}

/// OpenTelemetry backed metrics
#[derive(Clone)]
pub struct OtelMetricsRecorder {
    events: Counter<u64>,
    skipped_instances: Counter<u64>,
    replicas: Gauge<u64>,
}

impl OtelMetricsRecorder {
    pub fn new(meter: &Meter) -> Self {
        Self {
            events: meter
                .u64_counter("shard_mapping_events")
                .with_description("Attempts of cluster discovery operations, by outcome")
                .build(),
            skipped_instances: meter
                .u64_counter("shard_mapping_skipped_instances")
                .with_description(
                    "Instances which were left out of the cluster mapping, by reason",
                )
                .build(),
            replicas: meter
                .u64_gauge("shard_mapping_replicas")
                .with_description("Amount of replica addresses serving a shard")
                .build(),
        }
    }
}

impl MetricsRecorder for OtelMetricsRecorder {
    fn increment_event_status(&self, event: &'static str, status: EventStatus) {
        self.events.add(
            1,
            &[
                KeyValue::new("event", event),
                KeyValue::new("status", status.as_str()),
            ],
        );
    }

    fn record_skipped_instance(&self, reason: SkipReason) {
        self.skipped_instances
            .add(1, &[KeyValue::new("reason", reason.as_str())]);
    }

    fn record_cluster_mapping(&self, mapping: &ClusterMapping) {
        for (shard, replicas) in mapping.iter() {
            self.replicas.record(
                replicas.len() as u64,
                &[KeyValue::new("shard", shard.to_string())],
            );
        }
    }
}

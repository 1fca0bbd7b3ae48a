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

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::error::ShardMappingError;
use crate::telemetry::{EventStatus, MetricsRecorder};

/// Delays applied between attempts of [`retry_until_ok`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay after the first failed attempt
    #[serde(default = "RetryPolicy::default_min_delay", with = "humantime_serde")]
    pub min_delay: Duration,
    /// Upper bound for the delay between two attempts
    #[serde(default = "RetryPolicy::default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,
    #[serde(default = "RetryPolicy::default_factor")]
    pub factor: f32,
    #[serde(default = "RetryPolicy::default_jitter")]
    pub jitter: bool,
}

impl RetryPolicy {
    fn default_min_delay() -> Duration {
        Duration::from_millis(500)
    }

    fn default_max_delay() -> Duration {
        Duration::from_secs(30)
    }

    fn default_factor() -> f32 {
        2.0
    }

    fn default_jitter() -> bool {
        true
    }

    /// An endless sequence of delays
    fn delays(&self) -> impl Iterator<Item = Duration> {
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_factor(self.factor)
            .without_max_times();
        if self.jitter {
            builder = builder.with_jitter();
        }
        // jitter adds up to one extra delay on top of the computed one
        let max_delay = self.max_delay;
        builder
            .build()
            .map(move |delay| delay.min(max_delay))
            .chain(std::iter::repeat(max_delay))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            min_delay: Self::default_min_delay(),
            max_delay: Self::default_max_delay(),
            factor: Self::default_factor(),
            jitter: Self::default_jitter(),
        }
    }
}

/// Runs `operation` until it succeeds.
///
/// There is no limit on the amount of attempts. Every attempt runs inside its
/// own span named after `operation_name` and is recorded as an event with its
/// outcome. Failed attempts are followed by a backoff delay according to
/// `policy`.
///
/// Cancelling `cancel_token` stops the loop, whether it is currently waiting
/// for an attempt or for the next one. No attempt is started after
/// cancellation.
pub async fn retry_until_ok<T, E, F, Fut>(
    operation_name: &'static str,
    policy: &RetryPolicy,
    metrics: &dyn MetricsRecorder,
    cancel_token: &CancellationToken,
    mut operation: F,
) -> Result<T, ShardMappingError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let cancelled = || ShardMappingError::Cancelled {
        operation: operation_name,
    };
    let mut delays = policy.delays();
    let mut attempt: u64 = 0;

    loop {
        if cancel_token.is_cancelled() {
            return Err(cancelled());
        }
        attempt += 1;

        let span = tracing::info_span!(
            "retry_attempt",
            otel.name = operation_name,
            attempt,
            otel.status_code = tracing::field::Empty,
            otel.status_message = tracing::field::Empty,
        );

        let result = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                tracing::info!(operation = operation_name, attempt, "Retry loop was cancelled during an attempt");
                return Err(cancelled());
            }
            result = operation().instrument(span.clone()) => result,
        };

        match result {
            Ok(value) => {
                span.record("otel.status_code", "ok");
                metrics.increment_event_status(operation_name, EventStatus::Ok);
                if attempt > 1 {
                    tracing::info!(
                        operation = operation_name,
                        attempt,
                        "Operation succeeded after retrying"
                    );
                }
                return Ok(value);
            }
            Err(e) => {
                span.record("otel.status_code", "error");
                span.record("otel.status_message", tracing::field::display(&e));
                metrics.increment_event_status(operation_name, EventStatus::Error);

                let delay = delays.next().unwrap_or(policy.max_delay);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    error = %e,
                    retry_in = ?delay,
                    "Operation failed, retrying"
                );

                tokio::select! {
                    biased;
                    _ = cancel_token.cancelled() => {
                        tracing::info!(operation = operation_name, attempt, "Retry loop was cancelled during backoff");
                        return Err(cancelled());
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

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

//! Prometheus metrics and readiness endpoint of the shard mapping service.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE};
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder;
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Meter, MeterProvider};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::{Encoder, TextEncoder};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::watcher::ClusterMappingsHandle;

#[derive(Debug, Clone)]
pub struct MetricsSetup {
    pub registry: prometheus::Registry,
    pub meter: Meter,
    // Need to retain this, if it's dropped, metrics are not held
    pub meter_provider: SdkMeterProvider,
}

pub fn new_metrics_setup(service_name: &'static str) -> eyre::Result<MetricsSetup> {
    let resource = opentelemetry_sdk::Resource::builder()
        .with_attributes([KeyValue::new("service.name", service_name)])
        .build();

    let registry = prometheus::Registry::new();
    let exporter = opentelemetry_prometheus::exporter()
        .with_registry(registry.clone())
        .without_scope_info()
        .without_target_info()
        .build()?;
    let meter_provider = SdkMeterProvider::builder()
        .with_reader(exporter)
        .with_resource(resource)
        .build();

    Ok(MetricsSetup {
        registry,
        meter: meter_provider.meter(service_name),
        meter_provider,
    })
}

struct MetricsHandlerState {
    registry: prometheus::Registry,
    cluster_mappings: ClusterMappingsHandle,
}

/// Binds the metrics listener. Done upfront so that an unusable address fails
/// startup instead of going unnoticed in a background task.
pub async fn bind_metrics_endpoint(address: SocketAddr) -> Result<TcpListener, std::io::Error> {
    let listener = TcpListener::bind(address).await?;
    tracing::info!(address = %listener.local_addr()?, "Bound metrics listener");
    Ok(listener)
}

/// Serves `/metrics` and `/ready` on `listener` until `cancel_token` is
/// cancelled.
///
/// The service is ready once a cluster mapping was resolved.
pub async fn run_metrics_endpoint(
    listener: TcpListener,
    registry: prometheus::Registry,
    cluster_mappings: ClusterMappingsHandle,
    cancel_token: CancellationToken,
) -> Result<(), std::io::Error> {
    let state = Arc::new(MetricsHandlerState {
        registry,
        cluster_mappings,
    });

    loop {
        let (stream, _) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = cancel_token.cancelled() => {
                tracing::info!("Stopping metrics listener");
                return Ok(());
            }
        };

        let io = TokioIo::new(stream);
        let state = state.clone();
        tokio::task::spawn(async move {
            let service = service_fn(move |req| {
                let state = state.clone();
                async move { Ok::<_, hyper::Error>(handle_metrics_request(&req, &state)) }
            });
            if let Err(err) = Builder::new(TokioExecutor::new())
                .serve_connection(io, service)
                .await
            {
                tracing::warn!(error = %err, "Error serving connection for metrics listener");
            }
        });
    }
}

fn response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

fn handle_metrics_request<B>(
    req: &Request<B>,
    state: &MetricsHandlerState,
) -> Response<Full<Bytes>> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let mut buffer = vec![];
            let encoder = TextEncoder::new();
            if let Err(e) = encoder.encode(&state.registry.gather(), &mut buffer) {
                tracing::error!(error = %e, "Failed to encode metrics");
                return response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to encode metrics",
                );
            }

            let length = buffer.len();
            let mut response = response(StatusCode::OK, buffer);
            if let Ok(content_type) = encoder.format_type().parse() {
                response.headers_mut().insert(CONTENT_TYPE, content_type);
            }
            response.headers_mut().insert(CONTENT_LENGTH, length.into());
            response
        }
        (&Method::GET, "/ready") if state.cluster_mappings.is_ready() => {
            response(StatusCode::OK, "Ready")
        }
        (&Method::GET, "/ready") => response(
            StatusCode::SERVICE_UNAVAILABLE,
            "No cluster mappings resolved yet",
        ),
        (&Method::GET, "/") => response(
            StatusCode::OK,
            "Metrics are exposed via /metrics. There is nothing else to see here",
        ),
        _ => response(StatusCode::NOT_FOUND, "Invalid URL"),
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    fn get(path: &str) -> Request<()> {
        Request::builder().uri(path).body(()).unwrap()
    }

    #[test]
    fn test_ready_reflects_cluster_mappings() {
        let state = MetricsHandlerState {
            registry: prometheus::Registry::new(),
            cluster_mappings: ClusterMappingsHandle::default(),
        };

        let response = handle_metrics_request(&get("/ready"), &state);
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = handle_metrics_request(&get("/nothing"), &state);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bind_fails_for_address_in_use() {
        let listener = bind_metrics_endpoint("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let address = listener.local_addr().unwrap();

        assert!(bind_metrics_endpoint(address).await.is_err());
    }

    #[tokio::test]
    async fn test_endpoint_stops_when_cancelled() {
        let listener = bind_metrics_endpoint("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let cancel_token = CancellationToken::new();
        let task = tokio::spawn(run_metrics_endpoint(
            listener,
            prometheus::Registry::new(),
            ClusterMappingsHandle::default(),
            cancel_token.clone(),
        ));

        cancel_token.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(5), task)
            .await
            .expect("metrics endpoint did not stop")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_metrics_are_exported() {
        let setup = new_metrics_setup("kv-shard-mapping").unwrap();
        setup
            .meter
            .u64_counter("shard_mapping_events")
            .build()
            .add(1, &[KeyValue::new("status", "ok")]);
        let state = MetricsHandlerState {
            registry: setup.registry.clone(),
            cluster_mappings: ClusterMappingsHandle::default(),
        };

        let response = handle_metrics_request(&get("/metrics"), &state);
        assert_eq!(response.status(), StatusCode::OK);
        assert!(
            response
                .headers()
                .get(CONTENT_TYPE)
                .unwrap()
                .to_str()
                .unwrap()
                .starts_with("text/plain")
        );

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body = std::str::from_utf8(&body).unwrap();
        assert!(body.contains(r#"shard_mapping_events_total{status="ok"} 1"#));
    }
}

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
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use eyre::WrapErr;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::SdkTracerProvider;
use shard_mapping::config::{Config, ConfigError};
use shard_mapping::inventory_file::InventoryFileClient;
use shard_mapping::manager::{self, CloudProvider, ClusterMappingsManager};
use shard_mapping::metrics_endpoint::{
    bind_metrics_endpoint, new_metrics_setup, run_metrics_endpoint,
};
use shard_mapping::parameters::{EnvParameterFetcher, ParameterFetcher, StaticParameterFetcher};
use shard_mapping::telemetry::{MetricsRecorder, NoopMetricsRecorder, OtelMetricsRecorder};
use shard_mapping::watcher::ClusterMappingsWatcher;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::metadata::LevelFilter;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

const SERVICE_NAME: &str = "kv-shard-mapping";

/// Prefix of the environment variables holding manager parameters when the
/// configuration file provides none
const PARAMETER_ENV_PREFIX: &str = "KV_SHARD_MAPPING";

#[tokio::main]
async fn main() -> Result<(), eyre::Report> {
    let options = Options::parse();

    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy()
        .add_directive("tower=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("h2=warn".parse()?)
        .add_directive("tonic=warn".parse()?)
        .add_directive("opentelemetry_sdk=info".parse()?)
        .add_directive("opentelemetry_otlp=info".parse()?)
        .add_directive("shard_mapping=info".parse()?);

    let (command, config_options) = match options.command {
        Command::Run(config_options) => (CommandKind::Run, config_options),
        Command::Describe(config_options) => (CommandKind::Describe, config_options),
    };
    let config: Config = config_options.try_into()?;

    let tracer_provider = init_tracing(env_filter, config.otlp_endpoint.as_deref())?;

    let result = match command {
        CommandKind::Run => run(config)
            .await
            .wrap_err("Failed to run shard mapping service"),
        CommandKind::Describe => describe(config)
            .await
            .wrap_err("Failed to resolve cluster mappings"),
    };

    if let Some(tracer_provider) = tracer_provider {
        if let Err(e) = tracer_provider.shutdown() {
            tracing::warn!(error = %e, "Failed to flush traces");
        }
    }

    result
}

fn init_tracing(
    env_filter: EnvFilter,
    otlp_endpoint: Option<&str>,
) -> Result<Option<SdkTracerProvider>, eyre::Report> {
    let tracer_provider = match otlp_endpoint {
        Some(endpoint) => {
            let otlp_exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint)
                .build()?;

            Some(
                SdkTracerProvider::builder()
                    .with_batch_exporter(otlp_exporter)
                    .with_resource(
                        opentelemetry_sdk::Resource::builder()
                            .with_attributes([opentelemetry::KeyValue::new(
                                "service.name",
                                SERVICE_NAME,
                            )])
                            .build(),
                    )
                    .build(),
            )
        }
        None => None,
    };

    let otel_layer = tracer_provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer(SERVICE_NAME))
    });

    tracing_subscriber::registry()
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .with(env_filter)
        .with(otel_layer)
        .try_init()?;

    if let Some(endpoint) = otlp_endpoint {
        tracing::info!(
            "OpenTelemetry tracing enabled, exporting to endpoint: {}",
            endpoint
        );
    }

    Ok(tracer_provider)
}

fn build_manager(
    config: &Config,
    metrics: Arc<dyn MetricsRecorder>,
) -> Result<Arc<dyn ClusterMappingsManager>, eyre::Report> {
    let parameter_fetcher: Box<dyn ParameterFetcher> = if config.parameters.is_empty() {
        Box::new(EnvParameterFetcher::new(PARAMETER_ENV_PREFIX))
    } else {
        Box::new(StaticParameterFetcher::new(config.parameters.clone()))
    };
    let instance_client = Arc::new(InventoryFileClient::new(config.inventory_file.clone()));

    manager::create(
        config.cloud_provider,
        config.manager_config(),
        instance_client,
        metrics,
        parameter_fetcher.as_ref(),
    )
    .wrap_err("Failed to create cluster mappings manager")
}

/// Cancels `cancel_token` once the process receives Ctrl-C
fn cancel_on_shutdown_signal(cancel_token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown was requested"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for the shutdown signal"),
        }
        cancel_token.cancel();
    })
}

async fn run(config: Config) -> Result<(), eyre::Report> {
    let metrics_setup = new_metrics_setup(SERVICE_NAME)?;
    let metrics: Arc<dyn MetricsRecorder> =
        Arc::new(OtelMetricsRecorder::new(&metrics_setup.meter));
    let manager = build_manager(&config, metrics.clone())?;

    let watcher = ClusterMappingsWatcher::new(manager, metrics, config.poll_interval);
    let handle = watcher.handle();
    let cancel_token = CancellationToken::new();

    let metrics_listener = match config.metrics_endpoint {
        Some(address) => Some(
            bind_metrics_endpoint(address)
                .await
                .wrap_err_with(|| format!("Failed to bind metrics endpoint on {address}"))?,
        ),
        None => None,
    };
    let signal_task = cancel_on_shutdown_signal(cancel_token.clone());

    let metrics_task = metrics_listener.map(|listener| {
        let registry = metrics_setup.registry.clone();
        let handle = handle.clone();
        let cancel_token = cancel_token.clone();
        tokio::spawn(async move {
            if let Err(e) = run_metrics_endpoint(listener, registry, handle, cancel_token).await {
                tracing::error!(error = %e, "Metrics endpoint failed");
            }
        })
    });

    tracing::info!(
        environment = %config.environment,
        num_shards = config.num_shards,
        cloud_provider = %config.cloud_provider,
        poll_interval = ?config.poll_interval,
        "Starting cluster mappings watcher"
    );
    watcher.run(cancel_token.clone()).await;
    signal_task.abort();

    if let Some(metrics_task) = metrics_task {
        cancel_token.cancel();
        metrics_task.await.wrap_err("Metrics endpoint task failed")?;
    }

    Ok(())
}

async fn describe(config: Config) -> Result<(), eyre::Report> {
    let manager = build_manager(&config, Arc::new(NoopMetricsRecorder))?;
    let cancel_token = CancellationToken::new();
    let signal_task = cancel_on_shutdown_signal(cancel_token.clone());

    let mapping = manager.get_cluster_mappings(&cancel_token).await;
    signal_task.abort();

    println!("{}", serde_json::to_string_pretty(&mapping?)?);
    Ok(())
}

#[derive(Parser)]
#[clap(name = SERVICE_NAME)]
pub struct Options {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Parser)]
pub enum Command {
    #[clap(about = "Keep the cluster mappings up to date until stopped")]
    Run(ConfigOptions),
    #[clap(about = "Resolve the cluster mappings once and print them as JSON")]
    Describe(ConfigOptions),
}

enum CommandKind {
    Run,
    Describe,
}

#[derive(Parser)]
pub struct ConfigOptions {
    #[clap(long, short = 'f', help = "Path to TOML configuration file")]
    config_file: Option<PathBuf>,

    #[clap(short = 'e', long, help = "Environment whose instances are discovered")]
    pub environment: Option<String>,

    #[clap(short = 'n', long, help = "Number of shards of the cluster")]
    pub num_shards: Option<u32>,

    #[clap(long, help = "Cloud provider hosting the instances (gcp)")]
    pub cloud_provider: Option<CloudProvider>,

    #[clap(short = 'i', long, help = "Path to the JSON instance inventory")]
    pub inventory_file: Option<PathBuf>,

    #[clap(
        long,
        value_parser = humantime::parse_duration,
        help = "Time between two discovery cycles, e.g. 30s"
    )]
    pub poll_interval: Option<Duration>,

    #[clap(long, help = "Address to serve /metrics and /ready on")]
    pub metrics_endpoint: Option<SocketAddr>,

    #[clap(long, help = "OTLP collector endpoint for traces")]
    pub otlp_endpoint: Option<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum CommandError {
    #[error("Invalid number of shards: {0}")]
    InvalidNumShards(u32),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl TryInto<Config> for ConfigOptions {
    type Error = CommandError;

    fn try_into(self) -> Result<Config, Self::Error> {
        let mut config = if let Some(config_path) = self.config_file {
            Config::load(&config_path)?
        } else {
            Config::default()
        };

        if let Some(environment) = self.environment {
            config.environment = environment;
        }
        if let Some(num_shards) = self.num_shards {
            if num_shards == 0 {
                return Err(CommandError::InvalidNumShards(num_shards));
            }
            config.num_shards = num_shards;
        }
        if let Some(cloud_provider) = self.cloud_provider {
            config.cloud_provider = cloud_provider;
        }
        if let Some(inventory_file) = self.inventory_file {
            config.inventory_file = inventory_file;
        }
        if let Some(poll_interval) = self.poll_interval {
            config.poll_interval = poll_interval;
        }
        if let Some(metrics_endpoint) = self.metrics_endpoint {
            config.metrics_endpoint = Some(metrics_endpoint);
        }
        if let Some(otlp_endpoint) = self.otlp_endpoint {
            config.otlp_endpoint = Some(otlp_endpoint);
        }

        Ok(config)
    }
}

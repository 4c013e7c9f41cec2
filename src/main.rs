// Copyright 2025 vitalflow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use vitalflow::config::{load_config_with_env, PipelineConfig};
use vitalflow::error::PipelineError;
use vitalflow::monitor::{
    BatteryLevelMonitor, DisconnectMonitor, LogNotifier, MonitorHub, Notifier,
    SourceStatisticsMonitor,
};
use vitalflow::schema::{LocalSchemaResolver, RegistrySchemaResolver, SchemaCache, SchemaResolver};
use vitalflow::sender::{BatchingSender, RestSender, Sender, ThreadedSender};
use vitalflow::source::{MockSource, SimulationSettings};
use vitalflow::state::PersistentStateStore;
use vitalflow::stream::TimeWindows;
use vitalflow::topic::TopicCatalog;

/// vitalflow - Producer pipeline for wearable telemetry in front of a Kafka REST gateway
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.yaml")]
    config: PathBuf,

    /// Log level (overrides config file)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Number of simulated devices (overrides config file)
    #[arg(short, long)]
    simulate: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration from file
    let mut config = load_config_with_env(&args.config)?;

    // Apply CLI overrides
    if let Some(log_level) = args.log_level {
        config.logging.level = log_level;
    }
    if let Some(devices) = args.simulate {
        config.simulation.devices = devices.max(1);
    }

    // Initialize tracing with configured level
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting vitalflow pipeline");
    info!("Loaded configuration from: {:?}", args.config);
    info!("Gateway: {}", config.gateway.url);

    if let Err(e) = run(config).await {
        error!("Pipeline failed: {}", e);
        // 2 for unrecoverable transport failures, 1 for everything else
        let code = match e {
            PipelineError::Transport(_) | PipelineError::NotConnected => 2,
            _ => 1,
        };
        std::process::exit(code);
    }

    info!("vitalflow shut down successfully");
    Ok(())
}

async fn run(config: PipelineConfig) -> Result<(), PipelineError> {
    // Schema resolution: registry when configured, local bundle otherwise
    let resolver: Arc<dyn SchemaResolver> = match &config.schema.registry_url {
        Some(url) => {
            info!("Resolving schemas against registry at {}", url);
            Arc::new(RegistrySchemaResolver::new(
                url,
                Duration::from_secs(config.gateway.timeout_seconds),
            )?)
        }
        None => {
            info!("Resolving schemas from local bundle '{}'", config.schema.local_dir);
            Arc::new(LocalSchemaResolver::new(&config.schema.local_dir))
        }
    };
    let schemas = Arc::new(SchemaCache::new(resolver));
    let catalog = Arc::new(TopicCatalog::new(schemas));

    // Sender chain: batcher -> queued worker -> REST gateway
    let rest = Arc::new(RestSender::new(config.gateway.clone())?);
    let threaded = Arc::new(ThreadedSender::new(rest, config.sender.settings()));
    let batching = Arc::new(BatchingSender::new(
        threaded.clone(),
        config.sender.batch_size,
        config.sender.max_age(),
    ));

    // Monitors share one state store and consume the record tap
    let store = Arc::new(PersistentStateStore::new(&config.monitors.state_dir).await?);
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let (tap_tx, tap_rx) = mpsc::channel(1024);
    let mut hub = MonitorHub::new(
        tap_rx,
        config.monitors.poll_timeout(),
        config.streams.commit_interval(),
    );

    let statistics_output = catalog
        .binding(&config.monitors.source_statistics.output_topic)
        .await?;
    hub.register(Box::new(
        SourceStatisticsMonitor::new(
            config.monitors.source_statistics.topics.clone(),
            statistics_output,
            batching.clone() as Arc<dyn Sender>,
            store.clone(),
            &config.monitors.group,
        )
        .await?,
    ));
    hub.register(Box::new(
        BatteryLevelMonitor::new(
            config.monitors.battery.topics.clone(),
            config.monitors.battery.minimum,
            notifier.clone(),
            store.clone(),
            &config.monitors.group,
        )
        .await?,
    ));
    hub.register(Box::new(
        DisconnectMonitor::new(
            config.monitors.disconnect.topics.clone(),
            config.monitors.disconnect.settings(),
            notifier,
            store.clone(),
            &config.monitors.group,
        )
        .await?,
    ));

    let (close_tx, close_rx) = watch::channel(false);
    let hub_task = tokio::spawn(hub.run(close_rx.clone()));

    // Simulated device fleet drives the pipeline
    let windows = TimeWindows::tumbling(config.streams.window_ms)?;
    let source = MockSource::new(
        SimulationSettings {
            devices: config.simulation.devices,
            period: config.simulation.period(),
            windows,
            commit_interval: config.streams.commit_interval(),
            topics: config.simulation.topics(),
        },
        catalog,
        batching.clone(),
        threaded.clone(),
        tap_tx,
    );
    let mut source_task = tokio::spawn(source.run(close_rx));

    // Run until Ctrl+C or until the source fails on its own
    let mut source_joined = false;
    let mut outcome: Result<(), PipelineError> = Ok(());
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
        joined = &mut source_task => {
            source_joined = true;
            match joined {
                Ok(Ok(())) => info!("Source finished"),
                Ok(Err(e)) => {
                    error!("Source failed: {}", e);
                    outcome = Err(e);
                }
                Err(e) => {
                    error!("Source task aborted: {}", e);
                    outcome = Err(PipelineError::Cancelled(e.to_string()));
                }
            }
        }
    }

    // Staged shutdown: stop the source, drain the sender chain, then the hub
    let _ = close_tx.send(true);
    if !source_joined {
        match source_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Source shutdown error: {}", e),
            Err(e) => warn!("Source task join error: {}", e),
        }
    }

    if let Err(e) = batching.close().await {
        warn!("Failed to close sender chain cleanly: {}", e);
    }

    match hub_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Monitor hub shutdown error: {}", e),
        Err(e) => warn!("Monitor hub join error: {}", e),
    }

    outcome
}

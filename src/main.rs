//! Entry point: loads configuration, wires every stage together, and maps
//! the outcome to the process exit codes (\S6): 0 clean stop, 1
//! configuration error, 2 unrecoverable RPC, 3 sink failure, 4 cancelled by
//! signal.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use cosmos_extractor::config::Settings;
use cosmos_extractor::denom::DenomResolver;
use cosmos_extractor::descriptors::DescriptorResolver;
use cosmos_extractor::error::ErrorKind;
use cosmos_extractor::metrics::ExtractorMetrics;
use cosmos_extractor::probe::ChainProbe;
use cosmos_extractor::progress;
use cosmos_extractor::scheduler::{Scheduler, SchedulerConfig};
use cosmos_extractor::sink::Sink;
use cosmos_extractor::tailer::LiveTailer;
use cosmos_extractor::transport::{ChainTransport, TransportConfig};
use prost_reflect::DynamicMessage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const TENDERMINT_SERVICE: &str = "cosmos.base.tendermint.v1beta1.Service";
const DISPATCH_CAPACITY: usize = 64;

fn main() -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("failed to start tokio runtime: {err}");
            return ExitCode::from(1);
        }
    };
    runtime.block_on(run())
}

async fn run() -> ExitCode {
    let settings = match Settings::load(None) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::from(1);
        }
    };

    cosmos_extractor::logging::init(settings.log_format);
    info!(endpoint = %settings.grpc_endpoint, concurrency = settings.concurrency, "starting extractor");

    let metrics = match ExtractorMetrics::new() {
        Ok(metrics) => Some(metrics),
        Err(err) => {
            warn!(error = %err, "failed to initialise metrics registry, continuing without metrics");
            None
        }
    };

    let transport_config = TransportConfig {
        endpoint: settings.grpc_endpoint.clone(),
        insecure: settings.insecure,
        call_timeout: settings.call_timeout,
        max_retries: settings.max_retries,
    };
    let transport = match ChainTransport::connect(transport_config, metrics.clone()).await {
        Ok(transport) => Arc::new(transport),
        Err(err) => {
            eprintln!("failed to dial {}: {err}", settings.grpc_endpoint);
            return ExitCode::from(2);
        }
    };

    let descriptors = match DescriptorResolver::build(transport.channel()).await {
        Ok(descriptors) => Arc::new(descriptors),
        Err(err) => {
            eprintln!("failed to build descriptor pool: {err}");
            return ExitCode::from(2);
        }
    };

    let sink = match Sink::connect(&settings.sink_dsn).await {
        Ok(sink) => sink,
        Err(err) => {
            eprintln!("failed to connect sink: {err}");
            return ExitCode::from(3);
        }
    };

    let chain_id = match fetch_chain_id(&transport, &descriptors).await {
        Ok(chain_id) => chain_id,
        Err(err) => {
            eprintln!("failed to determine chain id: {err}");
            return ExitCode::from(2);
        }
    };

    let probe = ChainProbe::new(transport.as_ref(), &descriptors, settings.max_retries);
    let denoms = DenomResolver::new(transport.clone(), descriptors.clone(), chain_id, metrics.clone());

    let effective_start = match progress::effective_start(&sink, settings.start_height.unwrap_or(1)).await {
        Ok(height) => height,
        Err(err) => {
            eprintln!("failed to read progress: {err}");
            return ExitCode::from(3);
        }
    };

    let earliest = match probe.earliest_height().await {
        Ok(earliest) => earliest,
        Err(err) => {
            eprintln!("failed to determine earliest queryable height: {err}");
            return ExitCode::from(2);
        }
    };
    let backfill_start = effective_start.max(earliest);

    let latest = match probe.latest_height().await {
        Ok(latest) => latest,
        Err(err) => {
            eprintln!("failed to determine latest height: {err}");
            return ExitCode::from(2);
        }
    };
    let backfill_stop = settings.stop_height.unwrap_or(latest);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            signal_cancel.cancel();
        }
    });

    let scheduler_config = SchedulerConfig {
        concurrency: settings.concurrency as usize,
        failure_policy: settings.failure_policy,
        cancellation_grace: settings.cancellation_grace,
    };
    let scheduler = Scheduler::new(transport.as_ref(), &descriptors, &denoms, &sink, scheduler_config, metrics.as_ref());

    let (tx, rx) = mpsc::channel(DISPATCH_CAPACITY);

    let dispatch_cancel = cancel.clone();
    let dispatch_transport = transport.clone();
    let dispatch_descriptors = descriptors.clone();
    let dispatch_metrics = metrics.clone();
    let dispatch_live = settings.live;
    let dispatch_max_retries = settings.max_retries;
    let dispatch_stop_height = settings.stop_height;
    let dispatch_poll_interval = settings.poll_interval_initial;
    let dispatch_task = tokio::spawn(async move {
        for height in backfill_start..=backfill_stop {
            if dispatch_cancel.is_cancelled() {
                break;
            }
            if tx.send(height).await.is_err() {
                break;
            }
        }

        if dispatch_live && !dispatch_cancel.is_cancelled() {
            let probe = ChainProbe::new(dispatch_transport.as_ref(), &dispatch_descriptors, dispatch_max_retries);
            let tailer = LiveTailer::new(&probe, dispatch_stop_height, dispatch_metrics.as_ref());
            tailer.run(backfill_stop, tx, dispatch_poll_interval, dispatch_cancel).await;
        }
    });

    let result = scheduler.run(rx, backfill_start, cancel.clone()).await;
    let _ = dispatch_task.await;

    match result {
        Ok(last_committed) => {
            info!(last_committed, "extractor stopped cleanly");
            ExitCode::from(0)
        }
        Err(err) => {
            eprintln!("scheduler stopped: {err}");
            match err.kind() {
                ErrorKind::Cancellation => ExitCode::from(4),
                ErrorKind::Sink => ExitCode::from(3),
                _ => ExitCode::from(2),
            }
        }
    }
}

/// Reads `chain_id` off `GetLatestBlock`'s header, the same call
/// `ChainProbe::latest_height` falls back to, since no dedicated
/// node-info RPC is guaranteed present across every Cosmos SDK chain.
async fn fetch_chain_id(
    transport: &ChainTransport,
    descriptors: &DescriptorResolver,
) -> Result<String, cosmos_extractor::error::DescriptorError> {
    let request = descriptors.new_request(TENDERMINT_SERVICE, "GetLatestBlock").await?;
    let response = descriptors.invoke(transport, TENDERMINT_SERVICE, "GetLatestBlock", request).await?;
    let block = field_message(&response, "sdk_block")?;
    let header = field_message(&block, "header")?;
    header
        .get_field_by_name("chain_id")
        .and_then(|v| v.as_str().map(str::to_owned))
        .ok_or_else(|| cosmos_extractor::error::DescriptorError::Malformed("header missing chain_id".into()))
}

fn field_message(
    message: &DynamicMessage,
    field: &str,
) -> Result<DynamicMessage, cosmos_extractor::error::DescriptorError> {
    message
        .get_field_by_name(field)
        .and_then(|v| v.as_message().cloned())
        .ok_or_else(|| cosmos_extractor::error::DescriptorError::Malformed(format!("missing field `{field}`")))
}

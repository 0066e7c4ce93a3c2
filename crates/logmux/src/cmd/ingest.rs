use std::sync::Arc;

use logmux_driver::{
    DriverConfig, DriverError, LogDriver, LogMessage, LogSink, RegistryError, SinkContext,
    SinkError, SinkFactory, StreamMetadata,
};
use logmux_transport::{create_fifo, DEFAULT_FIFO_MODE};
use tracing::{debug, info};

use crate::cmd::IngestArgs;
use crate::exit::{driver_error, io_error, transport_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: IngestArgs, format: OutputFormat) -> CliResult<i32> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start runtime", err))?;
    runtime.block_on(ingest(args, format))
}

async fn ingest(args: IngestArgs, format: OutputFormat) -> CliResult<i32> {
    if args.create {
        create_fifo(&args.path, DEFAULT_FIFO_MODE)
            .map_err(|err| transport_error("fifo setup failed", err))?;
    }

    let config = driver_config(&args, |name| std::env::var(name).ok());
    let driver = LogDriver::new(config, Arc::new(PrintSinkFactory { format }))
        .map_err(|err| driver_error("driver setup failed", err))?;
    let driver = Arc::new(driver);

    let handle = args.path.to_string_lossy().into_owned();
    let metadata = StreamMetadata {
        producer_id: args.id,
        producer_name: args.name,
        log_path: args.log_path,
        ..StreamMetadata::default()
    };

    info!(file = %handle, id = %metadata.producer_id, "waiting for a writer");
    let mut starting = {
        let driver = Arc::clone(&driver);
        let handle = handle.clone();
        tokio::spawn(async move { driver.start_ingestion(&handle, metadata).await })
    };

    let started = tokio::select! {
        joined = &mut starting => joined,
        _ = tokio::signal::ctrl_c() => {
            info!(file = %handle, "interrupted while waiting for a writer");
            driver.stop_ingestion(&handle);
            starting.await
        }
    };
    match started {
        Ok(Ok(())) => {}
        Ok(Err(DriverError::Registry(RegistryError::Stopped(_)))) => return Ok(SUCCESS),
        Ok(Err(err)) => return Err(driver_error("ingest failed", err)),
        Err(err) => return Err(CliError::new(INTERNAL, format!("ingest task failed: {err}"))),
    }

    let stream = driver
        .registry()
        .get(&handle)
        .ok_or_else(|| CliError::new(INTERNAL, "stream vanished after registration"))?;
    info!(
        file = %handle,
        logpath = %stream.log_path().display(),
        "ingesting; press Ctrl-C to stop"
    );

    tokio::select! {
        _ = stream.wait_input_closed() => debug!(file = %handle, "input closed"),
        _ = tokio::signal::ctrl_c() => info!(file = %handle, "interrupted, stopping"),
    }
    driver.shutdown().await;

    Ok(SUCCESS)
}

/// Older deployments set the webhook through this variable.
const LEGACY_WEBHOOK_ENV: &str = "WEBHOOK_URL";

fn driver_config(args: &IngestArgs, env: impl Fn(&str) -> Option<String>) -> DriverConfig {
    let webhook_url = args
        .webhook_url
        .clone()
        .or_else(|| env(LEGACY_WEBHOOK_ENV))
        .filter(|url| !url.is_empty());
    let mut config = DriverConfig {
        webhook_url,
        ..DriverConfig::default()
    };
    if let Some(root) = &args.log_root {
        config.log_root = root.clone();
    }
    if let Some(max) = args.max_frame_size {
        config.max_frame_size = max;
    }
    config
}

/// Sink that prints every message to stdout.
struct PrintSink {
    producer_id: String,
    format: OutputFormat,
}

impl LogSink for PrintSink {
    fn log(&self, message: &LogMessage) -> Result<(), SinkError> {
        print_message(message, &self.producer_id, self.format);
        Ok(())
    }
}

struct PrintSinkFactory {
    format: OutputFormat,
}

impl SinkFactory for PrintSinkFactory {
    fn create(&self, context: &SinkContext<'_>) -> Result<Arc<dyn LogSink>, SinkError> {
        Ok(Arc::new(PrintSink {
            producer_id: context.metadata.producer_id.clone(),
            format: self.format,
        }))
    }
}

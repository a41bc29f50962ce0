pub mod command; // Commands received from the bus
pub mod config; // Configuration management
pub mod cryomech; // Compressor and inverter register protocol
pub mod daemon; // Polling cycle and command application
pub mod error; // Device layer errors
pub mod mqtt; // MQTT client and messaging
pub mod options; // Command line options parsing
pub mod prelude; // Common imports and types
pub mod retry; // Retry policy for transient I/O failures
pub mod snapshot; // Named readings for publishing
pub mod telemetry; // Outbound telemetry seam
pub mod transport; // Modbus TCP / RTU transport

pub use error::{Error, ErrorKind};

// Get the package version from Cargo.toml
const CARGO_PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

use crate::cryomech::{Compressor, InverterKind, InverterLink};
use crate::mqtt::Mqtt;
use crate::prelude::*;
use crate::telemetry::LogTelemetry;
use crate::transport::{Endpoint, ModbusTransport};

use std::sync::Arc;
use std::time::Duration;

/// Initializes env_logger; `RUST_LOG` overrides `default_filter`.
pub fn init_logging(default_filter: &str) {
    let result = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter),
    )
    .format(|buf, record| {
        writeln!(
            buf,
            "[{} {} {}] {}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
            record.level(),
            record.module_path().unwrap_or(""),
            record.args()
        )
    })
    .write_style(env_logger::WriteStyle::Never)
    .try_init();

    if let Err(e) = result {
        warn!("logger already initialized: {}", e);
    }
}

/// Builds the device slot for one configured compressor. Nothing is
/// connected until the slot is first polled.
pub fn slot_for(config: &config::Compressor) -> DeviceSlot {
    let c = config.clone();
    let connector = move || {
        let endpoint = Endpoint::Tcp {
            host: c.host().to_string(),
            port: c.port(),
        };
        let transport = ModbusTransport::new(endpoint, c.timeout());

        let link = match c.inverter() {
            None => InverterLink::None,
            Some(inverter) => match inverter.kind() {
                InverterKind::Internal => InverterLink::Internal,
                InverterKind::Rs485 => {
                    let endpoint = Endpoint::from_address(
                        inverter.address().unwrap_or_default(),
                        inverter.port(),
                        inverter.baudrate(),
                    );
                    InverterLink::Rs485(Box::new(ModbusTransport::new(endpoint, c.timeout())))
                }
            },
        };

        Compressor::builder(Box::new(transport))
            .settle_delay(c.settle_delay())
            .inverter(link)
            .connect()
    };

    DeviceSlot::new(config.key(), connector)
        .with_logged_data(config.logged_data().to_vec())
        .with_default_frequency(config.default_frequency())
}

fn print_status(slots: &[Arc<DeviceSlot>]) -> Result<()> {
    let mut failed = 0;

    for slot in slots {
        let report = slot.poll();
        match report.status {
            CommStatus::Good => {
                let text = slot.with_device(|c| Ok(c.status_report()))?;
                println!("{}:\n{}\n", slot.key(), text);
            }
            status => {
                failed += 1;
                println!("{}: {} ({})\n", slot.key(), status, report.comm_error());
            }
        }
        slot.disconnect();
    }

    if failed > 0 {
        bail!("{} of {} compressor(s) could not be read", failed, slots.len());
    }
    Ok(())
}

async fn wait_for_shutdown(runtime: Option<u64>) {
    let limit = async {
        match runtime {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
            info!("Shutdown signal received");
        }
        _ = limit => info!("Runtime limit reached"),
    }
}

/// Main application entry point
pub async fn app(options: Options) -> Result<()> {
    // Load and validate configuration
    let config = ConfigWrapper::new(options.config_file.clone()).unwrap_or_else(|err| {
        init_logging("info");
        error!("Failed to load config: {:?}", err);
        std::process::exit(255);
    });

    init_logging(&config.loglevel());
    info!(
        "cryo-bridge {} starting with config file: {}",
        CARGO_PKG_VERSION, options.config_file
    );
    config.log_summary();

    let slots: Vec<Arc<DeviceSlot>> = config
        .compressors()
        .iter()
        .map(|c| Arc::new(slot_for(c)))
        .collect();

    if options.status {
        return tokio::task::spawn_blocking(move || print_status(&slots)).await?;
    }

    let mqtt = config
        .mqtt()
        .enabled()
        .then(|| Arc::new(Mqtt::new(config.clone())));
    let telemetry: Arc<dyn Telemetry> = match &mqtt {
        Some(mqtt) => mqtt.clone(),
        None => {
            info!("MQTT disabled, readings go to the log");
            Arc::new(LogTelemetry)
        }
    };

    let daemon = Arc::new(PollingDaemon::new(
        slots,
        telemetry,
        config.logging_interval(),
    ));

    let mqtt_handle = match &mqtt {
        Some(mqtt) => Some(mqtt.start(daemon.clone())?),
        None => None,
    };

    let (shutdown_tx, shutdown_rx) = std::sync::mpsc::channel();
    let poller = {
        let daemon = daemon.clone();
        std::thread::Builder::new()
            .name("poller".to_string())
            // device transports are closed on this thread, never on an async task
            .spawn(move || -> Result<()> {
                let started = daemon.start();
                if started.is_ok() {
                    daemon.run(&shutdown_rx);
                }
                if let Err(e) = daemon.shutdown() {
                    error!("Failed to stop polling daemon: {}", e);
                }
                started
            })?
    };

    wait_for_shutdown(options.runtime).await;

    // the poller may already have exited on a startup error
    let _ = shutdown_tx.send(());
    let polled = tokio::task::spawn_blocking(move || poller.join())
        .await?
        .map_err(|_| anyhow!("polling thread panicked"))?;
    if let Err(e) = polled {
        error!("polling daemon failed: {:#}", e);
    }

    if let Some(mqtt) = mqtt {
        if let Err(e) = mqtt.stop() {
            error!("Failed to stop MQTT client: {}", e);
        }
        if let Some(handle) = mqtt_handle {
            if tokio::task::spawn_blocking(move || handle.join()).await?.is_err() {
                error!("MQTT receiver thread panicked");
            }
        }
    }

    info!("Shutdown complete");
    Ok(())
}

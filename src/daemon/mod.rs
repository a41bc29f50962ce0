use crate::prelude::*;

pub mod commands;

use crate::cryomech::Compressor;
use crate::snapshot::Reading;

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Opens a live compressor for a slot. Called whenever the slot has none.
pub trait Connector: Send + Sync {
    fn connect(&self) -> crate::error::Result<Compressor>;
}

impl<F> Connector for F
where
    F: Fn() -> crate::error::Result<Compressor> + Send + Sync,
{
    fn connect(&self) -> crate::error::Result<Compressor> {
        self()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum CommStatus {
    #[serde(rename = "good")]
    Good,
    #[serde(rename = "stale")]
    Stale,
    #[serde(rename = "connection error")]
    ConnectionError,
}

impl std::fmt::Display for CommStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommStatus::Good => write!(f, "good"),
            CommStatus::Stale => write!(f, "stale"),
            CommStatus::ConnectionError => write!(f, "connection error"),
        }
    }
}

/// Outcome of one poll of one slot.
#[derive(Clone, Debug, PartialEq)]
pub struct SlotReport {
    pub key: String,
    pub status: CommStatus,
    pub error: Option<String>,
    pub readings: BTreeMap<String, Reading>,
}

impl SlotReport {
    pub fn comm_error(&self) -> String {
        self.error.clone().unwrap_or_else(|| "None".to_string())
    }
}

/// Per-compressor holder of configuration, hardware lock and live device.
pub struct DeviceSlot {
    key: String,
    logged_data: Vec<String>,
    default_frequency: Option<f64>,
    connector: Box<dyn Connector>,
    device: Mutex<Option<Compressor>>,
    // set on connect, cleared once units and defaults are out
    setup_pending: AtomicBool,
}

impl DeviceSlot {
    pub fn new(key: impl Into<String>, connector: impl Connector + 'static) -> Self {
        Self {
            key: key.into(),
            logged_data: Vec::new(),
            default_frequency: None,
            connector: Box::new(connector),
            device: Mutex::new(None),
            setup_pending: AtomicBool::new(false),
        }
    }

    pub fn with_logged_data(mut self, logged_data: Vec<String>) -> Self {
        self.logged_data = logged_data;
        self
    }

    pub fn with_default_frequency(mut self, hz: Option<f64>) -> Self {
        self.default_frequency = hz;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn default_frequency(&self) -> Option<f64> {
        self.default_frequency
    }

    /// The hardware lock. Every register read or write happens under it.
    pub fn lock(&self) -> MutexGuard<'_, Option<Compressor>> {
        // a panic mid-operation leaves the device in an unknown state, drop it
        self.device.lock().unwrap_or_else(|poisoned| {
            let mut guard = poisoned.into_inner();
            *guard = None;
            guard
        })
    }

    pub fn is_connected(&self) -> bool {
        self.lock().is_some()
    }

    /// Runs `f` against the live device under the hardware lock.
    pub fn with_device<T>(
        &self,
        f: impl FnOnce(&mut Compressor) -> crate::error::Result<T>,
    ) -> crate::error::Result<T> {
        let mut guard = self.lock();
        match guard.as_mut() {
            Some(compressor) => f(compressor),
            None => Err(crate::error::Error::NotConnected(self.key.clone())),
        }
    }

    /// Connects if needed, then updates with one retry.
    pub fn poll(&self) -> SlotReport {
        let mut guard = self.lock();

        if guard.is_none() {
            match self.connector.connect() {
                Ok(compressor) => {
                    info!("{}: connected to {}", self.key, compressor.target());
                    *guard = Some(compressor);
                    self.setup_pending.store(true, Ordering::SeqCst);
                }
                Err(err) => {
                    error!("{}: failed to connect: {}", self.key, err);
                    return self.report(CommStatus::ConnectionError, Some(err.to_string()));
                }
            }
        }
        let Some(compressor) = guard.as_mut() else {
            return self.report(CommStatus::ConnectionError, Some("Not Connected".to_string()));
        };

        let result = compressor.update().or_else(|err| {
            warn!("{}: update failed: {}, retrying once", self.key, err);
            compressor.update()
        });

        let (status, error) = match result {
            Ok(()) => (CommStatus::Good, None),
            Err(err) => {
                error!("{}: update failed twice, marking stale: {}", self.key, err);
                (CommStatus::Stale, Some(err.to_string()))
            }
        };

        SlotReport {
            key: self.key.clone(),
            status,
            error,
            readings: compressor.snapshot().select(&self.logged_data),
        }
    }

    /// True once after each new connection, until the caller has set it up.
    pub fn take_setup_pending(&self) -> bool {
        self.setup_pending.swap(false, Ordering::SeqCst)
    }

    fn report(&self, status: CommStatus, error: Option<String>) -> SlotReport {
        SlotReport {
            key: self.key.clone(),
            status,
            error,
            readings: BTreeMap::new(),
        }
    }

    pub fn disconnect(&self) {
        if let Some(mut compressor) = self.lock().take() {
            compressor.disconnect();
            info!("{}: disconnected", self.key);
        }
    }
}

/// Drives the periodic read cycle and applies commands from the bus.
pub struct PollingDaemon {
    slots: Vec<Arc<DeviceSlot>>,
    telemetry: Arc<dyn Telemetry>,
    interval: Duration,
}

impl PollingDaemon {
    pub fn new(slots: Vec<Arc<DeviceSlot>>, telemetry: Arc<dyn Telemetry>, interval: Duration) -> Self {
        Self {
            slots,
            telemetry,
            interval,
        }
    }

    pub fn slots(&self) -> &[Arc<DeviceSlot>] {
        &self.slots
    }

    pub fn slot(&self, key: &str) -> Option<&Arc<DeviceSlot>> {
        self.slots.iter().find(|slot| slot.key() == key)
    }

    fn keys(&self) -> Vec<String> {
        self.slots.iter().map(|slot| slot.key().to_string()).collect()
    }

    /// Polls every slot and publishes what it got. A slot that fails never
    /// stops the others from being polled. Slots that connected during this
    /// cycle then get their unit metadata and default inverter frequency.
    pub fn poll_cycle(&self) -> Vec<SlotReport> {
        let reports: Vec<SlotReport> = self.slots.iter().map(|slot| slot.poll()).collect();

        for report in &reports {
            if let Err(err) = self.telemetry.publish_readings(report) {
                error!("{}: publishing readings failed: {}", report.key, err);
            }
        }

        for slot in &self.slots {
            if slot.take_setup_pending() {
                self.publish_units(slot);
                self.apply_default_frequency(slot);
            }
        }

        reports
    }

    /// Publishes unit metadata for a connected compressor.
    pub fn publish_units(&self, slot: &DeviceSlot) {
        let units = slot.lock().as_ref().map(|c| c.snapshot().units());
        match units {
            Some(units) => {
                if let Err(err) = self.telemetry.publish_units(slot.key(), &units) {
                    error!("{}: publishing units failed: {}", slot.key(), err);
                }
            }
            None => warn!("{}: not connected, no units published", slot.key()),
        }
    }

    /// Applies the slot's configured default inverter frequency, if any.
    pub fn apply_default_frequency(&self, slot: &Arc<DeviceSlot>) {
        let Some(hz) = slot.default_frequency() else {
            info!("{}: no default inverter frequency given", slot.key());
            return;
        };

        if let Err(err) = commands::frequency::SetFrequency::new(slot.clone(), hz).run() {
            error!("{}: setting default frequency {} Hz failed: {}", slot.key(), hz, err);
        }
    }

    /// First poll (which publishes units and applies default frequencies for
    /// every slot it connects), then subscriptions.
    pub fn start(&self) -> Result<()> {
        info!("starting polling daemon for {} compressor(s)", self.slots.len());
        for report in self.poll_cycle() {
            if report.status == CommStatus::ConnectionError {
                warn!("{}: not connected yet, set up on first connect", report.key);
            }
        }
        self.telemetry.subscribe(&self.keys())?;
        Ok(())
    }

    /// Polls every interval until `shutdown` fires or its sender is dropped.
    pub fn run(&self, shutdown: &Receiver<()>) {
        loop {
            match shutdown.recv_timeout(self.interval) {
                Err(RecvTimeoutError::Timeout) => {
                    self.poll_cycle();
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    info!("polling loop exiting");
                    break;
                }
            }
        }
    }

    pub fn shutdown(&self) -> Result<()> {
        info!("stopping polling daemon");
        let result = self.telemetry.unsubscribe(&self.keys());
        for slot in &self.slots {
            slot.disconnect();
        }
        result
    }

    pub fn process_command(&self, command: &Command) -> Result<()> {
        let Some(slot) = self.slot(command.key()) else {
            bail!("no compressor configured with key {}", command.key());
        };

        match command {
            Command::Power { on, .. } => commands::power::SetPower::new(slot.clone(), *on).run()?,
            Command::Frequency { hz, .. } => {
                commands::frequency::SetFrequency::new(slot.clone(), *hz).run()?;
            }
        }

        Ok(())
    }
}

impl CommandHandler for PollingDaemon {
    fn handle(&self, command: Command) {
        info!("received command: {}", command);
        if let Err(err) = self.process_command(&command) {
            error!("{} failed: {:#}", command, err);
            if let Err(err) = self.telemetry.publish_failure(&command) {
                error!("publishing failure for {} failed: {}", command, err);
            }
        }
    }
}

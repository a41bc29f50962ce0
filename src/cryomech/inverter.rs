use crate::cryomech::registers::{Encoding, Entry, Quantity, RegisterKind, RegisterMap};
use crate::cryomech::{read_entry, write_entry};
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::transport::Transport;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const MIN_FREQUENCY: f64 = 40.0;
pub const MAX_FREQUENCY: f64 = 70.0;

/// Frequencies outside the inverter's operating window are refused, never clamped.
pub fn check_frequency(hz: f64) -> Result<()> {
    if !(MIN_FREQUENCY..=MAX_FREQUENCY).contains(&hz) {
        return Err(Error::CommandRejected(format!(
            "inverter frequency {} Hz outside {}-{} Hz",
            hz, MIN_FREQUENCY, MAX_FREQUENCY
        )));
    }
    Ok(())
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InverterKind {
    Internal,
    Rs485,
}

impl std::fmt::Display for InverterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InverterKind::Internal => write!(f, "internal"),
            InverterKind::Rs485 => write!(f, "rs485"),
        }
    }
}

/// How a compressor reaches its inverter, if it has one.
pub enum InverterLink {
    None,
    Internal,
    Rs485(Box<dyn Transport>),
}

/// Where each inverter value lives.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Layout {
    pub setting: Entry,
    pub frequency: Entry,
    pub current: Entry,
    pub voltage: Option<Entry>,
    pub power: Option<Entry>,
}

const fn holding(address: u16, encoding: Encoding) -> Entry {
    Entry {
        kind: RegisterKind::Holding,
        address,
        encoding,
    }
}

/// Standalone drive on its own Modbus unit. Frequencies are in hundredths
/// of a hertz, current, voltage and power in tenths.
pub const RS485_LAYOUT: Layout = Layout {
    setting: holding(0x0001, Encoding::Int16(100)),
    frequency: holding(0x1001, Encoding::Int16(100)),
    current: holding(0x1002, Encoding::Int16(10)),
    voltage: Some(holding(0x1010, Encoding::Int16(10))),
    power: Some(holding(0x1011, Encoding::Int16(10))),
};

impl Layout {
    /// Layout of an inverter wired into the compressor panel, if the
    /// panel's firmware exposes one.
    pub fn internal(map: &RegisterMap) -> Option<Layout> {
        Some(Layout {
            setting: map.entry(Quantity::InverterSetFrequency)?,
            frequency: map.entry(Quantity::InverterFrequency)?,
            current: map.entry(Quantity::InverterCurrent)?,
            voltage: None,
            power: None,
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct InverterReadings {
    pub frequency: Option<f64>,
    pub current: Option<f64>,
    pub voltage: Option<f64>,
    pub power: Option<f64>,
    pub set_frequency: Option<f64>,
}

pub struct Inverter {
    kind: InverterKind,
    layout: Layout,
    // None when the inverter shares the compressor's transport
    link: Option<Box<dyn Transport>>,
    retry: RetryPolicy,
    set_delay: Duration,
    readings: InverterReadings,
}

impl Inverter {
    pub fn internal(map: &RegisterMap, retry: RetryPolicy, set_delay: Duration) -> Result<Self> {
        let layout = Layout::internal(map).ok_or(Error::Unsupported("internal inverter"))?;
        Ok(Self {
            kind: InverterKind::Internal,
            layout,
            link: None,
            retry,
            set_delay,
            readings: InverterReadings::default(),
        })
    }

    pub fn rs485(transport: Box<dyn Transport>, retry: RetryPolicy, set_delay: Duration) -> Self {
        Self {
            kind: InverterKind::Rs485,
            layout: RS485_LAYOUT,
            link: Some(transport),
            retry,
            set_delay,
            readings: InverterReadings::default(),
        }
    }

    pub fn kind(&self) -> InverterKind {
        self.kind
    }

    pub fn readings(&self) -> InverterReadings {
        self.readings
    }

    pub fn target(&self) -> Option<String> {
        self.link.as_ref().map(|t| t.target())
    }

    pub fn connect(&mut self) -> Result<()> {
        match self.link.as_mut() {
            Some(transport) if !transport.is_connected() => transport.connect(),
            _ => Ok(()),
        }
    }

    pub fn disconnect(&mut self) {
        if let Some(transport) = self.link.as_mut() {
            transport.disconnect();
        }
    }

    /// Reads output frequency, current, and voltage and power where the
    /// drive reports them. Each read is retried on its own.
    pub fn update(&mut self, shared: &mut dyn Transport) -> Result<()> {
        let Inverter {
            layout,
            link,
            retry,
            readings,
            ..
        } = self;
        let transport = pick(link, shared);

        readings.frequency = Some(read_retried(retry, transport, layout.frequency)?);
        readings.current = Some(read_retried(retry, transport, layout.current)?);
        if let Some(entry) = layout.voltage {
            readings.voltage = Some(read_retried(retry, transport, entry)?);
        }
        if let Some(entry) = layout.power {
            readings.power = Some(read_retried(retry, transport, entry)?);
        }

        debug!("inverter readings {:?}", readings);
        Ok(())
    }

    pub fn frequency_setting(&mut self, shared: &mut dyn Transport) -> Result<f64> {
        let Inverter {
            layout,
            link,
            retry,
            readings,
            ..
        } = self;
        let transport = pick(link, shared);

        let hz = read_retried(retry, transport, layout.setting)?;
        readings.set_frequency = Some(hz);
        Ok(hz)
    }

    /// Writes the frequency setting and confirms it by reading it back after
    /// the set delay. Returns the read-back value.
    pub fn set_frequency(&mut self, shared: &mut dyn Transport, hz: f64) -> Result<f64> {
        check_frequency(hz)?;

        let setting = self.layout.setting;
        info!("setting {} inverter frequency to {} Hz", self.kind, hz);
        write_entry(pick(&mut self.link, shared), setting, hz)?;

        std::thread::sleep(self.set_delay);

        let readback = self.frequency_setting(shared)?;
        // tolerate one encoding step plus float noise
        let step = setting.encoding.resolution();
        if (readback - hz).abs() > step + 1e-9 {
            warn!(
                "inverter frequency setting reads {} Hz after writing {} Hz",
                readback, hz
            );
            return Err(Error::not_confirmed(
                format!("set inverter frequency to {} Hz", hz),
                format!("{} Hz", readback),
                0,
            ));
        }

        Ok(readback)
    }
}

fn pick<'a>(
    link: &'a mut Option<Box<dyn Transport>>,
    shared: &'a mut dyn Transport,
) -> &'a mut dyn Transport {
    match link {
        Some(transport) => transport.as_mut(),
        None => shared,
    }
}

fn read_retried(retry: &RetryPolicy, transport: &mut dyn Transport, entry: Entry) -> Result<f64> {
    retry
        .run(|| read_entry(&mut *transport, entry))
        .map(|value| value.as_f64())
}

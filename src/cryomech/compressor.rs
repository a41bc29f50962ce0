use crate::cryomech::fault::FaultSet;
use crate::cryomech::inverter::{self, Inverter, InverterKind, InverterLink, InverterReadings};
use crate::cryomech::model::{ModelCode, SoftwareRevision};
use crate::cryomech::registers::{self, Firmware, Quantity, RegisterMap};
use crate::cryomech::state::CompressorState;
use crate::cryomech::units::Units;
use crate::cryomech::{read_entry, write_entry};
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::snapshot::Snapshot;
use crate::transport::Transport;

use chrono::{DateTime, Local};
use log::{debug, info, warn};
use num_enum::FromPrimitive;
use std::collections::BTreeMap;
use std::time::Duration;

/// Sensor quantities read by [`Compressor::update`], in read order.
const SENSORS: [Quantity; 11] = [
    Quantity::CoolantIn,
    Quantity::CoolantOut,
    Quantity::OilTemp,
    Quantity::HeliumTemp,
    Quantity::LowPressure,
    Quantity::LowPressureAverage,
    Quantity::HighPressure,
    Quantity::HighPressureAverage,
    Quantity::DeltaPressureAverage,
    Quantity::MotorCurrent,
    Quantity::Hours,
];

/// Last values read from the panel.
#[derive(Clone, Debug, Default)]
pub struct Status {
    pub state: CompressorState,
    pub enabled: bool,
    pub warnings: FaultSet,
    pub errors: FaultSet,
    pub values: BTreeMap<Quantity, f64>,
    pub inverter: Option<InverterReadings>,
    pub updated_at: Option<DateTime<Local>>,
}

pub struct CompressorBuilder {
    transport: Box<dyn Transport>,
    inverter: InverterLink,
    settle_delay: Duration,
    set_delay: Duration,
    retry: RetryPolicy,
}

impl CompressorBuilder {
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn set_delay(mut self, delay: Duration) -> Self {
        self.set_delay = delay;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn inverter(mut self, inverter: InverterLink) -> Self {
        self.inverter = inverter;
        self
    }

    /// Connects, reads identity and scale registers and selects the
    /// register map for the detected firmware.
    pub fn connect(self) -> Result<Compressor> {
        let CompressorBuilder {
            mut transport,
            inverter,
            settle_delay,
            set_delay,
            retry,
        } = self;

        if !transport.is_connected() {
            transport.connect()?;
        }
        let target = transport.target();

        let serial = read_word(transport.as_mut(), registers::SERIAL_ADDR)?;
        let model = ModelCode::from_register(read_word(transport.as_mut(), registers::MODEL_ADDR)?);
        let revision =
            SoftwareRevision::from_register(read_word(transport.as_mut(), registers::SOFTWARE_ADDR)?);
        let firmware = Firmware::from_revision(revision);
        let map = RegisterMap::select(firmware);

        info!(
            "{}: Cryomech {} ser. {} software {} ({} register map)",
            target, model, serial, revision, firmware
        );

        let inverter = match inverter {
            InverterLink::Rs485(link) => {
                let mut inverter = Inverter::rs485(link, retry.clone(), set_delay);
                if let Err(err) = inverter.connect() {
                    warn!("{}: inverter not reachable yet: {}", target, err);
                }
                Some(inverter)
            }
            InverterLink::Internal => internal_inverter(map, &retry, set_delay, &target),
            InverterLink::None if firmware == Firmware::V3 && model.has_internal_inverter() => {
                info!("{}: {} has an internal inverter", target, model);
                internal_inverter(map, &retry, set_delay, &target)
            }
            InverterLink::None => None,
        };

        let units = read_units(transport.as_mut(), map)?;
        debug!("{}: units {:?}", target, units);

        Ok(Compressor {
            transport,
            map,
            serial,
            model,
            revision,
            units,
            inverter,
            settle_delay,
            retry,
            status: Status::default(),
        })
    }
}

fn internal_inverter(
    map: &RegisterMap,
    retry: &RetryPolicy,
    set_delay: Duration,
    target: &str,
) -> Option<Inverter> {
    match Inverter::internal(map, retry.clone(), set_delay) {
        Ok(inverter) => Some(inverter),
        Err(err) => {
            warn!("{}: {}, running without inverter", target, err);
            None
        }
    }
}

fn read_word(transport: &mut dyn Transport, address: u16) -> Result<u16> {
    let words = transport.read_input_registers(address, 1)?;
    words.first().copied().ok_or_else(|| Error::RegisterCount {
        operation: format!("read input {}x1", address),
        expected: 1,
        got: 0,
    })
}

fn read_units(transport: &mut dyn Transport, map: &RegisterMap) -> Result<Units> {
    let mut code = |quantity| match map.entry(quantity) {
        Some(entry) => read_entry(&mut *transport, entry).map(|v| v.as_i64()),
        None => Ok(-1),
    };
    let pressure = code(Quantity::PressureScale)?;
    let temperature = code(Quantity::TemperatureScale)?;
    Ok(Units::from_codes(pressure, temperature))
}

/// One Cryomech compressor panel and its optional inverter.
///
/// All methods perform blocking register I/O. Callers serialize access
/// through the owning slot's lock.
pub struct Compressor {
    transport: Box<dyn Transport>,
    map: &'static RegisterMap,
    serial: u16,
    model: ModelCode,
    revision: SoftwareRevision,
    units: Units,
    inverter: Option<Inverter>,
    settle_delay: Duration,
    retry: RetryPolicy,
    status: Status,
}

impl Compressor {
    pub fn builder(transport: Box<dyn Transport>) -> CompressorBuilder {
        CompressorBuilder {
            transport,
            inverter: InverterLink::None,
            settle_delay: Duration::from_secs(1),
            set_delay: Duration::from_secs(1),
            retry: RetryPolicy::default(),
        }
    }

    pub fn target(&self) -> String {
        self.transport.target()
    }

    pub fn serial(&self) -> u16 {
        self.serial
    }

    pub fn model(&self) -> ModelCode {
        self.model
    }

    pub fn software_revision(&self) -> SoftwareRevision {
        self.revision
    }

    pub fn firmware(&self) -> Firmware {
        self.map.firmware
    }

    pub fn register_map(&self) -> &'static RegisterMap {
        self.map
    }

    pub fn units(&self) -> Units {
        self.units
    }

    pub fn inverter_kind(&self) -> Option<InverterKind> {
        self.inverter.as_ref().map(|i| i.kind())
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn state(&self) -> CompressorState {
        self.status.state
    }

    pub fn value(&self, quantity: Quantity) -> Option<f64> {
        self.status.values.get(&quantity).copied()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn disconnect(&mut self) {
        self.transport.disconnect();
        if let Some(inverter) = self.inverter.as_mut() {
            inverter.disconnect();
        }
    }

    // reads go through the retry policy, writes never do
    fn read(&mut self, quantity: Quantity) -> Result<crate::cryomech::Value> {
        let entry = self
            .map
            .entry(quantity)
            .ok_or(Error::Unsupported(quantity.name()))?;
        let Compressor {
            transport, retry, ..
        } = self;
        retry.run(|| read_entry(transport.as_mut(), entry))
    }

    fn read_code(&mut self, quantity: Quantity) -> Result<i32> {
        let raw = self.read(quantity)?.as_i64();
        i32::try_from(raw).map_err(|_| Error::Decode(format!("{} = {}", quantity.name(), raw)))
    }

    pub fn read_state(&mut self) -> Result<CompressorState> {
        let state = CompressorState::from_primitive(self.read_code(Quantity::OperatingState)?);
        self.status.state = state;
        Ok(state)
    }

    pub fn read_errors(&mut self) -> Result<FaultSet> {
        let errors = FaultSet::decode(self.read_code(Quantity::ErrorCode)?);
        self.status.errors = errors.clone();
        Ok(errors)
    }

    pub fn read_warnings(&mut self) -> Result<FaultSet> {
        let warnings = FaultSet::decode(self.read_code(Quantity::WarningCode)?);
        self.status.warnings = warnings.clone();
        Ok(warnings)
    }

    /// Reads every sensor register and, when present, the inverter.
    pub fn update(&mut self) -> Result<()> {
        self.read_state()?;
        self.status.enabled = self.read_code(Quantity::Enabled)? != 0;
        self.read_errors()?;
        self.read_warnings()?;

        for quantity in SENSORS {
            let value = self.read(quantity)?.as_f64();
            self.status.values.insert(quantity, value);
        }
        if self.map.supports(Quantity::ColdheadRpm) {
            let rpm = self.read(Quantity::ColdheadRpm)?.as_f64();
            self.status.values.insert(Quantity::ColdheadRpm, rpm);
        }

        if let Some(inverter) = self.inverter.as_mut() {
            inverter.update(self.transport.as_mut())?;
            self.status.inverter = Some(inverter.readings());
        }

        self.status.updated_at = Some(Local::now());
        Ok(())
    }

    /// Starts the compressor and waits for the panel to report it.
    pub fn on(&mut self) -> Result<()> {
        if self.read_state()? == CompressorState::Stopping {
            return Err(Error::CommandRejected(
                "compressor is stopping, cannot start mid-transition".to_string(),
            ));
        }
        self.write_enable(registers::START_CODE)?;
        self.confirm("power on", CompressorState::confirms_on)
    }

    /// Stops the compressor. Never refused on state grounds.
    pub fn off(&mut self) -> Result<()> {
        self.write_enable(registers::STOP_CODE)?;
        self.confirm("power off", CompressorState::confirms_off)
    }

    fn write_enable(&mut self, code: u16) -> Result<()> {
        let entry = self
            .map
            .entry(Quantity::EnableControl)
            .ok_or(Error::Unsupported(Quantity::EnableControl.name()))?;
        write_entry(self.transport.as_mut(), entry, f64::from(code))
    }

    fn confirm(&mut self, operation: &str, confirmed: fn(CompressorState) -> bool) -> Result<()> {
        std::thread::sleep(self.settle_delay);
        let mut state = self.read_state()?;

        if !confirmed(state) {
            debug!("{} not yet confirmed ({}), waiting once more", operation, state);
            std::thread::sleep(self.settle_delay);
            state = self.read_state()?;
        }

        if !confirmed(state) {
            let errors = self.read_errors()?;
            warn!("{} not confirmed: {} errors: {}", operation, state, errors);
            return Err(Error::not_confirmed(operation, state, errors.code()));
        }

        info!("{}: {} confirmed, compressor {}", self.target(), operation, state);
        if let Err(err) = self.update() {
            warn!("refresh after {} failed: {}", operation, err);
        }
        Ok(())
    }

    pub fn set_inverter_frequency(&mut self, hz: f64) -> Result<f64> {
        inverter::check_frequency(hz)?;
        let inverter = self
            .inverter
            .as_mut()
            .ok_or(Error::Unsupported("inverter"))?;
        let readback = inverter.set_frequency(self.transport.as_mut(), hz)?;
        self.status.inverter = Some(inverter.readings());
        Ok(readback)
    }

    pub fn inverter_frequency_setting(&mut self) -> Result<f64> {
        let inverter = self
            .inverter
            .as_mut()
            .ok_or(Error::Unsupported("inverter"))?;
        let hz = inverter.frequency_setting(self.transport.as_mut())?;
        self.status.inverter = Some(inverter.readings());
        Ok(hz)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::from_compressor(self)
    }

    /// Multi-line report of the last values read.
    pub fn status_report(&self) -> String {
        let temp = self.units.temperature.symbol();
        let press = self.units.pressure.symbol();
        let value = |q| self.value(q).unwrap_or_default();
        let faults = |set: &FaultSet| set.names().join("\n ");

        let mut lines = vec![
            format!("Cryomech {}. ser. {}", self.model, self.serial),
            format!("Address            : {}", self.target()),
            format!("Software revision  : {}", self.revision),
            format!("Operating State    : {}", self.status.state),
            format!("Enabled            : {}", self.status.enabled),
            format!("Warnings           : \n {}", non_empty(faults(&self.status.warnings))),
            format!("Errors             : \n {}", non_empty(faults(&self.status.errors))),
            String::new(),
        ];

        if let Some(readings) = self.status.inverter {
            lines.push(format!(
                "Inverter Frequency : {:.1} Hz",
                readings.frequency.unwrap_or_default()
            ));
            lines.push(format!(
                "Inverter Current   : {:.2} Amps",
                readings.current.unwrap_or_default()
            ));
            if let Some(voltage) = readings.voltage {
                lines.push(format!("Inverter Voltage   : {:.1} V", voltage));
            }
            if let Some(power) = readings.power {
                lines.push(format!("Inverter Power     : {:.1} kW", power));
            }
        }
        if self.map.supports(Quantity::ColdheadRpm) {
            lines.push(format!(
                "Coldhead RPM       : {:.2} RPM",
                value(Quantity::ColdheadRpm)
            ));
        }

        lines.extend([
            format!("Coolant In         : {:.2} {}", value(Quantity::CoolantIn), temp),
            format!("Coolant Out        : {:.2} {}", value(Quantity::CoolantOut), temp),
            format!("Oil Temperature    : {:.2} {}", value(Quantity::OilTemp), temp),
            format!("Helium Temp        : {:.2} {}", value(Quantity::HeliumTemp), temp),
            format!("Low side pressure  : {:.2} {}", value(Quantity::LowPressure), press),
            format!(
                "Low side average   : {:.2} {}",
                value(Quantity::LowPressureAverage),
                press
            ),
            format!("High side pressure : {:.2} {}", value(Quantity::HighPressure), press),
            format!(
                "High side average  : {:.2} {}",
                value(Quantity::HighPressureAverage),
                press
            ),
            format!(
                "Pressure Delta avg : {:.2} {}",
                value(Quantity::DeltaPressureAverage),
                press
            ),
            format!("Motor current      : {:.2} Amps", value(Quantity::MotorCurrent)),
            format!("Hours of Operation : {:.1}", value(Quantity::Hours)),
        ]);

        lines.join("\n")
    }
}

fn non_empty(s: String) -> String {
    if s.is_empty() {
        "None".to_string()
    } else {
        s
    }
}

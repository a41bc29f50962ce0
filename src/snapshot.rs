use crate::cryomech::{Compressor, Quantity};

use chrono::{DateTime, Local};
use serde::ser::{Serialize, SerializeTuple, Serializer};
use std::collections::BTreeMap;

/// Every name a compressor snapshot can carry. `logged_data` entries in the
/// configuration must come from this list.
pub const READING_NAMES: &[&str] = &[
    "serial",
    "model",
    "software_revision",
    "state",
    "state_code",
    "enabled",
    "warnings",
    "warning_code",
    "errors",
    "error_code",
    "coolant_in",
    "coolant_out",
    "oil_temp",
    "helium_temp",
    "low_pressure",
    "low_pressure_average",
    "high_pressure",
    "high_pressure_average",
    "delta_pressure_average",
    "motor_current",
    "hours",
    "coldhead_rpm",
    "inverter_frequency",
    "inverter_current",
    "inverter_voltage",
    "inverter_power",
    "inverter_set_frequency",
];

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum ReadingValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl std::fmt::Display for ReadingValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadingValue::Bool(b) => write!(f, "{}", b),
            ReadingValue::Int(i) => write!(f, "{}", i),
            ReadingValue::Float(v) => write!(f, "{:.3}", v),
            ReadingValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A value with the unit it is expressed in. Serializes as `[value, unit]`.
#[derive(Clone, Debug, PartialEq)]
pub struct Reading {
    pub value: ReadingValue,
    pub unit: Option<&'static str>,
}

impl Serialize for Reading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.value)?;
        tuple.serialize_element(&self.unit)?;
        tuple.end()
    }
}

/// Named readings taken from a compressor after an update.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    readings: BTreeMap<&'static str, Reading>,
    pub taken_at: Option<DateTime<Local>>,
}

impl Snapshot {
    pub fn set(&mut self, name: &'static str, value: ReadingValue, unit: Option<&'static str>) {
        self.readings.insert(name, Reading { value, unit });
    }

    pub fn get(&self, name: &str) -> Option<&Reading> {
        self.readings.get(name)
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Reading)> {
        self.readings.iter().map(|(name, reading)| (*name, reading))
    }

    /// Readings restricted to `names`; an empty list selects everything.
    /// Names the compressor did not report are skipped.
    pub fn select(&self, names: &[String]) -> BTreeMap<String, Reading> {
        self.iter()
            .filter(|(name, _)| names.is_empty() || names.iter().any(|n| n == name))
            .map(|(name, reading)| (name.to_string(), reading.clone()))
            .collect()
    }

    /// Unit symbol for each reading, as published once at startup.
    pub fn units(&self) -> BTreeMap<String, Option<&'static str>> {
        self.iter()
            .map(|(name, reading)| (name.to_string(), reading.unit))
            .collect()
    }

    pub fn from_compressor(compressor: &Compressor) -> Self {
        use ReadingValue::*;

        let status = compressor.status();
        let units = compressor.units();
        let temp = Some(units.temperature.symbol());
        let press = Some(units.pressure.symbol());

        let mut snapshot = Snapshot {
            taken_at: status.updated_at,
            ..Snapshot::default()
        };

        snapshot.set("serial", Int(compressor.serial().into()), None);
        snapshot.set("model", Text(compressor.model().to_string()), None);
        snapshot.set(
            "software_revision",
            Text(compressor.software_revision().to_string()),
            None,
        );

        // identity is all we have until the first successful update
        if status.updated_at.is_none() {
            return snapshot;
        }

        snapshot.set("state", Text(status.state.to_string()), None);
        snapshot.set("state_code", Int(status.state.code().into()), None);
        snapshot.set("enabled", Bool(status.enabled), None);
        snapshot.set("warnings", Text(status.warnings.to_string()), None);
        snapshot.set("warning_code", Int(status.warnings.code().into()), None);
        snapshot.set("errors", Text(status.errors.to_string()), None);
        snapshot.set("error_code", Int(status.errors.code().into()), None);

        let sensors: [(&'static str, Quantity, Option<&'static str>); 12] = [
            ("coolant_in", Quantity::CoolantIn, temp),
            ("coolant_out", Quantity::CoolantOut, temp),
            ("oil_temp", Quantity::OilTemp, temp),
            ("helium_temp", Quantity::HeliumTemp, temp),
            ("low_pressure", Quantity::LowPressure, press),
            ("low_pressure_average", Quantity::LowPressureAverage, press),
            ("high_pressure", Quantity::HighPressure, press),
            ("high_pressure_average", Quantity::HighPressureAverage, press),
            ("delta_pressure_average", Quantity::DeltaPressureAverage, press),
            ("motor_current", Quantity::MotorCurrent, Some("A")),
            ("hours", Quantity::Hours, Some("h")),
            ("coldhead_rpm", Quantity::ColdheadRpm, Some("RPM")),
        ];
        for (name, quantity, unit) in sensors {
            if let Some(value) = compressor.value(quantity) {
                snapshot.set(name, Float(value), unit);
            }
        }

        if let Some(inverter) = status.inverter {
            let values = [
                ("inverter_frequency", inverter.frequency, "Hz"),
                ("inverter_current", inverter.current, "A"),
                ("inverter_voltage", inverter.voltage, "V"),
                ("inverter_power", inverter.power, "kW"),
                ("inverter_set_frequency", inverter.set_frequency, "Hz"),
            ];
            for (name, value, unit) in values {
                if let Some(value) = value {
                    snapshot.set(name, Float(value), Some(unit));
                }
            }
        }

        snapshot
    }
}

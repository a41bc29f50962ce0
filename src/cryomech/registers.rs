use crate::cryomech::model::SoftwareRevision;

/// Serial number, one word. Same address for every firmware.
pub const SERIAL_ADDR: u16 = 31;
/// Model code, family in the high byte and variant in the low byte.
pub const MODEL_ADDR: u16 = 32;
/// Software revision, two signed bytes.
pub const SOFTWARE_ADDR: u16 = 33;

/// Written to the enable holding register to start the compressor.
pub const START_CODE: u16 = 0x0001;
/// Written to the enable holding register to stop the compressor.
pub const STOP_CODE: u16 = 0x00FF;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Firmware {
    V2,
    V3,
}

impl Firmware {
    pub fn from_revision(revision: SoftwareRevision) -> Self {
        if revision.major >= 3 {
            Firmware::V3
        } else {
            Firmware::V2
        }
    }
}

impl std::fmt::Display for Firmware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Firmware::V2 => write!(f, "v2"),
            Firmware::V3 => write!(f, "v3"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RegisterKind {
    Input,
    Holding,
}

/// How the words of one quantity turn into a number.
///
/// Integer encodings carry the divisor that converts the raw count into
/// physical units (1 for plain integers).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Encoding {
    Float32,
    Int16(u16),
    Int32(u16),
}

impl Encoding {
    pub fn word_count(self) -> u16 {
        match self {
            Encoding::Int16(_) => 1,
            Encoding::Float32 | Encoding::Int32(_) => 2,
        }
    }

    /// Smallest representable step in physical units, zero for floats.
    pub fn resolution(self) -> f64 {
        match self {
            Encoding::Float32 => 0.0,
            Encoding::Int16(divisor) | Encoding::Int32(divisor) => 1.0 / f64::from(divisor),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum Quantity {
    OperatingState,
    Enabled,
    WarningCode,
    ErrorCode,
    CoolantIn,
    CoolantOut,
    OilTemp,
    HeliumTemp,
    LowPressure,
    LowPressureAverage,
    HighPressure,
    HighPressureAverage,
    DeltaPressureAverage,
    MotorCurrent,
    Hours,
    PressureScale,
    TemperatureScale,
    ColdheadRpm,
    SoftwareVariant,
    InverterFrequency,
    InverterCurrent,
    EnableControl,
    InverterSetFrequency,
}

impl Quantity {
    pub fn name(self) -> &'static str {
        use Quantity::*;

        match self {
            OperatingState => "operating_state",
            Enabled => "enabled",
            WarningCode => "warning_code",
            ErrorCode => "error_code",
            CoolantIn => "coolant_in",
            CoolantOut => "coolant_out",
            OilTemp => "oil_temp",
            HeliumTemp => "helium_temp",
            LowPressure => "low_pressure",
            LowPressureAverage => "low_pressure_average",
            HighPressure => "high_pressure",
            HighPressureAverage => "high_pressure_average",
            DeltaPressureAverage => "delta_pressure_average",
            MotorCurrent => "motor_current",
            Hours => "hours",
            PressureScale => "pressure_scale",
            TemperatureScale => "temperature_scale",
            ColdheadRpm => "coldhead_rpm",
            SoftwareVariant => "software_variant",
            InverterFrequency => "inverter_frequency",
            InverterCurrent => "inverter_current",
            EnableControl => "enable",
            InverterSetFrequency => "inverter_set_frequency",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Entry {
    pub kind: RegisterKind,
    pub address: u16,
    pub encoding: Encoding,
}

const fn input(address: u16, encoding: Encoding) -> Entry {
    Entry {
        kind: RegisterKind::Input,
        address,
        encoding,
    }
}

const fn holding(address: u16, encoding: Encoding) -> Entry {
    Entry {
        kind: RegisterKind::Holding,
        address,
        encoding,
    }
}

/// Addresses and encodings for one firmware major version.
#[derive(Debug)]
pub struct RegisterMap {
    pub firmware: Firmware,
    entries: &'static [(Quantity, Entry)],
}

impl RegisterMap {
    pub fn select(firmware: Firmware) -> &'static RegisterMap {
        match firmware {
            Firmware::V2 => &V2,
            Firmware::V3 => &V3,
        }
    }

    /// `None` when this firmware does not expose the quantity.
    pub fn entry(&self, quantity: Quantity) -> Option<Entry> {
        self.entries
            .iter()
            .find(|(q, _)| *q == quantity)
            .map(|(_, entry)| *entry)
    }

    pub fn supports(&self, quantity: Quantity) -> bool {
        self.entry(quantity).is_some()
    }
}

// every v2 value, flags and codes included, is a float over two words
static V2: RegisterMap = RegisterMap {
    firmware: Firmware::V2,
    entries: &[
        (Quantity::OperatingState, input(1, Encoding::Float32)),
        (Quantity::Enabled, input(2, Encoding::Float32)),
        (Quantity::WarningCode, input(3, Encoding::Float32)),
        (Quantity::ErrorCode, input(5, Encoding::Float32)),
        (Quantity::CoolantIn, input(7, Encoding::Float32)),
        (Quantity::CoolantOut, input(9, Encoding::Float32)),
        (Quantity::OilTemp, input(11, Encoding::Float32)),
        (Quantity::HeliumTemp, input(13, Encoding::Float32)),
        (Quantity::LowPressure, input(15, Encoding::Float32)),
        (Quantity::LowPressureAverage, input(17, Encoding::Float32)),
        (Quantity::HighPressure, input(19, Encoding::Float32)),
        (Quantity::HighPressureAverage, input(21, Encoding::Float32)),
        (Quantity::DeltaPressureAverage, input(23, Encoding::Float32)),
        (Quantity::MotorCurrent, input(25, Encoding::Float32)),
        (Quantity::Hours, input(27, Encoding::Float32)),
        (Quantity::PressureScale, input(29, Encoding::Float32)),
        (Quantity::TemperatureScale, input(30, Encoding::Float32)),
        (Quantity::EnableControl, holding(1, Encoding::Int16(1))),
    ],
};

static V3: RegisterMap = RegisterMap {
    firmware: Firmware::V3,
    entries: &[
        (Quantity::OperatingState, input(1, Encoding::Int16(1))),
        (Quantity::Enabled, input(2, Encoding::Int16(1))),
        (Quantity::WarningCode, input(52, Encoding::Int32(1))),
        (Quantity::ErrorCode, input(54, Encoding::Int32(1))),
        (Quantity::CoolantIn, input(40, Encoding::Int16(10))),
        (Quantity::CoolantOut, input(41, Encoding::Int16(10))),
        (Quantity::OilTemp, input(42, Encoding::Int16(10))),
        (Quantity::HeliumTemp, input(43, Encoding::Int16(10))),
        (Quantity::LowPressure, input(44, Encoding::Int16(10))),
        (Quantity::LowPressureAverage, input(45, Encoding::Int16(10))),
        (Quantity::HighPressure, input(46, Encoding::Int16(10))),
        (Quantity::HighPressureAverage, input(47, Encoding::Int16(10))),
        (Quantity::DeltaPressureAverage, input(48, Encoding::Int16(10))),
        (Quantity::MotorCurrent, input(49, Encoding::Int16(10))),
        (Quantity::Hours, input(50, Encoding::Int32(10))),
        (Quantity::PressureScale, input(29, Encoding::Int16(1))),
        (Quantity::TemperatureScale, input(30, Encoding::Int16(1))),
        (Quantity::ColdheadRpm, input(34, Encoding::Int16(100))),
        (Quantity::SoftwareVariant, input(35, Encoding::Int16(1))),
        (Quantity::InverterFrequency, input(36, Encoding::Int16(10))),
        (Quantity::InverterCurrent, input(37, Encoding::Int16(10))),
        (Quantity::EnableControl, holding(1, Encoding::Int16(1))),
        (Quantity::InverterSetFrequency, holding(3, Encoding::Int16(10))),
    ],
};

use num_enum::FromPrimitive;

/// Unknown codes fall back to the panel's factory default (PSI).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, FromPrimitive)]
#[repr(i32)]
pub enum PressureScale {
    #[default]
    Psi = 0,
    Bar = 1,
    KPa = 2,
}

impl PressureScale {
    pub fn symbol(self) -> &'static str {
        match self {
            PressureScale::Psi => "PSI",
            PressureScale::Bar => "Bar",
            PressureScale::KPa => "kPa",
        }
    }
}

/// Unknown codes fall back to the panel's factory default (Fahrenheit).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, FromPrimitive)]
#[repr(i32)]
pub enum TemperatureScale {
    #[default]
    Fahrenheit = 0,
    Celsius = 1,
    Kelvin = 2,
}

impl TemperatureScale {
    pub fn symbol(self) -> &'static str {
        match self {
            TemperatureScale::Fahrenheit => "F",
            TemperatureScale::Celsius => "C",
            TemperatureScale::Kelvin => "K",
        }
    }
}

/// Scale codes read once at connect time.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Units {
    pub pressure: PressureScale,
    pub temperature: TemperatureScale,
}

impl Units {
    pub fn from_codes(pressure: i64, temperature: i64) -> Self {
        Self {
            pressure: i32::try_from(pressure)
                .map(PressureScale::from_primitive)
                .unwrap_or_default(),
            temperature: i32::try_from(temperature)
                .map(TemperatureScale::from_primitive)
                .unwrap_or_default(),
        }
    }
}

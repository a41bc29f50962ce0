use serde::Serialize;

/// Fault flags, largest magnitude first.
pub const FAULT_FLAGS: [(i64, &str); 31] = [
    (1 << 30, "Inverter Comm Loss"),
    (1 << 29, "Driver Comm Loss"),
    (1 << 28, "Inverter Error"),
    (1 << 27, "Motor Current High"),
    (1 << 26, "Motor Current Sensor"),
    (1 << 25, "Low Pressure Sensor"),
    (1 << 24, "High Pressure Sensor"),
    (1 << 23, "Oil Sensor"),
    (1 << 22, "Helium Sensor"),
    (1 << 21, "Coolant Out Sensor"),
    (1 << 20, "Coolant In Sensor"),
    (1 << 19, "Cold Head Motor Stall"),
    (1 << 18, "Static Pressure Low"),
    (1 << 17, "Static Pressure High"),
    (1 << 16, "Power Supply Error"),
    (1 << 15, "Three Phase Error"),
    (1 << 14, "Motor Current Low"),
    (1 << 13, "Delta Pressure Low"),
    (1 << 12, "Delta Pressure High"),
    (1 << 11, "High Pressure Low"),
    (1 << 10, "High Pressure High"),
    (1 << 9, "Low Pressure Low"),
    (1 << 8, "Low Pressure High"),
    (1 << 7, "Helium Low"),
    (1 << 6, "Helium High"),
    (1 << 5, "Oil Low"),
    (1 << 4, "Oil High"),
    (1 << 3, "Coolant Out Low"),
    (1 << 2, "Coolant Out High"),
    (1 << 1, "Coolant In Low"),
    (1 << 0, "Coolant In High"),
];

/// A decoded warning or error code.
///
/// v2 firmware reports codes as negative sums and v3 as positive sums of
/// the same flags, so decoding only looks at the magnitude.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct FaultSet {
    code: i32,
    names: Vec<&'static str>,
}

impl FaultSet {
    pub fn decode(code: i32) -> Self {
        let mut remaining = -i64::from(code).abs();
        let mut names = Vec::new();

        for (threshold, name) in FAULT_FLAGS {
            if remaining <= -threshold {
                names.push(name);
                remaining += threshold;
            }
        }

        Self { code, names }
    }

    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn names(&self) -> &[&'static str] {
        &self.names
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl std::fmt::Display for FaultSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.names.is_empty() {
            write!(f, "None")
        } else {
            write!(f, "{}", self.names.join(", "))
        }
    }
}

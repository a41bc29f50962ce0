use num_enum::FromPrimitive;

/// Operating state as reported by the compressor panel.
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromPrimitive)]
#[repr(i32)]
pub enum CompressorState {
    Ready = 0,
    Starting = 2,
    Running = 3,
    Stopping = 5,
    ErrorLockout = 6,
    Error = 7,
    HeliumOvertemp = 8,
    PowerError = 9,
    Recovered = 15,
    #[num_enum(catch_all)]
    Unknown(i32),
}

impl CompressorState {
    pub fn code(self) -> i32 {
        use CompressorState::*;

        match self {
            Ready => 0,
            Starting => 2,
            Running => 3,
            Stopping => 5,
            ErrorLockout => 6,
            Error => 7,
            HeliumOvertemp => 8,
            PowerError => 9,
            Recovered => 15,
            Unknown(code) => code,
        }
    }

    pub fn description(self) -> &'static str {
        use CompressorState::*;

        match self {
            Ready => "Ready to start",
            Starting => "Starting",
            Running => "Running",
            Stopping => "Stopping",
            ErrorLockout => "Error Lockout",
            Error => "Error",
            HeliumOvertemp => "Helium Overtemp: waiting to cool down",
            PowerError => "Power Related Error",
            Recovered => "Recovered From Error",
            Unknown(_) => "Unknown State",
        }
    }

    /// States that confirm a start command was taken.
    pub fn confirms_on(self) -> bool {
        matches!(self, CompressorState::Starting | CompressorState::Running)
    }

    /// States that confirm a stop command was taken.
    pub fn confirms_off(self) -> bool {
        matches!(self, CompressorState::Stopping | CompressorState::Ready)
    }
}

impl Default for CompressorState {
    fn default() -> Self {
        CompressorState::Ready
    }
}

impl std::fmt::Display for CompressorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Compressor model decoded from the model register.
///
/// Bytes that are not in the lookup tables are kept as `None`; the rendered
/// name then only contains the parts that were recognised and
/// [`ModelCode::is_partial`] reports it.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ModelCode {
    pub raw: u16,
    pub family: Option<&'static str>,
    pub variant: Option<&'static str>,
}

impl ModelCode {
    pub fn from_register(word: u16) -> Self {
        let [high, low] = word.to_be_bytes();
        Self {
            raw: word,
            family: Self::family(high),
            variant: Self::variant(low),
        }
    }

    fn family(byte: u8) -> Option<&'static str> {
        match byte {
            1 => Some("08"),
            2 => Some("09"),
            3 => Some("10"),
            4 => Some("11"),
            5 => Some("28"),
            _ => None,
        }
    }

    fn variant(byte: u8) -> Option<&'static str> {
        match byte {
            1 => Some("A1"),
            2 => Some("01"),
            3 => Some("02"),
            4 => Some("03"),
            5 => Some("H3"),
            6 => Some("I3"),
            7 => Some("04"),
            8 => Some("H4"),
            9 => Some("05"),
            10 => Some("H5"),
            11 => Some("I6"),
            12 => Some("06"),
            13 => Some("07"),
            14 => Some("H7"),
            15 => Some("I7"),
            16 => Some("08"),
            17 => Some("09"),
            18 => Some("9C"),
            19 => Some("10"),
            20 => Some("1I"),
            21 => Some("11"),
            22 => Some("12"),
            23 => Some("13"),
            24 => Some("14"),
            _ => None,
        }
    }

    pub fn is_partial(&self) -> bool {
        self.family.is_none() || self.variant.is_none()
    }

    pub fn name(&self) -> String {
        format!(
            "CPA{}{}",
            self.family.unwrap_or_default(),
            self.variant.unwrap_or_default()
        )
    }

    /// CPA28I6 units carry an inverter on the compressor's own register space.
    pub fn has_internal_inverter(&self) -> bool {
        !self.is_partial() && self.name() == "CPA28I6"
    }
}

impl std::fmt::Display for ModelCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_partial() {
            write!(f, "{} (partial, code {:#06x})", self.name(), self.raw)
        } else {
            write!(f, "{}", self.name())
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SoftwareRevision {
    pub major: i8,
    pub minor: i8,
}

impl SoftwareRevision {
    pub fn from_register(word: u16) -> Self {
        let [high, low] = word.to_be_bytes();
        Self {
            major: high as i8,
            minor: low as i8,
        }
    }
}

impl std::fmt::Display for SoftwareRevision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

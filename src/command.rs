use crate::prelude::*;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Power { key: String, on: bool },
    Frequency { key: String, hz: f64 },
}

impl Command {
    /// Compressor key this command is addressed to.
    pub fn key(&self) -> &str {
        match self {
            Command::Power { key, .. } | Command::Frequency { key, .. } => key,
        }
    }

    pub fn channel(&self) -> &'static str {
        match self {
            Command::Power { .. } => "power",
            Command::Frequency { .. } => "frequency",
        }
    }

    pub fn to_result_topic(&self) -> String {
        format!("result/{}/{}", self.key(), self.channel())
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Power { key, on } => {
                write!(f, "{} power {}", key, if *on { "on" } else { "off" })
            }
            Command::Frequency { key, hz } => write!(f, "{} frequency {} Hz", key, hz),
        }
    }
}

/// Receives commands delivered by the telemetry bus.
pub trait CommandHandler: Send + Sync {
    fn handle(&self, command: Command);
}

/// Parses a boolean power payload the way the bus clients send it.
pub fn parse_power(payload: &str) -> Result<bool> {
    match payload.trim().to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "on" | "y" | "yes" => Ok(true),
        "0" | "f" | "false" | "off" | "n" | "no" => Ok(false),
        other => bail!("not a power setting: {:?}", other),
    }
}

pub fn parse_frequency(payload: &str) -> Result<f64> {
    let hz: f64 = payload
        .trim()
        .parse()
        .map_err(|err| anyhow!("not a frequency: {:?}: {}", payload, err))?;
    if !hz.is_finite() {
        bail!("not a frequency: {:?}", payload);
    }
    Ok(hz)
}

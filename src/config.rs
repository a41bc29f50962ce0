use crate::prelude::*;
use crate::cryomech::inverter::{InverterKind, MAX_FREQUENCY, MIN_FREQUENCY};
use crate::snapshot::READING_NAMES;

use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds, DurationSecondsWithFrac};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub compressors: Vec<Compressor>,

    #[serde(default = "Config::default_mqtt")]
    pub mqtt: Mqtt,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,

    /// Seconds between poll cycles.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "Config::default_logging_interval")]
    pub logging_interval: Duration,
}

// Compressor {{{
#[serde_as]
#[derive(Clone, Debug, Deserialize)]
pub struct Compressor {
    pub key: String,

    pub host: String,
    #[serde(default = "Config::default_modbus_port")]
    pub port: u16,

    /// Transport I/O timeout.
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    pub timeout: Option<Duration>,

    #[serde_as(as = "Option<DurationSecondsWithFrac<f64>>")]
    pub settle_delay: Option<Duration>,

    #[serde(default = "Vec::new")]
    pub logged_data: Vec<String>,

    pub inverter: Option<Inverter>,
}

impl Compressor {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn timeout(&self) -> Duration {
        self.timeout.unwrap_or(Duration::from_secs(3))
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay.unwrap_or(Duration::from_secs(1))
    }

    pub fn logged_data(&self) -> &[String] {
        &self.logged_data
    }

    pub fn inverter(&self) -> Option<&Inverter> {
        self.inverter.as_ref()
    }

    pub fn default_frequency(&self) -> Option<f64> {
        self.inverter.as_ref().and_then(|i| i.default_frequency)
    }
} // }}}

// Inverter {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Inverter {
    pub kind: InverterKind,

    /// Gateway host, or a /dev/tty* or COM* path for a direct serial line.
    pub address: Option<String>,
    #[serde(default = "Config::default_modbus_port")]
    pub port: u16,
    #[serde(default = "Config::default_baudrate")]
    pub baudrate: u32,

    pub default_frequency: Option<f64>,
}

impl Inverter {
    pub fn kind(&self) -> InverterKind {
        self.kind
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn baudrate(&self) -> u32 {
        self.baudrate
    }
} // }}}

// Mqtt {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Mqtt {
    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    #[serde(default = "Config::default_mqtt_host")]
    pub host: String,
    #[serde(default = "Config::default_mqtt_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,

    #[serde(default = "Config::default_mqtt_namespace")]
    pub namespace: String,

    #[serde(default = "Config::default_power_control_key")]
    pub power_control_key: String,
    #[serde(default = "Config::default_frequency_control_key")]
    pub frequency_control_key: String,
}

impl Mqtt {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn username(&self) -> &Option<String> {
        &self.username
    }

    pub fn password(&self) -> &Option<String> {
        &self.password
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn power_control_key(&self) -> &str {
        &self.power_control_key
    }

    pub fn frequency_control_key(&self) -> &str {
        &self.frequency_control_key
    }
} // }}}

pub struct ConfigWrapper {
    config: Arc<Mutex<Config>>,
}

impl Clone for ConfigWrapper {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
        }
    }
}

impl ConfigWrapper {
    pub fn new(file: String) -> Result<Self> {
        let config = Config::new(file)?;
        Ok(Self::from_config(config))
    }

    pub fn from_config(config: Config) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Config> {
        self.config
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn compressors(&self) -> Vec<Compressor> {
        self.lock().compressors.clone()
    }

    pub fn compressor_with_key(&self, key: &str) -> Option<Compressor> {
        self.compressors().into_iter().find(|c| c.key() == key)
    }

    pub fn mqtt(&self) -> Mqtt {
        self.lock().mqtt.clone()
    }

    pub fn loglevel(&self) -> String {
        self.lock().loglevel.clone()
    }

    pub fn logging_interval(&self) -> Duration {
        self.lock().logging_interval
    }

    pub fn log_summary(&self) {
        self.lock().log_summary()
    }
}

impl Config {
    pub fn new(file: String) -> Result<Self> {
        info!("Reading configuration from {}", file);
        let content = std::fs::read_to_string(&file)
            .map_err(|err| anyhow!("error reading {}: {}", file, err))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn log_summary(&self) {
        info!("Configuration loaded successfully:");
        info!("  Compressors: {} configured", self.compressors.len());
        for (i, c) in self.compressors.iter().enumerate() {
            info!("    Compressor[{}]:", i);
            info!("      Key: {}", c.key);
            info!("      Host: {}:{}", c.host, c.port);
            info!("      Timeout: {:?}", c.timeout());
            info!("      Settle Delay: {:?}", c.settle_delay());
            if let Some(inverter) = &c.inverter {
                info!(
                    "      Inverter: {} {}",
                    inverter.kind,
                    inverter.address.as_deref().unwrap_or("")
                );
                if let Some(hz) = inverter.default_frequency {
                    info!("      Default Frequency: {} Hz", hz);
                }
            }
        }

        info!("  MQTT: {}", if self.mqtt.enabled { "enabled" } else { "disabled" });
        if self.mqtt.enabled {
            info!("    Host: {}", self.mqtt.host);
            info!("    Port: {}", self.mqtt.port);
            info!("    Namespace: {}", self.mqtt.namespace);
        }

        info!("  Logging Interval: {:?}", self.logging_interval);
        info!("  Log Level: {}", self.loglevel);
    }

    fn validate(&self) -> Result<()> {
        if self.mqtt.enabled {
            if self.mqtt.port == 0 {
                bail!("mqtt.port must be between 1 and 65535");
            }
            if self.mqtt.host.is_empty() {
                bail!("mqtt.host cannot be empty");
            }
            if self.mqtt.power_control_key == self.mqtt.frequency_control_key {
                bail!("mqtt.power_control_key and mqtt.frequency_control_key must differ");
            }
        }

        if self.logging_interval.is_zero() {
            bail!("logging_interval must be at least 1 second");
        }

        let mut keys = HashSet::new();
        for (i, c) in self.compressors.iter().enumerate() {
            if c.key.is_empty() || c.key.contains('/') {
                bail!("compressors[{}].key must be non-empty and contain no '/'", i);
            }
            if !keys.insert(c.key.as_str()) {
                bail!("compressors[{}].key {} is used more than once", i, c.key);
            }
            if c.host.is_empty() {
                bail!("compressors[{}].host cannot be empty", i);
            }
            if c.port == 0 {
                bail!("compressors[{}].port must be between 1 and 65535", i);
            }
            if c.timeout.is_some_and(|t| t.is_zero()) {
                bail!("compressors[{}].timeout must be at least 1 second", i);
            }
            for name in &c.logged_data {
                if !READING_NAMES.contains(&name.as_str()) {
                    bail!("compressors[{}].logged_data: unknown reading {}", i, name);
                }
            }

            if let Some(inverter) = &c.inverter {
                if let Some(hz) = inverter.default_frequency {
                    if !(MIN_FREQUENCY..=MAX_FREQUENCY).contains(&hz) {
                        bail!(
                            "compressors[{}].inverter.default_frequency {} outside {}-{} Hz",
                            i,
                            hz,
                            MIN_FREQUENCY,
                            MAX_FREQUENCY
                        );
                    }
                }
                if inverter.kind == InverterKind::Rs485 {
                    if inverter.address.as_deref().map_or(true, str::is_empty) {
                        bail!("compressors[{}].inverter: rs485 needs an address", i);
                    }
                    if inverter.port == 0 {
                        bail!("compressors[{}].inverter.port must be between 1 and 65535", i);
                    }
                }
            }
        }

        Ok(())
    }

    fn default_mqtt() -> Mqtt {
        Mqtt {
            enabled: false,
            host: Self::default_mqtt_host(),
            port: Self::default_mqtt_port(),
            username: None,
            password: None,
            namespace: Self::default_mqtt_namespace(),
            power_control_key: Self::default_power_control_key(),
            frequency_control_key: Self::default_frequency_control_key(),
        }
    }

    fn default_mqtt_host() -> String {
        "localhost".to_string()
    }

    fn default_mqtt_port() -> u16 {
        1883
    }

    fn default_mqtt_namespace() -> String {
        "cryo".to_string()
    }

    fn default_power_control_key() -> String {
        "power".to_string()
    }

    fn default_frequency_control_key() -> String {
        "frequency".to_string()
    }

    fn default_modbus_port() -> u16 {
        502
    }

    fn default_baudrate() -> u32 {
        9600
    }

    fn default_enabled() -> bool {
        true
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }

    fn default_logging_interval() -> Duration {
        Duration::from_secs(10)
    }
}

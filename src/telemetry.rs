use crate::prelude::*;
use crate::snapshot::Reading;

use std::collections::BTreeMap;

pub type Units = BTreeMap<String, Option<&'static str>>;

/// The outbound half of the telemetry bus, as seen by the polling daemon.
pub trait Telemetry: Send + Sync {
    /// Publishes one cycle's readings for a compressor, with its comm status.
    fn publish_readings(&self, report: &SlotReport) -> Result<()>;

    /// Publishes unit metadata for a compressor's readings.
    fn publish_units(&self, key: &str, units: &Units) -> Result<()>;

    /// Reports that a command could not be applied.
    fn publish_failure(&self, command: &Command) -> Result<()>;

    /// Starts delivering commands for the given compressor keys.
    fn subscribe(&self, keys: &[String]) -> Result<()>;

    fn unsubscribe(&self, keys: &[String]) -> Result<()>;
}

/// Serializes a report as the flat `{name: [value, unit]}` object with the
/// comm status fields appended.
pub fn readings_payload(report: &SlotReport) -> Result<String> {
    let mut object = serde_json::Map::new();
    for (name, reading) in &report.readings {
        object.insert(name.clone(), serde_json::to_value(reading)?);
    }
    object.insert(
        "comm_status".to_string(),
        serde_json::Value::String(report.status.to_string()),
    );
    object.insert(
        "comm_error".to_string(),
        serde_json::Value::String(report.comm_error()),
    );
    Ok(serde_json::Value::Object(object).to_string())
}

/// Telemetry sink used when no bus is configured: readings go to the log.
#[derive(Default)]
pub struct LogTelemetry;

impl Telemetry for LogTelemetry {
    fn publish_readings(&self, report: &SlotReport) -> Result<()> {
        for (name, Reading { value, unit }) in &report.readings {
            info!(
                "{}: {} = {} {}",
                report.key,
                name,
                value,
                unit.unwrap_or_default()
            );
        }
        info!(
            "{}: comm_status = {}, comm_error = {}",
            report.key,
            report.status,
            report.comm_error()
        );
        Ok(())
    }

    fn publish_units(&self, key: &str, units: &Units) -> Result<()> {
        debug!("{}: units {:?}", key, units);
        Ok(())
    }

    fn publish_failure(&self, command: &Command) -> Result<()> {
        warn!("{} = FAIL", command.to_result_topic());
        Ok(())
    }

    fn subscribe(&self, _keys: &[String]) -> Result<()> {
        Ok(())
    }

    fn unsubscribe(&self, _keys: &[String]) -> Result<()> {
        Ok(())
    }
}

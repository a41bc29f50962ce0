pub use anyhow::{anyhow, bail, Result};
pub use log::{debug, error, info, trace, warn};
pub use std::io::Write;

pub use crate::command::{Command, CommandHandler};
pub use crate::config::{self, Config, ConfigWrapper};
pub use crate::daemon::{CommStatus, DeviceSlot, PollingDaemon, SlotReport};
pub use crate::mqtt;
pub use crate::options::Options;
pub use crate::telemetry::Telemetry;

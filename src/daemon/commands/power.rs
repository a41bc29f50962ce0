use crate::daemon::DeviceSlot;
use crate::error::Result;

use log::info;
use std::sync::Arc;

pub struct SetPower {
    slot: Arc<DeviceSlot>,
    on: bool,
}

impl SetPower {
    pub fn new(slot: Arc<DeviceSlot>, on: bool) -> Self {
        Self { slot, on }
    }

    pub fn run(&self) -> Result<()> {
        info!(
            "{}: turning compressor {}",
            self.slot.key(),
            if self.on { "on" } else { "off" }
        );

        self.slot.with_device(|compressor| {
            if self.on {
                compressor.on()
            } else {
                compressor.off()
            }
        })?;

        info!("{}: compressor is {}", self.slot.key(), self.slot_state());
        Ok(())
    }

    fn slot_state(&self) -> String {
        self.slot
            .lock()
            .as_ref()
            .map(|c| c.state().to_string())
            .unwrap_or_else(|| "disconnected".to_string())
    }
}

use crate::cryomech::inverter::check_frequency;
use crate::daemon::DeviceSlot;
use crate::error::Result;

use log::info;
use std::sync::Arc;

pub struct SetFrequency {
    slot: Arc<DeviceSlot>,
    hz: f64,
}

impl SetFrequency {
    pub fn new(slot: Arc<DeviceSlot>, hz: f64) -> Self {
        Self { slot, hz }
    }

    /// Range is checked before the hardware lock is taken.
    pub fn run(&self) -> Result<f64> {
        check_frequency(self.hz)?;

        info!("{}: setting inverter frequency to {} Hz", self.slot.key(), self.hz);
        let readback = self
            .slot
            .with_device(|compressor| compressor.set_inverter_frequency(self.hz))?;
        info!("{}: inverter frequency set to {} Hz", self.slot.key(), readback);

        Ok(readback)
    }
}

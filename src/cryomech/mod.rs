//! Cryomech compressor panel and inverter protocol.

pub mod codec;
pub mod compressor;
pub mod fault;
pub mod inverter;
pub mod model;
pub mod registers;
pub mod state;
pub mod units;

pub use codec::{RawRegisters, Value};
pub use compressor::{Compressor, CompressorBuilder, Status};
pub use fault::FaultSet;
pub use inverter::{Inverter, InverterKind, InverterLink, InverterReadings};
pub use model::{ModelCode, SoftwareRevision};
pub use registers::{Encoding, Entry, Firmware, Quantity, RegisterKind, RegisterMap};
pub use state::CompressorState;
pub use units::{PressureScale, TemperatureScale, Units};

use crate::error::Result;
use crate::transport::Transport;

pub(crate) fn read_entry(transport: &mut dyn Transport, entry: Entry) -> Result<Value> {
    let count = entry.encoding.word_count();
    let words = match entry.kind {
        RegisterKind::Input => transport.read_input_registers(entry.address, count)?,
        RegisterKind::Holding => transport.read_holding_registers(entry.address, count)?,
    };
    RawRegisters::new(count, words).decode(entry.encoding)
}

pub(crate) fn write_entry(transport: &mut dyn Transport, entry: Entry, value: f64) -> Result<()> {
    let words = codec::encode(value, entry.encoding)?;
    transport.write_registers(entry.address, &words)
}

#![allow(dead_code)]

use cryo_bridge::cryomech::{Compressor, InverterLink};
use cryo_bridge::error::{Error, Result as DeviceResult};
use cryo_bridge::prelude::*;
use cryo_bridge::retry::RetryPolicy;
use cryo_bridge::telemetry::Units;
use cryo_bridge::transport::Transport;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::Duration;

pub fn common_setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Op {
    ReadInput(u16, u16),
    ReadHolding(u16, u16),
    Write(u16, Vec<u16>),
}

/// In-memory register space of one Modbus unit.
#[derive(Debug, Default)]
pub struct MockDevice {
    pub input: HashMap<u16, u16>,
    pub holding: HashMap<u16, u16>,
    /// every register operation, with the thread that issued it
    pub ops: Vec<(ThreadId, Op)>,
    /// the next N reads fail at the transport level
    pub fail_reads: u32,
    pub fail_writes: u32,
    pub refuse_connect: bool,
    pub connects: u32,
    /// holding registers that ignore writes
    pub stuck: HashSet<u16>,
    /// state the panel moves to when the start / stop code is written
    pub start_state: Option<u16>,
    pub stop_state: Option<u16>,
    /// time each operation takes once recorded
    pub op_delay: Duration,
}

impl MockDevice {
    pub fn set_input_i32(&mut self, address: u16, value: i32) {
        let raw = value as u32;
        self.input.insert(address, (raw & 0xffff) as u16);
        self.input.insert(address + 1, (raw >> 16) as u16);
    }

    pub fn set_input_f32(&mut self, address: u16, value: f32) {
        let raw = value.to_bits();
        self.input.insert(address, (raw & 0xffff) as u16);
        self.input.insert(address + 1, (raw >> 16) as u16);
    }

    pub fn writes(&self) -> Vec<Op> {
        self.ops
            .iter()
            .filter(|(_, op)| matches!(op, Op::Write(..)))
            .map(|(_, op)| op.clone())
            .collect()
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }
}

pub type SharedDevice = Arc<Mutex<MockDevice>>;

pub struct MockTransport {
    name: String,
    device: SharedDevice,
    connected: bool,
}

impl MockTransport {
    pub fn new(name: &str, device: &SharedDevice) -> Self {
        Self {
            name: name.to_string(),
            device: device.clone(),
            connected: false,
        }
    }

    fn io_error(operation: String) -> Error {
        Error::io(
            operation,
            std::io::Error::new(std::io::ErrorKind::TimedOut, "mock timeout"),
        )
    }

    fn read(&mut self, op: Op, address: u16, count: u16) -> DeviceResult<Vec<u16>> {
        let delay = {
            let mut device = self.device.lock().unwrap();
            if device.fail_reads > 0 {
                device.fail_reads -= 1;
                return Err(Self::io_error(format!("{:?}", op)));
            }
            let registers = match op {
                Op::ReadInput(..) => &device.input,
                _ => &device.holding,
            };
            let words = (address..address + count)
                .map(|a| registers.get(&a).copied().unwrap_or(0))
                .collect::<Vec<u16>>();
            device.ops.push((std::thread::current().id(), op));
            (device.op_delay, words)
        };

        std::thread::sleep(delay.0);
        Ok(delay.1)
    }
}

impl Transport for MockTransport {
    fn target(&self) -> String {
        self.name.clone()
    }

    fn connect(&mut self) -> DeviceResult<()> {
        let mut device = self.device.lock().unwrap();
        if device.refuse_connect {
            return Err(Error::Connect {
                target: self.name.clone(),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            });
        }
        device.connects += 1;
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn read_input_registers(&mut self, address: u16, count: u16) -> DeviceResult<Vec<u16>> {
        self.read(Op::ReadInput(address, count), address, count)
    }

    fn read_holding_registers(&mut self, address: u16, count: u16) -> DeviceResult<Vec<u16>> {
        self.read(Op::ReadHolding(address, count), address, count)
    }

    fn write_registers(&mut self, address: u16, values: &[u16]) -> DeviceResult<()> {
        let delay = {
            let mut device = self.device.lock().unwrap();
            let op = Op::Write(address, values.to_vec());
            if device.fail_writes > 0 {
                device.fail_writes -= 1;
                return Err(Self::io_error(format!("{:?}", op)));
            }
            device.ops.push((std::thread::current().id(), op));

            if !device.stuck.contains(&address) {
                for (offset, value) in values.iter().enumerate() {
                    device.holding.insert(address + offset as u16, *value);
                }
            }
            if address == 1 {
                let next = match values {
                    [0x0001] => device.start_state,
                    [0x00FF] => device.stop_state,
                    _ => None,
                };
                if let Some(state) = next {
                    device.input.insert(1, state);
                }
            }
            device.op_delay
        };

        std::thread::sleep(delay);
        Ok(())
    }
}

/// Telemetry double that keeps everything it is asked to publish.
#[derive(Default)]
pub struct RecordingTelemetry {
    pub readings: Mutex<Vec<SlotReport>>,
    pub units: Mutex<Vec<(String, Units)>>,
    pub failures: Mutex<Vec<Command>>,
    pub subscribed: Mutex<Vec<String>>,
}

impl RecordingTelemetry {
    pub fn readings(&self) -> Vec<SlotReport> {
        self.readings.lock().unwrap().clone()
    }

    pub fn failures(&self) -> Vec<Command> {
        self.failures.lock().unwrap().clone()
    }

    pub fn subscribed(&self) -> Vec<String> {
        self.subscribed.lock().unwrap().clone()
    }
}

impl Telemetry for RecordingTelemetry {
    fn publish_readings(&self, report: &SlotReport) -> Result<()> {
        self.readings.lock().unwrap().push(report.clone());
        Ok(())
    }

    fn publish_units(&self, key: &str, units: &Units) -> Result<()> {
        self.units
            .lock()
            .unwrap()
            .push((key.to_string(), units.clone()));
        Ok(())
    }

    fn publish_failure(&self, command: &Command) -> Result<()> {
        self.failures.lock().unwrap().push(command.clone());
        Ok(())
    }

    fn subscribe(&self, keys: &[String]) -> Result<()> {
        self.subscribed.lock().unwrap().extend(keys.iter().cloned());
        Ok(())
    }

    fn unsubscribe(&self, keys: &[String]) -> Result<()> {
        self.subscribed.lock().unwrap().retain(|k| !keys.contains(k));
        Ok(())
    }
}

pub struct Factory();
impl Factory {
    /// v3 panel, CPA0801 ser. 1234, software 3.1, PSI / Fahrenheit, ready.
    pub fn v3_device() -> SharedDevice {
        let mut device = MockDevice {
            start_state: Some(2),
            stop_state: Some(0),
            ..MockDevice::default()
        };

        device.input.insert(31, 1234);
        device.input.insert(32, 0x0102);
        device.input.insert(33, 0x0301);
        device.input.insert(29, 0);
        device.input.insert(30, 0);

        device.input.insert(1, 0);
        device.input.insert(2, 1);
        device.set_input_i32(52, 0);
        device.set_input_i32(54, 0);

        for (address, value) in [
            (40, 650), // coolant in
            (41, 780), // coolant out
            (42, 950), // oil
            (43, 1400), // helium
            (44, 1050), // low pressure
            (45, 1049),
            (46, 3000), // high pressure
            (47, 2998),
            (48, 1949),
            (49, 125), // motor current
        ] {
            device.input.insert(address, value);
        }
        device.set_input_i32(50, 123_456);
        device.input.insert(34, 7200);

        device.holding.insert(3, 600);

        Arc::new(Mutex::new(device))
    }

    /// v2 panel, software 2.5; every value is a float.
    pub fn v2_device() -> SharedDevice {
        let mut device = MockDevice {
            start_state: None,
            stop_state: None,
            ..MockDevice::default()
        };

        device.input.insert(31, 42);
        device.input.insert(32, 0x0301);
        device.input.insert(33, 0x0205);
        device.set_input_f32(29, 0.0);

        device.set_input_f32(3, -5.0);
        device.set_input_f32(5, 0.0);
        device.set_input_f32(7, 65.5);
        device.set_input_f32(9, 78.25);
        device.set_input_f32(11, 95.0);
        device.set_input_f32(13, 140.0);
        device.set_input_f32(15, 105.0);
        device.set_input_f32(17, 104.5);
        device.set_input_f32(19, 300.0);
        device.set_input_f32(21, 299.5);
        device.set_input_f32(23, 195.0);
        device.set_input_f32(25, 12.5);
        device.set_input_f32(27, 20000.0);

        Arc::new(Mutex::new(device))
    }

    /// v3 CPA28I6, inverter at 60.0 Hz drawing 12.3 A.
    pub fn cpa28i6_device() -> SharedDevice {
        let device = Self::v3_device();
        {
            let mut d = device.lock().unwrap();
            d.input.insert(32, 0x050B);
            d.input.insert(36, 600);
            d.input.insert(37, 123);
        }
        device
    }

    /// rs485 drive set to 60.00 Hz.
    pub fn rs485_device() -> SharedDevice {
        let mut device = MockDevice::default();
        device.holding.insert(0x0001, 6000);
        device.holding.insert(0x1001, 5998);
        device.holding.insert(0x1002, 52);
        device.holding.insert(0x1010, 2080);
        device.holding.insert(0x1011, 35);
        Arc::new(Mutex::new(device))
    }

    pub fn retry() -> RetryPolicy {
        RetryPolicy::immediate(3)
    }

    pub fn compressor_with(device: &SharedDevice, inverter: InverterLink) -> Compressor {
        Compressor::builder(Box::new(MockTransport::new("compressor", device)))
            .settle_delay(Duration::ZERO)
            .set_delay(Duration::ZERO)
            .retry(Self::retry())
            .inverter(inverter)
            .connect()
            .unwrap()
    }

    pub fn compressor(device: &SharedDevice) -> Compressor {
        Self::compressor_with(device, InverterLink::None)
    }

    pub fn slot(key: &str, device: &SharedDevice) -> DeviceSlot {
        Self::slot_with_retry(key, device, Self::retry())
    }

    pub fn slot_with_retry(key: &str, device: &SharedDevice, retry: RetryPolicy) -> DeviceSlot {
        let device = device.clone();
        DeviceSlot::new(key, move || {
            Compressor::builder(Box::new(MockTransport::new("compressor", &device)))
                .settle_delay(Duration::ZERO)
                .set_delay(Duration::ZERO)
                .retry(retry.clone())
                .connect()
        })
    }

    pub fn config_yaml() -> &'static str {
        r#"
loglevel: debug
logging_interval: 5
mqtt:
  host: broker.local
  namespace: lab
compressors:
  - key: cp1
    host: 192.168.42.10
    timeout: 2
    settle_delay: 0.5
    logged_data: [state, coolant_in, helium_temp, inverter_frequency]
    inverter:
      kind: rs485
      address: /dev/ttyUSB0
      baudrate: 19200
      default_frequency: 55.0
  - key: cp2
    host: 192.168.42.11
    port: 5020
"#
    }
}

use crate::error::{Error, Result};

use log::{debug, info, trace, warn};
use std::net::ToSocketAddrs;
use std::time::Duration;
use tokio_modbus::client::sync;
use tokio_modbus::prelude::{Slave, SyncReader, SyncWriter};

/// Every device on the bus is addressed as unit 1.
pub const UNIT_ID: u8 = 1;

/// Register-level access to one Modbus device.
///
/// Implementations are not safe for concurrent use; callers serialize access
/// through the owning device's lock.
pub trait Transport: Send {
    /// Human readable description of the remote end, for logs and errors.
    fn target(&self) -> String;

    fn connect(&mut self) -> Result<()>;
    fn disconnect(&mut self);
    fn is_connected(&self) -> bool;

    fn read_input_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>>;
    fn read_holding_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>>;
    fn write_registers(&mut self, address: u16, values: &[u16]) -> Result<()>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Serial { path: String, baudrate: u32 },
}

impl Endpoint {
    /// Serial device paths are recognised by their `/dev/` or `COM` prefix,
    /// anything else is treated as a TCP host (e.g. a serial-to-ethernet gateway).
    pub fn from_address(address: &str, port: u16, baudrate: u32) -> Self {
        if address.starts_with("/dev/") || address.starts_with("COM") {
            Endpoint::Serial {
                path: address.to_string(),
                baudrate,
            }
        } else {
            Endpoint::Tcp {
                host: address.to_string(),
                port,
            }
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Endpoint::Serial { path, baudrate } => write!(f, "{}@{}", path, baudrate),
        }
    }
}

/// [`Transport`] backed by the synchronous `tokio-modbus` client.
///
/// A transport or protocol failure drops the underlying context, the next
/// register operation reconnects before issuing its request.
pub struct ModbusTransport {
    endpoint: Endpoint,
    timeout: Duration,
    context: Option<sync::Context>,
}

impl ModbusTransport {
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Self {
        Self {
            endpoint,
            timeout,
            context: None,
        }
    }

    fn open(&self) -> std::io::Result<sync::Context> {
        let slave = Slave(UNIT_ID);
        let mut context = match &self.endpoint {
            Endpoint::Tcp { host, port } => {
                let address = (host.as_str(), *port).to_socket_addrs()?.next().ok_or_else(|| {
                    std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("{} did not resolve to any address", host),
                    )
                })?;
                sync::tcp::connect_slave(address, slave)?
            }
            // the inverter's RS485 port is configured 8O1
            Endpoint::Serial { path, baudrate } => {
                let builder = tokio_serial::new(path.as_str(), *baudrate)
                    .data_bits(tokio_serial::DataBits::Eight)
                    .parity(tokio_serial::Parity::Odd)
                    .stop_bits(tokio_serial::StopBits::One);
                sync::rtu::connect_slave(&builder, slave)?
            }
        };
        context.set_timeout(Some(self.timeout));
        Ok(context)
    }

    fn close(&mut self) -> bool {
        match self.context.take() {
            Some(context) => {
                release(context);
                true
            }
            None => false,
        }
    }

    fn context(&mut self) -> Result<&mut sync::Context> {
        if self.context.is_none() {
            self.connect()?;
        }
        self.context
            .as_mut()
            .ok_or_else(|| Error::NotConnected(self.endpoint.to_string()))
    }

    fn unwrap_reply<T>(&mut self, operation: String, reply: tokio_modbus::Result<T>) -> Result<T> {
        match reply {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(code)) => Err(Error::Exception {
                operation,
                code: format!("{:?}", code),
            }),
            Err(tokio_modbus::Error::Transport(source)) => {
                warn!("{}: {} failed, dropping connection: {}", self.endpoint, operation, source);
                self.close();
                Err(Error::io(operation, source))
            }
            // a late reply to a timed out request leaves the stream out of step
            Err(tokio_modbus::Error::Protocol(err)) => {
                warn!("{}: {} got a bad reply, dropping connection: {:?}", self.endpoint, operation, err);
                self.close();
                Err(Error::Decode(format!("{}: {:?}", operation, err)))
            }
        }
    }

    fn check_count(operation: String, expected: u16, words: Vec<u16>) -> Result<Vec<u16>> {
        if words.len() != usize::from(expected) {
            return Err(Error::RegisterCount {
                operation,
                expected: expected.into(),
                got: words.len(),
            });
        }
        Ok(words)
    }
}

impl Drop for ModbusTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Drops a sync context. It owns a tokio runtime, and a runtime must not be
/// dropped on an async task, so when one is running the drop happens on a
/// short-lived thread instead.
fn release(context: sync::Context) {
    if tokio::runtime::Handle::try_current().is_err() {
        drop(context);
        return;
    }
    if let Err(err) = std::thread::Builder::new()
        .name("modbus-close".to_string())
        .spawn(move || drop(context))
    {
        warn!("could not spawn thread to close modbus context: {}", err);
    }
}

impl Transport for ModbusTransport {
    fn target(&self) -> String {
        self.endpoint.to_string()
    }

    fn connect(&mut self) -> Result<()> {
        info!("connecting to {}", self.endpoint);
        let context = self.open().map_err(|source| Error::Connect {
            target: self.endpoint.to_string(),
            source,
        })?;
        self.close();
        self.context = Some(context);
        info!("connected to {}", self.endpoint);
        Ok(())
    }

    fn disconnect(&mut self) {
        if self.close() {
            info!("disconnected from {}", self.endpoint);
        }
    }

    fn is_connected(&self) -> bool {
        self.context.is_some()
    }

    fn read_input_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>> {
        let operation = format!("read input {}x{}", address, count);
        trace!("{}: {}", self.endpoint, operation);
        let reply = self.context()?.read_input_registers(address, count);
        let words = self.unwrap_reply(operation.clone(), reply)?;
        Self::check_count(operation, count, words)
    }

    fn read_holding_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>> {
        let operation = format!("read holding {}x{}", address, count);
        trace!("{}: {}", self.endpoint, operation);
        let reply = self.context()?.read_holding_registers(address, count);
        let words = self.unwrap_reply(operation.clone(), reply)?;
        Self::check_count(operation, count, words)
    }

    fn write_registers(&mut self, address: u16, values: &[u16]) -> Result<()> {
        let operation = format!("write holding {} = {:?}", address, values);
        debug!("{}: {}", self.endpoint, operation);
        let reply = self.context()?.write_multiple_registers(address, values);
        self.unwrap_reply(operation, reply)
    }
}

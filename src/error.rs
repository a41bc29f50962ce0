/// Closed classification of device-layer failures.
///
/// Retry decisions are made on this kind, never on the concrete error value.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// The transport could not be established at all.
    Connection,
    /// A read or write failed at the transport level.
    TransientIo,
    /// The device answered with a well-formed Modbus exception.
    Exception,
    /// The reply was malformed or had the wrong register count.
    Decode,
    /// The command was refused before touching the hardware.
    CommandRejected,
    /// The write was accepted but the device never reached the expected state.
    ConfirmationTimeout,
    /// The quantity is absent from the selected register map.
    Unsupported,
}

impl ErrorKind {
    pub fn is_transient(self) -> bool {
        self == ErrorKind::TransientIo
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not connect to {target}")]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no device connected for {0}")]
    NotConnected(String),
    #[error("{operation} failed at the transport level")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{operation} answered with modbus exception {code}")]
    Exception { operation: String, code: String },
    #[error("{operation} returned {got} registers, expected {expected}")]
    RegisterCount {
        operation: String,
        expected: usize,
        got: usize,
    },
    #[error("could not decode {0}")]
    Decode(String),
    #[error("command rejected: {0}")]
    CommandRejected(String),
    #[error("{operation} not confirmed: device reports {observed} (fault code {fault_code})")]
    ConfirmationTimeout {
        operation: String,
        observed: String,
        fault_code: i32,
    },
    #[error("{0} is not supported by this firmware")]
    Unsupported(&'static str),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connect { .. } | Error::NotConnected(_) => ErrorKind::Connection,
            Error::Io { .. } => ErrorKind::TransientIo,
            Error::Exception { .. } => ErrorKind::Exception,
            Error::RegisterCount { .. } | Error::Decode(_) => ErrorKind::Decode,
            Error::CommandRejected(_) => ErrorKind::CommandRejected,
            Error::ConfirmationTimeout { .. } => ErrorKind::ConfirmationTimeout,
            Error::Unsupported(_) => ErrorKind::Unsupported,
        }
    }

    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            operation: operation.into(),
            source,
        }
    }

    pub(crate) fn not_confirmed(
        operation: impl Into<String>,
        observed: impl std::fmt::Display,
        fault_code: i32,
    ) -> Self {
        Error::ConfirmationTimeout {
            operation: operation.into(),
            observed: observed.to_string(),
            fault_code,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

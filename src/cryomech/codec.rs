//! Register word decoding.
//!
//! Bytes are big-endian within a word. Two-word values put the low word
//! first, which is the order the compressor panel and the inverter both use.

use crate::cryomech::registers::Encoding;
use crate::error::{Error, Result};

use serde::Serialize;

/// Words returned by one read, tagged with the count that was requested.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RawRegisters {
    pub requested: u16,
    pub words: Vec<u16>,
}

impl RawRegisters {
    pub fn new(requested: u16, words: Vec<u16>) -> Self {
        Self { requested, words }
    }

    fn check(&self, operation: &str) -> Result<()> {
        if self.words.len() != usize::from(self.requested) {
            return Err(Error::RegisterCount {
                operation: operation.to_string(),
                expected: self.requested.into(),
                got: self.words.len(),
            });
        }
        Ok(())
    }

    pub fn decode(&self, encoding: Encoding) -> Result<Value> {
        self.check("decode")?;
        decode(&self.words, encoding)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
}

impl Value {
    pub fn as_f64(self) -> f64 {
        match self {
            Value::Int(i) => i as f64,
            Value::Float(f) => f,
        }
    }

    /// Truncates towards zero; v2 firmware reports integer codes as floats.
    pub fn as_i64(self) -> i64 {
        match self {
            Value::Int(i) => i,
            Value::Float(f) => f.trunc() as i64,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{:.2}", v),
        }
    }
}

fn join(low: u16, high: u16) -> u32 {
    (u32::from(high) << 16) | u32::from(low)
}

fn split(value: u32) -> [u16; 2] {
    [(value & 0xffff) as u16, (value >> 16) as u16]
}

fn scaled(raw: i64, divisor: u16) -> Value {
    if divisor == 1 {
        Value::Int(raw)
    } else {
        Value::Float(raw as f64 / f64::from(divisor))
    }
}

pub fn decode(words: &[u16], encoding: Encoding) -> Result<Value> {
    let expected = usize::from(encoding.word_count());
    if words.len() != expected {
        return Err(Error::RegisterCount {
            operation: format!("decode {:?}", encoding),
            expected,
            got: words.len(),
        });
    }

    let value = match encoding {
        Encoding::Float32 => {
            let f = f32::from_bits(join(words[0], words[1]));
            if !f.is_finite() {
                return Err(Error::Decode(format!("non-finite float {:?}", words)));
            }
            Value::Float(f64::from(f))
        }
        Encoding::Int16(divisor) => scaled(i64::from(words[0] as i16), divisor),
        Encoding::Int32(divisor) => scaled(i64::from(join(words[0], words[1]) as i32), divisor),
    };

    Ok(value)
}

/// Converts a physical value into register words, rounding to the nearest
/// representable step.
pub fn encode(value: f64, encoding: Encoding) -> Result<Vec<u16>> {
    if !value.is_finite() {
        return Err(Error::Decode(format!("cannot encode {}", value)));
    }

    let words = match encoding {
        Encoding::Float32 => split((value as f32).to_bits()).to_vec(),
        Encoding::Int16(divisor) => {
            let raw = (value * f64::from(divisor)).round();
            if raw < f64::from(i16::MIN) || raw > f64::from(i16::MAX) {
                return Err(Error::Decode(format!("{} does not fit {:?}", value, encoding)));
            }
            vec![raw as i16 as u16]
        }
        Encoding::Int32(divisor) => {
            let raw = (value * f64::from(divisor)).round();
            if raw < f64::from(i32::MIN) || raw > f64::from(i32::MAX) {
                return Err(Error::Decode(format!("{} does not fit {:?}", value, encoding)));
            }
            split(raw as i32 as u32).to_vec()
        }
    };

    Ok(words)
}

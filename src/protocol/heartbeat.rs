//! Device-declared binary layout for heartbeat telemetry
//!
//! Devices advertise their heartbeat layout as a struct-style format string in
//! their introduction, for example `BBBI`. The first character describes the
//! command byte (or is a byte-order marker) and is discarded; the remaining
//! codes describe the payload fields in order. All fields are little-endian
//! with standard sizes and no alignment padding.

use std::fmt;
use thiserror::Error;

/// Largest heartbeat payload a format may describe, in bytes
pub const MAX_HEARTBEAT_SIZE: usize = 1024;

/// One primitive field of a heartbeat payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Pad,
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl FieldKind {
    fn from_code(code: char) -> Option<Self> {
        let kind = match code {
            'x' => FieldKind::Pad,
            '?' => FieldKind::Bool,
            'b' => FieldKind::I8,
            'B' => FieldKind::U8,
            'h' => FieldKind::I16,
            'H' => FieldKind::U16,
            'i' | 'l' => FieldKind::I32,
            'I' | 'L' => FieldKind::U32,
            'q' => FieldKind::I64,
            'Q' => FieldKind::U64,
            'f' => FieldKind::F32,
            'd' => FieldKind::F64,
            _ => return None,
        };
        Some(kind)
    }

    /// Width in bytes
    pub fn size(self) -> usize {
        match self {
            FieldKind::Pad | FieldKind::Bool | FieldKind::I8 | FieldKind::U8 => 1,
            FieldKind::I16 | FieldKind::U16 => 2,
            FieldKind::I32 | FieldKind::U32 | FieldKind::F32 => 4,
            FieldKind::I64 | FieldKind::U64 | FieldKind::F64 => 8,
        }
    }

    fn integer_range(self) -> Option<(i128, i128)> {
        match self {
            FieldKind::I8 => Some((i8::MIN as i128, i8::MAX as i128)),
            FieldKind::U8 => Some((0, u8::MAX as i128)),
            FieldKind::I16 => Some((i16::MIN as i128, i16::MAX as i128)),
            FieldKind::U16 => Some((0, u16::MAX as i128)),
            FieldKind::I32 => Some((i32::MIN as i128, i32::MAX as i128)),
            FieldKind::U32 => Some((0, u32::MAX as i128)),
            FieldKind::I64 => Some((i64::MIN as i128, i64::MAX as i128)),
            FieldKind::U64 => Some((0, u64::MAX as i128)),
            _ => None,
        }
    }
}

/// A decoded heartbeat field value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HeartbeatValue {
    Int(i128),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for HeartbeatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeartbeatValue::Int(v) => write!(f, "{v}"),
            // Debug keeps the trailing ".0" on whole numbers
            HeartbeatValue::Float(v) => write!(f, "{v:?}"),
            HeartbeatValue::Bool(true) => f.write_str("True"),
            HeartbeatValue::Bool(false) => f.write_str("False"),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum FormatError {
    #[error("Heartbeat format is empty")]
    Empty,
    #[error("Unsupported heartbeat field code '{0}'")]
    UnsupportedCode(char),
    #[error("Repeat count without a field code")]
    DanglingCount,
    #[error("Heartbeat layout exceeds {MAX_HEARTBEAT_SIZE} bytes")]
    TooLarge,
}

/// Parsed heartbeat layout, cached per device
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatFormat {
    advertised: String,
    fields: Vec<FieldKind>,
}

impl HeartbeatFormat {
    /// Parse an advertised format string, discarding its first character
    pub fn parse(advertised: &str) -> Result<Self, FormatError> {
        let mut chars = advertised.chars();
        if chars.next().is_none() {
            return Err(FormatError::Empty);
        }

        let mut fields = Vec::new();
        let mut size = 0usize;
        let mut count: Option<usize> = None;
        for code in chars {
            if let Some(digit) = code.to_digit(10) {
                let next = count
                    .unwrap_or(0)
                    .checked_mul(10)
                    .and_then(|c| c.checked_add(digit as usize))
                    .filter(|c| *c <= MAX_HEARTBEAT_SIZE)
                    .ok_or(FormatError::TooLarge)?;
                count = Some(next);
                continue;
            }
            let kind = FieldKind::from_code(code).ok_or(FormatError::UnsupportedCode(code))?;
            let repeat = count.take().unwrap_or(1);
            size += repeat * kind.size();
            if size > MAX_HEARTBEAT_SIZE {
                return Err(FormatError::TooLarge);
            }
            fields.extend(std::iter::repeat(kind).take(repeat));
        }
        if count.is_some() {
            return Err(FormatError::DanglingCount);
        }

        Ok(Self {
            advertised: advertised.to_string(),
            fields,
        })
    }

    /// The format string exactly as the device advertised it
    pub fn advertised(&self) -> &str {
        &self.advertised
    }

    pub fn fields(&self) -> &[FieldKind] {
        &self.fields
    }

    /// Expected payload size in bytes
    pub fn size(&self) -> usize {
        self.fields.iter().map(|f| f.size()).sum()
    }

    /// Number of fields that carry a value (padding excluded)
    pub fn value_count(&self) -> usize {
        self.fields.iter().filter(|f| **f != FieldKind::Pad).count()
    }

    /// Decode a payload, returning `None` unless its length equals [`size`](Self::size)
    pub fn decode(&self, payload: &[u8]) -> Option<Vec<HeartbeatValue>> {
        if payload.len() != self.size() {
            return None;
        }

        let mut values = Vec::with_capacity(self.fields.len());
        let mut offset = 0;
        for kind in &self.fields {
            let bytes = &payload[offset..offset + kind.size()];
            offset += kind.size();
            let value = match kind {
                FieldKind::Pad => continue,
                FieldKind::Bool => HeartbeatValue::Bool(bytes[0] != 0),
                FieldKind::I8 => HeartbeatValue::Int(bytes[0] as i8 as i128),
                FieldKind::U8 => HeartbeatValue::Int(bytes[0] as i128),
                FieldKind::I16 => HeartbeatValue::Int(i16::from_le_bytes(bytes.try_into().ok()?) as i128),
                FieldKind::U16 => HeartbeatValue::Int(u16::from_le_bytes(bytes.try_into().ok()?) as i128),
                FieldKind::I32 => HeartbeatValue::Int(i32::from_le_bytes(bytes.try_into().ok()?) as i128),
                FieldKind::U32 => HeartbeatValue::Int(u32::from_le_bytes(bytes.try_into().ok()?) as i128),
                FieldKind::I64 => HeartbeatValue::Int(i64::from_le_bytes(bytes.try_into().ok()?) as i128),
                FieldKind::U64 => HeartbeatValue::Int(u64::from_le_bytes(bytes.try_into().ok()?) as i128),
                FieldKind::F32 => HeartbeatValue::Float(f32::from_le_bytes(bytes.try_into().ok()?) as f64),
                FieldKind::F64 => HeartbeatValue::Float(f64::from_le_bytes(bytes.try_into().ok()?)),
            };
            values.push(value);
        }
        Some(values)
    }

    /// Pack textual values into a payload.
    ///
    /// Returns `None` when the value count differs from the layout, a value
    /// does not parse, or an integer is out of range for its field.
    pub fn encode(&self, values: &[&str]) -> Option<Vec<u8>> {
        if values.len() != self.value_count() {
            return None;
        }

        let mut out = Vec::with_capacity(self.size());
        let mut values = values.iter().map(|v| v.trim());
        for kind in &self.fields {
            match kind {
                FieldKind::Pad => out.push(0),
                FieldKind::Bool => {
                    let flag = match values.next()? {
                        "True" | "true" | "1" => true,
                        "False" | "false" | "0" => false,
                        _ => return None,
                    };
                    out.push(flag as u8);
                }
                FieldKind::F32 => {
                    let v: f64 = values.next()?.parse().ok()?;
                    out.extend_from_slice(&(v as f32).to_le_bytes());
                }
                FieldKind::F64 => {
                    let v: f64 = values.next()?.parse().ok()?;
                    out.extend_from_slice(&v.to_le_bytes());
                }
                integer => {
                    let v: i128 = values.next()?.parse().ok()?;
                    let (min, max) = integer.integer_range()?;
                    if v < min || v > max {
                        return None;
                    }
                    out.extend_from_slice(&v.to_le_bytes()[..integer.size()]);
                }
            }
        }
        Some(out)
    }
}

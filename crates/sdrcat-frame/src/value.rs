//! Typed-value codec.
//!
//! Integers are fixed-width big-endian two's complement, floats are IEEE-754
//! big-endian, complex values are a real/imaginary float pair of the matching
//! width. `raw` and `utf8` have no vector form: the whole byte span is one
//! value.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use num_complex::{Complex32, Complex64};
use serde::Serialize;

use crate::error::{FrameError, Result};
use crate::types::DataType;

/// A single typed value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Raw(Vec<u8>),
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    C64(Complex32),
    C128(Complex64),
    Utf8(String),
}

/// A vector of typed values sharing one data type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Values {
    Raw(Vec<u8>),
    U8(Vec<u8>),
    I8(Vec<i8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    U64(Vec<u64>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    C64(Vec<Complex32>),
    C128(Vec<Complex64>),
    Utf8(String),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Raw(_) => DataType::Raw,
            Self::U8(_) => DataType::Uint8,
            Self::I8(_) => DataType::Sint8,
            Self::U16(_) => DataType::Uint16,
            Self::I16(_) => DataType::Sint16,
            Self::U32(_) => DataType::Uint32,
            Self::I32(_) => DataType::Sint32,
            Self::U64(_) => DataType::Uint64,
            Self::I64(_) => DataType::Sint64,
            Self::F32(_) => DataType::Float32,
            Self::F64(_) => DataType::Float64,
            Self::C64(_) => DataType::Complex64,
            Self::C128(_) => DataType::Complex128,
            Self::Utf8(_) => DataType::Utf8,
        }
    }

    /// Parse console text as a value of `data_type`.
    ///
    /// Integers are decimal, complex values are written `re,im`, raw bytes
    /// are hex digits (whitespace ignored).
    pub fn parse(data_type: DataType, text: &str) -> Result<Self> {
        let t = text.trim();
        let value = match data_type {
            DataType::Raw => Self::Raw(parse_hex(t)?),
            DataType::Utf8 => Self::Utf8(text.to_string()),
            DataType::Uint8 => Self::U8(parse_num(data_type, t)?),
            DataType::Sint8 => Self::I8(parse_num(data_type, t)?),
            DataType::Uint16 => Self::U16(parse_num(data_type, t)?),
            DataType::Sint16 => Self::I16(parse_num(data_type, t)?),
            DataType::Uint32 => Self::U32(parse_num(data_type, t)?),
            DataType::Sint32 => Self::I32(parse_num(data_type, t)?),
            DataType::Uint64 => Self::U64(parse_num(data_type, t)?),
            DataType::Sint64 => Self::I64(parse_num(data_type, t)?),
            DataType::Float32 => Self::F32(parse_num(data_type, t)?),
            DataType::Float64 => Self::F64(parse_num(data_type, t)?),
            DataType::Complex64 => {
                let (re, im) = parse_complex_parts(data_type, t)?;
                Self::C64(Complex32::new(
                    parse_num(data_type, re)?,
                    parse_num(data_type, im)?,
                ))
            }
            DataType::Complex128 => {
                let (re, im) = parse_complex_parts(data_type, t)?;
                Self::C128(Complex64::new(
                    parse_num(data_type, re)?,
                    parse_num(data_type, im)?,
                ))
            }
        };
        Ok(value)
    }
}

impl Values {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Raw(_) => DataType::Raw,
            Self::U8(_) => DataType::Uint8,
            Self::I8(_) => DataType::Sint8,
            Self::U16(_) => DataType::Uint16,
            Self::I16(_) => DataType::Sint16,
            Self::U32(_) => DataType::Uint32,
            Self::I32(_) => DataType::Sint32,
            Self::U64(_) => DataType::Uint64,
            Self::I64(_) => DataType::Sint64,
            Self::F32(_) => DataType::Float32,
            Self::F64(_) => DataType::Float64,
            Self::C64(_) => DataType::Complex64,
            Self::C128(_) => DataType::Complex128,
            Self::Utf8(_) => DataType::Utf8,
        }
    }

    /// Number of items. `raw` counts bytes, `utf8` counts one string.
    pub fn len(&self) -> usize {
        match self {
            Self::Raw(v) | Self::U8(v) => v.len(),
            Self::I8(v) => v.len(),
            Self::U16(v) => v.len(),
            Self::I16(v) => v.len(),
            Self::U32(v) => v.len(),
            Self::I32(v) => v.len(),
            Self::U64(v) => v.len(),
            Self::I64(v) => v.len(),
            Self::F32(v) => v.len(),
            Self::F64(v) => v.len(),
            Self::C64(v) => v.len(),
            Self::C128(v) => v.len(),
            Self::Utf8(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Utf8(s) => s.is_empty(),
            _ => self.len() == 0,
        }
    }

    /// Parse console text as a vector of `data_type`.
    ///
    /// Items are separated by whitespace, or by commas for non-complex
    /// numeric types. `utf8` takes the text as-is and `raw` reads hex.
    pub fn parse(data_type: DataType, text: &str) -> Result<Self> {
        if data_type == DataType::Utf8 {
            return Ok(Self::Utf8(text.to_string()));
        }
        if data_type == DataType::Raw {
            return Ok(Self::Raw(parse_hex(text.trim())?));
        }

        let items: Vec<&str> = match data_type {
            DataType::Complex64 | DataType::Complex128 => text.split_whitespace().collect(),
            _ => text
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|s| !s.is_empty())
                .collect(),
        };

        let mut out = Self::empty(data_type);
        for item in items {
            out.push(Value::parse(data_type, item)?)?;
        }
        Ok(out)
    }

    fn empty(data_type: DataType) -> Self {
        match data_type {
            DataType::Raw => Self::Raw(Vec::new()),
            DataType::Uint8 => Self::U8(Vec::new()),
            DataType::Sint8 => Self::I8(Vec::new()),
            DataType::Uint16 => Self::U16(Vec::new()),
            DataType::Sint16 => Self::I16(Vec::new()),
            DataType::Uint32 => Self::U32(Vec::new()),
            DataType::Sint32 => Self::I32(Vec::new()),
            DataType::Uint64 => Self::U64(Vec::new()),
            DataType::Sint64 => Self::I64(Vec::new()),
            DataType::Float32 => Self::F32(Vec::new()),
            DataType::Float64 => Self::F64(Vec::new()),
            DataType::Complex64 => Self::C64(Vec::new()),
            DataType::Complex128 => Self::C128(Vec::new()),
            DataType::Utf8 => Self::Utf8(String::new()),
        }
    }

    fn push(&mut self, value: Value) -> Result<()> {
        match (self, value) {
            (Self::U8(v), Value::U8(x)) => v.push(x),
            (Self::I8(v), Value::I8(x)) => v.push(x),
            (Self::U16(v), Value::U16(x)) => v.push(x),
            (Self::I16(v), Value::I16(x)) => v.push(x),
            (Self::U32(v), Value::U32(x)) => v.push(x),
            (Self::I32(v), Value::I32(x)) => v.push(x),
            (Self::U64(v), Value::U64(x)) => v.push(x),
            (Self::I64(v), Value::I64(x)) => v.push(x),
            (Self::F32(v), Value::F32(x)) => v.push(x),
            (Self::F64(v), Value::F64(x)) => v.push(x),
            (Self::C64(v), Value::C64(x)) => v.push(x),
            (Self::C128(v), Value::C128(x)) => v.push(x),
            (this, value) => {
                return Err(FrameError::UnsupportedValueEncoding(format!(
                    "cannot append {} to a {} vector",
                    value.data_type(),
                    this.data_type()
                )))
            }
        }
        Ok(())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raw(bytes) => write_hex(f, bytes),
            Self::U8(v) => write!(f, "{v}"),
            Self::I8(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::I16(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
            Self::C64(c) => write!(f, "{},{}", c.re, c.im),
            Self::C128(c) => write!(f, "{},{}", c.re, c.im),
            Self::Utf8(s) => f.write_str(s),
        }
    }
}

impl fmt::Display for Values {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{item}")?;
            }
            Ok(())
        }

        match self {
            Self::Raw(bytes) => write_hex(f, bytes),
            Self::U8(v) => join(f, v),
            Self::I8(v) => join(f, v),
            Self::U16(v) => join(f, v),
            Self::I16(v) => join(f, v),
            Self::U32(v) => join(f, v),
            Self::I32(v) => join(f, v),
            Self::U64(v) => join(f, v),
            Self::I64(v) => join(f, v),
            Self::F32(v) => join(f, v),
            Self::F64(v) => join(f, v),
            Self::C64(v) => {
                let pairs: Vec<String> = v.iter().map(|c| format!("{},{}", c.re, c.im)).collect();
                join(f, &pairs)
            }
            Self::C128(v) => {
                let pairs: Vec<String> = v.iter().map(|c| format!("{},{}", c.re, c.im)).collect();
                join(f, &pairs)
            }
            Self::Utf8(s) => f.write_str(s),
        }
    }
}

/// Encode one value as `data_type`.
pub fn encode_scalar(data_type: DataType, value: &Value) -> Result<Bytes> {
    let mut dst = BytesMut::new();
    match (data_type, value) {
        (DataType::Raw, Value::Raw(bytes)) => dst.put_slice(bytes),
        (DataType::Utf8, Value::Utf8(text)) => dst.put_slice(text.as_bytes()),
        (DataType::Uint8, Value::U8(v)) => dst.put_u8(*v),
        (DataType::Sint8, Value::I8(v)) => dst.put_i8(*v),
        (DataType::Uint16, Value::U16(v)) => dst.put_u16(*v),
        (DataType::Sint16, Value::I16(v)) => dst.put_i16(*v),
        (DataType::Uint32, Value::U32(v)) => dst.put_u32(*v),
        (DataType::Sint32, Value::I32(v)) => dst.put_i32(*v),
        (DataType::Uint64, Value::U64(v)) => dst.put_u64(*v),
        (DataType::Sint64, Value::I64(v)) => dst.put_i64(*v),
        (DataType::Float32, Value::F32(v)) => dst.put_f32(*v),
        (DataType::Float64, Value::F64(v)) => dst.put_f64(*v),
        (DataType::Complex64, Value::C64(c)) => {
            dst.put_f32(c.re);
            dst.put_f32(c.im);
        }
        (DataType::Complex128, Value::C128(c)) => {
            dst.put_f64(c.re);
            dst.put_f64(c.im);
        }
        (expected, value) => {
            return Err(FrameError::UnsupportedValueEncoding(format!(
                "{} value cannot be encoded as {expected}",
                value.data_type()
            )))
        }
    }
    Ok(dst.freeze())
}

/// Decode one value of `data_type`. The span must match the type's width exactly.
pub fn decode_scalar(data_type: DataType, bytes: &[u8]) -> Result<Value> {
    if let Some(width) = data_type.width() {
        if bytes.len() != width {
            return Err(FrameError::TypeMismatch {
                data_type,
                len: bytes.len(),
            });
        }
    }

    let mut src = bytes;
    let value = match data_type {
        DataType::Raw => Value::Raw(bytes.to_vec()),
        DataType::Utf8 => Value::Utf8(std::str::from_utf8(bytes)?.to_owned()),
        DataType::Uint8 => Value::U8(src.get_u8()),
        DataType::Sint8 => Value::I8(src.get_i8()),
        DataType::Uint16 => Value::U16(src.get_u16()),
        DataType::Sint16 => Value::I16(src.get_i16()),
        DataType::Uint32 => Value::U32(src.get_u32()),
        DataType::Sint32 => Value::I32(src.get_i32()),
        DataType::Uint64 => Value::U64(src.get_u64()),
        DataType::Sint64 => Value::I64(src.get_i64()),
        DataType::Float32 => Value::F32(src.get_f32()),
        DataType::Float64 => Value::F64(src.get_f64()),
        DataType::Complex64 => Value::C64(Complex32::new(src.get_f32(), src.get_f32())),
        DataType::Complex128 => Value::C128(Complex64::new(src.get_f64(), src.get_f64())),
    };
    Ok(value)
}

/// Encode a vector of values as `data_type`.
pub fn encode_vector(data_type: DataType, values: &Values) -> Result<Bytes> {
    let mut dst = BytesMut::new();
    match (data_type, values) {
        (DataType::Raw, Values::Raw(bytes)) | (DataType::Uint8, Values::U8(bytes)) => {
            dst.put_slice(bytes)
        }
        (DataType::Utf8, Values::Utf8(text)) => dst.put_slice(text.as_bytes()),
        (DataType::Sint8, Values::I8(v)) => v.iter().for_each(|x| dst.put_i8(*x)),
        (DataType::Uint16, Values::U16(v)) => v.iter().for_each(|x| dst.put_u16(*x)),
        (DataType::Sint16, Values::I16(v)) => v.iter().for_each(|x| dst.put_i16(*x)),
        (DataType::Uint32, Values::U32(v)) => v.iter().for_each(|x| dst.put_u32(*x)),
        (DataType::Sint32, Values::I32(v)) => v.iter().for_each(|x| dst.put_i32(*x)),
        (DataType::Uint64, Values::U64(v)) => v.iter().for_each(|x| dst.put_u64(*x)),
        (DataType::Sint64, Values::I64(v)) => v.iter().for_each(|x| dst.put_i64(*x)),
        (DataType::Float32, Values::F32(v)) => v.iter().for_each(|x| dst.put_f32(*x)),
        (DataType::Float64, Values::F64(v)) => v.iter().for_each(|x| dst.put_f64(*x)),
        (DataType::Complex64, Values::C64(v)) => v.iter().for_each(|c| {
            dst.put_f32(c.re);
            dst.put_f32(c.im);
        }),
        (DataType::Complex128, Values::C128(v)) => v.iter().for_each(|c| {
            dst.put_f64(c.re);
            dst.put_f64(c.im);
        }),
        (expected, values) => {
            return Err(FrameError::UnsupportedValueEncoding(format!(
                "{} vector cannot be encoded as {expected}",
                values.data_type()
            )))
        }
    }
    Ok(dst.freeze())
}

/// Decode a vector of `data_type`. The span must be a whole number of items.
pub fn decode_vector(data_type: DataType, bytes: &[u8]) -> Result<Values> {
    let width = data_type.width().unwrap_or(1);
    if bytes.len() % width != 0 {
        return Err(FrameError::TypeMismatch {
            data_type,
            len: bytes.len(),
        });
    }

    let count = bytes.len() / width;
    let mut src = bytes;
    let values = match data_type {
        DataType::Raw => Values::Raw(bytes.to_vec()),
        DataType::Utf8 => Values::Utf8(std::str::from_utf8(bytes)?.to_owned()),
        DataType::Uint8 => Values::U8(bytes.to_vec()),
        DataType::Sint8 => Values::I8((0..count).map(|_| src.get_i8()).collect()),
        DataType::Uint16 => Values::U16((0..count).map(|_| src.get_u16()).collect()),
        DataType::Sint16 => Values::I16((0..count).map(|_| src.get_i16()).collect()),
        DataType::Uint32 => Values::U32((0..count).map(|_| src.get_u32()).collect()),
        DataType::Sint32 => Values::I32((0..count).map(|_| src.get_i32()).collect()),
        DataType::Uint64 => Values::U64((0..count).map(|_| src.get_u64()).collect()),
        DataType::Sint64 => Values::I64((0..count).map(|_| src.get_i64()).collect()),
        DataType::Float32 => Values::F32((0..count).map(|_| src.get_f32()).collect()),
        DataType::Float64 => Values::F64((0..count).map(|_| src.get_f64()).collect()),
        DataType::Complex64 => Values::C64(
            (0..count)
                .map(|_| Complex32::new(src.get_f32(), src.get_f32()))
                .collect(),
        ),
        DataType::Complex128 => Values::C128(
            (0..count)
                .map(|_| Complex64::new(src.get_f64(), src.get_f64()))
                .collect(),
        ),
    };
    Ok(values)
}

fn parse_num<T: std::str::FromStr>(data_type: DataType, text: &str) -> Result<T> {
    text.trim().parse::<T>().map_err(|_| {
        FrameError::UnsupportedValueEncoding(format!("'{text}' is not a valid {data_type}"))
    })
}

fn parse_complex_parts(data_type: DataType, text: &str) -> Result<(&str, &str)> {
    text.split_once(',').ok_or_else(|| {
        FrameError::UnsupportedValueEncoding(format!(
            "'{text}' is not a valid {data_type} (expected re,im)"
        ))
    })
}

/// Parse hex digits into bytes, ignoring whitespace and an optional `0x` prefix.
pub fn parse_hex(text: &str) -> Result<Vec<u8>> {
    let digits: String = text
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if !digits.is_ascii() || digits.len() % 2 != 0 {
        return Err(FrameError::UnsupportedValueEncoding(format!(
            "'{text}' is not an even run of hex digits"
        )));
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| {
                FrameError::UnsupportedValueEncoding(format!("'{text}' is not valid hex"))
            })
        })
        .collect()
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for (i, b) in bytes.iter().enumerate() {
        if i > 0 {
            f.write_str(" ")?;
        }
        write!(f, "{b:02x}")?;
    }
    Ok(())
}

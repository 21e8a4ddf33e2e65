use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FrameError;

/// Protocol version byte written into every enumeration.
pub const PROTOCOL_VERSION: u8 = 0;

/// First element id handed out by a device. Lower ids are reserved.
pub const FIRST_ELEMENT_ID: u16 = 1024;

/// Section type tag, the first byte after a section's length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SectionType {
    Enumerate = 0x00,
    Reset = 0x01,
    GetProperty = 0x02,
    SetProperty = 0x03,
    NotifyProperty = 0x04,
    ClientToDeviceStream = 0x05,
    DeviceToClientStream = 0x06,
    Enumeration = 0x07,
    NotAllowed = 0x08,
    Confirmed = 0x09,
}

impl TryFrom<u8> for SectionType {
    type Error = FrameError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Ok(match tag {
            0x00 => Self::Enumerate,
            0x01 => Self::Reset,
            0x02 => Self::GetProperty,
            0x03 => Self::SetProperty,
            0x04 => Self::NotifyProperty,
            0x05 => Self::ClientToDeviceStream,
            0x06 => Self::DeviceToClientStream,
            0x07 => Self::Enumeration,
            0x08 => Self::NotAllowed,
            0x09 => Self::Confirmed,
            other => return Err(FrameError::UnknownSectionType(other)),
        })
    }
}

/// Wire data type of an element's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum DataType {
    Raw = 0x00,
    Uint8 = 0x01,
    Sint8 = 0x02,
    Uint16 = 0x03,
    Sint16 = 0x04,
    Uint32 = 0x05,
    Sint32 = 0x06,
    Uint64 = 0x07,
    Sint64 = 0x08,
    Float32 = 0x09,
    Float64 = 0x0A,
    Complex64 = 0x0B,
    Complex128 = 0x0C,
    Utf8 = 0x0D,
}

impl DataType {
    pub const ALL: [DataType; 14] = [
        Self::Raw,
        Self::Uint8,
        Self::Sint8,
        Self::Uint16,
        Self::Sint16,
        Self::Uint32,
        Self::Sint32,
        Self::Uint64,
        Self::Sint64,
        Self::Float32,
        Self::Float64,
        Self::Complex64,
        Self::Complex128,
        Self::Utf8,
    ];

    /// Encoded width of one value in bytes, or `None` for variable-width types.
    pub fn width(self) -> Option<usize> {
        match self {
            Self::Raw | Self::Utf8 => None,
            Self::Uint8 | Self::Sint8 => Some(1),
            Self::Uint16 | Self::Sint16 => Some(2),
            Self::Uint32 | Self::Sint32 | Self::Float32 => Some(4),
            Self::Uint64 | Self::Sint64 | Self::Float64 | Self::Complex64 => Some(8),
            Self::Complex128 => Some(16),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Uint8 => "uint8",
            Self::Sint8 => "sint8",
            Self::Uint16 => "uint16",
            Self::Sint16 => "sint16",
            Self::Uint32 => "uint32",
            Self::Sint32 => "sint32",
            Self::Uint64 => "uint64",
            Self::Sint64 => "sint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Complex64 => "complex64",
            Self::Complex128 => "complex128",
            Self::Utf8 => "utf8",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for DataType {
    type Error = FrameError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|dt| *dt as u8 == tag)
            .ok_or(FrameError::InvalidDataType(tag))
    }
}

/// The role an element plays on the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Disposition {
    EditableProperty = 0x00,
    ReadonlyProperty = 0x01,
    Metadata = 0x02,
    ClientToDeviceStream = 0x03,
    DeviceToClientStream = 0x04,
}

impl Disposition {
    /// Properties that may be read or reported.
    pub fn is_readable(self) -> bool {
        matches!(self, Self::EditableProperty | Self::ReadonlyProperty)
    }

    /// Properties that may be written.
    pub fn is_writable(self) -> bool {
        self == Self::EditableProperty
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::EditableProperty => "editable",
            Self::ReadonlyProperty => "readonly",
            Self::Metadata => "metadata",
            Self::ClientToDeviceStream => "client-to-device",
            Self::DeviceToClientStream => "device-to-client",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u8> for Disposition {
    type Error = FrameError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Ok(match tag {
            0x00 => Self::EditableProperty,
            0x01 => Self::ReadonlyProperty,
            0x02 => Self::Metadata,
            0x03 => Self::ClientToDeviceStream,
            0x04 => Self::DeviceToClientStream,
            other => return Err(FrameError::InvalidDisposition(other)),
        })
    }
}

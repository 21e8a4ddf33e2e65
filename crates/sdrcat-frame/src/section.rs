//! Section codec.
//!
//! Every chunk on the wire starts with a 2-byte big-endian length that
//! counts itself. The same rule applies to frames, sections, the metadata
//! block of a data transfer, metadata items and element descriptions.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::error::{FrameError, Result};
use crate::types::{DataType, Disposition, SectionType};

/// Size of a chunk's length prefix.
pub const LENGTH_PREFIX: usize = 2;

const MAX_CHUNK: usize = u16::MAX as usize;

/// Return the chunk starting at `offset`, validated against its own length prefix.
pub fn next_chunk(buf: &[u8], offset: usize) -> Result<&[u8]> {
    let available = buf.len().saturating_sub(offset);
    if available < LENGTH_PREFIX {
        return Err(FrameError::malformed(format!(
            "need {LENGTH_PREFIX} bytes for a length prefix at offset {offset}, have {available}"
        )));
    }
    let declared = u16::from_be_bytes([buf[offset], buf[offset + 1]]) as usize;
    if declared < LENGTH_PREFIX {
        return Err(FrameError::malformed(format!(
            "chunk at offset {offset} declares length {declared}"
        )));
    }
    if declared > available {
        return Err(FrameError::malformed(format!(
            "chunk at offset {offset} declares {declared} bytes but only {available} are available"
        )));
    }
    Ok(&buf[offset..offset + declared])
}

/// Write a length prefix for a chunk whose body is `body_len` bytes.
pub(crate) fn put_length(dst: &mut BytesMut, body_len: usize) -> Result<()> {
    let size = body_len + LENGTH_PREFIX;
    if size > MAX_CHUNK {
        return Err(FrameError::ChunkTooLarge {
            size,
            max: MAX_CHUNK,
        });
    }
    dst.put_u16(size as u16);
    Ok(())
}

fn require_len(chunk: &[u8], min: usize, what: &str) -> Result<()> {
    if chunk.len() < min {
        return Err(FrameError::malformed(format!(
            "{what} section needs at least {min} bytes, got {}",
            chunk.len()
        )));
    }
    Ok(())
}

fn read_u16(chunk: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([chunk[at], chunk[at + 1]])
}

/// Tag-only commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Enumerate,
    Reset,
    NotAllowed,
    Confirmed,
}

impl Command {
    pub fn section_type(self) -> SectionType {
        match self {
            Self::Enumerate => SectionType::Enumerate,
            Self::Reset => SectionType::Reset,
            Self::NotAllowed => SectionType::NotAllowed,
            Self::Confirmed => SectionType::Confirmed,
        }
    }

    pub fn encode(self, dst: &mut BytesMut) -> Result<()> {
        put_length(dst, 1)?;
        dst.put_u8(self.section_type() as u8);
        Ok(())
    }

    pub fn decode(chunk: &[u8]) -> Result<Self> {
        require_len(chunk, 3, "command")?;
        match SectionType::try_from(chunk[2])? {
            SectionType::Enumerate => Ok(Self::Enumerate),
            SectionType::Reset => Ok(Self::Reset),
            SectionType::NotAllowed => Ok(Self::NotAllowed),
            SectionType::Confirmed => Ok(Self::Confirmed),
            other => Err(FrameError::InvalidSectionTag {
                expected: "Enumerate, Reset, NotAllowed or Confirmed",
                found: other as u8,
            }),
        }
    }
}

/// Whether a property value section writes or reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Set,
    Notify,
}

/// `SetProperty` / `NotifyProperty` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyValue {
    pub kind: PropertyKind,
    pub element_id: u16,
    pub value: Bytes,
}

impl PropertyValue {
    pub fn section_type(&self) -> SectionType {
        match self.kind {
            PropertyKind::Set => SectionType::SetProperty,
            PropertyKind::Notify => SectionType::NotifyProperty,
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        put_length(dst, 3 + self.value.len())?;
        dst.put_u8(self.section_type() as u8);
        dst.put_u16(self.element_id);
        dst.put_slice(&self.value);
        Ok(())
    }

    pub fn decode(chunk: &[u8]) -> Result<Self> {
        require_len(chunk, 3, "property value")?;
        let kind = match SectionType::try_from(chunk[2])? {
            SectionType::SetProperty => PropertyKind::Set,
            SectionType::NotifyProperty => PropertyKind::Notify,
            other => {
                return Err(FrameError::InvalidSectionTag {
                    expected: "SetProperty or NotifyProperty",
                    found: other as u8,
                })
            }
        };
        require_len(chunk, 5, "property value")?;
        Ok(Self {
            kind,
            element_id: read_u16(chunk, 3),
            value: Bytes::copy_from_slice(&chunk[5..]),
        })
    }
}

/// Direction of a data transfer section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDirection {
    ClientToDevice,
    DeviceToClient,
}

impl StreamDirection {
    pub fn section_type(self) -> SectionType {
        match self {
            Self::ClientToDevice => SectionType::ClientToDeviceStream,
            Self::DeviceToClient => SectionType::DeviceToClientStream,
        }
    }

    /// The element disposition a stream in this direction must have.
    pub fn disposition(self) -> Disposition {
        match self {
            Self::ClientToDevice => Disposition::ClientToDeviceStream,
            Self::DeviceToClient => Disposition::DeviceToClientStream,
        }
    }
}

/// One metadata entry attached to a data transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataItem {
    pub metadata_id: u16,
    pub value: Bytes,
}

impl MetadataItem {
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        put_length(dst, 2 + self.value.len())?;
        dst.put_u16(self.metadata_id);
        dst.put_slice(&self.value);
        Ok(())
    }

    pub fn decode(chunk: &[u8]) -> Result<Self> {
        if chunk.len() < 4 {
            return Err(FrameError::malformed(format!(
                "metadata item needs at least 4 bytes, got {}",
                chunk.len()
            )));
        }
        Ok(Self {
            metadata_id: read_u16(chunk, 2),
            value: Bytes::copy_from_slice(&chunk[4..]),
        })
    }
}

/// Stream data section, with its metadata block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataTransfer {
    pub direction: StreamDirection,
    pub element_id: u16,
    pub metadata: Vec<MetadataItem>,
    pub data: Bytes,
}

impl DataTransfer {
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let mut block = BytesMut::new();
        for item in &self.metadata {
            item.encode(&mut block)?;
        }

        put_length(dst, 3 + LENGTH_PREFIX + block.len() + self.data.len())?;
        dst.put_u8(self.direction.section_type() as u8);
        dst.put_u16(self.element_id);
        put_length(dst, block.len())?;
        dst.put_slice(&block);
        dst.put_slice(&self.data);
        Ok(())
    }

    pub fn decode(chunk: &[u8]) -> Result<Self> {
        require_len(chunk, 3, "data transfer")?;
        let direction = match SectionType::try_from(chunk[2])? {
            SectionType::ClientToDeviceStream => StreamDirection::ClientToDevice,
            SectionType::DeviceToClientStream => StreamDirection::DeviceToClient,
            other => {
                return Err(FrameError::InvalidSectionTag {
                    expected: "ClientToDeviceStream or DeviceToClientStream",
                    found: other as u8,
                })
            }
        };
        require_len(chunk, 5, "data transfer")?;
        let element_id = read_u16(chunk, 3);

        let block = next_chunk(chunk, 5)?;
        let mut metadata = Vec::new();
        let mut offset = LENGTH_PREFIX;
        while offset < block.len() {
            let item = next_chunk(block, offset)?;
            metadata.push(MetadataItem::decode(item)?);
            offset += item.len();
        }

        Ok(Self {
            direction,
            element_id,
            metadata,
            data: Bytes::copy_from_slice(&chunk[5 + block.len()..]),
        })
    }
}

/// A negotiated capability as described on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Element {
    pub element_id: u16,
    pub disposition: Disposition,
    pub data_type: DataType,
    pub name: String,
}

impl Element {
    pub fn new(
        element_id: u16,
        disposition: Disposition,
        data_type: DataType,
        name: impl Into<String>,
    ) -> Self {
        Self {
            element_id,
            disposition,
            data_type,
            name: name.into(),
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        // Name length is in bytes, not characters.
        put_length(dst, 4 + self.name.len())?;
        dst.put_u16(self.element_id);
        dst.put_u8(self.disposition as u8);
        dst.put_u8(self.data_type as u8);
        dst.put_slice(self.name.as_bytes());
        Ok(())
    }

    pub fn decode(chunk: &[u8]) -> Result<Self> {
        if chunk.len() < 6 {
            return Err(FrameError::malformed(format!(
                "element description needs at least 6 bytes, got {}",
                chunk.len()
            )));
        }
        Ok(Self {
            element_id: read_u16(chunk, 2),
            disposition: Disposition::try_from(chunk[4])?,
            data_type: DataType::try_from(chunk[5])?,
            name: std::str::from_utf8(&chunk[6..])?.to_owned(),
        })
    }
}

/// Enumeration section: the device's full capability list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enumeration {
    pub protocol_version: u8,
    pub elements: Vec<Element>,
}

impl Enumeration {
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        let mut body = BytesMut::new();
        for element in &self.elements {
            element.encode(&mut body)?;
        }

        put_length(dst, 2 + body.len())?;
        dst.put_u8(SectionType::Enumeration as u8);
        dst.put_u8(self.protocol_version);
        dst.put_slice(&body);
        Ok(())
    }

    pub fn decode(chunk: &[u8]) -> Result<Self> {
        require_len(chunk, 3, "enumeration")?;
        let tag = SectionType::try_from(chunk[2])?;
        if tag != SectionType::Enumeration {
            return Err(FrameError::InvalidSectionTag {
                expected: "Enumeration",
                found: tag as u8,
            });
        }
        require_len(chunk, 4, "enumeration")?;

        let mut elements = Vec::new();
        let mut offset = 4;
        while offset < chunk.len() {
            let element = next_chunk(chunk, offset)?;
            elements.push(Element::decode(element)?);
            offset += element.len();
        }

        Ok(Self {
            protocol_version: chunk[3],
            elements,
        })
    }
}

/// One tagged protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Section {
    Command(Command),
    GetProperty { element_id: u16 },
    PropertyValue(PropertyValue),
    DataTransfer(DataTransfer),
    Enumeration(Enumeration),
}

impl Section {
    pub fn section_type(&self) -> SectionType {
        match self {
            Self::Command(cmd) => cmd.section_type(),
            Self::GetProperty { .. } => SectionType::GetProperty,
            Self::PropertyValue(pv) => pv.section_type(),
            Self::DataTransfer(dt) => dt.direction.section_type(),
            Self::Enumeration(_) => SectionType::Enumeration,
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        match self {
            Self::Command(cmd) => cmd.encode(dst),
            Self::GetProperty { element_id } => {
                put_length(dst, 3)?;
                dst.put_u8(SectionType::GetProperty as u8);
                dst.put_u16(*element_id);
                Ok(())
            }
            Self::PropertyValue(pv) => pv.encode(dst),
            Self::DataTransfer(dt) => dt.encode(dst),
            Self::Enumeration(e) => e.encode(dst),
        }
    }

    /// Decode one section chunk. The chunk's length prefix must already
    /// match `chunk.len()`, as returned by [`next_chunk`].
    pub fn decode(chunk: &[u8]) -> Result<Self> {
        require_len(chunk, 3, "any")?;
        let section = match SectionType::try_from(chunk[2])? {
            SectionType::Enumerate
            | SectionType::Reset
            | SectionType::NotAllowed
            | SectionType::Confirmed => Self::Command(Command::decode(chunk)?),
            SectionType::GetProperty => {
                require_len(chunk, 5, "get property")?;
                Self::GetProperty {
                    element_id: read_u16(chunk, 3),
                }
            }
            SectionType::SetProperty | SectionType::NotifyProperty => {
                Self::PropertyValue(PropertyValue::decode(chunk)?)
            }
            SectionType::ClientToDeviceStream | SectionType::DeviceToClientStream => {
                Self::DataTransfer(DataTransfer::decode(chunk)?)
            }
            SectionType::Enumeration => Self::Enumeration(Enumeration::decode(chunk)?),
        };
        Ok(section)
    }
}

impl From<Command> for Section {
    fn from(cmd: Command) -> Self {
        Self::Command(cmd)
    }
}

impl From<PropertyValue> for Section {
    fn from(value: PropertyValue) -> Self {
        Self::PropertyValue(value)
    }
}

impl From<DataTransfer> for Section {
    fn from(transfer: DataTransfer) -> Self {
        Self::DataTransfer(transfer)
    }
}

impl From<Enumeration> for Section {
    fn from(enumeration: Enumeration) -> Self {
        Self::Enumeration(enumeration)
    }
}

impl std::fmt::Display for Section {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Command(cmd) => write!(f, "{cmd:?}"),
            Self::GetProperty { element_id } => write!(f, "GetProperty({element_id})"),
            Self::PropertyValue(pv) => match pv.kind {
                PropertyKind::Set => write!(f, "SetProperty({})", pv.element_id),
                PropertyKind::Notify => write!(f, "NotifyProperty({})", pv.element_id),
            },
            Self::DataTransfer(dt) => match dt.direction {
                StreamDirection::ClientToDevice => {
                    write!(f, "ClientToDeviceStream({})", dt.element_id)
                }
                StreamDirection::DeviceToClient => {
                    write!(f, "DeviceToClientStream({})", dt.element_id)
                }
            },
            Self::Enumeration(e) => write!(f, "Enumeration({} elements)", e.elements.len()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(section: &Section) -> Vec<u8> {
        let mut buf = BytesMut::new();
        section.encode(&mut buf).expect("encode should succeed");
        buf.to_vec()
    }

    fn roundtrip(section: Section) {
        let bytes = encoded(&section);
        let decoded = Section::decode(&bytes).expect("decode should succeed");
        assert_eq!(decoded, section);
        assert_eq!(encoded(&decoded), bytes);
    }

    #[test]
    fn command_layout() {
        assert_eq!(encoded(&Command::Enumerate.into()), vec![0x00, 0x03, 0x00]);
        assert_eq!(encoded(&Command::Reset.into()), vec![0x00, 0x03, 0x01]);
        assert_eq!(encoded(&Command::NotAllowed.into()), vec![0x00, 0x03, 0x08]);
        assert_eq!(encoded(&Command::Confirmed.into()), vec![0x00, 0x03, 0x09]);
    }

    #[test]
    fn get_property_layout() {
        let bytes = encoded(&Section::GetProperty { element_id: 1025 });
        assert_eq!(bytes, vec![0x00, 0x05, 0x02, 0x04, 0x01]);
    }

    #[test]
    fn property_value_layout() {
        let section = Section::PropertyValue(PropertyValue {
            kind: PropertyKind::Set,
            element_id: 1024,
            value: Bytes::from_static(&[0, 0, 0, 42]),
        });
        assert_eq!(
            encoded(&section),
            vec![0x00, 0x09, 0x03, 0x04, 0x00, 0x00, 0x00, 0x00, 0x2A]
        );
    }

    #[test]
    fn data_transfer_layout() {
        let section = Section::DataTransfer(DataTransfer {
            direction: StreamDirection::DeviceToClient,
            element_id: 1030,
            metadata: vec![MetadataItem {
                metadata_id: 1031,
                value: Bytes::from_static(&[0xAA]),
            }],
            data: Bytes::from_static(b"hi"),
        });
        assert_eq!(
            encoded(&section),
            vec![
                0x00, 0x0E, // section length
                0x06, 0x04, 0x06, // tag, element id
                0x00, 0x07, // metadata block length
                0x00, 0x05, 0x04, 0x07, 0xAA, // metadata item
                b'h', b'i',
            ]
        );
    }

    #[test]
    fn enumeration_layout() {
        let section = Section::Enumeration(Enumeration {
            protocol_version: 0,
            elements: vec![Element::new(
                1024,
                Disposition::DeviceToClientStream,
                DataType::Uint8,
                "s",
            )],
        });
        assert_eq!(
            encoded(&section),
            vec![0x00, 0x0B, 0x07, 0x00, 0x00, 0x07, 0x04, 0x00, 0x04, 0x01, b's']
        );
    }

    #[test]
    fn roundtrip_every_section_kind() {
        roundtrip(Command::Enumerate.into());
        roundtrip(Command::Reset.into());
        roundtrip(Command::NotAllowed.into());
        roundtrip(Command::Confirmed.into());
        roundtrip(Section::GetProperty { element_id: 7 });
        roundtrip(Section::PropertyValue(PropertyValue {
            kind: PropertyKind::Notify,
            element_id: 1026,
            value: Bytes::from_static(b"value"),
        }));
        roundtrip(Section::PropertyValue(PropertyValue {
            kind: PropertyKind::Set,
            element_id: 1026,
            value: Bytes::new(),
        }));
        roundtrip(Section::DataTransfer(DataTransfer {
            direction: StreamDirection::ClientToDevice,
            element_id: 1027,
            metadata: vec![],
            data: Bytes::new(),
        }));
        roundtrip(Section::DataTransfer(DataTransfer {
            direction: StreamDirection::DeviceToClient,
            element_id: 1027,
            metadata: vec![
                MetadataItem {
                    metadata_id: 1028,
                    value: Bytes::from_static(&[0, 0, 0, 1]),
                },
                MetadataItem {
                    metadata_id: 1029,
                    value: Bytes::new(),
                },
            ],
            data: Bytes::from_static(&[1, 2, 3, 4, 5]),
        }));
        roundtrip(Section::Enumeration(Enumeration {
            protocol_version: 3,
            elements: vec![
                Element::new(1024, Disposition::EditableProperty, DataType::Uint32, "x"),
                Element::new(1025, Disposition::Metadata, DataType::Complex128, "ümlaut"),
            ],
        }));
        roundtrip(Section::Enumeration(Enumeration {
            protocol_version: 0,
            elements: vec![],
        }));
    }

    #[test]
    fn element_length_counts_utf8_bytes() {
        let mut buf = BytesMut::new();
        Element::new(1, Disposition::Metadata, DataType::Utf8, "é")
            .encode(&mut buf)
            .expect("encode");
        assert_eq!(read_u16(&buf, 0), 8);
    }

    #[test]
    fn unknown_section_type() {
        let err = Section::decode(&[0x00, 0x03, 0x42]).unwrap_err();
        assert!(matches!(err, FrameError::UnknownSectionType(0x42)));
    }

    #[test]
    fn decoder_rejects_foreign_tag() {
        let err = PropertyValue::decode(&[0x00, 0x05, 0x02, 0x04, 0x00]).unwrap_err();
        assert!(matches!(
            err,
            FrameError::InvalidSectionTag { found: 0x02, .. }
        ));

        let err = DataTransfer::decode(&[0x00, 0x05, 0x03, 0x04, 0x00]).unwrap_err();
        assert!(matches!(
            err,
            FrameError::InvalidSectionTag { found: 0x03, .. }
        ));

        let err = Command::decode(&[0x00, 0x03, 0x07]).unwrap_err();
        assert!(matches!(
            err,
            FrameError::InvalidSectionTag { found: 0x07, .. }
        ));
    }

    #[test]
    fn truncated_metadata_block_is_malformed() {
        // Metadata block claims 10 bytes but the section ends first.
        let bytes = [0x00, 0x08, 0x05, 0x04, 0x00, 0x00, 0x0A, 0x00];
        let err = Section::decode(&bytes).unwrap_err();
        assert!(matches!(err, FrameError::MalformedFrame(_)));
    }

    #[test]
    fn short_get_property_is_malformed() {
        let err = Section::decode(&[0x00, 0x04, 0x02, 0x04]).unwrap_err();
        assert!(matches!(err, FrameError::MalformedFrame(_)));
    }

    #[test]
    fn invalid_element_bytes() {
        let err = Element::decode(&[0x00, 0x07, 0x04, 0x00, 0x09, 0x01, b'a']).unwrap_err();
        assert!(matches!(err, FrameError::InvalidDisposition(9)));
        let err = Element::decode(&[0x00, 0x07, 0x04, 0x00, 0x00, 0x20, b'a']).unwrap_err();
        assert!(matches!(err, FrameError::InvalidDataType(0x20)));
        let err = Element::decode(&[0x00, 0x07, 0x04, 0x00, 0x00, 0x0D, 0xFF]).unwrap_err();
        assert!(matches!(err, FrameError::InvalidUtf8(_)));
    }

    #[test]
    fn next_chunk_checks_bounds() {
        let buf = [0x00, 0x04, 0xAA, 0xBB, 0x00, 0x09];
        assert_eq!(next_chunk(&buf, 0).expect("chunk"), &[0x00, 0x04, 0xAA, 0xBB]);
        assert!(matches!(
            next_chunk(&buf, 4),
            Err(FrameError::MalformedFrame(_))
        ));
        assert!(matches!(
            next_chunk(&buf, 5),
            Err(FrameError::MalformedFrame(_))
        ));
        assert!(matches!(
            next_chunk(&[0x00, 0x01], 0),
            Err(FrameError::MalformedFrame(_))
        ));
    }

    #[test]
    fn oversized_section_rejected() {
        let section = Section::PropertyValue(PropertyValue {
            kind: PropertyKind::Notify,
            element_id: 1,
            value: Bytes::from(vec![0u8; u16::MAX as usize]),
        });
        let mut buf = BytesMut::new();
        let err = section.encode(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::ChunkTooLarge { .. }));
    }
}

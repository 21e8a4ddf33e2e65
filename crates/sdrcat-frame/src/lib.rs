//! Wire codec and frame reassembly for the sdrcat protocol.
//!
//! Every frame on the wire is laid out as:
//! - A 2-byte big-endian length covering the whole frame
//! - A 2-byte integrity field, written as zero and not checked
//! - One or more length-prefixed sections
//!
//! Sections carry commands, property access, stream data or the device's
//! enumeration. Their payload bytes are interpreted with the typed-value
//! codec in [`value`] against the data type recorded in the [`Registry`].

pub mod codec;
#[cfg(feature = "async")]
pub mod codec_async;
pub mod error;
pub mod reader;
pub mod registry;
pub mod section;
pub mod types;
pub mod value;
pub mod writer;

pub use codec::{decode_frame, encode_frame, Frame, FrameConfig, HEADER_SIZE, MAX_FRAME_SIZE};
#[cfg(feature = "async")]
pub use codec_async::FrameCodec;
pub use error::{FrameError, Result};
pub use reader::{FrameReader, FrameReassembler};
pub use registry::{DeviceInfo, Registry};
pub use section::{
    Command, DataTransfer, Element, Enumeration, MetadataItem, PropertyKind, PropertyValue,
    Section, StreamDirection,
};
pub use types::{DataType, Disposition, SectionType, FIRST_ELEMENT_ID, PROTOCOL_VERSION};
pub use value::{decode_scalar, decode_vector, encode_scalar, encode_vector, Value, Values};
pub use writer::FrameWriter;

//! Byte-stream transport for sdrcat links.
//!
//! The protocol engine never touches sockets. This crate provides the
//! blocking TCP plumbing the comm adapters use to move raw bytes between a
//! client and a device:
//! - [`TcpEndpoint`] binds, accepts and connects
//! - [`LinkStream`] is the connected `Read + Write` stream
//!
//! This is the lowest layer of sdrcat. Framing lives in `sdrcat-frame`.

pub mod error;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
pub use tcp::TcpEndpoint;
pub use traits::LinkStream;

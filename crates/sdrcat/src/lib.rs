//! Enumerate, control and stream from networked instruments.
//!
//! A device declares its properties, metadata and streams; a client
//! connects over TCP, receives that enumeration and then reads, writes
//! and streams by element name.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP links
//! - [`frame`]: wire codec, frame reassembly and the element registry
//! - [`peer`]: client and device coordinators, router and runtime (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use sdrcat_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use sdrcat_frame::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use sdrcat_peer::*;
}

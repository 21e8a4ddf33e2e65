//! Protocol coordinators and the message plumbing around them.
//!
//! A runtime wires four named handlers onto one [`Router`]:
//! - `coordinator`: a [`ClientCoordinator`] or [`DeviceCoordinator`]
//! - `client` / `device`: the application, through an endpoint adapter
//! - `comm`: a TCP adapter moving raw bytes
//!
//! The coordinators never block and never touch sockets. Everything they
//! do is expressed as [`Envelope`]s returned to the router.

pub mod client;
pub mod comm;
pub mod config;
pub mod device;
pub mod endpoint;
pub mod error;
pub mod message;
mod outbox;
mod payload;
pub mod router;
pub mod runtime;

pub use client::{ClientCoordinator, ClientState};
pub use comm::{BoundAddr, TcpClientComm, TcpDeviceComm};
pub use config::{CommConfig, CoordinatorConfig, RouterConfig};
pub use device::{DeviceCoordinator, DeviceState};
pub use endpoint::{ClientApp, ClientEndpoint, Definitions, DeviceApp, DeviceEndpoint};
pub use error::{PeerError, Result};
pub use message::{
    Action, ClientNotification, ClientRequest, CommCommand, CommEvent, ConnectParams,
    DeviceNotification, DeviceRequest, Envelope, Metadata, Target, BROADCAST, CLIENT, COMM,
    COORDINATOR, DEVICE,
};
pub use router::{Dispatched, Handler, Router};
pub use runtime::{Runtime, RuntimeHandle};

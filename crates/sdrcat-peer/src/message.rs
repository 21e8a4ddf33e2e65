//! Message envelope carried between the coordinators and their adapters.
//!
//! Each [`Action`] variant family names one direction of travel, so a
//! handler matches exhaustively on what it is allowed to receive.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use sdrcat_frame::{DataType, DeviceInfo, Value, Values};
use serde::{Deserialize, Serialize};

use crate::client::ClientState;

/// Application side of a client runtime.
pub const CLIENT: &str = "client";
/// Application side of a device runtime.
pub const DEVICE: &str = "device";
/// Transport adapter.
pub const COMM: &str = "comm";
/// Protocol coordinator.
pub const COORDINATOR: &str = "coordinator";
/// Wildcard target.
pub const BROADCAST: &str = "*";

/// Metadata values keyed by metadata element name.
pub type Metadata = BTreeMap<String, Value>;

/// Where a device listens, or where a client connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectParams {
    pub host: String,
    pub port: u16,
}

impl ConnectParams {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ConnectParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Requests from the client application to its coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientRequest {
    Connect(ConnectParams),
    Disconnect,
    GetProperty {
        name: String,
    },
    SetProperty {
        name: String,
        value: Value,
    },
    SendData {
        stream: String,
        data: Values,
        metadata: Metadata,
    },
    Reset,
}

/// Requests from the device application to its coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceRequest {
    Start(ConnectParams),
    Ready,
    Reset,
    DefineProperty {
        name: String,
        data_type: DataType,
        read_only: bool,
    },
    DefineMetadata {
        name: String,
        data_type: DataType,
    },
    DefineStream {
        name: String,
        data_type: DataType,
        outgoing: bool,
    },
    ReportProperty {
        name: String,
        value: Value,
    },
    SendData {
        stream: String,
        data: Values,
        metadata: Metadata,
    },
}

/// Events from the transport adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommEvent {
    Connected,
    Disconnected,
    Received(Bytes),
}

/// Commands for the transport adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommCommand {
    Connect(ConnectParams),
    Disconnect,
    Transmit(Bytes),
}

/// Notifications for the client application.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientNotification {
    Status(ClientState),
    DeviceInfo(DeviceInfo),
    PropertyValue {
        name: String,
        value: Value,
    },
    StreamData {
        stream: String,
        data: Values,
        metadata: Metadata,
    },
}

/// Notifications for the device application.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceNotification {
    Reset,
    GetProperty {
        name: String,
    },
    SetProperty {
        name: String,
        value: Value,
    },
    StreamData {
        stream: String,
        data: Values,
        metadata: Metadata,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Client(ClientRequest),
    Device(DeviceRequest),
    Comm(CommEvent),
    ToComm(CommCommand),
    ToClient(ClientNotification),
    ToDevice(DeviceNotification),
    /// Advisory text. Never required for correct operation.
    Information(String),
    /// Stop the runtime after every handler has seen this message.
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Named(String),
    Broadcast,
}

impl Target {
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        if name == BROADCAST {
            Self::Broadcast
        } else {
            Self::Named(name)
        }
    }
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        Self::named(name)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.write_str(name),
            Self::Broadcast => f.write_str(BROADCAST),
        }
    }
}

/// A routed message.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub source: String,
    pub target: Target,
    pub action: Action,
}

impl Envelope {
    pub fn new(source: impl Into<String>, target: impl Into<Target>, action: Action) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            action,
        }
    }

    /// A client application request addressed to the coordinator.
    pub fn from_client(request: ClientRequest) -> Self {
        Self::new(CLIENT, COORDINATOR, Action::Client(request))
    }

    /// A device application request addressed to the coordinator.
    pub fn from_device(request: DeviceRequest) -> Self {
        Self::new(DEVICE, COORDINATOR, Action::Device(request))
    }

    /// A transport event addressed to the coordinator.
    pub fn from_comm(event: CommEvent) -> Self {
        Self::new(COMM, COORDINATOR, Action::Comm(event))
    }

    /// A broadcast that stops the runtime.
    pub fn shutdown(source: impl Into<String>) -> Self {
        Self::new(source, Target::Broadcast, Action::Shutdown)
    }
}

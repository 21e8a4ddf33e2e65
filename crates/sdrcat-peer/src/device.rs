//! Device-side protocol coordinator.
//!
//! The device declares its elements while not ready, then answers client
//! requests once the link is established. Anything the client asks for in
//! the wrong state, or with an element id of the wrong kind, is answered
//! with `NotAllowed`.

use std::fmt;

use bytes::Bytes;
use sdrcat_frame::{
    decode_scalar, decode_vector, encode_scalar, encode_vector, Command, DataTransfer, DataType,
    Disposition, Element, Frame, FrameReassembler, PropertyKind, PropertyValue, Registry,
    Section, StreamDirection, Value, Values, FIRST_ELEMENT_ID,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::CoordinatorConfig;
use crate::message::{
    Action, CommCommand, CommEvent, DeviceNotification, DeviceRequest, Envelope, Metadata,
};
use crate::outbox::Outbox;
use crate::payload::{decode_metadata, encode_metadata};
use crate::router::Handler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    Startup,
    NotReadyDisconnected,
    NotReadyConnected,
    NotReadyEnumerated,
    ReadyDisconnected,
    ReadyConnected,
    LinkEstablished,
}

impl DeviceState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::NotReadyDisconnected => "not ready, disconnected",
            Self::NotReadyConnected => "not ready, connected",
            Self::NotReadyEnumerated => "not ready, enumerated",
            Self::ReadyDisconnected => "ready, disconnected",
            Self::ReadyConnected => "ready, connected",
            Self::LinkEstablished => "link established",
        }
    }

    /// Declarations are only accepted before the device reports ready.
    pub fn accepts_definitions(self) -> bool {
        matches!(
            self,
            Self::NotReadyDisconnected | Self::NotReadyConnected | Self::NotReadyEnumerated
        )
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Device protocol state machine. Register it under
/// [`COORDINATOR`](crate::message::COORDINATOR).
#[derive(Debug)]
pub struct DeviceCoordinator {
    config: CoordinatorConfig,
    state: DeviceState,
    registry: Registry,
    next_id: u16,
    reassembler: FrameReassembler,
}

impl DeviceCoordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            state: DeviceState::Startup,
            registry: Registry::new(),
            next_id: FIRST_ELEMENT_ID,
            reassembler: FrameReassembler::new(),
        }
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Elements declared in the current session.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Id the next declaration will receive.
    pub fn next_id(&self) -> u16 {
        self.next_id
    }

    fn set_state(&mut self, state: DeviceState) {
        if self.state != state {
            info!(from = %self.state, to = %state, "device state");
            self.state = state;
        }
    }

    fn transmit_enumeration(&self, out: &mut Outbox) {
        out.transmit(self.registry.to_enumeration());
    }

    fn define(
        &mut self,
        name: &str,
        disposition: Disposition,
        data_type: DataType,
        out: &mut Outbox,
    ) {
        if !self.state.accepts_definitions() {
            out.information(format!("cannot define '{name}' while {}", self.state));
            return;
        }
        let Some(following) = self.next_id.checked_add(1) else {
            warn!(name, "element id space exhausted");
            return;
        };
        debug!(id = self.next_id, name, %disposition, %data_type, "defined element");
        self.registry
            .append(Element::new(self.next_id, disposition, data_type, name));
        self.next_id = following;
    }

    fn on_request(&mut self, request: &DeviceRequest, out: &mut Outbox) {
        use DeviceState::*;

        match (self.state, request) {
            (Startup, DeviceRequest::Start(params)) => {
                out.device(DeviceNotification::Reset);
                self.set_state(NotReadyDisconnected);
                out.comm(CommCommand::Connect(params.clone()));
            }
            (NotReadyDisconnected, DeviceRequest::Ready) => self.set_state(ReadyDisconnected),
            (NotReadyConnected, DeviceRequest::Ready) => self.set_state(ReadyConnected),
            (NotReadyEnumerated, DeviceRequest::Ready) => {
                self.set_state(LinkEstablished);
                self.transmit_enumeration(out);
            }
            (ReadyDisconnected | ReadyConnected | LinkEstablished, DeviceRequest::Reset) => {
                let was_linked = self.state == LinkEstablished;
                self.registry.clear();
                self.next_id = FIRST_ELEMENT_ID;
                let next = match self.state {
                    ReadyDisconnected => NotReadyDisconnected,
                    _ => NotReadyConnected,
                };
                self.set_state(next);
                if was_linked {
                    out.transmit(Command::Reset);
                }
            }
            (
                _,
                DeviceRequest::DefineProperty {
                    name,
                    data_type,
                    read_only,
                },
            ) => {
                let disposition = if *read_only {
                    Disposition::ReadonlyProperty
                } else {
                    Disposition::EditableProperty
                };
                self.define(name, disposition, *data_type, out);
            }
            (_, DeviceRequest::DefineMetadata { name, data_type }) => {
                self.define(name, Disposition::Metadata, *data_type, out);
            }
            (
                _,
                DeviceRequest::DefineStream {
                    name,
                    data_type,
                    outgoing,
                },
            ) => {
                let direction = if *outgoing {
                    StreamDirection::DeviceToClient
                } else {
                    StreamDirection::ClientToDevice
                };
                self.define(name, direction.disposition(), *data_type, out);
            }
            (LinkEstablished, DeviceRequest::ReportProperty { name, value }) => {
                self.report_property(name, value, out);
            }
            (
                LinkEstablished,
                DeviceRequest::SendData {
                    stream,
                    data,
                    metadata,
                },
            ) => {
                self.send_data(stream, data, metadata, out);
            }
            (state, request) => {
                out.information(format!("{request:?} not possible while {state}"));
            }
        }
    }

    fn report_property(&self, name: &str, value: &Value, out: &mut Outbox) {
        let Some(element) = self.registry.resolve_name(name, Disposition::is_readable) else {
            out.information(format!("no property '{name}' to report"));
            return;
        };
        match encode_scalar(element.data_type, value) {
            Ok(bytes) => out.transmit(PropertyValue {
                kind: PropertyKind::Notify,
                element_id: element.element_id,
                value: bytes,
            }),
            Err(err) => out.information(format!("cannot report '{name}': {err}")),
        }
    }

    fn send_data(&self, stream: &str, data: &Values, metadata: &Metadata, out: &mut Outbox) {
        let direction = StreamDirection::DeviceToClient;
        let Some(element) = self
            .registry
            .resolve_name(stream, |d| d == direction.disposition())
        else {
            out.information(format!("no outgoing stream '{stream}'"));
            return;
        };
        let data = match encode_vector(element.data_type, data) {
            Ok(bytes) => bytes,
            Err(err) => {
                out.information(format!("cannot send on '{stream}': {err}"));
                return;
            }
        };
        let metadata = encode_metadata(&self.registry, metadata, out);
        out.transmit(DataTransfer {
            direction,
            element_id: element.element_id,
            metadata,
            data,
        });
    }

    fn on_comm(&mut self, event: &CommEvent, out: &mut Outbox) {
        use DeviceState::*;

        match (self.state, event) {
            (NotReadyDisconnected, CommEvent::Connected) => {
                self.reassembler.clear();
                self.set_state(NotReadyConnected);
            }
            (ReadyDisconnected, CommEvent::Connected) => {
                self.reassembler.clear();
                self.set_state(ReadyConnected);
            }
            (NotReadyConnected | NotReadyEnumerated, CommEvent::Disconnected) => {
                self.reassembler.clear();
                self.set_state(NotReadyDisconnected);
            }
            (ReadyConnected | LinkEstablished, CommEvent::Disconnected) => {
                self.reassembler.clear();
                self.set_state(ReadyDisconnected);
            }
            (_, CommEvent::Received(bytes)) => self.on_received(bytes, out),
            (state, event) => debug!(%state, ?event, "ignoring comm event"),
        }
    }

    fn on_received(&mut self, bytes: &Bytes, out: &mut Outbox) {
        self.reassembler.feed(bytes);
        loop {
            match self.reassembler.next_frame() {
                Ok(Some(frame)) => self.on_frame(frame, out),
                Ok(None) => break,
                Err(err) => out.information(format!("undecodable frame: {err}")),
            }
        }
    }

    fn on_frame(&mut self, frame: Frame, out: &mut Outbox) {
        use DeviceState::*;

        let count = frame.sections.len();
        let Some(section) = frame.into_sole_section() else {
            out.information(format!("ignoring frame with {count} sections"));
            return;
        };

        match (self.state, section) {
            (NotReadyConnected, Section::Command(Command::Enumerate)) => {
                self.set_state(NotReadyEnumerated);
            }
            (ReadyConnected, Section::Command(Command::Enumerate)) => {
                self.set_state(LinkEstablished);
                self.transmit_enumeration(out);
            }
            (NotReadyConnected | ReadyConnected | NotReadyEnumerated, section) => {
                out.information(format!("refusing {section} while {}", self.state));
                out.not_allowed();
            }
            (LinkEstablished, section) => self.on_link_section(section, out),
            (state, section) => {
                out.information(format!("ignoring {section} while {state}"));
            }
        }
    }

    fn on_link_section(&mut self, section: Section, out: &mut Outbox) {
        match section {
            Section::Command(Command::Reset) => {
                out.device(DeviceNotification::Reset);
                out.transmit(Command::Reset);
            }
            Section::Command(Command::Enumerate) => self.transmit_enumeration(out),
            Section::GetProperty { element_id } => {
                match self.registry.resolve_id(element_id, Disposition::is_readable) {
                    Some(element) => out.device(DeviceNotification::GetProperty {
                        name: element.name.clone(),
                    }),
                    None => self.refuse(format!("get of unknown property {element_id}"), out),
                }
            }
            Section::PropertyValue(value) if value.kind == PropertyKind::Set => {
                self.on_set_property(value, out)
            }
            Section::DataTransfer(transfer)
                if transfer.direction == StreamDirection::ClientToDevice =>
            {
                self.on_stream_data(transfer, out)
            }
            other => self.refuse(format!("unexpected {other}"), out),
        }
    }

    fn refuse(&self, reason: String, out: &mut Outbox) {
        out.information(reason);
        out.not_allowed();
    }

    fn on_set_property(&self, value: PropertyValue, out: &mut Outbox) {
        let Some(element) = self
            .registry
            .resolve_id(value.element_id, Disposition::is_writable)
        else {
            self.refuse(format!("set of unknown property {}", value.element_id), out);
            return;
        };
        match decode_scalar(element.data_type, &value.value) {
            Ok(decoded) => out.device(DeviceNotification::SetProperty {
                name: element.name.clone(),
                value: decoded,
            }),
            Err(err) => self.refuse(format!("bad value for '{}': {err}", element.name), out),
        }
    }

    fn on_stream_data(&self, transfer: DataTransfer, out: &mut Outbox) {
        let Some(element) = self.registry.resolve_id(transfer.element_id, |d| {
            d == StreamDirection::ClientToDevice.disposition()
        }) else {
            self.refuse(format!("data for unknown stream {}", transfer.element_id), out);
            return;
        };
        let metadata = match decode_metadata(&self.registry, &transfer.metadata) {
            Ok(metadata) => metadata,
            Err(reason) => {
                self.refuse(format!("data for '{}': {reason}", element.name), out);
                return;
            }
        };
        match decode_vector(element.data_type, &transfer.data) {
            Ok(data) => {
                out.device(DeviceNotification::StreamData {
                    stream: element.name.clone(),
                    data,
                    metadata,
                });
                out.transmit(Command::Confirmed);
            }
            Err(err) => self.refuse(format!("bad data for '{}': {err}", element.name), out),
        }
    }
}

impl Default for DeviceCoordinator {
    fn default() -> Self {
        Self::new(CoordinatorConfig::default())
    }
}

impl Handler for DeviceCoordinator {
    fn handle(&mut self, envelope: &Envelope) -> Vec<Envelope> {
        let mut out = Outbox::new(self.config.include_information);
        match &envelope.action {
            Action::Device(request) => self.on_request(request, &mut out),
            Action::Comm(event) => self.on_comm(event, &mut out),
            Action::Information(_) | Action::Shutdown => {}
            other => debug!(source = %envelope.source, action = ?other, "not a device action"),
        }
        out.into_envelopes()
    }
}

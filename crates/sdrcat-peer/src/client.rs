//! Client-side protocol coordinator.
//!
//! Drives `Disconnected -> Enumerating -> LinkEstablished` and translates
//! between application requests and wire sections using the enumeration
//! received from the device.

use std::fmt;

use bytes::Bytes;
use sdrcat_frame::{
    decode_scalar, decode_vector, encode_scalar, encode_vector, Command, DataTransfer,
    Disposition, Frame, FrameReassembler, PropertyKind, PropertyValue, Registry, Section,
    StreamDirection, Value, Values,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::CoordinatorConfig;
use crate::message::{
    Action, ClientNotification, ClientRequest, CommCommand, CommEvent, Envelope, Metadata,
};
use crate::outbox::Outbox;
use crate::payload::{decode_metadata, encode_metadata};
use crate::router::Handler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientState {
    Disconnected,
    Enumerating,
    LinkEstablished,
}

impl ClientState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Enumerating => "enumerating",
            Self::LinkEstablished => "link established",
        }
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Client protocol state machine. Register it under
/// [`COORDINATOR`](crate::message::COORDINATOR).
#[derive(Debug)]
pub struct ClientCoordinator {
    config: CoordinatorConfig,
    state: ClientState,
    registry: Registry,
    reassembler: FrameReassembler,
}

impl ClientCoordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            state: ClientState::Disconnected,
            registry: Registry::new(),
            reassembler: FrameReassembler::new(),
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// The enumeration received on the current link. Empty unless linked.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn set_state(&mut self, state: ClientState, out: &mut Outbox) {
        if self.state != state {
            info!(from = %self.state, to = %state, "client state");
        }
        self.state = state;
        out.client(ClientNotification::Status(state));
    }

    fn on_request(&mut self, request: &ClientRequest, out: &mut Outbox) {
        match (self.state, request) {
            (ClientState::Disconnected, ClientRequest::Connect(params)) => {
                out.comm(CommCommand::Connect(params.clone()));
            }
            (
                ClientState::Enumerating | ClientState::LinkEstablished,
                ClientRequest::Disconnect,
            ) => {
                out.comm(CommCommand::Disconnect);
            }
            (ClientState::LinkEstablished, ClientRequest::GetProperty { name }) => {
                self.get_property(name, out);
            }
            (ClientState::LinkEstablished, ClientRequest::SetProperty { name, value }) => {
                self.set_property(name, value, out);
            }
            (
                ClientState::LinkEstablished,
                ClientRequest::SendData {
                    stream,
                    data,
                    metadata,
                },
            ) => {
                self.send_data(stream, data, metadata, out);
            }
            (ClientState::LinkEstablished, ClientRequest::Reset) => {
                out.transmit(Command::Reset);
            }
            (state, request) => {
                out.information(format!("{request:?} not possible while {state}"));
            }
        }
    }

    fn get_property(&self, name: &str, out: &mut Outbox) {
        match self.registry.resolve_name(name, Disposition::is_readable) {
            Some(element) => out.transmit(Section::GetProperty {
                element_id: element.element_id,
            }),
            None => out.information(format!("no readable property '{name}'")),
        }
    }

    fn set_property(&self, name: &str, value: &Value, out: &mut Outbox) {
        let Some(element) = self.registry.resolve_name(name, Disposition::is_writable) else {
            out.information(format!("no writable property '{name}'"));
            return;
        };
        match encode_scalar(element.data_type, value) {
            Ok(bytes) => out.transmit(PropertyValue {
                kind: PropertyKind::Set,
                element_id: element.element_id,
                value: bytes,
            }),
            Err(err) => out.information(format!("cannot set '{name}': {err}")),
        }
    }

    fn send_data(&self, stream: &str, data: &Values, metadata: &Metadata, out: &mut Outbox) {
        let direction = StreamDirection::ClientToDevice;
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
        match (self.state, event) {
            (ClientState::Disconnected, CommEvent::Connected) => {
                self.reassembler.clear();
                self.set_state(ClientState::Enumerating, out);
                out.transmit(Command::Enumerate);
            }
            (
                ClientState::Enumerating | ClientState::LinkEstablished,
                CommEvent::Disconnected,
            ) => {
                self.reassembler.clear();
                self.registry.clear();
                self.set_state(ClientState::Disconnected, out);
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
        let count = frame.sections.len();
        let Some(section) = frame.into_sole_section() else {
            out.information(format!("ignoring frame with {count} sections"));
            return;
        };

        match (self.state, section) {
            (ClientState::Enumerating, Section::Enumeration(enumeration)) => {
                self.registry = Registry::from(enumeration);
                out.client(ClientNotification::DeviceInfo(self.registry.device_info()));
                self.set_state(ClientState::LinkEstablished, out);
            }
            (ClientState::LinkEstablished, Section::Command(command)) => match command {
                Command::NotAllowed | Command::Confirmed => {
                    debug!(?command, "device answered");
                }
                Command::Reset => {
                    self.registry.clear();
                    self.set_state(ClientState::Enumerating, out);
                    out.transmit(Command::Enumerate);
                }
                Command::Enumerate => out.information("ignoring Enumerate from device"),
            },
            (ClientState::LinkEstablished, Section::PropertyValue(value))
                if value.kind == PropertyKind::Notify =>
            {
                self.on_property_value(value, out);
            }
            (ClientState::LinkEstablished, Section::DataTransfer(transfer))
                if transfer.direction == StreamDirection::DeviceToClient =>
            {
                self.on_stream_data(transfer, out);
            }
            (state, section) => {
                out.information(format!("ignoring {section} while {state}"));
            }
        }
    }

    fn on_property_value(&self, value: PropertyValue, out: &mut Outbox) {
        let Some(element) = self
            .registry
            .resolve_id(value.element_id, Disposition::is_readable)
        else {
            out.information(format!("value for unknown property {}", value.element_id));
            return;
        };
        match decode_scalar(element.data_type, &value.value) {
            Ok(decoded) => out.client(ClientNotification::PropertyValue {
                name: element.name.clone(),
                value: decoded,
            }),
            Err(err) => out.information(format!("bad value for '{}': {err}", element.name)),
        }
    }

    fn on_stream_data(&self, transfer: DataTransfer, out: &mut Outbox) {
        let Some(element) = self.registry.resolve_id(transfer.element_id, |d| {
            d == StreamDirection::DeviceToClient.disposition()
        }) else {
            out.information(format!("data for unknown stream {}", transfer.element_id));
            return;
        };
        let metadata = match decode_metadata(&self.registry, &transfer.metadata) {
            Ok(metadata) => metadata,
            Err(reason) => {
                out.information(format!("dropping data for '{}': {reason}", element.name));
                return;
            }
        };
        match decode_vector(element.data_type, &transfer.data) {
            Ok(data) => out.client(ClientNotification::StreamData {
                stream: element.name.clone(),
                data,
                metadata,
            }),
            Err(err) => out.information(format!("bad data for '{}': {err}", element.name)),
        }
    }
}

impl Default for ClientCoordinator {
    fn default() -> Self {
        Self::new(CoordinatorConfig::default())
    }
}

impl Handler for ClientCoordinator {
    fn handle(&mut self, envelope: &Envelope) -> Vec<Envelope> {
        let mut out = Outbox::new(self.config.include_information);
        match &envelope.action {
            Action::Client(request) => self.on_request(request, &mut out),
            Action::Comm(event) => self.on_comm(event, &mut out),
            Action::Information(_) | Action::Shutdown => {}
            other => debug!(source = %envelope.source, action = ?other, "not a client action"),
        }
        out.into_envelopes()
    }
}

#[cfg(test)]
mod tests {
    use sdrcat_frame::{DataType, Element, Enumeration, MetadataItem, PROTOCOL_VERSION};

    use super::*;
    use crate::message::{ConnectParams, Target, CLIENT, COMM};

    fn run(client: &mut ClientCoordinator, action: Action) -> Vec<Envelope> {
        client.handle(&Envelope::new("test", "coordinator", action))
    }

    fn receive(client: &mut ClientCoordinator, section: impl Into<Section>) -> Vec<Envelope> {
        let bytes = Frame::single(section).to_bytes().unwrap();
        run(client, Action::Comm(CommEvent::Received(bytes)))
    }

    fn transmitted(envelopes: &[Envelope]) -> Vec<Section> {
        envelopes
            .iter()
            .filter_map(|env| match &env.action {
                Action::ToComm(CommCommand::Transmit(bytes)) => Some(
                    Frame::decode(bytes)
                        .unwrap()
                        .into_sole_section()
                        .unwrap(),
                ),
                _ => None,
            })
            .collect()
    }

    fn notifications(envelopes: &[Envelope]) -> Vec<ClientNotification> {
        envelopes
            .iter()
            .filter_map(|env| match &env.action {
                Action::ToClient(n) => {
                    assert_eq!(env.target, Target::Named(CLIENT.into()));
                    Some(n.clone())
                }
                _ => None,
            })
            .collect()
    }

    fn enumeration() -> Enumeration {
        Enumeration {
            protocol_version: PROTOCOL_VERSION,
            elements: vec![
                Element::new(1024, Disposition::EditableProperty, DataType::Uint32, "x"),
                Element::new(1025, Disposition::ReadonlyProperty, DataType::Utf8, "name"),
                Element::new(1026, Disposition::Metadata, DataType::Uint32, "seq"),
                Element::new(1027, Disposition::DeviceToClientStream, DataType::Uint8, "rx"),
                Element::new(1028, Disposition::ClientToDeviceStream, DataType::Sint16, "tx"),
            ],
        }
    }

    fn linked() -> ClientCoordinator {
        let mut client = ClientCoordinator::default();
        run(&mut client, Action::Comm(CommEvent::Connected));
        receive(&mut client, enumeration());
        assert_eq!(client.state(), ClientState::LinkEstablished);
        client
    }

    fn request(client: &mut ClientCoordinator, request: ClientRequest) -> Vec<Envelope> {
        run(client, Action::Client(request))
    }

    #[test]
    fn connect_only_asks_comm() {
        let mut client = ClientCoordinator::default();
        let params = ConnectParams::new("localhost", 1776);
        let out = request(&mut client, ClientRequest::Connect(params.clone()));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].target, Target::Named(COMM.into()));
        assert_eq!(out[0].action, Action::ToComm(CommCommand::Connect(params)));
        assert_eq!(client.state(), ClientState::Disconnected);
    }

    #[test]
    fn connected_starts_enumeration() {
        let mut client = ClientCoordinator::default();
        let out = run(&mut client, Action::Comm(CommEvent::Connected));
        assert_eq!(client.state(), ClientState::Enumerating);
        assert_eq!(
            notifications(&out),
            [ClientNotification::Status(ClientState::Enumerating)]
        );
        assert_eq!(transmitted(&out), [Section::Command(Command::Enumerate)]);
    }

    #[test]
    fn enumeration_establishes_link() {
        let mut client = ClientCoordinator::default();
        run(&mut client, Action::Comm(CommEvent::Connected));
        let out = receive(&mut client, enumeration());

        let notes = notifications(&out);
        assert_eq!(notes.len(), 2);
        match &notes[0] {
            ClientNotification::DeviceInfo(info) => {
                assert_eq!(info.elements.len(), 5);
                assert_eq!(info.element("x").unwrap().element_id, 1024);
            }
            other => panic!("expected device info, got {other:?}"),
        }
        assert_eq!(
            notes[1],
            ClientNotification::Status(ClientState::LinkEstablished)
        );
        assert_eq!(client.registry().len(), 5);
    }

    #[test]
    fn other_sections_ignored_while_enumerating() {
        let mut client = ClientCoordinator::default();
        run(&mut client, Action::Comm(CommEvent::Connected));
        let out = receive(&mut client, Command::Reset);
        assert!(out.is_empty());
        assert_eq!(client.state(), ClientState::Enumerating);
    }

    #[test]
    fn set_property_wire_bytes() {
        let mut client = linked();
        let out = request(
            &mut client,
            ClientRequest::SetProperty {
                name: "x".into(),
                value: Value::U32(42),
            },
        );
        assert_eq!(
            transmitted(&out),
            [Section::PropertyValue(PropertyValue {
                kind: PropertyKind::Set,
                element_id: 1024,
                value: Bytes::from_static(&[0x00, 0x00, 0x00, 0x2A]),
            })]
        );
    }

    #[test]
    fn set_readonly_property_dropped() {
        let mut client = linked();
        let out = request(
            &mut client,
            ClientRequest::SetProperty {
                name: "name".into(),
                value: Value::Utf8("n".into()),
            },
        );
        assert!(out.is_empty());
    }

    #[test]
    fn set_with_wrong_type_dropped() {
        let mut client = linked();
        let out = request(
            &mut client,
            ClientRequest::SetProperty {
                name: "x".into(),
                value: Value::U8(1),
            },
        );
        assert!(transmitted(&out).is_empty());
    }

    #[test]
    fn get_property_resolves_readable() {
        let mut client = linked();
        let out = request(&mut client, ClientRequest::GetProperty { name: "name".into() });
        assert_eq!(transmitted(&out), [Section::GetProperty { element_id: 1025 }]);

        let out = request(&mut client, ClientRequest::GetProperty { name: "seq".into() });
        assert!(out.is_empty());
    }

    #[test]
    fn requests_dropped_before_link() {
        let mut client = ClientCoordinator::default();
        run(&mut client, Action::Comm(CommEvent::Connected));
        for req in [
            ClientRequest::GetProperty { name: "x".into() },
            ClientRequest::SetProperty {
                name: "x".into(),
                value: Value::U32(1),
            },
            ClientRequest::Reset,
        ] {
            assert!(request(&mut client, req).is_empty());
        }
        assert_eq!(client.state(), ClientState::Enumerating);
    }

    #[test]
    fn send_data_drops_unknown_metadata() {
        let mut client = linked();
        let mut metadata = Metadata::new();
        metadata.insert("seq".into(), Value::U32(9));
        metadata.insert("bogus".into(), Value::U32(1));
        let out = request(
            &mut client,
            ClientRequest::SendData {
                stream: "tx".into(),
                data: Values::I16(vec![-1, 2]),
                metadata,
            },
        );
        assert_eq!(
            transmitted(&out),
            [Section::DataTransfer(DataTransfer {
                direction: StreamDirection::ClientToDevice,
                element_id: 1028,
                metadata: vec![MetadataItem {
                    metadata_id: 1026,
                    value: Bytes::from_static(&[0, 0, 0, 9]),
                }],
                data: Bytes::from_static(&[0xFF, 0xFF, 0x00, 0x02]),
            })]
        );
    }

    #[test]
    fn send_on_incoming_stream_dropped() {
        let mut client = linked();
        let out = request(
            &mut client,
            ClientRequest::SendData {
                stream: "rx".into(),
                data: Values::U8(vec![1]),
                metadata: Metadata::new(),
            },
        );
        assert!(out.is_empty());
    }

    #[test]
    fn reset_request_transmits_without_state_change() {
        let mut client = linked();
        let out = request(&mut client, ClientRequest::Reset);
        assert_eq!(transmitted(&out), [Section::Command(Command::Reset)]);
        assert_eq!(client.state(), ClientState::LinkEstablished);
    }

    #[test]
    fn wire_reset_restarts_enumeration() {
        let mut client = linked();
        let out = receive(&mut client, Command::Reset);
        assert_eq!(client.state(), ClientState::Enumerating);
        assert!(client.registry().is_empty());
        assert_eq!(
            notifications(&out),
            [ClientNotification::Status(ClientState::Enumerating)]
        );
        assert_eq!(transmitted(&out), [Section::Command(Command::Enumerate)]);
    }

    #[test]
    fn notify_property_forwarded() {
        let mut client = linked();
        let out = receive(
            &mut client,
            PropertyValue {
                kind: PropertyKind::Notify,
                element_id: 1025,
                value: Bytes::from_static(b"radio"),
            },
        );
        assert_eq!(
            notifications(&out),
            [ClientNotification::PropertyValue {
                name: "name".into(),
                value: Value::Utf8("radio".into()),
            }]
        );
    }

    #[test]
    fn notify_for_stream_id_dropped() {
        let mut client = linked();
        let out = receive(
            &mut client,
            PropertyValue {
                kind: PropertyKind::Notify,
                element_id: 1027,
                value: Bytes::from_static(&[1]),
            },
        );
        assert!(notifications(&out).is_empty());
    }

    #[test]
    fn stream_data_forwarded_with_metadata() {
        let mut client = linked();
        let out = receive(
            &mut client,
            DataTransfer {
                direction: StreamDirection::DeviceToClient,
                element_id: 1027,
                metadata: vec![MetadataItem {
                    metadata_id: 1026,
                    value: Bytes::from_static(&[0, 0, 0, 3]),
                }],
                data: Bytes::from_static(&[1, 2, 3]),
            },
        );
        let mut metadata = Metadata::new();
        metadata.insert("seq".into(), Value::U32(3));
        assert_eq!(
            notifications(&out),
            [ClientNotification::StreamData {
                stream: "rx".into(),
                data: Values::U8(vec![1, 2, 3]),
                metadata,
            }]
        );
    }

    #[test]
    fn unresolved_metadata_aborts_stream_data() {
        let mut client = linked();
        let out = receive(
            &mut client,
            DataTransfer {
                direction: StreamDirection::DeviceToClient,
                element_id: 1027,
                metadata: vec![MetadataItem {
                    metadata_id: 1024,
                    value: Bytes::from_static(&[0, 0, 0, 3]),
                }],
                data: Bytes::from_static(&[1]),
            },
        );
        assert!(notifications(&out).is_empty());
    }

    #[test]
    fn answers_are_accepted_silently() {
        let mut client = linked();
        assert!(receive(&mut client, Command::Confirmed).is_empty());
        assert!(receive(&mut client, Command::NotAllowed).is_empty());
        assert_eq!(client.state(), ClientState::LinkEstablished);
    }

    #[test]
    fn disconnect_request_waits_for_comm() {
        let mut client = linked();
        let out = request(&mut client, ClientRequest::Disconnect);
        assert_eq!(out[0].action, Action::ToComm(CommCommand::Disconnect));
        assert_eq!(client.state(), ClientState::LinkEstablished);

        let out = run(&mut client, Action::Comm(CommEvent::Disconnected));
        assert_eq!(client.state(), ClientState::Disconnected);
        assert!(client.registry().is_empty());
        assert_eq!(
            notifications(&out),
            [ClientNotification::Status(ClientState::Disconnected)]
        );
    }

    #[test]
    fn unspecified_pairs_keep_state() {
        let mut client = ClientCoordinator::default();
        assert!(request(&mut client, ClientRequest::Disconnect).is_empty());
        assert!(run(&mut client, Action::Comm(CommEvent::Disconnected)).is_empty());
        assert_eq!(client.state(), ClientState::Disconnected);

        let mut client = linked();
        let params = ConnectParams::new("localhost", 1);
        assert!(request(&mut client, ClientRequest::Connect(params)).is_empty());
        assert!(run(&mut client, Action::Comm(CommEvent::Connected)).is_empty());
        assert_eq!(client.state(), ClientState::LinkEstablished);
    }

    #[test]
    fn frames_split_across_reads() {
        let mut client = ClientCoordinator::default();
        run(&mut client, Action::Comm(CommEvent::Connected));
        let bytes = Frame::single(enumeration()).to_bytes().unwrap();
        let (head, tail) = bytes.split_at(1);
        assert!(run(
            &mut client,
            Action::Comm(CommEvent::Received(Bytes::copy_from_slice(head)))
        )
        .is_empty());
        run(
            &mut client,
            Action::Comm(CommEvent::Received(Bytes::copy_from_slice(tail))),
        );
        assert_eq!(client.state(), ClientState::LinkEstablished);
    }

    #[test]
    fn back_to_back_frames_see_updated_state() {
        let mut client = ClientCoordinator::default();
        run(&mut client, Action::Comm(CommEvent::Connected));
        let mut wire = Frame::single(enumeration()).to_bytes().unwrap().to_vec();
        wire.extend_from_slice(
            &Frame::single(PropertyValue {
                kind: PropertyKind::Notify,
                element_id: 1024,
                value: Bytes::from_static(&[0, 0, 0, 1]),
            })
            .to_bytes()
            .unwrap(),
        );
        let out = run(&mut client, Action::Comm(CommEvent::Received(wire.into())));
        assert!(notifications(&out).contains(&ClientNotification::PropertyValue {
            name: "x".into(),
            value: Value::U32(1),
        }));
    }

    #[test]
    fn multi_section_frame_ignored() {
        let mut client = ClientCoordinator::default();
        run(&mut client, Action::Comm(CommEvent::Connected));
        let frame = Frame::new(vec![enumeration().into(), Command::Reset.into()]);
        run(
            &mut client,
            Action::Comm(CommEvent::Received(frame.to_bytes().unwrap())),
        );
        assert_eq!(client.state(), ClientState::Enumerating);
    }

    #[test]
    fn garbage_does_not_change_state() {
        let mut client = linked();
        let out = run(
            &mut client,
            Action::Comm(CommEvent::Received(Bytes::from_static(&[
                0x00, 0x07, 0x00, 0x00, 0x00, 0x03, 0xEE,
            ]))),
        );
        assert!(out.is_empty());
        assert_eq!(client.state(), ClientState::LinkEstablished);
    }

    #[test]
    fn information_only_when_enabled() {
        let mut client = ClientCoordinator::new(CoordinatorConfig {
            include_information: true,
        });
        let out = request(&mut client, ClientRequest::Reset);
        assert!(matches!(&out[..], [env] if matches!(env.action, Action::Information(_))));
        assert_eq!(client.state(), ClientState::Disconnected);
    }
}

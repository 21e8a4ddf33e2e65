//! Adapters between applications and the router.
//!
//! Applications implement [`ClientApp`] or [`DeviceApp`] with plain
//! synchronous callbacks; the endpoints turn coordinator notifications into
//! those calls and the device's answers back into requests.

use sdrcat_frame::{DataType, DeviceInfo, Value, Values};
use tracing::debug;

use crate::client::ClientState;
use crate::message::{
    Action, ClientNotification, DeviceNotification, DeviceRequest, Envelope, Metadata,
};
use crate::router::Handler;

/// Callbacks for a client application. Every method defaults to a no-op.
pub trait ClientApp: Send {
    fn on_status(&mut self, _state: ClientState) {}

    fn on_device_info(&mut self, _info: &DeviceInfo) {}

    fn on_property_value(&mut self, _name: &str, _value: &Value) {}

    fn on_stream_data(&mut self, _stream: &str, _data: &Values, _metadata: &Metadata) {}

    fn on_information(&mut self, _text: &str) {}
}

/// Routes client notifications into a [`ClientApp`].
///
/// Register it under [`CLIENT`](crate::message::CLIENT). Requests go the
/// other way through [`Envelope::from_client`].
#[derive(Debug)]
pub struct ClientEndpoint<A> {
    app: A,
}

impl<A: ClientApp> ClientEndpoint<A> {
    pub fn new(app: A) -> Self {
        Self { app }
    }

    pub fn app(&self) -> &A {
        &self.app
    }

    pub fn into_app(self) -> A {
        self.app
    }
}

impl<A: ClientApp> Handler for ClientEndpoint<A> {
    fn handle(&mut self, envelope: &Envelope) -> Vec<Envelope> {
        match &envelope.action {
            Action::ToClient(notification) => match notification {
                ClientNotification::Status(state) => self.app.on_status(*state),
                ClientNotification::DeviceInfo(info) => self.app.on_device_info(info),
                ClientNotification::PropertyValue { name, value } => {
                    self.app.on_property_value(name, value)
                }
                ClientNotification::StreamData {
                    stream,
                    data,
                    metadata,
                } => self.app.on_stream_data(stream, data, metadata),
            },
            Action::Information(text) => self.app.on_information(text),
            _ => {}
        }
        Vec::new()
    }
}

/// Element declarations collected from [`DeviceApp::on_define`].
#[derive(Debug, Default)]
pub struct Definitions {
    requests: Vec<DeviceRequest>,
}

impl Definitions {
    pub fn new() -> Self {
        Self::default()
    }

    /// A property the client may read and write.
    pub fn property(&mut self, name: impl Into<String>, data_type: DataType) -> &mut Self {
        self.push(DeviceRequest::DefineProperty {
            name: name.into(),
            data_type,
            read_only: false,
        })
    }

    /// A property the client may only read.
    pub fn readonly_property(&mut self, name: impl Into<String>, data_type: DataType) -> &mut Self {
        self.push(DeviceRequest::DefineProperty {
            name: name.into(),
            data_type,
            read_only: true,
        })
    }

    pub fn metadata(&mut self, name: impl Into<String>, data_type: DataType) -> &mut Self {
        self.push(DeviceRequest::DefineMetadata {
            name: name.into(),
            data_type,
        })
    }

    /// A stream the device sends on.
    pub fn outgoing_stream(&mut self, name: impl Into<String>, data_type: DataType) -> &mut Self {
        self.push(DeviceRequest::DefineStream {
            name: name.into(),
            data_type,
            outgoing: true,
        })
    }

    /// A stream the client sends on.
    pub fn incoming_stream(&mut self, name: impl Into<String>, data_type: DataType) -> &mut Self {
        self.push(DeviceRequest::DefineStream {
            name: name.into(),
            data_type,
            outgoing: false,
        })
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    fn push(&mut self, request: DeviceRequest) -> &mut Self {
        self.requests.push(request);
        self
    }

    fn into_requests(self) -> Vec<DeviceRequest> {
        self.requests
    }
}

/// Callbacks for a device application.
pub trait DeviceApp: Send {
    /// Declare the device's elements. Called after every reset.
    fn on_define(&mut self, definitions: &mut Definitions);

    /// Current value of a readable property, or `None` to stay silent.
    fn on_get_property(&mut self, name: &str) -> Option<Value>;

    /// Apply a client write. Returning `true` reports the new value back.
    fn on_set_property(&mut self, name: &str, value: &Value) -> bool;

    fn on_stream_data(&mut self, _stream: &str, _data: &Values, _metadata: &Metadata) {}

    fn on_information(&mut self, _text: &str) {}
}

/// Routes device notifications into a [`DeviceApp`].
///
/// Register it under [`DEVICE`](crate::message::DEVICE). A reset
/// notification is answered with the app's declarations and `Ready`. The
/// coordinator only accepts them while not ready, so a reset requested by
/// the client over an established link leaves the link untouched.
#[derive(Debug)]
pub struct DeviceEndpoint<A> {
    app: A,
}

impl<A: DeviceApp> DeviceEndpoint<A> {
    pub fn new(app: A) -> Self {
        Self { app }
    }

    pub fn app(&self) -> &A {
        &self.app
    }

    pub fn into_app(self) -> A {
        self.app
    }

    fn redeclare(&mut self) -> Vec<Envelope> {
        let mut definitions = Definitions::new();
        self.app.on_define(&mut definitions);
        debug!(elements = definitions.len(), "device declarations");

        let mut out = Vec::with_capacity(definitions.len() + 1);
        out.extend(
            definitions
                .into_requests()
                .into_iter()
                .map(Envelope::from_device),
        );
        out.push(Envelope::from_device(DeviceRequest::Ready));
        out
    }
}

impl<A: DeviceApp> Handler for DeviceEndpoint<A> {
    fn handle(&mut self, envelope: &Envelope) -> Vec<Envelope> {
        match &envelope.action {
            Action::ToDevice(notification) => match notification {
                DeviceNotification::Reset => self.redeclare(),
                DeviceNotification::GetProperty { name } => self
                    .app
                    .on_get_property(name)
                    .map(|value| report(name, value))
                    .into_iter()
                    .collect(),
                DeviceNotification::SetProperty { name, value } => {
                    if self.app.on_set_property(name, value) {
                        vec![report(name, value.clone())]
                    } else {
                        debug!(property = %name, "write rejected by device");
                        Vec::new()
                    }
                }
                DeviceNotification::StreamData {
                    stream,
                    data,
                    metadata,
                } => {
                    self.app.on_stream_data(stream, data, metadata);
                    Vec::new()
                }
            },
            Action::Information(text) => {
                self.app.on_information(text);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }
}

fn report(name: &str, value: Value) -> Envelope {
    Envelope::from_device(DeviceRequest::ReportProperty {
        name: name.to_owned(),
        value,
    })
}

use sdrcat_frame::{Command, Frame, Section};
use tracing::{debug, warn};

use crate::message::{
    Action, ClientNotification, CommCommand, DeviceNotification, Envelope, Target, CLIENT, COMM,
    COORDINATOR, DEVICE,
};

/// Collects the messages a coordinator emits while handling one event.
#[derive(Debug)]
pub(crate) struct Outbox {
    include_information: bool,
    envelopes: Vec<Envelope>,
}

impl Outbox {
    pub(crate) fn new(include_information: bool) -> Self {
        Self {
            include_information,
            envelopes: Vec::new(),
        }
    }

    fn push(&mut self, target: &str, action: Action) {
        self.envelopes
            .push(Envelope::new(COORDINATOR, target, action));
    }

    pub(crate) fn comm(&mut self, command: CommCommand) {
        self.push(COMM, Action::ToComm(command));
    }

    pub(crate) fn client(&mut self, notification: ClientNotification) {
        self.push(CLIENT, Action::ToClient(notification));
    }

    pub(crate) fn device(&mut self, notification: DeviceNotification) {
        self.push(DEVICE, Action::ToDevice(notification));
    }

    /// Encode a single-section frame and hand it to the transport.
    pub(crate) fn transmit(&mut self, section: impl Into<Section>) {
        let section = section.into();
        match Frame::single(section).to_bytes() {
            Ok(bytes) => self.comm(CommCommand::Transmit(bytes)),
            Err(err) => {
                warn!(error = %err, "cannot encode outgoing frame");
                self.information(format!("dropped outgoing frame: {err}"));
            }
        }
    }

    pub(crate) fn not_allowed(&mut self) {
        self.transmit(Command::NotAllowed);
    }

    /// Advisory text. Always logged, only emitted when enabled.
    pub(crate) fn information(&mut self, text: impl Into<String>) {
        let text = text.into();
        debug!(info = %text, "coordinator");
        if self.include_information {
            self.envelopes.push(Envelope::new(
                COORDINATOR,
                Target::Broadcast,
                Action::Information(text),
            ));
        }
    }

    pub(crate) fn into_envelopes(self) -> Vec<Envelope> {
        self.envelopes
    }
}

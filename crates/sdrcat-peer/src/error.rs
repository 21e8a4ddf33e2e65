/// Errors that can occur in peer operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] sdrcat_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] sdrcat_frame::FrameError),

    /// A message was addressed to a name nobody registered.
    #[error("no handler registered for target '{0}'")]
    Routing(String),

    /// A handler name was registered twice.
    #[error("a handler named '{0}' is already registered")]
    DuplicateHandler(String),

    /// The other end of a channel or link went away.
    #[error("disconnected: {0}")]
    Disconnected(String),
}

pub type Result<T> = std::result::Result<T, PeerError>;

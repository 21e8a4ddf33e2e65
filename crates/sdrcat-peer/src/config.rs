use std::time::Duration;

/// Configuration shared by the client and device coordinators.
#[derive(Debug, Clone, Default)]
pub struct CoordinatorConfig {
    /// Emit advisory `Information` messages to the application.
    /// Protocol behavior is identical either way; the same text is always
    /// logged at debug level.
    pub include_information: bool,
}

/// Configuration for the message router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Fail dispatch when a message names an unregistered target.
    /// When false, such messages are logged and skipped.
    pub strict_routing: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            strict_routing: true,
        }
    }
}

/// Configuration for the TCP comm adapters.
#[derive(Debug, Clone)]
pub struct CommConfig {
    /// Bytes requested per socket read.
    pub read_chunk_size: usize,
    /// Write timeout applied to every link. `None` blocks indefinitely.
    pub write_timeout: Option<Duration>,
}

impl Default for CommConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: 4 * 1024,
            write_timeout: Some(Duration::from_secs(5)),
        }
    }
}

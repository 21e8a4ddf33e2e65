use std::collections::{HashMap, VecDeque};

use tracing::{debug, trace, warn};

use crate::config::RouterConfig;
use crate::error::{PeerError, Result};
use crate::message::{Action, Envelope, Target};

/// A named participant on the router.
///
/// Handlers run to completion. Whatever they return is queued behind the
/// messages already waiting, so effects are delivered in emission order.
pub trait Handler: Send {
    fn handle(&mut self, envelope: &Envelope) -> Vec<Envelope>;
}

impl<F> Handler for F
where
    F: FnMut(&Envelope) -> Vec<Envelope> + Send,
{
    fn handle(&mut self, envelope: &Envelope) -> Vec<Envelope> {
        self(envelope)
    }
}

/// Result of dispatching one message and everything it caused.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dispatched {
    /// Handler invocations performed.
    pub delivered: usize,
    /// A shutdown broadcast went through.
    pub shutdown: bool,
}

/// Delivers envelopes to handlers by name, or to all of them for
/// [`Target::Broadcast`], in registration order.
pub struct Router {
    config: RouterConfig,
    handlers: Vec<(String, Box<dyn Handler>)>,
    index: HashMap<String, usize>,
}

impl Router {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            handlers: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a handler under `name`.
    pub fn register(&mut self, name: impl Into<String>, handler: Box<dyn Handler>) -> Result<()> {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(PeerError::DuplicateHandler(name));
        }
        debug!(handler = %name, "registered handler");
        self.index.insert(name.clone(), self.handlers.len());
        self.handlers.push((name, handler));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.iter().map(|(name, _)| name.as_str())
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Deliver `envelope` and every envelope it transitively produces.
    ///
    /// Under strict routing an unknown target stops dispatch; messages
    /// still queued at that point are dropped.
    pub fn dispatch(&mut self, envelope: Envelope) -> Result<Dispatched> {
        let mut queue = VecDeque::from([envelope]);
        let mut outcome = Dispatched::default();

        while let Some(envelope) = queue.pop_front() {
            trace!(source = %envelope.source, target = %envelope.target, "dispatch");
            if matches!(envelope.action, Action::Shutdown) {
                outcome.shutdown = true;
            }

            match &envelope.target {
                Target::Broadcast => {
                    for (_, handler) in &mut self.handlers {
                        queue.extend(handler.handle(&envelope));
                        outcome.delivered += 1;
                    }
                }
                Target::Named(name) => match self.index.get(name) {
                    Some(&slot) => {
                        let (_, handler) = &mut self.handlers[slot];
                        queue.extend(handler.handle(&envelope));
                        outcome.delivered += 1;
                    }
                    None if self.config.strict_routing => {
                        warn!(
                            target = %name,
                            source = %envelope.source,
                            dropped = queue.len(),
                            "unroutable message"
                        );
                        return Err(PeerError::Routing(name.clone()));
                    }
                    None => {
                        debug!(target = %name, source = %envelope.source, "no handler, skipping");
                    }
                },
            }
        }

        Ok(outcome)
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("config", &self.config)
            .field("handlers", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

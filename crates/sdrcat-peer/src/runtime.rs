use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::RouterConfig;
use crate::error::{PeerError, Result};
use crate::message::Envelope;
use crate::router::{Dispatched, Handler, Router};

/// Cloneable sender for posting envelopes into a [`Runtime`] from other
/// threads.
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    tx: Sender<Envelope>,
}

impl RuntimeHandle {
    pub fn post(&self, envelope: Envelope) -> Result<()> {
        self.tx
            .send(envelope)
            .map_err(|_| PeerError::Disconnected("runtime stopped".into()))
    }

    /// Ask the runtime to stop after the messages already queued.
    pub fn shutdown(&self, source: &str) -> Result<()> {
        self.post(Envelope::shutdown(source))
    }
}

/// Serializes every event through one router.
///
/// Transport threads and user interfaces post into the inbox; the thread
/// that owns the runtime dispatches one envelope at a time, so no handler
/// ever runs concurrently with another.
#[derive(Debug)]
pub struct Runtime {
    router: Router,
    inbox: Receiver<Envelope>,
    handle: RuntimeHandle,
}

impl Runtime {
    pub fn new(config: RouterConfig) -> Self {
        let (tx, inbox) = mpsc::channel();
        Self {
            router: Router::new(config),
            inbox,
            handle: RuntimeHandle { tx },
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        self.handle.clone()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: impl Handler + 'static,
    ) -> Result<()> {
        self.router.register(name, Box::new(handler))
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Dispatch `envelope` right away, bypassing the inbox.
    pub fn post(&mut self, envelope: Envelope) -> Result<Dispatched> {
        self.router.dispatch(envelope)
    }

    /// Dispatch everything already in the inbox. Returns how many envelopes
    /// were taken from it.
    pub fn pump(&mut self) -> Result<usize> {
        let mut taken = 0;
        loop {
            match self.inbox.try_recv() {
                Ok(envelope) => {
                    taken += 1;
                    if self.router.dispatch(envelope)?.shutdown {
                        break;
                    }
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        Ok(taken)
    }

    /// Dispatch inbox envelopes as they arrive for up to `window`.
    ///
    /// Returns early with `true` once a shutdown went through.
    pub fn run_for(&mut self, window: Duration) -> Result<bool> {
        let deadline = Instant::now() + window;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.inbox.recv_timeout(remaining) {
                Ok(envelope) => {
                    if self.router.dispatch(envelope)?.shutdown {
                        return Ok(true);
                    }
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => {
                    return Ok(false);
                }
            }
        }
    }

    /// Dispatch inbox envelopes until a shutdown broadcast.
    pub fn run(&mut self) -> Result<()> {
        info!(handlers = ?self.router.names().collect::<Vec<_>>(), "runtime started");
        while let Ok(envelope) = self.inbox.recv() {
            if self.router.dispatch(envelope)?.shutdown {
                debug!("runtime shutdown");
                return Ok(());
            }
        }
        Ok(())
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::thread;

    use super::*;
    use crate::message::Action;

    fn counter(count: &Arc<Mutex<usize>>) -> impl Handler + 'static {
        let count = Arc::clone(count);
        move |_: &Envelope| -> Vec<Envelope> {
            *count.lock().unwrap() += 1;
            Vec::new()
        }
    }

    fn info(target: &str) -> Envelope {
        Envelope::new("test", target, Action::Information("ping".into()))
    }

    #[test]
    fn pump_drains_posted_envelopes() {
        let count = Arc::new(Mutex::new(0));
        let mut runtime = Runtime::default();
        runtime.register("sink", counter(&count)).unwrap();

        let handle = runtime.handle();
        handle.post(info("sink")).unwrap();
        handle.post(info("sink")).unwrap();
        assert_eq!(runtime.pump().unwrap(), 2);
        assert_eq!(runtime.pump().unwrap(), 0);
        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[test]
    fn run_stops_on_shutdown_from_another_thread() {
        let count = Arc::new(Mutex::new(0));
        let mut runtime = Runtime::default();
        runtime.register("sink", counter(&count)).unwrap();

        let handle = runtime.handle();
        let poster = thread::spawn(move || {
            for _ in 0..3 {
                handle.post(info("sink")).unwrap();
            }
            handle.shutdown("test").unwrap();
        });

        runtime.run().unwrap();
        poster.join().unwrap();
        // Three messages plus the shutdown broadcast.
        assert_eq!(*count.lock().unwrap(), 4);
    }

    #[test]
    fn strict_routing_error_surfaces_from_pump() {
        let mut runtime = Runtime::default();
        runtime.handle().post(info("missing")).unwrap();
        assert!(matches!(runtime.pump(), Err(PeerError::Routing(_))));
    }

    #[test]
    fn run_for_times_out_quietly() {
        let mut runtime = Runtime::default();
        assert!(!runtime.run_for(Duration::from_millis(10)).unwrap());
    }

    #[test]
    fn post_after_drop_is_disconnected() {
        let runtime = Runtime::default();
        let handle = runtime.handle();
        drop(runtime);
        assert!(matches!(
            handle.post(info("sink")),
            Err(PeerError::Disconnected(_))
        ));
    }
}

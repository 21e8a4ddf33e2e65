use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use sdrcat_frame::{DeviceInfo, Disposition, Element, Value, Values};
use sdrcat_peer::{
    ClientApp, ClientCoordinator, ClientEndpoint, ClientRequest, ClientState, CommConfig,
    ConnectParams, CoordinatorConfig, Envelope, Metadata, RouterConfig, Runtime, RuntimeHandle,
    TcpClientComm, CLIENT, COMM, COORDINATOR,
};
use tracing::debug;

use crate::cmd::{install_ctrlc_handler, parse_duration, ClientArgs};
use crate::exit::{io_error, peer_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_elements, print_event, Event, OutputFormat};

const POLL: Duration = Duration::from_millis(100);

const HELP: &[&str] = &[
    "connect [host port]   connect to a device",
    "disconnect            drop the link",
    "list                  show the device's elements",
    "get <name>            read a property",
    "all                   read every property",
    "set <name> <value>    write a property",
    "send <stream> <data>  send on a client-to-device stream",
    "reset                 ask the device to re-enumerate",
    "status                show the link state",
    "wait <duration>       pause, e.g. wait 500ms",
    "exit                  leave the console",
];

/// One line typed at the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ConsoleCommand {
    Connect(Option<(String, u16)>),
    Disconnect,
    List,
    Get(String),
    All,
    Set { name: String, text: String },
    Send { stream: String, text: String },
    Reset,
    Status,
    Wait(String),
    Help,
    Exit,
}

/// Parse a console line. Blank lines yield `Ok(None)`.
pub(crate) fn parse_console_line(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let rest: Vec<&str> = words.collect();

    let command = match (verb.to_ascii_lowercase().as_str(), rest.as_slice()) {
        ("connect", []) => ConsoleCommand::Connect(None),
        ("connect", [host, port]) => {
            let port = port
                .parse()
                .map_err(|_| format!("invalid port '{port}'"))?;
            ConsoleCommand::Connect(Some(((*host).to_owned(), port)))
        }
        ("connect", _) => return Err("usage: connect [host port]".into()),
        ("disconnect", []) => ConsoleCommand::Disconnect,
        ("list", []) => ConsoleCommand::List,
        ("get", [name]) => ConsoleCommand::Get((*name).to_owned()),
        ("get", _) => return Err("usage: get <name>".into()),
        ("all", []) => ConsoleCommand::All,
        ("set", [name, value @ ..]) if !value.is_empty() => ConsoleCommand::Set {
            name: (*name).to_owned(),
            text: value.join(" "),
        },
        ("set", _) => return Err("usage: set <name> <value>".into()),
        ("send", [stream, data @ ..]) if !data.is_empty() => ConsoleCommand::Send {
            stream: (*stream).to_owned(),
            text: data.join(" "),
        },
        ("send", _) => return Err("usage: send <stream> <data>".into()),
        ("reset", []) => ConsoleCommand::Reset,
        ("status", []) => ConsoleCommand::Status,
        ("wait", [duration]) => ConsoleCommand::Wait((*duration).to_owned()),
        ("wait", _) => return Err("usage: wait <duration>".into()),
        ("help" | "?", _) => ConsoleCommand::Help,
        ("exit" | "quit", []) => ConsoleCommand::Exit,
        (verb, _) => return Err(format!("unknown command '{verb}', try 'help'")),
    };
    Ok(Some(command))
}

pub fn run(args: ClientArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let view = View::default();

    let mut runtime = Runtime::new(RouterConfig::default());
    let handle = runtime.handle();
    let config = CoordinatorConfig {
        include_information: args.info,
    };
    let setup = |err| peer_error("client setup failed", err);
    runtime
        .register(COORDINATOR, ClientCoordinator::new(config))
        .map_err(setup)?;
    runtime
        .register(
            CLIENT,
            ClientEndpoint::new(Console {
                view: view.clone(),
                format,
            }),
        )
        .map_err(setup)?;
    runtime
        .register(COMM, TcpClientComm::new(handle.clone(), CommConfig::default()))
        .map_err(setup)?;

    let worker = thread::Builder::new()
        .name("sdrcat-runtime".into())
        .spawn(move || runtime.run())
        .map_err(|err| io_error("cannot start runtime", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone(), || {})?;

    let mut session = Session {
        handle,
        view,
        format,
        default_target: (args.host, args.port),
        timeout,
    };

    let outcome = if args.connect {
        session.execute(ConsoleCommand::Connect(None))
    } else {
        Ok(Flow::Continue)
    };
    let outcome = match outcome {
        Ok(Flow::Continue) => session.read_eval(&spawn_stdin_reader()?, &running),
        other => other.map(|_| ()),
    };

    let teardown = session.teardown();
    let joined = worker
        .join()
        .map_err(|_| CliError::new(INTERNAL, "runtime thread panicked"))?;

    outcome?;
    teardown?;
    joined.map_err(|err| peer_error("runtime stopped", err))?;
    Ok(SUCCESS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Exit,
}

/// The console's picture of the link, updated from the runtime thread.
#[derive(Debug, Clone, Default)]
struct View {
    inner: Arc<(Mutex<ViewState>, Condvar)>,
}

#[derive(Debug)]
struct ViewState {
    state: ClientState,
    info: Option<DeviceInfo>,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            state: ClientState::Disconnected,
            info: None,
        }
    }
}

impl View {
    fn lock(&self) -> MutexGuard<'_, ViewState> {
        self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, f: impl FnOnce(&mut ViewState)) {
        f(&mut self.lock());
        self.inner.1.notify_all();
    }

    fn state(&self) -> ClientState {
        self.lock().state
    }

    fn element(&self, name: &str) -> Option<Element> {
        self.lock()
            .info
            .as_ref()
            .and_then(|info| info.element(name))
            .cloned()
    }

    /// Block until `state` is reached or `timeout` passes.
    fn wait_for(&self, state: ClientState, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |view| view.state != state)
            .unwrap_or_else(PoisonError::into_inner);
        guard.state == state
    }
}

/// Prints notifications and keeps the [`View`] current.
struct Console {
    view: View,
    format: OutputFormat,
}

impl ClientApp for Console {
    fn on_status(&mut self, state: ClientState) {
        self.view.update(|view| {
            view.state = state;
            if state != ClientState::LinkEstablished {
                view.info = None;
            }
        });
        print_event(&Event::Status { state }, self.format);
    }

    fn on_device_info(&mut self, info: &DeviceInfo) {
        self.view.update(|view| view.info = Some(info.clone()));
        print_event(
            &Event::DeviceInfo {
                protocol_version: info.protocol_version,
                elements: info.elements.len(),
            },
            self.format,
        );
    }

    fn on_property_value(&mut self, name: &str, value: &Value) {
        print_event(&Event::Property { name, value }, self.format);
    }

    fn on_stream_data(&mut self, stream: &str, data: &Values, metadata: &Metadata) {
        print_event(
            &Event::StreamData {
                stream,
                data,
                metadata,
            },
            self.format,
        );
    }

    fn on_information(&mut self, text: &str) {
        print_event(&Event::Information { text }, self.format);
    }
}

struct Session {
    handle: RuntimeHandle,
    view: View,
    format: OutputFormat,
    default_target: (String, u16),
    timeout: Duration,
}

impl Session {
    fn read_eval(&mut self, lines: &Receiver<String>, running: &AtomicBool) -> CliResult<()> {
        while running.load(Ordering::SeqCst) {
            let line = match lines.recv_timeout(POLL) {
                Ok(line) => line,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            match parse_console_line(&line) {
                Ok(Some(command)) => {
                    if self.execute(command)? == Flow::Exit {
                        break;
                    }
                }
                Ok(None) => {}
                Err(message) => self.complain(&message),
            }
        }
        Ok(())
    }

    fn execute(&mut self, command: ConsoleCommand) -> CliResult<Flow> {
        debug!(?command, "console command");
        match command {
            ConsoleCommand::Connect(target) => {
                if self.view.state() != ClientState::Disconnected {
                    self.complain("already connected");
                    return Ok(Flow::Continue);
                }
                let (host, port) = target.unwrap_or_else(|| self.default_target.clone());
                self.post(ClientRequest::Connect(ConnectParams::new(host, port)))?;
                if !self
                    .view
                    .wait_for(ClientState::LinkEstablished, self.timeout)
                {
                    self.complain("no link established");
                }
            }
            ConsoleCommand::Disconnect => self.post(ClientRequest::Disconnect)?,
            ConsoleCommand::List => match self.view.lock().info.as_ref() {
                Some(info) => print_elements(info, self.format),
                None => self.complain("no device enumerated"),
            },
            ConsoleCommand::Get(name) => {
                if self.readable(&name).is_some() {
                    self.post(ClientRequest::GetProperty { name })?;
                }
            }
            ConsoleCommand::All => {
                let names: Vec<String> = self
                    .view
                    .lock()
                    .info
                    .as_ref()
                    .map(|info| {
                        info.elements
                            .iter()
                            .filter(|e| e.disposition.is_readable())
                            .map(|e| e.name.clone())
                            .collect()
                    })
                    .unwrap_or_default();
                for name in names {
                    self.post(ClientRequest::GetProperty { name })?;
                }
            }
            ConsoleCommand::Set { name, text } => {
                let Some(element) = self.element(&name, Disposition::EditableProperty) else {
                    return Ok(Flow::Continue);
                };
                match Value::parse(element.data_type, &text) {
                    Ok(value) => self.post(ClientRequest::SetProperty { name, value })?,
                    Err(err) => self.complain(&err.to_string()),
                }
            }
            ConsoleCommand::Send { stream, text } => {
                let Some(element) = self.element(&stream, Disposition::ClientToDeviceStream)
                else {
                    return Ok(Flow::Continue);
                };
                match Values::parse(element.data_type, &text) {
                    Ok(data) => self.post(ClientRequest::SendData {
                        stream,
                        data,
                        metadata: Metadata::new(),
                    })?,
                    Err(err) => self.complain(&err.to_string()),
                }
            }
            ConsoleCommand::Reset => self.post(ClientRequest::Reset)?,
            ConsoleCommand::Status => print_event(
                &Event::Status {
                    state: self.view.state(),
                },
                self.format,
            ),
            ConsoleCommand::Wait(duration) => thread::sleep(parse_duration(&duration)?),
            ConsoleCommand::Help => {
                for line in HELP {
                    println!("{line}");
                }
            }
            ConsoleCommand::Exit => return Ok(Flow::Exit),
        }
        Ok(Flow::Continue)
    }

    /// Drop the link if one is up, then stop the runtime.
    fn teardown(&self) -> CliResult<()> {
        if self.view.state() != ClientState::Disconnected {
            self.post(ClientRequest::Disconnect)?;
        }
        self.handle
            .shutdown(CLIENT)
            .map_err(|err| peer_error("cannot stop runtime", err))
    }

    fn post(&self, request: ClientRequest) -> CliResult<()> {
        self.handle
            .post(Envelope::from_client(request))
            .map_err(|err| peer_error("runtime stopped", err))
    }

    fn readable(&self, name: &str) -> Option<Element> {
        let element = self.lookup(name)?;
        if element.disposition.is_readable() {
            Some(element)
        } else {
            self.complain(&format!("'{name}' is not a property"));
            None
        }
    }

    fn element(&self, name: &str, disposition: Disposition) -> Option<Element> {
        let element = self.lookup(name)?;
        if element.disposition == disposition {
            Some(element)
        } else {
            self.complain(&format!("'{name}' is {}", element.disposition));
            None
        }
    }

    fn lookup(&self, name: &str) -> Option<Element> {
        if self.view.state() != ClientState::LinkEstablished {
            self.complain("not connected");
            return None;
        }
        let element = self.view.element(name);
        if element.is_none() {
            self.complain(&format!("unknown element '{name}'"));
        }
        element
    }

    fn complain(&self, message: &str) {
        print_event(&Event::Error { message }, self.format);
    }
}

/// Read stdin on its own thread so Ctrl-C is noticed between lines.
fn spawn_stdin_reader() -> CliResult<Receiver<String>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("sdrcat-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { return };
                if tx.send(line).is_err() {
                    return;
                }
            }
        })
        .map_err(|err| io_error("cannot read stdin", err))?;
    Ok(rx)
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use sdrcat_frame::{DataType, Value, Values};
use sdrcat_peer::{
    CommConfig, ConnectParams, CoordinatorConfig, Definitions, DeviceApp, DeviceCoordinator,
    DeviceEndpoint, DeviceRequest, Envelope, Metadata, RouterConfig, Runtime, RuntimeHandle,
    TcpDeviceComm, COMM, COORDINATOR, DEVICE,
};
use tracing::{debug, info};

use crate::cmd::{install_ctrlc_handler, parse_duration, DeviceArgs};
use crate::exit::{io_error, peer_error, CliError, CliResult, SUCCESS, TRANSPORT_ERROR};
use crate::output::{print_event, Event, OutputFormat};

const PROP1: &str = "prop1";
const PROP2: &str = "prop2";
const PROP3: &str = "prop3";
const CHANGE_RANDOMLY: &str = "changePropertiesRandomly";
const SEQUENCE: &str = "sequence";
const OUTGOING: &str = "stream0";
const INCOMING: &str = "stream1";

const PROP1_CHOICES: [&str; 3] = ["foo", "bar", "baz"];
const NOTHING_TO_REPORT: &str = "Nothing to report.";
const NOTHING_RECEIVED: &str = "Big giant void!";

const TICK: Duration = Duration::from_millis(50);

pub fn run(args: DeviceArgs, format: OutputFormat) -> CliResult<i32> {
    let interval = parse_duration(&args.interval)?;
    let params = ConnectParams::new(args.host, args.port);
    let instrument = Arc::new(Mutex::new(Instrument::default()));

    let mut runtime = Runtime::new(RouterConfig::default());
    let handle = runtime.handle();
    let comm = TcpDeviceComm::new(handle.clone(), CommConfig::default());
    let bound = comm.bound_addr();

    let config = CoordinatorConfig {
        include_information: args.info,
    };
    let setup = |err| peer_error("device setup failed", err);
    runtime
        .register(COORDINATOR, DeviceCoordinator::new(config))
        .map_err(setup)?;
    runtime
        .register(
            DEVICE,
            DeviceEndpoint::new(SampleDevice {
                instrument: Arc::clone(&instrument),
                format,
            }),
        )
        .map_err(setup)?;
    runtime.register(COMM, comm).map_err(setup)?;

    runtime
        .post(Envelope::from_device(DeviceRequest::Start(params.clone())))
        .map_err(|err| peer_error("device start failed", err))?;
    let addr = bound.get().ok_or_else(|| {
        CliError::new(TRANSPORT_ERROR, format!("cannot listen on {params}"))
    })?;
    print_event(
        &Event::Listening {
            addr: addr.to_string(),
        },
        format,
    );

    let running = Arc::new(AtomicBool::new(true));
    let interrupt = handle.clone();
    install_ctrlc_handler(running.clone(), move || {
        let _ = interrupt.shutdown(DEVICE);
    })?;

    let rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let reporter = spawn_reporter(
        Arc::clone(&instrument),
        handle,
        interval,
        rng,
        Arc::clone(&running),
    )?;

    let result = runtime.run();
    running.store(false, Ordering::SeqCst);
    let _ = reporter.join();
    result.map_err(|err| peer_error("device stopped", err))?;

    info!("device stopped");
    Ok(SUCCESS)
}

/// Live values behind the sample device's elements.
#[derive(Debug)]
struct Instrument {
    prop1: String,
    prop2: String,
    prop3: u32,
    change_randomly: String,
    last_received: Option<String>,
    sequence: u32,
}

impl Default for Instrument {
    fn default() -> Self {
        Self {
            prop1: "foo".into(),
            prop2: "bar".into(),
            prop3: 7337,
            change_randomly: "true".into(),
            last_received: None,
            sequence: 0,
        }
    }
}

impl Instrument {
    fn get(&self, name: &str) -> Option<Value> {
        match name {
            PROP1 => Some(Value::Utf8(self.prop1.clone())),
            PROP2 => Some(Value::Utf8(self.prop2.clone())),
            PROP3 => Some(Value::U32(self.prop3)),
            CHANGE_RANDOMLY => Some(Value::Utf8(self.change_randomly.clone())),
            _ => None,
        }
    }

    fn set(&mut self, name: &str, value: &Value) -> bool {
        match (name, value) {
            (PROP2, Value::Utf8(text)) => self.prop2 = text.clone(),
            (PROP3, Value::U32(v)) => self.prop3 = *v,
            (CHANGE_RANDOMLY, Value::Utf8(text)) => self.change_randomly = text.clone(),
            _ => return false,
        }
        true
    }

    /// The unsolicited report for one tick.
    ///
    /// Either a property change (or a note that nothing changed), or the
    /// last text received on the incoming stream with its words shuffled.
    fn next_report(&mut self, rng: &mut impl Rng) -> DeviceRequest {
        if rng.gen_bool(0.5) {
            if self.change_randomly == "true" {
                if let Some(choice) = PROP1_CHOICES.choose(rng) {
                    self.prop1 = (*choice).to_owned();
                }
                return DeviceRequest::ReportProperty {
                    name: PROP1.into(),
                    value: Value::Utf8(self.prop1.clone()),
                };
            }
            return self.send(NOTHING_TO_REPORT.to_owned());
        }

        let text = match &self.last_received {
            Some(text) => {
                let mut words: Vec<&str> = text.split_whitespace().collect();
                words.shuffle(rng);
                words.join(" ")
            }
            None => NOTHING_RECEIVED.to_owned(),
        };
        self.send(text)
    }

    fn send(&mut self, text: String) -> DeviceRequest {
        let mut metadata = Metadata::new();
        metadata.insert(SEQUENCE.into(), Value::U32(self.sequence));
        self.sequence = self.sequence.wrapping_add(1);
        DeviceRequest::SendData {
            stream: OUTGOING.into(),
            data: Values::Utf8(text),
            metadata,
        }
    }
}

struct SampleDevice {
    instrument: Arc<Mutex<Instrument>>,
    format: OutputFormat,
}

impl SampleDevice {
    fn with<T>(&self, f: impl FnOnce(&mut Instrument) -> T) -> T {
        let mut instrument = self
            .instrument
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut instrument)
    }
}

impl DeviceApp for SampleDevice {
    fn on_define(&mut self, definitions: &mut Definitions) {
        definitions
            .readonly_property(PROP1, DataType::Utf8)
            .property(PROP2, DataType::Utf8)
            .property(PROP3, DataType::Uint32)
            .property(CHANGE_RANDOMLY, DataType::Utf8)
            .metadata(SEQUENCE, DataType::Uint32)
            .outgoing_stream(OUTGOING, DataType::Utf8)
            .incoming_stream(INCOMING, DataType::Utf8);
    }

    fn on_get_property(&mut self, name: &str) -> Option<Value> {
        self.with(|instrument| instrument.get(name))
    }

    fn on_set_property(&mut self, name: &str, value: &Value) -> bool {
        let accepted = self.with(|instrument| instrument.set(name, value));
        if accepted {
            info!(property = name, %value, "property written");
        }
        accepted
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
        if let (INCOMING, Values::Utf8(text)) = (stream, data) {
            self.with(|instrument| instrument.last_received = Some(text.clone()));
        }
    }

    fn on_information(&mut self, text: &str) {
        print_event(&Event::Information { text }, self.format);
    }
}

fn spawn_reporter(
    instrument: Arc<Mutex<Instrument>>,
    handle: RuntimeHandle,
    interval: Duration,
    mut rng: StdRng,
    running: Arc<AtomicBool>,
) -> CliResult<JoinHandle<()>> {
    thread::Builder::new()
        .name("sdrcat-reporter".into())
        .spawn(move || {
            let mut next = Instant::now() + interval;
            while running.load(Ordering::SeqCst) {
                if Instant::now() < next {
                    thread::sleep(TICK.min(next.saturating_duration_since(Instant::now())));
                    continue;
                }
                next += interval;

                let request = instrument
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .next_report(&mut rng);
                debug!(?request, "unsolicited report");
                if handle.post(Envelope::from_device(request)).is_err() {
                    return;
                }
            }
        })
        .map_err(|err| io_error("cannot start reporter", err))
}

use std::{
    cell::RefCell,
    collections::VecDeque,
    sync::Once,
    time::Instant,
};

use log::{Level, LevelFilter, Log, Metadata, Record};

use crate::{
    config::ConfigState,
    error::WeatherError,
    reconcile::{OptionStore, RainDelayTimer},
    transport::{Endpoint, Receive, Transport},
    types::FieldUpdate,
};

#[derive(Debug, Default)]
pub struct MemoryController {
    pub state: ConfigState,
    pub writes: Vec<FieldUpdate>,
    pub checks: Vec<i64>,
    pub fail_writes: bool,
    pub delays_started: Vec<i64>,
    pub delays_stopped: usize,
}

impl OptionStore for MemoryController {
    type Error = &'static str;

    fn config_state(&self) -> ConfigState {
        self.state.clone()
    }

    fn persist(&mut self, update: FieldUpdate) -> Result<(), Self::Error> {
        if self.fail_writes {
            return Err("flash busy");
        }
        update.apply_to(&mut self.state);
        self.writes.push(update);
        Ok(())
    }

    fn record_check(&mut self, local_at: i64) {
        self.state.last_weather_success = Some(local_at);
        self.checks.push(local_at);
    }
}

impl RainDelayTimer for MemoryController {
    fn start(&mut self, local_stop: i64) {
        self.delays_started.push(local_stop);
    }

    fn stop(&mut self) {
        self.delays_stopped += 1;
    }
}

#[derive(Debug, Clone)]
pub enum Step {
    Data(Vec<u8>),
    Timeout,
    Closed,
}

#[derive(Debug)]
pub struct ScriptedTransport {
    pub connect_error: Option<WeatherError>,
    pub steps: VecDeque<Step>,
    pub endpoints: Vec<Endpoint>,
    pub sent: Vec<u8>,
}

impl ScriptedTransport {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            connect_error: None,
            steps: steps.into_iter().collect(),
            endpoints: Vec::new(),
            sent: Vec::new(),
        }
    }

    pub fn responding(response: &str) -> Self {
        Self::new([Step::Data(response.as_bytes().to_vec()), Step::Closed])
    }

    pub fn failing(error: WeatherError) -> Self {
        Self {
            connect_error: Some(error),
            ..Self::new([])
        }
    }
}

impl Transport for ScriptedTransport {
    type Connection = ();

    fn connect(&mut self, endpoint: &Endpoint, _deadline: Instant) -> Result<(), WeatherError> {
        self.endpoints.push(endpoint.clone());
        match self.connect_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn send(&mut self, _conn: &mut (), bytes: &[u8]) -> Result<(), WeatherError> {
        self.sent.extend_from_slice(bytes);
        Ok(())
    }

    fn receive(&mut self, _conn: &mut (), buf: &mut [u8], _deadline: Instant) -> Receive {
        match self.steps.pop_front() {
            Some(Step::Data(mut bytes)) => {
                let count = bytes.len().min(buf.len());
                buf[..count].copy_from_slice(&bytes[..count]);
                if count < bytes.len() {
                    self.steps.push_front(Step::Data(bytes.split_off(count)));
                }
                Receive::Data(count)
            }
            Some(Step::Timeout) => Receive::Timeout,
            Some(Step::Closed) | None => Receive::Closed,
        }
    }
}

thread_local! {
    static RECORDS: RefCell<Vec<(Level, String)>> = const { RefCell::new(Vec::new()) };
}

struct ThreadLogger;

impl Log for ThreadLogger {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        RECORDS.with(|records| {
            records
                .borrow_mut()
                .push((record.level(), record.args().to_string()))
        });
    }

    fn flush(&self) {}
}

static LOGGER: ThreadLogger = ThreadLogger;
static LOGGER_INIT: Once = Once::new();

/// Runs `f` and returns the log records it emitted on this thread.
pub fn capture_logs<R>(f: impl FnOnce() -> R) -> (R, Vec<(Level, String)>) {
    LOGGER_INIT.call_once(|| {
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(LevelFilter::Trace);
        }
    });
    RECORDS.with(|records| records.borrow_mut().clear());
    let result = f();
    let records = RECORDS.with(|records| records.borrow_mut().drain(..).collect());
    (result, records)
}

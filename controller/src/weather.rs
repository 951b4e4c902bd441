use std::time::Duration;

use anyhow::Context;
use log::{info, warn};
use sprinkler_common::{
    ConfigState, CycleReport, FieldUpdate, OptionStore, PipelineState, RainDelayTimer,
    RuntimeConfig, Transport, UpdateFlags, WeatherConfig, WeatherStatus, WeatherSync,
};

pub trait RuntimeSink {
    fn save(&mut self, runtime: &RuntimeConfig) -> anyhow::Result<()>;
}

pub struct SprinklerController<S> {
    runtime: RuntimeConfig,
    sink: S,
    host_override: Option<String>,
    last_cycle: Option<CycleReport>,
}

impl<S: RuntimeSink> SprinklerController<S> {
    pub fn new(runtime: RuntimeConfig, sink: S) -> Self {
        Self {
            runtime,
            sink,
            host_override: None,
            last_cycle: None,
        }
    }

    pub fn with_host_override(mut self, host: Option<String>) -> Self {
        self.host_override = host.filter(|host| !host.trim().is_empty());
        self
    }

    pub fn runtime(&self) -> &RuntimeConfig {
        &self.runtime
    }

    pub fn weather(&self) -> &WeatherConfig {
        &self.runtime.weather
    }

    pub fn weather_host(&self) -> &str {
        self.host_override
            .as_deref()
            .unwrap_or(&self.runtime.weather.host)
    }

    pub fn local_now(&self, utc_epoch: i64) -> i64 {
        self.runtime.state.local_epoch(utc_epoch)
    }

    pub fn replace_weather(&mut self, mut weather: WeatherConfig) -> anyhow::Result<()> {
        weather.sanitize();
        weather
            .validate(self.runtime.firmware_version)
            .context("weather config rejected")?;

        let mut next = self.runtime.clone();
        next.weather = weather;
        self.sink
            .save(&next)
            .context("failed to persist weather config")?;
        self.runtime = next;
        Ok(())
    }

    /// Clears a rain delay whose stop time has passed. Returns whether one did.
    pub fn expire_rain_delay(&mut self, local_now: i64) -> bool {
        match self.runtime.state.rain_delay_stop {
            Some(stop) if stop <= local_now => {
                info!("rain delay ended");
                self.stop();
                true
            }
            _ => false,
        }
    }

    pub fn status(&self, local_now: i64) -> WeatherStatus {
        let (state, error, flags) = match &self.last_cycle {
            Some(report) => (
                report.state,
                report.error.as_ref().map(ToString::to_string),
                report.flags,
            ),
            None => (PipelineState::Idle, None, UpdateFlags::empty()),
        };
        WeatherStatus::new(state, error, flags, &self.runtime.state, local_now)
    }

    fn save_state(&mut self, what: &str) {
        if let Err(err) = self.sink.save(&self.runtime) {
            warn!("failed to persist {what}: {err:#}");
        }
    }
}

impl<S: RuntimeSink> OptionStore for SprinklerController<S> {
    type Error = anyhow::Error;

    fn config_state(&self) -> ConfigState {
        self.runtime.state.clone()
    }

    fn persist(&mut self, update: FieldUpdate) -> anyhow::Result<()> {
        let mut next = self.runtime.clone();
        update.apply_to(&mut next.state);
        self.sink.save(&next)?;
        self.runtime = next;
        Ok(())
    }

    fn record_check(&mut self, local_at: i64) {
        self.runtime.state.last_weather_success = Some(local_at);
        info!(
            "water level {}% recorded",
            self.runtime.state.water_scale_percent
        );
    }
}

impl<S: RuntimeSink> RainDelayTimer for SprinklerController<S> {
    fn start(&mut self, local_stop: i64) {
        info!("rain delay active until {local_stop}");
        self.runtime.state.rain_delay_stop = Some(local_stop);
        self.save_state("rain delay start");
    }

    fn stop(&mut self) {
        if self.runtime.state.rain_delay_stop.take().is_some() {
            info!("rain delay cancelled");
            self.save_state("rain delay stop");
        }
    }
}

pub fn run_weather_check<T, S>(
    sync: &mut WeatherSync,
    transport: &mut T,
    controller: &mut SprinklerController<S>,
    utc_now: i64,
) -> CycleReport
where
    T: Transport,
    S: RuntimeSink,
{
    let weather = controller.weather().clone();
    let host = controller.weather_host().to_string();
    let firmware_version = controller.runtime().firmware_version;
    sync.set_timeout(Duration::from_secs(weather.timeout_secs));

    let local_now = controller.local_now(utc_now);
    controller.expire_rain_delay(local_now);

    let report = sync.run_cycle(
        &mut *transport,
        &mut *controller,
        &weather.query(firmware_version),
        &host,
        utc_now,
    );

    if report.flags.contains(UpdateFlags::TIMEZONE) {
        info!(
            "timezone code now {}; resyncing controller clock",
            controller.runtime().state.timezone_code
        );
    }

    controller.last_cycle = Some(report.clone());
    report
}

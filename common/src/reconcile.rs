use std::fmt;

use log::warn;

use crate::{
    config::{ConfigState, MAX_MINUTE_OF_DAY, MAX_TIMEZONE_CODE, MAX_WATER_SCALE_PERCENT},
    fields::{
        ResponseFields, KEY_EXTERNAL_IP, KEY_RAIN_DELAY, KEY_SCALE, KEY_SUNRISE, KEY_SUNSET,
        KEY_TIMEZONE,
    },
    types::{FieldUpdate, UpdateFlags, WeatherAction},
};

pub trait OptionStore {
    type Error: fmt::Display;

    fn config_state(&self) -> ConfigState;

    /// Must leave the in-memory state unchanged on failure.
    fn persist(&mut self, update: FieldUpdate) -> Result<(), Self::Error>;

    fn record_check(&mut self, local_at: i64);
}

pub trait RainDelayTimer {
    fn start(&mut self, local_stop: i64);

    fn stop(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    actions: Vec<WeatherAction>,
}

impl Reconciliation {
    pub fn actions(&self) -> &[WeatherAction] {
        &self.actions
    }

    pub fn planned_flags(&self) -> UpdateFlags {
        self.actions
            .iter()
            .filter_map(|action| match action {
                WeatherAction::Persist(update) => Some(update.flag()),
                _ => None,
            })
            .fold(UpdateFlags::empty(), |flags, flag| flags | flag)
    }

    /// A field is flagged only once the store accepted its write.
    pub fn apply<C>(self, controller: &mut C) -> UpdateFlags
    where
        C: OptionStore + RainDelayTimer,
    {
        let mut flags = UpdateFlags::empty();
        for action in self.actions {
            match action {
                WeatherAction::Persist(update) => match controller.persist(update) {
                    Ok(()) => flags.insert(update.flag()),
                    Err(err) => warn!("failed to persist {update:?}: {err}"),
                },
                WeatherAction::StartRainDelay { until_utc } => {
                    let local_stop = controller.config_state().local_epoch(until_utc);
                    controller.start(local_stop);
                }
                WeatherAction::StopRainDelay => controller.stop(),
                WeatherAction::RecordCheck { at_utc } => {
                    let local_at = controller.config_state().local_epoch(at_utc);
                    controller.record_check(local_at);
                }
            }
        }
        flags
    }
}

pub struct Reconciler;

impl Reconciler {
    pub fn reconcile(
        fields: &ResponseFields<'_>,
        current: &ConfigState,
        utc_now: i64,
    ) -> Option<Reconciliation> {
        if !fields.is_engaged() {
            return None;
        }

        let mut actions = Vec::new();

        let sunrise = parse_in_range::<u16>(fields.get(KEY_SUNRISE), MAX_MINUTE_OF_DAY);
        if let Some(minute) = sunrise.filter(|&v| v != current.sunrise_minute) {
            actions.push(WeatherAction::Persist(FieldUpdate::Sunrise(minute)));
        }

        let sunset = parse_in_range::<u16>(fields.get(KEY_SUNSET), MAX_MINUTE_OF_DAY);
        if let Some(minute) = sunset.filter(|&v| v != current.sunset_minute) {
            actions.push(WeatherAction::Persist(FieldUpdate::Sunset(minute)));
        }

        let external_ip = fields.get(KEY_EXTERNAL_IP).and_then(|v| v.trim().parse::<u32>().ok());
        if let Some(ip) = external_ip.filter(|&v| v != current.external_ip) {
            actions.push(WeatherAction::Persist(FieldUpdate::ExternalIp(ip)));
        }

        let scale = parse_in_range::<u8>(fields.get(KEY_SCALE), MAX_WATER_SCALE_PERCENT);
        if let Some(percent) = scale.filter(|&v| v != current.water_scale_percent) {
            actions.push(WeatherAction::Persist(FieldUpdate::WaterScale(percent)));
        }

        let timezone = parse_in_range::<u8>(fields.get(KEY_TIMEZONE), MAX_TIMEZONE_CODE);
        if let Some(code) = timezone.filter(|&v| v != current.timezone_code) {
            actions.push(WeatherAction::Persist(FieldUpdate::Timezone(code)));
        }

        // Not change-gated.
        let rain_delay = fields.get(KEY_RAIN_DELAY).and_then(|v| v.trim().parse::<i64>().ok());
        match rain_delay {
            Some(hours) if hours > 0 => actions.push(WeatherAction::StartRainDelay {
                until_utc: utc_now.saturating_add(hours.saturating_mul(3600)),
            }),
            Some(0) => actions.push(WeatherAction::StopRainDelay),
            _ => {}
        }

        actions.push(WeatherAction::RecordCheck { at_utc: utc_now });

        Some(Reconciliation { actions })
    }
}

fn parse_in_range<T>(raw: Option<&str>, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    raw?.trim().parse::<T>().ok().filter(|value| *value <= max)
}

use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ConfigState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdateFlags(u8);

impl UpdateFlags {
    pub const SUNRISE: Self = Self(0x01);
    pub const SUNSET: Self = Self(0x02);
    pub const EXTERNAL_IP: Self = Self(0x04);
    pub const SCALE: Self = Self(0x08);
    pub const TIMEZONE: Self = Self(0x10);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn names(self) -> Vec<&'static str> {
        [
            (Self::SUNRISE, "sunrise"),
            (Self::SUNSET, "sunset"),
            (Self::EXTERNAL_IP, "eip"),
            (Self::SCALE, "scale"),
            (Self::TIMEZONE, "tz"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
        .collect()
    }
}

impl std::ops::BitOr for UpdateFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldUpdate {
    Sunrise(u16),
    Sunset(u16),
    ExternalIp(u32),
    WaterScale(u8),
    Timezone(u8),
}

impl FieldUpdate {
    pub fn flag(self) -> UpdateFlags {
        match self {
            Self::Sunrise(_) => UpdateFlags::SUNRISE,
            Self::Sunset(_) => UpdateFlags::SUNSET,
            Self::ExternalIp(_) => UpdateFlags::EXTERNAL_IP,
            Self::WaterScale(_) => UpdateFlags::SCALE,
            Self::Timezone(_) => UpdateFlags::TIMEZONE,
        }
    }

    pub fn apply_to(self, state: &mut ConfigState) {
        match self {
            Self::Sunrise(minute) => state.sunrise_minute = minute,
            Self::Sunset(minute) => state.sunset_minute = minute,
            Self::ExternalIp(ip) => state.external_ip = ip,
            Self::WaterScale(percent) => state.water_scale_percent = percent,
            Self::Timezone(code) => state.timezone_code = code,
        }
    }
}

/// Times are UTC epoch seconds. They are localised when applied, after any
/// timezone write earlier in the same plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WeatherAction {
    Persist(FieldUpdate),
    StartRainDelay { until_utc: i64 },
    StopRainDelay,
    RecordCheck { at_utc: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    Idle,
    Encoding,
    Connecting,
    Awaiting,
    Framing,
    Parsing,
    Reconciled,
}

impl PipelineState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Encoding => "ENCODING",
            Self::Connecting => "CONNECTING",
            Self::Awaiting => "AWAITING",
            Self::Framing => "FRAMING",
            Self::Parsing => "PARSING",
            Self::Reconciled => "RECONCILED",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WeatherStatus {
    pub state: &'static str,
    pub error: Option<String>,
    pub updated: Vec<&'static str>,
    #[serde(rename = "sunriseMinute")]
    pub sunrise_minute: u16,
    #[serde(rename = "sunsetMinute")]
    pub sunset_minute: u16,
    #[serde(rename = "externalIp")]
    pub external_ip: String,
    #[serde(rename = "waterScalePercent")]
    pub water_scale_percent: u8,
    #[serde(rename = "timezoneCode")]
    pub timezone_code: u8,
    #[serde(rename = "rainDelayed")]
    pub rain_delayed: bool,
    #[serde(rename = "rainDelayStop")]
    pub rain_delay_stop: Option<String>,
    #[serde(rename = "lastSuccess")]
    pub last_success: Option<String>,
}

impl WeatherStatus {
    pub fn new(
        state: PipelineState,
        error: Option<String>,
        flags: UpdateFlags,
        config: &ConfigState,
        local_now: i64,
    ) -> Self {
        let offset = config.utc_offset();
        Self {
            state: state.as_str(),
            error,
            updated: flags.names(),
            sunrise_minute: config.sunrise_minute,
            sunset_minute: config.sunset_minute,
            external_ip: std::net::Ipv4Addr::from(config.external_ip).to_string(),
            water_scale_percent: config.water_scale_percent,
            timezone_code: config.timezone_code,
            rain_delayed: config.is_rain_delayed(local_now),
            rain_delay_stop: config
                .rain_delay_stop
                .and_then(|at| format_local(at, offset)),
            last_success: config
                .last_weather_success
                .and_then(|at| format_local(at, offset)),
        }
    }
}

pub fn format_local(local_epoch: i64, offset: FixedOffset) -> Option<String> {
    let utc_epoch = local_epoch - i64::from(offset.local_minus_utc());
    let utc: DateTime<Utc> = Utc.timestamp_opt(utc_epoch, 0).single()?;
    Some(utc.with_timezone(&offset).to_rfc3339())
}

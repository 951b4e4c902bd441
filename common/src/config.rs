use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    encoder::{WeatherQuery, ENCODE_HEADROOM, SCRATCH_BUFFER_SIZE},
    error::ConfigError,
};

pub const DEFAULT_FIRMWARE_VERSION: u16 = 219;
pub const DEFAULT_WEATHER_HOST: &str = "weather.opensprinkler.com";

pub const MAX_MINUTE_OF_DAY: u16 = 1440;
pub const MAX_WATER_SCALE_PERCENT: u8 = 250;
pub const MAX_TIMEZONE_CODE: u8 = 108;
pub const MAX_TIMEOUT_SECS: u64 = 5;
/// Timezone codes count quarter hours from UTC-12:00, so 48 is UTC.
pub const UTC_TIMEZONE_CODE: u8 = 48;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeatherConfig {
    pub provider: u8,
    pub location: String,
    pub api_key: String,
    pub provider_options: String,
    pub host: String,
    pub check_interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            provider: 0,
            location: "Boston,MA".to_string(),
            api_key: String::new(),
            provider_options: String::new(),
            host: DEFAULT_WEATHER_HOST.to_string(),
            check_interval_secs: 21_600,
            timeout_secs: 5,
        }
    }
}

impl WeatherConfig {
    pub fn query(&self, firmware_version: u16) -> WeatherQuery<'_> {
        WeatherQuery {
            provider: self.provider,
            location: &self.location,
            api_key: &self.api_key,
            provider_options: &self.provider_options,
            firmware_version,
        }
    }

    /// Rejects settings the encoder could not fit into the scratch buffer.
    pub fn validate(&self, firmware_version: u16) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }

        let required = self.query(firmware_version).encoded_len();
        let available = SCRATCH_BUFFER_SIZE - ENCODE_HEADROOM;
        if required > available {
            return Err(ConfigError::QueryTooLong {
                required,
                available,
            });
        }
        Ok(())
    }

    pub fn sanitize(&mut self) {
        self.check_interval_secs = self.check_interval_secs.clamp(60, 86_400);
        self.timeout_secs = self.timeout_secs.clamp(1, MAX_TIMEOUT_SECS);
        if self.host.trim().is_empty() {
            self.host = DEFAULT_WEATHER_HOST.to_string();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigState {
    pub sunrise_minute: u16,
    pub sunset_minute: u16,
    pub external_ip: u32,
    pub water_scale_percent: u8,
    pub timezone_code: u8,
    #[serde(default)]
    pub rain_delay_stop: Option<i64>,
    #[serde(default)]
    pub last_weather_success: Option<i64>,
}

impl Default for ConfigState {
    fn default() -> Self {
        Self {
            sunrise_minute: 360,
            sunset_minute: 1080,
            external_ip: 0,
            water_scale_percent: 100,
            timezone_code: UTC_TIMEZONE_CODE,
            rain_delay_stop: None,
            last_weather_success: None,
        }
    }
}

impl ConfigState {
    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        if self.sunrise_minute > MAX_MINUTE_OF_DAY {
            self.sunrise_minute = defaults.sunrise_minute;
        }
        if self.sunset_minute > MAX_MINUTE_OF_DAY {
            self.sunset_minute = defaults.sunset_minute;
        }
        if self.water_scale_percent > MAX_WATER_SCALE_PERCENT {
            self.water_scale_percent = defaults.water_scale_percent;
        }
        if self.timezone_code > MAX_TIMEZONE_CODE {
            self.timezone_code = defaults.timezone_code;
        }
    }

    pub fn utc_offset(&self) -> FixedOffset {
        timezone_offset(self.timezone_code).unwrap_or_else(|| Utc.fix())
    }

    pub fn local_epoch(&self, utc_epoch: i64) -> i64 {
        local_epoch(utc_epoch, self.timezone_code)
    }

    pub fn is_rain_delayed(&self, local_now: i64) -> bool {
        self.rain_delay_stop
            .map(|stop| local_now < stop)
            .unwrap_or(false)
    }
}

pub fn timezone_offset(code: u8) -> Option<FixedOffset> {
    if code > MAX_TIMEZONE_CODE {
        return None;
    }
    let quarter_hours = i32::from(code) - i32::from(UTC_TIMEZONE_CODE);
    FixedOffset::east_opt(quarter_hours * 15 * 60)
}

pub fn local_epoch(utc_epoch: i64, timezone_code: u8) -> i64 {
    let offset = timezone_offset(timezone_code)
        .map(|offset| i64::from(offset.local_minus_utc()))
        .unwrap_or(0);
    utc_epoch.saturating_add(offset)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub wifi_ssid: String,
    pub wifi_pass: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            wifi_ssid: String::new(),
            wifi_pass: String::new(),
            mqtt_host: "192.168.1.100".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub firmware_version: u16,
    pub weather: WeatherConfig,
    #[serde(default)]
    pub state: ConfigState,
    pub network: NetworkConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            firmware_version: DEFAULT_FIRMWARE_VERSION,
            weather: WeatherConfig::default(),
            state: ConfigState::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.weather.sanitize();
        self.state.sanitize();
    }
}

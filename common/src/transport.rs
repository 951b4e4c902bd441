use std::{fmt, time::Instant};

use crate::error::WeatherError;

pub const DEFAULT_HTTP_PORT: u16 = 80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn parse(setting: &str) -> Self {
        let setting = setting.trim();
        match setting.split_once(':') {
            Some((host, port)) => Self {
                host: host.to_string(),
                port: port.trim().parse().unwrap_or(DEFAULT_HTTP_PORT),
            },
            None => Self {
                host: setting.to_string(),
                port: DEFAULT_HTTP_PORT,
            },
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receive {
    Data(usize),
    Timeout,
    Closed,
}

pub trait Transport {
    type Connection;

    fn connect(
        &mut self,
        endpoint: &Endpoint,
        deadline: Instant,
    ) -> Result<Self::Connection, WeatherError>;

    fn send(&mut self, conn: &mut Self::Connection, bytes: &[u8]) -> Result<(), WeatherError>;

    fn receive(&mut self, conn: &mut Self::Connection, buf: &mut [u8], deadline: Instant)
        -> Receive;
}

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WeatherError {
    #[error("can't resolve weather server `{host}`")]
    ResolveFailure { host: String },
    #[error("connect to `{endpoint}` failed: {reason}")]
    ConnectFailure { endpoint: String, reason: String },
    #[error("no response within {waited_ms}ms")]
    Timeout { waited_ms: u64 },
    #[error("connection closed before any response bytes")]
    EmptyResponse,
    #[error("response has no header/body boundary")]
    MissingBody,
    #[error("response body has no `&` delimiter")]
    NoDelimiter,
    #[error("encoded query needs {required} bytes but only {available} fit before the headroom")]
    EncodingOverflow { required: usize, available: usize },
}

impl WeatherError {
    pub fn is_routine(&self) -> bool {
        !matches!(self, Self::EncodingOverflow { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("weather query is {required} bytes once encoded; limit is {available}")]
    QueryTooLong { required: usize, available: usize },
    #[error("weather host must not be empty")]
    EmptyHost,
}

pub mod config;
pub mod encoder;
pub mod error;
pub mod fields;
pub mod framer;
pub mod pipeline;
pub mod reconcile;
pub mod topics;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::{ConfigState, NetworkConfig, RuntimeConfig, WeatherConfig};
pub use encoder::{ScratchBuffer, WeatherQuery};
pub use error::{ConfigError, WeatherError};
pub use pipeline::{CycleReport, WeatherSync};
pub use reconcile::{OptionStore, RainDelayTimer, Reconciler};
pub use topics::*;
pub use transport::{Endpoint, Receive, Transport};
pub use types::{FieldUpdate, PipelineState, UpdateFlags, WeatherAction, WeatherStatus};

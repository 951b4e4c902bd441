use std::time::{Duration, Instant};

use log::{debug, error};

use crate::{
    encoder::{encode_query, request_parts, ScratchBuffer, WeatherQuery},
    error::WeatherError,
    fields::ResponseFields,
    framer::strip_http_header,
    reconcile::{OptionStore, RainDelayTimer, Reconciler},
    transport::{Endpoint, Receive, Transport},
    types::{PipelineState, UpdateFlags},
};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub state: PipelineState,
    pub error: Option<WeatherError>,
    pub flags: UpdateFlags,
}

impl CycleReport {
    pub fn is_success(&self) -> bool {
        self.state == PipelineState::Reconciled
    }
}

#[derive(Debug)]
pub struct WeatherSync {
    buffer: ScratchBuffer,
    timeout: Duration,
}

impl WeatherSync {
    pub fn new(buffer: ScratchBuffer, timeout: Duration) -> Self {
        Self { buffer, timeout }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn into_buffer(self) -> ScratchBuffer {
        self.buffer
    }

    /// `utc_now` is localised with the timezone code in effect once the
    /// response's writes have been applied.
    pub fn run_cycle<T, C>(
        &mut self,
        transport: &mut T,
        controller: &mut C,
        query: &WeatherQuery<'_>,
        host: &str,
        utc_now: i64,
    ) -> CycleReport
    where
        T: Transport,
        C: OptionStore + RainDelayTimer,
    {
        let mut stage = PipelineState::Idle;
        match self.exchange(&mut stage, transport, controller, query, host, utc_now) {
            Ok(flags) => CycleReport {
                state: PipelineState::Reconciled,
                error: None,
                flags,
            },
            Err(err) => {
                if err.is_routine() {
                    debug!("weather check ended in {}: {err}", stage.as_str());
                } else {
                    error!("weather check aborted in {}: {err}", stage.as_str());
                }
                CycleReport {
                    state: stage,
                    error: Some(err),
                    flags: UpdateFlags::empty(),
                }
            }
        }
    }

    fn exchange<T, C>(
        &mut self,
        stage: &mut PipelineState,
        transport: &mut T,
        controller: &mut C,
        query: &WeatherQuery<'_>,
        host: &str,
        utc_now: i64,
    ) -> Result<UpdateFlags, WeatherError>
    where
        T: Transport,
        C: OptionStore + RainDelayTimer,
    {
        advance(stage, PipelineState::Encoding);
        let encoded = encode_query(&mut self.buffer, query)?;

        advance(stage, PipelineState::Connecting);
        let endpoint = Endpoint::parse(host);
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut conn = transport.connect(&endpoint, deadline)?;
        for part in request_parts(&self.buffer, encoded, &endpoint.host) {
            transport.send(&mut conn, part)?;
        }

        advance(stage, PipelineState::Awaiting);
        self.buffer.clear();
        let closed = self.receive_until(transport, &mut conn, deadline);
        drop(conn);
        if self.buffer.is_empty() {
            return Err(if closed {
                WeatherError::EmptyResponse
            } else {
                WeatherError::Timeout {
                    waited_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                }
            });
        }

        advance(stage, PipelineState::Framing);
        strip_http_header(&mut self.buffer).ok_or(WeatherError::MissingBody)?;

        advance(stage, PipelineState::Parsing);
        let fields = ResponseFields::parse(self.buffer.as_slice());
        let current = controller.config_state();
        let plan =
            Reconciler::reconcile(&fields, &current, utc_now).ok_or(WeatherError::NoDelimiter)?;
        let flags = plan.apply(controller);

        advance(stage, PipelineState::Reconciled);
        debug!("weather check updated {:?}", flags.names());
        Ok(flags)
    }

    /// Returns whether the peer closed.
    fn receive_until<T: Transport>(
        &mut self,
        transport: &mut T,
        conn: &mut T::Connection,
        deadline: Instant,
    ) -> bool {
        while !self.buffer.is_full() {
            match transport.receive(conn, self.buffer.spare_mut(), deadline) {
                Receive::Data(0) | Receive::Closed => return true,
                Receive::Data(count) => self.buffer.advance(count),
                Receive::Timeout => return false,
            }
            if Instant::now() >= deadline {
                return false;
            }
        }
        false
    }
}

impl Default for WeatherSync {
    fn default() -> Self {
        Self::new(ScratchBuffer::new(), DEFAULT_TIMEOUT)
    }
}

fn advance(stage: &mut PipelineState, next: PipelineState) {
    debug!("weather sync {} -> {}", stage.as_str(), next.as_str());
    *stage = next;
}

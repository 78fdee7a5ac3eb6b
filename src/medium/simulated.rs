//! Simulated radio medium for testing
//!
//! An [`Air`] is one shared channel. Each station attaches and gets its own
//! [`SimulatedMedium`]. A transmission occupies the channel for its airtime
//! and is then heard by every other station. A transmission started while
//! the channel is already occupied is lost; the frame already on the air
//! survives.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tracing::trace;

use crate::core::{Error, MediumConstants, Result};
use crate::util::duration_to_millis;
use super::Medium;

/// Channel characteristics
#[derive(Debug, Clone)]
pub struct AirConfig {
    /// Fixed cost of every transmission
    pub preamble: Duration,
    /// Time to send one byte
    pub byte_time: Duration,
    /// Constants handed to every attached station
    pub constants: MediumConstants,
}

impl Default for AirConfig {
    fn default() -> Self {
        AirConfig {
            preamble: Duration::from_millis(5),
            byte_time: Duration::from_micros(50),
            constants: MediumConstants::default(),
        }
    }
}

/// One transmission as observed by the channel
#[derive(Debug, Clone)]
pub struct TransmissionRecord {
    /// Index of the transmitting station, in attach order
    pub station: usize,
    /// Channel time the transmission started, in milliseconds
    pub start_ms: u64,
    /// Channel time the transmission ended, in milliseconds
    pub end_ms: u64,
    /// Frame bytes
    pub bytes: Bytes,
    /// Whether the frame never reached any receiver
    pub lost: bool,
}

type LossFilter = Box<dyn Fn(&[u8]) -> bool + Send + Sync>;

struct AirState {
    busy_until: Instant,
    stations: Vec<mpsc::UnboundedSender<Bytes>>,
    log: Vec<TransmissionRecord>,
    loss_filter: Option<LossFilter>,
}

struct Shared {
    epoch: Instant,
    config: AirConfig,
    state: Mutex<AirState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, AirState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn airtime(&self, len: usize) -> Duration {
        let bytes = u32::try_from(len).unwrap_or(u32::MAX);
        self.config.preamble + self.config.byte_time * bytes
    }

    fn elapsed_ms(&self, at: Instant) -> u64 {
        duration_to_millis(at.saturating_duration_since(self.epoch))
    }
}

/// A shared radio channel
#[derive(Clone)]
pub struct Air {
    shared: Arc<Shared>,
}

impl Air {
    /// Creates an empty channel
    pub fn new(config: AirConfig) -> Self {
        let now = Instant::now();
        Air {
            shared: Arc::new(Shared {
                epoch: now,
                config,
                state: Mutex::new(AirState {
                    busy_until: now,
                    stations: Vec::new(),
                    log: Vec::new(),
                    loss_filter: None,
                }),
            }),
        }
    }

    /// Attaches a station whose clock agrees with the channel
    pub fn attach(&self) -> SimulatedMedium {
        self.attach_with_skew(0)
    }

    /// Attaches a station whose clock runs `skew_ms` ahead of (or behind) the channel
    pub fn attach_with_skew(&self, skew_ms: i64) -> SimulatedMedium {
        let (tx, rx) = mpsc::unbounded_channel();
        let station = {
            let mut state = self.shared.lock();
            state.stations.push(tx);
            state.stations.len() - 1
        };
        SimulatedMedium {
            station,
            skew_ms,
            shared: self.shared.clone(),
            inbox: tokio::sync::Mutex::new(rx),
        }
    }

    /// Drops every frame for which `filter` returns true
    pub fn set_loss_filter<F>(&self, filter: F)
    where
        F: Fn(&[u8]) -> bool + Send + Sync + 'static,
    {
        self.shared.lock().loss_filter = Some(Box::new(filter));
    }

    /// Everything transmitted so far, in order
    pub fn transmissions(&self) -> Vec<TransmissionRecord> {
        self.shared.lock().log.clone()
    }

    /// Time a frame of `len` bytes occupies the channel
    pub fn airtime(&self, len: usize) -> Duration {
        self.shared.airtime(len)
    }
}

/// One station's view of an [`Air`]
pub struct SimulatedMedium {
    station: usize,
    skew_ms: i64,
    shared: Arc<Shared>,
    inbox: tokio::sync::Mutex<mpsc::UnboundedReceiver<Bytes>>,
}

impl SimulatedMedium {
    /// Index of this station on its channel
    pub fn station(&self) -> usize {
        self.station
    }
}

#[async_trait]
impl Medium for SimulatedMedium {
    async fn transmit(&self, frame: &[u8]) -> usize {
        let now = Instant::now();
        let airtime = self.shared.airtime(frame.len());
        let bytes = Bytes::copy_from_slice(frame);

        let mut state = self.shared.lock();
        let collided = now < state.busy_until;
        let filtered = state.loss_filter.as_ref().map_or(false, |filter| filter(frame));
        state.log.push(TransmissionRecord {
            station: self.station,
            start_ms: self.shared.elapsed_ms(now),
            end_ms: self.shared.elapsed_ms(now + airtime),
            bytes: bytes.clone(),
            lost: collided || filtered,
        });

        if collided {
            trace!(station = self.station, len = frame.len(), "Transmission lost to a busy channel");
            return frame.len();
        }
        state.busy_until = now + airtime;
        if filtered {
            trace!(station = self.station, len = frame.len(), "Transmission dropped by loss filter");
            return frame.len();
        }

        let listeners: Vec<_> = state
            .stations
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != self.station)
            .map(|(_, tx)| tx.clone())
            .collect();
        drop(state);

        tokio::spawn(async move {
            sleep(airtime).await;
            for listener in listeners {
                let _ = listener.send(bytes.clone());
            }
        });

        frame.len()
    }

    async fn receive(&self) -> Result<Bytes> {
        self.inbox
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| Error::medium("channel torn down"))
    }

    fn in_use(&self) -> bool {
        Instant::now() < self.shared.lock().busy_until
    }

    fn clock(&self) -> u64 {
        self.shared
            .elapsed_ms(Instant::now())
            .saturating_add_signed(self.skew_ms)
    }

    fn constants(&self) -> &MediumConstants {
        &self.shared.config.constants
    }
}

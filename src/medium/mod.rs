//! Radio medium abstraction
//!
//! The link layer talks to the shared channel only through [`Medium`]. A
//! deterministic in-memory implementation lives in [`simulated`].

pub mod simulated;

pub use self::simulated::{Air, AirConfig, SimulatedMedium, TransmissionRecord};

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::core::{MediumConstants, Result};

/// A half-duplex shared radio channel as seen by one station
#[async_trait]
pub trait Medium: Send + Sync {
    /// Puts `frame` on the air and returns how many bytes went out
    async fn transmit(&self, frame: &[u8]) -> usize;

    /// Waits for the next frame heard on the channel
    ///
    /// Errors are transient interruptions; callers may simply retry.
    async fn receive(&self) -> Result<Bytes>;

    /// Instantaneous carrier sense
    fn in_use(&self) -> bool;

    /// Monotonic station clock in milliseconds
    fn clock(&self) -> u64;

    /// Timing and contention constants for this channel
    fn constants(&self) -> &MediumConstants;
}

/// Medium handle shared between the engines of one link
pub type SharedMedium = Arc<dyn Medium>;

//! CSMA/CA engines
//!
//! The [`Sender`] and [`Receiver`] run as two independent tasks per link.
//! They share nothing but the bounded channels handed to them and the
//! [`Station`] handle: the medium, the clock, the live settings and a
//! cancellation token.

pub mod backoff;
pub mod receiver;
pub mod sender;

pub use self::backoff::{contention_window, select_slots};
pub use self::receiver::Receiver;
pub use self::sender::Sender;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::core::{Error, LinkContext, MacAddr, Result};
use crate::medium::SharedMedium;
use crate::time::Clock;

/// Everything an engine needs to know about its own station
#[derive(Clone)]
pub struct Station {
    /// This station's address
    pub mac: MacAddr,
    /// The shared channel
    pub medium: SharedMedium,
    /// Adjusted station clock
    pub clock: Arc<Clock>,
    /// Live settings and status
    pub ctx: Arc<LinkContext>,
    /// Stops both engines
    pub cancel: CancellationToken,
}

impl Station {
    /// Sleeps for `duration`, or fails with [`Error::Cancelled`] if the link shuts down first
    pub async fn pause(&self, duration: Duration) -> Result<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            _ = sleep(duration) => Ok(()),
        }
    }
}

/// Whether an engine error means the loop should exit
pub(crate) fn is_shutdown(error: &Error) -> bool {
    matches!(error, Error::Cancelled | Error::Closed)
}

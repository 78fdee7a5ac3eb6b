//! dot11_link: a CSMA/CA wireless link layer
//!
//! This library implements an 802.11-style medium access layer over a shared,
//! half-duplex radio channel: framing with CRC-32 trailers, per-peer
//! duplicate suppression, carrier sense with exponential backoff,
//! stop-and-wait acknowledgment, and beacon-driven clock synchronization.
//!
//! ```no_run
//! use std::sync::Arc;
//! use dot11_link::{Air, AirConfig, LinkConfig, LinkLayer, MacAddr};
//!
//! # async fn demo() -> dot11_link::Result<()> {
//! let air = Air::new(AirConfig::default());
//! let alice = LinkLayer::new(MacAddr(1), Arc::new(air.attach()), LinkConfig::default())?;
//! let bob = LinkLayer::new(MacAddr(2), Arc::new(air.attach()), LinkConfig::default())?;
//!
//! alice.send(MacAddr(2), b"hello", 5)?;
//! let mut buf = [0u8; 64];
//! let incoming = bob.recv(&mut buf).await?;
//! assert_eq!(&buf[..incoming.len], b"hello");
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod link;
pub mod mac;
pub mod medium;
pub mod protocol;
pub mod time;
mod util;

// Re-export commonly used items
pub use crate::core::{BackoffPolicy, Error, LinkConfig, MacAddr, MediumConstants, Result, Status};
pub use crate::link::{Incoming, LinkLayer};
pub use crate::medium::{Air, AirConfig, Medium, SharedMedium, SimulatedMedium};
pub use crate::protocol::{Frame, FrameType};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}

//! Protocol implementation module
//!
//! This module defines the link frame, its wire encoding and checksum,
//! and the per-peer sequence bookkeeping used for duplicate detection.

pub mod codec;
pub mod frame;
pub mod sequence;

pub use self::codec::{beacon_time, decode, encode, make_beacon, mark_retry, verify_checksum};
pub use self::frame::{Frame, FrameType};
pub use self::sequence::{SequenceTracker, Verdict};

//! Core types and traits for the link layer
//!
//! This module contains the fundamental building blocks used throughout the library.

pub mod context;
pub mod error;
pub mod types;
pub mod serde;

pub use self::context::{Component, LinkContext};
pub use self::error::{Error, Result};
pub use self::types::{
    BackoffPolicy,
    Command,
    LinkConfig,
    MacAddr,
    MediumConstants,
    Status,
};

/// Largest payload a single frame can carry
pub const MAX_PAYLOAD: usize = 2038;

/// Header plus checksum bytes added to every payload
pub const FRAME_OVERHEAD: usize = 10;

/// Largest frame on the wire
pub const MAX_FRAME_SIZE: usize = MAX_PAYLOAD + FRAME_OVERHEAD;

/// Size of the sequence number space (12 bits)
pub const SEQUENCE_SPACE: u16 = 4096;

/// Default capacity of the outgoing and delivery queues
pub const DEFAULT_QUEUE_CAPACITY: usize = 4;

/// Capacity of the ACK queue between receiver and sender
pub const ACK_QUEUE_CAPACITY: usize = 2;

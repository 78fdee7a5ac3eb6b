use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Error, Result};

/// A 16-bit link-layer address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MacAddr(pub u16);

impl MacAddr {
    /// The distinguished all-stations address
    pub const BROADCAST: MacAddr = MacAddr(0xFFFF);

    /// Returns whether this is the broadcast address
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// Returns the raw address value
    pub fn value(&self) -> u16 {
        self.0
    }
}

impl From<u16> for MacAddr {
    fn from(value: u16) -> Self {
        MacAddr(value)
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_broadcast() {
            write!(f, "broadcast")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Terminal status codes reported by the link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Status {
    Success = 1,
    UnspecifiedError = 2,
    RfInitFailed = 3,
    TxDelivered = 4,
    TxFailed = 5,
    BadBufSize = 6,
    BadAddress = 7,
    BadMacAddress = 8,
    IllegalArgument = 9,
    InsufficientBufferSpace = 10,
}

impl Status {
    /// Returns the numeric status code
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl TryFrom<u8> for Status {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        Ok(match code {
            1 => Status::Success,
            2 => Status::UnspecifiedError,
            3 => Status::RfInitFailed,
            4 => Status::TxDelivered,
            5 => Status::TxFailed,
            6 => Status::BadBufSize,
            7 => Status::BadAddress,
            8 => Status::BadMacAddress,
            9 => Status::IllegalArgument,
            10 => Status::InsufficientBufferSpace,
            other => return Err(Error::illegal_argument(format!("unknown status code {}", other))),
        })
    }
}

/// How many backoff slots a sender waits out of its contention window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum BackoffPolicy {
    /// Uniformly random slot count in `[0, window]`
    #[default]
    Random = 0,
    /// Always the full window
    Max = 1,
}

impl TryFrom<i32> for BackoffPolicy {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self> {
        match value {
            0 => Ok(BackoffPolicy::Random),
            1 => Ok(BackoffPolicy::Max),
            other => Err(Error::illegal_argument(format!("invalid slot selection {}", other))),
        }
    }
}

/// Administrative commands accepted by the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// List the available commands
    Help,
    /// Set the debug verbosity
    DebugLevel(i32),
    /// Choose the backoff slot selection policy
    SlotSelection(BackoffPolicy),
    /// Set the beacon interval; zero disables beacons
    BeaconInterval(Duration),
}

impl Command {
    /// Parses a numeric command/value pair
    pub fn parse(id: i32, value: i32) -> Result<Self> {
        match id {
            0 => Ok(Command::Help),
            1 => Ok(Command::DebugLevel(value)),
            2 => BackoffPolicy::try_from(value).map(Command::SlotSelection),
            3 => {
                let secs = u64::try_from(value).unwrap_or(0);
                Ok(Command::BeaconInterval(Duration::from_secs(secs)))
            }
            other => Err(Error::illegal_argument(format!("unknown command {}", other))),
        }
    }

    /// Human-readable command list
    pub fn help_text() -> &'static str {
        "Available commands:\n\
         (0): help\n\
         (1,x): set debug level\n\
         \tx<1: silent mode\n\
         \tx=1: default\n\
         \tx=2: receiver details\n\
         \tx=3: sender details\n\
         \tx>=4: everything\n\
         (2,x): slot selection, 0 = random, 1 = maximum window\n\
         (3,x): beacon interval in seconds, x<=0 disables beacons"
    }
}

/// Timing and contention constants supplied by the medium
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediumConstants {
    /// Short inter-frame space
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub sifs: Duration,
    /// Backoff slot length
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub slot: Duration,
    /// Minimum contention window (aCWmin)
    pub cw_min: u32,
    /// Maximum contention window (aCWmax)
    pub cw_max: u32,
    /// Retransmissions allowed after the first attempt
    pub retry_limit: u32,
    /// Time allowed for an ACK to come back on top of slot + SIFS
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub ack_budget: Duration,
}

impl MediumConstants {
    /// DCF inter-frame space: SIFS plus two slots
    pub fn difs(&self) -> Duration {
        self.sifs + self.slot * 2
    }

    /// Carrier-sense polling interval while the medium is busy
    pub fn busy_poll(&self) -> Duration {
        self.sifs + self.slot
    }

    /// Total time a sender waits for a matching ACK
    pub fn ack_timeout(&self) -> Duration {
        self.slot + self.sifs + self.ack_budget
    }
}

impl Default for MediumConstants {
    fn default() -> Self {
        MediumConstants {
            sifs: Duration::from_millis(100),
            slot: Duration::from_millis(200),
            cw_min: 3,
            cw_max: 31,
            retry_limit: 5,
            ack_budget: Duration::from_millis(500),
        }
    }
}

/// Configuration for a link instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Capacity of the application-to-sender queue
    pub outgoing_capacity: usize,
    /// Capacity of the receiver-to-application queue
    pub delivered_capacity: usize,
    /// Capacity of the receiver-to-sender ACK queue
    pub ack_capacity: usize,
    /// Initial debug verbosity
    pub debug_level: i32,
    /// Initial backoff slot selection policy
    pub backoff: BackoffPolicy,
    /// Beacon period; zero disables beacons
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub beacon_interval: Duration,
    /// Expected delay between stamping a beacon and its arrival
    #[serde(serialize_with = "super::serde::serialize_millis")]
    #[serde(deserialize_with = "super::serde::deserialize_millis")]
    pub beacon_lead: Duration,
}

impl LinkConfig {
    /// Checks that the configuration can build a working link
    pub fn validate(&self) -> Result<()> {
        if self.outgoing_capacity == 0 {
            return Err(Error::config("outgoing queue capacity must be non-zero"));
        }
        if self.delivered_capacity == 0 {
            return Err(Error::config("delivery queue capacity must be non-zero"));
        }
        if self.ack_capacity == 0 {
            return Err(Error::config("ack queue capacity must be non-zero"));
        }
        Ok(())
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig {
            outgoing_capacity: super::DEFAULT_QUEUE_CAPACITY,
            delivered_capacity: super::DEFAULT_QUEUE_CAPACITY,
            ack_capacity: super::ACK_QUEUE_CAPACITY,
            debug_level: 1,
            backoff: BackoffPolicy::Random,
            beacon_interval: Duration::from_secs(5),
            beacon_lead: Duration::from_millis(5),
        }
    }
}

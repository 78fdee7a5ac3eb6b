//! Link facade
//!
//! [`LinkLayer`] is what applications hold. It owns the queues between the
//! application and the two engines, hands out per-destination sequence
//! numbers, and records a [`Status`] after every call.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::{Command, Component, Error, LinkConfig, LinkContext, MacAddr, Result, Status, MAX_PAYLOAD, SEQUENCE_SPACE};
use crate::mac::{Receiver, Sender, Station};
use crate::medium::SharedMedium;
use crate::protocol::{codec, Frame, FrameType};
use crate::time::Clock;

/// Addressing details of a frame handed to [`LinkLayer::recv`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Incoming {
    /// Station that sent the frame
    pub source: MacAddr,
    /// Our address, or broadcast
    pub destination: MacAddr,
    /// Bytes copied into the caller's buffer
    pub len: usize,
}

/// One station's link layer over a shared medium
pub struct LinkLayer {
    /// This station's address
    mac: MacAddr,
    /// Clock shared with the receiver, which adjusts it
    clock: Arc<Clock>,
    /// Live settings and last status
    ctx: Arc<LinkContext>,
    /// Stops both engines
    cancel: CancellationToken,
    /// Frames waiting for the sender
    outgoing: mpsc::Sender<Frame>,
    /// Data frames the receiver has accepted
    delivered: AsyncMutex<mpsc::Receiver<Frame>>,
    /// Next sequence number per destination
    sequences: Mutex<HashMap<MacAddr, u16>>,
    /// Engine tasks, drained by `shutdown`
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl LinkLayer {
    /// Brings the link up and starts both engines
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(mac: MacAddr, medium: SharedMedium, config: LinkConfig) -> Result<Self> {
        config.validate()?;
        if mac.is_broadcast() {
            return Err(Error::BadMacAddress(format!("{} is reserved for broadcast", mac.value())));
        }

        let (outgoing_tx, outgoing_rx) = mpsc::channel(config.outgoing_capacity);
        let (delivered_tx, delivered_rx) = mpsc::channel(config.delivered_capacity);
        let (ack_tx, ack_rx) = mpsc::channel(config.ack_capacity);

        let clock = Arc::new(Clock::new(medium.clone()));
        let ctx = Arc::new(LinkContext::new(&config));
        let cancel = CancellationToken::new();
        let station = Station {
            mac,
            medium,
            clock: clock.clone(),
            ctx: ctx.clone(),
            cancel: cancel.clone(),
        };

        let receiver = Receiver::new(station.clone(), delivered_tx, ack_tx);
        let sender = Sender::new(station, outgoing_rx, ack_rx, config.beacon_lead);
        let tasks = vec![tokio::spawn(receiver.run()), tokio::spawn(sender.run())];

        ctx.set_status(Status::Success);
        info!(%mac, debug_level = config.debug_level, backoff = ?config.backoff, "Link layer up");

        Ok(LinkLayer {
            mac,
            clock,
            ctx,
            cancel,
            outgoing: outgoing_tx,
            delivered: AsyncMutex::new(delivered_rx),
            sequences: Mutex::new(HashMap::new()),
            tasks: Mutex::new(tasks),
        })
    }

    /// This station's address
    pub fn mac(&self) -> MacAddr {
        self.mac
    }

    /// Queues up to `len` bytes of `data` for `dest`
    ///
    /// Returns the number of bytes accepted. Never blocks: a full outgoing
    /// queue fails with [`Error::QueueFull`].
    pub fn send(&self, dest: MacAddr, data: &[u8], len: usize) -> Result<usize> {
        let result = self.enqueue(dest, data, len);
        if let Err(e) = &result {
            self.ctx.set_status(e.status());
        }
        result
    }

    fn enqueue(&self, dest: MacAddr, data: &[u8], len: usize) -> Result<usize> {
        if dest == self.mac {
            return Err(Error::BadAddress(format!("{} is this station", dest)));
        }
        let payload = &data[..len.min(data.len())];
        if payload.len() > MAX_PAYLOAD {
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD,
            });
        }

        let mut sequences = self.sequences.lock().unwrap_or_else(PoisonError::into_inner);
        let seq = sequences.entry(dest).or_insert(0);
        let frame = codec::encode(self.mac, dest, payload, FrameType::Data, *seq, false)?;

        match self.outgoing.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => return Err(Error::QueueFull("outgoing")),
            Err(TrySendError::Closed(_)) => return Err(Error::Closed),
        }

        if self.ctx.detail(Component::Sender) {
            debug!(%dest, seq = *seq, len = payload.len(), "Queued frame");
        }
        *seq = (*seq + 1) % SEQUENCE_SPACE;
        Ok(payload.len())
    }

    /// Waits for the next delivered data frame and copies its payload into `buf`
    ///
    /// Payloads longer than `buf` are truncated.
    pub async fn recv(&self, buf: &mut [u8]) -> Result<Incoming> {
        let mut delivered = self.delivered.lock().await;
        let frame = tokio::select! {
            _ = self.cancel.cancelled() => return Err(Error::Cancelled),
            frame = delivered.recv() => frame.ok_or(Error::Closed)?,
        };

        let payload = frame.payload();
        let len = payload.len().min(buf.len());
        buf[..len].copy_from_slice(&payload[..len]);

        Ok(Incoming {
            source: frame.src(),
            destination: frame.dest(),
            len,
        })
    }

    /// Last recorded status
    pub fn status(&self) -> Status {
        self.ctx.status()
    }

    /// Applies a runtime command
    ///
    /// `0` logs the command list, `1` sets the debug level, `2` picks the
    /// backoff policy (0 random, 1 max) and `3` sets the beacon interval in
    /// seconds (zero or less disables beacons).
    pub fn command(&self, id: i32, value: i32) -> Result<()> {
        let command = match Command::parse(id, value) {
            Ok(command) => command,
            Err(e) => {
                if self.ctx.chatty() {
                    warn!(id, value, error = %e, "Rejected command");
                }
                self.ctx.set_status(e.status());
                return Err(e);
            }
        };

        match command {
            Command::Help => info!("{}", Command::help_text()),
            other => {
                self.ctx.apply(other);
                if self.ctx.chatty() {
                    info!(mac = %self.mac, command = ?other, "Applied command");
                }
            }
        }
        self.ctx.set_status(Status::Success);
        Ok(())
    }

    /// Adjusted link time in milliseconds
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// How far beacons have pushed this station's clock ahead
    pub fn clock_offset(&self) -> i64 {
        self.clock.offset()
    }

    /// Current beacon interval, if beacons are enabled
    pub fn beacon_interval(&self) -> Option<Duration> {
        self.ctx.beacon_interval()
    }

    /// Stops both engines and waits for them to exit
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        for joined in join_all(tasks).await {
            if let Err(e) = joined {
                warn!(mac = %self.mac, error = %e, "Engine task ended abnormally");
            }
        }
        info!(mac = %self.mac, "Link layer down");
    }
}

impl fmt::Debug for LinkLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkLayer")
            .field("mac", &self.mac)
            .field("status", &self.status())
            .field("clock_offset", &self.clock_offset())
            .finish()
    }
}

impl Drop for LinkLayer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

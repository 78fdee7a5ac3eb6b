use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, trace, warn};

use crate::core::{Component, Error, MacAddr, Result, MAX_FRAME_SIZE};
use crate::protocol::{codec, Frame, FrameType, SequenceTracker, Verdict};
use super::{is_shutdown, Station};

/// Listens to the medium and sorts what it hears
///
/// Data frames go to the delivery queue (once each), ACKs go to the sender,
/// beacons move the clock forward. Unicast data is acknowledged after one SIFS.
pub struct Receiver {
    /// Medium, clock, settings and cancellation for this station
    station: Station,
    /// Duplicate and gap detection per peer
    tracker: SequenceTracker,
    /// Data frames for the facade
    delivered: mpsc::Sender<Frame>,
    /// ACKs for the sender
    acks: mpsc::Sender<Frame>,
}

impl Receiver {
    /// Creates a receiver feeding the given delivery and ACK queues
    pub fn new(station: Station, delivered: mpsc::Sender<Frame>, acks: mpsc::Sender<Frame>) -> Self {
        Receiver {
            station,
            tracker: SequenceTracker::new(),
            delivered,
            acks,
        }
    }

    /// Runs until the link is cancelled or the delivery queue is dropped
    pub async fn run(mut self) {
        let mac = self.station.mac;
        if self.station.ctx.chatty() {
            info!(%mac, "Receiver started");
        }

        loop {
            let heard = tokio::select! {
                _ = self.station.cancel.cancelled() => break,
                heard = self.station.medium.receive() => heard,
            };

            let outcome = match heard {
                Ok(raw) => self.handle(raw).await,
                Err(e) => {
                    if self.station.ctx.chatty() {
                        warn!(%mac, error = %e, "Receive interrupted");
                    }
                    let gap = self.station.medium.constants().sifs;
                    self.station.pause(gap).await
                }
            };

            if let Err(e) = outcome {
                if is_shutdown(&e) {
                    break;
                }
                if self.station.ctx.chatty() {
                    warn!(%mac, error = %e, "Failed to process frame");
                }
            }
        }

        debug!(%mac, "Receiver stopped");
    }

    fn detail(&self) -> bool {
        self.station.ctx.detail(Component::Receiver)
    }

    /// Processes one frame straight off the medium
    async fn handle(&mut self, raw: Bytes) -> Result<()> {
        // The medium hands frames over once fully heard, so this lags the
        // start of reception by the frame's airtime; beacon senders add a
        // lead time to their timestamps to cover it.
        let received_at = self.station.clock.now();

        if raw.len() > MAX_FRAME_SIZE {
            if self.detail() {
                debug!(len = raw.len(), max = MAX_FRAME_SIZE, "Dropping oversized frame");
            }
            return Ok(());
        }
        let frame = codec::decode(raw);

        if !codec::verify_checksum(&frame) {
            if self.detail() {
                debug!(error = %Error::ChecksumFailed, len = frame.len(), "Dropping damaged frame");
            }
            return Ok(());
        }

        let dest = frame.dest();
        if dest != self.station.mac && !dest.is_broadcast() {
            if self.detail() {
                trace!(%dest, "Frame is not for us");
            }
            return Ok(());
        }

        if self.detail() {
            debug!(%frame, "Received frame");
        }

        match frame.frame_type() {
            Some(FrameType::Ack) => {
                self.forward_ack(frame);
                Ok(())
            }
            Some(FrameType::Data) => self.accept_data(frame).await,
            Some(FrameType::Beacon) => {
                self.sync_clock(&frame, received_at);
                Ok(())
            }
            Some(FrameType::Cts) | Some(FrameType::Rts) | None => {
                trace!(type_bits = frame.type_bits(), "Ignoring unused frame type");
                Ok(())
            }
        }
    }

    fn forward_ack(&self, ack: Frame) {
        match self.acks.try_send(ack) {
            Ok(()) => {}
            Err(TrySendError::Full(ack)) => {
                // Nobody is waiting on it
                if self.detail() {
                    debug!(seq = ack.sequence(), "ACK queue full, dropping ACK");
                }
            }
            Err(TrySendError::Closed(_)) => trace!("Sender gone, dropping ACK"),
        }
    }

    async fn accept_data(&mut self, frame: Frame) -> Result<()> {
        // No room upstream: stay silent so the sender tries again later
        let permit = match self.delivered.try_reserve() {
            Ok(permit) => permit,
            Err(TrySendError::Full(())) => {
                if self.station.ctx.chatty() {
                    warn!(src = %frame.src(), seq = frame.sequence(), "Delivery queue full, dropping frame");
                }
                return Ok(());
            }
            Err(TrySendError::Closed(())) => return Err(Error::Closed),
        };

        let src = frame.src();
        let seq = frame.sequence();
        let broadcast = frame.is_broadcast();

        match self.tracker.observe(src, seq, broadcast) {
            Verdict::New => permit.send(frame),
            Verdict::GapDetected(expected) => {
                if self.station.ctx.chatty() {
                    warn!(%src, expected, got = seq, "Sequence gap, frames were lost");
                }
                permit.send(frame);
            }
            Verdict::Duplicate => {
                drop(permit);
                if self.detail() {
                    debug!(%src, seq, "Duplicate frame, not delivering");
                }
            }
        }

        // Duplicates are acknowledged too, in case our earlier ACK was lost
        if !broadcast {
            self.send_ack(src, seq).await?;
        }
        Ok(())
    }

    async fn send_ack(&self, to: MacAddr, seq: u16) -> Result<()> {
        let ack = codec::encode(self.station.mac, to, &[], FrameType::Ack, seq, false)?;
        self.station.pause(self.station.medium.constants().sifs).await?;

        let sent = self.station.medium.transmit(ack.as_bytes()).await;
        if sent < ack.len() && self.station.ctx.chatty() {
            warn!(sent, len = ack.len(), "Short ACK transmission");
        }
        if self.detail() {
            debug!(%to, seq, "Sent ACK");
        }
        Ok(())
    }

    fn sync_clock(&self, beacon: &Frame, received_at: u64) {
        let Some(timestamp) = codec::beacon_time(beacon) else {
            return;
        };
        match self.station.clock.adjust(timestamp, received_at) {
            Some(jump) if self.detail() => {
                debug!(src = %beacon.src(), timestamp, jump, "Clock advanced to beacon time");
            }
            Some(_) => {}
            None if self.detail() => {
                trace!(src = %beacon.src(), timestamp, "Beacon behind local clock, ignored");
            }
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::time::{timeout, Instant};
    use tokio_util::sync::CancellationToken;

    use crate::core::{LinkConfig, LinkContext, MAX_PAYLOAD};
    use crate::medium::{Air, AirConfig, Medium, SimulatedMedium};
    use crate::time::Clock;

    const ME: MacAddr = MacAddr(10);
    const PEER: MacAddr = MacAddr(20);

    struct Harness {
        peer: SimulatedMedium,
        clock: Arc<Clock>,
        delivered: mpsc::Receiver<Frame>,
        acks: mpsc::Receiver<Frame>,
        cancel: CancellationToken,
    }

    fn start(delivered_capacity: usize) -> Harness {
        let air = Air::new(AirConfig::default());
        let medium = Arc::new(air.attach());
        let peer = air.attach();
        let clock = Arc::new(Clock::new(medium.clone()));
        let cancel = CancellationToken::new();
        let station = Station {
            mac: ME,
            medium,
            clock: clock.clone(),
            ctx: Arc::new(LinkContext::new(&LinkConfig::default())),
            cancel: cancel.clone(),
        };

        let (delivered_tx, delivered) = mpsc::channel(delivered_capacity);
        let (ack_tx, acks) = mpsc::channel(2);
        tokio::spawn(Receiver::new(station, delivered_tx, ack_tx).run());

        Harness {
            peer,
            clock,
            delivered,
            acks,
            cancel,
        }
    }

    fn data(dest: MacAddr, seq: u16, payload: &[u8]) -> Frame {
        codec::encode(PEER, dest, payload, FrameType::Data, seq, false).unwrap()
    }

    async fn expect_ack(peer: &SimulatedMedium, seq: u16) {
        let raw = timeout(Duration::from_secs(2), peer.receive()).await.unwrap().unwrap();
        let ack = codec::decode(raw);
        assert!(codec::verify_checksum(&ack));
        assert_eq!(ack.frame_type(), Some(FrameType::Ack));
        assert_eq!(ack.src(), ME);
        assert_eq!(ack.dest(), PEER);
        assert_eq!(ack.sequence(), seq);
        assert!(ack.payload().is_empty());
    }

    async fn expect_silence(peer: &SimulatedMedium) {
        assert!(timeout(Duration::from_secs(2), peer.receive()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unicast_delivered_and_acked_after_sifs() {
        let mut h = start(4);
        let frame = data(ME, 0, b"sixteen byte msg");

        h.peer.transmit(frame.as_bytes()).await;
        let sent_at = Instant::now();

        let got = h.delivered.recv().await.unwrap();
        assert_eq!(got, frame);

        expect_ack(&h.peer, 0).await;
        let sifs = h.peer.constants().sifs;
        assert!(sent_at.elapsed() >= sifs);
        assert!(sent_at.elapsed() < sifs * 2);
        h.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_acked_but_not_delivered() {
        let mut h = start(4);
        let frame = data(ME, 0, b"once");

        h.peer.transmit(frame.as_bytes()).await;
        expect_ack(&h.peer, 0).await;

        h.peer.transmit(codec::mark_retry(&frame).as_bytes()).await;
        expect_ack(&h.peer, 0).await;

        assert_eq!(h.delivered.recv().await.unwrap(), frame);
        assert!(h.delivered.try_recv().is_err());
        h.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_gap_still_delivered() {
        let mut h = start(4);

        h.peer.transmit(data(ME, 0, b"a").as_bytes()).await;
        expect_ack(&h.peer, 0).await;
        h.peer.transmit(data(ME, 2, b"c").as_bytes()).await;
        expect_ack(&h.peer, 2).await;

        assert_eq!(h.delivered.recv().await.unwrap().sequence(), 0);
        assert_eq!(h.delivered.recv().await.unwrap().sequence(), 2);
        h.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_delivered_without_ack() {
        let mut h = start(4);
        let frame = data(MacAddr::BROADCAST, 77, b"everyone");

        h.peer.transmit(frame.as_bytes()).await;
        assert_eq!(h.delivered.recv().await.unwrap(), frame);
        expect_silence(&h.peer).await;
        h.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreign_and_damaged_frames_dropped() {
        let mut h = start(4);

        h.peer.transmit(data(MacAddr(99), 0, b"not ours").as_bytes()).await;
        expect_silence(&h.peer).await;

        let mut damaged = data(ME, 0, b"bad crc").as_bytes().to_vec();
        damaged[6] ^= 0x01;
        h.peer.transmit(&damaged).await;
        expect_silence(&h.peer).await;

        assert!(h.delivered.try_recv().is_err());
        h.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_delivery_queue_drops_without_ack() {
        let mut h = start(1);

        h.peer.transmit(data(ME, 0, b"fills the queue").as_bytes()).await;
        expect_ack(&h.peer, 0).await;

        h.peer.transmit(data(ME, 1, b"no room").as_bytes()).await;
        expect_silence(&h.peer).await;

        // Once there is room the retransmission goes through
        assert_eq!(h.delivered.recv().await.unwrap().sequence(), 0);
        h.peer.transmit(data(ME, 1, b"no room").as_bytes()).await;
        expect_ack(&h.peer, 1).await;
        assert_eq!(h.delivered.recv().await.unwrap().sequence(), 1);
        h.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_forwarded_to_sender() {
        let mut h = start(4);
        let ack = codec::encode(PEER, ME, &[], FrameType::Ack, 12, false).unwrap();

        h.peer.transmit(ack.as_bytes()).await;
        let got = timeout(Duration::from_secs(1), h.acks.recv()).await.unwrap().unwrap();
        assert_eq!(got.sequence(), 12);
        assert!(h.delivered.try_recv().is_err());
        h.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_beacon_advances_clock() {
        let h = start(4);
        let ahead = h.clock.now() + 60_000;

        h.peer.transmit(codec::make_beacon(PEER, ahead).as_bytes()).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(h.clock.offset() >= 59_000);

        // A beacon from the past leaves the clock alone
        let offset = h.clock.offset();
        h.peer.transmit(codec::make_beacon(PEER, 5).as_bytes()).await;
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(h.clock.offset(), offset);
        h.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_frame_dropped() {
        let mut h = start(4);

        // Valid header and checksum, but longer than any frame may be
        let mut raw = data(ME, 0, &[7u8; MAX_PAYLOAD]).as_bytes().to_vec();
        let end = raw.len() - 4;
        raw.splice(end..end, [1u8, 2, 3]);
        let checksum = crc32fast::hash(&raw[..raw.len() - 4]);
        let len = raw.len();
        raw[len - 4..].copy_from_slice(&checksum.to_le_bytes());
        assert!(codec::verify_checksum(&codec::decode(Bytes::from(raw.clone()))));

        h.peer.transmit(&raw).await;
        expect_silence(&h.peer).await;
        assert!(h.delivered.try_recv().is_err());
        h.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reserved_types_ignored() {
        let mut h = start(4);
        let rts = codec::encode(PEER, ME, b"rts", FrameType::Rts, 3, false).unwrap();

        h.peer.transmit(rts.as_bytes()).await;
        expect_silence(&h.peer).await;
        assert!(h.delivered.try_recv().is_err());
        assert!(h.acks.try_recv().is_err());
        h.cancel.cancel();
    }
}

use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, trace, warn};

use crate::core::{Component, Error, Result, Status};
use crate::protocol::{codec, Frame};
use crate::util::duration_to_millis;
use super::backoff::{contention_window, select_slots};
use super::{is_shutdown, Station};

/// Work item for one pass through contention
enum Outgoing {
    Data(Frame),
    /// Built at transmission time so its timestamp is fresh
    Beacon,
}

/// Drains the outgoing queue onto the medium using CSMA/CA
///
/// One frame is in flight at a time. Unicast data waits for an ACK and is
/// retransmitted with a growing contention window until the medium's retry
/// limit runs out. Broadcasts and beacons go out once.
pub struct Sender {
    /// Medium, clock, settings and cancellation for this station
    station: Station,
    /// Frames queued by the facade
    outgoing: mpsc::Receiver<Frame>,
    /// ACKs forwarded by the receiver
    acks: mpsc::Receiver<Frame>,
    /// Added to beacon timestamps to cover transmission latency
    beacon_lead: Duration,
    /// Backoff slot selection
    rng: StdRng,
    /// Raw medium time at which the next beacon is due
    next_beacon: Option<u64>,
}

impl Sender {
    /// Creates a sender reading frames from `outgoing` and ACKs from `acks`
    pub fn new(
        station: Station,
        outgoing: mpsc::Receiver<Frame>,
        acks: mpsc::Receiver<Frame>,
        beacon_lead: Duration,
    ) -> Self {
        Sender {
            station,
            outgoing,
            acks,
            beacon_lead,
            rng: StdRng::from_entropy(),
            next_beacon: None,
        }
    }

    /// Runs until the link is cancelled or the outgoing queue is dropped
    pub async fn run(mut self) {
        let mac = self.station.mac;
        if self.station.ctx.chatty() {
            info!(%mac, "Sender started");
        }

        loop {
            let job = match self.next_job().await {
                Ok(job) => job,
                Err(_) => break,
            };

            match self.deliver(job).await {
                Ok(()) => {}
                Err(e) if is_shutdown(&e) => break,
                Err(_) if !self.station.ctx.chatty() => {}
                Err(e @ Error::RetryLimitExceeded { .. }) => warn!(%mac, error = %e, "Frame abandoned"),
                Err(e) => warn!(%mac, error = %e, "Transmission failed"),
            }
        }

        debug!(%mac, "Sender stopped");
    }

    fn detail(&self) -> bool {
        self.station.ctx.detail(Component::Sender)
    }

    /// Waits for the next frame to send, or for the beacon deadline
    ///
    /// A command changing the beacon interval restarts the wait.
    async fn next_job(&mut self) -> Result<Outgoing> {
        loop {
            let changed = self.station.ctx.changed();

            let Some(interval) = self.station.ctx.beacon_interval() else {
                self.next_beacon = None;
                tokio::select! {
                    _ = self.station.cancel.cancelled() => return Err(Error::Cancelled),
                    _ = changed => continue,
                    frame = self.outgoing.recv() => {
                        return frame.map(Outgoing::Data).ok_or(Error::Closed);
                    }
                }
            };

            let now = self.station.medium.clock();
            let fresh = now.saturating_add(duration_to_millis(interval));
            // A shortened interval takes effect right away
            let deadline = self.next_beacon.map_or(fresh, |due| due.min(fresh));
            self.next_beacon = Some(deadline);

            if deadline <= now {
                self.next_beacon = None;
                return Ok(Outgoing::Beacon);
            }

            let wait = Duration::from_millis(deadline - now);
            tokio::select! {
                _ = self.station.cancel.cancelled() => return Err(Error::Cancelled),
                _ = changed => continue,
                frame = timeout(wait, self.outgoing.recv()) => {
                    return match frame {
                        Ok(Some(frame)) => Ok(Outgoing::Data(frame)),
                        Ok(None) => Err(Error::Closed),
                        Err(_) => {
                            self.next_beacon = None;
                            Ok(Outgoing::Beacon)
                        }
                    };
                }
            }
        }
    }

    /// Drops ACKs that arrived after their frame was settled
    fn purge_stale_acks(&mut self) {
        while let Ok(ack) = self.acks.try_recv() {
            if self.detail() {
                trace!(seq = ack.sequence(), src = %ack.src(), "Discarding stale ACK");
            }
        }
    }

    /// Takes one frame through contention, transmission and retries
    async fn deliver(&mut self, job: Outgoing) -> Result<()> {
        self.purge_stale_acks();

        let mut frame = match job {
            Outgoing::Data(frame) => Some(frame),
            Outgoing::Beacon => None,
        };
        let retry_limit = self.station.medium.constants().retry_limit;
        let mut attempt: u32 = 0;
        let mut fast_path = true;

        loop {
            let cleared = fast_path && self.fast_path().await?;
            if !cleared {
                self.contend().await?;
                self.backoff(attempt).await?;
            }

            let Some(data) = frame.as_ref() else {
                let lead = duration_to_millis(self.beacon_lead);
                let beacon = codec::make_beacon(self.station.mac, self.station.clock.now().saturating_add(lead));
                self.transmit(&beacon).await;
                return Ok(());
            };

            self.transmit(data).await;
            if data.is_broadcast() {
                self.station.ctx.set_status(Status::TxDelivered);
                return Ok(());
            }

            match self.await_ack(data).await {
                Ok(()) => {
                    if self.detail() {
                        debug!(dest = %data.dest(), seq = data.sequence(), attempt, "Frame acknowledged");
                    }
                    self.station.ctx.set_status(Status::TxDelivered);
                    return Ok(());
                }
                Err(Error::AckTimeout { sequence }) => {
                    attempt += 1;
                    if attempt > retry_limit {
                        self.station.ctx.set_status(Status::TxFailed);
                        return Err(Error::RetryLimitExceeded {
                            sequence,
                            attempts: attempt,
                        });
                    }
                    if self.detail() {
                        debug!(dest = %data.dest(), seq = sequence, attempt, "No ACK, retrying");
                    }
                    let retry = codec::mark_retry(data);
                    frame = Some(retry);
                    fast_path = false;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Idle medium: wait one DIFS and report whether it is still idle
    async fn fast_path(&self) -> Result<bool> {
        let medium = &self.station.medium;
        if medium.in_use() {
            return Ok(false);
        }
        self.station.pause(medium.constants().difs()).await?;
        Ok(!medium.in_use())
    }

    /// Waits out the current transmission plus a DIFS of silence
    async fn contend(&self) -> Result<()> {
        let medium = &self.station.medium;
        let constants = medium.constants();
        loop {
            while medium.in_use() {
                self.station.pause(constants.busy_poll()).await?;
            }
            self.station.pause(constants.difs()).await?;
            if !medium.in_use() {
                return Ok(());
            }
        }
    }

    /// Counts down a random backoff, freezing while the medium is busy
    async fn backoff(&mut self, attempt: u32) -> Result<()> {
        let window = contention_window(self.station.medium.constants(), attempt);
        let mut slots = select_slots(self.station.ctx.backoff(), window, &mut self.rng);
        if self.detail() {
            trace!(attempt, window, slots, "Backing off");
        }

        let slot = self.station.medium.constants().slot;
        while slots > 0 {
            if self.station.medium.in_use() {
                self.contend().await?;
                continue;
            }
            self.station.pause(slot).await?;
            if !self.station.medium.in_use() {
                slots -= 1;
            }
        }
        Ok(())
    }

    async fn transmit(&self, frame: &Frame) {
        let sent = self.station.medium.transmit(frame.as_bytes()).await;
        if sent < frame.len() && self.station.ctx.chatty() {
            warn!(sent, len = frame.len(), "Short transmission");
        }
        if self.detail() {
            debug!(%frame, "Transmitted frame");
        }
    }

    /// Waits for the ACK matching `frame`, ignoring any others
    async fn await_ack(&mut self, frame: &Frame) -> Result<()> {
        let expected = frame.sequence();
        let deadline = Instant::now() + self.station.medium.constants().ack_timeout();

        loop {
            let heard = tokio::select! {
                _ = self.station.cancel.cancelled() => return Err(Error::Cancelled),
                heard = timeout_at(deadline, self.acks.recv()) => heard,
            };

            match heard {
                Err(_) => return Err(Error::AckTimeout { sequence: expected }),
                Ok(None) => return Err(Error::Closed),
                Ok(Some(ack)) if ack.sequence() == expected && ack.src() == frame.dest() => return Ok(()),
                Ok(Some(ack)) => {
                    if self.detail() {
                        let mismatch = Error::AckMismatch {
                            expected,
                            actual: ack.sequence(),
                        };
                        debug!(error = %mismatch, src = %ack.src(), "Ignoring ACK");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tokio::time::sleep;
    use tokio_util::sync::CancellationToken;

    use crate::core::{BackoffPolicy, Command, LinkConfig, LinkContext, MacAddr, MediumConstants};
    use crate::medium::{Air, AirConfig, Medium};
    use crate::protocol::FrameType;
    use crate::time::Clock;

    const ME: MacAddr = MacAddr(1);
    const PEER: MacAddr = MacAddr(2);

    struct Harness {
        air: Air,
        ctx: Arc<LinkContext>,
        outgoing: mpsc::Sender<Frame>,
        acks: mpsc::Sender<Frame>,
        cancel: CancellationToken,
        task: tokio::task::JoinHandle<()>,
    }

    fn start(config: LinkConfig) -> Harness {
        let air = Air::new(AirConfig::default());
        let medium = Arc::new(air.attach());
        let ctx = Arc::new(LinkContext::new(&config));
        let cancel = CancellationToken::new();
        let station = Station {
            mac: ME,
            medium: medium.clone(),
            clock: Arc::new(Clock::new(medium)),
            ctx: ctx.clone(),
            cancel: cancel.clone(),
        };

        let (outgoing, outgoing_rx) = mpsc::channel(4);
        let (acks, acks_rx) = mpsc::channel(4);
        let task = tokio::spawn(Sender::new(station, outgoing_rx, acks_rx, config.beacon_lead).run());

        Harness {
            air,
            ctx,
            outgoing,
            acks,
            cancel,
            task,
        }
    }

    fn quiet() -> LinkConfig {
        LinkConfig {
            beacon_interval: Duration::ZERO,
            ..Default::default()
        }
    }

    fn data(dest: MacAddr, seq: u16) -> Frame {
        codec::encode(ME, dest, b"payload", FrameType::Data, seq, false).unwrap()
    }

    fn ack(from: MacAddr, seq: u16) -> Frame {
        codec::encode(from, ME, &[], FrameType::Ack, seq, false).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_path_transmits_after_difs() {
        let h = start(quiet());
        h.outgoing.send(data(PEER, 0)).await.unwrap();

        sleep(Duration::from_millis(600)).await;
        let log = h.air.transmissions();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].start_ms, 500);
        h.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_limit_exhausted() {
        let h = start(quiet());
        h.outgoing.send(data(PEER, 9)).await.unwrap();

        sleep(Duration::from_secs(120)).await;
        let log = h.air.transmissions();
        let limit = MediumConstants::default().retry_limit as usize;
        assert_eq!(log.len(), limit + 1);
        assert_eq!(h.ctx.status(), Status::TxFailed);

        let frames: Vec<Frame> = log.iter().map(|t| codec::decode(t.bytes.clone())).collect();
        assert!(!frames[0].retry());
        for retry in &frames[1..] {
            assert!(retry.retry());
            assert!(codec::verify_checksum(retry));
            assert_eq!(retry.sequence(), 9);
            assert_eq!(retry.payload(), frames[0].payload());
        }
        h.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_matching_ack_settles_frame() {
        let h = start(quiet());
        h.outgoing.send(data(PEER, 3)).await.unwrap();
        sleep(Duration::from_millis(600)).await;

        h.acks.send(ack(PEER, 2)).await.unwrap();
        h.acks.send(ack(MacAddr(99), 3)).await.unwrap();
        h.acks.send(ack(PEER, 3)).await.unwrap();

        sleep(Duration::from_secs(5)).await;
        assert_eq!(h.air.transmissions().len(), 1);
        assert_eq!(h.ctx.status(), Status::TxDelivered);
        h.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_ack_discarded() {
        let h = start(quiet());
        h.acks.send(ack(PEER, 0)).await.unwrap();
        h.outgoing.send(data(PEER, 0)).await.unwrap();

        sleep(Duration::from_secs(10)).await;
        assert!(h.air.transmissions().len() > 1);
        h.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_broadcast_sent_once() {
        let h = start(quiet());
        h.outgoing.send(data(MacAddr::BROADCAST, 0)).await.unwrap();

        sleep(Duration::from_secs(10)).await;
        assert_eq!(h.air.transmissions().len(), 1);
        assert_eq!(h.ctx.status(), Status::TxDelivered);
        h.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_beacons_when_idle() {
        let config = LinkConfig {
            beacon_interval: Duration::from_secs(1),
            ..Default::default()
        };
        let h = start(config);

        sleep(Duration::from_millis(3_500)).await;
        let log = h.air.transmissions();
        assert!(log.len() >= 2);
        for record in &log {
            let beacon = codec::decode(record.bytes.clone());
            assert_eq!(beacon.frame_type(), Some(FrameType::Beacon));
            assert!(beacon.is_broadcast());
            assert!(codec::beacon_time(&beacon).unwrap() >= record.start_ms);
        }
        // Beacons leave the status alone
        assert_eq!(h.ctx.status(), Status::Success);
        h.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_enabling_beacons_wakes_idle_sender() {
        let h = start(quiet());
        sleep(Duration::from_secs(3)).await;
        assert!(h.air.transmissions().is_empty());

        h.ctx.apply(Command::BeaconInterval(Duration::from_secs(1)));
        sleep(Duration::from_millis(1_600)).await;
        let log = h.air.transmissions();
        assert_eq!(log.len(), 1);
        assert_eq!(codec::decode(log[0].bytes.clone()).frame_type(), Some(FrameType::Beacon));
        h.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_policy_waits_full_window() {
        let config = LinkConfig {
            backoff: BackoffPolicy::Max,
            ..quiet()
        };
        let h = start(config);
        h.outgoing.send(data(PEER, 0)).await.unwrap();

        // First retry: busy poll, DIFS, then the full 7-slot window
        sleep(Duration::from_secs(5)).await;
        let log = h.air.transmissions();
        assert!(log.len() >= 2);
        let constants = MediumConstants::default();
        let gap = log[1].start_ms - log[0].end_ms;
        let floor = duration_to_millis(constants.ack_timeout() + constants.difs() + constants.slot * 7);
        assert!(gap >= floor.saturating_sub(10), "gap {} below {}", gap, floor);
        h.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_medium_freezes_countdown() {
        let config = LinkConfig {
            backoff: BackoffPolicy::Max,
            ..quiet()
        };
        let h = start(config);
        let neighbour = h.air.attach();
        h.outgoing.send(data(PEER, 0)).await.unwrap();

        // Unanswered at 500ms; the ACK wait ends at 1300ms and DIFS at 1800ms.
        // The first retry window is 7 slots, the first ending at 2000ms.
        sleep(Duration::from_millis(2_100)).await;
        let long = vec![0u8; 2_000];
        neighbour.transmit(&long).await;
        let busy_until = h.air.transmissions()[1].end_ms;
        assert_eq!(busy_until, 2_205);

        sleep(Duration::from_secs(5)).await;
        let log = h.air.transmissions();
        assert!(log.len() >= 3);
        let retry = &log[2];
        assert_eq!(retry.station, log[0].station);
        assert!(codec::decode(retry.bytes.clone()).retry());

        // The slot ending at 2200ms was busy and not counted. Six slots remain
        // after the medium clears: busy poll to 2500ms, DIFS to 3000ms, then
        // 6 x 200ms. A reset window would have needed 7 slots (4400ms).
        let constants = MediumConstants::default();
        let resume = 2_500 + duration_to_millis(constants.difs());
        assert_eq!(retry.start_ms, resume + 6 * duration_to_millis(constants.slot));
        h.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_engine() {
        let h = start(quiet());
        h.cancel.cancel();
        timeout(Duration::from_secs(1), h.task).await.unwrap().unwrap();
    }
}

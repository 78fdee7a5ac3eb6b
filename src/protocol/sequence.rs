use std::collections::HashMap;

use crate::core::{MacAddr, SEQUENCE_SPACE};

/// Outcome of observing an incoming sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Next frame in order, or the first frame from this peer
    New,
    /// Already seen; do not deliver again
    Duplicate,
    /// Frames were skipped; deliver anyway. Carries the sequence that was expected.
    GapDetected(u16),
}

impl Verdict {
    /// Whether the frame should be handed to the application
    pub fn deliverable(&self) -> bool {
        !matches!(self, Verdict::Duplicate)
    }
}

const HALF_SPACE: u16 = SEQUENCE_SPACE / 2;

/// Forward distance from `from` to `to` in the 12-bit sequence space
fn forward_distance(from: u16, to: u16) -> u16 {
    to.wrapping_sub(from) % SEQUENCE_SPACE
}

/// Per-peer record of the last accepted sequence numbers
///
/// Unicast and broadcast streams are tracked independently. Entries are
/// created on the first frame from a peer and live for the tracker's lifetime.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    unicast_last: HashMap<MacAddr, u16>,
    broadcast_last: HashMap<MacAddr, u16>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies `seq` from `peer` and advances the baseline for non-duplicates
    ///
    /// Anything at or up to half the sequence space behind the baseline is a
    /// duplicate, so the stream may wrap from 4095 back to 0.
    pub fn observe(&mut self, peer: MacAddr, seq: u16, is_broadcast: bool) -> Verdict {
        let seq = seq % SEQUENCE_SPACE;
        let table = if is_broadcast {
            &mut self.broadcast_last
        } else {
            &mut self.unicast_last
        };

        let verdict = match table.get(&peer) {
            // Unicast senders number from zero, so a later first frame means
            // earlier ones were missed. Broadcasters may predate this node.
            None if !is_broadcast && seq != 0 => Verdict::GapDetected(0),
            None => Verdict::New,
            Some(&last) => match forward_distance(last, seq) {
                0 => Verdict::Duplicate,
                d if d >= HALF_SPACE => Verdict::Duplicate,
                1 => Verdict::New,
                _ => Verdict::GapDetected((last + 1) % SEQUENCE_SPACE),
            },
        };

        if verdict.deliverable() {
            table.insert(peer, seq);
        }
        verdict
    }

    /// Last accepted sequence from `peer`, if any
    pub fn last_seen(&self, peer: MacAddr, is_broadcast: bool) -> Option<u16> {
        let table = if is_broadcast {
            &self.broadcast_last
        } else {
            &self.unicast_last
        };
        table.get(&peer).copied()
    }

    /// Number of peers tracked across both streams
    pub fn peer_count(&self) -> usize {
        self.unicast_last.len() + self.broadcast_last.len()
    }
}

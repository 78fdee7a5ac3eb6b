use bytes::{BufMut, Bytes, BytesMut};
use crc32fast::Hasher;

use crate::core::{Error, MacAddr, Result, FRAME_OVERHEAD, MAX_PAYLOAD, SEQUENCE_SPACE};
use super::frame::{Frame, FrameType};

/// Size of the timestamp carried by a beacon
pub const BEACON_PAYLOAD_LEN: usize = 8;

fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Builds a frame from its fields
///
/// The sequence number is reduced modulo 4096; the checksum trailer is a
/// little-endian CRC-32 over every preceding byte.
pub fn encode(
    src: MacAddr,
    dest: MacAddr,
    payload: &[u8],
    frame_type: FrameType,
    sequence: u16,
    retry: bool,
) -> Result<Frame> {
    if payload.len() > MAX_PAYLOAD {
        return Err(Error::PayloadTooLarge {
            len: payload.len(),
            max: MAX_PAYLOAD,
        });
    }
    Ok(build(src, dest, payload, frame_type, sequence, retry))
}

fn build(
    src: MacAddr,
    dest: MacAddr,
    payload: &[u8],
    frame_type: FrameType,
    sequence: u16,
    retry: bool,
) -> Frame {
    let sequence = sequence % SEQUENCE_SPACE;
    let mut buf = BytesMut::with_capacity(payload.len() + FRAME_OVERHEAD);

    // Type, retry bit and the high nibble of the sequence share byte 0
    let mut first = (frame_type.bits() << 5) | (sequence >> 8) as u8;
    if retry {
        first |= 1 << 4;
    }
    buf.put_u8(first);
    buf.put_u8(sequence as u8);
    buf.put_u16(dest.value());
    buf.put_u16(src.value());
    buf.put_slice(payload);

    let checksum = crc32(&buf);
    buf.put_u32_le(checksum);

    Frame::from_wire(buf.freeze())
}

/// Views received bytes as a frame; never fails
pub fn decode(bytes: Bytes) -> Frame {
    Frame::from_wire(bytes)
}

/// Recomputes the checksum over everything but the trailer
pub fn verify_checksum(frame: &Frame) -> bool {
    let raw = frame.as_bytes();
    if raw.len() < FRAME_OVERHEAD {
        return false;
    }
    crc32(&raw[..raw.len() - 4]) == frame.checksum()
}

/// Re-encodes a frame with its retry bit set
pub fn mark_retry(frame: &Frame) -> Frame {
    if frame.retry() || frame.len() < FRAME_OVERHEAD {
        return frame.clone();
    }
    let mut buf = BytesMut::from(frame.as_bytes());
    buf[0] |= 1 << 4;
    let end = buf.len() - 4;
    let checksum = crc32(&buf[..end]);
    buf[end..].copy_from_slice(&checksum.to_le_bytes());
    Frame::from_wire(buf.freeze())
}

/// Builds a broadcast beacon carrying a big-endian timestamp
pub fn make_beacon(src: MacAddr, timestamp: u64) -> Frame {
    build(src, MacAddr::BROADCAST, &timestamp.to_be_bytes(), FrameType::Beacon, 0, false)
}

/// Timestamp embedded in a beacon, `None` for any other frame
pub fn beacon_time(frame: &Frame) -> Option<u64> {
    if frame.frame_type() != Some(FrameType::Beacon) {
        return None;
    }
    let payload = frame.payload();
    let stamp: [u8; BEACON_PAYLOAD_LEN] = payload.get(..BEACON_PAYLOAD_LEN)?.try_into().ok()?;
    Some(u64::from_be_bytes(stamp))
}

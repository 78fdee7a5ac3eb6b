use std::fmt;

use bytes::Bytes;

use crate::core::{MacAddr, FRAME_OVERHEAD};
use crate::util::bytes_to_string;

/// Frame type carried in the top three bits of the first header byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    Data = 0,
    Ack = 1,
    Beacon = 2,
    Cts = 4,
    Rts = 5,
}

impl FrameType {
    /// Maps the 3-bit wire value to a frame type
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(FrameType::Data),
            1 => Some(FrameType::Ack),
            2 => Some(FrameType::Beacon),
            4 => Some(FrameType::Cts),
            5 => Some(FrameType::Rts),
            _ => None,
        }
    }

    pub fn bits(&self) -> u8 {
        *self as u8
    }
}

/// A link frame, held in its wire form
///
/// Field accessors read straight out of the wire bytes. A frame built from
/// arbitrary bytes is only meaningful once [`super::codec::verify_checksum`]
/// has accepted it; on short buffers the accessors return zeroed fields.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    raw: Bytes,
}

impl Frame {
    /// Wraps received wire bytes without validating them
    pub fn from_wire(raw: Bytes) -> Self {
        Frame { raw }
    }

    /// The complete wire representation
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    pub fn to_bytes(&self) -> Bytes {
        self.raw.clone()
    }

    /// Total size on the wire
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    fn byte(&self, index: usize) -> u8 {
        self.raw.get(index).copied().unwrap_or(0)
    }

    fn addr_at(&self, index: usize) -> MacAddr {
        MacAddr(u16::from_be_bytes([self.byte(index), self.byte(index + 1)]))
    }

    /// Raw 3-bit type value, including reserved values
    pub fn type_bits(&self) -> u8 {
        self.byte(0) >> 5
    }

    pub fn frame_type(&self) -> Option<FrameType> {
        FrameType::from_bits(self.type_bits())
    }

    pub fn retry(&self) -> bool {
        self.byte(0) & 0x10 != 0
    }

    /// 12-bit sequence number
    pub fn sequence(&self) -> u16 {
        (u16::from(self.byte(0) & 0x0F) << 8) | u16::from(self.byte(1))
    }

    pub fn dest(&self) -> MacAddr {
        self.addr_at(2)
    }

    pub fn src(&self) -> MacAddr {
        self.addr_at(4)
    }

    pub fn is_broadcast(&self) -> bool {
        self.dest().is_broadcast()
    }

    /// Payload bytes between the header and the checksum
    pub fn payload(&self) -> Bytes {
        if self.raw.len() < FRAME_OVERHEAD {
            return Bytes::new();
        }
        self.raw.slice(6..self.raw.len() - 4)
    }

    /// Checksum trailer as carried on the wire
    pub fn checksum(&self) -> u32 {
        match self.raw.len().checked_sub(4) {
            Some(start) if self.raw.len() >= FRAME_OVERHEAD => {
                let mut trailer = [0u8; 4];
                trailer.copy_from_slice(&self.raw[start..]);
                u32::from_le_bytes(trailer)
            }
            _ => 0,
        }
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("type", &self.type_bits())
            .field("retry", &self.retry())
            .field("seq", &self.sequence())
            .field("dest", &self.dest())
            .field("src", &self.src())
            .field("payload_len", &self.payload().len())
            .finish()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.frame_type() {
            Some(kind) => format!("{:?}", kind),
            None => format!("reserved({})", self.type_bits()),
        };
        write!(
            f,
            "src={} dest={} type={} seq={} retry={} checksum_ok={} data={}",
            self.src(),
            self.dest(),
            kind,
            self.sequence(),
            self.retry(),
            super::codec::verify_checksum(self),
            bytes_to_string(&self.payload(), 16),
        )
    }
}

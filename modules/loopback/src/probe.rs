//! Probe payload: one 128-bit UMP stream message carrying a per-run nonce,
//! the endpoint's input index and a process-wide sequence number.

use mididiag_core::UmpPacket;
use std::sync::atomic::{AtomicU32, Ordering};

/// MT 0xF, form 0, status 0x3FF, low half "MD".
pub const MARKER_WORD: u32 = 0xF3FF_4D44;
const MARKER_MASK: u32 = 0xFFFF_0000;

static NEXT_SEQ: AtomicU32 = AtomicU32::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeTag {
    pub nonce: u32,
    pub index: u32,
    pub seq: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Echo {
    Exact,
    /// A probe came back, but not the one that was sent.
    Altered,
    /// Unrelated traffic from the endpoint.
    Foreign,
}

impl ProbeTag {
    pub fn next(nonce: u32, index: usize) -> Self {
        ProbeTag {
            nonce,
            index: index as u32,
            seq: NEXT_SEQ.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn packet(&self) -> UmpPacket {
        UmpPacket([MARKER_WORD, self.nonce, self.index, self.seq])
    }

    pub fn classify(&self, reply: &UmpPacket) -> Echo {
        if reply.0[0] & MARKER_MASK != MARKER_WORD & MARKER_MASK {
            Echo::Foreign
        } else if *reply == self.packet() {
            Echo::Exact
        } else {
            Echo::Altered
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_unique() {
        let a = ProbeTag::next(7, 0);
        let b = ProbeTag::next(7, 0);
        assert_ne!(a.packet(), b.packet());
    }

    #[test]
    fn classifies_replies() {
        let t = ProbeTag::next(1, 2);
        assert_eq!(t.classify(&t.packet()), Echo::Exact);
        let mut bent = t.packet();
        bent.0[2] ^= 1;
        assert_eq!(t.classify(&bent), Echo::Altered);
        // a MIDI 2.0 channel voice note-on
        assert_eq!(t.classify(&UmpPacket([0x4090_3C00, 0xFFFF_0000, 0, 0])), Echo::Foreign);
    }

    #[test]
    fn packet_is_a_stream_message() {
        assert_eq!(ProbeTag::next(0, 0).packet().message_type(), 0xF);
    }
}

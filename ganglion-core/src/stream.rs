// ganglion-core/src/stream.rs
//
// The one-byte stream-type tag written immediately after a multiplexed
// stream is opened (spec §4.2, §6). Dispatched on by C3, produced by C2.

/// Stream carries framed tuples destined for the local applier (C5/C6).
pub const STREAM_FORWARD: u8 = 0x01;
/// Stream is handed to the Raft transport (C4).
pub const STREAM_RAFT: u8 = 0x02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    Forward,
    Raft,
}

impl StreamType {
    pub fn tag(self) -> u8 {
        match self {
            StreamType::Forward => STREAM_FORWARD,
            StreamType::Raft => STREAM_RAFT,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            STREAM_FORWARD => Some(StreamType::Forward),
            STREAM_RAFT => Some(StreamType::Raft),
            _ => None,
        }
    }
}

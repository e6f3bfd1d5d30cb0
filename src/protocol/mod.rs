//! Wire protocol for BattlEye RCON.
//!
//! Defines the packet format, payload types and parsing.
//!
//! ## Packet Format
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │ 0x42 0x45 │ CRC32 (4, LE) │ 0xFF │ Type (1) │ Body ...           │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The checksum covers everything from the `0xFF` marker onward. The
//! protocol carries no length field; one datagram holds exactly one packet.

mod fragment;
mod packet;
mod response;

pub use fragment::FragmentBuffer;
pub use packet::Packet;
pub use response::{decode, CommandResponse, Response, ServerMessage};

/// Leading two bytes of every packet ("BE").
pub(crate) const HEADER_PREFIX: [u8; 2] = [0x42, 0x45];

/// Marker byte terminating the fixed header.
pub(crate) const END_OF_HEADER: u8 = 0xFF;

/// Fixed header length: prefix plus checksum.
pub(crate) const HEADER_SIZE: usize = 6;

/// Sub-header tag marking one fragment of a multi-packet command response.
pub(crate) const MULTI_PACKET: u8 = 0x00;

/// Payload type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PayloadType {
    /// Login request / response.
    Login = 0,
    /// Command request / response; an empty command is a keep-alive.
    Command = 1,
    /// Server broadcast (inbound) or its acknowledgement (outbound).
    Message = 2,
}

impl PayloadType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Login),
            1 => Some(Self::Command),
            2 => Some(Self::Message),
            _ => None,
        }
    }
}

/// Calculate CRC32 (IEEE) checksum.
pub fn checksum(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

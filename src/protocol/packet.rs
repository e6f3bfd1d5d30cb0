//! Outbound packet construction.

use byteorder::{ByteOrder, LittleEndian};

use super::{checksum, PayloadType, END_OF_HEADER, HEADER_PREFIX, HEADER_SIZE};

/// An outbound BattlEye packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    /// Authentication request carrying the server password.
    Login { password: String },
    /// Console command stamped with the current sequence number. An empty
    /// command serves as a keep-alive.
    Command { sequence: u8, command: String },
    /// Acknowledgement of a server broadcast, echoing its sequence number.
    MessageAck { sequence: u8 },
}

impl Packet {
    /// Create a login packet.
    pub fn login(password: impl Into<String>) -> Self {
        Self::Login {
            password: password.into(),
        }
    }

    /// Create a command packet.
    pub fn command(sequence: u8, command: impl Into<String>) -> Self {
        Self::Command {
            sequence,
            command: command.into(),
        }
    }

    /// Create a server message acknowledgement packet.
    pub fn message_ack(sequence: u8) -> Self {
        Self::MessageAck { sequence }
    }

    fn payload_type(&self) -> PayloadType {
        match self {
            Self::Login { .. } => PayloadType::Login,
            Self::Command { .. } => PayloadType::Command,
            Self::MessageAck { .. } => PayloadType::Message,
        }
    }

    /// Encode the packet into a datagram: the 6-byte header followed by the
    /// checksummed payload.
    pub fn encode(&self) -> Vec<u8> {
        let payload = self.payload();

        let mut data = Vec::with_capacity(HEADER_SIZE + payload.len());
        data.extend_from_slice(&HEADER_PREFIX);
        let mut crc = [0u8; 4];
        LittleEndian::write_u32(&mut crc, checksum(&payload));
        data.extend_from_slice(&crc);
        data.extend_from_slice(&payload);
        data
    }

    /// Type-specific payload, starting at the end-of-header marker.
    fn payload(&self) -> Vec<u8> {
        let mut payload = vec![END_OF_HEADER, self.payload_type() as u8];
        match self {
            Self::Login { password } => payload.extend_from_slice(password.as_bytes()),
            Self::Command { sequence, command } => {
                payload.push(*sequence);
                payload.extend_from_slice(command.as_bytes());
            }
            Self::MessageAck { sequence } => payload.push(*sequence),
        }
        payload
    }
}

//! Inbound datagram parsing.

use byteorder::{ByteOrder, LittleEndian};

use super::{checksum, PayloadType, END_OF_HEADER, HEADER_PREFIX, MULTI_PACKET};
use crate::error::{ProtocolError, Result};
use crate::MIN_PACKET_SIZE;

/// A decoded inbound datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Login outcome: `true` on success.
    Login(bool),
    /// Reply to a command packet.
    Command(CommandResponse),
    /// Unsolicited console message broadcast by the server.
    Message(ServerMessage),
}

/// Reply to a command packet, possibly one fragment of a larger response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    /// Sequence number of the command this reply answers.
    pub sequence: u8,
    /// `(total_parts, part_index)` when the reply is fragmented.
    pub multi: Option<(u8, u8)>,
    /// Reply body; one fragment of it when `multi` is set.
    pub body: String,
}

/// Unsolicited console message broadcast by the server. The client must
/// acknowledge it by echoing the sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerMessage {
    pub sequence: u8,
    pub body: String,
}

/// Decode a raw datagram.
///
/// Validation runs in order, each failure yielding a distinct error so
/// malformed traffic can be told apart in logs. Bodies are opaque text and
/// are never interpreted here.
pub fn decode(raw: &[u8]) -> Result<Response> {
    if raw.len() < MIN_PACKET_SIZE {
        return Err(ProtocolError::InvalidPacketSize.into());
    }
    if raw[0..2] != HEADER_PREFIX {
        return Err(ProtocolError::InvalidHeader.into());
    }
    if raw[6] != END_OF_HEADER {
        return Err(ProtocolError::InvalidEndOfHeader.into());
    }
    if checksum(&raw[6..]) != LittleEndian::read_u32(&raw[2..6]) {
        return Err(ProtocolError::InvalidChecksum.into());
    }

    match PayloadType::from_u8(raw[7]) {
        Some(PayloadType::Login) => decode_login(&raw[8..]),
        Some(PayloadType::Command) => decode_command(&raw[8..]),
        Some(PayloadType::Message) => decode_message(&raw[8..]),
        None => Err(ProtocolError::UnknownPacketType(raw[7]).into()),
    }
}

fn decode_login(body: &[u8]) -> Result<Response> {
    match body[0] {
        0x00 => Ok(Response::Login(false)),
        0x01 => Ok(Response::Login(true)),
        other => Err(ProtocolError::InvalidLoginResponse(other).into()),
    }
}

fn decode_command(body: &[u8]) -> Result<Response> {
    let sequence = body[0];
    let rest = &body[1..];

    // A bare sequence number is the reply to a keep-alive.
    if rest.is_empty() {
        return Ok(Response::Command(CommandResponse {
            sequence,
            multi: None,
            body: String::new(),
        }));
    }

    let (multi, body) = if rest[0] == MULTI_PACKET {
        if rest.len() < 3 {
            return Err(ProtocolError::InvalidPacketSize.into());
        }
        (Some((rest[1], rest[2])), &rest[3..])
    } else {
        (None, rest)
    };

    Ok(Response::Command(CommandResponse {
        sequence,
        multi,
        body: String::from_utf8_lossy(body).into_owned(),
    }))
}

fn decode_message(body: &[u8]) -> Result<Response> {
    Ok(Response::Message(ServerMessage {
        sequence: body[0],
        body: String::from_utf8_lossy(&body[1..]).into_owned(),
    }))
}

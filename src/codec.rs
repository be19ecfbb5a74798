//! Wire codec: deterministic encode of a [`Message`] into
//! one or more MTU-bounded fragment buffers, and decode of an inbound
//! datagram into a partially-parsed [`Message`] (payload left as an opaque
//! buffer — lazy decode, parsed only when the application reads it).
//!
//! ```text
//! offset 0..2  : protocol_signature (3 ASCII)
//! offset 3     : 0x00 (separator, rejects packets without it)
//! offset 4..5  : flags (big-endian uint16)
//! offset 6     : type (1 ASCII)
//! offset 7..10 : command (4 ASCII)
//! offset 11..14: id (big-endian uint32)
//! [+8 bytes]   : session_id, iff flag SESSION
//! [+4 bytes]   : fragment_index (u16 BE), fragments_total (u16 BE), iff FRAGMENTED
//! [payload]    : iff flag HAS_DATA
//! ```


use std::collections::HashSet;
use std::net::SocketAddr;

use crate::error::{Error, Result};
use crate::message::{flags, Command, Message, MessageType, Payload};

/// Minimum size of the fixed preamble.
pub const MIN_HEADER_SIZE: usize = 15;
/// Size of the optional session block.
pub const SESSION_SIZE: usize = 8;
/// Size of the optional fragment-coordinates block.
pub const FRAGMENT_BLOCK_SIZE: usize = 4;
/// Smallest data fragment the encoder will ever produce; also the slack
/// required between `max_packet_size` and the fragmented header size.
pub const MIN_DATA_FRAGMENT_SIZE: usize = 16;
/// Theoretical ceiling on `fragments_total`.
pub const FRAGMENTS_MAX: u32 = 65535;

/// Known MTUs, with the IP+UDP header overhead already modeled out so
/// callers can plug these straight into `max_packet_size`.
pub const IPV4_MTU: usize = 576;
pub const IPV6_MTU: usize = 1280;
pub const IP_UDP_OVERHEAD: usize = 68;

fn ceil_div(a: usize, b: usize) -> usize {
    (a + b - 1) / b
}

fn header_size(has_session: bool, is_fragmented: bool) -> usize {
    MIN_HEADER_SIZE
        + if has_session { SESSION_SIZE } else { 0 }
        + if is_fragmented { FRAGMENT_BLOCK_SIZE } else { 0 }
}

fn flag_bits(m: &Message) -> u16 {
    let mut f = 0u16;
    if m.want_ack {
        f |= flags::WANT_ACK;
    }
    if m.is_ack {
        f |= flags::IS_ACK;
    }
    if m.is_nack {
        f |= flags::IS_NACK;
    }
    if m.has_data() {
        f |= flags::HAS_DATA;
    }
    if m.fragmented {
        f |= flags::FRAGMENTED;
    }
    if m.compressed {
        f |= flags::COMPRESSED;
    }
    if m.encrypted {
        f |= flags::ENCRYPTED;
    }
    if m.session_id.is_some() {
        f |= flags::SESSION;
    }
    f
}

fn write_header(buf: &mut Vec<u8>, m: &Message, fragment_index: u16, fragments_total: u16) {
    buf.extend_from_slice(&m.protocol_signature);
    buf.push(0);
    buf.extend_from_slice(&flag_bits(m).to_be_bytes());
    buf.push(m.typ.to_byte());
    buf.extend_from_slice(&m.command.0);
    buf.extend_from_slice(&m.id.to_be_bytes());
    if let Some(session_id) = &m.session_id {
        buf.extend_from_slice(session_id);
    }
    if m.fragmented {
        buf.extend_from_slice(&fragment_index.to_be_bytes());
        buf.extend_from_slice(&fragments_total.to_be_bytes());
    }
}

/// Encodes `m` into one or more datagram buffers. `max_packet_size == 0`
/// disables fragmentation entirely; a positive value that the unfragmented
/// frame would exceed triggers a split.
///
/// `m.payload` must already hold the bytes to place on the wire — any
/// application-level serialization or compression happens upstream (see
/// [`crate::collab::Serializer`]); this function is a pure byte transform.
///
/// Encoding is deterministic: identical inputs produce byte-identical
/// output (testable property 1).
pub fn encode(m: &Message, max_packet_size: usize) -> Result<Vec<Vec<u8>>> {
    m.validate()?;

    let payload = m.payload.as_slice();
    let base_header = header_size(m.session_id.is_some(), false);

    if max_packet_size == 0 || base_header + payload.len() <= max_packet_size {
        let mut buf = Vec::with_capacity(base_header + payload.len());
        write_header(&mut buf, m, 0, 1);
        buf.extend_from_slice(payload);
        return Ok(vec![buf]);
    }

    let fragmented_header = header_size(m.session_id.is_some(), true);
    if max_packet_size <= fragmented_header + MIN_DATA_FRAGMENT_SIZE {
        return Err(Error::ErrPacketTooSmall);
    }

    let max_data = max_packet_size - fragmented_header;
    let fragments_total = ceil_div(payload.len(), max_data).max(1);
    if fragments_total as u32 > FRAGMENTS_MAX {
        return Err(Error::ErrTooManyFragments);
    }
    let fragment_size = ceil_div(payload.len(), fragments_total);

    let mut frag = m.clone();
    frag.fragmented = true;
    let mut out = Vec::with_capacity(fragments_total);
    for (index, chunk) in payload.chunks(fragment_size.max(1)).enumerate() {
        let mut buf = Vec::with_capacity(fragmented_header + chunk.len());
        write_header(&mut buf, &frag, index as u16, fragments_total as u16);
        buf.extend_from_slice(chunk);
        out.push(buf);
    }
    Ok(out)
}

/// Decodes one inbound datagram. Fails closed on every malformed-frame
/// condition (short buffer, bad separator, bad signature, disallowed
/// command, illegal flag combination); never panics on attacker-controlled
/// input.
pub fn decode(
    buf: &[u8],
    sender: SocketAddr,
    expected_signature: [u8; 3],
    supported_commands: Option<&HashSet<[u8; 4]>>,
    enable_session: bool,
) -> Result<Message> {
    if buf.len() < MIN_HEADER_SIZE {
        return Err(Error::ErrShortBuffer);
    }
    if buf[3] != 0 {
        return Err(Error::ErrBadSeparator);
    }
    if buf[0..3] != expected_signature {
        return Err(Error::ErrBadSignature);
    }

    let flag_bits = u16::from_be_bytes([buf[4], buf[5]]);
    let typ = MessageType::from_byte(buf[6])?;
    let command_bytes: [u8; 4] = buf[7..11].try_into().expect("slice is 4 bytes");
    let command = Command::new(command_bytes)?;
    if let Some(allowed) = supported_commands {
        if !allowed.contains(&command_bytes) {
            return Err(Error::ErrUnsupportedCommand);
        }
    }
    let id = u32::from_be_bytes(buf[11..15].try_into().expect("slice is 4 bytes"));

    let want_ack = flag_bits & flags::WANT_ACK != 0;
    let is_ack = flag_bits & flags::IS_ACK != 0;
    let is_nack = flag_bits & flags::IS_NACK != 0;
    let has_data = flag_bits & flags::HAS_DATA != 0;
    let fragmented = flag_bits & flags::FRAGMENTED != 0;
    let compressed = flag_bits & flags::COMPRESSED != 0;
    let encrypted = flag_bits & flags::ENCRYPTED != 0;
    let has_session = flag_bits & flags::SESSION != 0;

    if want_ack && (is_ack || is_nack) {
        return Err(Error::ErrAckWantAckConflict);
    }
    if (is_ack || is_nack) && has_data {
        return Err(Error::ErrDataFlagWithoutData);
    }
    if (compressed || encrypted) && !has_data {
        return Err(Error::ErrDataFlagWithoutData);
    }
    if has_session && !enable_session {
        return Err(Error::ErrSessionDisabled);
    }

    let mut offset = MIN_HEADER_SIZE;
    let session_id = if has_session {
        if buf.len() < offset + SESSION_SIZE {
            return Err(Error::ErrShortBuffer);
        }
        let mut id = [0u8; 8];
        id.copy_from_slice(&buf[offset..offset + SESSION_SIZE]);
        offset += SESSION_SIZE;
        Some(id)
    } else {
        None
    };

    let (fragment_index, fragments_total) = if fragmented {
        if buf.len() < offset + FRAGMENT_BLOCK_SIZE {
            return Err(Error::ErrShortBuffer);
        }
        let index = u16::from_be_bytes([buf[offset], buf[offset + 1]]);
        let total = u16::from_be_bytes([buf[offset + 2], buf[offset + 3]]);
        offset += FRAGMENT_BLOCK_SIZE;
        (index, total)
    } else {
        (0, 1)
    };
    if fragment_index >= fragments_total {
        return Err(Error::ErrFragmentIndexOutOfRange);
    }

    let payload = if has_data {
        if offset >= buf.len() {
            return Err(Error::ErrDataSizeInvalid);
        }
        Payload::Encoded(bytes::Bytes::copy_from_slice(&buf[offset..]))
    } else {
        if offset != buf.len() {
            return Err(Error::ErrLengthMismatch);
        }
        Payload::None
    };

    Ok(Message {
        protocol_signature: expected_signature,
        typ,
        command,
        id,
        want_ack,
        is_ack,
        is_nack,
        fragmented,
        reassembled: false,
        compressed,
        encrypted,
        session_id,
        fragment_index,
        fragments_total,
        payload,
        sender: Some(sender),
    })
}

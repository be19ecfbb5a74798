//! The logical unit exchanged by the engine: [`Message`] and its closed
//! alphabet of [`MessageType`]s. Wire encoding/decoding lives in
//! [`crate::codec`]; this module only models the value and its invariants.


use std::fmt;
use std::net::SocketAddr;

use bytes::Bytes;

use crate::error::{Error, Result};

/// Default `protocol_signature`: 3 ASCII bytes identifying this protocol
/// family on a shared port.
pub const DEFAULT_SIGNATURE: [u8; 3] = *b"UNP";

/// Flag bits packed into the big-endian `u16` at wire offset 4..6.
pub(crate) mod flags {
    pub const WANT_ACK: u16 = 1;
    pub const IS_ACK: u16 = 2;
    pub const IS_NACK: u16 = 4;
    pub const HAS_DATA: u16 = 8;
    pub const FRAGMENTED: u16 = 16;
    pub const COMPRESSED: u16 = 32;
    pub const ENCRYPTED: u16 = 64;
    pub const SESSION: u16 = 128;
}

/// The closed set of message roles. `S`, `F`, `k`, `s` are reserved wire
/// values that this engine never produces and rejects on decode (see
/// [`MessageType::from_byte`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// `C` — one-shot application command.
    Command,
    /// `Q` — a request awaiting a correlated [`MessageType::Response`].
    Query,
    /// `R` — reply to a `Query`, correlated by id.
    Response,
    /// `E` — fire-and-forget application event.
    Event,
    /// `K` — keep-alive.
    KeepAlive,
    /// `H` — user-initiated hello.
    Hello,
    /// `h` — discovery hello.
    DiscoveryHello,
}

impl MessageType {
    pub fn to_byte(self) -> u8 {
        match self {
            MessageType::Command => b'C',
            MessageType::Query => b'Q',
            MessageType::Response => b'R',
            MessageType::Event => b'E',
            MessageType::KeepAlive => b'K',
            MessageType::Hello => b'H',
            MessageType::DiscoveryHello => b'h',
        }
    }

    pub fn from_byte(b: u8) -> Result<Self> {
        match b {
            b'C' => Ok(MessageType::Command),
            b'Q' => Ok(MessageType::Query),
            b'R' => Ok(MessageType::Response),
            b'E' => Ok(MessageType::Event),
            b'K' => Ok(MessageType::KeepAlive),
            b'H' => Ok(MessageType::Hello),
            b'h' => Ok(MessageType::DiscoveryHello),
            _ => Err(Error::ErrUnknownType),
        }
    }

    /// The response type a query of this type correlates with (`Q ↦ R`,
    /// reserved `q ↦ r`). `None` for types that never get replies.
    pub fn response_type(self) -> Option<MessageType> {
        match self {
            MessageType::Query => Some(MessageType::Response),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_byte() as char)
    }
}

/// A 4-byte alphanumeric ASCII application verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Command(pub [u8; 4]);

impl Command {
    pub fn new(bytes: [u8; 4]) -> Result<Self> {
        if bytes.iter().all(|b| b.is_ascii_alphanumeric()) {
            Ok(Command(bytes))
        } else {
            Err(Error::ErrBadCommand)
        }
    }

    pub fn from_str(s: &str) -> Result<Self> {
        let bytes: [u8; 4] = s.as_bytes().try_into().map_err(|_| Error::ErrBadCommand)?;
        Command::new(bytes)
    }

    pub fn as_str(&self) -> &str {
        // Constructor guarantees ASCII alphanumeric bytes.
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A message's payload, modeling the decoded/encoded flip-flop invariant —
/// at most one form is current at a time — directly in the type instead of
/// by convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// No payload: acks, nacks, keep-alives, empty events.
    None,
    /// Application bytes before serialization: what a caller hands a
    /// `send_*` method, and what [`crate::collab::Serializer::deserialize`]
    /// produces on the receive side.
    Decoded(Vec<u8>),
    /// Wire bytes after [`crate::collab::Serializer::serialize`] (and
    /// optional compression): the only form the codec and the reassembly
    /// engine ever see or produce.
    Encoded(Bytes),
}

impl Payload {
    pub fn is_some(&self) -> bool {
        !matches!(self, Payload::None)
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            Payload::None => &[],
            Payload::Decoded(b) => b,
            Payload::Encoded(b) => b,
        }
    }
}

/// The logical unit the application sends or receives.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub protocol_signature: [u8; 3],
    pub typ: MessageType,
    pub command: Command,
    pub id: u32,

    pub want_ack: bool,
    pub is_ack: bool,
    pub is_nack: bool,
    pub fragmented: bool,
    pub reassembled: bool,
    pub compressed: bool,
    pub encrypted: bool,

    pub session_id: Option<[u8; 8]>,

    pub fragment_index: u16,
    pub fragments_total: u16,

    pub payload: Payload,

    /// Peer endpoint: set on receive, `None` on send.
    pub sender: Option<SocketAddr>,
}

impl Message {
    /// A bare message with no payload, no ack requested, fragment fields at
    /// their defaults (index 0, total 1 meaning "whole, unfragmented").
    pub fn new(typ: MessageType, command: Command, id: u32) -> Self {
        Message {
            protocol_signature: DEFAULT_SIGNATURE,
            typ,
            command,
            id,
            want_ack: false,
            is_ack: false,
            is_nack: false,
            fragmented: false,
            reassembled: false,
            compressed: false,
            encrypted: false,
            session_id: None,
            fragment_index: 0,
            fragments_total: 1,
            payload: Payload::None,
            sender: None,
        }
    }

    pub fn has_data(&self) -> bool {
        self.payload.is_some()
    }

    /// Validates the data-model invariants: ack/want_ack can't both be set,
    /// ack/nack can't carry a payload, compressed/encrypted implies a
    /// payload, and the fragment index must be in range. Command bytes and
    /// message type are already structurally guaranteed by construction.
    pub fn validate(&self) -> Result<()> {
        if self.is_ack && self.want_ack {
            return Err(Error::ErrAckWantAckConflict);
        }
        if (self.is_ack || self.is_nack) && self.has_data() {
            return Err(Error::ErrDataFlagWithoutData);
        }
        if (self.compressed || self.encrypted) && !self.has_data() {
            return Err(Error::ErrDataFlagWithoutData);
        }
        if self.fragment_index >= self.fragments_total {
            return Err(Error::ErrFragmentIndexOutOfRange);
        }
        Ok(())
    }

    /// Builds the ack this engine sends back for a message that asked for
    /// one. Echoes fragment coordinates when the originating message was a
    /// fragment.
    pub fn make_ack(&self) -> Message {
        let mut ack = Message::new(self.typ, self.command, self.id);
        ack.protocol_signature = self.protocol_signature;
        ack.is_ack = true;
        if self.fragmented {
            ack.fragmented = true;
            ack.fragment_index = self.fragment_index;
            ack.fragments_total = self.fragments_total;
        }
        ack
    }
}

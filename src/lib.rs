//! A reliability-and-framing layer over UDP datagrams: an unambiguous
//! binary frame format, application-level acknowledgement with timed
//! retransmission, application-level fragmentation with reassembly, a
//! request/response correlation mechanism, and dispatch of decoded
//! messages into a typed inbox.
//!
//! The UDP socket itself, the payload serializer, local-subnet discovery,
//! and logging configuration are external collaborators (see
//! [`collab`])—this crate only consumes the interfaces they present.

#![warn(rust_2018_idioms)]

pub mod cache;
pub mod codec;
pub mod collab;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod identity;
pub mod message;
pub mod reassembly;
pub mod reliability;

pub use codec::{FRAGMENTS_MAX, IPV4_MTU, IPV6_MTU, IP_UDP_OVERHEAD, MIN_DATA_FRAGMENT_SIZE, MIN_HEADER_SIZE, SESSION_SIZE};
pub use collab::{PassthroughSerializer, Serializer, SerializerParams};
pub use config::{BinaryDataParams, EngineBuilder, EngineOptions};
pub use engine::{EngineHandle, SendHandle};
pub use error::{Error, Result};
pub use message::{Command, Message, MessageType, Payload, DEFAULT_SIGNATURE};

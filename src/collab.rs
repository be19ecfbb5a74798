//! Collaborator interfaces: the UDP socket, the payload
//! serializer, and the application-facing event hubs, modeled as traits
//! with one default, swappable implementation each. Modeled on
//! `webrtc-util`'s `Conn` trait and its `impl Conn for UdpSocket`.


use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};

use crate::error::{Error, Result};
use crate::message::Message;

/// The datagram transport the engine sends and receives over. Mirrors
/// `webrtc-util::conn::Conn`, pared down to the operations the reliability
/// engine and the engine task actually use.
#[async_trait]
pub trait Socket: Send + Sync {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize>;
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl Socket for UdpSocket {
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, target).await
    }

    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }
}

/// Opaque configuration handed to a [`Serializer`] alongside the bytes it's
/// working on. The engine never interprets this — it only picks which one
/// applies to a given message via
/// [`crate::config::BinaryDataParams::params_for`] and threads it through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SerializerParams(pub Vec<u8>);

/// Turns an application value into wire bytes and back. The engine's own
/// payload is already an opaque buffer, so the default implementation is a
/// passthrough — it exists so compression can be layered in the same place
/// a real serializer would sit.
pub trait Serializer: Send + Sync {
    fn serialize(&self, value: &[u8], params: &SerializerParams) -> Result<Vec<u8>>;
    fn deserialize(&self, bytes: &[u8], params: &SerializerParams) -> Result<Vec<u8>>;
}

/// The default `Serializer`: bytes in, bytes out, `params` ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughSerializer;

impl Serializer for PassthroughSerializer {
    fn serialize(&self, value: &[u8], _params: &SerializerParams) -> Result<Vec<u8>> {
        Ok(value.to_vec())
    }

    fn deserialize(&self, bytes: &[u8], _params: &SerializerParams) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

/// Raw-deflate compression applied when a message's `compressed` flag is
/// set: the payload is serialized first, then optionally compressed. This
/// sits around a `Serializer` rather than replacing it, so it composes with
/// whatever payload representation the caller actually uses.
pub fn compress(bytes: &[u8]) -> Result<Vec<u8>> {
    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).map_err(Error::Io)?;
    encoder.finish().map_err(Error::Io)
}

pub fn decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    use flate2::write::DeflateDecoder;
    use std::io::Write;

    let mut decoder = DeflateDecoder::new(Vec::new());
    decoder.write_all(bytes).map_err(Error::Io)?;
    decoder.finish().map_err(Error::Io)
}

const GENERIC_HUB_CAPACITY: usize = 1024;

/// The generic `message` event stream: every decoded message, ack or not,
/// typed or not, passes through here. Backed by `broadcast` so any number
/// of subscribers can observe the same stream independently.
pub struct GenericHub {
    sender: broadcast::Sender<Message>,
}

impl GenericHub {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(GENERIC_HUB_CAPACITY);
        GenericHub { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.sender.subscribe()
    }

    pub fn publish(&self, message: Message) {
        // No subscribers is not an error: nobody asked to be told.
        let _ = self.sender.send(message);
    }
}

impl Default for GenericHub {
    fn default() -> Self {
        Self::new()
    }
}

/// The 5-character `type+command` key identifying a typed inbox channel: a
/// 1-character type tag concatenated with the 4-character command.
pub fn typed_key(typ: crate::message::MessageType, command: crate::message::Command) -> String {
    format!("{typ}{command}")
}

/// One unbounded channel per `type+command` an application has registered
/// interest in. Unregistered keys are simply not delivered to — not an
/// error, since nothing subscribed.
#[derive(Default)]
pub struct TypedInbox {
    handlers: std::collections::HashMap<String, mpsc::UnboundedSender<Message>>,
}

impl TypedInbox {
    pub fn new() -> Self {
        TypedInbox::default()
    }

    /// Registers interest in `key`, returning the receiving half. A
    /// second registration for the same key replaces the first.
    pub fn register(&mut self, key: String) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.handlers.insert(key, tx);
        rx
    }

    pub fn deregister(&mut self, key: &str) {
        self.handlers.remove(key);
    }

    /// Delivers `message` to the handler registered for its `type+command`,
    /// if any. Silently drops a message for an unregistered key, and prunes
    /// a handler whose receiver has been dropped.
    pub fn dispatch(&mut self, message: &Message) {
        let key = typed_key(message.typ, message.command);
        let mut stale = false;
        if let Some(tx) = self.handlers.get(&key) {
            stale = tx.send(message.clone()).is_err();
        }
        if stale {
            self.handlers.remove(&key);
        }
    }
}

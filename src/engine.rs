//! Engine task & handle, and the high-level send API built on top of it.
//! The task is a single cooperative execution context: it
//! alone mutates the reliability/reassembly/response tables, driven by one
//! `tokio::select!` over the socket, a sweep timer, and an internal command
//! channel. [`EngineHandle`] is the cheaply cloneable, `Send + Sync` facade
//! application code actually holds; every one of its methods that touches
//! engine-owned state round-trips through that channel.

#[cfg(test)]
mod engine_test;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use log::{trace, warn};
use rand::Rng;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::time::Instant;

use crate::codec;
use crate::collab::{compress, decompress, typed_key, GenericHub, PassthroughSerializer, Serializer, Socket, TypedInbox};
use crate::config::EngineOptions;
use crate::dispatch::{classify, Dispatched};
use crate::error::{Error, Result};
use crate::identity::{ack_id, response_id};
use crate::message::{Command, Message, MessageType, Payload};
use crate::reassembly::ReassemblyEngine;
use crate::reliability::ReliabilityEngine;

const INBOUND_BUFFER_SIZE: usize = 65535;

struct PendingResponse {
    completion: Option<oneshot::Sender<Result<Message>>>,
    forget_at: Instant,
}

/// Pending-response table: simpler than the reliability engine's ack table
/// since a response neither resends nor tracks fragments.
struct PendingResponses {
    pending: HashMap<String, PendingResponse>,
}

impl PendingResponses {
    fn new() -> Self {
        PendingResponses {
            pending: HashMap::new(),
        }
    }

    fn register(&mut self, id: String, forget_at: Instant) -> oneshot::Receiver<Result<Message>> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            id,
            PendingResponse {
                completion: Some(tx),
                forget_at,
            },
        );
        rx
    }

    /// Resolves the waiter for `id`, if any. Returns `false` for a "stray
    /// response" — no matching query waiting.
    fn resolve(&mut self, id: &str, message: Message) -> bool {
        match self.pending.remove(id) {
            Some(mut entry) => {
                if let Some(tx) = entry.completion.take() {
                    let _ = tx.send(Ok(message));
                }
                true
            }
            None => false,
        }
    }

    fn expire(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, v)| v.forget_at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for id in expired {
            if let Some(mut entry) = self.pending.remove(&id) {
                if let Some(tx) = entry.completion.take() {
                    let _ = tx.send(Err(Error::Timeout));
                }
            }
        }
    }

    fn next_wakeup(&self) -> Option<Instant> {
        self.pending.values().map(|v| v.forget_at).min()
    }
}

/// What a `send`-family call through [`EngineHandle`] hands back: one
/// completion per fragment that wanted an ack, and (for `send_query`) the
/// waiter for the correlated response.
pub struct SendHandle {
    acks: Vec<oneshot::Receiver<Result<()>>>,
    response: Option<oneshot::Receiver<Result<Message>>>,
}

impl SendHandle {
    /// Awaits every per-fragment ack; the overall send succeeds only once
    /// every fragment's ack has resolved. A no-ack send has none registered
    /// and resolves immediately.
    pub async fn await_acks(self) -> Result<()> {
        for rx in self.acks {
            rx.await.map_err(Error::from)??;
        }
        Ok(())
    }

    pub fn into_response(self) -> oneshot::Receiver<Result<Message>> {
        self.response.expect("await_response was requested")
    }
}

enum EngineCommand {
    Send {
        target: SocketAddr,
        message: Message,
        retries: u32,
        await_response: bool,
        reply: oneshot::Sender<Result<SendHandle>>,
    },
    Shutdown,
}

/// The cloneable facade application code holds. Cheap to clone: an mpsc
/// sender, two `Arc`s, and a `SocketAddr`.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<EngineCommand>,
    generic_hub: Arc<GenericHub>,
    typed_inbox: Arc<Mutex<TypedInbox>>,
    local_addr: SocketAddr,
}

impl EngineHandle {
    /// Binds a UDP socket per `options.server_port` (0 picks an ephemeral
    /// client port) and starts the engine task. A server and a client are
    /// the same engine; the only difference is the bind port.
    pub async fn start(options: EngineOptions) -> Result<EngineHandle> {
        let bind_addr = SocketAddr::from(([0, 0, 0, 0], options.server_port));
        let socket = UdpSocket::bind(bind_addr).await?;
        EngineHandle::start_with_socket(Arc::new(socket), options)
    }

    /// Starts the engine task over an already-constructed transport, with
    /// the default passthrough serializer. The seam tests use to drive the
    /// engine over an in-memory or pre-connected socket instead of a fresh
    /// bind.
    pub fn start_with_socket(socket: Arc<dyn Socket>, options: EngineOptions) -> Result<EngineHandle> {
        EngineHandle::start_with_socket_and_serializer(socket, options, Arc::new(PassthroughSerializer))
    }

    /// Binds a socket like [`EngineHandle::start`], but with a caller-
    /// supplied [`Serializer`] instead of the passthrough default — this is
    /// the seam an application plugs a real encoding (bincode, JSON, ...)
    /// into.
    pub async fn start_with_serializer(options: EngineOptions, serializer: Arc<dyn Serializer>) -> Result<EngineHandle> {
        let bind_addr = SocketAddr::from(([0, 0, 0, 0], options.server_port));
        let socket = UdpSocket::bind(bind_addr).await?;
        EngineHandle::start_with_socket_and_serializer(Arc::new(socket), options, serializer)
    }

    /// The fully general constructor every other `start*` delegates to.
    pub fn start_with_socket_and_serializer(
        socket: Arc<dyn Socket>,
        options: EngineOptions,
        serializer: Arc<dyn Serializer>,
    ) -> Result<EngineHandle> {
        let local_addr = socket.local_addr()?;
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let generic_hub = Arc::new(GenericHub::new());
        let typed_inbox = Arc::new(Mutex::new(TypedInbox::new()));

        let reassembly = ReassemblyEngine::new(options.reassembly_forget_timeout);
        let next_reassembly_rotate = Instant::now() + reassembly.rotate_interval();

        let task = EngineTask {
            socket,
            reliability: ReliabilityEngine::new(options.ack_resend_timeout, options.ack_forget_timeout),
            reassembly,
            responses: PendingResponses::new(),
            options,
            serializer,
            generic_hub: generic_hub.clone(),
            typed_inbox: typed_inbox.clone(),
            commands: commands_rx,
            next_reassembly_rotate,
        };
        tokio::spawn(task.run());

        Ok(EngineHandle {
            commands: commands_tx,
            generic_hub,
            typed_inbox,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Subscribes to the generic `message` event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.generic_hub.subscribe()
    }

    /// Registers interest in one `type+command` on the typed inbox.
    pub async fn subscribe_typed(&self, typ: MessageType, command: Command) -> mpsc::UnboundedReceiver<Message> {
        let key = typed_key(typ, command);
        self.typed_inbox.lock().await.register(key)
    }

    pub async fn unsubscribe_typed(&self, typ: MessageType, command: Command) {
        let key = typed_key(typ, command);
        self.typed_inbox.lock().await.deregister(&key);
    }

    /// Stops the engine task. Outstanding pending acks/responses are
    /// dropped, rejecting any in-flight waiter with a channel-closed error.
    pub fn shutdown(&self) {
        let _ = self.commands.send(EngineCommand::Shutdown);
    }

    async fn dispatch_send(
        &self,
        target: SocketAddr,
        message: Message,
        retries: u32,
        await_response: bool,
    ) -> Result<SendHandle> {
        let (reply, reply_rx) = oneshot::channel();
        self.commands.send(EngineCommand::Send {
            target,
            message,
            retries,
            await_response,
            reply,
        })?;
        reply_rx.await.map_err(Error::from)?
    }

    fn next_id() -> u32 {
        rand::thread_rng().gen::<u32>()
    }

    /// Sends an application command. `want_ack`/`retries` control whether
    /// and how many times the fragment(s) are resent before the send is
    /// considered successful. `compressed` asks for raw-deflate compression
    /// after serialization; it's ignored for an empty payload.
    pub async fn send_command(
        &self,
        target: SocketAddr,
        command: Command,
        payload: Vec<u8>,
        want_ack: bool,
        retries: u32,
        compressed: bool,
    ) -> Result<()> {
        let mut message = Message::new(MessageType::Command, command, Self::next_id());
        message.want_ack = want_ack;
        if !payload.is_empty() {
            message.payload = Payload::Decoded(payload);
            message.compressed = compressed;
        }
        self.dispatch_send(target, message, retries, false)
            .await?
            .await_acks()
            .await
    }

    /// Sends a user-initiated hello.
    pub async fn send_hello(&self, target: SocketAddr) -> Result<()> {
        let mut message = Message::new(MessageType::Hello, Command::from_str("HELO")?, Self::next_id());
        message.want_ack = true;
        self.dispatch_send(target, message, 0, false).await?.await_acks().await
    }

    /// Sends a keep-alive.
    pub async fn send_keep_alive(&self, target: SocketAddr) -> Result<()> {
        let message = Message::new(MessageType::KeepAlive, Command::from_str("PING")?, Self::next_id());
        self.dispatch_send(target, message, 0, false).await?.await_acks().await
    }

    /// Sends a query and awaits its correlated response. Fails with
    /// [`Error::Timeout`] if no response arrives within
    /// `response_forget_timeout`.
    pub async fn send_query(
        &self,
        target: SocketAddr,
        command: Command,
        payload: Vec<u8>,
        compressed: bool,
    ) -> Result<Message> {
        let mut message = Message::new(MessageType::Query, command, Self::next_id());
        if !payload.is_empty() {
            message.payload = Payload::Decoded(payload);
            message.compressed = compressed;
        }
        let handle = self.dispatch_send(target, message, 0, true).await?;
        let response_rx = handle.into_response();
        response_rx.await.map_err(Error::from)?
    }

    /// Replies to a received query: echoes the query's id and targets its
    /// sender.
    pub async fn send_response_for(&self, incoming: &Message, payload: Vec<u8>, compressed: bool) -> Result<()> {
        let target = incoming
            .sender
            .expect("a received message always carries its sender");
        let response_typ = incoming.typ.response_type().unwrap_or(MessageType::Response);
        let mut message = Message::new(response_typ, incoming.command, incoming.id);
        if !payload.is_empty() {
            message.payload = Payload::Decoded(payload);
            message.compressed = compressed;
        }
        self.dispatch_send(target, message, 0, false).await?.await_acks().await
    }
}

struct EngineTask {
    socket: Arc<dyn Socket>,
    options: EngineOptions,
    reliability: ReliabilityEngine,
    reassembly: ReassemblyEngine,
    responses: PendingResponses,
    serializer: Arc<dyn Serializer>,
    generic_hub: Arc<GenericHub>,
    typed_inbox: Arc<Mutex<TypedInbox>>,
    commands: mpsc::UnboundedReceiver<EngineCommand>,
    next_reassembly_rotate: Instant,
}

impl EngineTask {
    async fn run(mut self) {
        let mut buf = vec![0u8; INBOUND_BUFFER_SIZE];
        loop {
            let wakeup = self.next_wakeup();
            tokio::select! {
                res = self.socket.recv_from(&mut buf) => {
                    match res {
                        Ok((n, sender)) => self.handle_datagram(&buf[..n], sender).await,
                        Err(e) => warn!("recv_from failed: {e}"),
                    }
                }
                _ = sleep_until_or_pending(wakeup) => {
                    self.sweep().await;
                }
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(EngineCommand::Shutdown) | None => break,
                        Some(cmd) => self.handle_command(cmd).await,
                    }
                }
            }
        }
        trace!("engine task stopped");
    }

    fn next_wakeup(&self) -> Option<Instant> {
        [
            self.reliability.next_wakeup(),
            self.responses.next_wakeup(),
            Some(self.next_reassembly_rotate),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    async fn sweep(&mut self) {
        let now = Instant::now();
        for (target, buf) in self.reliability.due_resends(now) {
            if let Err(e) = self.socket.send_to(&buf, target).await {
                warn!("resend to {target} failed: {e}");
            }
        }
        self.reliability.expire(now);
        self.responses.expire(now);
        if now >= self.next_reassembly_rotate {
            self.reassembly.rotate();
            self.next_reassembly_rotate = now + self.reassembly.rotate_interval();
        }
    }

    async fn handle_command(&mut self, cmd: EngineCommand) {
        if let EngineCommand::Send {
            target,
            message,
            retries,
            await_response,
            reply,
        } = cmd
        {
            let result = self.handle_send(target, message, retries, await_response).await;
            let _ = reply.send(result);
        }
    }

    async fn handle_send(
        &mut self,
        target: SocketAddr,
        mut message: Message,
        retries: u32,
        await_response: bool,
    ) -> Result<SendHandle> {
        if let Payload::Decoded(decoded) = &message.payload {
            let params = self.options.binary_data_params.params_for(message.typ, message.command);
            let serialized = self.serializer.serialize(decoded, params)?;
            let wire = if message.compressed { compress(&serialized)? } else { serialized };
            message.payload = Payload::Encoded(Bytes::from(wire));
        }

        let fragments = codec::encode(&message, self.options.max_packet_size)?;
        let fragments_total = fragments.len() as u16;
        let now = Instant::now();

        let mut acks = Vec::new();
        for (index, buf) in fragments.into_iter().enumerate() {
            // A failed send_to is logged, not propagated: the resend/forget
            // timers still cover recovery.
            if let Err(e) = self.socket.send_to(&buf, target).await {
                warn!("send_to {target} failed: {e}");
            }
            if message.want_ack {
                let fragment = if fragments_total > 1 {
                    Some((index as u16, fragments_total))
                } else {
                    None
                };
                let id = ack_id(target, message.typ, message.command, message.id, fragment);
                acks.push(self.reliability.register(id, target, buf, retries, now));
            }
        }

        let response = if await_response {
            let id = response_id(target, message.typ, message.command, message.id);
            Some(self.responses.register(id, now + self.options.response_forget_timeout))
        } else {
            None
        };

        Ok(SendHandle { acks, response })
    }

    async fn handle_datagram(&mut self, buf: &[u8], sender: SocketAddr) {
        let supported = self.options.supported_commands.as_ref();
        let decoded = codec::decode(buf, sender, self.options.protocol_signature, supported, self.options.enable_session);
        let message = match decoded {
            Ok(m) => m,
            Err(e) => {
                warn!("dropping malformed datagram from {sender}: {e}");
                return;
            }
        };

        match classify(message, &mut self.reliability, &mut self.reassembly, self.options.ignore_wanted_ack) {
            Dispatched::Ack => {}
            Dispatched::FragmentPending { ack } => {
                if let Some(ack) = ack {
                    self.send_ack(&ack, sender).await;
                }
            }
            Dispatched::Complete { message, ack } => {
                if let Some(ack) = ack {
                    self.send_ack(&ack, sender).await;
                }
                self.deliver(message, sender).await;
            }
        }
    }

    /// Sends an already-built ack datagram, echoing whatever fragment
    /// coordinates (if any) it was built with — the caller decides that,
    /// since only it knows which specific fragment is being acked.
    async fn send_ack(&mut self, ack: &Message, target: SocketAddr) {
        match codec::encode(ack, 0) {
            Ok(buffers) => {
                for buf in buffers {
                    if let Err(e) = self.socket.send_to(&buf, target).await {
                        warn!("ack send_to {target} failed: {e}");
                    }
                }
            }
            Err(e) => warn!("failed to encode ack for {target}: {e}"),
        }
    }

    async fn deliver(&mut self, mut message: Message, sender: SocketAddr) {
        if let Payload::Encoded(wire) = &message.payload {
            let raw = if message.compressed {
                match decompress(wire) {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!("failed to decompress payload from {sender}: {e}");
                        return;
                    }
                }
            } else {
                wire.to_vec()
            };
            let params = self.options.binary_data_params.params_for(message.typ, message.command);
            match self.serializer.deserialize(&raw, params) {
                Ok(decoded) => message.payload = Payload::Decoded(decoded),
                Err(e) => {
                    warn!("failed to deserialize payload from {sender}: {e}");
                    return;
                }
            }
        }

        if message.typ == MessageType::Response {
            let id = response_id(sender, message.typ, message.command, message.id);
            if !self.responses.resolve(&id, message.clone()) {
                warn!("stray response from {sender} for unknown id {id}");
            }
        }
        self.generic_hub.publish(message.clone());
        self.typed_inbox.lock().await.dispatch(&message);
    }
}

async fn sleep_until_or_pending(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

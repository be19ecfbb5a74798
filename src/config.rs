//! Engine configuration, modeled on `stun`'s `ClientConfig`/builder
//! pattern: timeouts, the protocol signature, the optional supported-
//! command allow-list the codec's decode step consults, and the other
//! knobs an application needs to stand up an engine.


use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::collab::SerializerParams;
use crate::message::{Command, MessageType, DEFAULT_SIGNATURE};

/// Default `ack_resend_timeout`.
pub const DEFAULT_ACK_RESEND_TIMEOUT: Duration = Duration::from_millis(200);
/// Default `ack_forget_timeout`.
pub const DEFAULT_ACK_FORGET_TIMEOUT: Duration = Duration::from_millis(2000);
/// Default `response_forget_timeout`.
pub const DEFAULT_RESPONSE_FORGET_TIMEOUT: Duration = Duration::from_millis(2000);
/// Default `reassembly_forget_timeout`.
pub const DEFAULT_REASSEMBLY_FORGET_TIMEOUT: Duration = Duration::from_millis(2000);
/// Default number of resends attempted for an ack-requesting send, absent
/// an explicit `retries` argument at the call site.
pub const DEFAULT_RETRIES: u32 = 0;

/// Serializer configuration: a global default `SerializerParams`,
/// optionally overridden per `(type, command)`. Threaded through to
/// whatever [`crate::collab::Serializer`] the engine is configured with.
#[derive(Debug, Clone, Default)]
pub struct BinaryDataParams {
    default: SerializerParams,
    overrides: HashMap<(MessageType, Command), SerializerParams>,
}

impl BinaryDataParams {
    pub fn new(default: SerializerParams) -> Self {
        BinaryDataParams {
            default,
            overrides: HashMap::new(),
        }
    }

    /// Overrides the params used for messages of exactly this
    /// `type`+`command`; every other combination keeps using the default.
    pub fn with_override(mut self, typ: MessageType, command: Command, params: SerializerParams) -> Self {
        self.overrides.insert((typ, command), params);
        self
    }

    pub fn params_for(&self, typ: MessageType, command: Command) -> &SerializerParams {
        self.overrides.get(&(typ, command)).unwrap_or(&self.default)
    }
}

/// Engine configuration: timeouts, wire options, and dispatch policy.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub protocol_signature: [u8; 3],
    pub server_port: u16,
    pub max_packet_size: usize,
    pub ack_resend_timeout: Duration,
    pub ack_forget_timeout: Duration,
    pub response_forget_timeout: Duration,
    pub reassembly_forget_timeout: Duration,
    pub ignore_wanted_ack: bool,
    pub enable_session: bool,
    pub supported_commands: Option<HashSet<[u8; 4]>>,
    pub binary_data_params: BinaryDataParams,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            protocol_signature: DEFAULT_SIGNATURE,
            server_port: 0,
            max_packet_size: 0,
            ack_resend_timeout: DEFAULT_ACK_RESEND_TIMEOUT,
            ack_forget_timeout: DEFAULT_ACK_FORGET_TIMEOUT,
            response_forget_timeout: DEFAULT_RESPONSE_FORGET_TIMEOUT,
            reassembly_forget_timeout: DEFAULT_REASSEMBLY_FORGET_TIMEOUT,
            ignore_wanted_ack: false,
            enable_session: false,
            supported_commands: None,
            binary_data_params: BinaryDataParams::default(),
        }
    }
}

/// Builds an [`EngineOptions`] fluently, the way `stun::client::ClientBuilder`
/// builds a `ClientConfig`.
#[derive(Debug, Clone, Default)]
pub struct EngineBuilder {
    options: EngineOptions,
}

impl EngineBuilder {
    pub fn new() -> Self {
        EngineBuilder::default()
    }

    pub fn with_protocol_signature(mut self, signature: [u8; 3]) -> Self {
        self.options.protocol_signature = signature;
        self
    }

    pub fn with_server_port(mut self, port: u16) -> Self {
        self.options.server_port = port;
        self
    }

    pub fn with_max_packet_size(mut self, size: usize) -> Self {
        self.options.max_packet_size = size;
        self
    }

    pub fn with_ack_resend_timeout(mut self, timeout: Duration) -> Self {
        self.options.ack_resend_timeout = timeout;
        self
    }

    pub fn with_ack_forget_timeout(mut self, timeout: Duration) -> Self {
        self.options.ack_forget_timeout = timeout;
        self
    }

    pub fn with_response_forget_timeout(mut self, timeout: Duration) -> Self {
        self.options.response_forget_timeout = timeout;
        self
    }

    pub fn with_reassembly_forget_timeout(mut self, timeout: Duration) -> Self {
        self.options.reassembly_forget_timeout = timeout;
        self
    }

    pub fn with_ignore_wanted_ack(mut self, ignore: bool) -> Self {
        self.options.ignore_wanted_ack = ignore;
        self
    }

    pub fn with_enable_session(mut self, enable: bool) -> Self {
        self.options.enable_session = enable;
        self
    }

    pub fn with_supported_commands(mut self, commands: HashSet<[u8; 4]>) -> Self {
        self.options.supported_commands = Some(commands);
        self
    }

    pub fn with_binary_data_params(mut self, params: BinaryDataParams) -> Self {
        self.options.binary_data_params = params;
        self
    }

    pub fn build(self) -> EngineOptions {
        self.options
    }
}

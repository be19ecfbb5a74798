//! Deterministic string identifiers used to key the three
//! time-bounded caches. Each is a total, collision-resistant-in-practice
//! function of the peer endpoint plus a handful of message attributes;
//! cryptographic uniqueness is not required, only uniqueness within the
//! lifetime window of the relevant cache.

use std::fmt::Write as _;
use std::net::SocketAddr;

use crate::message::{Command, MessageType};

/// `ack_id = "<addr>:<port>:TCCCCIIII[:idx/total]"`, keying pending acks.
/// `fragment` is `Some((index, total))` when the ack/fragment it refers to
/// carries fragment coordinates.
pub fn ack_id(
    peer: SocketAddr,
    typ: MessageType,
    command: Command,
    id: u32,
    fragment: Option<(u16, u16)>,
) -> String {
    let mut s = format!("{peer}:{}{}{:08x}", typ, command, id);
    if let Some((index, total)) = fragment {
        let _ = write!(s, ":{index}/{total}");
    }
    s
}

/// `reassembly_id = "<addr>:<port>:TCCCCIIII/total"`, keying in-progress
/// fragment reassembly.
pub fn reassembly_id(
    peer: SocketAddr,
    typ: MessageType,
    command: Command,
    id: u32,
    fragments_total: u16,
) -> String {
    format!("{peer}:{}{}{:08x}/{}", typ, command, id, fragments_total)
}

/// `response_id = "<addr>:<port>:TCCCCIIII"` where `T` is the *response*
/// type derived from the originating query's type (`Q` ↦ `R`). Takes the
/// query's own type/command/id and the peer it targets.
pub fn response_id(peer: SocketAddr, query_typ: MessageType, command: Command, id: u32) -> String {
    let response_typ = query_typ.response_type().unwrap_or(query_typ);
    format!("{peer}:{}{}{:08x}", response_typ, command, id)
}

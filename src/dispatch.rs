//! Dispatcher: classifies a decoded inbound message into an
//! ack resolution, a pending fragment, or a complete message ready for
//! delivery. Response-waiter resolution and event-hub emission ("full
//! message handling") are one level up in [`crate::engine`], which is the
//! component that actually owns the pending-response table and the hubs.

#[cfg(test)]
mod dispatch_test;

use log::{trace, warn};

use crate::identity::ack_id;
use crate::message::Message;
use crate::reassembly::ReassemblyEngine;
use crate::reliability::ReliabilityEngine;

/// Outcome of classifying one inbound datagram. `ack`, where present, is
/// the ack datagram the caller must send back for *this* received
/// datagram — for a fragment, that's an ack echoing that fragment's own
/// index/total, sent on receipt rather than deferred until reassembly
/// completes.
pub enum Dispatched {
    /// The message resolved (or was a stray) ack; nothing further to do.
    Ack,
    /// A fragment was absorbed but the message isn't complete yet.
    FragmentPending { ack: Option<Message> },
    /// A full (possibly reassembled) message is ready for delivery.
    Complete { message: Message, ack: Option<Message> },
}

/// Classifies an inbound message in order: ack/nack resolution first, then
/// fragment reassembly, then completion. `ignore_wanted_ack` mirrors the
/// matching configuration option.
pub fn classify(
    msg: Message,
    reliability: &mut ReliabilityEngine,
    reassembly: &mut ReassemblyEngine,
    ignore_wanted_ack: bool,
) -> Dispatched {
    let sender = msg.sender.expect("inbound message always has a sender");

    if msg.is_ack || msg.is_nack {
        let fragment = if msg.fragmented {
            Some((msg.fragment_index, msg.fragments_total))
        } else {
            None
        };
        let id = ack_id(sender, msg.typ, msg.command, msg.id, fragment);
        if !reliability.resolve(&id) {
            warn!("stray ack from {sender} for unknown id {id}");
        }
        return Dispatched::Ack;
    }

    let want_ack = msg.want_ack && !ignore_wanted_ack;
    // Built from this datagram's own fragment coordinates, before it's
    // consumed by reassembly below, so a fragment is acked by its own
    // index/total rather than by whatever the eventually-reassembled
    // message looks like.
    let ack = if want_ack { Some(msg.make_ack()) } else { None };

    if !msg.fragmented {
        trace!(
            "dispatching complete message from {sender}: {}{}",
            msg.typ,
            msg.command
        );
        return Dispatched::Complete { message: msg, ack };
    }

    match reassembly.accept_fragment(msg) {
        Ok(Some(full)) => Dispatched::Complete { message: full, ack },
        Ok(None) => Dispatched::FragmentPending { ack },
        Err(e) => {
            warn!("dropping fragment: {e}");
            Dispatched::FragmentPending { ack: None }
        }
    }
}

//! Reassembly engine: accumulates fragments for a message
//! and emits the reconstructed message once every slot is filled.


use std::time::Duration;

use crate::cache::TimeBoundedCache;
use crate::codec::FRAGMENTS_MAX;
use crate::error::{Error, Result};
use crate::identity::reassembly_id;
use crate::message::{Message, Payload};

struct PendingReassembly {
    slots: Vec<Option<Vec<u8>>>,
    filled: usize,
    // A copy of the first fragment received, payload stripped, used as the
    // template the reassembled message inherits type/command/id/session/
    // compression/encryption from.
    template: Message,
}

pub struct ReassemblyEngine {
    pending: TimeBoundedCache<PendingReassembly>,
    max_fragments: u32,
}

impl ReassemblyEngine {
    pub fn new(forget_timeout: Duration) -> Self {
        Self::with_max_fragments(forget_timeout, FRAGMENTS_MAX)
    }

    /// Bounds `fragments_total` a first fragment may declare, rejecting it
    /// before allocating a slot `Vec` sized to an attacker-controlled count.
    pub fn with_max_fragments(forget_timeout: Duration, max_fragments: u32) -> Self {
        ReassemblyEngine {
            pending: TimeBoundedCache::new(forget_timeout),
            max_fragments,
        }
    }

    pub fn rotate_interval(&self) -> Duration {
        self.pending.rotate_interval()
    }

    /// Ages out reassemblies that have been incomplete for too long; their
    /// partial fragments are simply dropped.
    pub fn rotate(&mut self) {
        let _ = self.pending.rotate();
    }

    /// Feeds one fragment in. Returns `Ok(Some(message))` once every
    /// fragment of that message has arrived, `Ok(None)` while still
    /// incomplete. Duplicate fragments (a retransmitted fragment) silently
    /// overwrite rather than erroring.
    pub fn accept_fragment(&mut self, frag: Message) -> Result<Option<Message>> {
        let sender = frag.sender.expect("inbound fragment always has a sender");
        let id = reassembly_id(sender, frag.typ, frag.command, frag.id, frag.fragments_total);

        if self.pending.get(&id).is_none() {
            if frag.fragments_total as u32 > self.max_fragments {
                return Err(Error::ErrTooManyFragments);
            }
            let mut template = frag.clone();
            template.payload = Payload::None;
            self.pending.set(
                id.clone(),
                PendingReassembly {
                    slots: vec![None; frag.fragments_total as usize],
                    filled: 0,
                    template,
                },
            );
        }

        let entry = self
            .pending
            .get_mut(&id)
            .expect("just inserted or already present");
        if frag.fragment_index as usize >= entry.slots.len() {
            return Err(Error::ErrFragmentIndexOutOfRange);
        }

        let index = frag.fragment_index as usize;
        if entry.slots[index].is_none() {
            entry.filled += 1;
        }
        entry.slots[index] = Some(frag.payload.as_slice().to_vec());

        if entry.filled < entry.slots.len() {
            return Ok(None);
        }

        let mut full = Vec::new();
        for slot in entry.slots.drain(..) {
            full.extend(slot.expect("filled == slots.len() implies every slot is Some"));
        }

        let mut out = self.pending.delete(&id).expect("present").template;
        out.payload = Payload::Encoded(bytes::Bytes::from(full));
        out.reassembled = true;
        out.fragmented = false;
        Ok(Some(out))
    }
}

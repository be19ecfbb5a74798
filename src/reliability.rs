//! Reliability engine: per-fragment ack tracking,
//! retransmission scheduling, and timeout handling.
//!
//! A pending ack's forget deadline is an exact instant, not the coarser
//! generational eviction [`TimeBoundedCache::rotate`] gives the
//! reassembly/response tables — so this engine stores that deadline on the
//! entry itself and sweeps for it explicitly via
//! [`TimeBoundedCache::take_matching`]. The cache is still the storage
//! substrate (bounded, keyed by `ack_id`), just not its own rotation
//! schedule.


use std::net::SocketAddr;

use tokio::sync::oneshot;
use tokio::time::{Duration, Instant};

use crate::cache::TimeBoundedCache;
use crate::error::Error;

struct PendingAck {
    completion: Option<oneshot::Sender<Result<(), Error>>>,
    target: SocketAddr,
    raw: Vec<u8>,
    retries_left: u32,
    resend_at: Option<Instant>,
    forget_at: Instant,
}

pub struct ReliabilityEngine {
    pending: TimeBoundedCache<PendingAck>,
    resend_timeout: Duration,
    forget_timeout: Duration,
}

impl ReliabilityEngine {
    pub fn new(resend_timeout: Duration, forget_timeout: Duration) -> Self {
        ReliabilityEngine {
            pending: TimeBoundedCache::new(forget_timeout),
            resend_timeout,
            forget_timeout,
        }
    }

    /// Registers a pending ack for one outbound fragment. `retries` is the
    /// number of resends beyond the initial send already
    /// performed by the caller; `0` means no resend is scheduled and the
    /// entry lives or dies solely on the overall `forget_timeout`.
    pub fn register(
        &mut self,
        id: String,
        target: SocketAddr,
        raw: Vec<u8>,
        retries: u32,
        now: Instant,
    ) -> oneshot::Receiver<Result<(), Error>> {
        let (tx, rx) = oneshot::channel();
        let resend_at = if retries > 0 {
            Some(now + self.resend_timeout)
        } else {
            None
        };
        self.pending.set(
            id,
            PendingAck {
                completion: Some(tx),
                target,
                raw,
                retries_left: retries,
                resend_at,
                forget_at: now + self.forget_timeout,
            },
        );
        rx
    }

    /// Resolves a pending ack on arrival of the matching ack datagram.
    /// Returns `false` if `id` is unknown (a "stray ack" — the caller logs
    /// and moves on).
    pub fn resolve(&mut self, id: &str) -> bool {
        match self.pending.delete(id) {
            Some(mut entry) => {
                if let Some(tx) = entry.completion.take() {
                    let _ = tx.send(Ok(()));
                }
                true
            }
            None => false,
        }
    }

    /// Sweeps resend deadlines, returning the `(target, raw buffer)` pairs
    /// that must be resent right now. Each firing decrements the retry
    /// counter and reschedules the next resend iff retries remain; once
    /// exhausted, the entry stays registered until its `forget_at` deadline
    /// resolves it one way or the other.
    pub fn due_resends(&mut self, now: Instant) -> Vec<(SocketAddr, Vec<u8>)> {
        let resend_timeout = self.resend_timeout;
        let mut out = Vec::new();
        for entry in self.pending.values_mut() {
            if entry.resend_at.is_some_and(|at| at <= now) {
                out.push((entry.target, entry.raw.clone()));
                entry.retries_left = entry.retries_left.saturating_sub(1);
                entry.resend_at = if entry.retries_left > 0 {
                    Some(now + resend_timeout)
                } else {
                    None
                };
            }
        }
        out
    }

    /// Sweeps and rejects every pending ack whose overall deadline has
    /// passed, bounding the total time a send can stay outstanding by
    /// `ack_forget_timeout`.
    pub fn expire(&mut self, now: Instant) {
        for (_, mut entry) in self.pending.take_matching(|e| e.forget_at <= now) {
            if let Some(tx) = entry.completion.take() {
                let _ = tx.send(Err(Error::Timeout));
            }
        }
    }

    /// The instant the engine task's sweep timer should next fire for this
    /// table: the soonest of any pending resend or forget deadline.
    pub fn next_wakeup(&self) -> Option<Instant> {
        self.pending
            .values()
            .flat_map(|e| e.resend_at.into_iter().chain(std::iter::once(e.forget_at)))
            .min()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

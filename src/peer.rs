//! Peer state, session key pairs, and the session index collaborator.
//!
//! Peer configuration and routing table management belong to the handshake
//! collaborator; what lives here is only the slice of peer state the inbound
//! pipeline itself reads or writes: the per-peer inbound queue, liveness
//! timers, the replay window, and the rekey-debounce flag.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use zeroize::Zeroize;

use crate::queue::BoundedQueue;
use crate::work::SequenceItem;

/// How long a session key pair may decrypt traffic before the sequencer
/// refuses packets referencing it.
pub const REJECT_AFTER_TIME: Duration = Duration::from_secs(180);

/// Threshold (messages decrypted under one key pair) past which the
/// sequencer asks the handshake collaborator to rekey.
pub const REKEY_AFTER_MESSAGES: u64 = 1 << 60;

/// An opaque session key pair produced by the handshake collaborator.
/// Immutable once installed; the core never mutates it.
pub struct KeyPair {
    pub receive: [u8; 32],
    pub send: [u8; 32],
    pub created: Instant,
    /// Messages decrypted so far under `receive`; used for rekey triggering.
    decrypted: AtomicU64,
    /// Debounces `initiate_rekey` so it fires at most once per key pair.
    rekey_sent: AtomicBool,
}

impl KeyPair {
    pub fn new(receive: [u8; 32], send: [u8; 32], created: Instant) -> Self {
        Self {
            receive,
            send,
            created,
            decrypted: AtomicU64::new(0),
            rekey_sent: AtomicBool::new(false),
        }
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.created) > REJECT_AFTER_TIME
    }

    /// Records one more decrypted message and reports whether this crossing
    /// is the first time `REKEY_AFTER_MESSAGES` was exceeded.
    pub fn record_decrypted_and_should_rekey(&self) -> bool {
        let count = self.decrypted.fetch_add(1, Ordering::Relaxed) + 1;
        if count < REKEY_AFTER_MESSAGES {
            return false;
        }

        self.rekey_sent
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("created", &self.created)
            .finish_non_exhaustive()
    }
}

impl Drop for KeyPair {
    fn drop(&mut self) {
        self.receive.zeroize();
        self.send.zeroize();
    }
}

/// Sliding replay window over AEAD transport counters, maintained by the
/// sequencer. Bit `i` of `bitmap` means "counter `highest - i` has been
/// seen".
#[derive(Debug)]
pub struct ReplayWindow {
    inner: Mutex<ReplayWindowInner>,
}

#[derive(Debug)]
struct ReplayWindowInner {
    highest: u64,
    bitmap: u64,
}

impl ReplayWindow {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ReplayWindowInner {
                highest: 0,
                bitmap: 0,
            }),
        }
    }

    /// Returns `true` if `counter` is new (and records it), `false` if it is
    /// a replay (older than the window or already seen) and should be
    /// treated like a dropped packet.
    pub fn accept(&self, counter: u64) -> bool {
        let mut inner = self.inner.lock();

        if counter > inner.highest {
            let shift = counter - inner.highest;
            inner.bitmap = if shift >= 64 { 0 } else { inner.bitmap << shift };
            inner.bitmap |= 1;
            inner.highest = counter;
            return true;
        }

        let back = inner.highest - counter;
        if back >= 64 {
            return false;
        }

        let bit = 1u64 << back;
        if inner.bitmap & bit != 0 {
            return false;
        }

        inner.bitmap |= bit;
        true
    }
}

impl Default for ReplayWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(pub u32);

/// Liveness/handshake timers the sequencer and handshake worker update.
#[derive(Debug, Default)]
pub struct Timers {
    last_handshake: RwLock<Option<Instant>>,
    last_data_received: RwLock<Option<Instant>>,
}

impl Timers {
    pub fn record_handshake(&self) {
        *self.last_handshake.write() = Some(Instant::now());
    }

    pub fn record_data_received(&self) {
        *self.last_data_received.write() = Some(Instant::now());
    }

    pub fn last_handshake(&self) -> Option<Instant> {
        *self.last_handshake.read()
    }

    pub fn last_data_received(&self) -> Option<Instant> {
        *self.last_data_received.read()
    }
}

/// Per-peer state reachable from the inbound pipeline.
pub struct Peer {
    pub id: PeerId,
    pub endpoint: RwLock<Option<SocketAddr>>,
    pub inbound: BoundedQueue<SequenceItem>,
    pub replay_window: ReplayWindow,
    pub timers: Timers,
}

impl Peer {
    pub fn new(id: PeerId, queue_capacity: usize) -> Self {
        Self {
            id,
            endpoint: RwLock::new(None),
            inbound: BoundedQueue::new(queue_capacity),
            replay_window: ReplayWindow::new(),
            timers: Timers::default(),
        }
    }
}

/// The handshake collaborator's process-wide `receiver_id -> {peer,
/// key_pair}` mapping. A lookup returning a key pair keeps it valid for the
/// lifetime of the returned `Arc`.
pub trait SessionIndex: Send + Sync {
    fn lookup(&self, receiver_id: u32) -> Option<(Arc<Peer>, Arc<KeyPair>)>;
}

/// Minimal in-memory [`SessionIndex`] implementation used by tests and by
/// `main` until a real handshake collaborator installs entries.
#[derive(Default)]
pub struct SessionTable {
    entries: RwLock<std::collections::HashMap<u32, (Arc<Peer>, Arc<KeyPair>)>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, receiver_id: u32, peer: Arc<Peer>, key_pair: Arc<KeyPair>) {
        self.entries
            .write()
            .insert(receiver_id, (peer, key_pair));
    }

    pub fn remove(&self, receiver_id: u32) {
        self.entries.write().remove(&receiver_id);
    }
}

impl SessionIndex for SessionTable {
    fn lookup(&self, receiver_id: u32) -> Option<(Arc<Peer>, Arc<KeyPair>)> {
        self.entries.read().get(&receiver_id).cloned()
    }
}

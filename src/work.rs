//! The fan-out/fan-in synchronization primitive of the inbound pipeline.
//!
//! An [`InboundWork`] is constructed by the Receiver with its guard
//! pre-acquired, then placed into both the decryption queue and its peer's
//! inbound queue. The decryption pool releases the guard when it is done
//! (possibly after marking the item `Dropped`); the per-peer sequencer
//! blocks acquiring the same guard, which is how parallel decryption is
//! reconciled with in-order per-peer delivery.
//!
//! This is a binary semaphore handed from the producer to whichever of two
//! holders acquires it next: a reference-counted `tokio::sync::Mutex` inside
//! an `Arc`, with an owned guard. Ownership here is exactly two sequential
//! holders, so an owned mutex guard expresses the hand-off safely without
//! unsafe code.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::peer::KeyPair;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkState {
    Okay = 0,
    Dropped = 1,
}

#[derive(Debug, Default)]
struct AtomicWorkState(AtomicU8);

impl AtomicWorkState {
    fn load(&self) -> WorkState {
        match self.0.load(Ordering::Acquire) {
            1 => WorkState::Dropped,
            _ => WorkState::Okay,
        }
    }

    /// Monotonic `Okay -> Dropped` transition: once dropped, always dropped.
    fn set_dropped(&self) {
        self.0.store(WorkState::Dropped as u8, Ordering::Release);
    }
}

/// The synchronization primitive of the pipeline.
pub struct InboundWork {
    state: AtomicWorkState,
    /// The datagram buffer. Decryption rewrites it in place as plaintext;
    /// a dropped item leaves it untouched and it is discarded unread.
    pub packet: parking_lot::Mutex<BytesMut>,
    /// The 64-bit AEAD nonce counter extracted from the transport header.
    pub counter: u64,
    /// The session key pair used for decryption. Never mutated by the core.
    pub key_pair: Arc<KeyPair>,
}

impl InboundWork {
    /// Constructs a new work item and its pre-acquired guard in one step, so
    /// there is no window where the mutex exists unlocked.
    pub fn new(packet: BytesMut, counter: u64, key_pair: Arc<KeyPair>) -> (Arc<Self>, WorkGuard) {
        let mutex = Arc::new(Mutex::new(()));
        let guard = mutex
            .clone()
            .try_lock_owned()
            .expect("freshly constructed mutex is always uncontended");

        let work = Arc::new(Self {
            state: AtomicWorkState::default(),
            packet: parking_lot::Mutex::new(packet),
            counter,
            key_pair,
        });

        (work, WorkGuard { mutex, guard })
    }

    #[inline]
    pub fn is_dropped(&self) -> bool {
        self.state.load() == WorkState::Dropped
    }

    #[inline]
    pub fn mark_dropped(&self) {
        self.state.set_dropped();
    }
}

/// The held half of the pre-locked mutex. Handed from the Receiver to the
/// decryption pool; `release` consumes it, unblocking whichever sequencer is
/// waiting on [`acquire`].
pub struct WorkGuard {
    mutex: Arc<Mutex<()>>,
    guard: OwnedMutexGuard<()>,
}

impl WorkGuard {
    /// Releases the guard, unblocking a concurrent [`acquire`] call.
    pub fn release(self) {
        drop(self.guard);
    }

    /// A second handle to the same mutex, used by the sequencer to block
    /// until the guard above is released.
    pub fn locker(&self) -> Locker {
        Locker {
            mutex: self.mutex.clone(),
        }
    }
}

/// Lets the sequencer block on the same mutex the decryption pool holds,
/// without needing the guard itself (which is not `Clone`).
#[derive(Clone)]
pub struct Locker {
    mutex: Arc<Mutex<()>>,
}

impl Locker {
    /// Blocks until the decryption pool releases its [`WorkGuard`], then
    /// returns — observing `state` afterwards tells the sequencer whether to
    /// forward or discard.
    pub async fn acquire(&self) {
        let _ = self.mutex.lock().await;
    }
}

/// What the receiver places in the decryption queue: the work item together
/// with its pre-acquired guard, which the decryption pool releases once it
/// has opened (or failed to open) the packet.
pub struct DecryptItem {
    pub work: Arc<InboundWork>,
    pub guard: WorkGuard,
}

impl crate::queue::AsWork for DecryptItem {
    fn mark_dropped(&self) {
        self.work.mark_dropped();
    }
}

/// What the receiver places in a peer's inbound queue: the work item
/// together with a [`Locker`] the sequencer uses to wait for decryption to
/// finish.
pub struct SequenceItem {
    pub work: Arc<InboundWork>,
    pub locker: Locker,
}

impl crate::queue::AsWork for SequenceItem {
    fn mark_dropped(&self) {
        self.work.mark_dropped();
    }
}

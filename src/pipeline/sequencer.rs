//! Per-peer sequencer: re-imposes arrival order on the decryption pool's
//! output, applies the replay window, strips keep-alives, and triggers
//! rekeying.

use std::sync::Arc;

use crate::queue::enqueue_drop_oldest_silent;
use crate::signal::ShutdownListener;
use crate::state::Tunnel;

pub async fn run(tunnel: Arc<Tunnel>, peer: Arc<crate::peer::Peer>) {
    tunnel.metrics.peers_current.inc();

    loop {
        let item = tokio::select! {
            item = peer.inbound.pop() => item,
            _ = ShutdownListener::new() => break,
        };

        // Blocks until the decryption pool releases the guard for this item;
        // ordering holds because the receiver pushed items into this queue
        // in arrival order and each acquire respects that FIFO.
        item.locker.acquire().await;

        if item.work.is_dropped() {
            continue;
        }

        if !peer.replay_window.accept(item.work.counter) {
            tunnel.metrics.replay_rejected.inc();
            continue;
        }

        peer.timers.record_data_received();

        if item.work.key_pair.record_decrypted_and_should_rekey() {
            tunnel.handshake.initiate_rekey(&peer);
        }

        let plaintext = item.work.packet.lock().clone();
        if plaintext.is_empty() {
            // Keep-alive: its only purpose was to keep NAT state warm.
            continue;
        }

        let evicted = enqueue_drop_oldest_silent(&tunnel.tun_queue, plaintext);
        tunnel.metrics.dropped_tun_queue.add(evicted);
    }

    tunnel.metrics.peers_current.dec();
}

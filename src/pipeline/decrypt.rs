//! Decryption pool: N parallel workers performing AEAD-open on transport
//! packets, writing plaintext back into the packet buffer in place.

use std::sync::Arc;

use chacha20poly1305::aead::generic_array::GenericArray;
use chacha20poly1305::{AeadInPlace, ChaCha20Poly1305, KeyInit};

use crate::signal::ShutdownListener;
use crate::state::Tunnel;
use crate::wire::{self, TransportHeader};
use crate::work::DecryptItem;

pub async fn run(tunnel: Arc<Tunnel>) {
    loop {
        let item = tokio::select! {
            item = tunnel.decryption_queue.pop() => item,
            _ = ShutdownListener::new() => return,
        };

        if item.work.is_dropped() {
            item.guard.release();
            continue;
        }

        decrypt(&tunnel, &item);
        item.guard.release();
    }
}

fn decrypt(tunnel: &Arc<Tunnel>, item: &DecryptItem) {
    let cipher = ChaCha20Poly1305::new(GenericArray::from_slice(&item.work.key_pair.receive));
    let nonce = TransportHeader::nonce(item.work.counter);

    let mut packet = item.work.packet.lock();
    let mut content = packet[wire::OFFSET_CONTENT..].to_vec();

    match cipher.decrypt_in_place(GenericArray::from_slice(&nonce), &[], &mut content) {
        // The plaintext becomes the whole buffer; the header has served its
        // purpose and the sequencer only ever forwards plaintext.
        Ok(()) => *packet = content.into(),
        Err(_) => {
            tunnel.metrics.decrypt_failures.inc();
            item.work.mark_dropped();
        }
    }
}

//! TUN writer: single consumer that writes decrypted plaintext packets to
//! the TUN device.

use std::sync::Arc;

use crate::signal::ShutdownListener;
use crate::state::Tunnel;

pub async fn run(tunnel: Arc<Tunnel>) {
    loop {
        let packet = tokio::select! {
            packet = tunnel.tun_queue.pop() => packet,
            _ = ShutdownListener::new() => return,
        };

        match tunnel.tun.write(&packet) {
            Ok(()) => tunnel.metrics.tun_packets_written.inc(),
            Err(err) => tracing::warn!("TUN write failed: {}", err),
        }
    }
}

//! Handshake worker: consumes initiation/response packets from the
//! handshake queue and drives the handshake collaborator.

use std::sync::Arc;

use crate::signal::ShutdownListener;
use crate::state::{HandshakeWork, Tunnel};
use crate::wire::{self, InitiationPacket, ResponsePacket};

pub async fn run(tunnel: Arc<Tunnel>) {
    loop {
        let work = {
            let mut rx = tunnel.handshake_rx.lock().await;
            tokio::select! {
                work = rx.recv() => work,
                _ = ShutdownListener::new() => return,
            }
        };

        let Some(work) = work else {
            // Sender side dropped; nothing left to ever receive.
            return;
        };

        handle(&tunnel, work).await;
    }
}

async fn handle(tunnel: &Arc<Tunnel>, work: HandshakeWork) {
    match work.msg_type {
        wire::MESSAGE_INITIATION_TYPE => handle_initiation(tunnel, work).await,
        wire::MESSAGE_RESPONSE_TYPE => handle_response(tunnel, work).await,
        other => {
            tracing::error!("handshake worker received unexpected message type {}", other);
        }
    }
}

async fn handle_initiation(tunnel: &Arc<Tunnel>, work: HandshakeWork) {
    if work.packet.len() != wire::MESSAGE_INITIATION_SIZE {
        tracing::debug!("bad initiation length from {}", work.source);
        return;
    }

    let msg = match InitiationPacket::decode(&work.packet) {
        Ok(msg) => msg,
        Err(err) => {
            tracing::debug!("failed to decode initiation from {}: {}", work.source, err);
            return;
        }
    };

    match tunnel.handshake.consume_initiation(&msg, work.source) {
        Ok(_peer) => {
            tunnel.metrics.handshake_initiations.inc();
        }
        Err(err) => {
            tracing::info!("rejected initiation from {}: {}", work.source, err);
        }
    }
}

async fn handle_response(tunnel: &Arc<Tunnel>, work: HandshakeWork) {
    if work.packet.len() != wire::MESSAGE_RESPONSE_SIZE {
        tracing::debug!("bad response length from {}", work.source);
        return;
    }

    let msg = match ResponsePacket::decode(&work.packet) {
        Ok(msg) => msg,
        Err(err) => {
            tracing::debug!("failed to decode response from {}: {}", work.source, err);
            return;
        }
    };

    let peer = match tunnel.handshake.consume_response(&msg, work.source) {
        Ok(peer) => peer,
        Err(err) => {
            tracing::info!("rejected response from {}: {}", work.source, err);
            return;
        }
    };

    tunnel.metrics.handshake_responses.inc();
    tunnel.handshake.notify_handshake_completed(&peer);
    let _key_pair = tunnel.handshake.new_key_pair(&peer);
    tunnel.handshake.send_keep_alive(&peer);
}

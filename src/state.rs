//! Shared pipeline state: configuration, collaborators, queues, and metrics,
//! reachable from every stage and from the HTTP metrics endpoint.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::collab::HandshakeCollaborator;
use crate::config::Tunnel as TunnelConfig;
use crate::metrics::{Counter, Gauge};
use crate::peer::SessionIndex;
use crate::queue::BoundedQueue;
use crate::socket::TunnelSocket;
use crate::tun::TunDevice;
use crate::work::DecryptItem;

/// A handshake packet handed from the receiver to a handshake worker.
#[derive(Debug)]
pub struct HandshakeWork {
    pub msg_type: u32,
    pub packet: BytesMut,
    pub source: SocketAddr,
}

#[derive(Debug, Default)]
pub struct Metrics {
    pub rx_packets: Counter,
    pub rx_bytes: Counter,
    pub handshake_initiations: Counter,
    pub handshake_responses: Counter,
    pub cookie_replies_sent: Counter,
    pub mac1_failures: Counter,
    pub mac2_required: Counter,
    pub decrypt_failures: Counter,
    pub replay_rejected: Counter,
    pub expired_key_rejected: Counter,
    pub dropped_handshake_queue: Counter,
    pub dropped_decryption_queue: Counter,
    pub dropped_peer_queue: Counter,
    pub dropped_tun_queue: Counter,
    pub tun_packets_written: Counter,
    pub peers_current: Gauge,
}

/// Everything a pipeline stage needs: the socket to read from, the
/// collaborators it calls across, the queues connecting stages, and the
/// counters the HTTP endpoint exposes.
///
/// The handshake queue is a plain bounded `mpsc` channel: unlike the
/// decryption and per-peer queues it does not evict the oldest entry under
/// pressure. A full handshake queue instead refuses the newest admission
/// (the receiver's `try_send` fails and the packet is dropped), since MAC2
/// admission control already bounds how much handshake work reaches it. The
/// receiver end is shared behind a mutex so more than one handshake worker
/// can drain it.
pub struct Tunnel {
    pub config: TunnelConfig,
    pub socket: Arc<TunnelSocket>,
    pub handshake: Arc<dyn HandshakeCollaborator>,
    pub session_index: Arc<dyn SessionIndex>,
    pub tun: Arc<dyn TunDevice>,
    pub handshake_tx: mpsc::Sender<HandshakeWork>,
    pub handshake_rx: AsyncMutex<mpsc::Receiver<HandshakeWork>>,
    pub decryption_queue: BoundedQueue<DecryptItem>,
    pub tun_queue: BoundedQueue<BytesMut>,
    pub metrics: Metrics,
}

impl Tunnel {
    pub fn new(
        config: TunnelConfig,
        socket: Arc<TunnelSocket>,
        handshake: Arc<dyn HandshakeCollaborator>,
        session_index: Arc<dyn SessionIndex>,
        tun: Arc<dyn TunDevice>,
    ) -> Arc<Self> {
        let (handshake_tx, handshake_rx) = mpsc::channel(config.handshake_queue_capacity);
        let decryption_queue = BoundedQueue::new(config.decryption_queue_capacity);
        let tun_queue = BoundedQueue::new(config.tun_queue_capacity);

        Arc::new(Self {
            config,
            socket,
            handshake,
            session_index,
            tun,
            handshake_tx,
            handshake_rx: AsyncMutex::new(handshake_rx),
            decryption_queue,
            tun_queue,
            metrics: Metrics::default(),
        })
    }

    /// Current handshake-queue occupancy, used by the receiver's admission
    /// control to decide whether the device is "busy".
    pub fn handshake_queue_len(&self) -> usize {
        self.config.handshake_queue_capacity - self.handshake_tx.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::HandshakeWork;
    use crate::pipeline::test_support;

    #[tokio::test]
    async fn handshake_queue_len_reflects_outstanding_sends() {
        let (tunnel, _peer, _tun) = test_support::build().await;
        assert_eq!(tunnel.handshake_queue_len(), 0);

        let work = HandshakeWork {
            msg_type: crate::wire::MESSAGE_INITIATION_TYPE,
            packet: bytes::BytesMut::new(),
            source: "127.0.0.1:1".parse().unwrap(),
        };
        tunnel.handshake_tx.try_send(work).unwrap();

        assert_eq!(tunnel.handshake_queue_len(), 1);

        let mut rx = tunnel.handshake_rx.lock().await;
        rx.recv().await.unwrap();
        drop(rx);

        assert_eq!(tunnel.handshake_queue_len(), 0);
    }

    #[tokio::test]
    async fn fresh_tunnel_has_empty_queues() {
        let (tunnel, _peer, _tun) = test_support::build().await;
        assert_eq!(tunnel.decryption_queue.len(), 0);
        assert_eq!(tunnel.tun_queue.len(), 0);
    }
}

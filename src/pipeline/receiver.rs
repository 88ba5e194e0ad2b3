//! The Receiver: reads datagrams, classifies them, enforces MAC1/MAC2
//! admission, and dispatches each to the correct downstream queue.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::BytesMut;

use crate::queue::enqueue_drop_oldest;
use crate::signal::ShutdownListener;
use crate::socket;
use crate::state::{HandshakeWork, Tunnel};
use crate::wire::{self, CookieReplyPacket, TransportHeader};
use crate::work::{DecryptItem, InboundWork, SequenceItem};

pub async fn run(tunnel: Arc<Tunnel>) {
    let shutdown = ShutdownListener::new();

    loop {
        if shutdown.in_progress() {
            return;
        }

        let mut buf = BytesMut::zeroed(tunnel.config.max_message_size);
        let (len, addr) = match tunnel
            .socket
            .recv_from(&mut buf, tunnel.config.read_timeout)
            .await
        {
            Ok(pair) => pair,
            Err(socket::Error::Timeout) => continue,
            Err(err) => {
                tracing::warn!("recv failed: {}", err);
                continue;
            }
        };
        buf.truncate(len);

        if buf.len() < tunnel.config.min_message_size {
            continue;
        }

        tunnel.metrics.rx_packets.inc();
        tunnel.metrics.rx_bytes.add(buf.len());

        let Some(msg_type) = wire::peek_type(&buf) else {
            continue;
        };

        match msg_type {
            wire::MESSAGE_INITIATION_TYPE | wire::MESSAGE_RESPONSE_TYPE => {
                handle_handshake(&tunnel, msg_type, buf, addr).await;
            }
            wire::MESSAGE_COOKIE_REPLY_TYPE => {
                handle_cookie_reply(&tunnel, &buf);
            }
            wire::MESSAGE_TRANSPORT_TYPE => {
                handle_transport(&tunnel, buf);
            }
            other => {
                tracing::debug!("dropping datagram with unknown message type {}", other);
            }
        }
    }
}

async fn handle_handshake(tunnel: &Arc<Tunnel>, msg_type: u32, buf: BytesMut, addr: SocketAddr) {
    if !tunnel.handshake.check_mac1(&buf) {
        tunnel.metrics.mac1_failures.inc();
        return;
    }

    if tunnel.handshake_queue_len() >= tunnel.config.queue_handshake_busy_size {
        if tunnel.handshake.check_mac2(&buf, addr) {
            admit_handshake(tunnel, msg_type, buf, addr).await;
            return;
        }

        tunnel.metrics.mac2_required.inc();
        send_cookie_reply(tunnel, &buf, addr).await;
        return;
    }

    admit_handshake(tunnel, msg_type, buf, addr).await;
}

async fn send_cookie_reply(tunnel: &Arc<Tunnel>, buf: &[u8], addr: SocketAddr) {
    let sender_index = u32::from_le_bytes(buf[wire::OFFSET_RECEIVER..wire::OFFSET_RECEIVER + 4].try_into().unwrap());

    let reply = match tunnel.handshake.create_cookie_reply(buf, sender_index, addr) {
        Ok(reply) => reply,
        Err(err) => {
            tracing::debug!("failed to create cookie reply for {}: {}", addr, err);
            return;
        }
    };

    let encoded = reply.encode();
    if let Err(err) = tunnel.socket.send_to(&encoded, addr).await {
        tracing::warn!("failed to send cookie reply to {}: {}", addr, err);
        return;
    }

    tunnel.metrics.cookie_replies_sent.inc();
}

async fn admit_handshake(tunnel: &Arc<Tunnel>, msg_type: u32, packet: BytesMut, source: SocketAddr) {
    let work = HandshakeWork {
        msg_type,
        packet,
        source,
    };

    if tunnel.handshake_tx.try_send(work).is_err() {
        tunnel.metrics.dropped_handshake_queue.inc();
        tracing::debug!("handshake queue full, dropping datagram from {}", source);
    }
}

fn handle_cookie_reply(tunnel: &Arc<Tunnel>, buf: &[u8]) {
    if buf.len() != wire::MESSAGE_COOKIE_REPLY_SIZE {
        return;
    }

    match CookieReplyPacket::decode(buf) {
        Ok(reply) => tunnel.handshake.consume_cookie_reply(reply),
        Err(err) => tracing::debug!("malformed cookie reply: {}", err),
    }
}

fn handle_transport(tunnel: &Arc<Tunnel>, buf: BytesMut) {
    if buf.len() < wire::MESSAGE_TRANSPORT_SIZE {
        return;
    }

    let header = match TransportHeader::decode(&buf) {
        Ok(header) => header,
        Err(err) => {
            tracing::debug!("malformed transport header: {}", err);
            return;
        }
    };

    let Some((peer, key_pair)) = tunnel.session_index.lookup(header.receiver_index) else {
        return;
    };

    if key_pair.is_expired(Instant::now()) {
        tunnel.metrics.expired_key_rejected.inc();
        return;
    }

    let (work, guard) = InboundWork::new(buf, header.counter, key_pair);
    let locker = guard.locker();

    let evicted = enqueue_drop_oldest(
        &tunnel.decryption_queue,
        DecryptItem {
            work: work.clone(),
            guard,
        },
    );
    tunnel.metrics.dropped_decryption_queue.add(evicted);

    let evicted = enqueue_drop_oldest(&peer.inbound, SequenceItem { work, locker });
    tunnel.metrics.dropped_peer_queue.add(evicted);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{HandshakeCollaborator, HandshakeError};
    use crate::peer::KeyPair;
    use crate::pipeline::test_support;
    use crate::wire::{InitiationPacket, ResponsePacket};
    use std::time::Duration;
    use std::time::Instant;
    use tokio::net::UdpSocket;

    async fn client() -> UdpSocket {
        UdpSocket::bind("127.0.0.1:0").await.unwrap()
    }

    fn transport_packet(receiver_index: u32, counter: u64, tail: &[u8]) -> Vec<u8> {
        let mut packet = vec![0u8; wire::MESSAGE_TRANSPORT_SIZE];
        packet[wire::OFFSET_TYPE..wire::OFFSET_TYPE + 4]
            .copy_from_slice(&wire::MESSAGE_TRANSPORT_TYPE.to_le_bytes());
        packet[wire::OFFSET_RECEIVER..wire::OFFSET_RECEIVER + 4]
            .copy_from_slice(&receiver_index.to_le_bytes());
        packet[wire::OFFSET_COUNTER..wire::OFFSET_COUNTER + 8]
            .copy_from_slice(&counter.to_le_bytes());
        packet.extend_from_slice(tail);
        packet
    }

    #[tokio::test]
    async fn dispatches_transport_packets_to_both_queues() {
        let (tunnel, peer, session_index) = test_support::build_with_session_index().await;
        let key_pair = Arc::new(KeyPair::new([0; 32], [0; 32], Instant::now()));
        session_index.insert(42, peer.clone(), key_pair);

        let addr = tunnel.socket.local_addr().await.unwrap();
        let handle = tokio::spawn(run(tunnel.clone()));

        let sender = client().await;
        let packet = transport_packet(42, 1, &[0u8; 16]);
        sender.send_to(&packet, addr).await.unwrap();

        let item = tokio::time::timeout(Duration::from_secs(1), tunnel.decryption_queue.pop())
            .await
            .expect("decryption queue should receive the dispatched packet");
        assert_eq!(item.work.counter, 1);

        let seq = tokio::time::timeout(Duration::from_secs(1), peer.inbound.pop())
            .await
            .expect("peer queue should receive the dispatched packet");
        assert_eq!(seq.work.counter, 1);

        handle.abort();
    }

    #[tokio::test]
    async fn drops_transport_packets_for_unknown_receiver() {
        let (tunnel, peer, _session_index) = test_support::build_with_session_index().await;

        let addr = tunnel.socket.local_addr().await.unwrap();
        let handle = tokio::spawn(run(tunnel.clone()));

        let sender = client().await;
        let packet = transport_packet(999, 1, &[0u8; 16]);
        sender.send_to(&packet, addr).await.unwrap();

        let popped = tokio::time::timeout(Duration::from_millis(300), peer.inbound.pop()).await;
        assert!(popped.is_err(), "no session should mean no dispatch");

        handle.abort();
    }

    /// A collaborator that always fails MAC1, for exercising the admission
    /// path the all-permissive `NullCollaborator` can't reach.
    struct RejectMac1;

    impl HandshakeCollaborator for RejectMac1 {
        fn check_mac1(&self, _packet: &[u8]) -> bool {
            false
        }

        fn check_mac2(&self, _packet: &[u8], _addr: SocketAddr) -> bool {
            false
        }

        fn create_cookie_reply(
            &self,
            _packet: &[u8],
            _sender_index: u32,
            _addr: SocketAddr,
        ) -> Result<CookieReplyPacket, HandshakeError> {
            unreachable!("mac1 always fails before a cookie reply would be built")
        }

        fn consume_cookie_reply(&self, _reply: CookieReplyPacket) {}

        fn consume_initiation(
            &self,
            _msg: &InitiationPacket,
            _addr: SocketAddr,
        ) -> Result<Arc<crate::peer::Peer>, HandshakeError> {
            unreachable!("never reaches the handshake worker")
        }

        fn consume_response(
            &self,
            _msg: &ResponsePacket,
            _addr: SocketAddr,
        ) -> Result<Arc<crate::peer::Peer>, HandshakeError> {
            unreachable!("never reaches the handshake worker")
        }

        fn new_key_pair(&self, _peer: &Arc<crate::peer::Peer>) -> Arc<KeyPair> {
            unreachable!()
        }

        fn send_keep_alive(&self, _peer: &Arc<crate::peer::Peer>) {}
        fn notify_handshake_completed(&self, _peer: &Arc<crate::peer::Peer>) {}
        fn initiate_rekey(&self, _peer: &Arc<crate::peer::Peer>) {}
    }

    #[tokio::test]
    async fn drops_initiation_on_mac1_failure() {
        let tunnel = test_support::build_with_handshake(Arc::new(RejectMac1), 64).await;
        let addr = tunnel.socket.local_addr().await.unwrap();
        let handle = tokio::spawn(run(tunnel.clone()));

        let sender = client().await;
        let mut packet = vec![0u8; wire::MESSAGE_INITIATION_SIZE];
        packet[wire::OFFSET_TYPE..wire::OFFSET_TYPE + 4]
            .copy_from_slice(&wire::MESSAGE_INITIATION_TYPE.to_le_bytes());
        sender.send_to(&packet, addr).await.unwrap();

        // Give the receiver a moment to process, then confirm it never
        // admitted the packet into the handshake queue.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(tunnel.metrics.mac1_failures.get(), 1);
        assert_eq!(tunnel.handshake_queue_len(), 0);

        handle.abort();
    }

    /// A collaborator that passes MAC1 but always requires MAC2, so the
    /// receiver is forced down the cookie-reply path whenever the handshake
    /// queue is considered busy.
    struct RequireMac2;

    impl HandshakeCollaborator for RequireMac2 {
        fn check_mac1(&self, _packet: &[u8]) -> bool {
            true
        }

        fn check_mac2(&self, _packet: &[u8], _addr: SocketAddr) -> bool {
            false
        }

        fn create_cookie_reply(
            &self,
            _packet: &[u8],
            sender_index: u32,
            _addr: SocketAddr,
        ) -> Result<CookieReplyPacket, HandshakeError> {
            Ok(CookieReplyPacket {
                receiver_index: sender_index,
                nonce: [0; 24],
                encrypted_cookie: [0; 32],
            })
        }

        fn consume_cookie_reply(&self, _reply: CookieReplyPacket) {}

        fn consume_initiation(
            &self,
            _msg: &InitiationPacket,
            _addr: SocketAddr,
        ) -> Result<Arc<crate::peer::Peer>, HandshakeError> {
            unreachable!("never admitted past mac2")
        }

        fn consume_response(
            &self,
            _msg: &ResponsePacket,
            _addr: SocketAddr,
        ) -> Result<Arc<crate::peer::Peer>, HandshakeError> {
            unreachable!("never admitted past mac2")
        }

        fn new_key_pair(&self, _peer: &Arc<crate::peer::Peer>) -> Arc<KeyPair> {
            unreachable!()
        }

        fn send_keep_alive(&self, _peer: &Arc<crate::peer::Peer>) {}
        fn notify_handshake_completed(&self, _peer: &Arc<crate::peer::Peer>) {}
        fn initiate_rekey(&self, _peer: &Arc<crate::peer::Peer>) {}
    }

    #[tokio::test]
    async fn sends_cookie_reply_when_handshake_queue_is_busy() {
        // A busy threshold of 0 means any admitted-MAC1 packet takes the
        // MAC2 branch immediately.
        let tunnel = test_support::build_with_handshake(Arc::new(RequireMac2), 0).await;
        let addr = tunnel.socket.local_addr().await.unwrap();
        let handle = tokio::spawn(run(tunnel.clone()));

        let sender = client().await;
        let mut packet = vec![0u8; wire::MESSAGE_INITIATION_SIZE];
        packet[wire::OFFSET_TYPE..wire::OFFSET_TYPE + 4]
            .copy_from_slice(&wire::MESSAGE_INITIATION_TYPE.to_le_bytes());
        packet[wire::OFFSET_RECEIVER..wire::OFFSET_RECEIVER + 4]
            .copy_from_slice(&7u32.to_le_bytes());
        sender.send_to(&packet, addr).await.unwrap();

        let mut reply_buf = [0u8; wire::MESSAGE_COOKIE_REPLY_SIZE];
        let (len, _) = tokio::time::timeout(Duration::from_secs(1), sender.recv_from(&mut reply_buf))
            .await
            .expect("should receive a cookie reply")
            .unwrap();
        assert_eq!(len, wire::MESSAGE_COOKIE_REPLY_SIZE);

        let reply = CookieReplyPacket::decode(&reply_buf).unwrap();
        assert_eq!(reply.receiver_index, 7);
        assert_eq!(tunnel.metrics.mac2_required.get(), 1);
        assert_eq!(tunnel.metrics.cookie_replies_sent.get(), 1);

        handle.abort();
    }
}

//! Shared fixtures for the end-to-end pipeline scenario tests below. Built
//! entirely from the crate's public API, the same way an external consumer
//! of `wgtun` would wire up a tunnel.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chacha20poly1305::aead::generic_array::GenericArray;
use chacha20poly1305::{AeadInPlace, ChaCha20Poly1305, KeyInit};

use wgtun::collab::NullCollaborator;
use wgtun::config::Tunnel as TunnelConfig;
use wgtun::peer::{KeyPair, Peer, PeerId, SessionTable};
use wgtun::socket::TunnelSocket;
use wgtun::state::Tunnel;
use wgtun::tun::{MemoryTun, TunDevice};
use wgtun::wire;

/// Tunable defaults; individual scenarios override the fields that matter
/// to them via `configure`.
pub fn config(bind: SocketAddr) -> TunnelConfig {
    TunnelConfig {
        bind,
        max_message_size: wire::MAX_MESSAGE_SIZE,
        min_message_size: wire::MIN_MESSAGE_SIZE,
        queue_handshake_busy_size: 64,
        handshake_queue_capacity: 8,
        decryption_queue_capacity: 8,
        peer_queue_capacity: 8,
        tun_queue_capacity: 8,
        decryption_workers: 1,
        handshake_workers: 1,
        read_timeout: Duration::from_millis(100),
    }
}

async fn bind_socket() -> (Arc<TunnelSocket>, SocketAddr) {
    let socket = Arc::new(TunnelSocket::bind("127.0.0.1:0".parse().unwrap()).unwrap());
    let addr = socket.local_addr().await.unwrap();
    (socket, addr)
}

/// Builds a tunnel with one peer (id 0) registered in the session index
/// under `receiver_index` with `key_pair`, a `NullCollaborator`, and an
/// in-memory TUN device.
pub async fn build_with_peer(
    receiver_index: u32,
    key_pair: Arc<KeyPair>,
    configure: impl FnOnce(&mut TunnelConfig),
) -> (Arc<Tunnel>, Arc<Peer>, Arc<MemoryTun>) {
    let (socket, addr) = bind_socket().await;
    let mut cfg = config(addr);
    configure(&mut cfg);

    let session_index = Arc::new(SessionTable::new());
    let peer = Arc::new(Peer::new(PeerId(0), cfg.peer_queue_capacity));
    session_index.insert(receiver_index, peer.clone(), key_pair);

    let handshake = Arc::new(NullCollaborator::new(peer.clone()));
    let (tun, _rx) = MemoryTun::new();
    let tun = Arc::new(tun);
    let tun_dyn: Arc<dyn TunDevice> = tun.clone();

    let tunnel = Tunnel::new(cfg, socket, handshake, session_index, tun_dyn);
    (tunnel, peer, tun)
}

/// Builds a tunnel with a caller-supplied handshake collaborator and no
/// registered peers, for exercising admission control in isolation.
pub async fn build_with_handshake(
    handshake: Arc<dyn wgtun::collab::HandshakeCollaborator>,
    configure: impl FnOnce(&mut TunnelConfig),
) -> Arc<Tunnel> {
    let (socket, addr) = bind_socket().await;
    let mut cfg = config(addr);
    configure(&mut cfg);

    let session_index = Arc::new(SessionTable::new());
    let (tun, _rx) = MemoryTun::new();
    let tun_dyn: Arc<dyn TunDevice> = Arc::new(tun);

    Tunnel::new(cfg, socket, handshake, session_index, tun_dyn)
}

/// Seals `plaintext` the way a real sender would: AEAD-encrypts it under
/// `key`/`counter` and prefixes the fixed transport header.
pub fn sealed_transport_packet(
    key: [u8; 32],
    receiver_index: u32,
    counter: u64,
    plaintext: &[u8],
) -> Vec<u8> {
    let cipher = ChaCha20Poly1305::new(GenericArray::from_slice(&key));
    let nonce = wire::TransportHeader::nonce(counter);
    let mut content = plaintext.to_vec();
    cipher
        .encrypt_in_place(GenericArray::from_slice(&nonce), &[], &mut content)
        .unwrap();

    let mut packet = vec![0u8; wire::MESSAGE_TRANSPORT_SIZE];
    packet[wire::OFFSET_TYPE..wire::OFFSET_TYPE + 4]
        .copy_from_slice(&wire::MESSAGE_TRANSPORT_TYPE.to_le_bytes());
    packet[wire::OFFSET_RECEIVER..wire::OFFSET_RECEIVER + 4]
        .copy_from_slice(&receiver_index.to_le_bytes());
    packet[wire::OFFSET_COUNTER..wire::OFFSET_COUNTER + 8]
        .copy_from_slice(&counter.to_le_bytes());
    packet.extend_from_slice(&content);
    packet
}

/// A bare initiation datagram with only the type tag and sender index
/// set — enough to pass MAC1 under a permissive collaborator without
/// needing real handshake crypto.
pub fn bare_initiation_packet(sender_index: u32) -> Vec<u8> {
    let mut packet = vec![0u8; wire::MESSAGE_INITIATION_SIZE];
    packet[wire::OFFSET_TYPE..wire::OFFSET_TYPE + 4]
        .copy_from_slice(&wire::MESSAGE_INITIATION_TYPE.to_le_bytes());
    packet[wire::OFFSET_RECEIVER..wire::OFFSET_RECEIVER + 4]
        .copy_from_slice(&sender_index.to_le_bytes());
    packet
}

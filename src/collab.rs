//! Collaborator interfaces consumed by the inbound pipeline.
//!
//! The Noise-style handshake cryptography, peer configuration, and the
//! outbound pipeline live elsewhere; this module defines the trait boundary
//! the pipeline calls across, plus a minimal in-memory implementation
//! (`NullCollaborator`) used only to exercise the pipeline's plumbing in
//! tests without real cryptography.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::peer::{KeyPair, Peer};
use crate::wire::{CookieReplyPacket, InitiationPacket, ResponsePacket};

#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    #[error("invalid initiation message")]
    InvalidInitiation,
    #[error("invalid response message")]
    InvalidResponse,
}

/// The handshake state machine, peer table, and cookie/MAC machinery: the
/// pipeline calls well-defined operations on this trait without knowing how
/// they're implemented.
pub trait HandshakeCollaborator: Send + Sync {
    /// `CheckMAC1(packet) -> bool`.
    fn check_mac1(&self, packet: &[u8]) -> bool;

    /// `CheckMAC2(packet, addr) -> bool`.
    fn check_mac2(&self, packet: &[u8], addr: SocketAddr) -> bool;

    /// `CreateMessageCookieReply(packet, sender_id, addr) -> (reply, err)`.
    fn create_cookie_reply(
        &self,
        packet: &[u8],
        sender_index: u32,
        addr: SocketAddr,
    ) -> Result<CookieReplyPacket, HandshakeError>;

    /// `ConsumeMessageCookieReply(reply)`.
    fn consume_cookie_reply(&self, reply: CookieReplyPacket);

    /// `ConsumeMessageInitiation(msg) -> peer_opt`.
    fn consume_initiation(
        &self,
        msg: &InitiationPacket,
        addr: SocketAddr,
    ) -> Result<Arc<Peer>, HandshakeError>;

    /// `ConsumeMessageResponse(msg) -> peer_opt`.
    fn consume_response(
        &self,
        msg: &ResponsePacket,
        addr: SocketAddr,
    ) -> Result<Arc<Peer>, HandshakeError>;

    /// `peer.NewKeyPair()`, invoked once a response completes the handshake.
    fn new_key_pair(&self, peer: &Arc<Peer>) -> Arc<KeyPair>;

    /// `peer.SendKeepAlive()`, so NAT mappings exist before user traffic
    /// flows.
    fn send_keep_alive(&self, peer: &Arc<Peer>);

    /// Fires a level-triggered, coalescing "handshake completed" signal.
    fn notify_handshake_completed(&self, peer: &Arc<Peer>);

    /// Requests a new handshake once a key pair crosses the rekey threshold.
    fn initiate_rekey(&self, peer: &Arc<Peer>);
}

/// A handshake collaborator that performs no cryptography: MAC checks always
/// pass, cookie replies are empty placeholders, and `consume_*` always
/// yields the same preconfigured peer. Exists only so the pipeline stages
/// (receiver, decryption pool, sequencer) can be exercised end-to-end in
/// tests without a real Noise implementation.
pub struct NullCollaborator {
    peer: Arc<Peer>,
}

impl NullCollaborator {
    pub fn new(peer: Arc<Peer>) -> Self {
        Self { peer }
    }
}

impl HandshakeCollaborator for NullCollaborator {
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
    ) -> Result<Arc<Peer>, HandshakeError> {
        Ok(self.peer.clone())
    }

    fn consume_response(
        &self,
        _msg: &ResponsePacket,
        _addr: SocketAddr,
    ) -> Result<Arc<Peer>, HandshakeError> {
        Ok(self.peer.clone())
    }

    fn new_key_pair(&self, _peer: &Arc<Peer>) -> Arc<KeyPair> {
        Arc::new(KeyPair::new([0; 32], [0; 32], std::time::Instant::now()))
    }

    fn send_keep_alive(&self, _peer: &Arc<Peer>) {}

    fn notify_handshake_completed(&self, _peer: &Arc<Peer>) {}

    fn initiate_rekey(&self, _peer: &Arc<Peer>) {}
}

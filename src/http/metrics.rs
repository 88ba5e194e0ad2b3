use std::fmt::Write;

use hyper::{Body, Response};

use crate::state::Tunnel;

pub(super) fn metrics(tunnel: &Tunnel) -> Response<Body> {
    let m = &tunnel.metrics;
    let mut s = String::new();

    writeln!(s, "wgtun_rx_packets_total {}", m.rx_packets).unwrap();
    writeln!(s, "wgtun_rx_bytes_total {}", m.rx_bytes).unwrap();
    writeln!(s, "wgtun_handshake_initiations_total {}", m.handshake_initiations).unwrap();
    writeln!(s, "wgtun_handshake_responses_total {}", m.handshake_responses).unwrap();
    writeln!(s, "wgtun_cookie_replies_sent_total {}", m.cookie_replies_sent).unwrap();
    writeln!(s, "wgtun_mac1_failures_total {}", m.mac1_failures).unwrap();
    writeln!(s, "wgtun_mac2_required_total {}", m.mac2_required).unwrap();
    writeln!(s, "wgtun_decrypt_failures_total {}", m.decrypt_failures).unwrap();
    writeln!(s, "wgtun_replay_rejected_total {}", m.replay_rejected).unwrap();
    writeln!(s, "wgtun_expired_key_rejected_total {}", m.expired_key_rejected).unwrap();
    writeln!(s, "wgtun_dropped_handshake_queue_total {}", m.dropped_handshake_queue).unwrap();
    writeln!(s, "wgtun_dropped_decryption_queue_total {}", m.dropped_decryption_queue).unwrap();
    writeln!(s, "wgtun_dropped_peer_queue_total {}", m.dropped_peer_queue).unwrap();
    writeln!(s, "wgtun_dropped_tun_queue_total {}", m.dropped_tun_queue).unwrap();
    writeln!(s, "wgtun_tun_packets_written_total {}", m.tun_packets_written).unwrap();
    writeln!(s, "wgtun_peers_current {}", m.peers_current).unwrap();
    writeln!(s, "wgtun_decryption_queue_len {}", tunnel.decryption_queue.len()).unwrap();
    writeln!(s, "wgtun_tun_queue_len {}", tunnel.tun_queue.len()).unwrap();
    writeln!(s, "wgtun_handshake_queue_len {}", tunnel.handshake_queue_len()).unwrap();

    Response::builder().status(200).body(Body::from(s)).unwrap()
}

//! End-to-end scenario 1 (happy path): a valid transport packet for a known
//! peer reaches the TUN device as the decrypted plaintext.

mod support;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use wgtun::peer::KeyPair;
use wgtun::pipeline::Pipeline;

#[tokio::test]
async fn happy_path_delivers_plaintext_to_tun() {
    let key = [9u8; 32];
    let key_pair = Arc::new(KeyPair::new(key, [0; 32], Instant::now()));
    let (tunnel, peer, tun) = support::build_with_peer(42, key_pair, |_| {}).await;

    let mut pipeline = Pipeline::spawn(tunnel.clone());
    pipeline.spawn_sequencer(tunnel.clone(), peer.clone());
    let handle = tokio::spawn(async move { pipeline.await });

    let addr = tunnel.socket.local_addr().await.unwrap();
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let ipv4_header = [0x45, 0x00, 0x00, 0x28];
    let packet = support::sealed_transport_packet(key, 42, 7, &ipv4_header);
    client.send_to(&packet, addr).await.unwrap();

    for _ in 0..100 {
        if !tun.written().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(tun.written(), vec![ipv4_header.to_vec()]);
    assert_eq!(tunnel.metrics.tun_packets_written.get(), 1);
    assert_eq!(tunnel.metrics.decrypt_failures.get(), 0);

    handle.abort();
}

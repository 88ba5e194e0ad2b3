use std::sync::Arc;

use clap::Parser;
use tokio::runtime::Builder;

use wgtun::collab::NullCollaborator;
use wgtun::config::Config;
use wgtun::peer::{Peer, PeerId, SessionTable};
use wgtun::pipeline::Pipeline;
use wgtun::socket::TunnelSocket;
use wgtun::state::Tunnel;
use wgtun::tun::MemoryTun;
use wgtun::{http, signal};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[clap(short, long, value_name = "FILE", default_value = "config.toml")]
    config: String,
}

fn main() {
    signal::init();
    pretty_env_logger::init();

    let args = Args::parse();

    let config = match Config::from_file(&args.config) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!("Failed to load config file: {}", err);
            return;
        }
    };

    let rt = Builder::new_multi_thread().enable_all().build().unwrap();

    rt.block_on(async_main(config));
}

async fn async_main(config: Config) {
    let socket = match TunnelSocket::bind(config.tunnel.bind) {
        Ok(socket) => Arc::new(socket),
        Err(err) => {
            tracing::error!("Failed to bind tunnel socket: {}", err);
            return;
        }
    };

    tracing::info!("Tunnel socket bound to {}", config.tunnel.bind);

    // No peer-configuration collaborator is wired up yet (deliberately out
    // of scope), so the session index starts empty and the null handshake
    // collaborator stands in until a real one is installed.
    let session_index = Arc::new(SessionTable::new());
    let peer = Arc::new(Peer::new(PeerId(0), config.tunnel.peer_queue_capacity));
    let handshake = Arc::new(NullCollaborator::new(peer.clone()));
    let (tun, _tun_rx) = MemoryTun::new();
    let tun = Arc::new(tun);

    let tunnel = Tunnel::new(config.tunnel, socket, handshake, session_index, tun);

    let mut pipeline = Pipeline::spawn(tunnel.clone());
    pipeline.spawn_sequencer(tunnel.clone(), peer);

    if config.http.enabled {
        let bind = config.http.bind;
        let tunnel = tunnel.clone();
        tokio::task::spawn(async move {
            http::serve(bind, tunnel).await;
        });
    }

    tokio::task::spawn(async move {
        pipeline.await;
    });

    // Wait for a shutdown signal (SIGINT|SIGTERM), then gracefully shut down.
    // See `signal` module for more details.
    signal::SHUTDOWN.wait().await;
    println!("Bye");
}

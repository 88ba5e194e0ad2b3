mod metrics;

use std::net::SocketAddr;
use std::sync::Arc;

use hyper::service::service_fn;
use hyper::{server::conn::Http, Response};
use hyper::{Body, Request};
use tokio::net::TcpListener;

use crate::state::Tunnel;

pub async fn serve(bind: SocketAddr, tunnel: Arc<Tunnel>) {
    let socket = match TcpListener::bind(bind).await {
        Ok(socket) => socket,
        Err(err) => {
            tracing::error!("failed to bind HTTP listener on {}: {}", bind, err);
            return;
        }
    };

    tracing::info!("HTTP metrics listening on {}", bind);

    loop {
        let (stream, _) = match socket.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                tracing::warn!("HTTP accept failed: {}", err);
                continue;
            }
        };

        let tunnel = tunnel.clone();
        tokio::task::spawn(async move {
            let service = service_fn(move |req: Request<Body>| {
                let tunnel = tunnel.clone();
                async move {
                    let resp = match req.uri().path() {
                        "/metrics" => metrics::metrics(&tunnel),
                        _ => Response::builder()
                            .status(404)
                            .body(Body::from("Not Found"))
                            .unwrap(),
                    };

                    Ok::<_, hyper::Error>(resp)
                }
            });

            if let Err(err) = Http::new().serve_connection(stream, service).await {
                tracing::debug!("HTTP connection error: {}", err);
            }
        });
    }
}

//! Wires the five pipeline stages together and drives them to completion.
//!
//! Each stage is a long-lived task; `Pipeline` owns their `JoinHandle`s the
//! way a worker pool owns its workers, and its `Future` implementation
//! resolves once every stage has exited (on shutdown, or on an
//! unrecoverable error from one of them).

mod decrypt;
mod handshake;
mod receiver;
mod sequencer;
mod tun_writer;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::peer::Peer;
use crate::state::Tunnel;

/// Spawns and owns every pipeline task for one `Tunnel`.
pub struct Pipeline {
    tasks: FuturesUnordered<Task>,
}

impl Pipeline {
    pub fn spawn(tunnel: Arc<Tunnel>) -> Self {
        let tasks = FuturesUnordered::new();

        tasks.push(Task::new("receiver", receiver::run(tunnel.clone())));

        for id in 0..tunnel.config.handshake_workers {
            tasks.push(Task::new(
                format!("handshake-{id}"),
                handshake::run(tunnel.clone()),
            ));
        }

        for id in 0..tunnel.config.decryption_workers {
            tasks.push(Task::new(
                format!("decrypt-{id}"),
                decrypt::run(tunnel.clone()),
            ));
        }

        tasks.push(Task::new("tun-writer", tun_writer::run(tunnel.clone())));

        tracing::info!(
            handshake_workers = tunnel.config.handshake_workers,
            decryption_workers = tunnel.config.decryption_workers,
            "spawned inbound pipeline"
        );

        Self { tasks }
    }

    /// Spawns the per-peer sequencer for `peer`. Callers add peers to the
    /// session index and spawn their sequencer together so no transport
    /// packet can be routed to a peer with no sequencer draining it.
    pub fn spawn_sequencer(&mut self, tunnel: Arc<Tunnel>, peer: Arc<Peer>) {
        let label = format!("sequencer-{}", peer.id.0);
        self.tasks.push(Task::new(label, sequencer::run(tunnel, peer)));
    }
}

impl Future for Pipeline {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        loop {
            match self.tasks.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) => return Poll::Ready(()),
                Poll::Ready(Some(())) => (),
            }
        }
    }
}

/// A named, spawned stage task. Panics inside the task surface as a logged
/// error rather than tearing down the whole pipeline.
struct Task {
    label: String,
    handle: JoinHandle<()>,
}

impl Task {
    fn new<F>(label: impl Into<String>, fut: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let label = label.into();
        let span = tracing::info_span!("pipeline_task", task = %label);
        let handle = tokio::task::spawn(fut.instrument(span));

        Self { label, handle }
    }
}

impl Future for Task {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.handle.poll_unpin(cx) {
            Poll::Ready(Ok(())) => Poll::Ready(()),
            Poll::Ready(Err(err)) => {
                tracing::error!(task = %self.label, "pipeline task panicked: {}", err);
                Poll::Ready(())
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

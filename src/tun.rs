//! The TUN device interface consumed by the inbound pipeline.
//!
//! The platform TUN driver lives elsewhere; the pipeline only needs a
//! blocking, write-only sink.

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// A write-only sink exposing a single `write(packet_bytes) -> result`
/// operation, owned exclusively by the TUN writer stage.
pub trait TunDevice: Send + Sync {
    fn write(&self, packet: &[u8]) -> io::Result<()>;
}

/// An in-memory [`TunDevice`] used by tests: every written packet is pushed
/// onto a channel the test can drain, standing in for the real platform
/// driver.
pub struct MemoryTun {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    written: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl MemoryTun {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                written: Arc::new(Mutex::new(Vec::new())),
            },
            rx,
        )
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.written.lock().clone()
    }
}

impl TunDevice for MemoryTun {
    fn write(&self, packet: &[u8]) -> io::Result<()> {
        self.written.lock().push(packet.to_vec());
        let _ = self.tx.send(packet.to_vec());
        Ok(())
    }
}

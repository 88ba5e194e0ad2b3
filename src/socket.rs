//! UDP socket wrapper shared between the Receiver (sole reader) and any
//! writer (cookie replies here, the outbound pipeline elsewhere).
//!
//! Writers take a read-lock over the socket handle so that a future rebind
//! (which takes the write-lock and swaps the handle) never races a
//! concurrent send or receive.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("recv timed out")]
    Timeout,
}

/// A rebindable UDP socket. Reads are exclusive to the Receiver task; writes
/// (from any task) and rebinds both take locks so they never observe a torn
/// socket handle.
#[derive(Debug)]
pub struct TunnelSocket {
    inner: RwLock<UdpSocket>,
}

impl TunnelSocket {
    pub fn bind(addr: SocketAddr) -> Result<Self, Error> {
        let socket = new_socket(addr)?;

        Ok(Self {
            inner: RwLock::new(socket),
        })
    }

    /// Reads one datagram with a bounded deadline so callers can observe a
    /// shutdown signal promptly instead of blocking forever on an idle
    /// socket.
    pub async fn recv_from(
        &self,
        buf: &mut [u8],
        deadline: Duration,
    ) -> Result<(usize, SocketAddr), Error> {
        let guard = self.inner.read().await;
        match tokio::time::timeout(deadline, guard.recv_from(buf)).await {
            Ok(res) => Ok(res?),
            Err(_) => Err(Error::Timeout),
        }
    }

    pub async fn send_to(&self, buf: &[u8], addr: SocketAddr) -> Result<usize, Error> {
        let guard = self.inner.read().await;
        Ok(guard.send_to(buf, addr).await?)
    }

    /// Replaces the bound socket with a freshly bound one. Takes the write
    /// lock so no concurrent read/write observes a torn handle.
    pub async fn rebind(&self, addr: SocketAddr) -> Result<(), Error> {
        let socket = new_socket(addr)?;
        let mut guard = self.inner.write().await;
        *guard = socket;
        Ok(())
    }

    pub async fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.inner.read().await.local_addr()?)
    }
}

fn new_socket(addr: SocketAddr) -> Result<UdpSocket, Error> {
    let domain = match addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;

    let socket = UdpSocket::from_std(socket.into())?;
    Ok(socket)
}

//! Datagram transport between the resolver and its DNS server.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

/// Largest datagram accepted from the server (no EDNS)
pub const MAX_DATAGRAM: usize = 512;

/// Datagrams buffered between the receive task and the resolver
const INBOUND_QUEUE: usize = 32;

/// Outbound half of a server association.
///
/// Inbound datagrams arrive separately on the receiver handed out when the
/// transport is created, so the resolver can poll them without holding the
/// transport across an await.
pub trait Transport: Send + Sync {
    /// Send one datagram to the associated server
    fn send(&self, datagram: &[u8]) -> impl Future<Output = io::Result<()>> + Send;

    /// Address of the associated server
    fn peer(&self) -> SocketAddr;
}

/// UDP association with a single DNS server
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    recv_task: JoinHandle<()>,
}

impl UdpTransport {
    /// Bind an ephemeral local port, associate it with `server` and start
    /// forwarding received datagrams into the returned channel.
    pub async fn connect(server: SocketAddr) -> io::Result<(Self, mpsc::Receiver<Vec<u8>>)> {
        // Bind to appropriate address family based on server (IPv4 or IPv6)
        let bind_addr = if server.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };

        let socket = UdpSocket::bind(bind_addr).await?;
        // A connected socket only receives from the server it talks to
        socket.connect(server).await?;
        let socket = Arc::new(socket);

        let (tx, rx) = mpsc::channel(INBOUND_QUEUE);
        let recv_task = tokio::spawn(recv_loop(Arc::clone(&socket), tx));

        Ok((
            UdpTransport {
                socket,
                peer: server,
                recv_task,
            },
            rx,
        ))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

async fn recv_loop(socket: Arc<UdpSocket>, tx: mpsc::Sender<Vec<u8>>) {
    loop {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        match socket.recv(&mut buf).await {
            Ok(len) => {
                buf.truncate(len);
                trace!(bytes = len, "DNS datagram received");
                if tx.send(buf).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                // ICMP port unreachable surfaces here as ConnectionRefused
                warn!(error = %e, "DNS receive error");
                if tx.is_closed() {
                    break;
                }
            }
        }
    }
}

impl Transport for UdpTransport {
    async fn send(&self, datagram: &[u8]) -> io::Result<()> {
        let sent = self.socket.send(datagram).await?;
        if sent != datagram.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "DNS datagram truncated on send",
            ));
        }
        Ok(())
    }

    fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.recv_task.abort();
    }
}

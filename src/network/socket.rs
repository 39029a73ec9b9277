//! Raw socket management and operations

use crate::ScanError;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;

/// Raw TCP socket. The kernel supplies the IP header on send and hands back
/// whole IPv4 datagrams on receive.
pub struct RawSocket {
    socket: Socket,
}

impl RawSocket {
    /// Create a new raw TCP socket in blocking mode
    pub fn new_tcp() -> crate::Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::from(libc::SOCK_RAW), Some(Protocol::TCP))
            .map_err(|e| {
                if e.kind() == io::ErrorKind::PermissionDenied {
                    ScanError::PermissionError("Permission denied for raw socket".to_string())
                } else {
                    ScanError::RawSocketError(e.to_string())
                }
            })?;

        Ok(Self { socket })
    }

    /// Send a raw segment to the specified destination
    pub fn send_to(&self, segment: &[u8], dest: Ipv4Addr) -> crate::Result<usize> {
        // port is ignored for raw sockets
        let dest = SocketAddr::new(IpAddr::V4(dest), 0);
        let bytes_sent = self
            .socket
            .send_to(segment, &dest.into())
            .map_err(|e| ScanError::NetworkError(e.to_string()))?;
        Ok(bytes_sent)
    }

    /// Receive one datagram. An expired read timeout surfaces as
    /// [`ScanError::TimeoutError`].
    pub fn recv_from(&self, buf: &mut [u8]) -> crate::Result<(usize, SocketAddr)> {
        use std::mem::MaybeUninit;

        let mut uninit_buf: Vec<MaybeUninit<u8>> = vec![MaybeUninit::uninit(); buf.len()];

        match self.socket.recv_from(&mut uninit_buf) {
            Ok((size, addr)) => {
                let socket_addr = addr.as_socket().ok_or_else(|| {
                    ScanError::NetworkError("Invalid socket address received".to_string())
                })?;

                if size > buf.len() {
                    return Err(ScanError::NetworkError(
                        "Received size exceeds buffer length".to_string(),
                    ));
                }

                for (dst, src) in buf.iter_mut().zip(&uninit_buf[..size]) {
                    // SAFETY: the kernel initialised the first `size` bytes
                    *dst = unsafe { src.assume_init() };
                }

                Ok((size, socket_addr))
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Err(ScanError::TimeoutError)
            }
            Err(e) => Err(ScanError::NetworkError(format!("Socket receive error: {}", e))),
        }
    }

    /// Set receive timeout. Zero is clamped to one millisecond since a zero
    /// timeval means "block forever".
    pub fn set_read_timeout(&self, timeout: Duration) -> crate::Result<()> {
        let timeout = timeout.max(Duration::from_millis(1));
        self.socket
            .set_read_timeout(Some(timeout))
            .map_err(|e| ScanError::NetworkError(e.to_string()))
    }
}

/// Local address the kernel would pick to reach `target`.
///
/// Connecting a UDP socket only consults the routing table; nothing is sent.
pub fn local_source_ip(target: Ipv4Addr) -> crate::Result<Ipv4Addr> {
    let socket =
        UdpSocket::bind("0.0.0.0:0").map_err(|e| ScanError::NetworkError(e.to_string()))?;
    socket
        .connect((target, 53))
        .map_err(|e| ScanError::NetworkError(e.to_string()))?;

    let local_addr = socket
        .local_addr()
        .map_err(|e| ScanError::NetworkError(e.to_string()))?;

    match local_addr.ip() {
        IpAddr::V4(ipv4) => Ok(ipv4),
        IpAddr::V6(_) => Err(ScanError::InvalidTarget("IPv6 not supported".to_string())),
    }
}

/// Generate a random source port
pub fn random_source_port() -> u16 {
    use rand::Rng;
    rand::thread_rng().gen_range(32768..65535)
}

/// Raw sockets need root; checked once before any probe is sent
pub fn ensure_privileged() -> crate::Result<()> {
    // SAFETY: geteuid has no preconditions and cannot fail
    let euid = unsafe { libc::geteuid() };
    if euid == 0 {
        Ok(())
    } else {
        Err(ScanError::PermissionError(
            "raw TCP probes require root privileges".to_string(),
        ))
    }
}

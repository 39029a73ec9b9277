//! Probe transport: one segment out, one correlated reply back.
//!
//! Each exchange runs two units side by side. The receiver opens its raw
//! socket on a blocking thread and signals readiness over a oneshot channel;
//! the sender waits for that signal, sleeps for the configured delay and
//! transmits. The exchange returns only after both units finish, so sockets
//! never outlive a probe.

use crate::config::FingerprintConfig;
use crate::network::packet::{PacketParser, ProbeReply, TcpPacketBuilder};
use crate::network::socket::{self, RawSocket};
use crate::network::ProbeKind;
use crate::ScanError;
use async_trait::async_trait;
use log::{debug, trace};
use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Something that can send a probe and capture the reply.
///
/// `Ok(None)` is a timeout: the target stayed silent within the window.
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    async fn exchange(&self, probe: ProbeKind) -> crate::Result<Option<ProbeReply>>;
}

/// Transport backed by raw TCP sockets
#[derive(Debug, Clone)]
pub struct RawProbeTransport {
    target: Ipv4Addr,
    port: u16,
    source_ip: Ipv4Addr,
    source_port: Option<u16>,
    timeout: Duration,
    send_delay: Duration,
}

impl RawProbeTransport {
    /// Resolve the local source address toward `target` and build the transport
    pub fn new(target: Ipv4Addr, port: u16, timeout: Duration, send_delay: Duration) -> crate::Result<Self> {
        let source_ip = socket::local_source_ip(target)?;
        debug!("Using source address {} to reach {}", source_ip, target);
        Ok(Self {
            target,
            port,
            source_ip,
            source_port: None,
            timeout,
            send_delay,
        })
    }

    pub fn from_config(config: &FingerprintConfig) -> crate::Result<Self> {
        let target = config.target_ip()?;
        let transport = Self::new(
            target,
            config.port,
            config.probe_timeout(),
            config.send_delay(),
        )?;
        Ok(match config.source_port {
            Some(port) => transport.with_source_port(port),
            None => transport,
        })
    }

    pub fn with_source_port(mut self, port: u16) -> Self {
        self.source_port = Some(port);
        self
    }

    pub fn source_ip(&self) -> Ipv4Addr {
        self.source_ip
    }

    fn build_segment(&self, probe: ProbeKind) -> Vec<u8> {
        let source_port = self.source_port.unwrap_or_else(socket::random_source_port);
        TcpPacketBuilder::new(self.source_ip, self.target, source_port, self.port)
            .flags(probe.tcp_flags())
            .with_probe_options()
            .build()
    }
}

#[async_trait]
impl ProbeTransport for RawProbeTransport {
    async fn exchange(&self, probe: ProbeKind) -> crate::Result<Option<ProbeReply>> {
        let (ready_tx, ready_rx) = oneshot::channel();
        let target = self.target;
        let timeout = self.timeout;

        let receiver = tokio::task::spawn_blocking(move || receive_reply(target, timeout, ready_tx));

        let segment = self.build_segment(probe);
        let send_delay = self.send_delay;
        let sender = async move {
            // receiver dropped the channel: its socket never opened
            if ready_rx.await.is_err() {
                return Ok(0);
            }
            tokio::time::sleep(send_delay).await;
            let raw = RawSocket::new_tcp()?;
            let sent = raw.send_to(&segment, target)?;
            debug!("Sent {} probe to {} ({} bytes)", probe, target, sent);
            Ok::<usize, ScanError>(sent)
        };

        let (received, sent) = tokio::join!(receiver, sender);
        let received = received
            .map_err(|e| ScanError::NetworkError(format!("receiver task failed: {}", e)))?;

        sent?;
        received
    }
}

/// Blocking receive loop: datagrams from any other source are dropped, the
/// first parseable TCP segment from `target` wins, and the window is bounded
/// by one overall deadline.
fn receive_reply(
    target: Ipv4Addr,
    timeout: Duration,
    ready: oneshot::Sender<()>,
) -> crate::Result<Option<ProbeReply>> {
    let socket = RawSocket::new_tcp()?;
    let deadline = Instant::now() + timeout;
    socket.set_read_timeout(timeout)?;
    let _ = ready.send(());

    let mut buf = [0u8; 4096];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Ok(None);
        }
        socket.set_read_timeout(remaining)?;

        match socket.recv_from(&mut buf) {
            Ok((size, addr)) => {
                if addr.ip() != IpAddr::V4(target) {
                    trace!("Discarding datagram from {}", addr.ip());
                    continue;
                }
                match PacketParser::parse_tcp_reply(&buf[..size]) {
                    Some(reply) if reply.source_ip == target => return Ok(Some(reply)),
                    _ => continue,
                }
            }
            Err(ScanError::TimeoutError) => return Ok(None),
            Err(e) => return Err(e),
        }
    }
}

//! Probe segment crafting, checksumming and reply parsing

use crate::network::options::{self, DecodedOptions};
use crate::network::TcpFlagSet;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{Ipv4Flags, Ipv4Packet};
use pnet::packet::tcp::{MutableTcpPacket, TcpFlags, TcpPacket};
use rand::Rng;
use std::net::Ipv4Addr;

pub const TCP_HEADER_LEN: usize = 20;

/// Placeholder TSval carried in every SYN probe
pub const PROBE_TIMESTAMP: u32 = 0xFFFF_FFFF;

/// MSS=1460, SACK permitted, timestamp, NOP, window scale 10
pub fn syn_options_block() -> Vec<u8> {
    let mut block = Vec::with_capacity(20);
    block.extend_from_slice(&[0x02, 0x04]);
    block.extend_from_slice(&1460u16.to_be_bytes());
    block.extend_from_slice(&[0x04, 0x02]);
    block.extend_from_slice(&[0x08, 0x0a]);
    block.extend_from_slice(&PROBE_TIMESTAMP.to_be_bytes());
    block.extend_from_slice(&0u32.to_be_bytes());
    block.push(0x01);
    block.extend_from_slice(&[0x03, 0x03, 0x0a]);
    pad_to_word(&mut block);
    block
}

fn pad_to_word(block: &mut Vec<u8>) {
    while block.len() % 4 != 0 {
        block.push(0x00);
    }
}

/// RFC 1071 internet checksum: one's-complement sum of 16-bit big-endian
/// words with end-around carry, complemented. An odd trailing byte is padded
/// with zero.
pub fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for chunk in &mut chunks {
        sum += u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
    }
    if let [last] = chunks.remainder() {
        sum += (*last as u32) << 8;
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Checksum of a TCP segment over the IPv4 pseudo-header plus the segment.
///
/// The checksum field inside `segment` must be zero unless the caller is
/// verifying an already-filled segment, in which case the result is zero.
pub fn tcp_checksum(source: Ipv4Addr, destination: Ipv4Addr, segment: &[u8]) -> u16 {
    let mut pseudo = Vec::with_capacity(12 + segment.len());
    pseudo.extend_from_slice(&source.octets());
    pseudo.extend_from_slice(&destination.octets());
    pseudo.push(0);
    pseudo.push(IpNextHeaderProtocols::Tcp.0);
    pseudo.extend_from_slice(&(segment.len() as u16).to_be_bytes());
    pseudo.extend_from_slice(segment);
    internet_checksum(&pseudo)
}

/// TCP segment builder for crafting probe segments.
///
/// Produces the TCP header only; the kernel prepends the IP header on a raw
/// `IPPROTO_TCP` socket.
pub struct TcpPacketBuilder {
    source_ip: Ipv4Addr,
    dest_ip: Ipv4Addr,
    source_port: u16,
    dest_port: u16,
    flags: u8,
    seq_num: u32,
    window_size: u16,
    options: Vec<u8>,
}

impl TcpPacketBuilder {
    pub fn new(source_ip: Ipv4Addr, dest_ip: Ipv4Addr, source_port: u16, dest_port: u16) -> Self {
        Self {
            source_ip,
            dest_ip,
            source_port,
            dest_port,
            flags: 0,
            seq_num: rand::thread_rng().gen(),
            window_size: 5840,
            options: Vec::new(),
        }
    }

    pub fn flags(mut self, flags: u8) -> Self {
        self.flags = flags;
        self
    }

    pub fn syn(mut self) -> Self {
        self.flags |= TcpFlags::SYN as u8;
        self
    }

    pub fn ack(mut self) -> Self {
        self.flags |= TcpFlags::ACK as u8;
        self
    }

    pub fn fin(mut self) -> Self {
        self.flags |= TcpFlags::FIN as u8;
        self
    }

    pub fn rst(mut self) -> Self {
        self.flags |= TcpFlags::RST as u8;
        self
    }

    pub fn psh(mut self) -> Self {
        self.flags |= TcpFlags::PSH as u8;
        self
    }

    pub fn urg(mut self) -> Self {
        self.flags |= TcpFlags::URG as u8;
        self
    }

    pub fn seq_num(mut self, seq_num: u32) -> Self {
        self.seq_num = seq_num;
        self
    }

    pub fn window_size(mut self, window_size: u16) -> Self {
        self.window_size = window_size;
        self
    }

    /// Raw option bytes, padded to a 4-byte boundary when built
    pub fn options(mut self, options: Vec<u8>) -> Self {
        self.options = options;
        self
    }

    /// Attach the standard SYN options block when the flags include SYN
    pub fn with_probe_options(self) -> Self {
        if self.flags & TcpFlags::SYN as u8 != 0 {
            self.options(syn_options_block())
        } else {
            self
        }
    }

    /// Build the TCP segment with its checksum filled in
    pub fn build(self) -> Vec<u8> {
        let mut options = self.options;
        pad_to_word(&mut options);
        let segment_len = TCP_HEADER_LEN + options.len();
        let mut segment = vec![0u8; segment_len];

        if let Some(mut tcp_packet) = MutableTcpPacket::new(&mut segment) {
            tcp_packet.set_source(self.source_port);
            tcp_packet.set_destination(self.dest_port);
            tcp_packet.set_sequence(self.seq_num);
            tcp_packet.set_acknowledgement(0);
            tcp_packet.set_data_offset((segment_len / 4) as u8);
            tcp_packet.set_flags(self.flags as u16);
            tcp_packet.set_window(self.window_size);
            tcp_packet.set_urgent_ptr(0);
            tcp_packet.set_checksum(0);
        }
        segment[TCP_HEADER_LEN..].copy_from_slice(&options);

        let checksum = tcp_checksum(self.source_ip, self.dest_ip, &segment);
        segment[16..18].copy_from_slice(&checksum.to_be_bytes());
        segment
    }
}

/// Reply captured for one probe: the IP fields and TCP header of the first
/// segment seen from the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReply {
    pub source_ip: Ipv4Addr,
    pub dest_ip: Ipv4Addr,
    pub source_port: u16,
    pub dest_port: u16,
    pub ttl: u8,
    pub dont_fragment: bool,
    pub window: u16,
    pub flags: TcpFlagSet,
    /// Option bytes following the fixed TCP header
    pub options: Vec<u8>,
}

impl ProbeReply {
    pub fn decode_options(&self) -> DecodedOptions {
        options::decode(&self.options)
    }
}

/// Packet parser for analyzing received packets
pub struct PacketParser;

impl PacketParser {
    /// Parse an IPv4 datagram carrying TCP, as delivered by a raw TCP socket
    pub fn parse_tcp_reply(packet: &[u8]) -> Option<ProbeReply> {
        let ip_packet = Ipv4Packet::new(packet)?;
        if ip_packet.get_version() != 4
            || ip_packet.get_next_level_protocol() != IpNextHeaderProtocols::Tcp
        {
            return None;
        }

        let ip_header_len = (ip_packet.get_header_length() as usize) * 4;
        if ip_header_len < 20 || packet.len() < ip_header_len + TCP_HEADER_LEN {
            return None;
        }
        let tcp_bytes = &packet[ip_header_len..];
        let tcp_packet = TcpPacket::new(tcp_bytes)?;

        let data_offset = (tcp_packet.get_data_offset() as usize) * 4;
        let options_end = data_offset.clamp(TCP_HEADER_LEN, tcp_bytes.len());
        let options = tcp_bytes[TCP_HEADER_LEN..options_end].to_vec();

        Some(ProbeReply {
            source_ip: ip_packet.get_source(),
            dest_ip: ip_packet.get_destination(),
            source_port: tcp_packet.get_source(),
            dest_port: tcp_packet.get_destination(),
            ttl: ip_packet.get_ttl(),
            dont_fragment: ip_packet.get_flags() & Ipv4Flags::DontFragment != 0,
            window: tcp_packet.get_window(),
            flags: TcpFlagSet(tcp_packet.get_flags() as u8),
            options,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet::packet::ipv4::MutableIpv4Packet;

    const SRC: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 10);
    const DST: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 20);

    fn wrap_in_ipv4(segment: &[u8], source: Ipv4Addr, ttl: u8, df: bool) -> Vec<u8> {
        let mut buf = vec![0u8; 20 + segment.len()];
        {
            let mut ip = MutableIpv4Packet::new(&mut buf).unwrap();
            ip.set_version(4);
            ip.set_header_length(5);
            ip.set_total_length((20 + segment.len()) as u16);
            ip.set_ttl(ttl);
            ip.set_flags(if df { Ipv4Flags::DontFragment } else { 0 });
            ip.set_next_level_protocol(IpNextHeaderProtocols::Tcp);
            ip.set_source(source);
            ip.set_destination(SRC);
        }
        buf[20..].copy_from_slice(segment);
        buf
    }

    #[test]
    fn test_checksum_known_vector() {
        // RFC 1071 section 3 example
        let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
        assert_eq!(internet_checksum(&data), !0xddf2);
    }

    #[test]
    fn test_checksum_odd_length_pads_low_byte() {
        assert_eq!(internet_checksum(&[0xab]), !0xab00);
    }

    #[test]
    fn test_syn_segment_layout() {
        let segment = TcpPacketBuilder::new(SRC, DST, 40000, 80)
            .syn()
            .with_probe_options()
            .seq_num(7)
            .build();
        assert_eq!(segment.len(), 40);

        let tcp = TcpPacket::new(&segment).unwrap();
        assert_eq!(tcp.get_data_offset(), 10);
        assert_eq!(tcp.get_flags() as u8, TcpFlags::SYN as u8);
        assert_eq!(tcp.get_sequence(), 7);

        let decoded = options::decode(&segment[TCP_HEADER_LEN..]);
        assert_eq!(decoded.opts.pattern_string(), "MSTNW");
        assert_eq!(decoded.opts.mss, Some(1460));
        assert_eq!(decoded.opts.window_scale, Some(10));
    }

    #[test]
    fn test_non_syn_probe_has_no_options() {
        let segment = TcpPacketBuilder::new(SRC, DST, 40000, 80)
            .fin()
            .psh()
            .urg()
            .with_probe_options()
            .build();
        assert_eq!(segment.len(), TCP_HEADER_LEN);
        assert_eq!(TcpPacket::new(&segment).unwrap().get_data_offset(), 5);
    }

    #[test]
    fn test_built_segment_verifies() {
        let segment = TcpPacketBuilder::new(SRC, DST, 40000, 443)
            .syn()
            .with_probe_options()
            .build();
        assert_eq!(tcp_checksum(SRC, DST, &segment), 0);
    }

    #[test]
    fn test_checksum_matches_pnet() {
        let segment = TcpPacketBuilder::new(SRC, DST, 51000, 22)
            .syn()
            .with_probe_options()
            .build();
        let tcp = TcpPacket::new(&segment).unwrap();
        assert_eq!(
            tcp.get_checksum(),
            pnet::packet::tcp::ipv4_checksum(&tcp, &SRC, &DST)
        );
    }

    #[test]
    fn test_parse_reply_fields() {
        let segment = TcpPacketBuilder::new(DST, SRC, 80, 40000)
            .syn()
            .ack()
            .window_size(29200)
            .options(vec![0x02, 0x04, 0x05, 0xb4, 0x01, 0x03, 0x03, 0x07])
            .build();
        let datagram = wrap_in_ipv4(&segment, DST, 63, true);

        let reply = PacketParser::parse_tcp_reply(&datagram).unwrap();
        assert_eq!(reply.source_ip, DST);
        assert_eq!(reply.ttl, 63);
        assert!(reply.dont_fragment);
        assert_eq!(reply.window, 29200);
        assert!(reply.flags.is_syn_ack());
        assert_eq!(reply.decode_options().opts.pattern_string(), "MNW");
    }

    #[test]
    fn test_parse_rejects_short_datagram() {
        assert!(PacketParser::parse_tcp_reply(&[0x45, 0x00, 0x00]).is_none());
        let segment = TcpPacketBuilder::new(DST, SRC, 80, 40000).rst().build();
        let datagram = wrap_in_ipv4(&segment, DST, 64, false);
        assert!(PacketParser::parse_tcp_reply(&datagram[..30]).is_none());
    }
}

//! Raw frame decoding into [`PacketRecord`]s.
//!
//! Link, network and TCP/UDP/ICMP layers come from `etherparse`. The
//! telecom application layers (SIP, RTP/RTCP, Diameter) and SCTP, which
//! `etherparse` leaves as an opaque IP payload, are recognized here with
//! small header parsers.
//!
//! Frames `etherparse` cannot slice become records carrying only a `RAW`
//! layer: they still count toward totals and sizes.

use std::net::IpAddr;
use std::path::Path;

use anyhow::Result;
use etherparse::{EtherType, LinkSlice, NetSlice, SlicedPacket, TransportSlice};

use telecom_harness_core::capture::{
    DiameterInfo, DnsInfo, PacketRecord, RtpInfo, SctpInfo, SipInfo, TcpFlags, TransportInfo,
    TransportProtocol,
};

const IP_PROTO_SCTP: u8 = 132;
const DNS_PORT: u16 = 53;
const DIAMETER_PORT: u16 = 3868;
const DIAMETER_PPID: u32 = 46;
const AVP_SESSION_ID: u32 = 263;
const SCTP_COMMON_HEADER: usize = 12;
const SCTP_CHUNK_DATA: u8 = 0;

const SIP_METHODS: &[&str] = &[
    "INVITE", "ACK", "BYE", "CANCEL", "REGISTER", "OPTIONS", "PRACK", "SUBSCRIBE", "NOTIFY",
    "PUBLISH", "INFO", "REFER", "MESSAGE", "UPDATE",
];

const HTTP_PREFIXES: &[&[u8]] = &[
    b"GET ", b"POST ", b"PUT ", b"DELETE ", b"HEAD ", b"OPTIONS ", b"PATCH ", b"HTTP/1.",
];

/// Decode one Ethernet frame captured at `timestamp` whose on-wire length
/// was `wire_len`.
pub fn decode_frame(raw: &[u8], timestamp: f64, wire_len: u32) -> PacketRecord {
    let mut record = PacketRecord::new(timestamp, wire_len);

    let sliced = match SlicedPacket::from_ethernet(raw) {
        Ok(sliced) => sliced,
        Err(e) => {
            tracing::trace!(error = %e, "Undecodable frame");
            record.add_layer("RAW");
            return record;
        }
    };

    if let Some(LinkSlice::Ethernet2(eth)) = &sliced.link {
        record.add_layer("Ether");
        if eth.ether_type() == EtherType::ARP {
            record.add_layer("ARP");
        }
    }

    let mut ip_payload: Option<(u8, &[u8])> = None;
    match &sliced.net {
        Some(NetSlice::Ipv4(ipv4)) => {
            let header = ipv4.header();
            record = record
                .with_ip(
                    IpAddr::from(header.source_addr()),
                    IpAddr::from(header.destination_addr()),
                )
                .with_fragment(header.more_fragments(), header.fragments_offset().value());
            ip_payload = Some((header.protocol().0, ipv4.payload().payload));
        }
        Some(NetSlice::Ipv6(ipv6)) => {
            let header = ipv6.header();
            record = record.with_ip(
                IpAddr::from(header.source_addr()),
                IpAddr::from(header.destination_addr()),
            );
            let payload = ipv6.payload();
            ip_payload = Some((payload.ip_number.0, payload.payload));
        }
        _ => {}
    }

    match &sliced.transport {
        Some(TransportSlice::Tcp(tcp)) => {
            let flags = TcpFlags {
                syn: tcp.syn(),
                ack: tcp.ack(),
                fin: tcp.fin(),
                rst: tcp.rst(),
            };
            let (sp, dp) = (tcp.source_port(), tcp.destination_port());
            record = record.with_tcp(sp, dp, flags);
            recognize_tcp_payload(&mut record, sp, dp, tcp.payload());
        }
        Some(TransportSlice::Udp(udp)) => {
            let (sp, dp) = (udp.source_port(), udp.destination_port());
            record = record.with_udp(sp, dp);
            recognize_udp_payload(&mut record, sp, dp, udp.payload());
        }
        Some(TransportSlice::Icmpv4(_)) => record.add_layer("ICMP"),
        Some(TransportSlice::Icmpv6(_)) => record.add_layer("ICMPv6"),
        _ => {
            if let Some((IP_PROTO_SCTP, payload)) = ip_payload {
                decode_sctp(&mut record, payload);
            }
        }
    }

    record
}

fn either_port(sp: u16, dp: u16, port: u16) -> bool {
    sp == port || dp == port
}

fn recognize_tcp_payload(record: &mut PacketRecord, sp: u16, dp: u16, payload: &[u8]) {
    if either_port(sp, dp, DNS_PORT) {
        // DNS over TCP carries a two-byte length prefix.
        if let Some(message) = payload.get(2..) {
            decode_dns(record, message);
        }
    } else if either_port(sp, dp, DIAMETER_PORT) {
        decode_diameter(record, payload);
    } else if let Some(sip) = parse_sip(payload) {
        record.add_layer("SIP");
        record.sip = Some(sip);
    } else if either_port(sp, dp, 443) {
        record.add_layer("HTTPS");
    } else if is_http(sp, dp, payload) {
        record.add_layer("HTTP");
    }
}

fn recognize_udp_payload(record: &mut PacketRecord, sp: u16, dp: u16, payload: &[u8]) {
    if either_port(sp, dp, DNS_PORT) {
        decode_dns(record, payload);
    } else if let Some(sip) = parse_sip(payload) {
        record.add_layer("SIP");
        record.sip = Some(sip);
    } else if sp >= 1024 && dp >= 1024 {
        decode_rtp(record, payload);
    }
}

fn decode_dns(record: &mut PacketRecord, message: &[u8]) {
    if message.len() < 12 {
        return;
    }
    record.add_layer("DNS");
    record.dns = Some(DnsInfo {
        is_response: message[2] & 0x80 != 0,
    });
}

fn is_http(sp: u16, dp: u16, payload: &[u8]) -> bool {
    if payload.is_empty() {
        return false;
    }
    either_port(sp, dp, 80)
        || either_port(sp, dp, 8080)
        || HTTP_PREFIXES.iter().any(|p| payload.starts_with(p))
}

/// Recognize a SIP request or response and pull out its Call-ID.
fn parse_sip(payload: &[u8]) -> Option<SipInfo> {
    let text = String::from_utf8_lossy(payload);
    let mut lines = text.lines();
    let start = lines.next()?.trim_end();

    let method = if start.starts_with("SIP/2.0 ") {
        None
    } else {
        let token = start.split(' ').next()?;
        if !SIP_METHODS.contains(&token) || !start.ends_with("SIP/2.0") {
            return None;
        }
        Some(token.to_string())
    };

    let mut call_id = None;
    for line in lines {
        if line.trim().is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        if name.eq_ignore_ascii_case("call-id") || name.eq_ignore_ascii_case("i") {
            call_id = Some(value.trim().to_string());
            break;
        }
    }

    Some(SipInfo { call_id, method })
}

/// Version-2 RTP/RTCP heuristic for UDP between unprivileged ports.
fn decode_rtp(record: &mut PacketRecord, payload: &[u8]) {
    if payload.len() < 12 || payload[0] >> 6 != 2 {
        return;
    }
    if (200..=204).contains(&payload[1]) {
        record.add_layer("RTCP");
        return;
    }
    record.add_layer("RTP");
    record.rtp = Some(RtpInfo {
        ssrc: u32::from_be_bytes([payload[8], payload[9], payload[10], payload[11]]),
    });
}

/// Parse the SCTP common header and walk its chunks.
///
/// Each chunk header is type (1), flags (1), length (2); the length covers
/// the header and excludes the padding to a 4-byte boundary. DATA chunks
/// carrying Diameter are decoded as such.
fn decode_sctp(record: &mut PacketRecord, packet: &[u8]) {
    if packet.len() < SCTP_COMMON_HEADER {
        record.add_layer("SCTP");
        return;
    }
    let sp = u16::from_be_bytes([packet[0], packet[1]]);
    let dp = u16::from_be_bytes([packet[2], packet[3]]);

    let mut offset = SCTP_COMMON_HEADER;
    let mut chunk_count = 0u32;
    let mut diameter_data = None;
    while offset + 4 <= packet.len() {
        let chunk_type = packet[offset];
        let len = u16::from_be_bytes([packet[offset + 2], packet[offset + 3]]) as usize;
        if len < 4 || offset + len > packet.len() {
            break;
        }
        chunk_count += 1;

        // DATA: tsn (4), stream id (2), stream seq (2), ppid (4), then user data.
        if chunk_type == SCTP_CHUNK_DATA && len > 16 && diameter_data.is_none() {
            let ppid = u32::from_be_bytes([
                packet[offset + 12],
                packet[offset + 13],
                packet[offset + 14],
                packet[offset + 15],
            ]);
            if ppid == DIAMETER_PPID || either_port(sp, dp, DIAMETER_PORT) {
                diameter_data = Some(&packet[offset + 16..offset + len]);
            }
        }

        offset += (len + 3) & !3;
    }

    record.add_layer("SCTP");
    record.transport = Some(TransportInfo {
        protocol: TransportProtocol::Sctp,
        src_port: sp,
        dst_port: dp,
    });
    record.sctp = Some(SctpInfo { chunk_count });

    if let Some(data) = diameter_data {
        decode_diameter(record, data);
    }
}

fn u24(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]])
}

/// Parse a Diameter header and look for the Session-Id AVP.
///
/// Header: version (1), length (3), flags (1), command code (3),
/// application id (4), hop-by-hop (4), end-to-end (4). AVPs follow at
/// offset 20: code (4), flags (1), length (3), optional vendor id (4).
fn decode_diameter(record: &mut PacketRecord, message: &[u8]) {
    if message.len() < 20 || message[0] != 1 {
        return;
    }
    let end = (u24(&message[1..4]) as usize).min(message.len());
    let command_code = u24(&message[5..8]);

    let mut session_id = None;
    let mut offset = 20;
    while offset + 8 <= end {
        let code = u32::from_be_bytes([
            message[offset],
            message[offset + 1],
            message[offset + 2],
            message[offset + 3],
        ]);
        let flags = message[offset + 4];
        let avp_len = u24(&message[offset + 5..offset + 8]) as usize;
        let header_len = if flags & 0x80 != 0 { 12 } else { 8 };
        if avp_len < header_len || offset + avp_len > end {
            break;
        }
        if code == AVP_SESSION_ID {
            session_id = std::str::from_utf8(&message[offset + header_len..offset + avp_len])
                .ok()
                .map(str::to_string);
            break;
        }
        offset += (avp_len + 3) & !3;
    }

    record.add_layer("Diameter");
    record.diameter = Some(DiameterInfo {
        session_id,
        command_code,
    });
}

/// Read and decode every frame of a pcap/pcapng file.
#[cfg(feature = "pcap")]
pub fn read_capture(path: &Path) -> Result<Vec<PacketRecord>> {
    use anyhow::Context;

    let mut capture = pcap::Capture::from_file(path)
        .with_context(|| format!("Failed to open capture: {}", path.display()))?;

    let mut packets = Vec::new();
    loop {
        match capture.next_packet() {
            Ok(packet) => {
                let ts = packet.header.ts.tv_sec as f64 + packet.header.ts.tv_usec as f64 / 1e6;
                packets.push(decode_frame(packet.data, ts, packet.header.len));
            }
            Err(pcap::Error::NoMorePackets) => break,
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read capture: {}", path.display()))
            }
        }
    }

    tracing::debug!(path = %path.display(), packets = packets.len(), "Read capture");
    Ok(packets)
}

#[cfg(not(feature = "pcap"))]
pub fn read_capture(path: &Path) -> Result<Vec<PacketRecord>> {
    anyhow::bail!(
        "Cannot read {}: capture support requires building with `--features pcap`",
        path.display()
    )
}

/// Whether `path` names a capture file by extension.
pub fn is_capture_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase).as_deref(),
        Some("pcap") | Some("pcapng") | Some("cap")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAC_A: [u8; 6] = [0x02, 0, 0, 0, 0, 0x01];
    const MAC_B: [u8; 6] = [0x02, 0, 0, 0, 0, 0x02];

    fn ethernet(ether_type: u16, body: &[u8]) -> Vec<u8> {
        let mut frame = Vec::new();
        frame.extend_from_slice(&MAC_B);
        frame.extend_from_slice(&MAC_A);
        frame.extend_from_slice(&ether_type.to_be_bytes());
        frame.extend_from_slice(body);
        frame
    }

    fn ipv4(protocol: u8, flags_frag: u16, payload: &[u8]) -> Vec<u8> {
        let total = (20 + payload.len()) as u16;
        let mut ip = vec![0x45, 0x00];
        ip.extend_from_slice(&total.to_be_bytes());
        ip.extend_from_slice(&[0x00, 0x01]);
        ip.extend_from_slice(&flags_frag.to_be_bytes());
        ip.extend_from_slice(&[64, protocol, 0, 0]);
        ip.extend_from_slice(&[10, 0, 0, 1]);
        ip.extend_from_slice(&[10, 0, 0, 2]);
        ip.extend_from_slice(payload);
        ethernet(0x0800, &ip)
    }

    fn udp(sp: u16, dp: u16, payload: &[u8]) -> Vec<u8> {
        let mut seg = Vec::new();
        seg.extend_from_slice(&sp.to_be_bytes());
        seg.extend_from_slice(&dp.to_be_bytes());
        seg.extend_from_slice(&((8 + payload.len()) as u16).to_be_bytes());
        seg.extend_from_slice(&[0, 0]);
        seg.extend_from_slice(payload);
        ipv4(17, 0x4000, &seg)
    }

    fn tcp(sp: u16, dp: u16, flags: u8, payload: &[u8]) -> Vec<u8> {
        let mut seg = Vec::new();
        seg.extend_from_slice(&sp.to_be_bytes());
        seg.extend_from_slice(&dp.to_be_bytes());
        seg.extend_from_slice(&1u32.to_be_bytes());
        seg.extend_from_slice(&0u32.to_be_bytes());
        seg.extend_from_slice(&[0x50, flags]);
        seg.extend_from_slice(&[0xff, 0xff, 0, 0, 0, 0]);
        seg.extend_from_slice(payload);
        ipv4(6, 0x4000, &seg)
    }

    fn diameter_message(command_code: u32, session_id: &str) -> Vec<u8> {
        let value = session_id.as_bytes();
        let avp_len = 8 + value.len();
        let mut avp = Vec::new();
        avp.extend_from_slice(&AVP_SESSION_ID.to_be_bytes());
        avp.push(0x40);
        avp.extend_from_slice(&(avp_len as u32).to_be_bytes()[1..]);
        avp.extend_from_slice(value);
        while avp.len() % 4 != 0 {
            avp.push(0);
        }

        let total = 20 + avp.len();
        let mut msg = vec![1];
        msg.extend_from_slice(&(total as u32).to_be_bytes()[1..]);
        msg.push(0x80);
        msg.extend_from_slice(&command_code.to_be_bytes()[1..]);
        msg.extend_from_slice(&[0; 12]);
        msg.extend_from_slice(&avp);
        msg
    }

    #[test]
    fn test_tcp_syn_and_https() {
        let p = decode_frame(&tcp(40000, 443, 0x02, &[]), 1.0, 54);
        assert!(p.has_layer("Ether"));
        assert!(p.has_layer("IP"));
        assert!(p.has_layer("TCP"));
        assert!(p.has_layer("HTTPS"));
        assert_eq!(p.tcp_flags, Some(TcpFlags::SYN));
        assert_eq!(p.length, 54);
        let t = p.transport.unwrap();
        assert_eq!((t.src_port, t.dst_port), (40000, 443));
    }

    #[test]
    fn test_http_request() {
        let p = decode_frame(&tcp(40000, 8000, 0x18, b"GET / HTTP/1.1\r\n\r\n"), 1.0, 80);
        assert!(p.has_layer("HTTP"));
        assert!(p.tcp_flags.unwrap().ack);
    }

    #[test]
    fn test_dns_query_and_response() {
        let mut query = vec![0x12, 0x34, 0x01, 0x00];
        query.extend_from_slice(&[0; 8]);
        let p = decode_frame(&udp(5353, 53, &query), 1.0, 60);
        assert!(p.has_layer("DNS"));
        assert!(!p.dns.unwrap().is_response);

        let mut response = vec![0x12, 0x34, 0x81, 0x80];
        response.extend_from_slice(&[0; 8]);
        let p = decode_frame(&udp(53, 5353, &response), 1.0, 60);
        assert!(p.dns.unwrap().is_response);
    }

    #[test]
    fn test_sip_invite_and_response() {
        let invite = b"INVITE sip:bob@example.com SIP/2.0\r\n\
                       Via: SIP/2.0/UDP 10.0.0.1:5060\r\n\
                       Call-ID: a84b4c76e66710@pc33\r\n\r\n";
        let p = decode_frame(&udp(5060, 5060, invite), 1.0, 200);
        assert!(p.has_layer("SIP"));
        let sip = p.sip.unwrap();
        assert_eq!(sip.method.as_deref(), Some("INVITE"));
        assert_eq!(sip.call_id.as_deref(), Some("a84b4c76e66710@pc33"));

        let ok = b"SIP/2.0 200 OK\r\ni: a84b4c76e66710@pc33\r\n\r\n";
        let p = decode_frame(&udp(5060, 5060, ok), 1.0, 120);
        let sip = p.sip.unwrap();
        assert_eq!(sip.method, None);
        assert_eq!(sip.call_id.as_deref(), Some("a84b4c76e66710@pc33"));
    }

    #[test]
    fn test_rtp_and_rtcp() {
        let mut rtp = vec![0x80, 0x00, 0x00, 0x01, 0, 0, 0, 0];
        rtp.extend_from_slice(&0xdead_beefu32.to_be_bytes());
        rtp.extend_from_slice(&[0; 160]);
        let p = decode_frame(&udp(16384, 16386, &rtp), 1.0, 214);
        assert!(p.has_layer("RTP"));
        assert_eq!(p.rtp.unwrap().ssrc, 0xdead_beef);

        let mut rtcp = vec![0x80, 200, 0x00, 0x06];
        rtcp.extend_from_slice(&[0; 24]);
        let p = decode_frame(&udp(16385, 16387, &rtcp), 1.0, 70);
        assert!(p.has_layer("RTCP"));
        assert!(!p.has_layer("RTP"));
    }

    #[test]
    fn test_low_ports_are_not_rtp() {
        let mut rtp = vec![0x80, 0x00];
        rtp.extend_from_slice(&[0; 14]);
        let p = decode_frame(&udp(123, 123, &rtp), 1.0, 60);
        assert!(!p.has_layer("RTP"));
        assert!(p.has_layer("UDP"));
    }

    #[test]
    fn test_diameter_over_tcp() {
        let msg = diameter_message(316, "mme.example.com;1;42");
        let p = decode_frame(&tcp(3868, 50000, 0x18, &msg), 1.0, 120);
        assert!(p.has_layer("Diameter"));
        let d = p.diameter.unwrap();
        assert_eq!(d.command_code, 316);
        assert_eq!(d.session_id.as_deref(), Some("mme.example.com;1;42"));
    }

    #[test]
    fn test_sctp_chunks_and_diameter_data() {
        let msg = diameter_message(272, "pcrf;7");
        let mut data_chunk = vec![SCTP_CHUNK_DATA, 0x03];
        data_chunk.extend_from_slice(&((16 + msg.len()) as u16).to_be_bytes());
        data_chunk.extend_from_slice(&[0; 8]);
        data_chunk.extend_from_slice(&DIAMETER_PPID.to_be_bytes());
        data_chunk.extend_from_slice(&msg);

        let mut sack = vec![3, 0, 0, 16];
        sack.extend_from_slice(&[0; 12]);

        let mut packet = Vec::new();
        packet.extend_from_slice(&36412u16.to_be_bytes());
        packet.extend_from_slice(&36412u16.to_be_bytes());
        packet.extend_from_slice(&[0; 8]);
        packet.extend_from_slice(&sack);
        packet.extend_from_slice(&data_chunk);

        let p = decode_frame(&ipv4(IP_PROTO_SCTP, 0x4000, &packet), 1.0, 200);
        assert!(p.has_layer("SCTP"));
        assert_eq!(p.sctp.unwrap().chunk_count, 2);
        assert_eq!(p.transport.unwrap().protocol, TransportProtocol::Sctp);
        assert_eq!(p.diameter.unwrap().session_id.as_deref(), Some("pcrf;7"));
    }

    #[test]
    fn test_icmp_and_arp() {
        let echo = [8, 0, 0, 0, 0, 1, 0, 1];
        let p = decode_frame(&ipv4(1, 0x4000, &echo), 1.0, 42);
        assert!(p.has_layer("ICMP"));

        let mut arp = vec![0, 1, 0x08, 0x00, 6, 4, 0, 1];
        arp.extend_from_slice(&MAC_A);
        arp.extend_from_slice(&[10, 0, 0, 1]);
        arp.extend_from_slice(&[0; 6]);
        arp.extend_from_slice(&[10, 0, 0, 2]);
        let p = decode_frame(&ethernet(0x0806, &arp), 1.0, 42);
        assert!(p.has_layer("ARP"));
        assert!(p.ip.is_none());
    }

    #[test]
    fn test_fragment_flags() {
        // More-fragments set, offset 0.
        let p = decode_frame(&ipv4(17, 0x2000, &[0; 16]), 1.0, 60);
        assert!(p.ip.unwrap().is_fragmented());
    }

    #[test]
    fn test_truncated_frame_is_raw() {
        let p = decode_frame(&[0x00, 0x01, 0x02], 2.5, 3);
        assert_eq!(p.layers, vec!["RAW".to_string()]);
        assert_eq!(p.timestamp, 2.5);
    }

    #[test]
    fn test_is_capture_path() {
        assert!(is_capture_path(Path::new("trace.PCAP")));
        assert!(is_capture_path(Path::new("a/b.pcapng")));
        assert!(!is_capture_path(Path::new("syslog.log")));
    }
}

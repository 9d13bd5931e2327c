//! Packet-capture analysis.
//!
//! Works on an already-decoded sequence of [`PacketRecord`]s; turning raw
//! frames into records is the application's job. The submodules each
//! compute one section of the [`CaptureReport`]:
//!
//! | Module | Section |
//! |--------|---------|
//! | [`stats`] | basic statistics and protocol distribution |
//! | [`conversation`] | bidirectional IP conversations and 5-tuple flows |
//! | [`session`] | SIP calls, RTP streams, Diameter sessions, SCTP associations |
//! | [`anomaly`] | threshold heuristics over the above |
//! | [`analyzer`] | orchestration and the text summary |

pub mod analyzer;
pub mod anomaly;
pub mod conversation;
pub mod session;
pub mod stats;

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use analyzer::{render_summary, CaptureAnalyzer, CaptureReport, ExtractorFailure};
pub use anomaly::{Anomaly, AnomalyKind, AnomalyThresholds};

/// Failures a capture extractor can hit on malformed input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CaptureError {
    #[error("packet {index} has an unusable timestamp ({value})")]
    InvalidTimestamp { index: usize, value: f64 },
}

/// Convert a capture timestamp (seconds since the epoch) to UTC.
pub(crate) fn to_datetime(index: usize, ts: f64) -> Result<DateTime<Utc>, CaptureError> {
    let invalid = CaptureError::InvalidTimestamp { index, value: ts };
    if !ts.is_finite() || ts < 0.0 {
        return Err(invalid);
    }
    let secs = ts.trunc() as i64;
    let nanos = ((ts - ts.trunc()) * 1e9) as u32;
    DateTime::from_timestamp(secs, nanos.min(999_999_999)).ok_or(invalid)
}

/// Protocols tallied individually in the protocol distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    Tcp,
    Udp,
    Http,
    Dns,
    Https,
    Icmp,
    Arp,
    Sip,
    Rtp,
    Rtcp,
    Sctp,
    Diameter,
}

impl Protocol {
    pub const ALL: [Protocol; 12] = [
        Protocol::Tcp,
        Protocol::Udp,
        Protocol::Http,
        Protocol::Dns,
        Protocol::Https,
        Protocol::Icmp,
        Protocol::Arp,
        Protocol::Sip,
        Protocol::Rtp,
        Protocol::Rtcp,
        Protocol::Sctp,
        Protocol::Diameter,
    ];

    /// Layer name as it appears in [`PacketRecord::layers`].
    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Http => "HTTP",
            Protocol::Dns => "DNS",
            Protocol::Https => "HTTPS",
            Protocol::Icmp => "ICMP",
            Protocol::Arp => "ARP",
            Protocol::Sip => "SIP",
            Protocol::Rtp => "RTP",
            Protocol::Rtcp => "RTCP",
            Protocol::Sctp => "SCTP",
            Protocol::Diameter => "Diameter",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransportProtocol {
    Tcp,
    Udp,
    Sctp,
}

impl TransportProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportProtocol::Tcp => "TCP",
            TransportProtocol::Udp => "UDP",
            TransportProtocol::Sctp => "SCTP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpInfo {
    pub src: IpAddr,
    pub dst: IpAddr,
    pub more_fragments: bool,
    pub fragment_offset: u16,
}

impl IpInfo {
    pub fn is_fragmented(&self) -> bool {
        self.more_fragments || self.fragment_offset > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportInfo {
    pub protocol: TransportProtocol,
    pub src_port: u16,
    pub dst_port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpFlags {
    pub syn: bool,
    pub ack: bool,
    pub fin: bool,
    pub rst: bool,
}

impl TcpFlags {
    pub const SYN: TcpFlags = TcpFlags {
        syn: true,
        ack: false,
        fin: false,
        rst: false,
    };
    pub const SYN_ACK: TcpFlags = TcpFlags {
        syn: true,
        ack: true,
        fin: false,
        rst: false,
    };
    pub const ACK: TcpFlags = TcpFlags {
        syn: false,
        ack: true,
        fin: false,
        rst: false,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DnsInfo {
    pub is_response: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SipInfo {
    pub call_id: Option<String>,
    /// Request method, or `None` for responses.
    pub method: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpInfo {
    pub ssrc: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiameterInfo {
    pub session_id: Option<String>,
    pub command_code: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SctpInfo {
    pub chunk_count: u32,
}

/// One decoded packet with per-layer field access.
///
/// `layers` lists every protocol layer the decoder recognized, outermost
/// first. The typed fields carry what the analyzers read from those layers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PacketRecord {
    /// Capture time, seconds since the Unix epoch.
    pub timestamp: f64,
    /// Frame length on the wire, in bytes.
    pub length: u32,
    pub layers: Vec<String>,
    pub ip: Option<IpInfo>,
    pub transport: Option<TransportInfo>,
    pub tcp_flags: Option<TcpFlags>,
    pub dns: Option<DnsInfo>,
    pub sip: Option<SipInfo>,
    pub rtp: Option<RtpInfo>,
    pub diameter: Option<DiameterInfo>,
    pub sctp: Option<SctpInfo>,
}

impl PacketRecord {
    pub fn new(timestamp: f64, length: u32) -> Self {
        Self {
            timestamp,
            length,
            ..Default::default()
        }
    }

    pub fn has_layer(&self, name: &str) -> bool {
        self.layers.iter().any(|l| l.eq_ignore_ascii_case(name))
    }

    pub fn add_layer(&mut self, name: &str) {
        if !self.has_layer(name) {
            self.layers.push(name.to_string());
        }
    }

    pub fn with_layer(mut self, name: &str) -> Self {
        self.add_layer(name);
        self
    }

    pub fn with_ip(mut self, src: IpAddr, dst: IpAddr) -> Self {
        self.add_layer(if src.is_ipv4() { "IP" } else { "IPv6" });
        self.ip = Some(IpInfo {
            src,
            dst,
            more_fragments: false,
            fragment_offset: 0,
        });
        self
    }

    /// Mark the IP header as fragmented. No effect without [`with_ip`](Self::with_ip).
    pub fn with_fragment(mut self, more_fragments: bool, fragment_offset: u16) -> Self {
        if let Some(ip) = self.ip.as_mut() {
            ip.more_fragments = more_fragments;
            ip.fragment_offset = fragment_offset;
        }
        self
    }

    pub fn with_tcp(mut self, src_port: u16, dst_port: u16, flags: TcpFlags) -> Self {
        self.add_layer("TCP");
        self.transport = Some(TransportInfo {
            protocol: TransportProtocol::Tcp,
            src_port,
            dst_port,
        });
        self.tcp_flags = Some(flags);
        self
    }

    pub fn with_udp(mut self, src_port: u16, dst_port: u16) -> Self {
        self.add_layer("UDP");
        self.transport = Some(TransportInfo {
            protocol: TransportProtocol::Udp,
            src_port,
            dst_port,
        });
        self
    }

    pub fn with_sctp(mut self, src_port: u16, dst_port: u16, chunk_count: u32) -> Self {
        self.add_layer("SCTP");
        self.transport = Some(TransportInfo {
            protocol: TransportProtocol::Sctp,
            src_port,
            dst_port,
        });
        self.sctp = Some(SctpInfo { chunk_count });
        self
    }

    pub fn with_dns(mut self, is_response: bool) -> Self {
        self.add_layer("DNS");
        self.dns = Some(DnsInfo { is_response });
        self
    }

    pub fn with_sip(mut self, call_id: Option<&str>, method: Option<&str>) -> Self {
        self.add_layer("SIP");
        self.sip = Some(SipInfo {
            call_id: call_id.map(str::to_string),
            method: method.map(str::to_string),
        });
        self
    }

    pub fn with_rtp(mut self, ssrc: u32) -> Self {
        self.add_layer("RTP");
        self.rtp = Some(RtpInfo { ssrc });
        self
    }

    pub fn with_diameter(mut self, session_id: Option<&str>, command_code: u32) -> Self {
        self.add_layer("Diameter");
        self.diameter = Some(DiameterInfo {
            session_id: session_id.map(str::to_string),
            command_code,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_lookup_is_case_insensitive() {
        let p = PacketRecord::new(0.0, 60).with_layer("Diameter");
        assert!(p.has_layer("DIAMETER"));
        assert!(p.has_layer(Protocol::Diameter.name()));
        assert!(!p.has_layer("SIP"));
    }

    #[test]
    fn test_add_layer_deduplicates() {
        let p = PacketRecord::new(0.0, 60)
            .with_layer("UDP")
            .with_udp(5060, 5060);
        assert_eq!(p.layers, vec!["UDP".to_string()]);
    }

    #[test]
    fn test_to_datetime() {
        let dt = to_datetime(0, 1_700_000_000.5).unwrap();
        assert_eq!(dt.timestamp(), 1_700_000_000);
        assert_eq!(dt.timestamp_subsec_millis(), 500);
        assert!(to_datetime(3, f64::NAN).is_err());
        assert!(to_datetime(3, -1.0).is_err());
    }
}

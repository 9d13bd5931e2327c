//! Conversation and flow reconstruction.
//!
//! A conversation is all IP traffic between two endpoints regardless of
//! direction. Its key is the endpoint pair ordered by the textual form of
//! the addresses, so `10.0.0.2 -> 10.0.0.1` and `10.0.0.1 -> 10.0.0.2`
//! land in the same entry. A flow is directional and keyed by the full
//! 5-tuple.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{to_datetime, CaptureError, PacketRecord, TransportProtocol};

pub const MAX_CONVERSATIONS: usize = 50;
pub const MAX_FLOWS: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    /// Lexicographically smaller endpoint.
    pub ip_a: String,
    pub ip_b: String,
    pub packets: u64,
    pub bytes: u64,
    pub a_to_b_packets: u64,
    pub a_to_b_bytes: u64,
    pub b_to_a_packets: u64,
    pub b_to_a_bytes: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
    pub avg_bytes_per_second: f64,
    pub avg_packets_per_second: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub src_ip: String,
    pub src_port: u16,
    pub dst_ip: String,
    pub dst_port: u16,
    pub protocol: TransportProtocol,
    pub packets: u64,
    pub bytes: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
}

/// Running first/last timestamps, remembering which packet set each.
#[derive(Debug, Clone, Copy)]
struct Span {
    start: (usize, f64),
    end: (usize, f64),
}

impl Span {
    fn new(index: usize, ts: f64) -> Self {
        Self {
            start: (index, ts),
            end: (index, ts),
        }
    }

    fn extend(&mut self, index: usize, ts: f64) {
        if ts < self.start.1 {
            self.start = (index, ts);
        }
        if ts > self.end.1 {
            self.end = (index, ts);
        }
    }

    fn resolve(&self) -> Result<(DateTime<Utc>, DateTime<Utc>, f64), CaptureError> {
        let start = to_datetime(self.start.0, self.start.1)?;
        let end = to_datetime(self.end.0, self.end.1)?;
        Ok((start, end, (self.end.1 - self.start.1).max(0.0)))
    }
}

#[derive(Debug, Default)]
struct ConversationAcc {
    a_to_b_packets: u64,
    a_to_b_bytes: u64,
    b_to_a_packets: u64,
    b_to_a_bytes: u64,
    span: Option<Span>,
}

#[derive(Debug, Default)]
struct FlowAcc {
    packets: u64,
    bytes: u64,
    span: Option<Span>,
}

fn touch(span: &mut Option<Span>, index: usize, ts: f64) -> Result<(), CaptureError> {
    // NaN compares false everywhere and would otherwise be silently dropped
    if !ts.is_finite() {
        return Err(CaptureError::InvalidTimestamp { index, value: ts });
    }
    match span {
        Some(s) => s.extend(index, ts),
        None => *span = Some(Span::new(index, ts)),
    }
    Ok(())
}

/// Top [`MAX_CONVERSATIONS`] conversations by total bytes.
pub fn conversations(packets: &[PacketRecord]) -> Result<Vec<Conversation>, CaptureError> {
    let mut acc: HashMap<(String, String), ConversationAcc> = HashMap::new();

    for (index, packet) in packets.iter().enumerate() {
        let Some(ip) = packet.ip else { continue };
        let src = ip.src.to_string();
        let dst = ip.dst.to_string();
        let forward = src <= dst;
        let key = if forward { (src, dst) } else { (dst, src) };

        let entry = acc.entry(key).or_default();
        let len = u64::from(packet.length);
        if forward {
            entry.a_to_b_packets += 1;
            entry.a_to_b_bytes += len;
        } else {
            entry.b_to_a_packets += 1;
            entry.b_to_a_bytes += len;
        }
        touch(&mut entry.span, index, packet.timestamp)?;
    }

    let mut out = Vec::with_capacity(acc.len());
    for ((ip_a, ip_b), c) in acc {
        let Some(span) = c.span else { continue };
        let (start_time, end_time, duration_seconds) = span.resolve()?;
        let packets = c.a_to_b_packets + c.b_to_a_packets;
        let bytes = c.a_to_b_bytes + c.b_to_a_bytes;
        let (avg_bytes_per_second, avg_packets_per_second) = if duration_seconds > 0.0 {
            (
                bytes as f64 / duration_seconds,
                packets as f64 / duration_seconds,
            )
        } else {
            (0.0, 0.0)
        };
        out.push(Conversation {
            ip_a,
            ip_b,
            packets,
            bytes,
            a_to_b_packets: c.a_to_b_packets,
            a_to_b_bytes: c.a_to_b_bytes,
            b_to_a_packets: c.b_to_a_packets,
            b_to_a_bytes: c.b_to_a_bytes,
            start_time,
            end_time,
            duration_seconds,
            avg_bytes_per_second,
            avg_packets_per_second,
        });
    }

    out.sort_by(|x, y| {
        y.bytes
            .cmp(&x.bytes)
            .then_with(|| (&x.ip_a, &x.ip_b).cmp(&(&y.ip_a, &y.ip_b)))
    });
    out.truncate(MAX_CONVERSATIONS);
    Ok(out)
}

type FlowKey = (String, u16, String, u16, TransportProtocol);

/// Top [`MAX_FLOWS`] directional 5-tuple flows by total bytes.
pub fn flows(packets: &[PacketRecord]) -> Result<Vec<Flow>, CaptureError> {
    let mut acc: HashMap<FlowKey, FlowAcc> = HashMap::new();

    for (index, packet) in packets.iter().enumerate() {
        let (Some(ip), Some(transport)) = (packet.ip, packet.transport) else {
            continue;
        };
        let key = (
            ip.src.to_string(),
            transport.src_port,
            ip.dst.to_string(),
            transport.dst_port,
            transport.protocol,
        );
        let entry = acc.entry(key).or_default();
        entry.packets += 1;
        entry.bytes += u64::from(packet.length);
        touch(&mut entry.span, index, packet.timestamp)?;
    }

    let mut out = Vec::with_capacity(acc.len());
    for ((src_ip, src_port, dst_ip, dst_port, protocol), f) in acc {
        let Some(span) = f.span else { continue };
        let (start_time, end_time, duration_seconds) = span.resolve()?;
        out.push(Flow {
            src_ip,
            src_port,
            dst_ip,
            dst_port,
            protocol,
            packets: f.packets,
            bytes: f.bytes,
            start_time,
            end_time,
            duration_seconds,
        });
    }

    out.sort_by(|x, y| {
        y.bytes.cmp(&x.bytes).then_with(|| {
            (&x.src_ip, x.src_port, &x.dst_ip, x.dst_port, x.protocol).cmp(&(
                &y.src_ip, y.src_port, &y.dst_ip, y.dst_port, y.protocol,
            ))
        })
    });
    out.truncate(MAX_FLOWS);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::TcpFlags;
    use std::net::{IpAddr, Ipv4Addr};

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn test_swapped_endpoints_are_one_conversation() {
        let packets = vec![
            PacketRecord::new(10.0, 100).with_ip(ip(2), ip(1)),
            PacketRecord::new(11.0, 300).with_ip(ip(1), ip(2)),
        ];
        let convs = conversations(&packets).unwrap();
        assert_eq!(convs.len(), 1);
        let c = &convs[0];
        assert_eq!(c.ip_a, "10.0.0.1");
        assert_eq!(c.ip_b, "10.0.0.2");
        assert_eq!(c.a_to_b_bytes, 300);
        assert_eq!(c.b_to_a_bytes, 100);
        assert_eq!(c.bytes, c.a_to_b_bytes + c.b_to_a_bytes);
        assert_eq!(c.packets, 2);
        assert_eq!(c.duration_seconds, 1.0);
        assert_eq!(c.avg_bytes_per_second, 400.0);
    }

    #[test]
    fn test_lexicographic_not_numeric_ordering() {
        // "10.0.0.10" < "10.0.0.9" as strings
        let packets = vec![PacketRecord::new(0.0, 10).with_ip(ip(9), ip(10))];
        let c = &conversations(&packets).unwrap()[0];
        assert_eq!(c.ip_a, "10.0.0.10");
        assert_eq!(c.b_to_a_packets, 1);
    }

    #[test]
    fn test_conversations_sorted_and_capped() {
        let packets: Vec<PacketRecord> = (0..60u32)
            .map(|i| {
                PacketRecord::new(0.0, 100 + i).with_ip(
                    IpAddr::V4(Ipv4Addr::new(192, 168, 1, i as u8)),
                    ip(1),
                )
            })
            .collect();
        let convs = conversations(&packets).unwrap();
        assert_eq!(convs.len(), MAX_CONVERSATIONS);
        assert_eq!(convs[0].bytes, 159);
        assert!(convs.windows(2).all(|w| w[0].bytes >= w[1].bytes));
    }

    #[test]
    fn test_non_ip_packets_ignored() {
        let packets = vec![PacketRecord::new(0.0, 42).with_layer("ARP")];
        assert!(conversations(&packets).unwrap().is_empty());
        assert!(flows(&packets).unwrap().is_empty());
    }

    #[test]
    fn test_flows_are_directional() {
        let packets = vec![
            PacketRecord::new(0.0, 60)
                .with_ip(ip(1), ip(2))
                .with_tcp(40000, 80, TcpFlags::SYN),
            PacketRecord::new(0.1, 60)
                .with_ip(ip(2), ip(1))
                .with_tcp(80, 40000, TcpFlags::SYN_ACK),
            PacketRecord::new(0.2, 1500)
                .with_ip(ip(1), ip(2))
                .with_tcp(40000, 80, TcpFlags::ACK),
        ];
        let fl = flows(&packets).unwrap();
        assert_eq!(fl.len(), 2);
        assert_eq!(fl[0].src_ip, "10.0.0.1");
        assert_eq!(fl[0].packets, 2);
        assert_eq!(fl[0].bytes, 1560);
        assert_eq!(fl[0].protocol, TransportProtocol::Tcp);
        assert_eq!(fl[1].src_port, 80);
    }

    #[test]
    fn test_nan_timestamp_is_an_error() {
        let packets = vec![PacketRecord::new(f64::NAN, 10).with_ip(ip(1), ip(2))];
        assert!(conversations(&packets).is_err());
    }
}

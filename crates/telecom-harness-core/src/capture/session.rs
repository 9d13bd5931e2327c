//! Telecom protocol session extraction.
//!
//! Each protocol groups packets by its own correlation identifier:
//!
//! - SIP calls by `Call-ID`
//! - RTP streams by SSRC
//! - Diameter sessions by `Session-Id`
//! - SCTP associations by `src:port-dst:port`
//!
//! Packets without the identifier are skipped for that protocol only.
//! Every session carries its first and last packet time and the duration
//! between them.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{to_datetime, CaptureError, PacketRecord, TransportProtocol};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SipCall {
    pub call_id: String,
    pub packets: u64,
    pub methods: BTreeSet<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RtpStream {
    pub ssrc: u32,
    pub packets: u64,
    pub bytes: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiameterSession {
    pub session_id: String,
    pub packets: u64,
    pub commands: BTreeSet<u32>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SctpAssociation {
    pub endpoints: String,
    pub packets: u64,
    pub chunks: u64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_seconds: f64,
}

/// All sessions found in a capture, each list sorted by packet count
/// descending, then by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelecomSessions {
    pub sip_calls: Vec<SipCall>,
    pub rtp_streams: Vec<RtpStream>,
    pub diameter_sessions: Vec<DiameterSession>,
    pub sctp_associations: Vec<SctpAssociation>,
}

impl TelecomSessions {
    pub fn is_empty(&self) -> bool {
        self.sip_calls.is_empty()
            && self.rtp_streams.is_empty()
            && self.diameter_sessions.is_empty()
            && self.sctp_associations.is_empty()
    }
}

/// Per-key accumulator shared by the timed session kinds.
struct Timed<T> {
    packets: u64,
    first: (usize, f64),
    last: (usize, f64),
    extra: T,
}

fn accumulate<K, T, F>(
    map: &mut HashMap<K, Timed<T>>,
    key: K,
    index: usize,
    ts: f64,
    update: F,
) -> Result<(), CaptureError>
where
    K: Eq + Hash,
    T: Default,
    F: FnOnce(&mut T),
{
    if !ts.is_finite() {
        return Err(CaptureError::InvalidTimestamp { index, value: ts });
    }
    let entry = map.entry(key).or_insert_with(|| Timed {
        packets: 0,
        first: (index, ts),
        last: (index, ts),
        extra: T::default(),
    });
    entry.packets += 1;
    if ts < entry.first.1 {
        entry.first = (index, ts);
    }
    if ts > entry.last.1 {
        entry.last = (index, ts);
    }
    update(&mut entry.extra);
    Ok(())
}

/// Start, end, and seconds between them.
fn times<T>(t: &Timed<T>) -> Result<(DateTime<Utc>, DateTime<Utc>, f64), CaptureError> {
    Ok((
        to_datetime(t.first.0, t.first.1)?,
        to_datetime(t.last.0, t.last.1)?,
        t.last.1 - t.first.1,
    ))
}

pub fn sessions(packets: &[PacketRecord]) -> Result<TelecomSessions, CaptureError> {
    let mut sip: HashMap<String, Timed<BTreeSet<String>>> = HashMap::new();
    let mut rtp: HashMap<u32, Timed<u64>> = HashMap::new();
    let mut diameter: HashMap<String, Timed<BTreeSet<u32>>> = HashMap::new();
    let mut sctp: HashMap<String, Timed<u64>> = HashMap::new();

    for (index, packet) in packets.iter().enumerate() {
        if let Some(call_id) = packet.sip.as_ref().and_then(|s| s.call_id.clone()) {
            let method = packet.sip.as_ref().and_then(|s| s.method.clone());
            accumulate(&mut sip, call_id, index, packet.timestamp, |methods| {
                if let Some(m) = method {
                    methods.insert(m);
                }
            })?;
        }

        if let Some(r) = packet.rtp {
            let len = u64::from(packet.length);
            accumulate(&mut rtp, r.ssrc, index, packet.timestamp, |bytes| {
                *bytes += len
            })?;
        }

        if let Some(d) = packet.diameter.as_ref() {
            if let Some(session_id) = d.session_id.clone() {
                let code = d.command_code;
                accumulate(&mut diameter, session_id, index, packet.timestamp, |cmds| {
                    cmds.insert(code);
                })?;
            }
        }

        if let (Some(ip), Some(t), Some(s)) = (packet.ip, packet.transport, packet.sctp) {
            if t.protocol == TransportProtocol::Sctp {
                let key = format!("{}:{}-{}:{}", ip.src, t.src_port, ip.dst, t.dst_port);
                let count = u64::from(s.chunk_count);
                accumulate(&mut sctp, key, index, packet.timestamp, |chunks| {
                    *chunks += count
                })?;
            }
        }
    }

    let mut out = TelecomSessions::default();

    for (call_id, t) in sip {
        let (start_time, end_time, duration_seconds) = times(&t)?;
        out.sip_calls.push(SipCall {
            call_id,
            packets: t.packets,
            methods: t.extra,
            start_time,
            end_time,
            duration_seconds,
        });
    }
    out.sip_calls
        .sort_by(|a, b| b.packets.cmp(&a.packets).then_with(|| a.call_id.cmp(&b.call_id)));

    for (ssrc, t) in rtp {
        let (start_time, end_time, duration_seconds) = times(&t)?;
        out.rtp_streams.push(RtpStream {
            ssrc,
            packets: t.packets,
            bytes: t.extra,
            start_time,
            end_time,
            duration_seconds,
        });
    }
    out.rtp_streams
        .sort_by(|a, b| b.packets.cmp(&a.packets).then_with(|| a.ssrc.cmp(&b.ssrc)));

    for (session_id, t) in diameter {
        let (start_time, end_time, duration_seconds) = times(&t)?;
        out.diameter_sessions.push(DiameterSession {
            session_id,
            packets: t.packets,
            commands: t.extra,
            start_time,
            end_time,
            duration_seconds,
        });
    }
    out.diameter_sessions.sort_by(|a, b| {
        b.packets
            .cmp(&a.packets)
            .then_with(|| a.session_id.cmp(&b.session_id))
    });

    for (endpoints, t) in sctp {
        let (start_time, end_time, duration_seconds) = times(&t)?;
        out.sctp_associations.push(SctpAssociation {
            endpoints,
            packets: t.packets,
            chunks: t.extra,
            start_time,
            end_time,
            duration_seconds,
        });
    }
    out.sctp_associations.sort_by(|a, b| {
        b.packets
            .cmp(&a.packets)
            .then_with(|| a.endpoints.cmp(&b.endpoints))
    });

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 1, 0, last))
    }

    #[test]
    fn test_sip_calls_grouped_by_call_id() {
        let packets = vec![
            PacketRecord::new(1.0, 500).with_sip(Some("abc@host"), Some("INVITE")),
            PacketRecord::new(1.2, 400).with_sip(Some("abc@host"), None),
            PacketRecord::new(5.0, 300).with_sip(Some("abc@host"), Some("BYE")),
            PacketRecord::new(5.1, 300).with_sip(Some("abc@host"), Some("INVITE")),
            PacketRecord::new(2.0, 500).with_sip(Some("zzz@host"), Some("OPTIONS")),
            PacketRecord::new(2.0, 500).with_sip(None, Some("REGISTER")),
        ];
        let s = sessions(&packets).unwrap();
        assert_eq!(s.sip_calls.len(), 2);
        let call = &s.sip_calls[0];
        assert_eq!(call.call_id, "abc@host");
        assert_eq!(call.packets, 4);
        let methods: Vec<&str> = call.methods.iter().map(String::as_str).collect();
        assert_eq!(methods, vec!["BYE", "INVITE"]);
        assert_eq!(call.start_time.timestamp(), 1);
        assert_eq!(call.end_time.timestamp(), 5);
        assert!((call.duration_seconds - 4.1).abs() < 1e-9);
    }

    #[test]
    fn test_rtp_streams_count_bytes() {
        let packets = vec![
            PacketRecord::new(0.0, 200).with_rtp(0xdead),
            PacketRecord::new(0.02, 200).with_rtp(0xdead),
            PacketRecord::new(0.02, 180).with_rtp(0xbeef),
        ];
        let s = sessions(&packets).unwrap();
        assert_eq!(s.rtp_streams[0].ssrc, 0xdead);
        assert_eq!(s.rtp_streams[0].bytes, 400);
        assert_eq!(s.rtp_streams[1].packets, 1);
        assert!((s.rtp_streams[0].duration_seconds - 0.02).abs() < 1e-9);
        assert_eq!(s.rtp_streams[1].duration_seconds, 0.0);
    }

    #[test]
    fn test_diameter_requires_session_id() {
        let packets = vec![
            PacketRecord::new(0.0, 300).with_diameter(Some("mme;1;2"), 316),
            PacketRecord::new(0.1, 300).with_diameter(Some("mme;1;2"), 318),
            PacketRecord::new(0.2, 100).with_diameter(None, 280),
        ];
        let s = sessions(&packets).unwrap();
        assert_eq!(s.diameter_sessions.len(), 1);
        let cmds: Vec<u32> = s.diameter_sessions[0].commands.iter().copied().collect();
        assert_eq!(cmds, vec![316, 318]);
        assert!((s.diameter_sessions[0].duration_seconds - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_sctp_associations() {
        let packets = vec![
            PacketRecord::new(10.0, 100)
                .with_ip(ip(1), ip(2))
                .with_sctp(36412, 36412, 2),
            PacketRecord::new(12.5, 100)
                .with_ip(ip(1), ip(2))
                .with_sctp(36412, 36412, 1),
        ];
        let s = sessions(&packets).unwrap();
        assert_eq!(s.sctp_associations.len(), 1);
        let assoc = &s.sctp_associations[0];
        assert_eq!(assoc.endpoints, "10.1.0.1:36412-10.1.0.2:36412");
        assert_eq!(assoc.packets, 2);
        assert_eq!(assoc.chunks, 3);
        assert_eq!(assoc.start_time.timestamp(), 10);
        assert_eq!(assoc.end_time.timestamp(), 12);
        assert_eq!(assoc.duration_seconds, 2.5);
    }

    #[test]
    fn test_no_sessions() {
        let packets = vec![PacketRecord::new(0.0, 60).with_layer("ARP")];
        assert!(sessions(&packets).unwrap().is_empty());
    }
}

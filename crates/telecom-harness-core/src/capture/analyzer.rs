//! Capture analysis orchestration and the text summary.
//!
//! [`CaptureAnalyzer::analyze`] runs every extractor over the same packet
//! slice. An extractor that fails contributes an empty section and an
//! [`ExtractorFailure`] entry; the others are unaffected.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::anomaly::{detect, Anomaly, AnomalyThresholds};
use super::conversation::{conversations, flows, Conversation, Flow};
use super::session::{sessions, TelecomSessions};
use super::stats::{basic_stats, protocol_stats, BasicStats, ProtocolStats};
use super::{CaptureError, PacketRecord};

/// Sessions listed per protocol in the summary before truncating.
const SUMMARY_SESSION_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorFailure {
    pub extractor: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureReport {
    pub filename: String,
    pub basic_stats: BasicStats,
    pub protocol_stats: ProtocolStats,
    pub conversations: Vec<Conversation>,
    pub flows: Vec<Flow>,
    pub sessions: TelecomSessions,
    pub anomalies: Vec<Anomaly>,
    pub errors: Vec<ExtractorFailure>,
    pub analyzed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct CaptureAnalyzer {
    thresholds: AnomalyThresholds,
}

impl CaptureAnalyzer {
    pub fn new(thresholds: AnomalyThresholds) -> Self {
        Self { thresholds }
    }

    pub fn analyze(&self, filename: &str, packets: &[PacketRecord]) -> CaptureReport {
        let mut errors = Vec::new();

        let basic_stats = recover("basic_stats", basic_stats(packets), &mut errors);
        let protocol_stats = protocol_stats(packets);
        let conversations = recover("conversations", conversations(packets), &mut errors);
        let flows = recover("flows", flows(packets), &mut errors);
        let sessions = recover("sessions", sessions(packets), &mut errors);
        let anomalies = detect(packets, &protocol_stats, &self.thresholds);

        CaptureReport {
            filename: filename.to_string(),
            basic_stats,
            protocol_stats,
            conversations,
            flows,
            sessions,
            anomalies,
            errors,
            analyzed_at: Utc::now(),
        }
    }
}

fn recover<T: Default>(
    extractor: &str,
    result: Result<T, CaptureError>,
    errors: &mut Vec<ExtractorFailure>,
) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(extractor, error = %e, "capture extractor failed");
            errors.push(ExtractorFailure {
                extractor: extractor.to_string(),
                message: e.to_string(),
            });
            T::default()
        }
    }
}

/// Render a deterministic multi-section text summary of `report`.
pub fn render_summary(report: &CaptureReport) -> String {
    let mut out = String::new();
    let stats = &report.basic_stats;

    // write! into a String cannot fail
    let _ = writeln!(out, "PCAP Analysis Summary");
    let _ = writeln!(out, "=====================");
    let _ = writeln!(out, "File: {}", report.filename);
    let _ = writeln!(out, "Duration: {:.2} seconds", stats.duration_seconds);
    let _ = writeln!(out, "Total Packets: {}", stats.total_packets);
    let _ = writeln!(out, "Total Bytes: {:.2} KB", stats.total_bytes as f64 / 1024.0);
    let _ = writeln!(out, "Average Packet Size: {:.2} bytes", stats.avg_packet_size);
    let _ = writeln!(out, "Average Packets/Second: {:.2}", stats.avg_packets_per_second);

    let mut protocols: Vec<(&String, &usize)> = report.protocol_stats.protocol_counts.iter().collect();
    protocols.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    if !protocols.is_empty() {
        let _ = writeln!(out, "\nProtocol Distribution:");
        for (name, count) in protocols {
            let pct = report
                .protocol_stats
                .protocol_percentages
                .get(name)
                .copied()
                .unwrap_or(0.0);
            let _ = writeln!(out, "- {}: {} packets ({:.1}%)", name, count, pct);
        }
    }

    if !report.anomalies.is_empty() {
        let _ = writeln!(out, "\nDetected Anomalies:");
        for a in &report.anomalies {
            let _ = writeln!(
                out,
                "- {} ({}): {}",
                a.kind.label(),
                a.severity,
                a.description
            );
        }
    }

    let s = &report.sessions;
    if !s.is_empty() {
        let _ = writeln!(out, "\nTelecom Sessions:");
        if !s.sip_calls.is_empty() {
            let _ = writeln!(out, "SIP Calls: {}", s.sip_calls.len());
            for call in s.sip_calls.iter().take(SUMMARY_SESSION_LIMIT) {
                let methods: Vec<&str> = call.methods.iter().map(String::as_str).collect();
                let _ = writeln!(
                    out,
                    "- Call {}: {} packets over {:.2}s, methods: {}",
                    call.call_id,
                    call.packets,
                    call.duration_seconds,
                    methods.join(", ")
                );
            }
            more(&mut out, s.sip_calls.len(), "calls");
        }
        if !s.rtp_streams.is_empty() {
            let _ = writeln!(out, "RTP Streams: {}", s.rtp_streams.len());
            for stream in s.rtp_streams.iter().take(SUMMARY_SESSION_LIMIT) {
                let _ = writeln!(
                    out,
                    "- SSRC {:#010x}: {} packets, {} bytes over {:.2}s",
                    stream.ssrc, stream.packets, stream.bytes, stream.duration_seconds
                );
            }
            more(&mut out, s.rtp_streams.len(), "streams");
        }
        if !s.diameter_sessions.is_empty() {
            let _ = writeln!(out, "Diameter Sessions: {}", s.diameter_sessions.len());
            for session in s.diameter_sessions.iter().take(SUMMARY_SESSION_LIMIT) {
                let cmds: Vec<String> = session.commands.iter().map(u32::to_string).collect();
                let _ = writeln!(
                    out,
                    "- Session {}: {} packets over {:.2}s, commands: {}",
                    session.session_id,
                    session.packets,
                    session.duration_seconds,
                    cmds.join(", ")
                );
            }
            more(&mut out, s.diameter_sessions.len(), "sessions");
        }
        if !s.sctp_associations.is_empty() {
            let _ = writeln!(out, "SCTP Associations: {}", s.sctp_associations.len());
            for assoc in s.sctp_associations.iter().take(SUMMARY_SESSION_LIMIT) {
                let _ = writeln!(
                    out,
                    "- {}: {} packets, {} chunks over {:.2}s",
                    assoc.endpoints, assoc.packets, assoc.chunks, assoc.duration_seconds
                );
            }
            more(&mut out, s.sctp_associations.len(), "associations");
        }
    }

    if !report.errors.is_empty() {
        let _ = writeln!(out, "\nExtractor Errors:");
        for e in &report.errors {
            let _ = writeln!(out, "- {}: {}", e.extractor, e.message);
        }
    }

    out
}

fn more(out: &mut String, total: usize, noun: &str) {
    if total > SUMMARY_SESSION_LIMIT {
        let _ = writeln!(out, "... and {} more {}", total - SUMMARY_SESSION_LIMIT, noun);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{AnomalyKind, TcpFlags};
    use crate::models::Severity;
    use std::net::{IpAddr, Ipv4Addr};

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    fn syn_flood_capture() -> Vec<PacketRecord> {
        let mut packets: Vec<PacketRecord> = (0..150)
            .map(|i| {
                PacketRecord::new(1_700_000_000.0 + i as f64 * 0.01, 60)
                    .with_ip(ip(9), ip(1))
                    .with_tcp(40000 + i as u16, 80, TcpFlags::SYN)
            })
            .collect();
        packets.extend((0..10).map(|i| {
            PacketRecord::new(1_700_000_002.0 + i as f64 * 0.01, 60)
                .with_ip(ip(1), ip(9))
                .with_tcp(80, 40000 + i as u16, TcpFlags::SYN_ACK)
        }));
        packets
    }

    #[test]
    fn test_report_for_syn_flood() {
        let report = CaptureAnalyzer::default().analyze("flood.pcap", &syn_flood_capture());
        assert!(report.errors.is_empty());
        assert_eq!(report.basic_stats.total_packets, 160);
        assert_eq!(report.conversations.len(), 1);
        assert_eq!(report.anomalies.len(), 1);
        assert_eq!(report.anomalies[0].kind, AnomalyKind::SynFlood);
        assert_eq!(report.anomalies[0].severity, Severity::High);

        let summary = render_summary(&report);
        assert!(summary.starts_with("PCAP Analysis Summary\n"));
        assert!(summary.contains("File: flood.pcap"));
        assert!(summary.contains("Total Packets: 160"));
        assert!(summary.contains("- TCP: 160 packets (100.0%)"));
        assert!(summary.contains("- SYN Flood (high): 150 SYN packets"));
    }

    #[test]
    fn test_failed_extractor_does_not_abort_others() {
        let mut packets = syn_flood_capture();
        packets[3].timestamp = f64::NAN;
        let report = CaptureAnalyzer::default().analyze("broken.pcap", &packets);

        let failed: Vec<&str> = report.errors.iter().map(|e| e.extractor.as_str()).collect();
        assert!(failed.contains(&"basic_stats"));
        assert!(failed.contains(&"conversations"));
        assert_eq!(report.basic_stats, BasicStats::default());
        assert!(report.conversations.is_empty());
        // extractors that never read timestamps still produce their sections
        assert_eq!(report.protocol_stats.analyzed_packet_count, 160);
        assert_eq!(report.anomalies.len(), 1);
        assert!(render_summary(&report).contains("Extractor Errors:"));
    }

    #[test]
    fn test_empty_capture_summary() {
        let report = CaptureAnalyzer::default().analyze("empty.pcap", &[]);
        assert!(report.errors.is_empty());
        let summary = render_summary(&report);
        assert!(summary.contains("Total Packets: 0"));
        assert!(summary.contains("Average Packets/Second: 0.00"));
        assert!(!summary.contains("Protocol Distribution"));
        assert!(!summary.contains("Detected Anomalies"));
    }

    #[test]
    fn test_sessions_truncated_with_marker() {
        let packets: Vec<PacketRecord> = (0..8)
            .map(|i| {
                let call_id = format!("call-{}", i);
                PacketRecord::new(10.0, 400)
                    .with_layer("UDP")
                    .with_sip(Some(call_id.as_str()), Some("INVITE"))
            })
            .collect();
        let summary = render_summary(&CaptureAnalyzer::default().analyze("sip.pcap", &packets));
        assert!(summary.contains("SIP Calls: 8"));
        assert_eq!(summary.matches("- Call call-").count(), 5);
        assert!(summary.contains("... and 3 more calls"));
    }

    #[test]
    fn test_protocol_distribution_sorted_by_count() {
        let mut packets: Vec<PacketRecord> = (0..3)
            .map(|_| PacketRecord::new(0.0, 60).with_layer("UDP"))
            .collect();
        packets.push(PacketRecord::new(0.0, 60).with_layer("ARP"));
        let summary = render_summary(&CaptureAnalyzer::default().analyze("x.pcap", &packets));
        let udp = summary.find("- UDP:").unwrap();
        let arp = summary.find("- ARP:").unwrap();
        assert!(udp < arp);
    }
}

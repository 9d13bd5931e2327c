//! Threshold heuristics over a capture.
//!
//! Every rule is evaluated independently; any subset may fire. A rule whose
//! triggering protocol is absent contributes nothing.
//!
//! | Rule | Fires when | Severity |
//! |------|------------|----------|
//! | SYN flood | `syn / syn_ack > 3` and `syn > 100` | medium, high above ratio 10 |
//! | ICMP flood | ICMP share `> 0.3` and count `> 100` | medium, high above share 0.6 |
//! | DNS amplification | mean response size `> 500` over `> 50` responses | medium |
//! | Fragmentation | more than 100 fragmented packets | low |

use serde::{Deserialize, Serialize};

use crate::models::Severity;

use super::stats::ProtocolStats;
use super::{PacketRecord, Protocol};

/// Tunable limits for [`detect`]. Defaults reproduce the fixed constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyThresholds {
    pub syn_ratio_medium: f64,
    pub syn_ratio_high: f64,
    pub syn_min_count: usize,
    pub icmp_share_medium: f64,
    pub icmp_share_high: f64,
    pub icmp_min_count: usize,
    pub dns_response_avg_bytes: f64,
    pub dns_min_responses: usize,
    pub fragment_min_count: usize,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            syn_ratio_medium: 3.0,
            syn_ratio_high: 10.0,
            syn_min_count: 100,
            icmp_share_medium: 0.3,
            icmp_share_high: 0.6,
            icmp_min_count: 100,
            dns_response_avg_bytes: 500.0,
            dns_min_responses: 50,
            fragment_min_count: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    SynFlood,
    IcmpFlood,
    DnsAmplification,
    Fragmentation,
}

impl AnomalyKind {
    pub fn label(&self) -> &'static str {
        match self {
            AnomalyKind::SynFlood => "SYN Flood",
            AnomalyKind::IcmpFlood => "ICMP Flood",
            AnomalyKind::DnsAmplification => "DNS Amplification",
            AnomalyKind::Fragmentation => "Excessive Fragmentation",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub description: String,
    pub severity: Severity,
}

pub fn detect(
    packets: &[PacketRecord],
    protocol_stats: &ProtocolStats,
    thresholds: &AnomalyThresholds,
) -> Vec<Anomaly> {
    let mut anomalies = Vec::new();
    anomalies.extend(syn_flood(packets, thresholds));
    anomalies.extend(icmp_flood(protocol_stats, thresholds));
    anomalies.extend(dns_amplification(packets, thresholds));
    anomalies.extend(fragmentation(packets, thresholds));
    anomalies
}

/// Connection initiations (SYN without ACK) against acknowledgments (SYN+ACK).
fn syn_flood(packets: &[PacketRecord], t: &AnomalyThresholds) -> Option<Anomaly> {
    let (mut syn, mut syn_ack) = (0usize, 0usize);
    for flags in packets.iter().filter_map(|p| p.tcp_flags) {
        match (flags.syn, flags.ack) {
            (true, false) => syn += 1,
            (true, true) => syn_ack += 1,
            _ => {}
        }
    }
    if syn == 0 || syn_ack == 0 {
        return None;
    }

    let ratio = syn as f64 / syn_ack as f64;
    if ratio <= t.syn_ratio_medium || syn <= t.syn_min_count {
        return None;
    }
    let severity = if ratio > t.syn_ratio_high {
        Severity::High
    } else {
        Severity::Medium
    };
    Some(Anomaly {
        kind: AnomalyKind::SynFlood,
        description: format!(
            "{} SYN packets against {} SYN-ACK packets (ratio {:.1})",
            syn, syn_ack, ratio
        ),
        severity,
    })
}

fn icmp_flood(stats: &ProtocolStats, t: &AnomalyThresholds) -> Option<Anomaly> {
    let icmp = stats.count(Protocol::Icmp);
    if icmp == 0 || stats.analyzed_packet_count == 0 {
        return None;
    }

    let share = icmp as f64 / stats.analyzed_packet_count as f64;
    if share <= t.icmp_share_medium || icmp <= t.icmp_min_count {
        return None;
    }
    let severity = if share > t.icmp_share_high {
        Severity::High
    } else {
        Severity::Medium
    };
    Some(Anomaly {
        kind: AnomalyKind::IcmpFlood,
        description: format!(
            "ICMP is {:.1}% of analyzed traffic ({} packets)",
            share * 100.0,
            icmp
        ),
        severity,
    })
}

fn dns_amplification(packets: &[PacketRecord], t: &AnomalyThresholds) -> Option<Anomaly> {
    let sizes: Vec<u64> = packets
        .iter()
        .filter(|p| p.dns.is_some_and(|d| d.is_response))
        .map(|p| u64::from(p.length))
        .collect();
    if sizes.is_empty() {
        return None;
    }

    let avg = sizes.iter().sum::<u64>() as f64 / sizes.len() as f64;
    if avg <= t.dns_response_avg_bytes || sizes.len() <= t.dns_min_responses {
        return None;
    }
    Some(Anomaly {
        kind: AnomalyKind::DnsAmplification,
        description: format!(
            "{} DNS responses averaging {:.0} bytes",
            sizes.len(),
            avg
        ),
        severity: Severity::Medium,
    })
}

fn fragmentation(packets: &[PacketRecord], t: &AnomalyThresholds) -> Option<Anomaly> {
    let fragmented = packets
        .iter()
        .filter(|p| p.ip.is_some_and(|ip| ip.is_fragmented()))
        .count();
    if fragmented <= t.fragment_min_count {
        return None;
    }
    Some(Anomaly {
        kind: AnomalyKind::Fragmentation,
        description: format!("{} fragmented IP packets", fragmented),
        severity: Severity::Low,
    })
}

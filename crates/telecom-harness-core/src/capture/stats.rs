//! Aggregate packet statistics and protocol distribution.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{to_datetime, CaptureError, PacketRecord, Protocol};

/// Only the first this-many packets are tallied for the protocol
/// distribution. Percentages are relative to the tallied count.
pub const PROTOCOL_SAMPLE_LIMIT: usize = 10_000;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasicStats {
    pub total_packets: usize,
    pub total_bytes: u64,
    /// Last packet time minus first packet time; 0 for fewer than two packets.
    pub duration_seconds: f64,
    pub avg_packet_size: f64,
    pub avg_packets_per_second: f64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProtocolStats {
    pub analyzed_packet_count: usize,
    pub protocol_counts: BTreeMap<String, usize>,
    pub protocol_percentages: BTreeMap<String, f64>,
    pub layer_counts: BTreeMap<String, usize>,
    pub layer_percentages: BTreeMap<String, f64>,
}

impl ProtocolStats {
    pub fn count(&self, protocol: Protocol) -> usize {
        self.protocol_counts
            .get(protocol.name())
            .copied()
            .unwrap_or(0)
    }
}

pub fn basic_stats(packets: &[PacketRecord]) -> Result<BasicStats, CaptureError> {
    let (Some(first), Some(last)) = (packets.first(), packets.last()) else {
        return Ok(BasicStats::default());
    };

    for (index, packet) in packets.iter().enumerate() {
        to_datetime(index, packet.timestamp)?;
    }

    let total_packets = packets.len();
    let total_bytes: u64 = packets.iter().map(|p| u64::from(p.length)).sum();
    let start_time = to_datetime(0, first.timestamp)?;
    let end_time = to_datetime(total_packets - 1, last.timestamp)?;

    let duration_seconds = if total_packets > 1 {
        (last.timestamp - first.timestamp).max(0.0)
    } else {
        0.0
    };
    let avg_packets_per_second = if duration_seconds > 0.0 {
        total_packets as f64 / duration_seconds
    } else {
        0.0
    };

    Ok(BasicStats {
        total_packets,
        total_bytes,
        duration_seconds,
        avg_packet_size: total_bytes as f64 / total_packets as f64,
        avg_packets_per_second,
        start_time: Some(start_time),
        end_time: Some(end_time),
    })
}

pub fn protocol_stats(packets: &[PacketRecord]) -> ProtocolStats {
    let sample = &packets[..packets.len().min(PROTOCOL_SAMPLE_LIMIT)];
    let mut protocol_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut layer_counts: BTreeMap<String, usize> = BTreeMap::new();

    for packet in sample {
        for protocol in Protocol::ALL {
            if packet.has_layer(protocol.name()) {
                *protocol_counts.entry(protocol.name().to_string()).or_default() += 1;
            }
        }
        for layer in &packet.layers {
            *layer_counts.entry(layer.clone()).or_default() += 1;
        }
    }

    let analyzed = sample.len();
    ProtocolStats {
        analyzed_packet_count: analyzed,
        protocol_percentages: percentages(&protocol_counts, analyzed),
        layer_percentages: percentages(&layer_counts, analyzed),
        protocol_counts,
        layer_counts,
    }
}

fn percentages(counts: &BTreeMap<String, usize>, total: usize) -> BTreeMap<String, f64> {
    if total == 0 {
        return BTreeMap::new();
    }
    counts
        .iter()
        .map(|(k, &v)| (k.clone(), v as f64 / total as f64 * 100.0))
        .collect()
}

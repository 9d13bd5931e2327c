//! Heuristic gate for submitted log text.
//!
//! Text is accepted as a telecom log only when both hold:
//!
//! - at least half of the first [`SAMPLE_LINES`] non-blank lines carry a
//!   timestamp token, and
//! - a telecom-domain keyword occurs somewhere in the text.
//!
//! The check is a pure function of the text.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::logparse::has_timestamp;

/// Number of non-blank lines sampled for the timestamp ratio.
pub const SAMPLE_LINES: usize = 20;

/// Minimum share of sampled lines that must carry a timestamp.
pub const MIN_TIMESTAMP_RATIO: f64 = 0.5;

/// Telecom-domain vocabulary, matched case-insensitively on word boundaries.
pub const TELECOM_KEYWORDS: &[&str] = &[
    "network", "signal", "protocol", "node", "gateway", "bts", "bsc", "rnc", "msc", "hlr", "vlr",
    "hss", "sgsn", "ggsn", "mme", "sgw", "pgw", "enodeb", "gnodeb", "gnb", "cell", "sector",
    "antenna", "radio", "carrier", "trunk", "handover", "bearer", "rrc", "sip", "sctp",
    "diameter", "rtp", "gtp", "ims", "lte", "umts", "gsm", "5g", "volte", "ss7", "isup", "imsi",
    "msisdn", "apn", "pdu", "s1ap", "ngap", "x2", "alarm", "link", "interface", "router",
];

static KEYWORD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b(?:{})\b", TELECOM_KEYWORDS.join("|"))).expect("static regex")
});

/// Whether `text` is plausibly a telecom log. Empty input is invalid.
pub fn is_valid_log(text: &str) -> bool {
    let sample: Vec<&str> = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(SAMPLE_LINES)
        .collect();
    if sample.is_empty() {
        return false;
    }

    let stamped = sample.iter().filter(|l| has_timestamp(l)).count();
    let ratio = stamped as f64 / sample.len() as f64;
    if ratio < MIN_TIMESTAMP_RATIO {
        return false;
    }

    KEYWORD_RE.is_match(text)
}

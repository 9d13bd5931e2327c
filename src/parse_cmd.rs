//! `tlh parse`: run the log-line parser over a file without storing it.

use anyhow::{Context, Result};
use std::path::Path;

use telecom_harness_core::logparse::parse_log;
use telecom_harness_core::segment::segment;
use telecom_harness_core::validate::is_valid_log;

use crate::config::Config;

pub fn run_parse(config: &Config, path: &Path, json: bool, chunks: bool) -> Result<()> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let text = String::from_utf8_lossy(&bytes);
    let records = parse_log(&text);

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    println!("parse {}", path.display());
    println!("  valid telecom log: {}", is_valid_log(&text));
    println!("  lines: {}", records.len());
    let timestamped = records.iter().filter(|r| r.timestamp.is_some()).count();
    println!("  with timestamp: {}", timestamped);
    println!();

    for r in &records {
        println!(
            "{:<8} {:<26} {:<8} {:<12} {}",
            r.format.unwrap_or("-"),
            r.timestamp.as_deref().unwrap_or("-"),
            r.level.as_deref().unwrap_or("-"),
            r.component.as_deref().unwrap_or("-"),
            r.message
        );
    }

    if chunks {
        println!();
        for chunk in segment(&text, config.segmenting.max_chunk_bytes) {
            println!("--- chunk {} ({} bytes) ---", chunk.index, chunk.byte_len());
            print!("{}", chunk.text);
            if !chunk.text.ends_with('\n') {
                println!();
            }
        }
    }
    Ok(())
}

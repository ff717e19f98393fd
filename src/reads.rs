//! Read preprocessing ahead of alignment: quality trimming, adapter and
//! poly-A clipping, minimum-length filtering.
//!
//! Order matters: quality trimming first (it shortens the 3' end the adapter
//! may sit in), then adapter clipping, then poly-A clipping, then the length
//! filter. Output is always uncompressed FASTA/FASTQ written by the caller's
//! staging convention.

use crate::config::AlignConfig;
use crate::project::ReadFormat;
use anyhow::{anyhow, Result};
use needletail::parse_fastx_file;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const PHRED_OFFSET: u8 = 33;

#[derive(Debug, Default, Clone, Copy)]
pub struct PreprocessStats {
    pub kept: u64,
    pub discarded: u64,
}

/// Preprocess one read file into `out` (the caller stages and publishes).
pub fn preprocess_reads(
    input: &Path,
    out: &Path,
    format: ReadFormat,
    config: &AlignConfig,
) -> Result<PreprocessStats> {
    let mut reader = parse_fastx_file(input)
        .map_err(|e| anyhow!("failed to open read file {}: {e}", input.display()))?;
    let mut writer = BufWriter::new(File::create(out)?);
    let mut stats = PreprocessStats::default();

    while let Some(result) = reader.next() {
        let record =
            result.map_err(|e| anyhow!("failed to parse {}: {e}", input.display()))?;
        let mut seq = record.seq().to_vec();
        let mut qual = record.qual().map(|q| q.to_vec());

        if let (Some(cutoff), Some(q)) = (config.min_phred_score, qual.as_mut()) {
            let keep = trimmed_len_by_quality(q, cutoff);
            seq.truncate(keep);
            q.truncate(keep);
        }
        if let Some(adapter) = &config.adapter {
            if let Some(pos) = find_subsequence(&seq, adapter) {
                seq.truncate(pos);
                if let Some(q) = qual.as_mut() {
                    q.truncate(pos);
                }
            }
        }
        if config.poly_a_clipping {
            let keep = seq
                .iter()
                .rposition(|b| !matches!(b, b'A' | b'a'))
                .map_or(0, |i| i + 1);
            seq.truncate(keep);
            if let Some(q) = qual.as_mut() {
                q.truncate(keep);
            }
        }

        if seq.len() < config.min_read_length {
            stats.discarded += 1;
            continue;
        }
        stats.kept += 1;

        let id = record.id();
        match format {
            ReadFormat::Fasta => {
                writer.write_all(b">")?;
                writer.write_all(id)?;
                writer.write_all(b"\n")?;
                writer.write_all(&seq)?;
                writer.write_all(b"\n")?;
            }
            ReadFormat::Fastq => {
                let qual = qual.unwrap_or_else(|| vec![b'I'; seq.len()]);
                writer.write_all(b"@")?;
                writer.write_all(id)?;
                writer.write_all(b"\n")?;
                writer.write_all(&seq)?;
                writer.write_all(b"\n+\n")?;
                writer.write_all(&qual)?;
                writer.write_all(b"\n")?;
            }
        }
    }

    writer.flush()?;
    Ok(stats)
}

/// Length after trimming 3' bases whose Phred score is below `cutoff`.
fn trimmed_len_by_quality(qual: &[u8], cutoff: u8) -> usize {
    qual.iter()
        .rposition(|&q| q.saturating_sub(PHRED_OFFSET) >= cutoff)
        .map_or(0, |i| i + 1)
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle))
}

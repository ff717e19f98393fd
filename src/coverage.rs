//! Per-unit coverage computation over one replicon group.
//!
//! Reads the sample's alignment artifact, accumulates strand-split coverage
//! for the replicons of one group, and writes a single wiggle file (forward
//! track positive, reverse track negative). Multi-mapped reads contribute
//! 1/NH per alignment unless `unique_only` restricts counting to NH == 1.

use crate::config::CoverageConfig;
use crate::project::RepliconGroup;
use crate::types::{HashMap, HashMapExt};
use anyhow::{Context, Result};
use rust_htslib::bam;
use rust_htslib::bam::record::Aux;
use rust_htslib::bam::Read as HtsRead;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Debug, Default, Clone, Copy)]
pub struct CoverageStats {
    pub alignments_counted: u64,
    pub alignments_skipped: u64,
}

struct RepliconCoverage {
    forward: Vec<f64>,
    reverse: Vec<f64>,
}

/// Number of alignments reported for this read (NH tag), defaulting to 1.
pub(crate) fn hit_count(record: &bam::Record) -> u32 {
    match record.aux(b"NH") {
        Ok(Aux::U8(v)) => v as u32,
        Ok(Aux::U16(v)) => v as u32,
        Ok(Aux::U32(v)) => v,
        Ok(Aux::I8(v)) => v.max(1) as u32,
        Ok(Aux::I16(v)) => v.max(1) as u32,
        Ok(Aux::I32(v)) => v.max(1) as u32,
        _ => 1,
    }
    .max(1)
}

pub fn compute_coverage(
    alignment: &Path,
    group: &RepliconGroup,
    config: &CoverageConfig,
    out: &Path,
) -> Result<CoverageStats> {
    let mut reader = bam::Reader::from_path(alignment)
        .with_context(|| format!("failed to open alignment file {}", alignment.display()))?;

    // tid -> replicon name; only the group's replicons get coverage vectors.
    let (tid_names, tid_lens) = {
        let header = reader.header();
        let names: Vec<String> = header
            .target_names()
            .iter()
            .map(|n| String::from_utf8_lossy(n).to_string())
            .collect();
        let lens: Vec<usize> = (0..names.len())
            .map(|tid| header.target_len(tid as u32).unwrap_or(0) as usize)
            .collect();
        (names, lens)
    };
    let mut coverages: HashMap<usize, RepliconCoverage> = HashMap::new();
    for (tid, name) in tid_names.iter().enumerate() {
        if group.replicons.iter().any(|r| r == name) {
            coverages.insert(
                tid,
                RepliconCoverage {
                    forward: vec![0.0; tid_lens[tid]],
                    reverse: vec![0.0; tid_lens[tid]],
                },
            );
        }
    }

    let mut stats = CoverageStats::default();
    for result in reader.records() {
        let record = result?;
        if record.is_unmapped() || record.tid() < 0 {
            continue;
        }
        let Some(cov) = coverages.get_mut(&(record.tid() as usize)) else {
            continue;
        };
        let hits = hit_count(&record);
        if config.unique_only && hits > 1 {
            stats.alignments_skipped += 1;
            continue;
        }
        let weight = 1.0 / hits as f64;
        let start = record.pos().max(0) as usize;
        let end = record.cigar().end_pos().max(0) as usize;
        let track = if record.is_reverse() {
            &mut cov.reverse
        } else {
            &mut cov.forward
        };
        if config.first_base_only {
            let five_prime = if record.is_reverse() {
                end.saturating_sub(1)
            } else {
                start
            };
            if five_prime < track.len() {
                track[five_prime] += weight;
            }
        } else {
            for pos in start..end.min(track.len()) {
                track[pos] += weight;
            }
        }
        stats.alignments_counted += 1;
    }

    write_wiggle(out, group, &tid_names, &coverages)?;
    Ok(stats)
}

/// Wiggle output: a forward and a reverse track, variableStep, only nonzero
/// positions (1-based).
fn write_wiggle(
    out: &Path,
    group: &RepliconGroup,
    tid_names: &[String],
    coverages: &HashMap<usize, RepliconCoverage>,
) -> Result<()> {
    let mut writer = BufWriter::new(File::create(out)?);
    // Deterministic track order: group declaration order.
    let mut ordered: Vec<(&str, &RepliconCoverage)> = Vec::new();
    for name in &group.replicons {
        if let Some((tid, _)) = tid_names.iter().enumerate().find(|(_, n)| *n == name) {
            if let Some(cov) = coverages.get(&tid) {
                ordered.push((name, cov));
            }
        }
    }

    for (strand, sign) in [("forward", 1.0), ("reverse", -1.0)] {
        writeln!(
            writer,
            "track type=wiggle_0 name=\"{}_{strand}\"",
            group.name
        )?;
        for (name, cov) in &ordered {
            let track = if sign > 0.0 { &cov.forward } else { &cov.reverse };
            writeln!(writer, "variableStep chrom={name}")?;
            for (pos, value) in track.iter().enumerate() {
                if *value != 0.0 {
                    writeln!(writer, "{} {}", pos + 1, value * sign)?;
                }
            }
        }
    }
    writer.flush()?;
    Ok(())
}

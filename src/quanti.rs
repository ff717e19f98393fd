//! Gene-wise read quantification for one (sample, replicon group) unit.
//!
//! Features come from the project's annotation files; reads come from the
//! sample's alignment artifact. A read is attributed to every feature it
//! overlaps by at least `min_overlap` bases, weighted 1/NH per alignment.

use crate::annotation::Feature;
use crate::config::GeneQuantiConfig;
use crate::coverage::hit_count;
use crate::project::RepliconGroup;
use crate::types::{HashMap, HashMapExt};
use anyhow::{Context, Result};
use coitrees::{BasicCOITree, Interval, IntervalTree as CoitreeIntervalTree};
use rust_htslib::bam;
use rust_htslib::bam::Read as HtsRead;
use std::fs::File;
use std::path::Path;

#[derive(Debug, Default, Clone, Copy)]
pub struct QuantiStats {
    pub features_counted: usize,
    pub alignments_counted: u64,
}

/// Count reads per feature and write the unit's CSV table to `out`.
pub fn quantify(
    alignment: &Path,
    group: &RepliconGroup,
    features: &[Feature],
    config: &GeneQuantiConfig,
    out: &Path,
) -> Result<QuantiStats> {
    // Keep only the group's replicons and the configured feature types.
    let selected: Vec<&Feature> = features
        .iter()
        .filter(|f| {
            group.replicons.iter().any(|r| *r == f.seqname)
                && config.features.iter().any(|t| *t == f.feature_type)
        })
        .collect();

    // One interval tree per replicon, 1-based inclusive coordinates.
    let mut intervals: HashMap<&str, Vec<Interval<u32>>> = HashMap::new();
    for (idx, feature) in selected.iter().enumerate() {
        intervals
            .entry(feature.seqname.as_str())
            .or_default()
            .push(Interval::new(
                feature.start as i32,
                feature.end as i32,
                idx as u32,
            ));
    }
    let trees: HashMap<&str, BasicCOITree<u32, u32>> = intervals
        .iter()
        .map(|(name, ivs)| (*name, BasicCOITree::new(ivs)))
        .collect();

    let mut counts = vec![0.0f64; selected.len()];
    if config.pseudocounts {
        for count in &mut counts {
            *count += 1.0;
        }
    }

    let mut reader = bam::Reader::from_path(alignment)
        .with_context(|| format!("failed to open alignment file {}", alignment.display()))?;
    let tid_names: Vec<String> = reader
        .header()
        .target_names()
        .iter()
        .map(|n| String::from_utf8_lossy(n).to_string())
        .collect();

    let mut stats = QuantiStats {
        features_counted: selected.len(),
        ..Default::default()
    };
    let min_overlap = config.min_overlap as i32;
    for result in reader.records() {
        let record = result?;
        if record.is_unmapped() || record.tid() < 0 {
            continue;
        }
        let Some(tree) = trees.get(tid_names[record.tid() as usize].as_str()) else {
            continue;
        };
        let hits = hit_count(&record);
        if config.unique_only && hits > 1 {
            continue;
        }
        let weight = 1.0 / hits as f64;
        // 0-based half-open -> 1-based inclusive.
        let first = record.pos() as i32 + 1;
        let last = record.cigar().end_pos() as i32;
        let mut overlapped = false;
        tree.query(first, last, |node| {
            let overlap = node.last.min(last) - node.first.max(first) + 1;
            if overlap >= min_overlap {
                counts[node.metadata as usize] += weight;
                overlapped = true;
            }
        });
        if overlapped {
            stats.alignments_counted += 1;
        }
    }

    write_counts(out, &selected, &counts)?;
    Ok(stats)
}

fn write_counts(out: &Path, features: &[&Feature], counts: &[f64]) -> Result<()> {
    let mut writer = csv::Writer::from_writer(File::create(out)?);
    writer.write_record(["feature", "type", "replicon", "start", "end", "strand", "count"])?;
    for (feature, count) in features.iter().zip(counts) {
        let start = feature.start.to_string();
        let end = feature.end.to_string();
        let strand = feature.strand.to_string();
        let count = format!("{count:.2}");
        writer.write_record([
            feature.id.as_str(),
            feature.feature_type.as_str(),
            feature.seqname.as_str(),
            start.as_str(),
            end.as_str(),
            strand.as_str(),
            count.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

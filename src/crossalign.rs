//! Crossalign cleaning: specification grammar and cross-mapped read removal.
//!
//! The specification string maps organisms to the replicons that belong to
//! them: `ORG1:repl1,repl2;ORG2:repl3`. After alignment against a combined
//! reference, a read whose hits cannot all be attributed to a single declared
//! organism is considered cross-species contamination and is dropped from the
//! alignment artifact entirely.

use crate::error::{PipelineError, Result};
use crate::types::{HashMap, HashMapExt};
use anyhow::Context;
use indexmap::{IndexMap, IndexSet};
use rust_htslib::bam;
use rust_htslib::bam::Read as HtsRead;
use std::fmt;
use std::path::Path;

/// Parsed crossalign cleaning specification.
///
/// Organisms keep their declaration order; replicon lookup is O(1). An empty
/// spec means the feature is disabled.
#[derive(Debug, Clone, Default)]
pub struct CrossalignSpec {
    organisms: IndexMap<String, IndexSet<String>>,
    // replicon -> indices of the organisms declaring it. A replicon name may
    // legitimately occur under more than one organism.
    replicon_orgs: HashMap<String, Vec<usize>>,
}

impl CrossalignSpec {
    /// Parse a specification string. `None` or an empty string disables the
    /// feature and yields an empty spec.
    pub fn parse(raw: Option<&str>) -> Result<Self> {
        let raw = match raw {
            Some(s) if !s.trim().is_empty() => s.trim(),
            _ => return Ok(Self::default()),
        };

        let mut organisms: IndexMap<String, IndexSet<String>> = IndexMap::new();
        let mut replicon_orgs: HashMap<String, Vec<usize>> = HashMap::new();

        for clause in raw.split(';') {
            let (org, replicons) = clause.split_once(':').ok_or_else(|| {
                PipelineError::parse(format!(
                    "crossalign clause `{clause}` lacks a `:` between organism and replicons"
                ))
            })?;
            let org = org.trim();
            if org.is_empty() {
                return Err(PipelineError::parse(format!(
                    "crossalign clause `{clause}` has an empty organism name"
                )));
            }
            if organisms.contains_key(org) {
                return Err(PipelineError::parse(format!(
                    "organism `{org}` declared more than once in crossalign specification"
                )));
            }
            let org_idx = organisms.len();
            let mut set: IndexSet<String> = IndexSet::new();
            for replicon in replicons.split(',') {
                let replicon = replicon.trim();
                if replicon.is_empty() {
                    return Err(PipelineError::parse(format!(
                        "organism `{org}` declares an empty replicon identifier"
                    )));
                }
                if !set.insert(replicon.to_string()) {
                    return Err(PipelineError::parse(format!(
                        "replicon `{replicon}` declared more than once for organism `{org}`"
                    )));
                }
                replicon_orgs
                    .entry(replicon.to_string())
                    .or_default()
                    .push(org_idx);
            }
            organisms.insert(org.to_string(), set);
        }

        Ok(Self {
            organisms,
            replicon_orgs,
        })
    }

    /// True when at least one organism is declared.
    pub fn is_enabled(&self) -> bool {
        !self.organisms.is_empty()
    }

    pub fn organisms(&self) -> impl Iterator<Item = (&str, &IndexSet<String>)> {
        self.organisms.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Names of the organisms that declare `replicon`.
    pub fn organisms_for(&self, replicon: &str) -> Vec<&str> {
        match self.replicon_orgs.get(replicon) {
            Some(indices) => indices
                .iter()
                .filter_map(|&i| self.organisms.get_index(i).map(|(k, _)| k.as_str()))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Classify a read by the replicons it aligned to.
    ///
    /// A read is cross-mapped when no single declared organism explains every
    /// declared hit, i.e. the intersection of the declaring-organism sets is
    /// empty. Hits on replicons outside the specification impose no
    /// constraint.
    pub fn is_cross_mapped<'a>(&self, hits: impl IntoIterator<Item = &'a str>) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let mut candidates: Option<Vec<usize>> = None;
        for hit in hits {
            let Some(orgs) = self.replicon_orgs.get(hit) else {
                continue;
            };
            candidates = Some(match candidates {
                None => orgs.clone(),
                Some(prev) => prev.into_iter().filter(|i| orgs.contains(i)).collect(),
            });
            if let Some(c) = &candidates {
                if c.is_empty() {
                    return true;
                }
            }
        }
        false
    }
}

impl fmt::Display for CrossalignSpec {
    /// Re-serialize the grammar: organisms in declaration order, replicons
    /// sorted within each organism.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (org, replicons) in &self.organisms {
            if !first {
                write!(f, ";")?;
            }
            first = false;
            let mut sorted: Vec<&str> = replicons.iter().map(|s| s.as_str()).collect();
            sorted.sort_unstable();
            write!(f, "{org}:{}", sorted.join(","))?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CrossalignStats {
    pub reads_seen: u64,
    pub reads_cross_mapped: u64,
    pub records_written: u64,
}

/// Rewrite `bam_in` to `bam_out` with every alignment of a cross-mapped read
/// removed. Two passes: collect per-read replicon hits, then copy the
/// surviving records. The caller stages `bam_out` and publishes it atomically.
pub fn filter_cross_mapped(
    spec: &CrossalignSpec,
    bam_in: &Path,
    bam_out: &Path,
) -> anyhow::Result<CrossalignStats> {
    let mut reader = bam::Reader::from_path(bam_in)
        .with_context(|| format!("failed to open alignment file {}", bam_in.display()))?;
    let tid_to_replicon: Vec<String> = reader
        .header()
        .target_names()
        .iter()
        .map(|n| String::from_utf8_lossy(n).to_string())
        .collect();

    let mut hits: HashMap<Vec<u8>, Vec<usize>> = HashMap::new();
    for result in reader.records() {
        let record = result?;
        if record.is_unmapped() || record.tid() < 0 {
            continue;
        }
        let tid = record.tid() as usize;
        let entry = hits.entry(record.qname().to_vec()).or_default();
        if !entry.contains(&tid) {
            entry.push(tid);
        }
    }

    let mut stats = CrossalignStats {
        reads_seen: hits.len() as u64,
        ..Default::default()
    };
    let cross_mapped: crate::types::HashSet<Vec<u8>> = hits
        .into_iter()
        .filter(|(_, tids)| {
            spec.is_cross_mapped(tids.iter().map(|&t| tid_to_replicon[t].as_str()))
        })
        .map(|(name, _)| name)
        .collect();
    stats.reads_cross_mapped = cross_mapped.len() as u64;

    let mut reader = bam::Reader::from_path(bam_in)?;
    let header = bam::Header::from_template(reader.header());
    let mut writer = bam::Writer::from_path(bam_out, &header, bam::Format::Bam)
        .with_context(|| format!("failed to create filtered file {}", bam_out.display()))?;
    for result in reader.records() {
        let record = result?;
        if cross_mapped.contains(record.qname()) {
            continue;
        }
        writer.write(&record)?;
        stats.records_written += 1;
    }

    Ok(stats)
}

//! Fixed on-disk project layout, plus sample and replicon-group discovery.
//!
//! Every stage reads only from directories populated by strictly earlier
//! stages; all the path arithmetic that enforces that lives here so the
//! stages themselves never build paths by hand.

use crate::error::{PipelineError, Result};
use needletail::parse_fastx_file;
use std::fs;
use std::path::{Path, PathBuf};

pub const READS_DIR: &str = "input/reads";
pub const REFERENCES_DIR: &str = "input/references";
pub const ANNOTATIONS_DIR: &str = "input/annotations";
pub const PROCESSED_READS_DIR: &str = "output/align/processed_reads";
pub const ALIGNMENTS_DIR: &str = "output/align/alignments";
pub const COVERAGE_DIR: &str = "output/coverage";
pub const GENE_QUANTI_DIR: &str = "output/gene_quanti";
pub const DESEQ_DIR: &str = "output/deseq";

const ALL_DIRS: &[&str] = &[
    READS_DIR,
    REFERENCES_DIR,
    ANNOTATIONS_DIR,
    PROCESSED_READS_DIR,
    ALIGNMENTS_DIR,
    COVERAGE_DIR,
    GENE_QUANTI_DIR,
    DESEQ_DIR,
    "output/viz_align",
    "output/viz_gene_quanti",
    "output/viz_deseq",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadFormat {
    Fasta,
    Fastq,
}

impl ReadFormat {
    /// Detect from the file name, looking through a trailing `.gz`.
    pub fn detect(path: &Path) -> Option<ReadFormat> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        let name = name.strip_suffix(".gz").unwrap_or(&name);
        if name.ends_with(".fa") || name.ends_with(".fasta") {
            Some(ReadFormat::Fasta)
        } else if name.ends_with(".fq") || name.ends_with(".fastq") {
            Some(ReadFormat::Fastq)
        } else {
            None
        }
    }

    /// Extension used for processed (always uncompressed) read files.
    pub fn extension(&self) -> &'static str {
        match self {
            ReadFormat::Fasta => "fa",
            ReadFormat::Fastq => "fq",
        }
    }
}

/// One named unit of input data. In paired-end mode `mate` holds the `_p2`
/// file and `path` the `_p1` file.
#[derive(Debug, Clone)]
pub struct Sample {
    pub name: String,
    pub path: PathBuf,
    pub mate: Option<PathBuf>,
    pub format: ReadFormat,
}

/// One reference FASTA file and the replicons (sequence ids) it contains.
#[derive(Debug, Clone)]
pub struct RepliconGroup {
    pub name: String,
    pub fasta: PathBuf,
    pub replicons: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
}

impl Project {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Materialize the fixed folder layout. Idempotent.
    pub fn create(&self) -> Result<()> {
        for dir in ALL_DIRS {
            fs::create_dir_all(self.root.join(dir))?;
        }
        Ok(())
    }

    pub fn reads_dir(&self) -> PathBuf {
        self.root.join(READS_DIR)
    }

    pub fn references_dir(&self) -> PathBuf {
        self.root.join(REFERENCES_DIR)
    }

    pub fn annotations_dir(&self) -> PathBuf {
        self.root.join(ANNOTATIONS_DIR)
    }

    pub fn processed_reads_dir(&self) -> PathBuf {
        self.root.join(PROCESSED_READS_DIR)
    }

    pub fn alignments_dir(&self) -> PathBuf {
        self.root.join(ALIGNMENTS_DIR)
    }

    pub fn coverage_dir(&self) -> PathBuf {
        self.root.join(COVERAGE_DIR)
    }

    pub fn gene_quanti_dir(&self) -> PathBuf {
        self.root.join(GENE_QUANTI_DIR)
    }

    pub fn deseq_dir(&self) -> PathBuf {
        self.root.join(DESEQ_DIR)
    }

    pub fn viz_dir(&self, stage: &str) -> PathBuf {
        self.root.join("output").join(format!("viz_{stage}"))
    }

    // ── deterministic artifact paths ─────────────────────────────────────

    pub fn alignment_path(&self, sample: &str) -> PathBuf {
        self.alignments_dir().join(format!("{sample}_alignments.bam"))
    }

    pub fn processed_reads_path(&self, sample: &str, format: ReadFormat) -> PathBuf {
        self.processed_reads_dir()
            .join(format!("{sample}_processed.{}", format.extension()))
    }

    pub fn processed_mate_path(&self, sample: &str, format: ReadFormat) -> PathBuf {
        self.processed_reads_dir()
            .join(format!("{sample}_p2_processed.{}", format.extension()))
    }

    pub fn coverage_path(&self, sample: &str, group: &str) -> PathBuf {
        self.coverage_dir().join(format!("{sample}_{group}.wig"))
    }

    pub fn gene_quanti_path(&self, sample: &str, group: &str) -> PathBuf {
        self.gene_quanti_dir().join(format!("{sample}_{group}.csv"))
    }

    pub fn deseq_path(&self, cond_a: &str, cond_b: &str) -> PathBuf {
        self.deseq_dir()
            .join(format!("deseq_comp_{cond_a}_vs_{cond_b}.csv"))
    }

    // ── discovery ────────────────────────────────────────────────────────

    /// Discover input samples. Paired-end mode pairs `_p1`/`_p2` files into
    /// one sample; an unmatched member is a configuration error.
    pub fn discover_samples(&self, paired_end: bool) -> Result<Vec<Sample>> {
        let mut files: Vec<(String, PathBuf, ReadFormat)> = Vec::new();
        for entry in read_dir_sorted(&self.reads_dir())? {
            if let Some(format) = ReadFormat::detect(&entry) {
                let stem = read_file_stem(&entry);
                files.push((stem, entry, format));
            }
        }
        if files.is_empty() {
            return Err(PipelineError::abort(format!(
                "no read files found in {}",
                self.reads_dir().display()
            )));
        }

        let mut samples: Vec<Sample> = Vec::new();
        if paired_end {
            let mut pending_p1: Vec<(String, PathBuf, ReadFormat)> = Vec::new();
            let mut p2_files: Vec<(String, PathBuf)> = Vec::new();
            for (stem, path, format) in files {
                if let Some(base) = stem.strip_suffix("_p1") {
                    pending_p1.push((base.to_string(), path, format));
                } else if let Some(base) = stem.strip_suffix("_p2") {
                    p2_files.push((base.to_string(), path));
                } else {
                    return Err(PipelineError::config(
                        "paired_end",
                        format!("read file `{stem}` carries no _p1/_p2 pair suffix"),
                    ));
                }
            }
            for (base, p1, format) in pending_p1 {
                let mate_idx = p2_files.iter().position(|(b, _)| *b == base);
                let Some(mate_idx) = mate_idx else {
                    return Err(PipelineError::config(
                        "paired_end",
                        format!("read file `{base}_p1` lacks its _p2 mate"),
                    ));
                };
                let (_, p2) = p2_files.swap_remove(mate_idx);
                samples.push(Sample {
                    name: base,
                    path: p1,
                    mate: Some(p2),
                    format,
                });
            }
            if let Some((base, _)) = p2_files.first() {
                return Err(PipelineError::config(
                    "paired_end",
                    format!("read file `{base}_p2` lacks its _p1 mate"),
                ));
            }
        } else {
            for (stem, path, format) in files {
                if stem.ends_with("_p1") || stem.ends_with("_p2") {
                    return Err(PipelineError::config(
                        "paired_end",
                        format!("read file `{stem}` looks paired-end; pass --paired-end"),
                    ));
                }
                samples.push(Sample {
                    name: stem,
                    path,
                    mate: None,
                    format,
                });
            }
        }

        samples.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(samples)
    }

    /// Sample names recovered from the align stage's artifacts. Later stages
    /// read only what earlier stages produced.
    pub fn discover_aligned_samples(&self) -> Result<Vec<String>> {
        let mut samples: Vec<String> = Vec::new();
        for entry in read_dir_sorted(&self.alignments_dir())? {
            let name = entry
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if let Some(sample) = name.strip_suffix("_alignments.bam") {
                samples.push(sample.to_string());
            }
        }
        if samples.is_empty() {
            return Err(PipelineError::abort(format!(
                "no alignment artifacts in {}; run `align` first",
                self.alignments_dir().display()
            )));
        }
        samples.sort();
        Ok(samples)
    }

    /// Discover replicon groups: one group per reference FASTA, named after
    /// the file stem, listing the sequence ids it contains.
    pub fn discover_replicon_groups(&self) -> Result<Vec<RepliconGroup>> {
        let mut groups: Vec<RepliconGroup> = Vec::new();
        for entry in read_dir_sorted(&self.references_dir())? {
            if ReadFormat::detect(&entry) != Some(ReadFormat::Fasta) {
                continue;
            }
            let name = read_file_stem(&entry);
            let replicons = fasta_sequence_ids(&entry)?;
            if replicons.is_empty() {
                return Err(PipelineError::abort(format!(
                    "reference file {} contains no sequences",
                    entry.display()
                )));
            }
            groups.push(RepliconGroup {
                name,
                fasta: entry,
                replicons,
            });
        }
        if groups.is_empty() {
            return Err(PipelineError::abort(format!(
                "no reference FASTA files found in {}",
                self.references_dir().display()
            )));
        }
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(groups)
    }
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries: Vec<PathBuf> = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| {
        PipelineError::abort(format!("cannot read directory {}: {e}", dir.display()))
    })? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            entries.push(entry.path());
        }
    }
    entries.sort();
    Ok(entries)
}

/// File name without the read-format extension (and a possible `.gz`).
fn read_file_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = name.strip_suffix(".gz").unwrap_or(&name);
    for ext in [".fasta", ".fastq", ".fa", ".fq"] {
        if let Some(stem) = name.strip_suffix(ext) {
            return stem.to_string();
        }
    }
    name.to_string()
}

fn fasta_sequence_ids(path: &Path) -> Result<Vec<String>> {
    let mut reader = parse_fastx_file(path).map_err(|e| {
        PipelineError::abort(format!("failed to open reference {}: {e}", path.display()))
    })?;
    let mut ids = Vec::new();
    while let Some(result) = reader.next() {
        let record = result.map_err(|e| {
            PipelineError::abort(format!("failed to parse {}: {e}", path.display()))
        })?;
        let id = std::str::from_utf8(record.id())
            .unwrap_or("")
            .split_ascii_whitespace()
            .next()
            .unwrap_or("")
            .to_string();
        if !id.is_empty() {
            ids.push(id);
        }
    }
    Ok(ids)
}

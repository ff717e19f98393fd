//! Validated, immutable per-stage configuration.
//!
//! Each stage gets one config value, built from the raw CLI arguments exactly
//! once. Validation is pure: nothing here touches the filesystem, so a bad
//! invocation fails before any project directory is read or written. Compound
//! string options (crossalign specification, feature list, library list) are
//! parsed here and never passed on in raw form.

use crate::cli::{AlignArgs, CommonArgs, CoverageArgs, DeseqArgs, GeneQuantiArgs};
use crate::crossalign::CrossalignSpec;
use crate::error::{PipelineError, Result};
use crate::executor::ExecPolicy;
use crate::project::ReadFormat;
use std::path::PathBuf;

fn exec_policy(common: &CommonArgs) -> Result<ExecPolicy> {
    if common.processes < 1 {
        return Err(PipelineError::config(
            "processes",
            "process count must be at least 1",
        ));
    }
    Ok(ExecPolicy {
        processes: common.processes,
        check_existing: common.check_for_existing_files,
        progress: common.progress,
        abort_on_first_failure: common.abort_on_first_failure,
    })
}

#[derive(Debug, Clone)]
pub struct AlignConfig {
    pub exec: ExecPolicy,
    pub min_read_length: usize,
    pub accuracy: f64,
    pub evalue: f64,
    pub split: bool,
    pub paired_end: bool,
    pub poly_a_clipping: bool,
    pub min_phred_score: Option<u8>,
    pub adapter: Option<Vec<u8>>,
    pub aligner_bin: PathBuf,
    pub realign: bool,
    pub realigner_bin: Option<PathBuf>,
    pub crossalign: CrossalignSpec,
}

impl AlignConfig {
    pub fn from_args(args: &AlignArgs) -> Result<Self> {
        let exec = exec_policy(&args.common)?;
        if args.min_read_length < 1 {
            return Err(PipelineError::config(
                "min_read_length",
                "minimum read length must be at least 1",
            ));
        }
        if !args.accuracy.is_finite() || args.accuracy < 0.0 {
            return Err(PipelineError::config(
                "accuracy",
                "accuracy must be non-negative",
            ));
        }
        if !args.evalue.is_finite() || args.evalue < 0.0 {
            return Err(PipelineError::config(
                "evalue",
                "e-value must be non-negative",
            ));
        }
        if args.paired_end && args.poly_a_clipping {
            return Err(PipelineError::config(
                "poly_a_clipping",
                "poly-A clipping cannot be combined with paired-end mode",
            ));
        }
        let adapter = match &args.adapter {
            Some(seq) => {
                let seq = seq.trim().to_ascii_uppercase();
                if seq.is_empty() || !seq.bytes().all(|b| b.is_ascii_alphabetic()) {
                    return Err(PipelineError::config(
                        "adapter",
                        "adapter must be a non-empty nucleotide sequence",
                    ));
                }
                Some(seq.into_bytes())
            }
            None => None,
        };
        if args.realign && args.realigner_bin.is_none() {
            return Err(PipelineError::config(
                "realigner_bin",
                "a realigner binary is required with --realign",
            ));
        }
        let crossalign = CrossalignSpec::parse(args.crossalign_cleaning.as_deref())?;

        Ok(Self {
            exec,
            min_read_length: args.min_read_length,
            accuracy: args.accuracy,
            evalue: args.evalue,
            split: args.split,
            paired_end: args.paired_end,
            poly_a_clipping: args.poly_a_clipping,
            min_phred_score: args.min_phred_score,
            adapter,
            aligner_bin: args.aligner_bin.clone(),
            realign: args.realign,
            realigner_bin: args.realigner_bin.clone(),
            crossalign,
        })
    }

    /// Quality-based options only make sense for input formats that carry
    /// quality strings. Checked once sample formats are known.
    pub fn validate_read_format(&self, formats: &[ReadFormat]) -> Result<()> {
        let has_fasta = formats.iter().any(|f| *f == ReadFormat::Fasta);
        if has_fasta && self.min_phred_score.is_some() {
            return Err(PipelineError::config(
                "min_phred_score",
                "Phred trimming requires FASTQ input",
            ));
        }
        if has_fasta && self.adapter.is_some() {
            return Err(PipelineError::config(
                "adapter",
                "adapter clipping requires FASTQ input",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct CoverageConfig {
    pub exec: ExecPolicy,
    pub unique_only: bool,
    pub first_base_only: bool,
}

impl CoverageConfig {
    pub fn from_args(args: &CoverageArgs) -> Result<Self> {
        Ok(Self {
            exec: exec_policy(&args.common)?,
            unique_only: args.unique_only,
            first_base_only: args.first_base_only,
        })
    }
}

#[derive(Debug, Clone)]
pub struct GeneQuantiConfig {
    pub exec: ExecPolicy,
    pub min_overlap: usize,
    pub features: Vec<String>,
    pub unique_only: bool,
    pub pseudocounts: bool,
}

impl GeneQuantiConfig {
    pub fn from_args(args: &GeneQuantiArgs) -> Result<Self> {
        let exec = exec_policy(&args.common)?;
        if args.min_overlap < 1 {
            return Err(PipelineError::config(
                "min_overlap",
                "minimum overlap must be at least 1",
            ));
        }
        let features: Vec<String> = args
            .features
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if features.is_empty() {
            return Err(PipelineError::config(
                "features",
                "at least one feature type is required",
            ));
        }
        Ok(Self {
            exec,
            min_overlap: args.min_overlap,
            features,
            unique_only: args.unique_only,
            pseudocounts: args.pseudocounts,
        })
    }
}

#[derive(Debug, Clone)]
pub struct DeseqConfig {
    pub exec: ExecPolicy,
    pub libs: Vec<String>,
    pub conditions: Vec<String>,
    pub cooks_cutoff_off: bool,
    pub deseq_bin: PathBuf,
}

impl DeseqConfig {
    pub fn from_args(args: &DeseqArgs) -> Result<Self> {
        let exec = exec_policy(&args.common)?;
        let libs = split_list(&args.libs);
        let conditions = split_list(&args.conditions);
        if libs.is_empty() {
            return Err(PipelineError::config(
                "libs",
                "at least one library name is required",
            ));
        }
        if libs.len() != conditions.len() {
            return Err(PipelineError::config(
                "conditions",
                format!(
                    "{} libraries but {} condition labels; the lists must be parallel",
                    libs.len(),
                    conditions.len()
                ),
            ));
        }
        for (i, lib) in libs.iter().enumerate() {
            if libs[..i].contains(lib) {
                return Err(PipelineError::config(
                    "libs",
                    format!("library `{lib}` listed more than once"),
                ));
            }
        }
        Ok(Self {
            exec,
            libs,
            conditions,
            cooks_cutoff_off: args.cooks_cutoff_off,
            deseq_bin: args.deseq_bin.clone(),
        })
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "readflow",
    about = "RNA-seq pipeline: align reads, compute coverage, quantify genes, compare conditions",
    version
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Suppress progress output and set logging level to WARN
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the fixed project folder layout
    Create {
        /// Project root to create
        project_path: PathBuf,
    },
    /// Preprocess reads and align them against the reference replicons
    Align(AlignArgs),
    /// Compute per-replicon coverage from the alignments
    Coverage(CoverageArgs),
    /// Count reads per annotated feature
    GeneQuanti(GeneQuantiArgs),
    /// Run differential expression comparisons between conditions
    Deseq(DeseqArgs),
    /// Write the alignment visualization manifest
    VizAlign(VizArgs),
    /// Write the gene quantification visualization manifest
    VizGeneQuanti(VizArgs),
    /// Write the differential expression visualization manifest
    VizDeseq(VizArgs),
}

/// Options shared by every executing stage.
#[derive(ClapArgs, Debug, Clone)]
pub struct CommonArgs {
    /// Project root
    #[arg(default_value = ".")]
    pub project_path: PathBuf,

    /// Number of parallel worker processes
    #[arg(short = 'p', long, default_value_t = 1)]
    pub processes: usize,

    /// Skip units whose output artifact already exists
    #[arg(long)]
    pub check_for_existing_files: bool,

    /// Log a completed-unit counter while the stage runs
    #[arg(long)]
    pub progress: bool,

    /// Turn any unit failure into a stage abort (after all units finish)
    #[arg(long)]
    pub abort_on_first_failure: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct AlignArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Discard reads shorter than this after clipping
    #[arg(short = 'l', long, default_value_t = 12)]
    pub min_read_length: usize,

    /// Aligner accuracy (percent)
    #[arg(short = 'a', long, default_value_t = 95.0)]
    pub accuracy: f64,

    /// Aligner e-value cutoff
    #[arg(short = 'e', long, default_value_t = 5.0)]
    pub evalue: f64,

    /// Enable the aligner's split-read mode
    #[arg(short = 's', long)]
    pub split: bool,

    /// Reads are paired-end (`_p1`/`_p2` file pairs)
    #[arg(short = 'P', long)]
    pub paired_end: bool,

    /// Clip 3' poly-A tails before length filtering (single-end only)
    #[arg(long)]
    pub poly_a_clipping: bool,

    /// Trim 3' bases below this Phred score (FASTQ input only)
    #[arg(long)]
    pub min_phred_score: Option<u8>,

    /// Clip everything from the first occurrence of this adapter sequence
    #[arg(long)]
    pub adapter: Option<String>,

    /// Aligner binary
    #[arg(long, default_value = "segemehl.x")]
    pub aligner_bin: PathBuf,

    /// Run the realigner over each alignment artifact
    #[arg(long)]
    pub realign: bool,

    /// Realigner binary (required with --realign)
    #[arg(long)]
    pub realigner_bin: Option<PathBuf>,

    /// Crossalign cleaning specification, e.g. "OrgA:chr,plasmid;OrgB:chr2"
    #[arg(short = 'c', long, value_name = "SPEC")]
    pub crossalign_cleaning: Option<String>,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct CoverageArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Count only uniquely mapped reads (NH == 1)
    #[arg(short = 'u', long)]
    pub unique_only: bool,

    /// Add coverage only at each read's 5' base
    #[arg(short = 'b', long)]
    pub first_base_only: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct GeneQuantiArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Minimum read/feature overlap in bases
    #[arg(short = 'o', long, default_value_t = 1)]
    pub min_overlap: usize,

    /// Comma-separated feature types to count
    #[arg(short = 't', long, default_value = "gene,CDS,tRNA,rRNA")]
    pub features: String,

    /// Count only uniquely mapped reads (NH == 1)
    #[arg(short = 'u', long)]
    pub unique_only: bool,

    /// Add a pseudocount of one to every feature
    #[arg(long)]
    pub pseudocounts: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct DeseqArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Comma-separated library (sample) names
    #[arg(short = 'l', long)]
    pub libs: String,

    /// Comma-separated condition labels, parallel to --libs
    #[arg(short = 'c', long)]
    pub conditions: String,

    /// Disable Cook's distance cutoff in the statistics engine
    #[arg(long)]
    pub cooks_cutoff_off: bool,

    /// Differential expression engine binary
    #[arg(long, default_value = "run_deseq")]
    pub deseq_bin: PathBuf,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct VizArgs {
    /// Project root
    #[arg(default_value = ".")]
    pub project_path: PathBuf,
}

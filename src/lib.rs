//! readflow: orchestrate a multi-stage RNA-seq analysis pipeline.
//!
//! The pipeline runs over a fixed project layout: read preprocessing and
//! alignment (external aligner), per-replicon coverage, gene-wise read
//! quantification, differential-expression comparison (external statistics
//! engine), and visualization manifests. This crate owns the orchestration:
//! stage configuration, work-unit partitioning, the bounded worker pool, and
//! resumable re-runs via existing-output detection.
//!
//! # Library usage
//!
//! ```no_run
//! use readflow::crossalign::CrossalignSpec;
//! use readflow::executor::{run_units, ExecPolicy};
//!
//! let spec = CrossalignSpec::parse(Some("Ecoli:chr,plasmid;Vibrio:chr2"))?;
//! assert!(spec.is_cross_mapped(["chr", "chr2"]));
//!
//! // Stages build work units and hand them to the generic pool:
//! // let result = run_units(&units, &ExecPolicy::default(), |unit| { ... })?;
//! # Ok::<(), readflow::error::PipelineError>(())
//! ```

// Internal plumbing.
pub(crate) mod types;

// Public modules — the stable API surface the binary and tests use.
pub mod annotation;
pub mod cli;
pub mod config;
pub mod coverage;
pub mod crossalign;
pub mod error;
pub mod executor;
pub mod partition;
pub mod project;
pub mod quanti;
pub mod reads;
pub mod stages;
pub mod tools;

// Flat re-exports for the most commonly used types.
pub use config::{AlignConfig, CoverageConfig, DeseqConfig, GeneQuantiConfig};
pub use crossalign::CrossalignSpec;
pub use error::{PipelineError, UnitFailure};
pub use executor::{ExecPolicy, StageResult};
pub use partition::WorkUnit;
pub use project::{Project, ReadFormat, RepliconGroup, Sample};

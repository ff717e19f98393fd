//! Stage orchestration: one entry point per pipeline command.
//!
//! Every stage walks the same state machine
//! (`Validating -> Partitioning -> Executing -> Aggregating -> Done`), with
//! `Failed` reachable from validation (bad configuration or empty inputs,
//! before any subprocess runs) or, under abort-on-first-failure, from
//! aggregation. Stages never overlap: the executor's join barrier completes
//! before aggregation starts.

use crate::annotation::{self, Feature};
use crate::config::{AlignConfig, CoverageConfig, DeseqConfig, GeneQuantiConfig};
use crate::coverage;
use crate::crossalign;
use crate::error::{PipelineError, Result};
use crate::executor::{run_units, StageResult};
use crate::partition::{self, WorkUnit};
use crate::project::{Project, RepliconGroup, Sample};
use crate::quanti;
use crate::reads;
use crate::tools;
use crate::types::{HashMap, HashMapExt};
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    NotStarted,
    Validating,
    Partitioning,
    Executing,
    Aggregating,
    Done,
    Failed,
}

/// Tracks one stage invocation through its states, for the debug log.
struct StageRun {
    name: &'static str,
    state: StageState,
}

impl StageRun {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            state: StageState::NotStarted,
        }
    }

    fn advance(&mut self, to: StageState) {
        tracing::debug!(stage = self.name, from = ?self.state, to = ?to, "stage transition");
        self.state = to;
    }
}

/// Drive a partitioned stage through execution and aggregation.
fn drive<F>(
    run: &mut StageRun,
    units: Vec<WorkUnit>,
    policy: &crate::executor::ExecPolicy,
    unit_fn: F,
) -> Result<StageResult>
where
    F: Fn(&WorkUnit) -> anyhow::Result<()> + Sync,
{
    run.advance(StageState::Executing);
    let result = match run_units(&units, policy, unit_fn) {
        Ok(result) => result,
        Err(err) => {
            run.advance(StageState::Failed);
            return Err(err);
        }
    };
    run.advance(StageState::Aggregating);
    tracing::info!(
        stage = run.name,
        executed = result.executed,
        skipped = result.skipped,
        failed = result.failures.len(),
        "stage complete"
    );
    for failure in &result.failures {
        tracing::warn!(stage = run.name, unit = %failure.unit, "unit failed: {}", failure.message);
    }
    run.advance(StageState::Done);
    Ok(result)
}

pub fn create_project(path: &Path) -> Result<()> {
    let project = Project::new(path);
    project.create()?;
    tracing::info!(project = %path.display(), "created project folder layout");
    Ok(())
}

pub fn run_align(project_path: &Path, config: &AlignConfig) -> Result<StageResult> {
    let mut run = StageRun::new("align");
    run.advance(StageState::Validating);
    let project = Project::new(project_path);
    let samples = project.discover_samples(config.paired_end).map_err(|e| {
        run.advance(StageState::Failed);
        e
    })?;
    let formats: Vec<_> = samples.iter().map(|s| s.format).collect();
    if let Err(e) = config.validate_read_format(&formats) {
        run.advance(StageState::Failed);
        return Err(e);
    }
    let groups = project.discover_replicon_groups().map_err(|e| {
        run.advance(StageState::Failed);
        e
    })?;
    let references: Vec<PathBuf> = groups.iter().map(|g| g.fasta.clone()).collect();

    run.advance(StageState::Partitioning);
    let units = partition::align_units(&project, &samples)?;
    let by_name: HashMap<&str, &Sample> = {
        let mut map = HashMap::new();
        for sample in &samples {
            map.insert(sample.name.as_str(), sample);
        }
        map
    };

    drive(&mut run, units, &config.exec, |unit| {
        let sample = by_name
            .get(unit.sample.as_str())
            .copied()
            .context("unknown sample in work unit")?;
        align_one(&project, config, sample, &references, &unit.expected_output)
    })
}

/// One align unit: preprocess reads, invoke the aligner, optionally realign
/// and crossalign-clean, then publish the artifact.
fn align_one(
    project: &Project,
    config: &AlignConfig,
    sample: &Sample,
    references: &[PathBuf],
    output: &Path,
) -> anyhow::Result<()> {
    let mut processed: Vec<PathBuf> = Vec::new();
    let p1_out = project.processed_reads_path(&sample.name, sample.format);
    preprocess_one(&sample.path, &p1_out, sample, config)?;
    processed.push(p1_out);
    if let Some(mate) = &sample.mate {
        let p2_out = project.processed_mate_path(&sample.name, sample.format);
        preprocess_one(mate, &p2_out, sample, config)?;
        processed.push(p2_out);
    }

    let staged = tools::staging_path(output);
    let mut cmd = tools::aligner_command(config, &processed, references, &staged);
    tools::run_tool_expecting(&mut cmd, &staged)?;

    if config.realign {
        if let Some(bin) = &config.realigner_bin {
            let restaged = staged.with_extension("tmp.realigned");
            let mut cmd = tools::realigner_command(bin, &staged, &restaged);
            tools::run_tool_expecting(&mut cmd, &restaged)?;
            fs::rename(&restaged, &staged)?;
        }
    }

    if config.crossalign.is_enabled() {
        let filtered = staged.with_extension("tmp.filtered");
        let stats = crossalign::filter_cross_mapped(&config.crossalign, &staged, &filtered)?;
        tracing::info!(
            sample = %sample.name,
            reads = stats.reads_seen,
            cross_mapped = stats.reads_cross_mapped,
            "crossalign cleaning"
        );
        fs::rename(&filtered, &staged)?;
    }

    tools::publish(output)?;
    Ok(())
}

fn preprocess_one(
    input: &Path,
    output: &Path,
    sample: &Sample,
    config: &AlignConfig,
) -> anyhow::Result<()> {
    let staged = tools::staging_path(output);
    let stats = reads::preprocess_reads(input, &staged, sample.format, config)?;
    tools::publish(output)?;
    tracing::debug!(
        sample = %sample.name,
        kept = stats.kept,
        discarded = stats.discarded,
        "preprocessed reads"
    );
    Ok(())
}

pub fn run_coverage(project_path: &Path, config: &CoverageConfig) -> Result<StageResult> {
    let mut run = StageRun::new("coverage");
    run.advance(StageState::Validating);
    let project = Project::new(project_path);
    let samples = project.discover_aligned_samples().map_err(|e| {
        run.advance(StageState::Failed);
        e
    })?;
    let groups = project.discover_replicon_groups().map_err(|e| {
        run.advance(StageState::Failed);
        e
    })?;

    run.advance(StageState::Partitioning);
    let units = partition::coverage_units(&project, &samples, &groups)?;
    let by_name: HashMap<&str, &RepliconGroup> =
        groups.iter().map(|g| (g.name.as_str(), g)).collect();

    drive(&mut run, units, &config.exec, |unit| {
        let group = lookup_group(&by_name, unit)?;
        let staged = tools::staging_path(&unit.expected_output);
        coverage::compute_coverage(&unit.inputs[0], group, config, &staged)?;
        tools::publish(&unit.expected_output)
    })
}

pub fn run_gene_quanti(project_path: &Path, config: &GeneQuantiConfig) -> Result<StageResult> {
    let mut run = StageRun::new("gene_quanti");
    run.advance(StageState::Validating);
    let project = Project::new(project_path);
    let samples = project.discover_aligned_samples().map_err(|e| {
        run.advance(StageState::Failed);
        e
    })?;
    let groups = project.discover_replicon_groups().map_err(|e| {
        run.advance(StageState::Failed);
        e
    })?;
    let features = load_all_features(&project).map_err(|e| {
        run.advance(StageState::Failed);
        e
    })?;

    run.advance(StageState::Partitioning);
    let units = partition::gene_quanti_units(&project, &samples, &groups)?;
    let by_name: HashMap<&str, &RepliconGroup> =
        groups.iter().map(|g| (g.name.as_str(), g)).collect();

    drive(&mut run, units, &config.exec, |unit| {
        let group = lookup_group(&by_name, unit)?;
        let staged = tools::staging_path(&unit.expected_output);
        quanti::quantify(&unit.inputs[0], group, &features, config, &staged)?;
        tools::publish(&unit.expected_output)
    })
}

fn lookup_group<'a>(
    by_name: &HashMap<&str, &'a RepliconGroup>,
    unit: &WorkUnit,
) -> anyhow::Result<&'a RepliconGroup> {
    unit.replicon_group
        .as_deref()
        .and_then(|name| by_name.get(name).copied())
        .context("work unit references an unknown replicon group")
}

fn load_all_features(project: &Project) -> Result<Vec<Feature>> {
    let mut features = Vec::new();
    let dir = project.annotations_dir();
    let mut entries: Vec<PathBuf> = fs::read_dir(&dir)
        .map_err(|e| PipelineError::abort(format!("cannot read {}: {e}", dir.display())))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| annotation::detect_format(p).is_ok())
        .collect();
    entries.sort();
    if entries.is_empty() {
        return Err(PipelineError::abort(format!(
            "no annotation files found in {}",
            dir.display()
        )));
    }
    for path in entries {
        let mut loaded = annotation::load_features(&path).map_err(|e| {
            PipelineError::abort(format!("failed to load {}: {e:#}", path.display()))
        })?;
        features.append(&mut loaded);
    }
    if features.is_empty() {
        return Err(PipelineError::abort(format!(
            "annotation files in {} contained no features",
            dir.display()
        )));
    }
    Ok(features)
}

pub fn run_deseq(project_path: &Path, config: &DeseqConfig) -> Result<StageResult> {
    let mut run = StageRun::new("deseq");
    run.advance(StageState::Validating);
    let project = Project::new(project_path);

    run.advance(StageState::Partitioning);
    let units = partition::deseq_units(&project, config)?;
    let counts_dir = project.gene_quanti_dir();

    drive(&mut run, units, &config.exec, |unit| {
        // The unit's sample field is "<condA>_vs_<condB>"; select the
        // libraries belonging to those two conditions.
        let (cond_a, cond_b) = unit
            .sample
            .split_once("_vs_")
            .context("malformed comparison unit")?;
        let mut libs: Vec<&str> = Vec::new();
        let mut conditions: Vec<&str> = Vec::new();
        for (lib, cond) in config.libs.iter().zip(&config.conditions) {
            if cond == cond_a || cond == cond_b {
                libs.push(lib);
                conditions.push(cond);
            }
        }
        let staged = tools::staging_path(&unit.expected_output);
        let mut cmd = tools::deseq_command(config, &counts_dir, &libs, &conditions, &staged);
        tools::run_tool_expecting(&mut cmd, &staged)?;
        tools::publish(&unit.expected_output)
    })
}

/// Upstream stage whose artifacts a viz command consumes.
#[derive(Debug, Clone, Copy)]
pub enum VizStage {
    Align,
    GeneQuanti,
    Deseq,
}

impl VizStage {
    fn name(&self) -> &'static str {
        match self {
            VizStage::Align => "align",
            VizStage::GeneQuanti => "gene_quanti",
            VizStage::Deseq => "deseq",
        }
    }

    fn upstream_dir(&self, project: &Project) -> PathBuf {
        match self {
            VizStage::Align => project.alignments_dir(),
            VizStage::GeneQuanti => project.gene_quanti_dir(),
            VizStage::Deseq => project.deseq_dir(),
        }
    }
}

/// Rendering is delegated; this writes the artifact manifest the renderer
/// consumes, after checking the upstream stage actually produced output.
pub fn run_viz(project_path: &Path, stage: VizStage) -> Result<()> {
    let project = Project::new(project_path);
    let upstream = stage.upstream_dir(&project);
    let mut artifacts: Vec<(String, u64)> = Vec::new();
    for entry in fs::read_dir(&upstream)
        .map_err(|e| PipelineError::abort(format!("cannot read {}: {e}", upstream.display())))?
    {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        // `.tmp` anywhere in the name covers staged outputs and the
        // intermediate realigner/crossalign files a crashed run leaves behind.
        if name.contains(".tmp") || !entry.file_type()?.is_file() {
            continue;
        }
        artifacts.push((name, entry.metadata()?.len()));
    }
    if artifacts.is_empty() {
        return Err(PipelineError::abort(format!(
            "no artifacts in {}; run `{}` first",
            upstream.display(),
            stage.name()
        )));
    }
    artifacts.sort();

    let manifest = project.viz_dir(stage.name()).join("manifest.csv");
    let staged = tools::staging_path(&manifest);
    {
        let mut writer = csv::Writer::from_writer(
            fs::File::create(&staged).map_err(PipelineError::Io)?,
        );
        write_manifest(&mut writer, &artifacts)
            .map_err(|e| PipelineError::abort(format!("failed to write manifest: {e}")))?;
    }
    fs::rename(&staged, &manifest)?;
    tracing::info!(stage = stage.name(), artifacts = artifacts.len(), "wrote viz manifest");
    Ok(())
}

fn write_manifest(
    writer: &mut csv::Writer<fs::File>,
    artifacts: &[(String, u64)],
) -> csv::Result<()> {
    writer.write_record(["artifact", "size_bytes"])?;
    for (name, size) in artifacts {
        let size = size.to_string();
        writer.write_record([name.as_str(), size.as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

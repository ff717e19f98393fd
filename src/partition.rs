//! Unit-of-work partitioning.
//!
//! Each stage turns its discovered inputs into an ordered list of independent
//! [`WorkUnit`]s before anything executes. Ordering is deterministic (sample
//! name, then replicon-group name) so that resumption and logs are
//! reproducible, and expected output paths are checked for uniqueness —
//! distinct units never write the same file, which is the only
//! concurrency-safety mechanism the executor relies on.

use crate::config::DeseqConfig;
use crate::error::{PipelineError, Result};
use crate::project::{Project, RepliconGroup, Sample};
use crate::types::{HashSet, HashSetExt};
use std::path::PathBuf;

/// One (sample, replicon-group) pair to be processed by one tool invocation.
#[derive(Debug, Clone)]
pub struct WorkUnit {
    pub sample: String,
    pub replicon_group: Option<String>,
    pub inputs: Vec<PathBuf>,
    pub expected_output: PathBuf,
}

impl WorkUnit {
    /// Stable identity used in logs and failure reports.
    pub fn id(&self) -> String {
        match &self.replicon_group {
            Some(group) => format!("{}/{}", self.sample, group),
            None => self.sample.clone(),
        }
    }
}

/// One unit per sample; a paired-end sample keeps both mates in one unit.
pub fn align_units(project: &Project, samples: &[Sample]) -> Result<Vec<WorkUnit>> {
    let mut units: Vec<WorkUnit> = samples
        .iter()
        .map(|sample| {
            let mut inputs = vec![sample.path.clone()];
            if let Some(mate) = &sample.mate {
                inputs.push(mate.clone());
            }
            WorkUnit {
                sample: sample.name.clone(),
                replicon_group: None,
                inputs,
                expected_output: project.alignment_path(&sample.name),
            }
        })
        .collect();
    finish(&mut units)?;
    Ok(units)
}

/// Full sample × replicon-group cross product over alignment artifacts.
/// Sample names come from the artifacts of the align stage.
pub fn coverage_units(
    project: &Project,
    samples: &[String],
    groups: &[RepliconGroup],
) -> Result<Vec<WorkUnit>> {
    cross_units(samples, groups, |sample, group| {
        (
            vec![project.alignment_path(sample)],
            project.coverage_path(sample, &group.name),
        )
    })
}

pub fn gene_quanti_units(
    project: &Project,
    samples: &[String],
    groups: &[RepliconGroup],
) -> Result<Vec<WorkUnit>> {
    cross_units(samples, groups, |sample, group| {
        (
            vec![project.alignment_path(sample)],
            project.gene_quanti_path(sample, &group.name),
        )
    })
}

/// One unit per unordered condition pair, in first-appearance order of the
/// condition labels.
pub fn deseq_units(project: &Project, config: &DeseqConfig) -> Result<Vec<WorkUnit>> {
    let mut conditions: Vec<&str> = Vec::new();
    for cond in &config.conditions {
        if !conditions.contains(&cond.as_str()) {
            conditions.push(cond);
        }
    }
    let mut units = Vec::new();
    for (i, cond_a) in conditions.iter().enumerate() {
        for cond_b in &conditions[i + 1..] {
            units.push(WorkUnit {
                sample: format!("{cond_a}_vs_{cond_b}"),
                replicon_group: None,
                inputs: vec![project.gene_quanti_dir()],
                expected_output: project.deseq_path(cond_a, cond_b),
            });
        }
    }
    finish(&mut units)?;
    Ok(units)
}

fn cross_units(
    samples: &[String],
    groups: &[RepliconGroup],
    mut paths: impl FnMut(&str, &RepliconGroup) -> (Vec<PathBuf>, PathBuf),
) -> Result<Vec<WorkUnit>> {
    let mut units = Vec::with_capacity(samples.len() * groups.len());
    for sample in samples {
        for group in groups {
            let (inputs, expected_output) = paths(sample, group);
            units.push(WorkUnit {
                sample: sample.clone(),
                replicon_group: Some(group.name.clone()),
                inputs,
                expected_output,
            });
        }
    }
    finish(&mut units)?;
    Ok(units)
}

fn finish(units: &mut [WorkUnit]) -> Result<()> {
    units.sort_by(|a, b| {
        (a.sample.as_str(), a.replicon_group.as_deref())
            .cmp(&(b.sample.as_str(), b.replicon_group.as_deref()))
    });
    let mut outputs: HashSet<&PathBuf> = HashSet::new();
    for unit in units.iter() {
        if !outputs.insert(&unit.expected_output) {
            return Err(PipelineError::abort(format!(
                "two work units share the output path {}",
                unit.expected_output.display()
            )));
        }
    }
    Ok(())
}

//! External tool invocation and atomic artifact publishing.
//!
//! Every external collaborator (aligner, realigner, differential-expression
//! engine) is an opaque subprocess: we build its argument list, run it to
//! completion, capture stderr, and interpret the exit status. Writers stage
//! their artifact at `<output>.tmp` and rename it into place on success, so
//! the resumability guard can equate presence with completeness.

use crate::config::{AlignConfig, DeseqConfig};
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Staging sibling of an output artifact.
pub fn staging_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    output.with_file_name(name)
}

/// Atomically publish a staged artifact (rename within one directory).
pub fn publish(output: &Path) -> Result<()> {
    let staged = staging_path(output);
    fs::rename(&staged, output)
        .with_context(|| format!("failed to publish {}", output.display()))?;
    Ok(())
}

/// Run a subprocess to completion. Non-zero exit becomes an error carrying
/// the captured stderr.
pub fn run_tool(cmd: &mut Command) -> Result<()> {
    let program = cmd.get_program().to_string_lossy().to_string();
    let output = cmd
        .output()
        .with_context(|| format!("failed to spawn `{program}`; is it installed?"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "`{program}` exited with {}: {}",
            output.status,
            stderr.trim()
        );
    }
    Ok(())
}

/// Run a subprocess that must leave an artifact at `staged`.
pub fn run_tool_expecting(cmd: &mut Command, staged: &Path) -> Result<()> {
    run_tool(cmd)?;
    if !staged.exists() {
        let program = cmd.get_program().to_string_lossy();
        bail!(
            "`{program}` exited successfully but produced no output at {}",
            staged.display()
        );
    }
    Ok(())
}

/// Aligner invocation for one sample. `reads` holds one file, or two in
/// paired-end mode; the tool writes the alignment artifact to `out`.
pub fn aligner_command(
    config: &AlignConfig,
    reads: &[PathBuf],
    references: &[PathBuf],
    out: &Path,
) -> Command {
    let mut cmd = Command::new(&config.aligner_bin);
    cmd.arg("--accuracy")
        .arg(config.accuracy.to_string())
        .arg("--evalue")
        .arg(config.evalue.to_string());
    if config.split {
        cmd.arg("--split");
    }
    for reference in references {
        cmd.arg("-d").arg(reference);
    }
    cmd.arg("-q").arg(&reads[0]);
    if let Some(mate) = reads.get(1) {
        cmd.arg("-p").arg(mate);
    }
    cmd.arg("-o").arg(out);
    cmd
}

/// Realigner invocation over one alignment artifact.
pub fn realigner_command(bin: &Path, alignment: &Path, out: &Path) -> Command {
    let mut cmd = Command::new(bin);
    cmd.arg("-i").arg(alignment).arg("-o").arg(out);
    cmd
}

/// Differential-expression engine invocation for one condition pair.
/// Contract: reads per-library count tables from `counts_dir`, writes one
/// comparison artifact to `out`, exits zero on success.
pub fn deseq_command(
    config: &DeseqConfig,
    counts_dir: &Path,
    libs: &[&str],
    conditions: &[&str],
    out: &Path,
) -> Command {
    let mut cmd = Command::new(&config.deseq_bin);
    cmd.arg("--counts-dir")
        .arg(counts_dir)
        .arg("--libs")
        .arg(libs.join(","))
        .arg("--conditions")
        .arg(conditions.join(","));
    if config.cooks_cutoff_off {
        cmd.arg("--no-cooks-cutoff");
    }
    cmd.arg("--output").arg(out);
    cmd
}

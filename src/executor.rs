//! Bounded worker pool over work units, with the resumability guard.
//!
//! One generic fan-out/fan-in loop serves every stage: the stage supplies its
//! units and a unit-execution function, the pool runs up to `processes` units
//! concurrently, and per-unit failures are recorded rather than raised so
//! sibling units always run to completion. Workers share nothing but the
//! failure list behind a mutex; each unit writes only its own output path
//! (guaranteed by the partitioner), so no further synchronization exists
//! beyond the join barrier at stage end.

use crate::error::{PipelineError, Result, UnitFailure};
use crate::partition::WorkUnit;
use crossfire::mpmc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;

#[derive(Debug, Clone, Copy)]
pub struct ExecPolicy {
    /// Worker pool size; 1 runs fully sequentially.
    pub processes: usize,
    /// Skip units whose expected output artifact already exists.
    pub check_existing: bool,
    /// Emit a completed-unit counter while executing.
    pub progress: bool,
    /// Upgrade a nonempty failure list to a stage abort at aggregation time.
    pub abort_on_first_failure: bool,
}

impl Default for ExecPolicy {
    fn default() -> Self {
        Self {
            processes: 1,
            check_existing: false,
            progress: false,
            abort_on_first_failure: false,
        }
    }
}

/// Aggregated outcome of one stage.
#[derive(Debug, Default)]
pub struct StageResult {
    /// Units that ran to completion.
    pub executed: usize,
    /// Units skipped because their output already existed.
    pub skipped: usize,
    /// Units whose execution failed; never aborts siblings.
    pub failures: Vec<UnitFailure>,
}

impl StageResult {
    /// Units actually dispatched (executed + failed), excluding skips.
    pub fn attempted(&self) -> usize {
        self.executed + self.failures.len()
    }

    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run `run` over every unit with at most `policy.processes` in flight.
///
/// An empty unit list is a stage abort (nothing to do means a misconfigured
/// or empty project, not a silent no-op). The resumability guard runs before
/// dispatch: writers publish outputs atomically, so an existing file at a
/// unit's expected path implies a completed prior run.
pub fn run_units<F>(units: &[WorkUnit], policy: &ExecPolicy, run: F) -> Result<StageResult>
where
    F: Fn(&WorkUnit) -> anyhow::Result<()> + Sync,
{
    if units.is_empty() {
        return Err(PipelineError::abort("no work units could be partitioned"));
    }

    let mut to_run: Vec<&WorkUnit> = Vec::with_capacity(units.len());
    let mut skipped = 0usize;
    for unit in units {
        if policy.check_existing && unit.expected_output.exists() {
            tracing::info!(unit = %unit.id(), output = %unit.expected_output.display(),
                "output exists, skipping");
            skipped += 1;
        } else {
            to_run.push(unit);
        }
    }

    let total = to_run.len();
    let failures: Mutex<Vec<UnitFailure>> = Mutex::new(Vec::new());
    let completed = AtomicUsize::new(0);

    let execute_one = |unit: &WorkUnit| {
        if let Err(err) = run(unit) {
            if let Ok(mut failures) = failures.lock() {
                failures.push(UnitFailure {
                    unit: unit.id(),
                    message: format!("{err:#}"),
                });
            }
        }
        let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
        if policy.progress {
            tracing::info!(completed = done, total, "unit finished");
        }
    };

    if policy.processes <= 1 || total <= 1 {
        for &unit in &to_run {
            execute_one(unit);
        }
    } else {
        crossfire::detect_backoff_cfg();
        let worker_count = policy.processes.min(total);
        let cap = worker_count.saturating_mul(4).max(8);
        let (tx_work, rx_work) = mpmc::bounded_blocking::<usize>(cap);
        thread::scope(|scope| {
            for _ in 0..worker_count {
                let rx_work = rx_work.clone();
                let execute_one = &execute_one;
                let to_run = &to_run;
                scope.spawn(move || {
                    while let Ok(idx) = rx_work.recv() {
                        execute_one(to_run[idx]);
                    }
                });
            }
            for idx in 0..to_run.len() {
                // Send only fails when every receiver is gone; workers live
                // until the channel drains, so treat it as unreachable.
                if tx_work.send(idx).is_err() {
                    break;
                }
            }
            drop(tx_work);
        });
    }

    let failures = failures.into_inner().unwrap_or_default();
    let result = StageResult {
        executed: total - failures.len(),
        skipped,
        failures,
    };

    if policy.abort_on_first_failure && !result.is_ok() {
        return Err(PipelineError::abort(format!(
            "{} of {} units failed (abort-on-first-failure); first: {}: {}",
            result.failures.len(),
            result.attempted(),
            result.failures[0].unit,
            result.failures[0].message,
        )));
    }

    Ok(result)
}

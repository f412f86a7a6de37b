//! Drives enumerated targets through the analyzer.
//!
//! Synchronous mode is a plain loop and keeps enumeration order. Parallel
//! mode feeds a bounded queue consumed by a fixed set of worker threads; the
//! enclosing thread scope is the barrier that waits for every submitted
//! target. Result order then follows completion order.

use crate::analysis::Analyzer;
use crate::config::ScheduleMode;
use crate::error::{Result, ScanError};
use crate::log_error;
use crate::results::ResultSink;
use crate::scan::enumerate::Enumerator;
use crate::scan::target::Target;
use crate::scan::{ScanStats, TargetFailure};
use chrono::Utc;
use crossbeam_channel::bounded;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::{debug, trace, warn};

/// Queue slots per worker.
const QUEUE_DEPTH_PER_WORKER: usize = 2;

#[derive(Default)]
struct Tally {
    dispatched: AtomicUsize,
    analyzed: AtomicUsize,
    reported: AtomicUsize,
    filtered: AtomicUsize,
    vanished: AtomicUsize,
    failures: Mutex<Vec<TargetFailure>>,
}

pub struct Scheduler<'a> {
    analyzer: &'a Analyzer<'a>,
    sink: &'a ResultSink,
    mode: ScheduleMode,
}

impl<'a> Scheduler<'a> {
    pub fn new(analyzer: &'a Analyzer<'a>, sink: &'a ResultSink) -> Self {
        Self {
            analyzer,
            sink,
            mode: analyzer.config().mode,
        }
    }

    pub fn with_mode(mut self, mode: ScheduleMode) -> Self {
        self.mode = mode;
        self
    }

    /// Processes every target, returning run statistics.
    ///
    /// Per-target failures are logged and counted. A fatal error stops
    /// enumeration, lets in-flight work finish, and is returned.
    pub fn run(&self, targets: &mut Enumerator<'_>) -> Result<ScanStats> {
        let started_at = Utc::now();
        let tally = Tally::default();

        match self.mode {
            ScheduleMode::Synchronous => self.run_synchronous(targets, &tally)?,
            ScheduleMode::Parallel { workers } => self.run_parallel(targets, &tally, workers)?,
        }

        Ok(ScanStats {
            started_at,
            finished_at: Utc::now(),
            dispatched: tally.dispatched.into_inner(),
            analyzed: tally.analyzed.into_inner(),
            reported: tally.reported.into_inner(),
            filtered: tally.filtered.into_inner(),
            vanished: tally.vanished.into_inner(),
            excluded: targets.excluded(),
            failures: tally.failures.into_inner(),
        })
    }

    fn run_synchronous(&self, targets: &mut Enumerator<'_>, tally: &Tally) -> Result<()> {
        debug!("Scanning synchronously");
        for target in targets {
            let target = target?;
            tally.dispatched.fetch_add(1, Ordering::Relaxed);
            self.handle(target, tally)?;
        }
        Ok(())
    }

    fn run_parallel(&self, targets: &mut Enumerator<'_>, tally: &Tally, workers: usize) -> Result<()> {
        let workers = workers.max(1);
        debug!(workers, "Scanning with worker pool");

        let stop = AtomicBool::new(false);
        let fatal: Mutex<Option<ScanError>> = Mutex::new(None);
        let abort = |e: ScanError| {
            stop.store(true, Ordering::Release);
            fatal.lock().get_or_insert(e);
        };

        std::thread::scope(|s| -> Result<()> {
            let (tx, rx) = bounded::<Target>(workers * QUEUE_DEPTH_PER_WORKER);

            for i in 0..workers {
                let rx = rx.clone();
                let (stop, abort) = (&stop, &abort);
                std::thread::Builder::new()
                    .name(format!("scan-worker-{i}"))
                    .spawn_scoped(s, move || {
                        for target in rx.iter() {
                            // Drain without work once the run is aborting.
                            if stop.load(Ordering::Acquire) {
                                continue;
                            }
                            if let Err(e) = self.handle(target, tally) {
                                abort(e);
                            }
                        }
                    })
                    .map_err(|e| ScanError::ScanAborted(format!("couldn't start worker: {e}")))?;
            }
            drop(rx);

            for target in targets {
                if stop.load(Ordering::Acquire) {
                    break;
                }
                match target {
                    Ok(target) => {
                        tally.dispatched.fetch_add(1, Ordering::Relaxed);
                        if tx.send(target).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        abort(e);
                        break;
                    }
                }
            }
            Ok(())
        })?;

        match fatal.into_inner() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Analyzes one target. Returns `Err` only when the whole run must stop.
    fn handle(&self, target: Target, tally: &Tally) -> Result<()> {
        match self.analyzer.analyze(&target) {
            Ok(None) => {
                tally.filtered.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Some(result)) => {
                tally.analyzed.fetch_add(1, Ordering::Relaxed);
                if result.entropy >= self.analyzer.config().threshold {
                    self.sink.add(result)?;
                    tally.reported.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(e) if matches!(target, Target::Process(_)) && e.is_vanished() => {
                trace!(target = %target, "Process vanished");
                tally.vanished.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) if e.is_fatal() => return Err(log_error!(e, "aborting scan")),
            Err(e) => {
                warn!(target = %target, error = %e, "Couldn't analyze target");
                tally.failures.lock().push(TargetFailure {
                    target: target.to_string(),
                    error: e.to_string(),
                });
            }
        }
        Ok(())
    }
}

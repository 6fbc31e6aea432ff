//! Parallel evaluation of streamline batches.
//!
//! Each streamline is evaluated on its own task with its own walker; the
//! compiled pathway and its regions are shared read-only. Outcome counters are
//! atomics and finished records are committed behind a single mutex, so the
//! only ordering work left is restoring input order at the end.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::core::budget::Deadline;
use crate::core::orchestrator::{Evaluation, Evaluator};
use crate::core::streamline::Streamline;
use crate::core::types::{Action, DiscardReason, TerminationReason};
use crate::core::verify::CompiledPathway;

/// Batch-level knobs.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Worker count; `None` lets rayon pick.
    pub threads: Option<usize>,
    pub deadline: Deadline,
    /// Also return the discarded streamlines, unmodified.
    pub keep_discarded: bool,
}

/// Outcome counters of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub total: u64,
    pub kept: u64,
    pub discarded: u64,
    /// Discard counts keyed by reason code.
    #[serde(default)]
    pub discard_reasons: BTreeMap<String, u64>,
    /// Per-end termination counts of kept streamlines, keyed by reason code.
    #[serde(default)]
    pub terminations: BTreeMap<String, u64>,
}

impl RunStats {
    pub fn discarded_for(&self, reason: DiscardReason) -> u64 {
        self.discard_reasons
            .get(reason.code())
            .copied()
            .unwrap_or(0)
    }
}

#[derive(Debug, Default)]
struct Counters {
    total: AtomicU64,
    kept: AtomicU64,
    discarded: [AtomicU64; DiscardReason::COUNT],
    terminations: [AtomicU64; TerminationReason::COUNT],
}

impl Counters {
    fn record(&self, evaluation: &Evaluation) {
        self.total.fetch_add(1, Ordering::Relaxed);
        match evaluation.action {
            Action::Keep => {
                self.kept.fetch_add(1, Ordering::Relaxed);
                for reason in [evaluation.termination_a, evaluation.termination_b]
                    .into_iter()
                    .flatten()
                {
                    self.terminations[reason.index()].fetch_add(1, Ordering::Relaxed);
                }
            }
            _ => {
                if let Some(reason) = evaluation.discard_reason {
                    self.discarded[reason.index()].fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    fn snapshot(&self) -> RunStats {
        let mut stats = RunStats {
            total: self.total.load(Ordering::Relaxed),
            kept: self.kept.load(Ordering::Relaxed),
            ..RunStats::default()
        };
        for reason in DiscardReason::ALL {
            let count = self.discarded[reason.index()].load(Ordering::Relaxed);
            if count > 0 {
                stats.discarded += count;
                stats.discard_reasons.insert(reason.code().to_string(), count);
            }
        }
        for reason in TerminationReason::ALL {
            let count = self.terminations[reason.index()].load(Ordering::Relaxed);
            if count > 0 {
                stats.terminations.insert(reason.code().to_string(), count);
            }
        }
        stats
    }
}

/// Result of [`BatchFilter::apply`], in input order.
#[derive(Debug, Clone, Default)]
pub struct BatchOutput {
    /// Cropped kept streamlines.
    pub kept: Vec<Streamline>,
    /// Input index of every entry of `kept`.
    pub kept_indices: Vec<usize>,
    /// Discarded input streamlines when requested.
    pub discarded: Option<Vec<Streamline>>,
    /// One evaluation per input streamline.
    pub evaluations: Vec<Evaluation>,
    pub stats: RunStats,
}

struct Record {
    index: usize,
    points: Streamline,
    evaluation: Evaluation,
}

/// Applies one compiled pathway to whole batches.
#[derive(Debug, Clone)]
pub struct BatchFilter {
    evaluator: Evaluator,
    options: BatchOptions,
}

impl BatchFilter {
    pub fn new(pathway: Arc<CompiledPathway>, options: BatchOptions) -> Self {
        Self {
            evaluator: Evaluator::new(pathway),
            options,
        }
    }

    pub fn evaluator(&self) -> &Evaluator {
        &self.evaluator
    }

    /// Evaluate every streamline of `batch`.
    ///
    /// Streamlines reached after the deadline are discarded with
    /// `REACHED_TIME_LIMIT` without being evaluated.
    #[instrument(skip_all, fields(streamlines = batch.len(), threads = ?self.options.threads))]
    pub fn apply(&self, batch: Vec<Streamline>) -> Result<BatchOutput> {
        let start = Instant::now();
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(threads) = self.options.threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder.build().context("build worker pool")?;

        let counters = Counters::default();
        let committed = Mutex::new(Vec::with_capacity(batch.len()));
        let deadline = self.options.deadline;
        pool.install(|| {
            batch
                .into_par_iter()
                .enumerate()
                .for_each(|(index, mut points)| {
                    let evaluation = match deadline.check() {
                        Err(reason) => Evaluation::discard(reason),
                        Ok(()) => self.evaluator.evaluate(&mut points, index as u64),
                    };
                    counters.record(&evaluation);
                    committed.lock().push(Record {
                        index,
                        points,
                        evaluation,
                    });
                });
        });

        let mut records = committed.into_inner();
        records.sort_by_key(|record| record.index);

        let mut output = BatchOutput {
            discarded: self.options.keep_discarded.then(Vec::new),
            evaluations: Vec::with_capacity(records.len()),
            ..BatchOutput::default()
        };
        for record in records {
            match record.evaluation.cropped(&record.points) {
                Some(cropped) => {
                    output.kept.push(cropped);
                    output.kept_indices.push(record.index);
                }
                None => {
                    if let Some(discarded) = output.discarded.as_mut() {
                        discarded.push(record.points);
                    }
                }
            }
            output.evaluations.push(record.evaluation);
        }
        output.stats = counters.snapshot();

        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "batch evaluated");
        info!(
            total = output.stats.total,
            kept = output.stats.kept,
            discarded = output.stats.discarded,
            "batch filtered"
        );
        Ok(output)
    }
}

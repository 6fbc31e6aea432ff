//! Orchestration for `pathway init`, `pathway verify` and `pathway filter`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::batch::{BatchFilter, BatchOptions, RunStats};
use crate::core::budget::Deadline;
use crate::core::orchestrator::Evaluation;
use crate::core::types::DiscardReason;
use crate::core::verify::CompiledPathway;
use crate::io::config::{load_pathway, starter_config, write_config};
use crate::io::regions::write_json;
use crate::io::streamlines::{read_streamlines, write_streamlines};

/// Inputs of one `pathway filter` run. CLI flags override `[run]`.
#[derive(Debug, Clone, Default)]
pub struct FilterRequest {
    pub config: PathBuf,
    pub input: PathBuf,
    pub output: PathBuf,
    pub discarded: Option<PathBuf>,
    pub threads: Option<usize>,
    pub time_limit_secs: Option<u64>,
    pub stats: Option<PathBuf>,
    /// Per-streamline decisions, one [`StreamlineReport`] per input.
    pub evaluations: Option<PathBuf>,
}

/// Decision for one input streamline, keyed by its input index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamlineReport {
    pub index: usize,
    #[serde(flatten)]
    pub evaluation: Evaluation,
}

/// Write a starter config, refusing to overwrite unless `force`.
pub fn run_init(config: &Path, force: bool) -> Result<()> {
    if config.exists() && !force {
        bail!("{} already exists (pass --force to overwrite)", config.display());
    }
    write_config(config, &starter_config())?;
    info!(config = %config.display(), "wrote starter config");
    Ok(())
}

/// Load and verify a config, returning the compiled pathway.
pub fn run_verify(config: &Path) -> Result<Arc<CompiledPathway>> {
    let (_, pathway) = load_pathway(config)?;
    pathway
        .compiled()
        .with_context(|| format!("{} did not compile", config.display()))
}

/// Filter one batch file and write the kept streamlines.
pub fn run_filter(request: &FilterRequest) -> Result<RunStats> {
    let (cfg, pathway) = load_pathway(&request.config)?;
    let compiled = pathway
        .compiled()
        .with_context(|| format!("{} did not compile", request.config.display()))?;

    let threads = request.threads.or(cfg.run.threads);
    let deadline = match request.time_limit_secs {
        Some(secs) => Deadline::after(Duration::from_secs(secs)),
        None => cfg.run.deadline(),
    };
    let discarded_path = request.discarded.clone().or_else(|| {
        cfg.run
            .keep_discarded
            .then(|| request.output.with_extension("discarded.json"))
    });

    let batch = read_streamlines(&request.input)?;
    info!(
        input = %request.input.display(),
        streamlines = batch.len(),
        time_limited = !deadline.is_unlimited(),
        "filtering batch"
    );
    let filter = BatchFilter::new(
        compiled,
        BatchOptions {
            threads,
            deadline,
            keep_discarded: discarded_path.is_some(),
        },
    );
    let output = filter.apply(batch)?;
    let skipped = output.stats.discarded_for(DiscardReason::ReachedTimeLimit);
    if skipped > 0 {
        warn!(skipped, "time limit reached");
    }

    write_streamlines(&request.output, &output.kept)?;
    if let (Some(path), Some(discarded)) = (&discarded_path, &output.discarded) {
        write_streamlines(path, discarded)?;
    }
    if let Some(path) = &request.stats {
        write_json(path, &output.stats)?;
    }
    if let Some(path) = &request.evaluations {
        let reports: Vec<StreamlineReport> = output
            .evaluations
            .iter()
            .enumerate()
            .map(|(index, evaluation)| StreamlineReport {
                index,
                evaluation: evaluation.clone(),
            })
            .collect();
        write_json(path, &reports)?;
    }
    Ok(output.stats)
}

/// Human-readable counter lines.
pub fn format_stats(stats: &RunStats) -> String {
    let mut out = format!(
        "kept {} of {} ({} discarded)\n",
        stats.kept, stats.total, stats.discarded
    );
    for (code, count) in &stats.discard_reasons {
        out.push_str(&format!("  {code}: {count}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::core::geometry::Point3;
    use crate::core::streamline::Streamline;

    fn write_fixture(dir: &Path) -> FilterRequest {
        fs::write(
            dir.join("pathway.toml"),
            "[run]\nkeep_discarded = true\n\n[[rule]]\nkind = \"require_entry\"\nsphere = \"5,0,0,1\"\n",
        )
        .expect("write config");
        let batch: Vec<Streamline> = [0.0, 3.0]
            .iter()
            .map(|&y| (0..11).map(|i| Point3::new(i as f64, y, 0.0)).collect())
            .collect();
        write_streamlines(&dir.join("in.json"), &batch).expect("write input");
        FilterRequest {
            config: dir.join("pathway.toml"),
            input: dir.join("in.json"),
            output: dir.join("out.json"),
            stats: Some(dir.join("stats.json")),
            evaluations: Some(dir.join("evaluations.json")),
            ..FilterRequest::default()
        }
    }

    #[test]
    fn filter_writes_kept_discarded_and_stats() {
        let temp = tempfile::tempdir().expect("tempdir");
        let request = write_fixture(temp.path());
        let stats = run_filter(&request).expect("filter");
        assert_eq!((stats.total, stats.kept), (2, 1));

        let kept = read_streamlines(&request.output).expect("kept");
        assert_eq!(kept.len(), 1);
        let discarded =
            read_streamlines(&temp.path().join("out.discarded.json")).expect("discarded");
        assert_eq!(discarded.len(), 1);
        let written: RunStats =
            serde_json::from_str(&fs::read_to_string(temp.path().join("stats.json")).expect("read"))
                .expect("parse stats");
        assert_eq!(written, stats);
        assert!(format_stats(&stats).contains("REQUIRED_ROI_NOT_MET: 1"));

        let reports: Vec<StreamlineReport> = serde_json::from_str(
            &fs::read_to_string(temp.path().join("evaluations.json")).expect("read"),
        )
        .expect("parse evaluations");
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].index, 0);
        assert!(reports[0].evaluation.is_kept());
        assert_eq!(
            reports[1].evaluation.discard_reason,
            Some(DiscardReason::RequiredRoiNotMet)
        );
    }

    #[test]
    fn init_writes_a_verifiable_config_once() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("pathway.toml");
        run_init(&path, false).expect("init");
        assert_eq!(run_verify(&path).expect("verify").rules.len(), 1);

        let err = run_init(&path, false).expect_err("exists");
        assert!(err.to_string().contains("already exists"));
        run_init(&path, true).expect("forced");
    }

    #[test]
    fn verify_reports_missing_config() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(run_verify(&temp.path().join("missing.toml")).is_err());
    }
}

//! CLI tests for `pathway verify` and `pathway filter`.
//!
//! Spawns the pathway binary and verifies exit codes and written files for
//! kept, empty and invalid runs.

use std::fs;
use std::path::Path;
use std::process::Command;

use pathway::batch::RunStats;
use pathway::core::geometry::Point3;
use pathway::core::region::{SurfaceMesh, Volume};
use pathway::core::types::DiscardReason;
use pathway::exit_codes;
use pathway::filter::StreamlineReport;
use pathway::io::regions::write_json;
use pathway::io::streamlines::{read_streamlines, write_streamlines};
use pathway::test_support::{line, x};

const CONFIG: &str = r#"
[policy]
min_length = 1.0

[[rule]]
kind = "seed"
sphere = "0,0,0,1"

[[rule]]
kind = "stop_at_exit"
image = "mask.json"

[[rule]]
kind = "discard_if_enters"
surface = "wall.json"
"#;

/// Mask slab covering `x` in `[-2.5, 2.5]` and a wall at `y = 5`.
fn write_sidecars(dir: &Path) {
    let mask = Volume {
        dims: [11, 21, 1],
        voxel_size: [1.0, 1.0, 1.0],
        origin: Point3::new(-5.0, -10.0, 0.0),
        channels: 1,
        data: (0..21 * 11)
            .map(|i| if (3..=7).contains(&(i % 11)) { 1.0 } else { 0.0 })
            .collect(),
    };
    write_json(&dir.join("mask.json"), &mask).expect("write mask");
    let wall = SurfaceMesh {
        vertices: vec![
            Point3::new(-20.0, 5.0, -20.0),
            Point3::new(20.0, 5.0, -20.0),
            Point3::new(-20.0, 5.0, 20.0),
            Point3::new(20.0, 5.0, 20.0),
        ],
        triangles: vec![[0, 1, 3], [0, 3, 2]],
        field: None,
    };
    write_json(&dir.join("wall.json"), &wall).expect("write wall");
}

fn pathway(dir: &Path, args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_pathway"))
        .current_dir(dir)
        .args(args)
        .output()
        .expect("spawn pathway")
}

#[test]
fn verify_prints_compiled_summary() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_sidecars(temp.path());
    fs::write(temp.path().join("pathway.toml"), CONFIG).expect("write config");

    let output = pathway(temp.path(), &["verify", "pathway.toml"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("3 rules"), "{stdout}");
}

#[test]
fn filter_keeps_cropped_streamlines() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_sidecars(temp.path());
    fs::write(temp.path().join("pathway.toml"), CONFIG).expect("write config");
    let batch = vec![
        line(x(-5.0), x(5.0), 11),
        line(Point3::new(0.0, 0.0, 0.0), Point3::new(0.0, 8.0, 0.0), 9),
        line(x(3.0), x(6.0), 4),
    ];
    write_streamlines(&temp.path().join("in.json"), &batch).expect("write input");

    let output = pathway(
        temp.path(),
        &[
            "filter",
            "pathway.toml",
            "in.json",
            "out.json",
            "--discarded",
            "rejected.json",
            "--threads",
            "2",
            "--stats",
            "stats.json",
            "--evaluations",
            "evaluations.json",
        ],
    );
    assert_eq!(
        output.status.code(),
        Some(exit_codes::OK),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let kept = read_streamlines(&temp.path().join("out.json")).expect("kept");
    assert_eq!(kept.len(), 1);
    let first = kept[0][0];
    let last = kept[0][kept[0].len() - 1];
    assert!(first.x < -2.4 && first.x > -2.6, "{first:?}");
    assert!(last.x > 2.4 && last.x < 2.6, "{last:?}");

    let rejected = read_streamlines(&temp.path().join("rejected.json")).expect("rejected");
    assert_eq!(rejected, batch[1..].to_vec());

    let stats: RunStats = serde_json::from_str(
        &fs::read_to_string(temp.path().join("stats.json")).expect("read stats"),
    )
    .expect("parse stats");
    assert_eq!(stats.total, 3);
    assert_eq!(stats.discard_reasons.get("DISCARD_REGION_REACHED"), Some(&1));
    assert_eq!(stats.discard_reasons.get("SEED_NOT_FOUND"), Some(&1));

    let reports: Vec<StreamlineReport> = serde_json::from_str(
        &fs::read_to_string(temp.path().join("evaluations.json")).expect("read evaluations"),
    )
    .expect("parse evaluations");
    let reasons: Vec<_> = reports
        .iter()
        .map(|report| (report.index, report.evaluation.discard_reason))
        .collect();
    assert_eq!(
        reasons,
        vec![
            (0, None),
            (1, Some(DiscardReason::DiscardRegionReached)),
            (2, Some(DiscardReason::SeedNotFound)),
        ]
    );
}

#[test]
fn init_writes_starter_config_that_verifies() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = pathway(temp.path(), &["init", "pathway.toml"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let verify = pathway(temp.path(), &["verify", "pathway.toml"]);
    assert_eq!(verify.status.code(), Some(exit_codes::OK));

    let again = pathway(temp.path(), &["init", "pathway.toml"]);
    assert_eq!(again.status.code(), Some(exit_codes::INVALID));
}

#[test]
fn filter_with_nothing_kept_exits_empty() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_sidecars(temp.path());
    fs::write(temp.path().join("pathway.toml"), CONFIG).expect("write config");
    write_streamlines(
        &temp.path().join("in.json"),
        &[line(x(10.0), x(20.0), 3)],
    )
    .expect("write input");

    let output = pathway(temp.path(), &["filter", "pathway.toml", "in.json", "out.json"]);
    assert_eq!(output.status.code(), Some(exit_codes::EMPTY));
    assert_eq!(
        read_streamlines(&temp.path().join("out.json")).expect("kept"),
        Vec::<Vec<Point3>>::new()
    );
}

#[test]
fn invalid_config_exits_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    fs::write(
        temp.path().join("pathway.toml"),
        "[[rule]]\nkind = \"stop_at_exit_A\"\nsphere = \"0,0,0,1\"\n",
    )
    .expect("write config");

    let output = pathway(temp.path(), &["verify", "pathway.toml"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(!output.stderr.is_empty());

    let missing = pathway(temp.path(), &["verify", "absent.toml"]);
    assert_eq!(missing.status.code(), Some(exit_codes::INVALID));
}

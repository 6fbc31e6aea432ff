//! Streamline batches as JSON arrays of `[x, y, z]` polylines.

use std::path::Path;

use anyhow::{Context, Result};

use crate::core::streamline::Streamline;
use crate::io::regions::write_json;

pub fn read_streamlines(path: &Path) -> Result<Vec<Streamline>> {
    let raw =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let batch: Vec<Streamline> =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))?;
    if let Some(index) = batch
        .iter()
        .position(|points| points.iter().any(|p| !p.is_finite()))
    {
        anyhow::bail!("{}: streamline {index} has non-finite coordinates", path.display());
    }
    Ok(batch)
}

pub fn write_streamlines(path: &Path, batch: &[Streamline]) -> Result<()> {
    write_json(path, &batch)
}

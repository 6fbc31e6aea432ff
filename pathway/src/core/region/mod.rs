//! Region predicates consumed by pathway rules.
//!
//! Every source kind implements the same four-operation [`Region`] contract,
//! so rule evaluation dispatches through one trait object instead of switching
//! over source kinds. Regions are shared between rules through the
//! [`RegionRegistry`], which deduplicates them by canonical descriptor.

pub mod image;
pub mod sphere;
pub mod surface;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::geometry::{Crossing, LineSegment, Point3};
use crate::core::tolerance::{BISECTION_EPS, BOUNDARY_PUSH};

pub use image::{ImageRegion, ImageSelection, Volume};
pub use sphere::Sphere;
pub use surface::{Surface, SurfaceDimension, SurfaceMesh, SurfaceSelection, Triangle};

/// Source kind behind a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionKind {
    Sphere,
    MaskImage,
    LabelImage,
    PvfImage,
    Surface,
}

/// Geometric capability required from every rule source.
///
/// Implementations must be total (always return a definite answer) and safe for
/// unsynchronized concurrent reads.
pub trait Region: Send + Sync + fmt::Debug {
    fn kind(&self) -> RegionKind;

    fn is_inside(&self, point: Point3) -> bool;

    fn is_near_boundary(&self, point: Point3, threshold: f64) -> bool;

    /// First position along `segment` that is inside the region.
    ///
    /// Returns distance 0 when `segment.beg` is already inside.
    fn entering(&self, segment: &LineSegment) -> Option<Crossing>;

    /// First position along `segment` where the region is left.
    ///
    /// Returns distance 0 when `segment.beg` is already outside.
    fn exiting(&self, segment: &LineSegment) -> Option<Crossing>;

    /// Shift applied by `stop_before_*` / `stop_after_*` rules.
    fn boundary_step(&self, _segment: &LineSegment) -> f64 {
        BOUNDARY_PUSH
    }

    /// True for 2D (open) surfaces, which have no enclosed volume.
    fn is_open(&self) -> bool {
        false
    }
}

/// Errors raised while constructing region sources.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegionError {
    #[error("sphere radius must be >= 0 (got {radius})")]
    NegativeRadius { radius: f64 },

    #[error("non-finite coordinate in {what}")]
    NonFinite { what: &'static str },

    #[error("invalid volume: {reason}")]
    InvalidVolume { reason: String },

    #[error("invalid surface: {reason}")]
    InvalidSurface { reason: String },
}

/// Index of a region inside a [`RegionRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionId(pub usize);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "region#{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct RegionEntry {
    key: String,
    region: Arc<dyn Region>,
}

/// Arena of shared region sources keyed by canonical descriptor.
///
/// Two rules naming the same source (same sphere, same image + label, ...)
/// resolve to the same [`RegionId`] and therefore the same `Arc`.
#[derive(Debug, Clone, Default)]
pub struct RegionRegistry {
    entries: Vec<RegionEntry>,
    by_key: HashMap<String, RegionId>,
}

impl RegionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register `region` under `key`, returning the existing id if the key is
    /// already known.
    pub fn insert(&mut self, key: impl Into<String>, region: Arc<dyn Region>) -> RegionId {
        let key = key.into();
        if let Some(id) = self.by_key.get(&key) {
            return *id;
        }
        let id = RegionId(self.entries.len());
        self.by_key.insert(key.clone(), id);
        self.entries.push(RegionEntry { key, region });
        id
    }

    /// Look up `key`, building and registering the region only on first use.
    pub fn get_or_try_insert_with<E>(
        &mut self,
        key: &str,
        build: impl FnOnce() -> Result<Arc<dyn Region>, E>,
    ) -> Result<RegionId, E> {
        if let Some(id) = self.by_key.get(key) {
            return Ok(*id);
        }
        let region = build()?;
        Ok(self.insert(key, region))
    }

    /// Register a sphere keyed by its canonical `x,y,z,r` description.
    pub fn sphere(&mut self, center: Point3, radius: f64) -> Result<RegionId, RegionError> {
        let key = Sphere::canonical_key(center, radius);
        self.get_or_try_insert_with(&key, || {
            Sphere::new(center, radius).map(|sphere| Arc::new(sphere) as Arc<dyn Region>)
        })
    }

    pub fn get(&self, id: RegionId) -> Option<&Arc<dyn Region>> {
        self.entries.get(id.0).map(|entry| &entry.region)
    }

    pub fn key(&self, id: RegionId) -> Option<&str> {
        self.entries.get(id.0).map(|entry| entry.key.as_str())
    }

    pub fn contains(&self, id: RegionId) -> bool {
        id.0 < self.entries.len()
    }
}

/// Sampled crossing search shared by voxel and mesh sources.
///
/// Returns distance 0 if `segment.beg` already has the wanted state. Otherwise
/// samples every `step` units and refines the first change by bisection; the
/// returned position satisfies `want_inside`.
pub(crate) fn sampled_crossing(
    segment: &LineSegment,
    step: f64,
    want_inside: bool,
    inside: impl Fn(Point3) -> bool,
) -> Option<Crossing> {
    if inside(segment.beg) == want_inside {
        return Some(Crossing::at_start());
    }
    if segment.is_degenerate() {
        return None;
    }
    let samples = (segment.len / step.max(BISECTION_EPS)).ceil().max(1.0) as usize;
    let step = segment.len / samples as f64;
    let mut lo = 0.0;
    for k in 1..=samples {
        let hi = if k == samples {
            segment.len
        } else {
            k as f64 * step
        };
        if inside(segment.point_at(hi)) == want_inside {
            return Some(Crossing::at_distance(
                segment,
                bisect(segment, lo, hi, want_inside, &inside),
            ));
        }
        lo = hi;
    }
    None
}

fn bisect(
    segment: &LineSegment,
    mut lo: f64,
    mut hi: f64,
    want_inside: bool,
    inside: &impl Fn(Point3) -> bool,
) -> f64 {
    while hi - lo > BISECTION_EPS {
        let mid = 0.5 * (lo + hi);
        if inside(segment.point_at(mid)) == want_inside {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    hi
}

/// Near-boundary test by probing `threshold` along each axis.
pub(crate) fn probe_near_boundary(
    point: Point3,
    threshold: f64,
    inside: impl Fn(Point3) -> bool,
) -> bool {
    let here = inside(point);
    let offsets = [
        Point3::new(threshold, 0.0, 0.0),
        Point3::new(-threshold, 0.0, 0.0),
        Point3::new(0.0, threshold, 0.0),
        Point3::new(0.0, -threshold, 0.0),
        Point3::new(0.0, 0.0, threshold),
        Point3::new(0.0, 0.0, -threshold),
    ];
    offsets
        .into_iter()
        .any(|offset| inside(point + offset) != here)
}

//! Voxel image regions: binary masks, label maps and partial-volume fractions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::geometry::{Crossing, LineSegment, Point3};
use crate::core::region::{
    Region, RegionError, RegionKind, probe_near_boundary, sampled_crossing,
};

/// Samples per smallest voxel edge for mask and label lookups.
const MASK_SAMPLES_PER_VOXEL: f64 = 2.0;

/// Samples per smallest voxel edge for partial-volume interpolation.
const PVF_SAMPLES_PER_VOXEL: f64 = 4.0;

/// Partial-volume fraction at or above which a point counts as inside.
pub const PVF_INSIDE_THRESHOLD: f64 = 0.5;

/// Regular voxel grid with one or more channels.
///
/// Voxel `(i, j, k)` is centred at `origin + (i, j, k) * voxel_size`. Data is
/// stored with `x` varying fastest and the channel slowest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub dims: [usize; 3],
    pub voxel_size: [f64; 3],
    #[serde(default)]
    pub origin: Point3,
    #[serde(default = "default_channels")]
    pub channels: usize,
    pub data: Vec<f32>,
}

fn default_channels() -> usize {
    1
}

impl Volume {
    pub fn validate(&self) -> Result<(), RegionError> {
        if self.dims.contains(&0) {
            return Err(RegionError::InvalidVolume {
                reason: format!("dims must be positive (got {:?})", self.dims),
            });
        }
        if self
            .voxel_size
            .iter()
            .any(|size| !size.is_finite() || *size <= 0.0)
        {
            return Err(RegionError::InvalidVolume {
                reason: format!(
                    "voxel_size must be finite and positive (got {:?})",
                    self.voxel_size
                ),
            });
        }
        if !self.origin.is_finite() {
            return Err(RegionError::NonFinite { what: "volume origin" });
        }
        if self.channels == 0 {
            return Err(RegionError::InvalidVolume {
                reason: "channels must be >= 1".to_string(),
            });
        }
        let expected = self.voxel_count() * self.channels;
        if self.data.len() != expected {
            return Err(RegionError::InvalidVolume {
                reason: format!(
                    "data has {} values, expected {expected} ({:?} x {} channels)",
                    self.data.len(),
                    self.dims,
                    self.channels
                ),
            });
        }
        Ok(())
    }

    pub fn voxel_count(&self) -> usize {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    pub fn smallest_voxel_edge(&self) -> f64 {
        self.voxel_size
            .iter()
            .copied()
            .fold(f64::INFINITY, f64::min)
    }

    fn value(&self, channel: usize, ijk: [usize; 3]) -> f64 {
        let [nx, ny, nz] = self.dims;
        let index = ijk[0] + nx * (ijk[1] + ny * (ijk[2] + nz * channel));
        f64::from(self.data[index])
    }

    /// Continuous voxel coordinates of a world point.
    fn voxel_coords(&self, point: Point3) -> [f64; 3] {
        let rel = point - self.origin;
        [
            rel.x / self.voxel_size[0],
            rel.y / self.voxel_size[1],
            rel.z / self.voxel_size[2],
        ]
    }

    /// Value of the voxel containing `point`, or `None` outside the grid.
    pub fn nearest(&self, channel: usize, point: Point3) -> Option<f64> {
        let coords = self.voxel_coords(point);
        let mut ijk = [0usize; 3];
        for axis in 0..3 {
            let index = coords[axis].round();
            if !index.is_finite() || index < 0.0 || index >= self.dims[axis] as f64 {
                return None;
            }
            ijk[axis] = index as usize;
        }
        Some(self.value(channel, ijk))
    }

    /// Trilinear interpolation with edge replication; 0 outside the grid.
    pub fn trilinear(&self, channel: usize, point: Point3) -> f64 {
        let coords = self.voxel_coords(point);
        let mut lower = [0usize; 3];
        let mut upper = [0usize; 3];
        let mut weight = [0.0f64; 3];
        for axis in 0..3 {
            let c = coords[axis];
            let max = (self.dims[axis] - 1) as f64;
            if !c.is_finite() || c < -0.5 || c > max + 0.5 {
                return 0.0;
            }
            let c = c.clamp(0.0, max);
            let floor = c.floor();
            lower[axis] = floor as usize;
            upper[axis] = (lower[axis] + 1).min(self.dims[axis] - 1);
            weight[axis] = c - floor;
        }
        let mut total = 0.0;
        for corner in 0..8 {
            let mut ijk = [0usize; 3];
            let mut w = 1.0;
            for axis in 0..3 {
                if corner & (1 << axis) == 0 {
                    ijk[axis] = lower[axis];
                    w *= 1.0 - weight[axis];
                } else {
                    ijk[axis] = upper[axis];
                    w *= weight[axis];
                }
            }
            if w > 0.0 {
                total += w * self.value(channel, ijk);
            }
        }
        total
    }
}

/// How voxel values are turned into membership.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSelection {
    /// Nonzero voxel.
    Mask,
    /// Voxel equal to the label value.
    Label(i64),
    /// Interpolated fraction of the given channel at or above one half.
    Pvf(usize),
}

impl ImageSelection {
    /// Suffix used in registry keys.
    pub fn key_suffix(&self) -> String {
        match self {
            ImageSelection::Mask => "mask".to_string(),
            ImageSelection::Label(label) => format!("label={label}"),
            ImageSelection::Pvf(channel) => format!("pvf={channel}"),
        }
    }
}

/// Region backed by a shared [`Volume`].
#[derive(Debug, Clone)]
pub struct ImageRegion {
    volume: Arc<Volume>,
    selection: ImageSelection,
    inverse_fraction: f64,
}

impl ImageRegion {
    pub fn new(volume: Arc<Volume>, selection: ImageSelection) -> Result<Self, RegionError> {
        volume.validate()?;
        let channel = match selection {
            ImageSelection::Pvf(channel) => channel,
            ImageSelection::Mask | ImageSelection::Label(_) => 0,
        };
        if channel >= volume.channels {
            return Err(RegionError::InvalidVolume {
                reason: format!(
                    "channel {channel} out of range ({} channels)",
                    volume.channels
                ),
            });
        }
        let samples = match selection {
            ImageSelection::Pvf(_) => PVF_SAMPLES_PER_VOXEL,
            ImageSelection::Mask | ImageSelection::Label(_) => MASK_SAMPLES_PER_VOXEL,
        };
        let inverse_fraction = samples / volume.smallest_voxel_edge();
        Ok(Self {
            volume,
            selection,
            inverse_fraction,
        })
    }

    /// Sub-sampling step for `segment`: `len / ceil(len * inverse_fraction)`.
    pub fn sub_step(&self, segment: &LineSegment) -> f64 {
        let samples = (segment.len * self.inverse_fraction).ceil().max(1.0);
        segment.len / samples
    }
}

impl Region for ImageRegion {
    fn kind(&self) -> RegionKind {
        match self.selection {
            ImageSelection::Mask => RegionKind::MaskImage,
            ImageSelection::Label(_) => RegionKind::LabelImage,
            ImageSelection::Pvf(_) => RegionKind::PvfImage,
        }
    }

    fn is_inside(&self, point: Point3) -> bool {
        match self.selection {
            ImageSelection::Mask => self
                .volume
                .nearest(0, point)
                .is_some_and(|value| value != 0.0),
            ImageSelection::Label(label) => self
                .volume
                .nearest(0, point)
                .is_some_and(|value| (value - label as f64).abs() < 0.5),
            ImageSelection::Pvf(channel) => {
                self.volume.trilinear(channel, point) >= PVF_INSIDE_THRESHOLD
            }
        }
    }

    fn is_near_boundary(&self, point: Point3, threshold: f64) -> bool {
        probe_near_boundary(point, threshold, |p| self.is_inside(p))
    }

    fn entering(&self, segment: &LineSegment) -> Option<Crossing> {
        sampled_crossing(segment, self.sub_step(segment), true, |p| {
            self.is_inside(p)
        })
    }

    fn exiting(&self, segment: &LineSegment) -> Option<Crossing> {
        sampled_crossing(segment, self.sub_step(segment), false, |p| {
            self.is_inside(p)
        })
    }

    fn boundary_step(&self, segment: &LineSegment) -> f64 {
        match self.selection {
            ImageSelection::Pvf(_) => self.sub_step(segment),
            ImageSelection::Mask | ImageSelection::Label(_) => {
                crate::core::tolerance::BOUNDARY_PUSH
            }
        }
    }
}

//! Triangle-mesh surface regions.
//!
//! Closed (3D) meshes enclose a volume: membership is decided by ray parity and
//! crossings are exact segment/triangle intersections. Open (2D) meshes have no
//! interior, so a point is inside when it lies within half the configured
//! thickness of the mesh.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::geometry::{Crossing, LineSegment, Point3};
use crate::core::region::{Region, RegionError, RegionKind, sampled_crossing};
use crate::core::tolerance::{BOUNDARY_PUSH, LENGTH_EPS};

/// Slab thickness used for open surfaces when none is configured.
pub const DEFAULT_OPEN_THICKNESS: f64 = 1.0;

/// Fixed, non axis-aligned unit direction for parity rays.
const PARITY_RAY: Point3 = Point3::new(0.48, 0.6, 0.64);

const FIELD_MATCH_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceDimension {
    #[serde(rename = "2D", alias = "2d")]
    Open,
    #[serde(rename = "3D", alias = "3d")]
    Closed,
}

impl SurfaceDimension {
    pub fn label(self) -> &'static str {
        match self {
            SurfaceDimension::Open => "2D",
            SurfaceDimension::Closed => "3D",
        }
    }
}

/// Indexed triangle mesh with an optional per-vertex scalar field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceMesh {
    pub vertices: Vec<Point3>,
    pub triangles: Vec<[usize; 3]>,
    #[serde(default)]
    pub field: Option<Vec<f64>>,
}

impl SurfaceMesh {
    pub fn validate(&self) -> Result<(), RegionError> {
        if self.triangles.is_empty() {
            return Err(RegionError::InvalidSurface {
                reason: "mesh has no triangles".to_string(),
            });
        }
        if self.vertices.iter().any(|v| !v.is_finite()) {
            return Err(RegionError::NonFinite { what: "surface vertex" });
        }
        if let Some((t, tri)) = self
            .triangles
            .iter()
            .enumerate()
            .find(|(_, tri)| tri.iter().any(|&i| i >= self.vertices.len()))
        {
            return Err(RegionError::InvalidSurface {
                reason: format!(
                    "triangle {t} {tri:?} references a vertex beyond {}",
                    self.vertices.len()
                ),
            });
        }
        if let Some(field) = &self.field {
            if field.len() != self.vertices.len() {
                return Err(RegionError::InvalidSurface {
                    reason: format!(
                        "field has {} values for {} vertices",
                        field.len(),
                        self.vertices.len()
                    ),
                });
            }
        }
        Ok(())
    }

    /// Watertight test: every undirected edge is shared by exactly two
    /// triangles.
    pub fn is_closed(&self) -> bool {
        let mut edges: HashMap<(usize, usize), u32> = HashMap::new();
        for tri in &self.triangles {
            for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
                *edges.entry((a.min(b), a.max(b))).or_default() += 1;
            }
        }
        edges.values().all(|&count| count == 2)
    }
}

/// Sub-selection and interpretation options for a surface.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SurfaceSelection {
    /// Overrides the dimension inferred from the mesh topology.
    pub dimension: Option<SurfaceDimension>,
    /// Keep only triangles whose centroid lies within `(center, radius)`.
    pub disc: Option<(Point3, f64)>,
    /// Keep only triangles whose three vertices carry this field value.
    pub field: Option<f64>,
    /// Slab thickness for open surfaces.
    pub thickness: Option<f64>,
}

impl SurfaceSelection {
    pub fn key_suffix(&self) -> String {
        let mut parts = Vec::new();
        if let Some(dimension) = self.dimension {
            parts.push(format!("dim={}", dimension.label()));
        }
        if let Some((c, r)) = self.disc {
            parts.push(format!("disc={},{},{},{}", c.x, c.y, c.z, r));
        }
        if let Some(value) = self.field {
            parts.push(format!("field={value}"));
        }
        if let Some(thickness) = self.thickness {
            parts.push(format!("thickness={thickness}"));
        }
        parts.join(";")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub a: Point3,
    pub b: Point3,
    pub c: Point3,
}

impl Triangle {
    pub fn centroid(&self) -> Point3 {
        (self.a + self.b + self.c) * (1.0 / 3.0)
    }

    /// Möller–Trumbore: distance along the unit direction `dir` from `origin`,
    /// if the carrier line hits the triangle at a non-negative distance.
    pub fn ray_hit(&self, origin: Point3, dir: Point3) -> Option<f64> {
        let e1 = self.b - self.a;
        let e2 = self.c - self.a;
        let p = dir.cross(e2);
        let det = e1.dot(p);
        if det.abs() < 1e-14 {
            return None;
        }
        let inv = 1.0 / det;
        let s = origin - self.a;
        let u = s.dot(p) * inv;
        if !(0.0..=1.0).contains(&u) {
            return None;
        }
        let q = s.cross(e1);
        let v = dir.dot(q) * inv;
        if v < 0.0 || u + v > 1.0 {
            return None;
        }
        let t = e2.dot(q) * inv;
        (t >= 0.0).then_some(t)
    }

    /// Closest point on the triangle (Ericson, Real-Time Collision Detection
    /// 5.1.5).
    pub fn closest_point(&self, p: Point3) -> Point3 {
        let (a, b, c) = (self.a, self.b, self.c);
        let ab = b - a;
        let ac = c - a;
        let ap = p - a;
        let d1 = ab.dot(ap);
        let d2 = ac.dot(ap);
        if d1 <= 0.0 && d2 <= 0.0 {
            return a;
        }
        let bp = p - b;
        let d3 = ab.dot(bp);
        let d4 = ac.dot(bp);
        if d3 >= 0.0 && d4 <= d3 {
            return b;
        }
        let vc = d1 * d4 - d3 * d2;
        if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
            return a + ab * (d1 / (d1 - d3));
        }
        let cp = p - c;
        let d5 = ab.dot(cp);
        let d6 = ac.dot(cp);
        if d6 >= 0.0 && d5 <= d6 {
            return c;
        }
        let vb = d5 * d2 - d1 * d6;
        if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
            return a + ac * (d2 / (d2 - d6));
        }
        let va = d3 * d6 - d5 * d4;
        if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
            return b + (c - b) * ((d4 - d3) / ((d4 - d3) + (d5 - d6)));
        }
        let denom = 1.0 / (va + vb + vc);
        a + ab * (vb * denom) + ac * (vc * denom)
    }
}

/// Mesh region after sub-selection.
#[derive(Debug, Clone)]
pub struct Surface {
    triangles: Vec<Triangle>,
    dimension: SurfaceDimension,
    half_thickness: f64,
    bounds: (Point3, Point3),
}

impl Surface {
    pub fn new(mesh: &SurfaceMesh, selection: SurfaceSelection) -> Result<Self, RegionError> {
        mesh.validate()?;
        if let Some((center, radius)) = selection.disc {
            if !center.is_finite() || !radius.is_finite() || radius < 0.0 {
                return Err(RegionError::InvalidSurface {
                    reason: format!("disc radius must be finite and >= 0 (got {radius})"),
                });
            }
        }
        let thickness = selection.thickness.unwrap_or(DEFAULT_OPEN_THICKNESS);
        if !thickness.is_finite() || thickness <= 0.0 {
            return Err(RegionError::InvalidSurface {
                reason: format!("thickness must be positive (got {thickness})"),
            });
        }
        let field = match (selection.field, &mesh.field) {
            (Some(_), None) => {
                return Err(RegionError::InvalidSurface {
                    reason: "field selection requested but mesh carries no field".to_string(),
                });
            }
            (Some(value), Some(field)) => Some((value, field)),
            (None, _) => None,
        };

        let triangles: Vec<Triangle> = mesh
            .triangles
            .iter()
            .filter(|tri| {
                field.is_none_or(|(value, field)| {
                    tri.iter()
                        .all(|&i| (field[i] - value).abs() <= FIELD_MATCH_EPS)
                })
            })
            .map(|tri| Triangle {
                a: mesh.vertices[tri[0]],
                b: mesh.vertices[tri[1]],
                c: mesh.vertices[tri[2]],
            })
            .filter(|tri| {
                selection
                    .disc
                    .is_none_or(|(center, radius)| tri.centroid().distance(center) <= radius)
            })
            .collect();
        if triangles.is_empty() {
            return Err(RegionError::InvalidSurface {
                reason: "sub-selection left no triangles".to_string(),
            });
        }

        let dimension = selection.dimension.unwrap_or_else(|| {
            if selection.disc.is_none() && selection.field.is_none() && mesh.is_closed() {
                SurfaceDimension::Closed
            } else {
                SurfaceDimension::Open
            }
        });
        let bounds = bounds_of(&triangles);
        Ok(Self {
            triangles,
            dimension,
            half_thickness: 0.5 * thickness,
            bounds,
        })
    }

    pub fn dimension(&self) -> SurfaceDimension {
        self.dimension
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn distance_to(&self, point: Point3) -> f64 {
        self.triangles
            .iter()
            .map(|tri| tri.closest_point(point).distance(point))
            .fold(f64::INFINITY, f64::min)
    }

    /// True when `segment`, padded by `margin`, cannot touch the mesh.
    fn misses_bounds(&self, segment: &LineSegment, margin: f64) -> bool {
        let (lo, hi) = self.bounds;
        let seg_lo = [
            segment.beg.x.min(segment.end.x),
            segment.beg.y.min(segment.end.y),
            segment.beg.z.min(segment.end.z),
        ];
        let seg_hi = [
            segment.beg.x.max(segment.end.x),
            segment.beg.y.max(segment.end.y),
            segment.beg.z.max(segment.end.z),
        ];
        let lo = lo.to_array();
        let hi = hi.to_array();
        (0..3).any(|axis| seg_hi[axis] + margin < lo[axis] || seg_lo[axis] - margin > hi[axis])
    }

    fn parity_inside(&self, point: Point3) -> bool {
        let hits = self
            .triangles
            .iter()
            .filter(|tri| tri.ray_hit(point, PARITY_RAY).is_some_and(|t| t > 1e-12))
            .count();
        hits % 2 == 1
    }

    /// Sorted intersection distances of the segment with the mesh.
    fn hits(&self, segment: &LineSegment) -> Vec<f64> {
        let mut hits: Vec<f64> = self
            .triangles
            .iter()
            .filter_map(|tri| tri.ray_hit(segment.beg, segment.dir))
            .filter(|t| *t <= segment.len)
            .collect();
        hits.sort_by(f64::total_cmp);
        hits
    }

    /// First mesh hit after which the inside state equals `want_inside`.
    fn closed_crossing(&self, segment: &LineSegment, want_inside: bool) -> Option<Crossing> {
        if self.is_inside(segment.beg) == want_inside {
            return Some(Crossing::at_start());
        }
        if segment.is_degenerate() || self.misses_bounds(segment, LENGTH_EPS) {
            return None;
        }
        let probe = 0.5 * BOUNDARY_PUSH;
        self.hits(segment)
            .into_iter()
            .find(|&t| {
                t + probe > segment.len
                    || self.is_inside(segment.point_at(t + probe)) == want_inside
            })
            .map(|t| Crossing::at_distance(segment, t))
    }

    fn open_crossing(&self, segment: &LineSegment, want_inside: bool) -> Option<Crossing> {
        let inside_now = self.is_inside(segment.beg);
        if inside_now == want_inside {
            return Some(Crossing::at_start());
        }
        if !inside_now && self.misses_bounds(segment, self.half_thickness) {
            return None;
        }
        sampled_crossing(segment, self.half_thickness, want_inside, |p| {
            self.is_inside(p)
        })
    }
}

fn bounds_of(triangles: &[Triangle]) -> (Point3, Point3) {
    let mut lo = Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
    let mut hi = Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
    for p in triangles.iter().flat_map(|tri| [tri.a, tri.b, tri.c]) {
        lo = Point3::new(lo.x.min(p.x), lo.y.min(p.y), lo.z.min(p.z));
        hi = Point3::new(hi.x.max(p.x), hi.y.max(p.y), hi.z.max(p.z));
    }
    (lo, hi)
}

impl Region for Surface {
    fn kind(&self) -> RegionKind {
        RegionKind::Surface
    }

    fn is_inside(&self, point: Point3) -> bool {
        match self.dimension {
            SurfaceDimension::Closed => {
                let (lo, hi) = self.bounds;
                let outside_box = point.x < lo.x
                    || point.y < lo.y
                    || point.z < lo.z
                    || point.x > hi.x
                    || point.y > hi.y
                    || point.z > hi.z;
                !outside_box && self.parity_inside(point)
            }
            SurfaceDimension::Open => self.distance_to(point) <= self.half_thickness,
        }
    }

    fn is_near_boundary(&self, point: Point3, threshold: f64) -> bool {
        match self.dimension {
            SurfaceDimension::Closed => self.distance_to(point) <= threshold,
            SurfaceDimension::Open => {
                (self.distance_to(point) - self.half_thickness).abs() <= threshold
            }
        }
    }

    fn entering(&self, segment: &LineSegment) -> Option<Crossing> {
        match self.dimension {
            SurfaceDimension::Closed => self.closed_crossing(segment, true),
            SurfaceDimension::Open => self.open_crossing(segment, true),
        }
    }

    fn exiting(&self, segment: &LineSegment) -> Option<Crossing> {
        match self.dimension {
            SurfaceDimension::Closed => self.closed_crossing(segment, false),
            SurfaceDimension::Open => self.open_crossing(segment, false),
        }
    }

    fn is_open(&self) -> bool {
        self.dimension == SurfaceDimension::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Axis-aligned cube `[lo, hi]^3` as 12 outward triangles.
    fn cube(lo: f64, hi: f64) -> SurfaceMesh {
        let vertices = (0..8)
            .map(|i| {
                Point3::new(
                    if i & 1 == 0 { lo } else { hi },
                    if i & 2 == 0 { lo } else { hi },
                    if i & 4 == 0 { lo } else { hi },
                )
            })
            .collect();
        let triangles = vec![
            [0, 2, 1],
            [1, 2, 3],
            [4, 5, 6],
            [5, 7, 6],
            [0, 1, 4],
            [1, 5, 4],
            [2, 6, 3],
            [3, 6, 7],
            [0, 4, 2],
            [2, 4, 6],
            [1, 3, 5],
            [3, 7, 5],
        ];
        SurfaceMesh {
            vertices,
            triangles,
            field: None,
        }
    }

    /// Square plane `z = 0` spanning `[-5, 5]^2`, field 1 on x < 0 half.
    fn plane() -> SurfaceMesh {
        SurfaceMesh {
            vertices: vec![
                Point3::new(-5.0, -5.0, 0.0),
                Point3::new(0.0, -5.0, 0.0),
                Point3::new(5.0, -5.0, 0.0),
                Point3::new(-5.0, 5.0, 0.0),
                Point3::new(0.0, 5.0, 0.0),
                Point3::new(5.0, 5.0, 0.0),
            ],
            triangles: vec![[0, 1, 4], [0, 4, 3], [1, 2, 5], [1, 5, 4]],
            field: Some(vec![1.0, 1.0, 2.0, 1.0, 1.0, 2.0]),
        }
    }

    #[test]
    fn closed_cube_is_detected_and_parity_works() {
        let mesh = cube(-1.0, 1.0);
        assert!(mesh.is_closed());
        let surface = Surface::new(&mesh, SurfaceSelection::default()).expect("surface");
        assert_eq!(surface.dimension(), SurfaceDimension::Closed);
        assert!(surface.is_inside(Point3::new(0.2, -0.3, 0.5)));
        assert!(!surface.is_inside(Point3::new(1.5, 0.0, 0.0)));
        assert!(!surface.is_open());
    }

    #[test]
    fn closed_crossings_are_exact() {
        let surface = Surface::new(&cube(-1.0, 1.0), SurfaceSelection::default()).expect("surface");
        let seg = LineSegment::new(Point3::new(-3.0, 0.1, 0.2), Point3::new(3.0, 0.1, 0.2));
        let enter = surface.entering(&seg).expect("enters");
        assert!((enter.distance - 2.0).abs() < 1e-9);
        let inner = seg.sub(enter.distance + BOUNDARY_PUSH, seg.len);
        let exit = surface.exiting(&inner).expect("exits");
        assert!((enter.distance + BOUNDARY_PUSH + exit.distance - 4.0).abs() < 1e-9);
    }

    #[test]
    fn open_plane_is_a_slab() {
        let surface = Surface::new(
            &plane(),
            SurfaceSelection {
                thickness: Some(0.5),
                ..SurfaceSelection::default()
            },
        )
        .expect("surface");
        assert!(surface.is_open());
        assert!(surface.is_inside(Point3::new(1.0, 1.0, 0.2)));
        assert!(!surface.is_inside(Point3::new(1.0, 1.0, 0.3)));

        let seg = LineSegment::new(Point3::new(1.0, 1.0, -2.0), Point3::new(1.0, 1.0, 2.0));
        let enter = surface.entering(&seg).expect("enters");
        assert!((enter.distance - 1.75).abs() < 1e-3);
    }

    #[test]
    fn field_and_disc_restrict_triangles() {
        let mesh = plane();
        let left = Surface::new(
            &mesh,
            SurfaceSelection {
                field: Some(1.0),
                ..SurfaceSelection::default()
            },
        )
        .expect("surface");
        assert_eq!(left.triangle_count(), 2);
        assert!(left.is_inside(Point3::new(-2.0, 0.0, 0.0)));
        assert!(!left.is_inside(Point3::new(3.0, 0.0, 0.0)));

        let disc = Surface::new(
            &mesh,
            SurfaceSelection {
                disc: Some((Point3::new(3.0, 0.0, 0.0), 3.0)),
                ..SurfaceSelection::default()
            },
        )
        .expect("surface");
        assert_eq!(disc.triangle_count(), 2);

        let err = Surface::new(
            &mesh,
            SurfaceSelection {
                field: Some(7.0),
                ..SurfaceSelection::default()
            },
        )
        .expect_err("empty selection");
        assert!(err.to_string().contains("no triangles"));
    }

    #[test]
    fn closest_point_handles_regions() {
        let tri = Triangle {
            a: Point3::ORIGIN,
            b: Point3::new(1.0, 0.0, 0.0),
            c: Point3::new(0.0, 1.0, 0.0),
        };
        assert_eq!(tri.closest_point(Point3::new(-1.0, -1.0, 0.0)), tri.a);
        assert_eq!(
            tri.closest_point(Point3::new(0.25, 0.25, 3.0)),
            Point3::new(0.25, 0.25, 0.0)
        );
        let edge = tri.closest_point(Point3::new(0.5, -2.0, 0.0));
        assert!((edge.x - 0.5).abs() < 1e-12 && edge.y.abs() < 1e-12);
    }
}

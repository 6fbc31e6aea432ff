//! Length tolerances shared by every geometric decision.
//!
//! All constants derive from a single [`LENGTH_EPS`] expressed in coordinate
//! units (millimetres for typical tractography data). Changing it scales every
//! boundary push, stop shift and snap threshold together.

/// Base length tolerance in coordinate units.
pub const LENGTH_EPS: f64 = 1e-4;

/// Distance a sub-segment start is pushed past a detected boundary before the
/// next crossing is searched, and the shift applied by `stop_before_*` /
/// `stop_after_*` rules on geometric sources.
pub const BOUNDARY_PUSH: f64 = LENGTH_EPS;

/// Precision of bisection refinement for sampled sources.
pub const BISECTION_EPS: f64 = LENGTH_EPS * 0.25;

/// Positions closer than this (in length) to an existing vertex are snapped to
/// it instead of producing an interpolated point.
pub const VERTEX_SNAP: f64 = LENGTH_EPS * 0.01;

/// Segments shorter than this carry no direction and are skipped.
pub const DEGENERATE_SEGMENT: f64 = LENGTH_EPS * 0.01;

//! Pathway-rule evaluation for tractography streamlines.
//!
//! Given a streamline and a verified set of spatial rules (regions defined by
//! spheres, voxel images or surfaces), decide whether the streamline is kept,
//! possibly cropped, or discarded. The architecture enforces a strict
//! separation:
//!
//! - **[`core`]**: Pure, deterministic logic (regions, rule verification,
//!   walkers, traversal). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (config and sidecar files,
//!   streamline batches).
//!
//! [`batch`] fans evaluation out over a worker pool and [`filter`] wires
//! config, batch and files together for the CLI.

pub mod batch;
pub mod core;
pub mod exit_codes;
pub mod filter;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

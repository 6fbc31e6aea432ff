//! Deterministic, pure evaluation logic.
//!
//! Core modules are free of I/O side effects. They operate on in-memory
//! geometry and return deterministic outputs suitable for tests; the only
//! randomness is seed placement, driven by a caller-supplied generator.

pub mod budget;
pub mod geometry;
pub mod orchestrator;
pub mod pathway;
pub mod policy;
pub mod region;
pub mod rules;
pub mod seed;
pub mod streamline;
pub mod tolerance;
pub mod tracker;
pub mod types;
pub mod verify;
pub mod walker;

mod tying;

//! I/O helpers for pathway commands.

pub mod config;
pub mod regions;
pub mod streamlines;

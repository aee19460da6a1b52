//! # Lahar Parallel
//!
//! Work partitioning for the hydrology phases.
//!
//! This crate provides:
//! - Contiguous partitions of rows or boundary seeds
//! - Mutable row-block splitting for lock-free row phases
//! - A short-lived rayon pool per phase with bounded startup retry

pub mod partition;
pub mod strategy;

pub use partition::{partition, split_rows_mut, Partition};
pub use strategy::{retry_with_backoff, PhasePool, RetryPolicy, DEFAULT_THREADS};

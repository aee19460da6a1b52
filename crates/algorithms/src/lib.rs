//! # Lahar Algorithms
//!
//! Hydrological conditioning of elevation models.
//!
//! ## Available Algorithm Categories
//!
//! - **hydrology**: Fill sinks, flow direction, flow accumulation and the
//!   phase scheduler that runs them over a shared grid

pub mod hydrology;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::hydrology::{
        fill_sinks, resolve_flow_directions, run_phases, FillSinks, FillSinksParams, FlowAccumulator,
        FlowDirectionParams, FlowGrid, Hydrology, HydrologyParams, PhaseReport,
    };
    pub use lahar_core::prelude::*;
}

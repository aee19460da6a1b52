//! Terrain hydrology engine
//!
//! - Grid: per-cell heights, directions and accumulation state
//! - Fill sinks: Planchon-Darboux depression filling
//! - Flow direction: D8 with radial tie breaking and nearest-edge rules
//! - Flow accumulation: memoized upstream counts seeded from the border
//! - Scheduler: phase barriers and per-phase worker pools

mod fill_sinks;
mod flow_accumulation;
mod flow_direction;
mod grid;
mod scheduler;

pub use fill_sinks::{fill_heights, fill_sinks, FillReport, FillSinks, FillSinksParams, MAX_DRY_DEPTH};
pub use flow_accumulation::{accumulate_from_edges, AccumulationReport, FlowAccumulator};
pub use flow_direction::{nearest_edge, resolve_flow_directions, DirectionReport, FlowDirectionParams, Resolution};
pub use grid::{Cell, FlowGrid};
pub use scheduler::{run_phases, Hydrology, HydrologyParams, PhaseReport};

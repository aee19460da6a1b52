//! Phase scheduling for a full hydrology run
//!
//! Phases run strictly in order with a full barrier between them:
//!
//! 0. fill (sequential, calling thread)
//! 1. build: row blocks reset directions and accumulation state
//! 2. direction: row blocks resolve interior directions
//! 3. accumulation: boundary seeds split into contiguous blocks
//!
//! Each parallel phase runs on its own short-lived pool of
//! `min(threads, extent)` workers.

use super::fill_sinks::{fill_sinks, FillReport, FillSinksParams};
use super::flow_accumulation::{accumulate_from_edges, AccumulationReport};
use super::flow_direction::{resolve_flow_directions, DirectionReport, FlowDirectionParams};
use super::grid::FlowGrid;
use lahar_core::{Algorithm, Error, Result};
use lahar_parallel::{partition, split_rows_mut, PhasePool, DEFAULT_THREADS};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Parameters for a complete run
#[derive(Debug, Clone)]
pub struct HydrologyParams {
    pub fill: FillSinksParams,
    pub direction: FlowDirectionParams,
    /// Worker threads per phase
    pub threads: usize,
}

impl Default for HydrologyParams {
    fn default() -> Self {
        Self {
            fill: FillSinksParams::default(),
            direction: FlowDirectionParams::default(),
            threads: DEFAULT_THREADS,
        }
    }
}

impl HydrologyParams {
    /// Check every parameter before any phase starts
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(Error::InvalidParameter {
                name: "threads",
                value: "0".into(),
                reason: "at least one worker thread is required".into(),
            });
        }
        self.fill.validate()?;
        self.direction.validate()
    }
}

/// What each phase reported
#[derive(Debug, Clone, Default)]
pub struct PhaseReport {
    pub fill: FillReport,
    pub direction: DirectionReport,
    pub accumulation: AccumulationReport,
    /// Wall time per phase, in phase order
    pub timings: Vec<(&'static str, Duration)>,
}

/// Run all phases over `grid`.
pub fn run_phases(grid: &mut FlowGrid, params: &HydrologyParams) -> Result<PhaseReport> {
    params.validate()?;
    let threads = params.threads;
    let mut report = PhaseReport::default();
    info!(rows = grid.rows(), cols = grid.cols(), threads, "starting hydrology run");

    let start = Instant::now();
    report.fill = fill_sinks(grid, &params.fill)?;
    report.timings.push(("fill", start.elapsed()));
    info!(iterations = report.fill.iterations, raised = report.fill.raised_cells, "fill complete");

    let start = Instant::now();
    build(grid, threads)?;
    report.timings.push(("build", start.elapsed()));

    let start = Instant::now();
    report.direction = resolve_flow_directions(grid, &params.direction, threads)?;
    report.timings.push(("direction", start.elapsed()));
    info!(
        resolved = report.direction.resolved,
        nodata = report.direction.nodata,
        extended = report.direction.extended,
        edge_fallback = report.direction.edge_fallback,
        "flow directions complete"
    );

    let start = Instant::now();
    report.accumulation = accumulate_from_edges(grid, threads)?;
    report.timings.push(("accumulation", start.elapsed()));
    info!(
        max = report.accumulation.max_accumulation,
        "flow accumulation complete"
    );

    Ok(report)
}

/// Phase 1: reset per-cell state in row blocks.
fn build(grid: &mut FlowGrid, threads: usize) -> Result<()> {
    let (rows, cols) = grid.shape();
    let parts = partition(rows, threads);
    debug!(partitions = parts.len(), "build phase");

    let mut directions = std::mem::take(&mut grid.directions);
    let blocks = split_rows_mut(&mut directions, cols, &parts);
    let items: Vec<_> = parts.iter().zip(blocks).collect();
    let shared: &FlowGrid = grid;
    let result = PhasePool::new("build", parts.len()).run(items, |(part, block)| {
        shared.reset_rows(part.range.start, block);
        Ok(())
    });
    grid.directions = directions;
    result.map(|_| ())
}

/// Complete hydrology run as an [`Algorithm`]
#[derive(Debug, Clone, Default)]
pub struct Hydrology;

impl Algorithm for Hydrology {
    type Input = FlowGrid;
    type Output = (FlowGrid, PhaseReport);
    type Params = HydrologyParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Hydrology"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let mut grid = input;
        let report = run_phases(&mut grid, &params)?;
        Ok((grid, report))
    }
}

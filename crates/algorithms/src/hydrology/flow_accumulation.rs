//! Flow accumulation over a shared grid
//!
//! A cell's total is the number of cells whose flow path passes through
//! it: the sum over the neighbours draining into it of their own total
//! plus one. Totals are memoized in the grid and computed exactly once,
//! even when several workers reach the same cell.
//!
//! Each cell has a claim word: free, held by the traversal that owns a
//! token, or ready. A traversal claims a cell with compare-and-set,
//! computes its upstream cells first (explicit post-order worklist), then
//! publishes the total with release ordering before marking the cell
//! ready. Meeting a cell the same traversal holds but has not finished
//! means the direction graph loops back on itself.

use super::grid::{FlowGrid, FREE, READY};
use lahar_core::{Error, Result};
use lahar_parallel::{partition, PhasePool};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::debug;

/// Result of trying to claim a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Claim {
    /// Total already published
    Ready,
    /// This traversal now owns the cell
    Acquired,
    /// Owned by this traversal and still open
    HeldByUs,
    /// Another traversal is computing it
    HeldByOther,
}

/// Summary of a verified accumulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AccumulationReport {
    /// Seeds processed
    pub seeds: usize,
    /// Largest total in the grid
    pub max_accumulation: u64,
    /// Sum of the totals of all border cells
    pub border_total: u64,
}

/// Memoized accumulation over a grid whose directions are final
pub struct FlowAccumulator<'g> {
    grid: &'g FlowGrid,
    next_token: AtomicU32,
    aborted: AtomicBool,
}

impl<'g> FlowAccumulator<'g> {
    pub fn new(grid: &'g FlowGrid) -> Self {
        Self {
            grid,
            next_token: AtomicU32::new(FREE + 1),
            aborted: AtomicBool::new(false),
        }
    }

    /// Stop waiting workers; they fail instead of blocking.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Total for the cell at (row, col), computing it and everything
    /// upstream of it on first use.
    pub fn accumulate(&self, row: usize, col: usize) -> Result<u64> {
        let (rows, cols) = self.grid.shape();
        if row >= rows || col >= cols {
            return Err(Error::IndexOutOfBounds { row, col, rows, cols });
        }
        self.accumulate_index(self.grid.index(row, col))
    }

    pub(crate) fn accumulate_index(&self, start: usize) -> Result<u64> {
        if let Some(total) = self.grid.ready_total(start) {
            return Ok(total);
        }
        let token = self.token()?;

        let mut stack = vec![(start, false)];
        while let Some((idx, expanded)) = stack.pop() {
            if expanded {
                self.publish(idx);
                continue;
            }
            match self.claim(idx, token) {
                Claim::Ready => {}
                Claim::Acquired => {
                    stack.push((idx, true));
                    stack.extend(self.grid.upstream(idx).map(|n| (n, false)));
                }
                Claim::HeldByUs => {
                    self.abort();
                    return Err(self.cycle_error(idx));
                }
                Claim::HeldByOther => self.wait_ready(idx)?,
            }
        }

        self.grid
            .ready_total(start)
            .ok_or_else(|| Error::Algorithm(format!("cell {start} not ready after traversal")))
    }

    fn token(&self) -> Result<u32> {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        if token == FREE || token == READY {
            return Err(Error::Algorithm("accumulation token space exhausted".into()));
        }
        Ok(token)
    }

    /// Double-checked claim: look first, then compare-and-set.
    fn claim(&self, idx: usize, token: u32) -> Claim {
        let classify = |state: u32| match state {
            READY => Claim::Ready,
            t if t == token => Claim::HeldByUs,
            _ => Claim::HeldByOther,
        };

        let state = &self.grid.state[idx];
        match state.load(Ordering::Acquire) {
            FREE => {}
            other => return classify(other),
        }
        match state.compare_exchange(FREE, token, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => Claim::Acquired,
            Err(other) => classify(other),
        }
    }

    /// Sum the upstream totals of a claimed cell and mark it ready. Every
    /// upstream cell is ready by now: each was either finished earlier in
    /// this traversal or waited for.
    fn publish(&self, idx: usize) {
        let total: u64 = self
            .grid
            .upstream(idx)
            .map(|n| self.grid.accumulation[n].load(Ordering::Acquire) + 1)
            .sum();
        self.grid.accumulation[idx].store(total, Ordering::Release);
        self.grid.state[idx].store(READY, Ordering::Release);
    }

    fn wait_ready(&self, idx: usize) -> Result<()> {
        // A cell that never reaches the border may be held by a traversal
        // stuck on the same loop; report it instead of waiting forever.
        self.ensure_drains(idx)?;

        let mut spins = 0u32;
        while self.grid.state[idx].load(Ordering::Acquire) != READY {
            if self.is_aborted() {
                return Err(Error::Algorithm("accumulation aborted by another worker".into()));
            }
            if spins < 64 {
                std::hint::spin_loop();
                spins += 1;
            } else {
                std::thread::yield_now();
            }
        }
        Ok(())
    }

    /// Follow directions from `idx` until they leave the grid.
    fn ensure_drains(&self, idx: usize) -> Result<()> {
        let mut current = idx;
        for _ in 0..=self.grid.len() {
            match self.grid.downstream(current) {
                None => return Ok(()),
                Some(next) => current = next,
            }
        }
        Err(self.cycle_error(idx))
    }

    fn cycle_error(&self, idx: usize) -> Error {
        let (row, col) = self.grid.position(idx);
        let unresolved = self
            .grid
            .state
            .iter()
            .filter(|s| s.load(Ordering::Acquire) != READY)
            .count();
        Error::CyclicFlowGraph { row, col, unresolved }
    }

    /// Check the finished grid: every cell ready, and the border totals
    /// account for each interior cell exactly once.
    pub fn verify(&self) -> Result<AccumulationReport> {
        let grid = self.grid;
        let pending: Vec<usize> = (0..grid.len())
            .filter(|&idx| grid.ready_total(idx).is_none())
            .collect();
        if let Some(&first) = pending.first() {
            let (row, col) = grid.position(first);
            return Err(Error::CyclicFlowGraph {
                row,
                col,
                unresolved: pending.len(),
            });
        }

        let mut report = AccumulationReport::default();
        for idx in 0..grid.len() {
            let total = grid.accumulation[idx].load(Ordering::Acquire);
            report.max_accumulation = report.max_accumulation.max(total);
        }
        report.border_total = grid
            .edge_seeds()
            .into_iter()
            .map(|idx| grid.accumulation[idx].load(Ordering::Acquire))
            .sum();

        let interior = grid.interior_count() as u64;
        if report.border_total != interior {
            return Err(Error::Algorithm(format!(
                "border cells account for {} upstream cells, expected {}",
                report.border_total, interior
            )));
        }
        Ok(report)
    }
}

/// Accumulate from every boundary cell, split across `threads` workers,
/// then verify the result.
pub fn accumulate_from_edges(grid: &FlowGrid, threads: usize) -> Result<AccumulationReport> {
    let seeds = grid.edge_seeds();
    let parts = partition(seeds.len(), threads);
    debug!(seeds = seeds.len(), partitions = parts.len(), "accumulating from edges");

    let accumulator = FlowAccumulator::new(grid);
    PhasePool::new("accumulation", parts.len()).run_partitions(&parts, |part| {
        for &seed in &seeds[part.range.clone()] {
            if accumulator.is_aborted() {
                break;
            }
            if let Err(err) = accumulator.accumulate_index(seed) {
                accumulator.abort();
                return Err(err);
            }
        }
        Ok(())
    })?;

    let mut report = accumulator.verify()?;
    report.seeds = seeds.len();
    Ok(report)
}

//! Shared cell grid for the hydrology phases
//!
//! Heights and directions are plain buffers: the fill mutates heights on
//! one thread and the direction phases write disjoint row blocks. The
//! accumulation total and the claim state of each cell are atomics, since
//! the accumulation phase reaches cells from several workers at once.

use lahar_core::io::Products;
use lahar_core::{Error, FlowDirection, GeoMetadata, Raster, Result};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Claim word of a cell nobody has started on
pub(crate) const FREE: u32 = 0;
/// Claim word of a cell whose total is published
pub(crate) const READY: u32 = u32::MAX;

/// Read-only view of one cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    pub height: f32,
    pub row: usize,
    pub col: usize,
    pub direction: FlowDirection,
    /// Upstream cell count, once the accumulation phase has produced it
    pub accumulation: Option<u64>,
}

/// Row-major terrain grid owned by one run
#[derive(Debug)]
pub struct FlowGrid {
    rows: usize,
    cols: usize,
    pub(crate) heights: Vec<f32>,
    pub(crate) directions: Vec<FlowDirection>,
    pub(crate) accumulation: Vec<AtomicU64>,
    pub(crate) state: Vec<AtomicU32>,
    meta: GeoMetadata,
}

impl FlowGrid {
    /// Build a grid from loaded heights; the raster must be at least 2x2.
    ///
    /// Border cells get their outward direction immediately, interior
    /// cells start unresolved.
    pub fn new(heights: Raster<f32>, meta: GeoMetadata) -> Result<Self> {
        heights.ensure_min_size()?;
        let (rows, cols) = heights.shape();
        let len = rows * cols;
        let directions = (0..len)
            .map(|idx| FlowDirection::border(idx / cols, idx % cols, rows, cols))
            .collect();

        Ok(Self {
            rows,
            cols,
            heights: heights.into_vec(),
            directions,
            accumulation: (0..len).map(|_| AtomicU64::new(0)).collect(),
            state: (0..len).map(|_| AtomicU32::new(FREE)).collect(),
            meta,
        })
    }

    /// Grid with default georeferencing, mostly for tests and benches
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        Self::new(Raster::from_rows(rows)?, GeoMetadata::default())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn len(&self) -> usize {
        self.heights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heights.is_empty()
    }

    pub fn meta(&self) -> &GeoMetadata {
        &self.meta
    }

    /// Number of cells not on the border
    pub fn interior_count(&self) -> usize {
        self.rows.saturating_sub(2) * self.cols.saturating_sub(2)
    }

    #[inline]
    pub(crate) fn index(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    #[inline]
    pub(crate) fn position(&self, idx: usize) -> (usize, usize) {
        (idx / self.cols, idx % self.cols)
    }

    #[inline]
    pub fn is_border(&self, row: usize, col: usize) -> bool {
        row == 0 || col == 0 || row + 1 == self.rows || col + 1 == self.cols
    }

    fn check_bounds(&self, row: usize, col: usize) -> Result<usize> {
        if row >= self.rows || col >= self.cols {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(self.index(row, col))
    }

    /// Snapshot of the cell at (row, col)
    pub fn cell(&self, row: usize, col: usize) -> Result<Cell> {
        let idx = self.check_bounds(row, col)?;
        Ok(Cell {
            height: self.heights[idx],
            row,
            col,
            direction: self.directions[idx],
            accumulation: self.ready_total(idx),
        })
    }

    pub fn height(&self, row: usize, col: usize) -> Result<f32> {
        Ok(self.heights[self.check_bounds(row, col)?])
    }

    pub fn direction(&self, row: usize, col: usize) -> Result<FlowDirection> {
        Ok(self.directions[self.check_bounds(row, col)?])
    }

    /// Overwrite one direction. Intended for callers that bring their own
    /// direction assignment before accumulating.
    pub fn set_direction(&mut self, row: usize, col: usize, direction: FlowDirection) -> Result<()> {
        let idx = self.check_bounds(row, col)?;
        self.directions[idx] = direction;
        Ok(())
    }

    pub fn accumulation(&self, row: usize, col: usize) -> Result<Option<u64>> {
        Ok(self.ready_total(self.check_bounds(row, col)?))
    }

    pub(crate) fn ready_total(&self, idx: usize) -> Option<u64> {
        (self.state[idx].load(Ordering::Acquire) == READY)
            .then(|| self.accumulation[idx].load(Ordering::Acquire))
    }

    /// Cell the direction at `idx` leads to, `None` when it leaves the grid.
    pub(crate) fn downstream(&self, idx: usize) -> Option<usize> {
        let (row, col) = self.position(idx);
        self.directions[idx]
            .step(row, col, 1, self.rows, self.cols)
            .map(|(r, c)| self.index(r, c))
    }

    /// Neighbours whose direction points into `idx`
    pub(crate) fn upstream(&self, idx: usize) -> impl Iterator<Item = usize> + '_ {
        let (row, col) = self.position(idx);
        FlowDirection::ALL.into_iter().filter_map(move |dir| {
            let (r, c) = dir.step(row, col, 1, self.rows, self.cols)?;
            let n = self.index(r, c);
            (self.directions[n] == dir.opposite()).then_some(n)
        })
    }

    /// Boundary cells in seeding order: the top row left to right, then the
    /// left and right cell of each middle row, then the bottom row.
    pub fn edge_seeds(&self) -> Vec<usize> {
        let (rows, cols) = (self.rows, self.cols);
        let mut seeds = Vec::with_capacity(2 * rows + 2 * cols - 4);
        seeds.extend((0..cols).map(|col| self.index(0, col)));
        for row in 1..rows - 1 {
            seeds.push(self.index(row, 0));
            seeds.push(self.index(row, cols - 1));
        }
        seeds.extend((0..cols).map(|col| self.index(rows - 1, col)));
        seeds
    }

    /// Restore directions and accumulation state for the row block
    /// starting at `first_row`. `directions` must be exactly that block.
    pub(crate) fn reset_rows(&self, first_row: usize, directions: &mut [FlowDirection]) {
        let start = first_row * self.cols;
        for (offset, dir) in directions.iter_mut().enumerate() {
            let idx = start + offset;
            let (row, col) = self.position(idx);
            *dir = FlowDirection::border(row, col, self.rows, self.cols);
            self.accumulation[idx].store(0, Ordering::Relaxed);
            self.state[idx].store(FREE, Ordering::Relaxed);
        }
    }

    pub fn heights_raster(&self) -> Result<Raster<f32>> {
        Raster::from_vec(self.heights.clone(), self.rows, self.cols)
    }

    pub fn directions_raster(&self) -> Result<Raster<u8>> {
        let codes = self.directions.iter().map(|d| d.code()).collect();
        Raster::from_vec(codes, self.rows, self.cols)
    }

    /// Accumulation totals; cells without a published total read as 0.
    pub fn accumulation_raster(&self) -> Result<Raster<u64>> {
        let totals = (0..self.len())
            .map(|idx| self.ready_total(idx).unwrap_or(0))
            .collect();
        Raster::from_vec(totals, self.rows, self.cols)
    }

    /// Hand the finished grid over to serialization
    pub fn into_products(self) -> Result<Products> {
        Ok(Products {
            heights: self.heights_raster()?,
            directions: self.directions_raster()?,
            totals: self.accumulation_raster()?,
            meta: self.meta,
        })
    }
}

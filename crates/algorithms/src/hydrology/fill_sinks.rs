//! Sink filling for hydrological analysis
//!
//! Implements the Planchon-Darboux (2001) algorithm for filling
//! depressions in a DEM to ensure continuous flow paths.
//!
//! Reference:
//! Planchon, O., Darboux, F. (2001). A fast, simple and versatile algorithm
//! to fill the depressions of digital elevation models.
//! Catena, 46(2-3), 159-176.

use super::grid::FlowGrid;
use lahar_core::raster::Raster;
use lahar_core::{Algorithm, Error, FlowDirection, Result};
use tracing::{debug, warn};

/// Longest chain followed by a single dry-upward propagation. Cells past
/// the cap are dried but not expanded; later sweeps pick them up.
pub const MAX_DRY_DEPTH: usize = 32_000;

/// Parameters for sink filling
#[derive(Debug, Clone)]
pub struct FillSinksParams {
    /// Minimum drop enforced between a cell and its outlet neighbour
    /// (scaled by sqrt 2 for diagonals). 0.0 gives an exact fill that
    /// leaves flat areas.
    pub min_slope: f64,
    /// Upper bound on full cycles of the eight scan orders
    pub max_iterations: usize,
}

impl Default for FillSinksParams {
    fn default() -> Self {
        Self {
            min_slope: 0.01,
            max_iterations: 1000,
        }
    }
}

impl FillSinksParams {
    pub fn validate(&self) -> Result<()> {
        if !self.min_slope.is_finite() || self.min_slope < 0.0 {
            return Err(Error::InvalidParameter {
                name: "min_slope",
                value: self.min_slope.to_string(),
                reason: "must be a finite value >= 0".into(),
            });
        }
        if self.max_iterations == 0 {
            return Err(Error::InvalidParameter {
                name: "max_iterations",
                value: "0".into(),
                reason: "at least one iteration is required".into(),
            });
        }
        Ok(())
    }
}

/// What a fill run did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FillReport {
    /// Cycles of the scan orders started (the last may be partial)
    pub iterations: usize,
    /// Individual sweeps performed
    pub sweeps: usize,
    /// Cells whose height was raised
    pub raised_cells: usize,
    /// Whether a sweep finished without changes before the cap
    pub converged: bool,
    /// Cells dried past `MAX_DRY_DEPTH` and left for later sweeps
    pub deferred_dry: usize,
    /// Cells walled in by no-data that no border reaches; kept as they were
    pub enclosed_cells: usize,
}

/// Fill sinks algorithm
#[derive(Debug, Clone, Default)]
pub struct FillSinks;

impl Algorithm for FillSinks {
    type Input = Raster<f32>;
    type Output = Raster<f32>;
    type Params = FillSinksParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Fill Sinks"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        input.ensure_min_size()?;
        let (rows, cols) = input.shape();
        let mut heights = input.into_vec();
        fill_heights(&mut heights, rows, cols, &params)?;
        Raster::from_vec(heights, rows, cols)
    }
}

/// One raster scan order
#[derive(Debug, Clone, Copy)]
struct ScanOrder {
    row_major: bool,
    rows_ascending: bool,
    cols_ascending: bool,
}

const fn scan(row_major: bool, rows_ascending: bool, cols_ascending: bool) -> ScanOrder {
    ScanOrder {
        row_major,
        rows_ascending,
        cols_ascending,
    }
}

/// The eight sweeps of one cycle
const SCAN_ORDERS: [ScanOrder; 8] = [
    scan(true, true, true),
    scan(true, false, false),
    scan(false, true, false),
    scan(false, false, true),
    scan(true, true, false),
    scan(true, false, true),
    scan(false, true, true),
    scan(false, false, false),
];

impl ScanOrder {
    fn for_each(self, rows: usize, cols: usize, mut visit: impl FnMut(usize, usize)) {
        let (outer, inner) = if self.row_major { (rows, cols) } else { (cols, rows) };
        let (outer_asc, inner_asc) = if self.row_major {
            (self.rows_ascending, self.cols_ascending)
        } else {
            (self.cols_ascending, self.rows_ascending)
        };
        for o in 0..outer {
            let o = if outer_asc { o } else { outer - 1 - o };
            for i in 0..inner {
                let i = if inner_asc { i } else { inner - 1 - i };
                if self.row_major {
                    visit(o, i);
                } else {
                    visit(i, o);
                }
            }
        }
    }
}

/// Fill the depressions of the grid's heights in place.
///
/// Runs on the calling thread. Filling an already filled grid with the
/// same parameters changes nothing.
pub fn fill_sinks(grid: &mut FlowGrid, params: &FillSinksParams) -> Result<FillReport> {
    let (rows, cols) = grid.shape();
    fill_heights(&mut grid.heights, rows, cols, params)
}

/// Planchon-Darboux on a row-major height buffer.
pub fn fill_heights(heights: &mut [f32], rows: usize, cols: usize, params: &FillSinksParams) -> Result<FillReport> {
    params.validate()?;
    if heights.len() != rows * cols {
        return Err(Error::SizeMismatch {
            er: rows,
            ec: cols,
            ar: heights.len() / cols.max(1),
            ac: cols,
        });
    }

    let mut filler = Filler::new(&*heights, rows, cols, params.min_slope);
    filler.dry_from_border();

    let mut report = FillReport::default();
    'cycles: for cycle in 0..params.max_iterations {
        report.iterations = cycle + 1;
        for order in SCAN_ORDERS {
            report.sweeps += 1;
            if !filler.sweep(order) {
                report.converged = true;
                break 'cycles;
            }
        }
    }

    report.deferred_dry = filler.deferred;
    let surface = filler.into_surface();
    (report.raised_cells, report.enclosed_cells) = commit(heights, surface);
    if report.enclosed_cells > 0 {
        warn!(cells = report.enclosed_cells, "cells enclosed by no-data keep their height");
    }

    if report.converged {
        debug!(
            iterations = report.iterations,
            sweeps = report.sweeps,
            raised = report.raised_cells,
            "fill converged"
        );
    } else {
        warn!(
            max_iterations = params.max_iterations,
            raised = report.raised_cells,
            "fill stopped at the iteration cap"
        );
    }
    Ok(report)
}

struct Filler<'a> {
    z: &'a [f32],
    w: Vec<f32>,
    rows: usize,
    cols: usize,
    /// Minimum drop per direction, indexed by direction code
    eps: [f32; 8],
    deferred: usize,
    stack: Vec<(usize, usize)>,
}

impl<'a> Filler<'a> {
    fn new(z: &'a [f32], rows: usize, cols: usize, min_slope: f64) -> Self {
        let mut eps = [0.0f32; 8];
        for dir in FlowDirection::ALL {
            eps[dir.code() as usize] = (min_slope * dir.distance()) as f32;
        }

        // Border and no-data cells start dry, everything else under water.
        let w = z
            .iter()
            .enumerate()
            .map(|(idx, &h)| {
                let (row, col) = (idx / cols, idx % cols);
                let border = row == 0 || col == 0 || row + 1 == rows || col + 1 == cols;
                if border || h.is_nan() {
                    h
                } else {
                    f32::INFINITY
                }
            })
            .collect();

        Self {
            z,
            w,
            rows,
            cols,
            eps,
            deferred: 0,
            stack: Vec::new(),
        }
    }

    fn dry_from_border(&mut self) {
        for col in 0..self.cols {
            for row in 0..self.rows {
                if row == 0 || col == 0 || row + 1 == self.rows || col + 1 == self.cols {
                    self.dry_upward(row * self.cols + col);
                }
            }
        }
    }

    /// Dry every wet neighbour that sits at least `eps` above `start`,
    /// then continue from each newly dried cell.
    fn dry_upward(&mut self, start: usize) {
        let mut stack = std::mem::take(&mut self.stack);
        stack.push((start, 0));

        while let Some((idx, depth)) = stack.pop() {
            let (row, col) = (idx / self.cols, idx % self.cols);
            let wc = self.w[idx];
            for dir in FlowDirection::ALL {
                let Some((r, c)) = dir.step(row, col, 1, self.rows, self.cols) else {
                    continue;
                };
                let n = r * self.cols + c;
                let zn = self.z[n];
                if self.w[n] > zn && zn >= wc + self.eps[dir.code() as usize] {
                    self.w[n] = zn;
                    if depth + 1 < MAX_DRY_DEPTH {
                        stack.push((n, depth + 1));
                    } else {
                        self.deferred += 1;
                    }
                }
            }
        }

        self.stack = stack;
    }

    /// One pass in `order`; returns whether anything changed.
    fn sweep(&mut self, order: ScanOrder) -> bool {
        let (rows, cols) = (self.rows, self.cols);
        let mut changed = false;
        order.for_each(rows, cols, |row, col| {
            let idx = row * cols + col;
            let z = self.z[idx];
            if !(self.w[idx] > z) {
                return;
            }
            for dir in FlowDirection::ALL {
                let Some((r, c)) = dir.step(row, col, 1, rows, cols) else {
                    continue;
                };
                let wn = self.w[r * cols + c] + self.eps[dir.code() as usize];
                if z >= wn {
                    self.w[idx] = z;
                    changed = true;
                    self.dry_upward(idx);
                    break;
                }
                if self.w[idx] > wn {
                    self.w[idx] = wn;
                    changed = true;
                }
            }
        });
        changed
    }

    fn into_surface(self) -> Vec<f32> {
        self.w
    }
}

/// Copy the water surface into `heights`. Cells the surface never reached
/// (still at +inf) keep their height. Returns the raised and enclosed counts.
fn commit(heights: &mut [f32], surface: Vec<f32>) -> (usize, usize) {
    let mut raised = 0;
    let mut enclosed = 0;
    for (h, w) in heights.iter_mut().zip(surface) {
        if w == f32::INFINITY && *h != f32::INFINITY {
            enclosed += 1;
            continue;
        }
        if w > *h {
            raised += 1;
        }
        *h = w;
    }
    (raised, enclosed)
}

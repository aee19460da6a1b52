//! D8 flow direction with radial tie breaking
//!
//! Border cells keep the outward direction given by their position.
//! Every interior cell either drains toward the nearest raster edge (no-data
//! cells) or toward its steepest drop. Ties on the immediate neighbours are
//! settled by comparing the tied directions again one cell farther out,
//! until a single direction remains or the search reaches the edge.
//!
//! Direction encoding:
//! ```text
//!   7  0  1
//!   6  8  2
//!   5  4  3
//! ```

use super::grid::FlowGrid;
use lahar_core::{Error, FlowDirection, Result};
use lahar_parallel::{partition, split_rows_mut, PhasePool};
use std::ops::Add;
use tracing::debug;

/// Parameters for direction resolution
#[derive(Debug, Clone)]
pub struct FlowDirectionParams {
    /// Heights below this value (and NaN) are treated as no-data
    pub nodata_threshold: f32,
}

impl Default for FlowDirectionParams {
    fn default() -> Self {
        Self {
            nodata_threshold: -1000.0,
        }
    }
}

impl FlowDirectionParams {
    pub fn validate(&self) -> Result<()> {
        if self.nodata_threshold.is_nan() {
            return Err(Error::InvalidParameter {
                name: "nodata_threshold",
                value: "NaN".into(),
                reason: "must be a number".into(),
            });
        }
        Ok(())
    }

    fn is_nodata(&self, height: f32) -> bool {
        height.is_nan() || height < self.nodata_threshold
    }
}

/// How a cell's direction was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Unique steepest drop among the immediate neighbours
    Direct,
    /// Tie broken by looking farther out
    Extended,
    /// Tie still open when the search reached the raster edge
    EdgeFallback,
    /// No-data cell sent to the nearest edge
    NoData,
}

/// Counts of the non-trivial resolutions in one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirectionReport {
    pub resolved: usize,
    pub nodata: usize,
    pub extended: usize,
    pub edge_fallback: usize,
}

impl DirectionReport {
    fn record(&mut self, resolution: Resolution) {
        self.resolved += 1;
        match resolution {
            Resolution::Direct => {}
            Resolution::Extended => self.extended += 1,
            Resolution::EdgeFallback => self.edge_fallback += 1,
            Resolution::NoData => self.nodata += 1,
        }
    }
}

impl Add for DirectionReport {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            resolved: self.resolved + other.resolved,
            nodata: self.nodata + other.nodata,
            extended: self.extended + other.extended,
            edge_fallback: self.edge_fallback + other.edge_fallback,
        }
    }
}

/// Resolve the direction of every interior cell.
///
/// Rows are split into `min(threads, rows)` contiguous blocks. Workers read
/// heights anywhere but only write the directions of their own rows.
pub fn resolve_flow_directions(
    grid: &mut FlowGrid,
    params: &FlowDirectionParams,
    threads: usize,
) -> Result<DirectionReport> {
    params.validate()?;
    let (rows, cols) = grid.shape();
    let parts = partition(rows, threads);
    debug!(rows, cols, partitions = parts.len(), "resolving flow directions");

    let heights = &grid.heights;
    let blocks = split_rows_mut(&mut grid.directions, cols, &parts);
    let items: Vec<_> = parts.iter().zip(blocks).collect();

    let reports = PhasePool::new("direction", parts.len()).run(items, |(part, block)| {
        let mut report = DirectionReport::default();
        for row in part.range.clone() {
            if row == 0 || row + 1 == rows {
                continue;
            }
            let local = (row - part.range.start) * cols;
            for col in 1..cols - 1 {
                let (dir, how) = resolve_cell(heights, rows, cols, row, col, params);
                block[local + col] = dir;
                report.record(how);
            }
        }
        Ok(report)
    })?;

    Ok(reports.into_iter().fold(DirectionReport::default(), Add::add))
}

/// Direction of the interior cell at (row, col)
pub(crate) fn resolve_cell(
    heights: &[f32],
    rows: usize,
    cols: usize,
    row: usize,
    col: usize,
    params: &FlowDirectionParams,
) -> (FlowDirection, Resolution) {
    let height = heights[row * cols + col];
    if params.is_nodata(height) {
        return (nearest_edge(row, col, rows, cols), Resolution::NoData);
    }

    let mut survivors = FlowDirection::ALL;
    let mut count = 0;
    for dir in FlowDirection::ALL {
        if !routes_back(heights, rows, cols, row, col, dir, params) {
            survivors[count] = dir;
            count += 1;
        }
    }
    if count == 0 {
        count = survivors.len();
    }
    let mut radius = 1;

    loop {
        let mut targets = [0usize; 8];
        for (k, dir) in survivors[..count].iter().enumerate() {
            match dir.step(row, col, radius, rows, cols) {
                Some((r, c)) => targets[k] = r * cols + c,
                None => {
                    let dir = edge_fallback(&survivors[..count], row, col, rows, cols);
                    return (dir, Resolution::EdgeFallback);
                }
            }
        }

        let mut drops = [f32::NEG_INFINITY; 8];
        let mut best = f32::NEG_INFINITY;
        for k in 0..count {
            let drop = height - heights[targets[k]];
            if drop > best {
                best = drop;
            }
            // NaN never wins and never ties
            drops[k] = if drop.is_nan() { f32::NEG_INFINITY } else { drop };
        }

        let mut kept = 0;
        for k in 0..count {
            if drops[k] == best {
                survivors[kept] = survivors[k];
                kept += 1;
            }
        }
        count = kept;

        if count == 1 {
            let how = if radius == 1 {
                Resolution::Direct
            } else {
                Resolution::Extended
            };
            return (survivors[0], how);
        }
        radius += 1;
    }
}

/// Whether the neighbour in `dir` is a no-data cell whose edge route
/// steps straight back onto (row, col).
fn routes_back(
    heights: &[f32],
    rows: usize,
    cols: usize,
    row: usize,
    col: usize,
    dir: FlowDirection,
    params: &FlowDirectionParams,
) -> bool {
    match dir.step(row, col, 1, rows, cols) {
        Some((r, c)) => {
            params.is_nodata(heights[r * cols + c]) && nearest_edge(r, c, rows, cols) == dir.opposite()
        }
        None => false,
    }
}

/// Direction toward the closest raster edge.
///
/// Equal distances on one axis go to the half of the grid the cell lies
/// in; equal distances on both axes give the diagonal between them.
pub fn nearest_edge(row: usize, col: usize, rows: usize, cols: usize) -> FlowDirection {
    let north = row;
    let south = rows - 1 - row;
    let west = col;
    let east = cols - 1 - col;

    let (vertical, to_north) = if north != south {
        (north.min(south), north < south)
    } else {
        (north, row * 2 < rows)
    };
    let (horizontal, to_west) = if west != east {
        (west.min(east), west < east)
    } else {
        (west, col * 2 < cols)
    };

    match (vertical.cmp(&horizontal), to_north, to_west) {
        (std::cmp::Ordering::Less, true, _) => FlowDirection::N,
        (std::cmp::Ordering::Less, false, _) => FlowDirection::S,
        (std::cmp::Ordering::Greater, _, true) => FlowDirection::W,
        (std::cmp::Ordering::Greater, _, false) => FlowDirection::E,
        (std::cmp::Ordering::Equal, true, true) => FlowDirection::NW,
        (std::cmp::Ordering::Equal, true, false) => FlowDirection::NE,
        (std::cmp::Ordering::Equal, false, true) => FlowDirection::SW,
        (std::cmp::Ordering::Equal, false, false) => FlowDirection::SE,
    }
}

fn edge_distance(row: usize, col: usize, rows: usize, cols: usize) -> usize {
    row.min(rows - 1 - row).min(col).min(cols - 1 - col)
}

/// Pick among directions still tied when the search hit the edge.
fn edge_fallback(survivors: &[FlowDirection], row: usize, col: usize, rows: usize, cols: usize) -> FlowDirection {
    let nearest = nearest_edge(row, col, rows, cols);
    if survivors.contains(&nearest) {
        return nearest;
    }
    survivors
        .iter()
        .filter_map(|&dir| {
            let (r, c) = dir.step(row, col, 1, rows, cols)?;
            Some((dir, edge_distance(r, c, rows, cols)))
        })
        .min_by_key(|&(_, distance)| distance)
        .map_or(nearest, |(dir, _)| dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> FlowDirectionParams {
        FlowDirectionParams::default()
    }

    #[test]
    fn test_nearest_edge_axes() {
        // 5x5 centre: every distance ties
        assert_eq!(nearest_edge(2, 2, 5, 5), FlowDirection::NW);
        assert_eq!(nearest_edge(1, 2, 5, 5), FlowDirection::N);
        assert_eq!(nearest_edge(3, 1, 6, 6), FlowDirection::W);
        assert_eq!(nearest_edge(2, 2, 6, 6), FlowDirection::NW);
        assert_eq!(nearest_edge(3, 3, 6, 6), FlowDirection::SE);
        assert_eq!(nearest_edge(2, 3, 6, 6), FlowDirection::NE);
        assert_eq!(nearest_edge(4, 2, 6, 8), FlowDirection::S);
    }

    #[test]
    fn test_steepest_drop() {
        // Plane falling toward the east
        let heights: Vec<f32> = (0..25).map(|i| 10.0 - (i % 5) as f32).collect();
        let (dir, how) = resolve_cell(&heights, 5, 5, 2, 2, &params());
        // E, NE and SE all drop by 1 at every radius until the edge.
        // NE, E and SE neighbours are all one cell from the edge; NE comes first.
        assert_eq!((dir, how), (FlowDirection::NE, Resolution::EdgeFallback));

        let mut heights = vec![5.0f32; 9];
        heights[8] = 1.0;
        let (dir, how) = resolve_cell(&heights, 3, 3, 1, 1, &params());
        assert_eq!((dir, how), (FlowDirection::SE, Resolution::Direct));
    }

    #[test]
    fn test_tie_broken_farther_out() {
        let mut heights = vec![9.0f32; 25];
        let at = |r: usize, c: usize| r * 5 + c;
        heights[at(2, 2)] = 5.0;
        for (r, c) in [(1, 1), (1, 3), (2, 1), (2, 3), (3, 1), (3, 3)] {
            heights[at(r, c)] = 4.5;
        }
        heights[at(1, 2)] = 3.0;
        heights[at(3, 2)] = 3.0;
        heights[at(0, 2)] = 1.0;
        heights[at(4, 2)] = 2.0;

        let (dir, how) = resolve_cell(&heights, 5, 5, 2, 2, &params());
        assert_eq!(dir, FlowDirection::N);
        assert_eq!(how, Resolution::Extended);
    }

    #[test]
    fn test_flat_centre_uses_nearest_edge() {
        let heights = vec![1.0f32; 25];
        let (dir, how) = resolve_cell(&heights, 5, 5, 2, 2, &params());
        assert_eq!((dir, how), (FlowDirection::NW, Resolution::EdgeFallback));
    }

    #[test]
    fn test_fallback_without_nearest_edge() {
        // nearest edge of (2,2) in 5x6 is NW, which is blocked
        let mut heights = vec![1.0f32; 30];
        heights[6 + 1] = 1.5;
        let (dir, how) = resolve_cell(&heights, 5, 6, 2, 2, &params());
        assert_eq!(how, Resolution::EdgeFallback);
        assert_eq!(dir, FlowDirection::N);
    }

    #[test]
    fn test_nodata_strip_goes_to_nearest_edge() {
        let mut rows_data = vec![vec![50.0f32; 6]; 6];
        rows_data[2] = vec![-9999.0; 6];
        let mut grid = FlowGrid::from_rows(rows_data).unwrap();
        let report = resolve_flow_directions(&mut grid, &params(), 2).unwrap();

        assert_eq!(grid.direction(2, 1).unwrap(), FlowDirection::W);
        assert_eq!(grid.direction(2, 2).unwrap(), FlowDirection::NW);
        assert_eq!(grid.direction(2, 3).unwrap(), FlowDirection::NE);
        assert_eq!(grid.direction(2, 4).unwrap(), FlowDirection::E);
        assert_eq!(report.nodata, 4);
        assert_eq!(report.resolved, 16);
    }

    #[test]
    fn test_partial_nodata_strip_never_points_back() {
        // Strip reaches only the east border
        let mut rows_data = vec![vec![50.0f32; 6]; 6];
        for col in 2..6 {
            rows_data[2][col] = -9999.0;
        }
        let mut grid = FlowGrid::from_rows(rows_data).unwrap();
        resolve_flow_directions(&mut grid, &params(), 3).unwrap();

        assert_eq!(grid.direction(2, 2).unwrap(), FlowDirection::NW);
        assert_eq!(grid.direction(2, 3).unwrap(), FlowDirection::NE);
        assert_eq!(grid.direction(2, 4).unwrap(), FlowDirection::E);
        // (2,2) drains onto (1,1); (1,1) must not drain back
        assert_ne!(grid.direction(1, 1).unwrap(), FlowDirection::SE);
        assert_ne!(grid.direction(1, 4).unwrap(), FlowDirection::SW);

        for row in 1..5 {
            for col in 1..5 {
                let dir = grid.direction(row, col).unwrap();
                let (r, c) = dir.step(row, col, 1, 6, 6).unwrap();
                let back = grid.direction(r, c).unwrap();
                assert_ne!(back, dir.opposite(), "2-cycle at ({row},{col})");
            }
        }
    }

    #[test]
    fn test_border_untouched() {
        let mut grid = FlowGrid::from_rows(vec![vec![3.0; 4]; 4]).unwrap();
        resolve_flow_directions(&mut grid, &params(), 3).unwrap();
        assert_eq!(grid.direction(0, 0).unwrap(), FlowDirection::NW);
        assert_eq!(grid.direction(0, 2).unwrap(), FlowDirection::N);
        assert_eq!(grid.direction(3, 3).unwrap(), FlowDirection::SE);
        assert_eq!(grid.direction(2, 3).unwrap(), FlowDirection::E);
    }

    #[test]
    fn test_every_interior_cell_resolved() {
        let data: Vec<Vec<f32>> = (0..9)
            .map(|r| (0..11).map(|c| ((r * 7 + c * 3) % 5) as f32).collect())
            .collect();
        let mut grid = FlowGrid::from_rows(data).unwrap();
        resolve_flow_directions(&mut grid, &params(), 4).unwrap();
        for row in 0..9 {
            for col in 0..11 {
                assert_ne!(grid.direction(row, col).unwrap(), FlowDirection::None, "({row},{col})");
            }
        }
    }

    #[test]
    fn test_thread_count_does_not_matter() {
        let data: Vec<Vec<f32>> = (0..13)
            .map(|r| (0..10).map(|c| ((r * 31 + c * 17) % 23) as f32 * 0.5).collect())
            .collect();
        let mut reference = FlowGrid::from_rows(data.clone()).unwrap();
        resolve_flow_directions(&mut reference, &params(), 1).unwrap();
        let expected = reference.directions_raster().unwrap();

        for threads in [2, 8] {
            let mut grid = FlowGrid::from_rows(data.clone()).unwrap();
            resolve_flow_directions(&mut grid, &params(), threads).unwrap();
            assert_eq!(grid.directions_raster().unwrap(), expected, "threads = {}", threads);
        }
    }

    #[test]
    fn test_rejects_nan_threshold() {
        let mut grid = FlowGrid::from_rows(vec![vec![1.0; 3]; 3]).unwrap();
        let bad = FlowDirectionParams {
            nodata_threshold: f32::NAN,
        };
        assert!(resolve_flow_directions(&mut grid, &bad, 1).is_err());
    }
}

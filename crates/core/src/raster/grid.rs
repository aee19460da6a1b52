//! Main Raster type

use crate::error::{Error, Result};
use crate::raster::RasterElement;
use ndarray::{Array2, ArrayView1};

/// A 2D raster grid stored row-major.
///
/// `Raster<T>` is the exchange type between the I/O layer and the
/// hydrology engine: decoded heights arrive as `Raster<f32>`, and the
/// engine hands back heights, direction codes (`Raster<u8>`) and flow
/// totals (`Raster<u64>`) for serialization. Georeferencing travels
/// separately in [`GeoMetadata`](crate::GeoMetadata).
///
/// # Example
///
/// ```ignore
/// use lahar_core::Raster;
///
/// let mut raster: Raster<f32> = Raster::new(100, 100);
/// raster.set(10, 20, 42.0)?;
/// let value = raster.get(10, 20)?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Raster<T: RasterElement> {
    /// Raster data stored in row-major order (row, col)
    data: Array2<T>,
}

impl<T: RasterElement> Raster<T> {
    /// Create a new raster filled with zeros
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            data: Array2::zeros((rows, cols)),
        }
    }

    /// Create a raster from row-major data
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::SizeMismatch {
                er: rows,
                ec: cols,
                ar: data.len() / cols.max(1),
                ac: cols,
            });
        }

        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Algorithm(e.to_string()))?;

        Ok(Self { data: array })
    }

    /// Create a raster from nested rows; every row must have the same length
    pub fn from_rows(rows: Vec<Vec<T>>) -> Result<Self> {
        let height = rows.len();
        let width = rows.first().map_or(0, Vec::len);
        let mut data = Vec::with_capacity(height * width);
        for (idx, row) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(Error::SizeMismatch {
                    er: idx,
                    ec: width,
                    ar: idx,
                    ac: row.len(),
                });
            }
            data.extend(row);
        }
        Self::from_vec(data, height, width)
    }

    // Dimensions

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    /// Dimensions as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    /// Total number of cells
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the raster is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Fail unless the raster is at least 2x2, the smallest grid with a
    /// well-defined border.
    pub fn ensure_min_size(&self) -> Result<()> {
        let (rows, cols) = self.shape();
        if rows < 2 || cols < 2 {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        Ok(())
    }

    // Data access

    /// Get value at (row, col)
    pub fn get(&self, row: usize, col: usize) -> Result<T> {
        self.data
            .get((row, col))
            .copied()
            .ok_or(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            })
    }

    /// Set value at (row, col)
    pub fn set(&mut self, row: usize, col: usize, value: T) -> Result<()> {
        if row >= self.rows() || col >= self.cols() {
            return Err(Error::IndexOutOfBounds {
                row,
                col,
                rows: self.rows(),
                cols: self.cols(),
            });
        }
        self.data[(row, col)] = value;
        Ok(())
    }

    /// Iterate over rows in order
    pub fn row_views(&self) -> impl Iterator<Item = ArrayView1<'_, T>> {
        self.data.rows().into_iter()
    }

    /// Consume the raster and return its values in row-major order
    pub fn into_vec(self) -> Vec<T> {
        self.data.iter().copied().collect()
    }

    // Statistics

    /// Minimum, maximum and count of present values
    pub fn statistics(&self) -> RasterStatistics<T> {
        let mut min: Option<T> = None;
        let mut max: Option<T> = None;
        let mut count: usize = 0;

        for &value in self.data.iter() {
            if value.is_missing() {
                continue;
            }
            if min.map_or(true, |m| value < m) {
                min = Some(value);
            }
            if max.map_or(true, |m| value > m) {
                max = Some(value);
            }
            count += 1;
        }

        RasterStatistics {
            min,
            max,
            valid_count: count,
            missing_count: self.len() - count,
        }
    }
}

/// Basic statistics for a raster
#[derive(Debug, Clone)]
pub struct RasterStatistics<T> {
    pub min: Option<T>,
    pub max: Option<T>,
    pub valid_count: usize,
    pub missing_count: usize,
}

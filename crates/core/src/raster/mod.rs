//! Raster data structures and operations

mod direction;
mod element;
mod geotransform;
mod grid;

pub use direction::FlowDirection;
pub use element::RasterElement;
pub use geotransform::{GeoMetadata, GeoTransform};
pub use grid::{Raster, RasterStatistics};

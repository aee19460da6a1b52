//! # Lahar Core
//!
//! Core types, errors and I/O for the lahar terrain-hydrology engine.
//!
//! This crate provides:
//! - `Raster<T>`: row-major grid exchanged between I/O and the engine
//! - `GeoTransform` / `GeoMetadata`: georeferencing passed through to outputs
//! - `FlowDirection`: the D8 direction encoding used on disk
//! - I/O: GeoTIFF and TSV input, TSV and INI output

pub mod error;
pub mod io;
pub mod raster;

pub use error::{Error, Result};
pub use raster::{FlowDirection, GeoMetadata, GeoTransform, Raster, RasterElement};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::raster::{FlowDirection, GeoMetadata, GeoTransform, Raster, RasterElement};
    pub use crate::Algorithm;
}

/// Common shape of the engine's entry points.
///
/// An algorithm consumes its input by value and returns a new product;
/// parameters always have a usable default.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params: Default;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}

//! # floodfuse core
//!
//! Core types, traits and I/O for the floodfuse feature pipeline.
//!
//! This crate provides:
//! - `Raster<T>`: Generic georeferenced raster grid
//! - `GeoTransform`: Affine transformation for georeferencing
//! - `CRS`: Coordinate Reference System handling
//! - `VectorLayer`: Immutable feature layers handed to the pipeline
//! - I/O for GeoTIFF and GeoJSON (GDAL/OGR behind the `gdal` feature)
//! - `GisRuntime` and `ScratchSpace`: scoped resources for a pipeline run

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod runtime;
pub mod vector;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{Congruence, GeoTransform, Raster, RasterElement};
pub use vector::VectorLayer;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::raster::{Congruence, GeoTransform, Raster, RasterElement};
    pub use crate::vector::{Feature, VectorLayer};
    pub use crate::Algorithm;
}

/// Core trait for the pipeline stages.
///
/// Stages are pure functions that transform input data according to parameters.
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

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;

    /// Execute with default parameters
    fn execute_default(&self, input: Self::Input) -> std::result::Result<Self::Output, Self::Error> {
        self.execute(input, Self::Params::default())
    }
}

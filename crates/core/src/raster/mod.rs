//! Raster data structures and operations

mod element;
mod geotransform;
mod grid;

pub use element::{nodata_matches, RasterElement, NODATA_TOLERANCE};
pub use geotransform::{intersect_bounds, Bounds, GeoTransform, GEOMETRY_TOLERANCE};
pub use grid::{Congruence, Raster, RasterStatistics};

//! I/O operations for reading and writing geospatial data
//!
//! [`load_raster`] and [`load_vector`] are the loading collaborators the
//! pipeline consumes: they either return a valid grid/layer or fail with
//! [`Error::Load`]. [`ScratchSpace`] holds intermediate grids for the
//! duration of a run.

#[cfg(feature = "gdal")]
mod gdal_io;
mod geojson_io;
mod native;
mod scratch;

use std::path::Path;

use tracing::info;

use crate::error::{Error, Result};
use crate::raster::{Raster, RasterElement};
use crate::vector::VectorLayer;

#[cfg(feature = "gdal")]
pub use gdal_io::{read_geotiff, read_vector, write_geotiff, GeoTiffOptions};

#[cfg(not(feature = "gdal"))]
pub use native::{read_geotiff, write_geotiff, GeoTiffOptions};

// Buffer-based I/O (always available, no filesystem dependency)
pub use native::{read_geotiff_from_buffer, write_geotiff_to_buffer};

pub use geojson_io::{parse_geojson, read_geojson};
pub use scratch::ScratchSpace;

/// Cell types the active raster backend can read and write
#[cfg(feature = "gdal")]
pub trait IoElement: RasterElement + gdal::raster::GdalType {}
#[cfg(feature = "gdal")]
impl<T: RasterElement + gdal::raster::GdalType> IoElement for T {}

/// Cell types the active raster backend can read and write
#[cfg(not(feature = "gdal"))]
pub trait IoElement: RasterElement {}
#[cfg(not(feature = "gdal"))]
impl<T: RasterElement> IoElement for T {}

/// Load the first band of a raster file.
///
/// Any failure to open or decode the source, and any structurally empty
/// grid, is reported as [`Error::Load`].
pub fn load_raster<T, P>(path: P) -> Result<Raster<T>>
where
    T: IoElement,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let raster: Raster<T> = read_geotiff(path, None).map_err(|e| match e {
        Error::Load { .. } => e,
        other => Error::load(path, other),
    })?;

    if raster.is_empty() {
        return Err(Error::load(path, "raster has no cells"));
    }

    info!(
        "{} loaded: {} x {}, crs {}",
        path.display(),
        raster.cols(),
        raster.rows(),
        raster
            .crs()
            .map(|c| c.identifier())
            .unwrap_or_else(|| "unset".into())
    );
    Ok(raster)
}

/// Write a raster with the active backend; the file is closed on return.
pub fn save_raster<T, P>(raster: &Raster<T>, path: P) -> Result<()>
where
    T: IoElement,
    P: AsRef<Path>,
{
    write_geotiff(raster, path, Some(GeoTiffOptions::default()))
}

/// Load a vector layer.
///
/// GeoJSON (`.geojson`, `.json`) is read natively; every other format goes
/// through OGR and needs the `gdal` feature.
pub fn load_vector<P: AsRef<Path>>(path: P) -> Result<VectorLayer> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let layer = match ext.as_str() {
        "geojson" | "json" => read_geojson(path).map_err(|e| match e {
            Error::Load { .. } => e,
            other => Error::load(path, other),
        })?,
        #[cfg(feature = "gdal")]
        _ => read_vector(path).map_err(|e| Error::load(path, e))?,
        #[cfg(not(feature = "gdal"))]
        _ => {
            return Err(Error::load(
                path,
                format!("unsupported vector format '.{}' (enable the gdal feature)", ext),
            ))
        }
    };

    info!("{} loaded: {} features", path.display(), layer.len());
    Ok(layer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_raster_is_a_load_error() {
        let err = load_raster::<f64, _>("does/not/exist.tif").unwrap_err();
        assert!(matches!(err, Error::Load { .. }), "got {err:?}");
    }

    #[test]
    fn missing_vector_is_a_load_error() {
        let err = load_vector("does/not/exist.geojson").unwrap_err();
        assert!(matches!(err, Error::Load { .. }), "got {err:?}");
    }

    #[cfg(not(feature = "gdal"))]
    #[test]
    fn shapefile_needs_gdal() {
        let err = load_vector("data/floods/points.shp").unwrap_err();
        assert!(err.to_string().contains("gdal"));
    }
}

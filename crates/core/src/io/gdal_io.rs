//! Raster and vector I/O through GDAL/OGR

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::{GeoTransform, Raster, RasterElement};
use crate::vector::{Feature, VectorLayer};
use gdal::raster::{Buffer, GdalType, RasterCreationOptions};
use gdal::spatial_ref::SpatialRef;
use gdal::vector::LayerAccess;
use gdal::{Dataset, DriverManager};
use std::path::Path;

/// Options for writing GeoTIFF files
#[derive(Debug, Clone)]
pub struct GeoTiffOptions {
    /// Compression type: "DEFLATE", "LZW", "ZSTD", "NONE"
    pub compression: String,
    /// Tile size for tiled TIFFs (0 for strips)
    pub tile_size: usize,
}

impl Default for GeoTiffOptions {
    fn default() -> Self {
        Self {
            compression: "LZW".to_string(),
            tile_size: 0,
        }
    }
}

fn crs_from_srs(srs: &SpatialRef) -> Option<CRS> {
    if let Ok(code) = srs.auth_code() {
        return Some(CRS::from_epsg(code as u32));
    }
    srs.to_wkt().ok().map(CRS::from_wkt)
}

/// Read a GeoTIFF (or any GDAL raster) into a Raster
///
/// # Arguments
/// * `path` - Path to the raster file
/// * `band` - Band number (1-indexed), defaults to 1
pub fn read_geotiff<T, P>(path: P, band: Option<usize>) -> Result<Raster<T>>
where
    T: RasterElement + GdalType + Copy,
    P: AsRef<Path>,
{
    let dataset = Dataset::open(path.as_ref())?;
    let rasterband = dataset.rasterband(band.unwrap_or(1))?;

    let (cols, rows) = dataset.raster_size();
    let buffer = rasterband.read_as::<T>((0, 0), (cols, rows), (cols, rows), None)?;
    let (_, data) = buffer.into_shape_and_vec();

    let mut raster = Raster::from_vec(data, rows, cols)?;

    if let Ok(gt) = dataset.geo_transform() {
        raster.set_transform(GeoTransform::from_gdal(gt));
    }

    if let Ok(srs) = dataset.spatial_ref() {
        raster.set_crs(crs_from_srs(&srs));
    }

    if let Some(nodata) = rasterband.no_data_value() {
        raster.set_nodata(num_traits::cast(nodata));
    }

    Ok(raster)
    // `dataset` is dropped here, closing the GDAL handle
}

/// Write a Raster to a GeoTIFF file
pub fn write_geotiff<T, P>(
    raster: &Raster<T>,
    path: P,
    options: Option<GeoTiffOptions>,
) -> Result<()>
where
    T: RasterElement + GdalType + Copy,
    P: AsRef<Path>,
{
    let opts = options.unwrap_or_default();
    let driver = DriverManager::get_driver_by_name("GTiff")?;

    let (rows, cols) = raster.shape();

    let mut create_options = vec![format!("COMPRESS={}", opts.compression)];
    if opts.tile_size > 0 {
        create_options.push("TILED=YES".to_string());
        create_options.push(format!("BLOCKXSIZE={}", opts.tile_size));
        create_options.push(format!("BLOCKYSIZE={}", opts.tile_size));
    }
    let create_options = RasterCreationOptions::from_iter(create_options);

    let mut dataset = driver.create_with_band_type_with_options::<T, _>(
        path.as_ref(),
        cols,
        rows,
        1,
        &create_options,
    )?;

    dataset.set_geo_transform(&raster.transform().to_gdal())?;

    if let Some(crs) = raster.crs() {
        if let Some(epsg) = crs.epsg() {
            dataset.set_spatial_ref(&SpatialRef::from_epsg(epsg)?)?;
        } else if let Some(wkt) = crs.wkt() {
            dataset.set_spatial_ref(&SpatialRef::from_wkt(wkt)?)?;
        }
    }

    let mut band = dataset.rasterband(1)?;
    if let Some(nodata) = raster.nodata().and_then(|nd| nd.to_f64()) {
        band.set_no_data_value(Some(nodata))?;
    }

    let data: Vec<T> = raster.data().iter().copied().collect();
    let mut buffer = Buffer::new((cols, rows), data);
    band.write((0, 0), (cols, rows), &mut buffer)?;

    Ok(())
}

/// Read the first layer of an OGR data source (Shapefile, GeoPackage, ...)
pub fn read_vector<P: AsRef<Path>>(path: P) -> Result<VectorLayer> {
    let path = path.as_ref();
    let dataset = Dataset::open(path)?;
    let mut layer = dataset.layer(0)?;

    let crs = layer.spatial_ref().as_ref().and_then(crs_from_srs);

    let mut features = Vec::new();
    for feature in layer.features() {
        let geometry = match feature.geometry() {
            Some(g) => Some(g.to_geo()?),
            None => None,
        };
        features.push(Feature {
            geometry,
            properties: Default::default(),
            id: feature.fid().map(|fid| fid.to_string()),
        });
    }

    Ok(VectorLayer::from_features(path.display().to_string(), crs, features))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_write_read_roundtrip() {
        let mut raster: Raster<f32> = Raster::new(100, 100);
        raster.set_transform(GeoTransform::new(0.0, 100.0, 1.0, -1.0));
        raster.set_crs(Some(CRS::from_epsg(31983)));
        raster.set_nodata(Some(-9999.0));

        for i in 0..100 {
            for j in 0..100 {
                raster.set(i, j, (i * 100 + j) as f32).unwrap();
            }
        }

        let tmp = NamedTempFile::with_suffix(".tif").unwrap();
        write_geotiff(&raster, tmp.path(), None).unwrap();

        let loaded: Raster<f32> = read_geotiff(tmp.path(), None).unwrap();

        assert_eq!(loaded.shape(), raster.shape());
        assert_eq!(loaded.get(50, 50).unwrap(), raster.get(50, 50).unwrap());
        assert_eq!(loaded.crs().and_then(|c| c.epsg()), Some(31983));
    }
}

//! Main Raster type

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::raster::geotransform::Bounds;
use crate::raster::{GeoTransform, RasterElement};
use ndarray::Array2;

/// A georeferenced 2D raster grid.
///
/// `Raster<T>` stores values of type `T` in a 2D grid with associated
/// geographic metadata (transform and CRS).
///
/// # Type Parameters
///
/// - `T`: The cell value type, must implement [`RasterElement`]
///
/// # Example
///
/// ```ignore
/// use floodfuse_core::Raster;
///
/// // Create a 100x100 raster filled with zeros
/// let mut raster: Raster<f32> = Raster::new(100, 100);
///
/// // Set a value
/// raster.set(10, 20, 42.0)?;
///
/// // Get a value
/// let value = raster.get(10, 20)?;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Raster<T: RasterElement> {
    /// Raster data stored in row-major order (row, col)
    data: Array2<T>,
    /// Affine transformation
    transform: GeoTransform,
    /// Coordinate reference system
    crs: Option<CRS>,
    /// No-data value
    nodata: Option<T>,
}

/// Outcome of comparing two grids for pixel-by-pixel correspondence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Congruence {
    /// Same CRS, same pixel size, origins on the same pixel lattice
    Congruent,
    /// CRS identifiers differ (or only one grid has a CRS)
    CrsDiffers,
    /// Pixel width or height differs
    ResolutionDiffers,
    /// Same pixel size but origins are offset by a fraction of a pixel
    Misaligned,
}

impl<T: RasterElement> Raster<T> {
    /// Create a new raster filled with zeros
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            data: Array2::zeros((rows, cols)),
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    /// Create a new raster filled with a specific value
    pub fn filled(rows: usize, cols: usize, value: T) -> Self {
        Self {
            data: Array2::from_elem((rows, cols), value),
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        }
    }

    /// Create a raster from existing data
    pub fn from_vec(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        let array = Array2::from_shape_vec((rows, cols), data)
            .map_err(|e| Error::Other(e.to_string()))?;

        Ok(Self {
            data: array,
            transform: GeoTransform::default(),
            crs: None,
            nodata: None,
        })
    }

    /// Create a raster with the same metadata but different data type
    pub fn with_same_meta<U: RasterElement>(&self, rows: usize, cols: usize) -> Raster<U> {
        Raster {
            data: Array2::zeros((rows, cols)),
            transform: self.transform,
            crs: self.crs.clone(),
            nodata: None,
        }
    }

    /// Convert every cell to another element type.
    ///
    /// Nodata cells map to the target nodata (the cast of the source
    /// sentinel, or `U::default_nodata()` when that cast fails); other cells
    /// that cannot be represented become the target nodata as well.
    pub fn cast<U: RasterElement>(&self) -> Raster<U> {
        let nodata: Option<U> = self
            .nodata
            .map(|nd| num_traits::cast(nd).unwrap_or_else(U::default_nodata));
        let fallback = nodata.unwrap_or_else(U::default_nodata);
        let data = self.data.mapv(|v| {
            if self.is_nodata(v) {
                fallback
            } else {
                num_traits::cast(v).unwrap_or(fallback)
            }
        });
        Raster {
            data,
            transform: self.transform,
            crs: self.crs.clone(),
            nodata,
        }
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

    /// Get value at (row, col) without bounds checking
    ///
    /// # Safety
    /// Caller must ensure row < self.rows() and col < self.cols()
    pub unsafe fn get_unchecked(&self, row: usize, col: usize) -> T {
        unsafe { *self.data.uget((row, col)) }
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

    /// Get a reference to the underlying array
    pub fn data(&self) -> &Array2<T> {
        &self.data
    }

    /// Get a mutable reference to the underlying array
    pub fn data_mut(&mut self) -> &mut Array2<T> {
        &mut self.data
    }

    // Metadata

    /// Get the geotransform
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Set the geotransform
    pub fn set_transform(&mut self, transform: GeoTransform) {
        self.transform = transform;
    }

    /// Get the CRS
    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    /// Set the CRS
    pub fn set_crs(&mut self, crs: Option<CRS>) {
        self.crs = crs;
    }

    /// Get the no-data value
    pub fn nodata(&self) -> Option<T> {
        self.nodata
    }

    /// Set the no-data value
    pub fn set_nodata(&mut self, nodata: Option<T>) {
        self.nodata = nodata;
    }

    /// Cell size (assumes square cells)
    pub fn cell_size(&self) -> f64 {
        self.transform.cell_size()
    }

    /// Absolute pixel size as `(x, y)`
    pub fn resolution(&self) -> (f64, f64) {
        self.transform.resolution()
    }

    /// Pixel area in squared CRS units
    pub fn pixel_area(&self) -> f64 {
        self.transform.pixel_area()
    }

    /// Geographic bounds (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> Bounds {
        self.transform.bounds(self.cols(), self.rows())
    }

    // Coordinate conversion

    /// Convert pixel coordinates to geographic coordinates
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.transform.pixel_to_geo(col, row)
    }

    /// Convert geographic coordinates to pixel coordinates
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        self.transform.geo_to_pixel(x, y)
    }

    // Grid relations

    /// Whether both rasters carry the same CRS (or both carry none)
    pub fn same_crs<U: RasterElement>(&self, other: &Raster<U>) -> bool {
        match (self.crs(), other.crs()) {
            (Some(a), Some(b)) => a.is_equivalent(b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Compare the pixel lattice of two grids
    pub fn congruence<U: RasterElement>(&self, other: &Raster<U>) -> Congruence {
        if !self.same_crs(other) {
            Congruence::CrsDiffers
        } else if !self.transform.same_resolution(other.transform()) {
            Congruence::ResolutionDiffers
        } else if !self.transform.is_aligned_with(other.transform()) {
            Congruence::Misaligned
        } else {
            Congruence::Congruent
        }
    }

    /// Whether pixel-by-pixel correspondence with `other` is well defined
    pub fn is_congruent<U: RasterElement>(&self, other: &Raster<U>) -> bool {
        self.congruence(other) == Congruence::Congruent
    }

    // Value checks

    /// Check if a value is no-data
    pub fn is_nodata(&self, value: T) -> bool {
        value.is_nodata(self.nodata)
    }

    /// Count of cells holding a valid (non-nodata) value
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|&&v| !self.is_nodata(v)).count()
    }

    // Statistics

    /// Calculate basic statistics (min, max, mean, count of valid cells)
    pub fn statistics(&self) -> RasterStatistics<T> {
        let mut min: Option<T> = None;
        let mut max: Option<T> = None;
        let mut sum: f64 = 0.0;
        let mut count: usize = 0;

        for &value in self.data.iter() {
            if self.is_nodata(value) {
                continue;
            }

            if min.map_or(true, |m| value < m) {
                min = Some(value);
            }
            if max.map_or(true, |m| value > m) {
                max = Some(value);
            }

            if let Some(v) = value.to_f64() {
                sum += v;
                count += 1;
            }
        }

        let mean = if count > 0 {
            Some(sum / count as f64)
        } else {
            None
        };

        RasterStatistics {
            min,
            max,
            mean,
            valid_count: count,
            nodata_count: self.len() - count,
        }
    }
}

/// Basic statistics for a raster
#[derive(Debug, Clone)]
pub struct RasterStatistics<T> {
    pub min: Option<T>,
    pub max: Option<T>,
    pub mean: Option<f64>,
    pub valid_count: usize,
    pub nodata_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(origin_x: f64, origin_y: f64, size: f64, epsg: u32) -> Raster<f64> {
        let mut r: Raster<f64> = Raster::new(4, 4);
        r.set_transform(GeoTransform::new(origin_x, origin_y, size, -size));
        r.set_crs(Some(CRS::from_epsg(epsg)));
        r
    }

    #[test]
    fn test_raster_creation() {
        let raster: Raster<f32> = Raster::new(100, 200);
        assert_eq!(raster.rows(), 100);
        assert_eq!(raster.cols(), 200);
        assert_eq!(raster.shape(), (100, 200));
    }

    #[test]
    fn test_raster_access() {
        let mut raster: Raster<f32> = Raster::new(10, 10);
        raster.set(5, 5, 42.0).unwrap();
        assert_eq!(raster.get(5, 5).unwrap(), 42.0);
        assert!(raster.get(10, 0).is_err());
    }

    #[test]
    fn test_raster_statistics() {
        let mut raster: Raster<f32> = Raster::new(10, 10);
        for i in 0..10 {
            for j in 0..10 {
                raster.set(i, j, (i * 10 + j) as f32).unwrap();
            }
        }
        raster.set(0, 0, -9999.0).unwrap();
        raster.set_nodata(Some(-9999.0));

        let stats = raster.statistics();
        assert_eq!(stats.min, Some(1.0));
        assert_eq!(stats.max, Some(99.0));
        assert_eq!(stats.valid_count, 99);
        assert_eq!(stats.nodata_count, 1);
    }

    #[test]
    fn test_congruence() {
        let a = grid(0.0, 100.0, 2.0, 31983);
        assert_eq!(a.congruence(&grid(10.0, 96.0, 2.0, 31983)), Congruence::Congruent);
        assert_eq!(a.congruence(&grid(0.0, 100.0, 2.0, 4326)), Congruence::CrsDiffers);
        assert_eq!(a.congruence(&grid(0.0, 100.0, 3.0, 31983)), Congruence::ResolutionDiffers);
        assert_eq!(a.congruence(&grid(0.5, 100.0, 2.0, 31983)), Congruence::Misaligned);
    }

    #[test]
    fn test_cast_maps_nodata() {
        let mut r: Raster<f64> = Raster::filled(2, 2, 3.0);
        r.set(0, 0, -9999.0).unwrap();
        r.set_nodata(Some(-9999.0));
        let c: Raster<i32> = r.cast();
        assert_eq!(c.nodata(), Some(-9999));
        assert_eq!(c.get(0, 0).unwrap(), -9999);
        assert_eq!(c.get(1, 1).unwrap(), 3);
    }
}

//! Affine geotransformation for rasters

use serde::{Deserialize, Serialize};

/// Tolerance, in pixels, for grid geometry comparisons (pixel size equality,
/// origin alignment, snapping of extents onto a resolution lattice).
pub const GEOMETRY_TOLERANCE: f64 = 1e-6;

/// Axis-aligned extent as `(min_x, min_y, max_x, max_y)`
pub type Bounds = (f64, f64, f64, f64);

/// Affine transformation coefficients for georeferencing rasters.
///
/// Converts between pixel coordinates (col, row) and geographic coordinates (x, y):
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// For north-up images, `row_rotation` and `col_rotation` are typically 0,
/// and `pixel_height` is negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Pixel width (cell size in X direction)
    pub pixel_width: f64,
    /// Pixel height (cell size in Y direction, usually negative)
    pub pixel_height: f64,
    /// Rotation about X axis (usually 0)
    pub row_rotation: f64,
    /// Rotation about Y axis (usually 0)
    pub col_rotation: f64,
}

impl GeoTransform {
    /// Create a new GeoTransform with no rotation (north-up image)
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// Create from GDAL-style array [origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height]
    pub fn from_gdal(coeffs: [f64; 6]) -> Self {
        Self {
            origin_x: coeffs[0],
            pixel_width: coeffs[1],
            row_rotation: coeffs[2],
            origin_y: coeffs[3],
            col_rotation: coeffs[4],
            pixel_height: coeffs[5],
        }
    }

    /// Convert to GDAL-style array
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// Build a north-up transform covering `bounds` on a lattice of
    /// multiples of the resolution (GDAL's "target aligned pixels").
    ///
    /// The extent is grown outward to the nearest lattice lines, so the
    /// returned grid always contains `bounds`. Returns the transform and the
    /// `(cols, rows)` of the grid.
    pub fn aligned_to(bounds: Bounds, res_x: f64, res_y: f64) -> (Self, usize, usize) {
        let (min_x, min_y, max_x, max_y) = bounds;
        let res_x = res_x.abs();
        let res_y = res_y.abs();

        let x0 = snap_down(min_x / res_x) * res_x;
        let x1 = snap_up(max_x / res_x) * res_x;
        let y0 = snap_down(min_y / res_y) * res_y;
        let y1 = snap_up(max_y / res_y) * res_y;

        let cols = ((x1 - x0) / res_x).round().max(0.0) as usize;
        let rows = ((y1 - y0) / res_y).round().max(0.0) as usize;

        (Self::new(x0, y1, res_x, -res_y), cols, rows)
    }

    /// Convert pixel coordinates to geographic coordinates
    ///
    /// Returns the coordinates of the pixel center
    pub fn pixel_to_geo(&self, col: usize, row: usize) -> (f64, f64) {
        self.fractional_to_geo(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Convert pixel coordinates to geographic coordinates (top-left corner)
    pub fn pixel_to_geo_corner(&self, col: usize, row: usize) -> (f64, f64) {
        self.fractional_to_geo(col as f64, row as f64)
    }

    /// Convert fractional pixel coordinates to geographic coordinates
    pub fn fractional_to_geo(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.origin_x + col * self.pixel_width + row * self.row_rotation;
        let y = self.origin_y + col * self.col_rotation + row * self.pixel_height;
        (x, y)
    }

    /// Convert geographic coordinates to pixel coordinates
    ///
    /// Returns fractional pixel coordinates; use `.floor()` to get integer indices
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let det = self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation;

        if det.abs() < 1e-10 {
            // Degenerate transformation
            return (f64::NAN, f64::NAN);
        }

        let dx = x - self.origin_x;
        let dy = y - self.origin_y;

        let col = (self.pixel_height * dx - self.row_rotation * dy) / det;
        let row = (-self.col_rotation * dx + self.pixel_width * dy) / det;

        (col, row)
    }

    /// Get the cell size (assumes square pixels and no rotation)
    pub fn cell_size(&self) -> f64 {
        self.pixel_width.abs()
    }

    /// Absolute pixel size as `(x, y)`
    pub fn resolution(&self) -> (f64, f64) {
        (self.pixel_width.abs(), self.pixel_height.abs())
    }

    /// Area of one pixel in squared CRS units
    pub fn pixel_area(&self) -> f64 {
        let (rx, ry) = self.resolution();
        rx * ry
    }

    /// Check if this is a north-up image (no rotation)
    pub fn is_north_up(&self) -> bool {
        self.row_rotation.abs() < 1e-10
            && self.col_rotation.abs() < 1e-10
            && self.pixel_height < 0.0
    }

    /// Same pixel width and height, within [`GEOMETRY_TOLERANCE`] of a pixel.
    pub fn same_resolution(&self, other: &GeoTransform) -> bool {
        let tol_x = GEOMETRY_TOLERANCE * self.pixel_width.abs();
        let tol_y = GEOMETRY_TOLERANCE * self.pixel_height.abs();
        (self.pixel_width - other.pixel_width).abs() <= tol_x
            && (self.pixel_height - other.pixel_height).abs() <= tol_y
    }

    /// Whether both grids share pixel size and their origins differ by whole
    /// pixels, so every pixel edge of one is a pixel edge of the other.
    pub fn is_aligned_with(&self, other: &GeoTransform) -> bool {
        if !self.same_resolution(other) {
            return false;
        }
        let (rx, ry) = self.resolution();
        is_whole((self.origin_x - other.origin_x) / rx)
            && is_whole((self.origin_y - other.origin_y) / ry)
    }

    /// Calculate the bounding box for a raster of given dimensions
    pub fn bounds(&self, width: usize, height: usize) -> Bounds {
        let (x0, y0) = self.pixel_to_geo_corner(0, 0);
        let (x1, y1) = self.pixel_to_geo_corner(width, 0);
        let (x2, y2) = self.pixel_to_geo_corner(0, height);
        let (x3, y3) = self.pixel_to_geo_corner(width, height);

        let min_x = x0.min(x1).min(x2).min(x3);
        let max_x = x0.max(x1).max(x2).max(x3);
        let min_y = y0.min(y1).min(y2).min(y3);
        let max_y = y0.max(y1).max(y2).max(y3);

        (min_x, min_y, max_x, max_y)
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

/// Intersection of two extents, `None` when they do not overlap.
pub fn intersect_bounds(a: Bounds, b: Bounds) -> Option<Bounds> {
    let min_x = a.0.max(b.0);
    let min_y = a.1.max(b.1);
    let max_x = a.2.min(b.2);
    let max_y = a.3.min(b.3);
    if min_x < max_x && min_y < max_y {
        Some((min_x, min_y, max_x, max_y))
    } else {
        None
    }
}

fn is_whole(v: f64) -> bool {
    (v - v.round()).abs() <= GEOMETRY_TOLERANCE
}

fn snap_down(v: f64) -> f64 {
    (v + GEOMETRY_TOLERANCE).floor()
}

fn snap_up(v: f64) -> f64 {
    (v - GEOMETRY_TOLERANCE).ceil()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pixel_to_geo_roundtrip() {
        let gt = GeoTransform::new(100.0, 200.0, 10.0, -10.0);

        let (x, y) = gt.pixel_to_geo(5, 10);
        let (col, row) = gt.geo_to_pixel(x, y);

        assert_relative_eq!(col, 5.5, epsilon = 1e-10);
        assert_relative_eq!(row, 10.5, epsilon = 1e-10);
    }

    #[test]
    fn test_bounds() {
        let gt = GeoTransform::new(0.0, 100.0, 1.0, -1.0);
        let (min_x, min_y, max_x, max_y) = gt.bounds(100, 100);

        assert_relative_eq!(min_x, 0.0, epsilon = 1e-10);
        assert_relative_eq!(min_y, 0.0, epsilon = 1e-10);
        assert_relative_eq!(max_x, 100.0, epsilon = 1e-10);
        assert_relative_eq!(max_y, 100.0, epsilon = 1e-10);
    }

    #[test]
    fn test_aligned_to_grows_outward() {
        let (gt, cols, rows) = GeoTransform::aligned_to((1.0, 2.5, 9.5, 11.0), 2.0, 2.0);
        assert_relative_eq!(gt.origin_x, 0.0);
        assert_relative_eq!(gt.origin_y, 12.0);
        assert_relative_eq!(gt.pixel_height, -2.0);
        assert_eq!((cols, rows), (5, 5));
    }

    #[test]
    fn test_aligned_to_exact_extent_is_stable() {
        let (gt, cols, rows) = GeoTransform::aligned_to((0.0, 0.0, 30.0, 30.0), 3.0, 3.0);
        assert_relative_eq!(gt.origin_x, 0.0);
        assert_relative_eq!(gt.origin_y, 30.0);
        assert_eq!((cols, rows), (10, 10));
    }

    #[test]
    fn test_alignment() {
        let a = GeoTransform::new(0.0, 100.0, 2.0, -2.0);
        let b = GeoTransform::new(6.0, 90.0, 2.0, -2.0);
        let c = GeoTransform::new(1.0, 90.0, 2.0, -2.0);
        let d = GeoTransform::new(0.0, 100.0, 3.0, -3.0);
        assert!(a.is_aligned_with(&b));
        assert!(!a.is_aligned_with(&c));
        assert!(!a.is_aligned_with(&d));
    }

    #[test]
    fn test_intersect_bounds() {
        let i = intersect_bounds((0.0, 0.0, 10.0, 10.0), (5.0, -5.0, 15.0, 5.0)).unwrap();
        assert_eq!(i, (5.0, 0.0, 10.0, 5.0));
        assert!(intersect_bounds((0.0, 0.0, 1.0, 1.0), (2.0, 2.0, 3.0, 3.0)).is_none());
    }
}

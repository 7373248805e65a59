//! Vector rasterization
//!
//! Burns the geometries of a [`VectorLayer`] into a binary presence grid
//! laid over a reference raster's extent.
//!
//! Burn rules:
//! - points: the pixel containing the point
//! - lines: every pixel the segment passes through
//! - polygons: every pixel whose centre lies inside (holes respected); with
//!   `all_touched`, also every pixel crossed by a ring

use crate::reproject::{transform_between, CoordinateTransform, Identity, WarpTarget};
use floodfuse_core::raster::GEOMETRY_TOLERANCE;
use floodfuse_core::{Error, Raster, RasterElement, Result, VectorLayer};
use geo::{Coord, Geometry, LineString, MapCoords, Polygon};
use tracing::{debug, info};

/// Parameters for [`rasterize`]
#[derive(Debug, Clone, Copy)]
pub struct RasterizeParams {
    /// Burn every pixel a polygon boundary touches, not only centres
    pub all_touched: bool,
    /// Value written to burned pixels
    pub burn_value: u8,
    /// Value of pixels no geometry reaches
    pub init_value: u8,
}

impl Default for RasterizeParams {
    fn default() -> Self {
        Self {
            all_touched: false,
            burn_value: 1,
            init_value: 0,
        }
    }
}

/// Output pixel size in CRS units.
///
/// A bare `f64` gives square pixels; `(x, y)` matches
/// [`Raster::resolution`], so a reference grid with rectangular pixels can
/// be reproduced exactly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelSize {
    pub x: f64,
    pub y: f64,
}

impl From<f64> for PixelSize {
    fn from(size: f64) -> Self {
        Self { x: size, y: size }
    }
}

impl From<(f64, f64)> for PixelSize {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Rasterize `layer` over the extent of `reference` at `resolution`.
///
/// When the layer and the reference carry different CRSs, geometries are
/// reprojected into the reference CRS first.
///
/// # Errors
/// - [`Error::InvalidParameter`] for a non-positive resolution
/// - [`Error::CrsMismatch`] when the layer cannot be brought into the
///   reference CRS
pub fn rasterize<T: RasterElement, R: Into<PixelSize>>(
    layer: &VectorLayer,
    reference: &Raster<T>,
    resolution: R,
    params: &RasterizeParams,
) -> Result<Raster<u8>> {
    let transform = match (layer.crs(), reference.crs()) {
        (Some(src), Some(dst)) => transform_between(Some(src), Some(dst))?,
        // A layer or reference without CRS is taken at face value
        _ => Box::new(Identity),
    };
    rasterize_with_transform(layer, reference, resolution, params, transform.as_ref())
}

/// [`rasterize`] with an explicit layer → reference coordinate transform
pub fn rasterize_with_transform<T: RasterElement, R: Into<PixelSize>>(
    layer: &VectorLayer,
    reference: &Raster<T>,
    resolution: R,
    params: &RasterizeParams,
    transform: &dyn CoordinateTransform,
) -> Result<Raster<u8>> {
    let target = output_grid(reference, resolution.into())?;
    let (rows, cols) = (target.rows, target.cols);
    let geo_transform = target.transform;

    let mut canvas = Canvas::new(rows, cols, params);

    for geometry in layer.geometries() {
        // world (layer CRS) → world (reference CRS) → fractional pixel
        let pixel_geom = geometry.try_map_coords(|c| -> Result<Coord<f64>> {
            let (x, y) = transform.transform(c.x, c.y)?;
            let (col, row) = geo_transform.geo_to_pixel(x, y);
            Ok(Coord { x: col, y: row })
        })?;
        canvas.burn(&pixel_geom);
    }

    info!(
        "Rasterized {} features from '{}' onto {}x{} grid ({} pixels burned)",
        layer.len(),
        layer.source(),
        rows,
        cols,
        canvas.burned
    );

    let mut raster = Raster::from_vec(canvas.data, rows, cols)?;
    raster.set_transform(geo_transform);
    raster.set_crs(target.crs);
    raster.set_nodata(Some(0));
    Ok(raster)
}

/// The reference grid itself when the resolution matches it, otherwise the
/// reference extent on a lattice aligned to `resolution`.
fn output_grid<T: RasterElement>(reference: &Raster<T>, size: PixelSize) -> Result<WarpTarget> {
    for res in [size.x, size.y] {
        if !res.is_finite() || res <= 0.0 {
            return Err(Error::InvalidParameter {
                name: "resolution",
                value: res.to_string(),
                reason: "must be a positive number".into(),
            });
        }
    }
    if reference.is_empty() {
        return Err(Error::InvalidDimensions {
            width: reference.cols(),
            height: reference.rows(),
        });
    }

    let (rx, ry) = reference.resolution();
    if reference.transform().is_north_up()
        && (rx - size.x).abs() <= GEOMETRY_TOLERANCE * size.x
        && (ry - size.y).abs() <= GEOMETRY_TOLERANCE * size.y
    {
        return Ok(WarpTarget::of(reference));
    }

    debug!(
        "Rasterizing at {:?} (reference pixel {:?}), snapping reference extent",
        (size.x, size.y),
        (rx, ry)
    );
    WarpTarget::aligned(reference.bounds(), size.x, size.y, reference.crs().cloned())
}

/// Burn target in fractional pixel space (x = column, y = row)
struct Canvas {
    data: Vec<u8>,
    rows: usize,
    cols: usize,
    burn_value: u8,
    all_touched: bool,
    burned: usize,
}

impl Canvas {
    fn new(rows: usize, cols: usize, params: &RasterizeParams) -> Self {
        Self {
            data: vec![params.init_value; rows * cols],
            rows,
            cols,
            burn_value: params.burn_value,
            all_touched: params.all_touched,
            burned: 0,
        }
    }

    #[inline]
    fn set(&mut self, row: usize, col: usize) {
        let cell = &mut self.data[row * self.cols + col];
        if *cell != self.burn_value {
            *cell = self.burn_value;
            self.burned += 1;
        }
    }

    fn burn(&mut self, geometry: &Geometry<f64>) {
        match geometry {
            Geometry::Point(p) => self.burn_point(p.0),
            Geometry::MultiPoint(mp) => mp.iter().for_each(|p| self.burn_point(p.0)),
            Geometry::Line(l) => self.burn_segment(l.start, l.end),
            Geometry::LineString(ls) => self.burn_line_string(ls),
            Geometry::MultiLineString(mls) => mls.iter().for_each(|ls| self.burn_line_string(ls)),
            Geometry::Polygon(p) => self.burn_polygon(p),
            Geometry::MultiPolygon(mp) => mp.iter().for_each(|p| self.burn_polygon(p)),
            Geometry::Rect(r) => self.burn_polygon(&r.to_polygon()),
            Geometry::Triangle(t) => self.burn_polygon(&t.to_polygon()),
            Geometry::GeometryCollection(gc) => gc.iter().for_each(|g| self.burn(g)),
        }
    }

    fn burn_point(&mut self, c: Coord<f64>) {
        if !c.x.is_finite() || !c.y.is_finite() || c.x < 0.0 || c.y < 0.0 {
            return;
        }
        let (col, row) = (c.x.floor() as usize, c.y.floor() as usize);
        if row < self.rows && col < self.cols {
            self.set(row, col);
        }
    }

    fn burn_line_string(&mut self, ls: &LineString<f64>) {
        if ls.0.len() == 1 {
            self.burn_point(ls.0[0]);
        }
        for line in ls.lines() {
            self.burn_segment(line.start, line.end);
        }
    }

    /// Supercover traversal: every pixel the segment enters is burned.
    fn burn_segment(&mut self, a: Coord<f64>, b: Coord<f64>) {
        let Some((a, b)) = clip_segment(a, b, self.cols as f64, self.rows as f64) else {
            return;
        };

        let clamp_col = |x: f64| (x.floor().max(0.0) as usize).min(self.cols - 1);
        let clamp_row = |y: f64| (y.floor().max(0.0) as usize).min(self.rows - 1);

        let (mut col, mut row) = (clamp_col(a.x), clamp_row(a.y));
        let (end_col, end_row) = (clamp_col(b.x), clamp_row(b.y));

        let dx = b.x - a.x;
        let dy = b.y - a.y;
        let step_col: isize = if dx > 0.0 { 1 } else { -1 };
        let step_row: isize = if dy > 0.0 { 1 } else { -1 };

        let next_boundary = |pos: f64, cell: usize, positive: bool| {
            if positive {
                cell as f64 + 1.0 - pos
            } else {
                pos - cell as f64
            }
        };

        let mut t_max_x = if dx != 0.0 {
            next_boundary(a.x, col, dx > 0.0) / dx.abs()
        } else {
            f64::INFINITY
        };
        let mut t_max_y = if dy != 0.0 {
            next_boundary(a.y, row, dy > 0.0) / dy.abs()
        } else {
            f64::INFINITY
        };
        let t_delta_x = if dx != 0.0 { 1.0 / dx.abs() } else { f64::INFINITY };
        let t_delta_y = if dy != 0.0 { 1.0 / dy.abs() } else { f64::INFINITY };

        let max_steps = self.rows + self.cols + 2;
        for _ in 0..max_steps {
            self.set(row, col);
            if col == end_col && row == end_row {
                break;
            }
            if t_max_x < t_max_y {
                let next = col as isize + step_col;
                if next < 0 || next as usize >= self.cols {
                    break;
                }
                col = next as usize;
                t_max_x += t_delta_x;
            } else {
                let next = row as isize + step_row;
                if next < 0 || next as usize >= self.rows {
                    break;
                }
                row = next as usize;
                t_max_y += t_delta_y;
            }
        }
    }

    /// Centre-in-polygon scanline fill with the even-odd rule over all rings
    fn burn_polygon(&mut self, polygon: &Polygon<f64>) {
        let rings: Vec<&LineString<f64>> = std::iter::once(polygon.exterior())
            .chain(polygon.interiors())
            .collect();

        let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
        for c in polygon.exterior().coords() {
            min_y = min_y.min(c.y);
            max_y = max_y.max(c.y);
        }
        if !min_y.is_finite() || !max_y.is_finite() {
            return;
        }

        let first_row = (min_y - 0.5).ceil().max(0.0) as usize;
        let last_row = ((max_y - 0.5).floor()).min(self.rows as f64 - 1.0);
        if last_row >= 0.0 {
            let mut crossings = Vec::new();
            for row in first_row..=last_row as usize {
                let yc = row as f64 + 0.5;
                crossings.clear();
                for ring in &rings {
                    for line in ring.lines() {
                        let (p, q) = (line.start, line.end);
                        if (p.y <= yc && yc < q.y) || (q.y <= yc && yc < p.y) {
                            crossings.push(p.x + (yc - p.y) * (q.x - p.x) / (q.y - p.y));
                        }
                    }
                }
                crossings.sort_by(|a, b| a.total_cmp(b));

                for pair in crossings.chunks_exact(2) {
                    // columns whose centre c + 0.5 lies in [x0, x1)
                    let start = (pair[0] - 0.5).ceil().max(0.0);
                    let end = ((pair[1] - 0.5).ceil()).min(self.cols as f64);
                    if end <= start {
                        continue;
                    }
                    for col in start as usize..end as usize {
                        self.set(row, col);
                    }
                }
            }
        }

        if self.all_touched {
            for ring in rings {
                self.burn_line_string(ring);
            }
        }
    }
}

/// Liang–Barsky clip of a segment to `[0, width] × [0, height]`
fn clip_segment(
    a: Coord<f64>,
    b: Coord<f64>,
    width: f64,
    height: f64,
) -> Option<(Coord<f64>, Coord<f64>)> {
    if !(a.x.is_finite() && a.y.is_finite() && b.x.is_finite() && b.y.is_finite()) {
        return None;
    }
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let mut t0 = 0.0_f64;
    let mut t1 = 1.0_f64;

    for (p, q) in [(-dx, a.x), (dx, width - a.x), (-dy, a.y), (dy, height - a.y)] {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
        } else {
            let r = q / p;
            if p < 0.0 {
                t0 = t0.max(r);
            } else {
                t1 = t1.min(r);
            }
            if t0 > t1 {
                return None;
            }
        }
    }

    Some((
        Coord { x: a.x + t0 * dx, y: a.y + t0 * dy },
        Coord { x: a.x + t1 * dx, y: a.y + t1 * dy },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use floodfuse_core::{GeoTransform, CRS};
    use geo::{line_string, point, polygon, Rect};

    /// 10x10 reference, 1 m pixels, origin (0, 10)
    fn reference() -> Raster<f32> {
        let mut r: Raster<f32> = Raster::new(10, 10);
        r.set_transform(GeoTransform::new(0.0, 10.0, 1.0, -1.0));
        r.set_crs(Some(CRS::from_epsg(31983)));
        r
    }

    fn layer(geoms: Vec<Geometry<f64>>) -> VectorLayer {
        VectorLayer::from_geometries("test", Some(CRS::from_epsg(31983)), geoms)
    }

    fn burned(r: &Raster<u8>) -> usize {
        r.data().iter().filter(|&&v| v == 1).count()
    }

    #[test]
    fn empty_layer_is_all_zero() {
        let out = rasterize(&layer(vec![]), &reference(), 1.0, &RasterizeParams::default()).unwrap();
        assert_eq!(out.shape(), (10, 10));
        assert!(out.data().iter().all(|&v| v == 0));
        assert_eq!(out.nodata(), Some(0));
        assert_eq!(out.transform(), reference().transform());
    }

    #[test]
    fn point_burns_containing_pixel() {
        let out = rasterize(
            &layer(vec![point!(x: 2.5, y: 7.5).into()]),
            &reference(),
            1.0,
            &RasterizeParams::default(),
        )
        .unwrap();
        assert_eq!(burned(&out), 1);
        // y = 7.5 is row 2, x = 2.5 is col 2
        assert_eq!(out.get(2, 2).unwrap(), 1);
    }

    #[test]
    fn horizontal_line_burns_row() {
        let out = rasterize(
            &layer(vec![line_string![(x: 0.5, y: 5.5), (x: 9.5, y: 5.5)].into()]),
            &reference(),
            1.0,
            &RasterizeParams::default(),
        )
        .unwrap();
        assert_eq!(burned(&out), 10);
        assert!((0..10).all(|c| out.get(4, c).unwrap() == 1));
    }

    #[test]
    fn diagonal_line_is_connected() {
        let out = rasterize(
            &layer(vec![line_string![(x: 0.2, y: 9.9), (x: 9.7, y: 0.3)].into()]),
            &reference(),
            1.0,
            &RasterizeParams::default(),
        )
        .unwrap();
        // every row and every column is hit by a connected traversal
        for i in 0..10 {
            assert!((0..10).any(|c| out.get(i, c).unwrap() == 1), "row {i}");
            assert!((0..10).any(|r| out.get(r, i).unwrap() == 1), "col {i}");
        }
    }

    #[test]
    fn polygon_centre_rule_and_holes() {
        let square = polygon!(
            exterior: [(x: 1.0, y: 1.0), (x: 9.0, y: 1.0), (x: 9.0, y: 9.0), (x: 1.0, y: 9.0), (x: 1.0, y: 1.0)],
            interiors: [[(x: 4.0, y: 4.0), (x: 6.0, y: 4.0), (x: 6.0, y: 6.0), (x: 4.0, y: 6.0), (x: 4.0, y: 4.0)]],
        );
        let out = rasterize(&layer(vec![square.into()]), &reference(), 1.0, &RasterizeParams::default())
            .unwrap();
        // 8x8 interior minus the 2x2 hole
        assert_eq!(burned(&out), 60);
        assert_eq!(out.get(0, 0).unwrap(), 0);
        assert_eq!(out.get(4, 4).unwrap(), 0);
        assert_eq!(out.get(1, 1).unwrap(), 1);
    }

    #[test]
    fn all_touched_grows_polygon() {
        let small = Rect::new((2.6, 2.6), (4.4, 4.4)).to_polygon();
        let centre = rasterize(&layer(vec![small.clone().into()]), &reference(), 1.0, &RasterizeParams::default())
            .unwrap();
        let touched = rasterize(
            &layer(vec![small.into()]),
            &reference(),
            1.0,
            &RasterizeParams {
                all_touched: true,
                ..Default::default()
            },
        )
        .unwrap();
        // one centre inside; the boundary crosses a 3x3 block
        assert_eq!(burned(&centre), 1);
        assert_eq!(burned(&touched), 9);
    }

    #[test]
    fn geometry_outside_extent_is_ignored() {
        let out = rasterize(
            &layer(vec![
                point!(x: 50.0, y: 50.0).into(),
                line_string![(x: -5.0, y: -5.0), (x: -1.0, y: -1.0)].into(),
            ]),
            &reference(),
            1.0,
            &RasterizeParams::default(),
        )
        .unwrap();
        assert_eq!(burned(&out), 0);
    }

    #[test]
    fn coarser_resolution_snaps_extent() {
        let out = rasterize(&layer(vec![]), &reference(), 3.0, &RasterizeParams::default()).unwrap();
        // [0, 10] snapped outward to multiples of 3 → [0, 12]
        assert_eq!(out.shape(), (4, 4));
        assert_eq!(out.resolution(), (3.0, 3.0));
        assert_eq!(out.transform().origin_y, 12.0);
    }

    #[test]
    fn rectangular_pixels_keep_reference_grid() {
        let mut reference: Raster<f32> = Raster::new(10, 10);
        reference.set_transform(GeoTransform::new(0.0, 200.0, 10.0, -20.0));
        reference.set_crs(Some(CRS::from_epsg(31983)));

        let out = rasterize(
            &layer(vec![point!(x: 15.0, y: 170.0).into()]),
            &reference,
            reference.resolution(),
            &RasterizeParams::default(),
        )
        .unwrap();
        assert_eq!(out.transform(), reference.transform());
        assert!(out.is_congruent(&reference));
        // x = 15 is col 1, y = 170 is row 1
        assert_eq!(out.get(1, 1).unwrap(), 1);
        assert_eq!(burned(&out), 1);
    }

    #[test]
    fn rasterization_is_idempotent() {
        let geoms: Vec<Geometry<f64>> = vec![
            Rect::new((1.3, 2.7), (6.1, 8.9)).to_polygon().into(),
            line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 3.3)].into(),
        ];
        let params = RasterizeParams {
            all_touched: true,
            ..Default::default()
        };
        let a = rasterize(&layer(geoms.clone()), &reference(), 1.0, &params).unwrap();
        let b = rasterize(&layer(geoms), &reference(), 1.0, &params).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn layer_in_other_crs_is_reprojected() {
        let mut reference: Raster<f32> = Raster::new(20, 20);
        reference.set_transform(GeoTransform::new(330_000.0, 7_396_000.0, 100.0, -100.0));
        reference.set_crs(Some(CRS::from_epsg(31983)));

        // big geographic polygon covering the whole reference
        let cover = Rect::new((-47.0, -24.0), (-46.0, -23.0)).to_polygon();
        let layer = VectorLayer::from_geometries("wgs", Some(CRS::from_epsg(4674)), vec![cover]);

        let out = rasterize(&layer, &reference, 100.0, &RasterizeParams::default()).unwrap();
        assert_eq!(burned(&out), 400);
    }

    #[test]
    fn empty_reference_is_invalid_dimensions() {
        let empty: Raster<f32> = Raster::new(0, 3);
        let err = rasterize(&layer(vec![]), &empty, 1.0, &RasterizeParams::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidDimensions { width: 3, height: 0 }));
    }

    #[test]
    fn rejects_bad_resolution() {
        let err = rasterize(&layer(vec![]), &reference(), -1.0, &RasterizeParams::default()).unwrap_err();
        assert!(err.is_configuration());
    }
}

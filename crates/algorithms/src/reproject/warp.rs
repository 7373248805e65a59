//! Inverse-mapping resampler
//!
//! For every output pixel centre, the coordinate is taken back into the
//! source CRS, located on the source grid and sampled. Cells that fall
//! outside the source, onto source nodata, or fail to transform become the
//! output nodata.

use crate::maybe_rayon::*;
use crate::reproject::transform::CoordinateTransform;
use floodfuse_core::raster::{Bounds, GeoTransform};
use floodfuse_core::{Error, Raster, RasterElement, Result, CRS};
use serde::{Deserialize, Serialize};

/// Nodata written by the resampler when the source carries none
pub const DEFAULT_NODATA: f64 = -9999.0;

/// Sampling kernel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResampleMethod {
    /// Value of the source pixel containing the sample point
    Nearest,
    /// Distance-weighted mean of the four surrounding pixel centres
    #[default]
    Bilinear,
}

/// Output grid of a warp
#[derive(Debug, Clone, PartialEq)]
pub struct WarpTarget {
    pub transform: GeoTransform,
    pub rows: usize,
    pub cols: usize,
    pub crs: Option<CRS>,
}

impl WarpTarget {
    /// Grid covering `bounds` with pixels snapped to multiples of the
    /// resolution.
    pub fn aligned(bounds: Bounds, res_x: f64, res_y: f64, crs: Option<CRS>) -> Result<Self> {
        for (name, res) in [("res_x", res_x), ("res_y", res_y)] {
            if !res.is_finite() || res <= 0.0 {
                return Err(Error::InvalidParameter {
                    name,
                    value: res.to_string(),
                    reason: "resolution must be a positive number".into(),
                });
            }
        }

        let (transform, cols, rows) = GeoTransform::aligned_to(bounds, res_x, res_y);
        if rows == 0 || cols == 0 {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }
        Ok(Self {
            transform,
            rows,
            cols,
            crs,
        })
    }

    /// The exact grid of an existing raster
    pub fn of<T: RasterElement>(raster: &Raster<T>) -> Self {
        Self {
            transform: *raster.transform(),
            rows: raster.rows(),
            cols: raster.cols(),
            crs: raster.crs().cloned(),
        }
    }
}

/// Parameters for [`warp`]
#[derive(Debug, Clone, Copy, Default)]
pub struct WarpParams {
    pub method: ResampleMethod,
    /// Output nodata; defaults to the source's, then [`DEFAULT_NODATA`]
    pub dst_nodata: Option<f64>,
}

/// Resample `src` onto `target`.
///
/// `transform` maps coordinates from the target CRS into the source CRS.
pub fn warp<T: RasterElement>(
    src: &Raster<T>,
    target: &WarpTarget,
    params: WarpParams,
    transform: &dyn CoordinateTransform,
) -> Result<Raster<f64>> {
    if src.is_empty() {
        return Err(Error::InvalidDimensions {
            width: src.cols(),
            height: src.rows(),
        });
    }

    let nodata = params
        .dst_nodata
        .or_else(|| src.nodata().and_then(|nd| nd.to_f64()))
        .unwrap_or(DEFAULT_NODATA);

    let (rows, cols) = (target.rows, target.cols);
    let dst_transform = target.transform;
    let src_transform = *src.transform();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![nodata; cols];
            for (col, cell) in row_data.iter_mut().enumerate() {
                let (x, y) = dst_transform.pixel_to_geo(col, row);
                let Ok((sx, sy)) = transform.transform(x, y) else {
                    continue;
                };
                let (fc, fr) = src_transform.geo_to_pixel(sx, sy);
                let sample = match params.method {
                    ResampleMethod::Nearest => sample_nearest(src, fc, fr),
                    ResampleMethod::Bilinear => sample_bilinear(src, fc, fr),
                };
                if let Some(v) = sample {
                    *cell = v;
                }
            }
            row_data
        })
        .collect();

    let mut output = Raster::from_vec(data, rows, cols)?;
    output.set_transform(dst_transform);
    output.set_crs(target.crs.clone());
    output.set_nodata(Some(nodata));
    Ok(output)
}

#[inline]
fn valid_at<T: RasterElement>(src: &Raster<T>, row: usize, col: usize) -> Option<f64> {
    // SAFETY: callers pass indices checked against the source shape
    let v = unsafe { src.get_unchecked(row, col) };
    if src.is_nodata(v) {
        return None;
    }
    v.to_f64().filter(|f| f.is_finite())
}

fn sample_nearest<T: RasterElement>(src: &Raster<T>, fc: f64, fr: f64) -> Option<f64> {
    if !fc.is_finite() || !fr.is_finite() || fc < 0.0 || fr < 0.0 {
        return None;
    }
    let (col, row) = (fc.floor() as usize, fr.floor() as usize);
    if row >= src.rows() || col >= src.cols() {
        return None;
    }
    valid_at(src, row, col)
}

fn sample_bilinear<T: RasterElement>(src: &Raster<T>, fc: f64, fr: f64) -> Option<f64> {
    let (rows, cols) = src.shape();
    if !fc.is_finite() || !fr.is_finite() || fc < 0.0 || fr < 0.0 {
        return None;
    }
    if fc >= cols as f64 || fr >= rows as f64 {
        return None;
    }

    // Position relative to pixel centres
    let u = fc - 0.5;
    let v = fr - 0.5;
    let c0 = u.floor();
    let r0 = v.floor();
    let tx = u - c0;
    let ty = v - r0;

    let clamp = |i: f64, n: usize| i.max(0.0).min((n - 1) as f64) as usize;
    let neighbours = [
        (clamp(r0, rows), clamp(c0, cols), (1.0 - tx) * (1.0 - ty)),
        (clamp(r0, rows), clamp(c0 + 1.0, cols), tx * (1.0 - ty)),
        (clamp(r0 + 1.0, rows), clamp(c0, cols), (1.0 - tx) * ty),
        (clamp(r0 + 1.0, rows), clamp(c0 + 1.0, cols), tx * ty),
    ];

    let mut sum = 0.0;
    let mut weight = 0.0;
    for (r, c, w) in neighbours {
        if w <= 0.0 {
            continue;
        }
        if let Some(value) = valid_at(src, r, c) {
            sum += value * w;
            weight += w;
        }
    }

    // Renormalise over the valid neighbours
    if weight > 1e-12 {
        Some(sum / weight)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reproject::transform::Identity;
    use approx::assert_relative_eq;

    fn ramp() -> Raster<f64> {
        // 4x4, 10 m pixels, value = col
        let mut r = Raster::from_vec((0..16).map(|i| (i % 4) as f64).collect(), 4, 4).unwrap();
        r.set_transform(GeoTransform::new(0.0, 40.0, 10.0, -10.0));
        r.set_nodata(Some(-9999.0));
        r
    }

    #[test]
    fn identity_warp_is_lossless() {
        let src = ramp();
        for method in [ResampleMethod::Nearest, ResampleMethod::Bilinear] {
            let out = warp(
                &src,
                &WarpTarget::of(&src),
                WarpParams { method, dst_nodata: None },
                &Identity,
            )
            .unwrap();
            assert_eq!(out.data(), src.data());
        }
    }

    #[test]
    fn bilinear_interpolates_between_centres() {
        let src = ramp();
        // 5 m pixels: output centres at 2.5, 7.5, 12.5 ... in x
        let target = WarpTarget::aligned(src.bounds(), 5.0, 5.0, None).unwrap();
        assert_eq!((target.rows, target.cols), (8, 8));

        let out = warp(&src, &target, WarpParams::default(), &Identity).unwrap();
        // x = 12.5 → fractional col 1.25 → between centres 0 and 1 at 0.75
        assert_relative_eq!(out.get(2, 2).unwrap(), 0.75, epsilon = 1e-12);
        // x = 2.5 lies before the first centre, clamped to col 0
        assert_relative_eq!(out.get(0, 0).unwrap(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn nearest_keeps_categories() {
        let src = ramp();
        let target = WarpTarget::aligned(src.bounds(), 5.0, 5.0, None).unwrap();
        let params = WarpParams { method: ResampleMethod::Nearest, dst_nodata: None };
        let out = warp(&src, &target, params, &Identity).unwrap();
        assert!(out.data().iter().all(|v| v.fract() == 0.0));
        assert_eq!(out.get(0, 3).unwrap(), 1.0);
    }

    #[test]
    fn outside_source_is_nodata() {
        let src = ramp();
        let target = WarpTarget::aligned((20.0, 0.0, 60.0, 40.0), 10.0, 10.0, None).unwrap();
        let out = warp(&src, &target, WarpParams::default(), &Identity).unwrap();
        assert_eq!(out.get(0, 0).unwrap(), 2.0);
        assert_eq!(out.get(0, 3).unwrap(), -9999.0);
        assert_eq!(out.nodata(), Some(-9999.0));
    }

    #[test]
    fn nodata_is_not_blended() {
        let mut src = ramp();
        src.set(0, 1, -9999.0).unwrap();
        let target = WarpTarget::aligned(src.bounds(), 5.0, 5.0, None).unwrap();
        let out = warp(&src, &target, WarpParams::default(), &Identity).unwrap();
        // (row 0, col 2) samples around source cols 0 and 1 of row 0
        let v = out.get(0, 2).unwrap();
        assert!(v > -1.0 && v <= 2.0, "nodata leaked into {v}");
    }

    #[test]
    fn rejects_bad_resolution() {
        assert!(WarpTarget::aligned((0.0, 0.0, 1.0, 1.0), 0.0, 1.0, None).is_err());
        assert!(WarpTarget::aligned((0.0, 0.0, 1.0, 1.0), f64::NAN, 1.0, None).is_err());
    }
}

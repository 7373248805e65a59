//! Resolution and CRS reconciliation
//!
//! Brings two rasters onto one congruent pixel lattice so that they can be
//! compared cell by cell. Two modes:
//!
//! - **target resolution**: both grids are resampled to the requested
//!   pixel size over their common extent, on a lattice aligned to multiples
//!   of that size.
//! - **match**: the grid with the larger pixel area is resampled onto the
//!   grid of the finer one; grids whose pixel areas agree are returned as is.
//!
//! When the CRSs differ, the policy decides between failing and reprojecting
//! the second grid into the CRS of the first.

use crate::reproject::{
    suggested_target, transform_between, warp, Identity, ResampleMethod, WarpParams, WarpTarget,
    DEFAULT_NODATA,
};
use floodfuse_core::raster::intersect_bounds;
use floodfuse_core::{Algorithm, Congruence, Error, Raster, RasterElement, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Pixel areas closer than this are considered equal
pub const AREA_TOLERANCE: f64 = 1e-6;

/// What to do when the two inputs do not share a CRS
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrsMismatchPolicy {
    /// Refuse with [`Error::CrsMismatch`]
    #[default]
    Fail,
    /// Reproject the second grid into the CRS of the first
    Reproject,
}

/// Nature of the values held by a grid, which selects the resampling kernel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleKind {
    /// Measurements such as elevation: bilinear
    #[default]
    Continuous,
    /// Class codes such as land cover: nearest, never blended
    Categorical,
}

impl SampleKind {
    pub fn method(self) -> ResampleMethod {
        match self {
            SampleKind::Continuous => ResampleMethod::Bilinear,
            SampleKind::Categorical => ResampleMethod::Nearest,
        }
    }
}

/// Parameters for [`reconcile`]
#[derive(Debug, Clone, Default)]
pub struct ReconcileParams {
    /// Common pixel size in CRS units; `None` matches the finer grid
    pub target_resolution: Option<f64>,
    pub on_crs_mismatch: CrsMismatchPolicy,
    pub kind_a: SampleKind,
    pub kind_b: SampleKind,
}

/// Reconcile algorithm
#[derive(Debug, Clone, Default)]
pub struct Reconcile;

impl Algorithm for Reconcile {
    type Input = (Raster<f64>, Raster<f64>);
    type Output = (Raster<f64>, Raster<f64>);
    type Params = ReconcileParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Reconcile"
    }

    fn description(&self) -> &'static str {
        "Bring two rasters onto a common CRS and congruent pixel grid"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        reconcile(&input.0, &input.1, &params)
    }
}

/// Reconcile two rasters onto a congruent grid.
///
/// Returns the outputs in input order. Nodata of each input is carried
/// through every resample.
///
/// # Errors
/// - [`Error::CrsMismatch`] when the CRSs differ under
///   [`CrsMismatchPolicy::Fail`], or when no transform path exists
/// - [`Error::InvalidParameter`] for a non-positive target resolution
/// - [`Error::Algorithm`] when the grids do not overlap
pub fn reconcile<A, B>(
    a: &Raster<A>,
    b: &Raster<B>,
    params: &ReconcileParams,
) -> Result<(Raster<f64>, Raster<f64>)>
where
    A: RasterElement,
    B: RasterElement,
{
    if let Some(res) = params.target_resolution {
        if !res.is_finite() || res <= 0.0 {
            return Err(Error::InvalidParameter {
                name: "target_resolution",
                value: res.to_string(),
                reason: "must be a positive number".into(),
            });
        }
    }

    let a = a.cast::<f64>();
    let b = align_crs(&a, b.cast::<f64>(), params)?;

    let (out_a, out_b) = match params.target_resolution {
        Some(res) => resample_both(&a, &b, res, params)?,
        None => match_finer(a, b, params)?,
    };

    match out_a.congruence(&out_b) {
        Congruence::Congruent => info!(
            "Reconciled grids: {}x{} at {:?}",
            out_a.rows(),
            out_a.cols(),
            out_a.resolution()
        ),
        other => warn!(
            target: "floodfuse::integrity",
            "Reconciled grids are not congruent ({:?}); pixel correspondence is approximate",
            other
        ),
    }

    Ok((out_a, out_b))
}

/// Put `b` into the CRS of `a`, or fail, depending on the policy
fn align_crs(a: &Raster<f64>, b: Raster<f64>, params: &ReconcileParams) -> Result<Raster<f64>> {
    if a.same_crs(&b) {
        return Ok(b);
    }

    let describe = |r: &Raster<f64>| {
        r.crs()
            .map(|c| c.identifier())
            .unwrap_or_else(|| "Unknown".into())
    };

    match params.on_crs_mismatch {
        CrsMismatchPolicy::Fail => Err(Error::CrsMismatch(describe(a), describe(&b))),
        CrsMismatchPolicy::Reproject => {
            let (Some(target_crs), Some(source_crs)) = (a.crs(), b.crs()) else {
                return Err(Error::CrsMismatch(describe(a), describe(&b)));
            };
            info!("Reprojecting second grid {} -> {}", source_crs, target_crs);

            let forward = transform_between(Some(source_crs), Some(target_crs))?;
            let inverse = transform_between(Some(target_crs), Some(source_crs))?;
            let target = suggested_target(&b, target_crs, forward.as_ref())?;

            let warp_params = WarpParams {
                method: params.kind_b.method(),
                dst_nodata: Some(sentinel(&b, a)),
            };
            warp(&b, &target, warp_params, inverse.as_ref())
        }
    }
}

/// Nodata for a resampled grid: its own, else the other input's, else default
fn sentinel(primary: &Raster<f64>, secondary: &Raster<f64>) -> f64 {
    primary
        .nodata()
        .or_else(|| secondary.nodata())
        .unwrap_or(DEFAULT_NODATA)
}

fn resample_both(
    a: &Raster<f64>,
    b: &Raster<f64>,
    res: f64,
    params: &ReconcileParams,
) -> Result<(Raster<f64>, Raster<f64>)> {
    let bounds = intersect_bounds(a.bounds(), b.bounds())
        .ok_or_else(|| Error::Algorithm("Input grids do not overlap".into()))?;
    let target = WarpTarget::aligned(bounds, res, res, a.crs().cloned())?;
    debug!(
        "Resampling both grids to {} over {:?} ({}x{})",
        res, bounds, target.rows, target.cols
    );

    let out_a = warp(
        a,
        &target,
        WarpParams {
            method: params.kind_a.method(),
            dst_nodata: Some(sentinel(a, b)),
        },
        &Identity,
    )?;
    let out_b = warp(
        b,
        &target,
        WarpParams {
            method: params.kind_b.method(),
            dst_nodata: Some(sentinel(b, a)),
        },
        &Identity,
    )?;
    Ok((out_a, out_b))
}

fn match_finer(
    a: Raster<f64>,
    b: Raster<f64>,
    params: &ReconcileParams,
) -> Result<(Raster<f64>, Raster<f64>)> {
    let area_a = a.pixel_area();
    let area_b = b.pixel_area();

    if (area_a - area_b).abs() <= AREA_TOLERANCE {
        debug!("Pixel areas agree ({}), grids returned unchanged", area_a);
        return Ok((a, b));
    }

    if intersect_bounds(a.bounds(), b.bounds()).is_none() {
        return Err(Error::Algorithm("Input grids do not overlap".into()));
    }

    if area_a < area_b {
        info!("Resampling second grid ({} -> {} per pixel)", area_b, area_a);
        let params_b = WarpParams {
            method: params.kind_b.method(),
            dst_nodata: Some(sentinel(&b, &a)),
        };
        let out_b = warp(&b, &WarpTarget::of(&a), params_b, &Identity)?;
        Ok((a, out_b))
    } else {
        info!("Resampling first grid ({} -> {} per pixel)", area_a, area_b);
        let params_a = WarpParams {
            method: params.kind_a.method(),
            dst_nodata: Some(sentinel(&a, &b)),
        };
        let out_a = warp(&a, &WarpTarget::of(&b), params_a, &Identity)?;
        Ok((out_a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use floodfuse_core::{GeoTransform, CRS};

    fn grid(rows: usize, cols: usize, res: f64, value: f64, epsg: u32) -> Raster<f64> {
        let mut r = Raster::filled(rows, cols, value);
        r.set_transform(GeoTransform::new(0.0, rows as f64 * res, res, -res));
        r.set_crs(Some(CRS::from_epsg(epsg)));
        r.set_nodata(Some(-9999.0));
        r
    }

    #[test]
    fn coarser_grid_follows_finer() {
        // pixel areas 4 and 9
        let a = grid(4, 4, 2.0, 1.0, 31983);
        let b = grid(4, 4, 3.0, 7.0, 31983);

        let (ra, rb) = reconcile(&a, &b, &ReconcileParams::default()).unwrap();
        assert!(ra.is_congruent(&rb));
        assert_eq!(ra.shape(), (4, 4));
        assert_eq!(rb.shape(), (4, 4));
        assert_eq!(rb.pixel_area(), 4.0);
        assert!(rb.data().iter().all(|&v| (v - 7.0).abs() < 1e-9));
    }

    #[test]
    fn order_is_preserved_when_first_is_coarser() {
        let a = grid(4, 4, 3.0, 7.0, 31983);
        let b = grid(4, 4, 2.0, 1.0, 31983);
        let (ra, rb) = reconcile(&a, &b, &ReconcileParams::default()).unwrap();
        assert_relative_eq!(ra.get(0, 0).unwrap(), 7.0, epsilon = 1e-9);
        assert_eq!(rb.get(0, 0).unwrap(), 1.0);
        assert!(ra.is_congruent(&rb));
    }

    #[test]
    fn algorithm_interface_matches_function() {
        let a = grid(4, 4, 2.0, 1.0, 31983);
        let b = grid(4, 4, 3.0, 7.0, 31983);
        let (fa, fb) = reconcile(&a, &b, &ReconcileParams::default()).unwrap();
        let (ra, rb) = Reconcile.execute_default((a, b)).unwrap();
        assert_eq!(ra, fa);
        assert_eq!(rb, fb);
        assert!(!Reconcile.name().is_empty());
    }

    #[test]
    fn equal_areas_are_untouched() {
        let a = grid(3, 3, 5.0, 1.0, 31983);
        let b = grid(6, 2, 5.0, 2.0, 31983);
        let (ra, rb) = reconcile(&a, &b, &ReconcileParams::default()).unwrap();
        assert_eq!(ra.shape(), (3, 3));
        assert_eq!(rb.shape(), (6, 2));
    }

    #[test]
    fn target_resolution_applies_to_both() {
        let a = grid(10, 10, 1.0, 1.0, 31983);
        let b = grid(5, 5, 2.0, 2.0, 31983);
        let params = ReconcileParams {
            target_resolution: Some(0.5),
            ..Default::default()
        };
        let (ra, rb) = reconcile(&a, &b, &params).unwrap();
        assert!(ra.is_congruent(&rb));
        assert_eq!(ra.shape(), rb.shape());
        assert_eq!(ra.shape(), (20, 20));
        assert_eq!(ra.resolution(), (0.5, 0.5));
    }

    #[test]
    fn crs_mismatch_fails_by_default() {
        let a = grid(4, 4, 2.0, 1.0, 31983);
        let b = grid(4, 4, 2.0, 1.0, 31982);
        let err = reconcile(&a, &b, &ReconcileParams::default()).unwrap_err();
        match err {
            Error::CrsMismatch(x, y) => {
                assert_eq!(x, "EPSG:31983");
                assert_eq!(y, "EPSG:31982");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn crs_mismatch_reprojects_on_request() {
        let mut a = grid(20, 20, 100.0, 1.0, 31983);
        a.set_transform(GeoTransform::new(330_000.0, 7_396_000.0, 100.0, -100.0));

        // one-degree geographic tile around a (~ -46.66, -23.53)
        let mut b = Raster::filled(100, 100, 3.0);
        b.set_transform(GeoTransform::new(-47.0, -23.0, 0.01, -0.01));
        b.set_crs(Some(CRS::from_epsg(4674)));
        b.set_nodata(Some(-9999.0));

        let params = ReconcileParams {
            on_crs_mismatch: CrsMismatchPolicy::Reproject,
            kind_b: SampleKind::Categorical,
            ..Default::default()
        };
        let (ra, rb) = reconcile(&a, &b, &params).unwrap();
        assert_eq!(rb.crs().and_then(|c| c.epsg()), Some(31983));
        assert!(ra.is_congruent(&rb));
        // the tile is coarser, so it was resampled onto a's grid
        assert_eq!(rb.shape(), (20, 20));
        assert!(rb.data().iter().all(|&v| v == 3.0));
    }

    #[test]
    fn unknown_crs_cannot_be_reprojected() {
        let a = grid(4, 4, 2.0, 1.0, 31983);
        let b = grid(4, 4, 2.0, 1.0, 2154);
        let params = ReconcileParams {
            on_crs_mismatch: CrsMismatchPolicy::Reproject,
            ..Default::default()
        };
        assert!(matches!(
            reconcile(&a, &b, &params).unwrap_err(),
            Error::CrsMismatch(..)
        ));
    }

    #[test]
    fn nodata_survives_resampling() {
        let a = grid(4, 4, 2.0, 1.0, 31983);
        let mut b = grid(4, 4, 3.0, 7.0, 31983);
        b.set(1, 0, -9999.0).unwrap();
        let (_, rb) = reconcile(&a, &b, &ReconcileParams {
            kind_b: SampleKind::Categorical,
            ..Default::default()
        })
        .unwrap();
        // a's pixel (0,0) centre (1, 7) falls in b's pixel (1,0)
        assert_eq!(rb.get(0, 0).unwrap(), -9999.0);
        assert_eq!(rb.nodata(), Some(-9999.0));
    }

    #[test]
    fn rejects_zero_resolution() {
        let a = grid(2, 2, 1.0, 1.0, 31983);
        let params = ReconcileParams {
            target_resolution: Some(0.0),
            ..Default::default()
        };
        assert!(reconcile(&a, &a, &params).unwrap_err().is_configuration());
    }
}

//! Reprojection and resampling
//!
//! - [`CoordinateTransform`]: point transform between two CRSs
//! - [`warp`]: resample a raster onto an arbitrary target grid
//! - [`reproject`]: warp into another CRS onto a suggested output grid

mod transform;
mod warp;

pub use transform::{proj_definition, transform_between, CoordinateTransform, Identity, ProjTransform};
pub use warp::{warp, ResampleMethod, WarpParams, WarpTarget, DEFAULT_NODATA};

use floodfuse_core::raster::Bounds;
use floodfuse_core::{Error, Raster, RasterElement, Result, CRS};
use tracing::debug;

/// Number of samples taken along each edge when projecting an extent
const EDGE_SAMPLES: usize = 21;

/// Project an extent through `transform`, sampling along its edges so that
/// curved edges are enclosed.
pub fn transform_bounds(bounds: Bounds, transform: &dyn CoordinateTransform) -> Result<Bounds> {
    let (min_x, min_y, max_x, max_y) = bounds;
    let mut out = (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
    let mut hits = 0usize;

    for i in 0..EDGE_SAMPLES {
        let t = i as f64 / (EDGE_SAMPLES - 1) as f64;
        let x = min_x + t * (max_x - min_x);
        let y = min_y + t * (max_y - min_y);
        for (px, py) in [(x, min_y), (x, max_y), (min_x, y), (max_x, y)] {
            if let Ok((tx, ty)) = transform.transform(px, py) {
                out.0 = out.0.min(tx);
                out.1 = out.1.min(ty);
                out.2 = out.2.max(tx);
                out.3 = out.3.max(ty);
                hits += 1;
            }
        }
    }

    if hits == 0 {
        return Err(Error::Algorithm(
            "Extent could not be transformed into the target CRS".into(),
        ));
    }
    Ok(out)
}

/// Output grid for warping `src` into `target_crs`: the projected extent
/// on square pixels that keep the source's pixel count along the diagonal.
pub fn suggested_target<T: RasterElement>(
    src: &Raster<T>,
    target_crs: &CRS,
    forward: &dyn CoordinateTransform,
) -> Result<WarpTarget> {
    let bounds = transform_bounds(src.bounds(), forward)?;
    let diagonal = ((bounds.2 - bounds.0).powi(2) + (bounds.3 - bounds.1).powi(2)).sqrt();
    let pixels = ((src.cols() as f64).powi(2) + (src.rows() as f64).powi(2)).sqrt();
    let res = diagonal / pixels;

    debug!(
        "Suggested warp grid: bounds {:?}, resolution {:.6} in {}",
        bounds, res, target_crs
    );
    WarpTarget::aligned(bounds, res, res, Some(target_crs.clone()))
}

/// Warp `src` into `target_crs` on a suggested aligned grid.
pub fn reproject<T: RasterElement>(
    src: &Raster<T>,
    target_crs: &CRS,
    params: WarpParams,
) -> Result<Raster<f64>> {
    let source_crs = src.crs().ok_or_else(|| {
        Error::CrsMismatch("Unknown".into(), target_crs.identifier())
    })?;
    let forward = transform_between(Some(source_crs), Some(target_crs))?;
    let inverse = transform_between(Some(target_crs), Some(source_crs))?;

    let target = suggested_target(src, target_crs, forward.as_ref())?;
    warp(src, &target, params, inverse.as_ref())
}

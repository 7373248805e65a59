//! Proximity (distance-to-feature) rasters
//!
//! Exact Euclidean distance transform after Felzenszwalb & Huttenlocher
//! (2012), "Distance Transforms of Sampled Functions": a 1-D lower envelope
//! of parabolas run down every column, then along every row. Running each
//! pass with its own pixel spacing gives exact distances on non-square
//! pixels, in the CRS's linear units.
//!
//! Distances are planar. They are only meaningful for a locally projected
//! CRS; a geographic CRS is accepted with a warning.

use crate::maybe_rayon::*;
use crate::rasterize::{rasterize, PixelSize, RasterizeParams};
use floodfuse_core::{Algorithm, Error, Raster, RasterElement, Result, VectorLayer};
use tracing::{debug, info, warn};

/// Nodata of every distance raster
pub const PROXIMITY_NODATA: f64 = -9999.0;

/// Parameters for [`distance_field`] and [`proximity`]
#[derive(Debug, Clone, Copy)]
pub struct ProximityParams {
    /// Pixels farther than this from any target become nodata
    pub max_distance: Option<f64>,
    /// Presence value marking target pixels
    pub target_value: u8,
    /// Rasterization settings used by [`proximity`]
    pub rasterize: RasterizeParams,
}

impl Default for ProximityParams {
    fn default() -> Self {
        Self {
            max_distance: None,
            target_value: 1,
            rasterize: RasterizeParams::default(),
        }
    }
}

/// Distance transform algorithm
#[derive(Debug, Clone, Default)]
pub struct Proximity;

impl Algorithm for Proximity {
    type Input = Raster<u8>;
    type Output = Raster<f64>;
    type Params = ProximityParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Proximity"
    }

    fn description(&self) -> &'static str {
        "Euclidean distance to the nearest target pixel"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        distance_field(&input, &params)
    }
}

/// Rasterize `layer` over `reference` and compute its distance field.
///
/// The presence grid is an intermediate and is dropped before returning;
/// the output has its geotransform, CRS and dimensions.
pub fn proximity<T: RasterElement, R: Into<PixelSize>>(
    layer: &VectorLayer,
    reference: &Raster<T>,
    resolution: R,
    params: &ProximityParams,
) -> Result<Raster<f64>> {
    let presence = rasterize(layer, reference, resolution, &params.rasterize)?;
    let distances = distance_field(&presence, params)?;
    drop(presence);
    Ok(distances)
}

/// Distance from every pixel to the nearest pixel equal to
/// `params.target_value`.
pub fn distance_field(presence: &Raster<u8>, params: &ProximityParams) -> Result<Raster<f64>> {
    if let Some(max) = params.max_distance {
        if max.is_nan() || max < 0.0 {
            return Err(Error::InvalidParameter {
                name: "max_distance",
                value: max.to_string(),
                reason: "must be a non-negative number".into(),
            });
        }
    }

    let (rows, cols) = presence.shape();
    if rows == 0 || cols == 0 {
        return Err(Error::InvalidDimensions {
            width: cols,
            height: rows,
        });
    }

    if presence.crs().map(|c| c.is_geographic()).unwrap_or(false) {
        warn!(
            "Distance on a geographic CRS ({}) is computed in degrees",
            presence.crs().map(|c| c.identifier()).unwrap_or_default()
        );
    }

    let (dx, dy) = presence.resolution();
    let target = params.target_value;
    let targets = presence.data().iter().filter(|&&v| v == target).count();

    let mut output = presence.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(PROXIMITY_NODATA));

    if targets == 0 {
        warn!("Presence grid has no target pixels; distance raster is all nodata");
        output.data_mut().fill(PROXIMITY_NODATA);
        return Ok(output);
    }
    debug!("Distance transform over {}x{} with {} targets", rows, cols, targets);

    // Pass 1: squared distance along each column
    let columns: Vec<Vec<f64>> = (0..cols)
        .into_par_iter()
        .map(|col| {
            let f: Vec<f64> = (0..rows)
                .map(|row| {
                    // SAFETY: row < rows, col < cols
                    let v = unsafe { presence.get_unchecked(row, col) };
                    if v == target {
                        0.0
                    } else {
                        f64::INFINITY
                    }
                })
                .collect();
            squared_edt_1d(&f, dy)
        })
        .collect();

    // Pass 2: along each row, over the column results
    let max_sq = params.max_distance.map(|m| m * m);
    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let f: Vec<f64> = (0..cols).map(|col| columns[col][row]).collect();
            squared_edt_1d(&f, dx)
                .into_iter()
                .map(|sq| match max_sq {
                    Some(limit) if sq > limit => PROXIMITY_NODATA,
                    _ if !sq.is_finite() => PROXIMITY_NODATA,
                    _ => sq.sqrt(),
                })
                .collect::<Vec<f64>>()
        })
        .collect();

    *output.data_mut() = ndarray::Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| Error::Algorithm(e.to_string()))?;

    info!(
        "Distance field: {} targets, {} pixels within range",
        targets,
        output.valid_count()
    );
    Ok(output)
}

/// 1-D squared distance transform of a sampled function with uniform
/// `spacing` between samples. Infinite samples contribute no parabola.
fn squared_edt_1d(f: &[f64], spacing: f64) -> Vec<f64> {
    let n = f.len();
    let mut d = vec![f64::INFINITY; n];
    // v: parabola apexes of the lower envelope; z: boundaries between them
    let mut v = vec![0usize; n];
    let mut z = vec![0.0_f64; n + 1];
    let mut k = 0usize;

    let pos = |i: usize| i as f64 * spacing;
    let intersect = |p: usize, q: usize| {
        ((f[q] + pos(q) * pos(q)) - (f[p] + pos(p) * pos(p))) / (2.0 * (pos(q) - pos(p)))
    };

    for q in 0..n {
        if !f[q].is_finite() {
            continue;
        }
        if k == 0 {
            v[0] = q;
            z[0] = f64::NEG_INFINITY;
            z[1] = f64::INFINITY;
            k = 1;
            continue;
        }
        let mut s = intersect(v[k - 1], q);
        while s <= z[k - 1] {
            k -= 1;
            if k == 0 {
                break;
            }
            s = intersect(v[k - 1], q);
        }
        if k == 0 {
            v[0] = q;
            z[0] = f64::NEG_INFINITY;
        } else {
            v[k] = q;
            z[k] = s;
        }
        z[k + 1] = f64::INFINITY;
        k += 1;
    }

    if k == 0 {
        return d;
    }

    let mut j = 0usize;
    for (q, out) in d.iter_mut().enumerate() {
        let x = pos(q);
        while z[j + 1] < x {
            j += 1;
        }
        let delta = x - pos(v[j]);
        *out = delta * delta + f[v[j]];
    }
    d
}

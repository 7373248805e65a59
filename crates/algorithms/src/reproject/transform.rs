//! Point transformation between coordinate reference systems
//!
//! The projection mathematics live in `proj4rs` (pure Rust, no libproj);
//! this module only maps our [`CRS`] identifiers onto PROJ definitions and
//! handles the degree/radian convention at the boundary.

use proj4rs::proj::Proj;
use proj4rs::transform::transform;
use floodfuse_core::{Error, Result, CRS};

/// Maps a coordinate from one CRS into another.
///
/// Implementations must be deterministic: the same input always yields the
/// same output, so warps and rasterizations are reproducible.
pub trait CoordinateTransform: std::fmt::Debug + Send + Sync {
    fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)>;
}

/// The no-op transform between equivalent systems
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl CoordinateTransform for Identity {
    #[inline]
    fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        Ok((x, y))
    }
}

/// PROJ definition for a CRS, from its PROJ string or a built-in EPSG table.
///
/// The table covers WGS84 (4326), SIRGAS 2000 (4674), Web Mercator (3857),
/// WGS84 / UTM (326xx, 327xx) and SIRGAS 2000 / UTM (31965–31985).
pub fn proj_definition(crs: &CRS) -> Option<String> {
    if let Some(proj) = crs.proj() {
        return Some(proj.to_string());
    }
    let code = crs.epsg()?;
    let def = match code {
        4326 => "+proj=longlat +datum=WGS84 +no_defs".to_string(),
        4674 => "+proj=longlat +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +no_defs".to_string(),
        3857 => "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs"
            .to_string(),
        32601..=32660 => format!("+proj=utm +zone={} +datum=WGS84 +units=m +no_defs", code - 32600),
        32701..=32760 => format!(
            "+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs",
            code - 32700
        ),
        // SIRGAS 2000 / UTM 11N..22N
        31965..=31976 => format!(
            "+proj=utm +zone={} +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs",
            code - 31965 + 11
        ),
        // SIRGAS 2000 / UTM 17S..25S
        31977..=31985 => format!(
            "+proj=utm +zone={} +south +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs",
            code - 31977 + 17
        ),
        _ => return None,
    };
    Some(def)
}

fn is_latlong(def: &str) -> bool {
    def.contains("+proj=longlat") || def.contains("+proj=latlong")
}

/// Transform backed by `proj4rs`
pub struct ProjTransform {
    source: Proj,
    target: Proj,
    source_geographic: bool,
    target_geographic: bool,
    label: String,
}

impl std::fmt::Debug for ProjTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjTransform").field("label", &self.label).finish()
    }
}

impl ProjTransform {
    /// Build a transform from `source` to `target`.
    ///
    /// Fails with [`Error::CrsMismatch`] when either system has no known
    /// PROJ definition, i.e. there is no transform path between them.
    pub fn new(source: &CRS, target: &CRS) -> Result<Self> {
        let mismatch = || Error::CrsMismatch(source.identifier(), target.identifier());

        let source_def = proj_definition(source).ok_or_else(mismatch)?;
        let target_def = proj_definition(target).ok_or_else(mismatch)?;

        let source_proj = Proj::from_proj_string(&source_def).map_err(|_| mismatch())?;
        let target_proj = Proj::from_proj_string(&target_def).map_err(|_| mismatch())?;

        Ok(Self {
            source: source_proj,
            target: target_proj,
            source_geographic: is_latlong(&source_def),
            target_geographic: is_latlong(&target_def),
            label: format!("{} -> {}", source, target),
        })
    }
}

impl CoordinateTransform for ProjTransform {
    fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        // proj4rs works in radians for geographic systems
        let (in_x, in_y) = if self.source_geographic {
            (x.to_radians(), y.to_radians())
        } else {
            (x, y)
        };

        let mut point = (in_x, in_y, 0.0);
        transform(&self.source, &self.target, &mut point)
            .map_err(|e| Error::Algorithm(format!("Transform {} failed: {:?}", self.label, e)))?;

        let out = if self.target_geographic {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };

        if !out.0.is_finite() || !out.1.is_finite() {
            return Err(Error::Algorithm(format!(
                "Transform {} produced a non-finite coordinate",
                self.label
            )));
        }
        Ok(out)
    }
}

/// Transform from `source` to `target`, or [`Identity`] when they agree.
///
/// A missing CRS on either side is treated as "no transform path" unless
/// both are missing.
pub fn transform_between(
    source: Option<&CRS>,
    target: Option<&CRS>,
) -> Result<Box<dyn CoordinateTransform>> {
    match (source, target) {
        (None, None) => Ok(Box::new(Identity)),
        (Some(s), Some(t)) if s.is_equivalent(t) => Ok(Box::new(Identity)),
        (Some(s), Some(t)) => Ok(Box::new(ProjTransform::new(s, t)?)),
        (s, t) => Err(Error::CrsMismatch(
            s.map(|c| c.identifier()).unwrap_or_else(|| "Unknown".into()),
            t.map(|c| c.identifier()).unwrap_or_else(|| "Unknown".into()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64, msg: &str) {
        let diff = (a - b).abs();
        assert!(diff < tol, "{msg}: expected {b}, got {a}, diff {diff} exceeds tolerance {tol}");
    }

    #[test]
    fn sirgas_utm_table() {
        let def = proj_definition(&CRS::from_epsg(31983)).unwrap();
        assert!(def.contains("+zone=23") && def.contains("+south"));
        let def = proj_definition(&CRS::from_epsg(31976)).unwrap();
        assert!(def.contains("+zone=22") && !def.contains("+south"));
        assert!(proj_definition(&CRS::from_epsg(2154)).is_none());
    }

    // Madrid in WGS84 → UTM 30N, reference from PROJ 9:
    //   (-3.7037, 40.4168) → (440298.94, 4474257.31)
    #[test]
    fn wgs84_to_utm() {
        let t = ProjTransform::new(&CRS::wgs84(), &CRS::from_epsg(32630)).unwrap();
        let (e, n) = t.transform(-3.7037, 40.4168).unwrap();
        assert_close(e, 440_298.94, 1.0, "easting");
        assert_close(n, 4_474_257.31, 1.0, "northing");
    }

    #[test]
    fn utm_roundtrip() {
        let fwd = ProjTransform::new(&CRS::from_epsg(4674), &CRS::from_epsg(31983)).unwrap();
        let inv = ProjTransform::new(&CRS::from_epsg(31983), &CRS::from_epsg(4674)).unwrap();
        let (e, n) = fwd.transform(-46.63, -23.55).unwrap();
        let (lon, lat) = inv.transform(e, n).unwrap();
        assert_close(lon, -46.63, 1e-7, "lon");
        assert_close(lat, -23.55, 1e-7, "lat");
    }

    #[test]
    fn unknown_crs_has_no_path() {
        let err = transform_between(Some(&CRS::from_epsg(2154)), Some(&CRS::wgs84())).unwrap_err();
        assert!(err.is_configuration());
        let err = transform_between(None, Some(&CRS::wgs84())).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn same_crs_resolves_to_identity() {
        let t = transform_between(Some(&CRS::from_epsg(31983)), Some(&CRS::from_epsg(31983))).unwrap();
        assert_eq!(format!("{:?}", t), "Identity");
        assert_eq!(t.transform(1.5, -2.5).unwrap(), (1.5, -2.5));
    }

    #[test]
    fn equivalent_crs_is_identity() {
        let t = transform_between(Some(&CRS::from_epsg(31983)), Some(&CRS::from_epsg(31983))).unwrap();
        assert_eq!(t.transform(1.5, -2.5).unwrap(), (1.5, -2.5));
    }
}

//! Pipeline configuration
//!
//! A JSON document, every field optional:
//!
//! ```json
//! {
//!   "on_crs_mismatch": "reproject",
//!   "target_resolution": 30.0,
//!   "max_distance": 5000.0,
//!   "all_touched": false,
//!   "pixel_anchor": "upper_left",
//!   "key_tolerance": 0.01,
//!   "inputs": {
//!     "dtm": "data/dtm/dtm.tif",
//!     "lulc": "data/lulc/lulc_utm.tif",
//!     "floods": "data/floods/occurrences_2019.geojson",
//!     "river": "data/hydro/river.geojson",
//!     "tributaries": "data/hydro/tributaries.geojson",
//!     "basin": "data/hydro/basin.geojson"
//!   },
//!   "output": "output/flood_features.csv"
//! }
//! ```

use std::path::{Path, PathBuf};

use floodfuse_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::fusion::FusionParams;
use crate::proximity::ProximityParams;
use crate::rasterize::RasterizeParams;
use crate::reconcile::{CrsMismatchPolicy, ReconcileParams, SampleKind};
use crate::tabular::{PixelAnchor, TabularizeParams};

/// Source files of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputPaths {
    pub dtm: Option<PathBuf>,
    pub lulc: Option<PathBuf>,
    pub floods: Option<PathBuf>,
    pub river: Option<PathBuf>,
    pub tributaries: Option<PathBuf>,
    pub basin: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub on_crs_mismatch: CrsMismatchPolicy,
    /// Common pixel size; `None` keeps the finer input grid
    pub target_resolution: Option<f64>,
    /// Distance fields are cut off beyond this many CRS units
    pub max_distance: Option<f64>,
    pub all_touched: bool,
    pub pixel_anchor: PixelAnchor,
    /// Join key snap distance, in pixels
    pub key_tolerance: f64,
    pub inputs: InputPaths,
    pub output: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            on_crs_mismatch: CrsMismatchPolicy::default(),
            target_resolution: None,
            max_distance: None,
            all_touched: false,
            pixel_anchor: PixelAnchor::default(),
            key_tolerance: FusionParams::default().key_tolerance,
            inputs: InputPaths::default(),
            output: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| Error::Other(format!("Invalid pipeline config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| Error::io_at(path, e))?;
        Self::from_json_str(&content)
    }

    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Other(e.to_string()))
    }

    /// Reject values no stage would accept
    pub fn validate(&self) -> Result<()> {
        if let Some(res) = self.target_resolution {
            if !res.is_finite() || res <= 0.0 {
                return Err(Error::InvalidParameter {
                    name: "target_resolution",
                    value: res.to_string(),
                    reason: "must be a positive number".into(),
                });
            }
        }
        if let Some(max) = self.max_distance {
            if max.is_nan() || max < 0.0 {
                return Err(Error::InvalidParameter {
                    name: "max_distance",
                    value: max.to_string(),
                    reason: "must be a non-negative number".into(),
                });
            }
        }
        if !(0.0..0.5).contains(&self.key_tolerance) {
            return Err(Error::InvalidParameter {
                name: "key_tolerance",
                value: self.key_tolerance.to_string(),
                reason: "must be in [0, 0.5) pixels".into(),
            });
        }
        Ok(())
    }

    /// Terrain is continuous, land cover categorical
    pub fn reconcile_params(&self) -> ReconcileParams {
        ReconcileParams {
            target_resolution: self.target_resolution,
            on_crs_mismatch: self.on_crs_mismatch,
            kind_a: SampleKind::Continuous,
            kind_b: SampleKind::Categorical,
        }
    }

    pub fn rasterize_params(&self) -> RasterizeParams {
        RasterizeParams {
            all_touched: self.all_touched,
            ..Default::default()
        }
    }

    pub fn proximity_params(&self) -> ProximityParams {
        ProximityParams {
            max_distance: self.max_distance,
            rasterize: self.rasterize_params(),
            ..Default::default()
        }
    }

    pub fn tabularize_params(&self) -> TabularizeParams {
        TabularizeParams {
            anchor: self.pixel_anchor,
        }
    }

    pub fn fusion_params(&self) -> FusionParams {
        FusionParams {
            key_tolerance: self.key_tolerance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_is_default() {
        let config = PipelineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.on_crs_mismatch, CrsMismatchPolicy::Fail);
        assert_eq!(config.key_tolerance, 0.01);
    }

    #[test]
    fn parses_full_document() {
        let config = PipelineConfig::from_json_str(
            r#"{
                "on_crs_mismatch": "reproject",
                "target_resolution": 30.0,
                "max_distance": 5000,
                "all_touched": true,
                "pixel_anchor": "center",
                "inputs": { "dtm": "dtm.tif", "floods": "floods.geojson" },
                "output": "out.csv"
            }"#,
        )
        .unwrap();
        assert_eq!(config.on_crs_mismatch, CrsMismatchPolicy::Reproject);
        assert_eq!(config.pixel_anchor, PixelAnchor::Center);
        assert_eq!(config.inputs.dtm, Some(PathBuf::from("dtm.tif")));
        assert!(config.inputs.river.is_none());
        assert!(config.proximity_params().rasterize.all_touched);
        assert_eq!(config.reconcile_params().kind_b, SampleKind::Categorical);
    }

    #[test]
    fn rejects_unknown_fields_and_bad_values() {
        assert!(PipelineConfig::from_json_str(r#"{"resolution": 30}"#).is_err());
        assert!(PipelineConfig::from_json_str(r#"{"target_resolution": -1}"#).is_err());
        assert!(PipelineConfig::from_json_str(r#"{"key_tolerance": 0.5}"#).is_err());
        assert!(PipelineConfig::from_json_str(r#"{"on_crs_mismatch": "ignore"}"#).is_err());
    }

    #[test]
    fn roundtrip_through_file() {
        let config = PipelineConfig {
            target_resolution: Some(12.5),
            ..Default::default()
        };
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_json_string().unwrap().as_bytes()).unwrap();
        assert_eq!(PipelineConfig::from_path(file.path()).unwrap(), config);
    }
}

//! # floodfuse algorithms
//!
//! Stages of the flood feature pipeline.
//!
//! ## Modules
//!
//! - **reproject**: coordinate transforms, warping and resampling
//! - **reconcile**: bring two rasters onto one congruent grid
//! - **rasterize**: burn vector layers into presence grids
//! - **proximity**: exact Euclidean distance fields
//! - **tabular**: raster to coordinate-keyed records
//! - **fusion**: outer join of record sets with null policies
//! - **config**: JSON pipeline configuration
//! - **pipeline**: the full flood run over files or loaded inputs

pub mod config;
pub mod fusion;
pub(crate) mod maybe_rayon;
pub mod pipeline;
pub mod proximity;
pub mod rasterize;
pub mod reconcile;
pub mod reproject;
pub mod tabular;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::{InputPaths, PipelineConfig};
    pub use crate::fusion::{
        flood_layer_specs, fuse, fuse_flood_layers, fuse_with_summary, FeatureRow, FeatureTable,
        FloodLayers, FusionParams, FusionSummary, LayerSpec, NullPolicy,
    };
    pub use crate::pipeline::{FloodInputs, FloodPipeline, FloodVectors, PipelineOutput};
    pub use crate::proximity::{distance_field, proximity, Proximity, ProximityParams, PROXIMITY_NODATA};
    pub use crate::rasterize::{rasterize, rasterize_with_transform, PixelSize, RasterizeParams};
    pub use crate::reconcile::{reconcile, CrsMismatchPolicy, Reconcile, ReconcileParams, SampleKind};
    pub use crate::reproject::{
        reproject, warp, CoordinateTransform, Identity, ProjTransform, ResampleMethod, WarpParams,
        WarpTarget,
    };
    pub use crate::tabular::{tabularize, PixelAnchor, Record, RecordSet, Tabularize, TabularizeParams};
    pub use floodfuse_core::prelude::*;
}

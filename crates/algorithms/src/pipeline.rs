//! End-to-end flood feature run
//!
//! Load → reconcile DTM and land cover → rasterize flood points and basin →
//! distance to river and tributaries → tabularize → fuse.
//!
//! The run assumes the caller holds a [`floodfuse_core::runtime::GisRuntime`]
//! for its whole duration. With a [`ScratchSpace`], every intermediate grid
//! is written there and read back by the next stage.

use std::path::PathBuf;

use floodfuse_core::io::{load_raster, load_vector, IoElement, ScratchSpace};
use floodfuse_core::{Error, Raster, Result, VectorLayer};
use tracing::{debug, info};

use crate::config::{InputPaths, PipelineConfig};
use crate::fusion::{fuse_flood_layers, FeatureTable, FloodLayers, FusionSummary};
use crate::proximity::proximity;
use crate::rasterize::rasterize;
use crate::reconcile::reconcile;
use crate::reproject::WarpTarget;
use crate::tabular::tabularize;

/// Resolved source files of one run
#[derive(Debug, Clone, PartialEq)]
pub struct FloodInputs {
    pub dtm: PathBuf,
    pub lulc: PathBuf,
    pub floods: PathBuf,
    pub river: PathBuf,
    pub tributaries: PathBuf,
    pub basin: PathBuf,
}

impl FloodInputs {
    /// Require every path of `paths`
    pub fn from_paths(paths: &InputPaths) -> Result<Self> {
        fn required(path: &Option<PathBuf>, name: &'static str) -> Result<PathBuf> {
            path.clone().ok_or(Error::InvalidParameter {
                name,
                value: "null".into(),
                reason: "input path is required".into(),
            })
        }
        Ok(Self {
            dtm: required(&paths.dtm, "inputs.dtm")?,
            lulc: required(&paths.lulc, "inputs.lulc")?,
            floods: required(&paths.floods, "inputs.floods")?,
            river: required(&paths.river, "inputs.river")?,
            tributaries: required(&paths.tributaries, "inputs.tributaries")?,
            basin: required(&paths.basin, "inputs.basin")?,
        })
    }
}

/// Loaded vector layers of one run
#[derive(Debug, Clone)]
pub struct FloodVectors {
    pub floods: VectorLayer,
    pub river: VectorLayer,
    pub tributaries: VectorLayer,
    pub basin: VectorLayer,
}

/// Result of a run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub table: FeatureTable,
    pub summary: FusionSummary,
    /// Grid every layer was brought onto
    pub grid: WarpTarget,
}

pub struct FloodPipeline<'a> {
    config: &'a PipelineConfig,
    scratch: Option<&'a ScratchSpace>,
}

impl<'a> FloodPipeline<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self {
            config,
            scratch: None,
        }
    }

    /// Hand intermediate grids between stages through `scratch`
    pub fn with_scratch(mut self, scratch: &'a ScratchSpace) -> Self {
        self.scratch = Some(scratch);
        self
    }

    /// Load the configured inputs and run every stage
    pub fn run(&self) -> Result<PipelineOutput> {
        let inputs = FloodInputs::from_paths(&self.config.inputs)?;
        self.run_files(&inputs)
    }

    pub fn run_files(&self, inputs: &FloodInputs) -> Result<PipelineOutput> {
        let dtm: Raster<f64> = load_raster(&inputs.dtm)?;
        let lulc: Raster<f64> = load_raster(&inputs.lulc)?;
        let vectors = FloodVectors {
            floods: load_vector(&inputs.floods)?,
            river: load_vector(&inputs.river)?,
            tributaries: load_vector(&inputs.tributaries)?,
            basin: load_vector(&inputs.basin)?,
        };
        self.run_loaded(&dtm, &lulc, &vectors)
    }

    /// Run every stage on already loaded inputs
    pub fn run_loaded(
        &self,
        dtm: &Raster<f64>,
        lulc: &Raster<f64>,
        vectors: &FloodVectors,
    ) -> Result<PipelineOutput> {
        let config = self.config;

        let (dtm, lulc) = reconcile(dtm, lulc, &config.reconcile_params())?;
        let dtm = self.handoff("dtm_aligned", dtm)?;
        let lulc = self.handoff("lulc_aligned", lulc)?;

        let resolution = dtm.resolution();
        let rasterize_params = config.rasterize_params();
        let proximity_params = config.proximity_params();
        debug!("Feature layers at resolution {:?}", resolution);

        let flood = rasterize(&vectors.floods, &dtm, resolution, &rasterize_params)?;
        let flood = self.handoff("flood_raster", flood)?;
        let basin = rasterize(&vectors.basin, &dtm, resolution, &rasterize_params)?;
        let basin = self.handoff("basin_raster", basin)?;
        let river = proximity(&vectors.river, &dtm, resolution, &proximity_params)?;
        let river = self.handoff("river_distance", river)?;
        let tributaries = proximity(&vectors.tributaries, &dtm, resolution, &proximity_params)?;
        let tributaries = self.handoff("tributaries_distance", tributaries)?;

        let tab = config.tabularize_params();
        let terrain_set = tabularize(&dtm, &tab);
        let landcover_set = tabularize(&lulc, &tab);
        let flood_set = tabularize(&flood, &tab);
        let river_set = tabularize(&river, &tab);
        let tributaries_set = tabularize(&tributaries, &tab);
        let basin_set = tabularize(&basin, &tab);

        let (table, summary) = fuse_flood_layers(
            FloodLayers {
                terrain: &terrain_set,
                landcover: &landcover_set,
                flood: &flood_set,
                river: &river_set,
                tributaries: &tributaries_set,
                basin: &basin_set,
            },
            &config.fusion_params(),
        )?;

        info!(
            "Pipeline finished: {} rows x {} columns",
            table.len(),
            table.columns().len()
        );

        Ok(PipelineOutput {
            table,
            summary,
            grid: WarpTarget::of(&dtm),
        })
    }

    fn handoff<T: IoElement>(&self, name: &str, raster: Raster<T>) -> Result<Raster<T>> {
        match self.scratch {
            Some(scratch) => {
                scratch.store(name, &raster)?;
                drop(raster);
                scratch.load(name)
            }
            None => Ok(raster),
        }
    }
}

//! floodfuse CLI - flood risk feature tables from terrain, land cover and hydrography

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use floodfuse_algorithms::config::PipelineConfig;
use floodfuse_algorithms::fusion::FeatureTable;
use floodfuse_algorithms::pipeline::FloodPipeline;
use floodfuse_algorithms::proximity::{proximity, ProximityParams};
use floodfuse_algorithms::rasterize::{rasterize, PixelSize, RasterizeParams};
use floodfuse_algorithms::reconcile::{reconcile, CrsMismatchPolicy, ReconcileParams, SampleKind};
use floodfuse_algorithms::tabular::{tabularize, PixelAnchor, TabularizeParams};
use floodfuse_core::io::{load_raster, load_vector, save_raster, IoElement, ScratchSpace};
use floodfuse_core::runtime::GisRuntime;
use floodfuse_core::{Raster, VectorLayer};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "floodfuse")]
#[command(author, version, about = "Flood risk feature tables from geospatial layers", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Bring two rasters onto one congruent grid
    Reconcile {
        /// First raster (kept when it is the finer grid)
        a: PathBuf,
        /// Second raster
        b: PathBuf,
        /// Output for the first raster
        output_a: PathBuf,
        /// Output for the second raster
        output_b: PathBuf,
        /// Common pixel size in CRS units
        #[arg(short, long)]
        resolution: Option<f64>,
        /// Reproject the second raster instead of failing on a CRS mismatch
        #[arg(long)]
        reproject: bool,
        /// Sampling of the first raster: continuous, categorical
        #[arg(long, default_value = "continuous")]
        kind_a: String,
        /// Sampling of the second raster: continuous, categorical
        #[arg(long, default_value = "categorical")]
        kind_b: String,
    },
    /// Burn a vector layer into a presence grid
    Rasterize {
        /// Input vector layer
        input: PathBuf,
        /// Reference raster giving extent and CRS
        reference: PathBuf,
        /// Output file
        output: PathBuf,
        /// Square pixel size; defaults to the reference pixel size
        #[arg(short, long)]
        resolution: Option<f64>,
        /// Burn every pixel a geometry touches
        #[arg(short, long)]
        all_touched: bool,
    },
    /// Euclidean distance to the features of a vector layer
    Proximity {
        /// Input vector layer
        input: PathBuf,
        /// Reference raster giving extent and CRS
        reference: PathBuf,
        /// Output file
        output: PathBuf,
        /// Square pixel size; defaults to the reference pixel size
        #[arg(short, long)]
        resolution: Option<f64>,
        /// Distances beyond this become nodata
        #[arg(short, long)]
        max_distance: Option<f64>,
    },
    /// Write a raster as x,y,value rows
    Tabularize {
        /// Input raster file
        input: PathBuf,
        /// Output CSV file
        output: PathBuf,
        /// Coordinate of each row: upper-left, center
        #[arg(long, default_value = "upper-left")]
        anchor: String,
    },
    /// Run the full flood feature pipeline
    Run {
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[command(flatten)]
        overrides: RunOverrides,
    },
    /// Print the default configuration as JSON
    Config,
}

/// Flags that override the configuration file
#[derive(Args, Debug, Default)]
struct RunOverrides {
    /// Digital terrain model raster
    #[arg(long)]
    dtm: Option<PathBuf>,
    /// Land use / land cover raster
    #[arg(long)]
    lulc: Option<PathBuf>,
    /// Flood occurrence points
    #[arg(long)]
    floods: Option<PathBuf>,
    /// Main river lines
    #[arg(long)]
    river: Option<PathBuf>,
    /// Tributary lines
    #[arg(long)]
    tributaries: Option<PathBuf>,
    /// Basin polygons
    #[arg(long)]
    basin: Option<PathBuf>,
    /// Output CSV file
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Common pixel size in CRS units
    #[arg(short, long)]
    resolution: Option<f64>,
    /// Distances beyond this become nodata
    #[arg(short, long)]
    max_distance: Option<f64>,
    /// Burn every pixel a geometry touches
    #[arg(short, long)]
    all_touched: bool,
    /// Reproject land cover instead of failing on a CRS mismatch
    #[arg(long)]
    reproject: bool,
    /// Coordinate of each row: upper-left, center
    #[arg(long)]
    anchor: Option<String>,
    /// Join key snap distance in pixels
    #[arg(long)]
    key_tolerance: Option<f64>,
}

impl RunOverrides {
    fn apply(self, config: &mut PipelineConfig) -> Result<()> {
        let inputs = &mut config.inputs;
        for (slot, value) in [
            (&mut inputs.dtm, self.dtm),
            (&mut inputs.lulc, self.lulc),
            (&mut inputs.floods, self.floods),
            (&mut inputs.river, self.river),
            (&mut inputs.tributaries, self.tributaries),
            (&mut inputs.basin, self.basin),
        ] {
            if value.is_some() {
                *slot = value;
            }
        }
        if self.output.is_some() {
            config.output = self.output;
        }
        if self.resolution.is_some() {
            config.target_resolution = self.resolution;
        }
        if self.max_distance.is_some() {
            config.max_distance = self.max_distance;
        }
        if self.all_touched {
            config.all_touched = true;
        }
        if self.reproject {
            config.on_crs_mismatch = CrsMismatchPolicy::Reproject;
        }
        if let Some(anchor) = self.anchor {
            config.pixel_anchor = parse_anchor(&anchor)?;
        }
        if let Some(tolerance) = self.key_tolerance {
            config.key_tolerance = tolerance;
        }
        Ok(())
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn read_raster(path: &Path) -> Result<Raster<f64>> {
    let pb = spinner("Reading raster...");
    let raster = load_raster(path);
    pb.finish_and_clear();
    let raster: Raster<f64> = raster.context("Failed to read raster")?;
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn read_vector(path: &Path) -> Result<VectorLayer> {
    let pb = spinner("Reading vector layer...");
    let layer = load_vector(path);
    pb.finish_and_clear();
    layer.context("Failed to read vector layer")
}

fn write_result<T: IoElement>(raster: &Raster<T>, path: &Path) -> Result<()> {
    let pb = spinner("Writing output...");
    let written = save_raster(raster, path);
    pb.finish_and_clear();
    written.with_context(|| format!("Failed to write {}", path.display()))
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

fn parse_anchor(s: &str) -> Result<PixelAnchor> {
    match s.to_lowercase().as_str() {
        "upper-left" | "upper_left" | "ul" => Ok(PixelAnchor::UpperLeft),
        "center" | "centre" | "c" => Ok(PixelAnchor::Center),
        _ => anyhow::bail!("Unknown anchor: {}. Use upper-left or center.", s),
    }
}

fn parse_kind(s: &str) -> Result<SampleKind> {
    match s.to_lowercase().as_str() {
        "continuous" | "cont" => Ok(SampleKind::Continuous),
        "categorical" | "cat" => Ok(SampleKind::Categorical),
        _ => anyhow::bail!("Unknown sampling: {}. Use continuous or categorical.", s),
    }
}

fn format_value(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Write CSV rows to `path` through a `.tmp` sibling renamed into place
fn write_csv_atomic<F>(path: &Path, fill: F) -> Result<()>
where
    F: FnOnce(&mut csv::Writer<File>) -> Result<()>,
{
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let written = (|| -> Result<()> {
        let mut writer = csv::Writer::from_path(&tmp)
            .with_context(|| format!("Failed to create {}", tmp.display()))?;
        fill(&mut writer)?;
        writer.flush().context("Failed to flush CSV")?;
        Ok(())
    })();

    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} to {}", tmp.display(), path.display()))
}

/// Persist a fused table as `x,y,<columns...>`; missing values are empty
fn write_feature_table_csv(table: &FeatureTable, path: &Path) -> Result<()> {
    write_csv_atomic(path, |writer| {
        let mut header = vec!["x".to_string(), "y".to_string()];
        header.extend(table.columns().iter().cloned());
        writer.write_record(&header)?;

        for row in table.rows() {
            let mut record = vec![row.x.to_string(), row.y.to_string()];
            record.extend(row.values.iter().copied().map(format_value));
            writer.write_record(&record)?;
        }
        Ok(())
    })
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_path(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let _runtime = match cli.command {
        Commands::Config => None,
        _ => Some(GisRuntime::acquire().context("Failed to start GIS runtime")?),
    };

    match cli.command {
        // ── Info ─────────────────────────────────────────────────────
        Commands::Info { input } => {
            let raster = read_raster(&input)?;
            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();
            let stats = raster.statistics();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Cell size: {}", raster.cell_size());
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            match raster.crs() {
                Some(crs) => println!("CRS: {}", crs),
                None => println!("CRS: unset"),
            }
            if let Some(nodata) = raster.nodata() {
                println!("NoData: {}", nodata);
            }
            println!("\nStatistics:");
            if let Some(min) = stats.min {
                println!("  Min: {:.4}", min);
            }
            if let Some(max) = stats.max {
                println!("  Max: {:.4}", max);
            }
            if let Some(mean) = stats.mean {
                println!("  Mean: {:.4}", mean);
            }
            println!(
                "  Valid cells: {} ({:.1}%)",
                stats.valid_count,
                100.0 * stats.valid_count as f64 / raster.len() as f64
            );
        }

        // ── Reconcile ────────────────────────────────────────────────
        Commands::Reconcile {
            a,
            b,
            output_a,
            output_b,
            resolution,
            reproject,
            kind_a,
            kind_b,
        } => {
            let params = ReconcileParams {
                target_resolution: resolution,
                on_crs_mismatch: if reproject {
                    CrsMismatchPolicy::Reproject
                } else {
                    CrsMismatchPolicy::Fail
                },
                kind_a: parse_kind(&kind_a)?,
                kind_b: parse_kind(&kind_b)?,
            };
            let ra = read_raster(&a)?;
            let rb = read_raster(&b)?;
            let start = Instant::now();
            let (ra, rb) = reconcile(&ra, &rb, &params).context("Failed to reconcile rasters")?;
            let elapsed = start.elapsed();
            write_result(&ra, &output_a)?;
            write_result(&rb, &output_b)?;
            done("Reconciled A", &output_a, elapsed);
            done("Reconciled B", &output_b, elapsed);
        }

        // ── Rasterize ────────────────────────────────────────────────
        Commands::Rasterize {
            input,
            reference,
            output,
            resolution,
            all_touched,
        } => {
            let layer = read_vector(&input)?;
            let reference = read_raster(&reference)?;
            let resolution: PixelSize = match resolution {
                Some(size) => size.into(),
                None => reference.resolution().into(),
            };
            let params = RasterizeParams {
                all_touched,
                ..Default::default()
            };
            let start = Instant::now();
            let result = rasterize(&layer, &reference, resolution, &params)
                .context("Failed to rasterize layer")?;
            let elapsed = start.elapsed();
            write_result(&result, &output)?;
            done("Presence grid", &output, elapsed);
        }

        // ── Proximity ────────────────────────────────────────────────
        Commands::Proximity {
            input,
            reference,
            output,
            resolution,
            max_distance,
        } => {
            let layer = read_vector(&input)?;
            let reference = read_raster(&reference)?;
            let resolution: PixelSize = match resolution {
                Some(size) => size.into(),
                None => reference.resolution().into(),
            };
            let params = ProximityParams {
                max_distance,
                ..Default::default()
            };
            let start = Instant::now();
            let result = proximity(&layer, &reference, resolution, &params)
                .context("Failed to compute proximity")?;
            let elapsed = start.elapsed();
            write_result(&result, &output)?;
            done("Distance grid", &output, elapsed);
        }

        // ── Tabularize ───────────────────────────────────────────────
        Commands::Tabularize {
            input,
            output,
            anchor,
        } => {
            let params = TabularizeParams {
                anchor: parse_anchor(&anchor)?,
            };
            let raster = read_raster(&input)?;
            let start = Instant::now();
            let records = tabularize(&raster, &params);
            let elapsed = start.elapsed();
            write_csv_atomic(&output, |writer| {
                writer.write_record(["x", "y", "value"])?;
                for record in &records {
                    writer.write_record([
                        record.x.to_string(),
                        record.y.to_string(),
                        format_value(record.value),
                    ])?;
                }
                Ok(())
            })?;
            println!("  Records: {} ({} missing)", records.len(), records.missing_count());
            done("Records", &output, elapsed);
        }

        // ── Run ──────────────────────────────────────────────────────
        Commands::Run { config, overrides } => {
            let mut config = load_config(config.as_deref())?;
            overrides.apply(&mut config)?;
            config.validate().context("Invalid configuration")?;
            let output = config
                .output
                .clone()
                .context("No output path: pass --output or set \"output\" in the config")?;

            let scratch = ScratchSpace::new().context("Failed to create scratch space")?;
            let pb = spinner("Running flood pipeline...");
            let start = Instant::now();
            let result = FloodPipeline::new(&config).with_scratch(&scratch).run();
            pb.finish_and_clear();
            let result = result.context("Pipeline failed")?;
            let elapsed = start.elapsed();

            let summary = &result.summary;
            if summary.integrity_warnings() > 0 {
                warn!(
                    "{} layer(s) were not congruent with the terrain grid: {}",
                    summary.integrity_warnings(),
                    summary.incongruent_layers.join(", ")
                );
            }

            write_feature_table_csv(&result.table, &output)?;
            scratch.close().context("Failed to remove scratch space")?;

            println!(
                "  Rows: {} of {} keys ({} dropped)",
                result.table.len(),
                summary.keys,
                summary.rows_dropped
            );
            for (column, filled) in &summary.filled {
                println!("  Filled {}: {}", column, filled);
            }
            done("Feature table", &output, elapsed);
        }

        // ── Config ───────────────────────────────────────────────────
        Commands::Config => {
            println!("{}", PipelineConfig::default().to_json_string()?);
        }
    }

    Ok(())
}

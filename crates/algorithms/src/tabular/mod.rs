//! Raster → coordinate-keyed records
//!
//! Every pixel becomes one [`Record`] keyed by a map coordinate; nodata
//! becomes `None`.

use crate::maybe_rayon::*;
use floodfuse_core::{Algorithm, Error, GeoTransform, Raster, RasterElement, Result, CRS};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Which point of a pixel its record is keyed by
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelAnchor {
    /// `origin + index * pixel_size`
    #[default]
    UpperLeft,
    /// Half a pixel further along both axes
    Center,
}

impl PixelAnchor {
    /// Fractional offset added to the pixel index
    pub fn offset(self) -> f64 {
        match self {
            PixelAnchor::UpperLeft => 0.0,
            PixelAnchor::Center => 0.5,
        }
    }
}

/// Parameters for [`tabularize`]
#[derive(Debug, Clone, Copy, Default)]
pub struct TabularizeParams {
    pub anchor: PixelAnchor,
}

/// One pixel as a coordinate-keyed value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub x: f64,
    pub y: f64,
    pub value: Option<f64>,
}

/// Records of one grid in scan order, with the grid they came from
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSet {
    records: Vec<Record>,
    transform: GeoTransform,
    crs: Option<CRS>,
    anchor: PixelAnchor,
}

impl RecordSet {
    /// Assemble a record set from records keyed on `transform`'s grid
    pub fn from_records(
        records: Vec<Record>,
        transform: GeoTransform,
        crs: Option<CRS>,
        anchor: PixelAnchor,
    ) -> Self {
        Self {
            records,
            transform,
            crs,
            anchor,
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Geotransform of the source grid
    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    pub fn anchor(&self) -> PixelAnchor {
        self.anchor
    }

    /// Number of records without a value
    pub fn missing_count(&self) -> usize {
        self.records.iter().filter(|r| r.value.is_none()).count()
    }

    /// Same CRS and the same pixel lattice as `other`
    pub fn is_congruent_with(&self, other: &RecordSet) -> bool {
        let same_crs = match (self.crs(), other.crs()) {
            (Some(a), Some(b)) => a.is_equivalent(b),
            (None, None) => true,
            _ => false,
        };
        same_crs && self.transform.is_aligned_with(&other.transform)
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Tabularize algorithm
#[derive(Debug, Clone, Default)]
pub struct Tabularize;

impl Algorithm for Tabularize {
    type Input = Raster<f64>;
    type Output = RecordSet;
    type Params = TabularizeParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Tabularize"
    }

    fn description(&self) -> &'static str {
        "Convert a raster into one (x, y, value) record per pixel"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        Ok(tabularize(&input, &params))
    }
}

/// One record per pixel, in row-major scan order.
///
/// The record count is always `rows × cols`. Values matching the grid's
/// nodata (within tolerance) and NaN become `None`; a grid without nodata
/// keeps every finite value, zero included.
pub fn tabularize<T: RasterElement>(raster: &Raster<T>, params: &TabularizeParams) -> RecordSet {
    let (rows, cols) = raster.shape();
    let transform = *raster.transform();
    let offset = params.anchor.offset();

    let records: Vec<Record> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut out = Vec::with_capacity(cols);
            for col in 0..cols {
                // SAFETY: row < rows, col < cols
                let v = unsafe { raster.get_unchecked(row, col) };
                let value = if raster.is_nodata(v) {
                    None
                } else {
                    v.to_f64().filter(|f| !f.is_nan())
                };
                let (x, y) = transform.fractional_to_geo(col as f64 + offset, row as f64 + offset);
                out.push(Record { x, y, value });
            }
            out
        })
        .collect();

    debug!(
        "Tabularized {}x{} grid into {} records",
        rows,
        cols,
        records.len()
    );

    RecordSet {
        records,
        transform,
        crs: raster.crs().cloned(),
        anchor: params.anchor,
    }
}

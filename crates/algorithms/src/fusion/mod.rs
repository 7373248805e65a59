//! Feature fusion: outer join of record sets on their coordinate key
//!
//! The join is a left fold over an ordered list of `(LayerSpec, RecordSet)`
//! pairs. Each step adds one column and keeps every key seen so far, so the
//! result holds every coordinate present in any input. Null policies are
//! applied once, after the fold.
//!
//! Coordinates are matched on the pixel lattice of the first layer rather
//! than by float equality: a record within `key_tolerance` pixels of a
//! lattice node joins on that node.

mod table;

pub use table::{FeatureRow, FeatureTable};

use crate::tabular::{PixelAnchor, RecordSet};
use floodfuse_core::{Error, GeoTransform, Result};
use std::collections::HashMap;
use tracing::{debug, info, warn};

pub const DTM_VALUE: &str = "dtm_value";
pub const LULC_CODE: &str = "lulc_code";
pub const FLOOD_BINARY: &str = "flood_binary";
pub const DIST_TO_RIVER: &str = "dist_to_river";
pub const DIST_TO_TRIBUTARIES: &str = "dist_to_tributaries";
pub const IS_BASIN: &str = "is_basin";

/// What happens to a missing value after the join
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NullPolicy {
    /// Missing means "absent": replace with the value
    Fill(f64),
    /// Missing means the row is unusable: drop it
    Require,
    /// Missing is informative: keep `None`
    Keep,
}

/// Output column of one input layer
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSpec {
    pub column: String,
    pub policy: NullPolicy,
}

impl LayerSpec {
    pub fn new(column: impl Into<String>, policy: NullPolicy) -> Self {
        Self {
            column: column.into(),
            policy,
        }
    }
}

/// Parameters for [`fuse`]
#[derive(Debug, Clone, Copy)]
pub struct FusionParams {
    /// Snap distance to the key lattice, in pixels
    pub key_tolerance: f64,
}

impl Default for FusionParams {
    fn default() -> Self {
        Self {
            key_tolerance: 0.01,
        }
    }
}

/// Join key of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKey {
    /// Lattice node `(col, row)` of the first layer's grid
    Grid(i64, i64),
    /// Off-lattice coordinate, matched on its exact bit pattern
    Exact(u64, u64),
}

/// Lattice on which keys are snapped
#[derive(Debug, Clone, Copy)]
struct KeyGrid {
    transform: GeoTransform,
    anchor: PixelAnchor,
    tolerance: f64,
}

impl KeyGrid {
    fn key(&self, x: f64, y: f64) -> JoinKey {
        let (fc, fr) = self.transform.geo_to_pixel(x, y);
        let fc = fc - self.anchor.offset();
        let fr = fr - self.anchor.offset();
        let (c, r) = (fc.round(), fr.round());
        if fc.is_finite()
            && fr.is_finite()
            && (fc - c).abs() <= self.tolerance
            && (fr - r).abs() <= self.tolerance
        {
            JoinKey::Grid(c as i64, r as i64)
        } else {
            JoinKey::Exact(x.to_bits(), y.to_bits())
        }
    }
}

/// Counters describing one fusion
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FusionSummary {
    /// Distinct keys across all inputs
    pub keys: usize,
    /// Rows removed by `Require` columns
    pub rows_dropped: usize,
    /// Values filled per `Fill` column
    pub filled: Vec<(String, usize)>,
    /// Columns whose input was not congruent with the first layer
    pub incongruent_layers: Vec<String>,
    /// Records whose key repeated an earlier record of the same layer
    pub duplicate_keys: usize,
}

impl FusionSummary {
    /// Number of integrity warnings raised
    pub fn integrity_warnings(&self) -> usize {
        self.incongruent_layers.len()
    }
}

/// Fold state: rows in first-seen key order, plus the key index
struct JoinState {
    width: usize,
    index: HashMap<JoinKey, usize>,
    rows: Vec<FeatureRow>,
    duplicates: usize,
}

impl JoinState {
    fn new(width: usize) -> Self {
        Self {
            width,
            index: HashMap::new(),
            rows: Vec::new(),
            duplicates: 0,
        }
    }

    /// Outer-join one layer as column `column`
    fn join(mut self, column: usize, set: &RecordSet, grid: &KeyGrid) -> Self {
        let mut seen = std::collections::HashSet::with_capacity(set.len());
        for record in set {
            let key = grid.key(record.x, record.y);
            if !seen.insert(key) {
                self.duplicates += 1;
            }
            let idx = match self.index.get(&key) {
                Some(&idx) => idx,
                None => {
                    self.rows.push(FeatureRow {
                        x: record.x,
                        y: record.y,
                        values: vec![None; self.width],
                    });
                    self.index.insert(key, self.rows.len() - 1);
                    self.rows.len() - 1
                }
            };
            self.rows[idx].values[column] = record.value;
        }
        self
    }
}

fn validate(layers: &[(LayerSpec, &RecordSet)], params: &FusionParams) -> Result<()> {
    if layers.is_empty() {
        return Err(Error::InvalidParameter {
            name: "layers",
            value: "[]".into(),
            reason: "at least one layer is required".into(),
        });
    }
    if !params.key_tolerance.is_finite() || !(0.0..0.5).contains(&params.key_tolerance) {
        return Err(Error::InvalidParameter {
            name: "key_tolerance",
            value: params.key_tolerance.to_string(),
            reason: "must be in [0, 0.5) pixels".into(),
        });
    }

    let mut names = std::collections::HashSet::new();
    for (spec, _) in layers {
        if !names.insert(spec.column.as_str()) {
            return Err(Error::InvalidParameter {
                name: "column",
                value: spec.column.clone(),
                reason: "duplicate column name".into(),
            });
        }
    }

    let anchor = layers[0].1.anchor();
    if let Some((spec, _)) = layers.iter().find(|(_, set)| set.anchor() != anchor) {
        return Err(Error::InvalidParameter {
            name: "anchor",
            value: spec.column.clone(),
            reason: format!("record set anchor differs from the first layer ({:?})", anchor),
        });
    }
    Ok(())
}

/// Outer-join `layers` on their coordinate key.
///
/// # Errors
/// [`Error::InvalidParameter`] when `layers` is empty, a column name
/// repeats, the record sets use different pixel anchors, or the key
/// tolerance is outside `[0, 0.5)`.
pub fn fuse(layers: &[(LayerSpec, &RecordSet)], params: &FusionParams) -> Result<FeatureTable> {
    fuse_with_summary(layers, params).map(|(table, _)| table)
}

/// [`fuse`], also returning the join counters
pub fn fuse_with_summary(
    layers: &[(LayerSpec, &RecordSet)],
    params: &FusionParams,
) -> Result<(FeatureTable, FusionSummary)> {
    validate(layers, params)?;

    let first = layers[0].1;
    let grid = KeyGrid {
        transform: *first.transform(),
        anchor: first.anchor(),
        tolerance: params.key_tolerance,
    };

    let mut summary = FusionSummary::default();
    for (spec, set) in &layers[1..] {
        if !set.is_congruent_with(first) {
            warn!(
                target: "floodfuse::integrity",
                "Layer '{}' is not congruent with '{}'; joining on snapped coordinates",
                spec.column,
                layers[0].0.column
            );
            summary.incongruent_layers.push(spec.column.clone());
        }
    }

    let state = layers
        .iter()
        .enumerate()
        .fold(JoinState::new(layers.len()), |state, (column, (spec, set))| {
            debug!("Joining '{}' ({} records)", spec.column, set.len());
            state.join(column, set, &grid)
        });

    summary.keys = state.rows.len();
    summary.duplicate_keys = state.duplicates;
    if state.duplicates > 0 {
        warn!(
            target: "floodfuse::integrity",
            "{} records shared a key with an earlier record of the same layer",
            state.duplicates
        );
    }

    let mut filled = vec![0usize; layers.len()];
    let rows: Vec<FeatureRow> = state
        .rows
        .into_iter()
        .filter_map(|mut row| {
            for (j, (spec, _)) in layers.iter().enumerate() {
                match (spec.policy, row.values[j]) {
                    (NullPolicy::Fill(v), None) => {
                        row.values[j] = Some(v);
                        filled[j] += 1;
                    }
                    (NullPolicy::Require, None) => return None,
                    _ => {}
                }
            }
            Some(row)
        })
        .collect();

    summary.rows_dropped = summary.keys - rows.len();
    summary.filled = layers
        .iter()
        .zip(filled)
        .filter(|((spec, _), _)| matches!(spec.policy, NullPolicy::Fill(_)))
        .map(|((spec, _), n)| (spec.column.clone(), n))
        .collect();

    let columns = layers.iter().map(|(spec, _)| spec.column.clone()).collect();
    let table = FeatureTable::new(columns, rows);

    info!(
        "Fused {} layers: {} keys, {} rows kept, {} dropped",
        layers.len(),
        summary.keys,
        table.len(),
        summary.rows_dropped
    );
    Ok((table, summary))
}

/// Column names and null policies of the flood feature table, in order
pub fn flood_layer_specs() -> [LayerSpec; 6] {
    [
        LayerSpec::new(DTM_VALUE, NullPolicy::Require),
        LayerSpec::new(LULC_CODE, NullPolicy::Require),
        LayerSpec::new(FLOOD_BINARY, NullPolicy::Fill(0.0)),
        LayerSpec::new(DIST_TO_RIVER, NullPolicy::Keep),
        LayerSpec::new(DIST_TO_TRIBUTARIES, NullPolicy::Keep),
        LayerSpec::new(IS_BASIN, NullPolicy::Fill(0.0)),
    ]
}

/// The six flood layers of one pipeline run
#[derive(Debug, Clone, Copy)]
pub struct FloodLayers<'a> {
    pub terrain: &'a RecordSet,
    pub landcover: &'a RecordSet,
    pub flood: &'a RecordSet,
    pub river: &'a RecordSet,
    pub tributaries: &'a RecordSet,
    pub basin: &'a RecordSet,
}

/// Fuse the six flood layers with their fixed column names and policies
pub fn fuse_flood_layers(
    layers: FloodLayers<'_>,
    params: &FusionParams,
) -> Result<(FeatureTable, FusionSummary)> {
    let [dtm, lulc, flood, river, tributaries, basin] = flood_layer_specs();
    let inputs = [
        (dtm, layers.terrain),
        (lulc, layers.landcover),
        (flood, layers.flood),
        (river, layers.river),
        (tributaries, layers.tributaries),
        (basin, layers.basin),
    ];
    fuse_with_summary(&inputs, params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tabular::{tabularize, Record, TabularizeParams};
    use floodfuse_core::{Raster, CRS};

    fn grid(values: Vec<f64>, rows: usize, cols: usize) -> Raster<f64> {
        let mut r = Raster::from_vec(values, rows, cols).unwrap();
        r.set_transform(GeoTransform::new(1000.0, 2000.0, 10.0, -10.0));
        r.set_crs(Some(CRS::from_epsg(31983)));
        r.set_nodata(Some(-9999.0));
        r
    }

    fn set(values: Vec<f64>, rows: usize, cols: usize) -> RecordSet {
        tabularize(&grid(values, rows, cols), &TabularizeParams::default())
    }

    #[test]
    fn two_layer_outer_join() {
        let a = set(vec![1.0, 2.0, 3.0, 4.0], 2, 2);
        let b = set(vec![10.0, -9999.0, 30.0, 40.0], 2, 2);
        let table = fuse(
            &[
                (LayerSpec::new("a", NullPolicy::Keep), &a),
                (LayerSpec::new("b", NullPolicy::Keep), &b),
            ],
            &FusionParams::default(),
        )
        .unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.columns(), &["a".to_string(), "b".to_string()]);
        assert_eq!(table.rows()[1].values, vec![Some(2.0), None]);
        assert_eq!(table.get(0, "b"), Some(10.0));
    }

    #[test]
    fn fill_and_require_policies() {
        let a = set(vec![1.0, -9999.0, 3.0, 4.0], 2, 2);
        let b = set(vec![-9999.0, 1.0, -9999.0, 1.0], 2, 2);
        let (table, summary) = fuse_with_summary(
            &[
                (LayerSpec::new("a", NullPolicy::Require), &a),
                (LayerSpec::new("b", NullPolicy::Fill(0.0)), &b),
            ],
            &FusionParams::default(),
        )
        .unwrap();
        assert_eq!(table.len(), 3);
        assert!(table.column("b").unwrap().all(|v| v.is_some()));
        assert_eq!(summary.rows_dropped, 1);
        assert_eq!(summary.filled, vec![("b".to_string(), 2)]);
    }

    #[test]
    fn keys_snap_across_float_noise() {
        let a = set(vec![1.0, 2.0], 1, 2);
        let transform = *a.transform();
        let b = RecordSet::from_records(
            vec![
                Record { x: 1000.0 + 1e-9, y: 2000.0, value: Some(5.0) },
                Record { x: 1010.0 - 1e-7, y: 2000.0 + 1e-8, value: Some(6.0) },
            ],
            transform,
            a.crs().cloned(),
            PixelAnchor::UpperLeft,
        );
        let table = fuse(
            &[
                (LayerSpec::new("a", NullPolicy::Keep), &a),
                (LayerSpec::new("b", NullPolicy::Keep), &b),
            ],
            &FusionParams::default(),
        )
        .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1, "b"), Some(6.0));
    }

    #[test]
    fn incongruent_layer_still_joins() {
        let a = set(vec![1.0, 2.0], 1, 2);
        let mut shifted = grid(vec![7.0, 8.0], 1, 2);
        shifted.set_transform(GeoTransform::new(1005.0, 2000.0, 10.0, -10.0));
        let b = tabularize(&shifted, &TabularizeParams::default());

        let (table, summary) = fuse_with_summary(
            &[
                (LayerSpec::new("a", NullPolicy::Keep), &a),
                (LayerSpec::new("b", NullPolicy::Keep), &b),
            ],
            &FusionParams::default(),
        )
        .unwrap();
        assert_eq!(summary.integrity_warnings(), 1);
        assert_eq!(summary.incongruent_layers, vec!["b".to_string()]);
        // half-pixel offsets never snap onto a's lattice
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn duplicate_columns_are_rejected() {
        let a = set(vec![1.0], 1, 1);
        let err = fuse(
            &[
                (LayerSpec::new("a", NullPolicy::Keep), &a),
                (LayerSpec::new("a", NullPolicy::Keep), &a),
            ],
            &FusionParams::default(),
        )
        .unwrap_err();
        assert!(err.is_configuration());
        assert!(fuse(&[], &FusionParams::default()).is_err());
    }

    #[test]
    fn mixed_anchors_are_rejected() {
        let a = set(vec![1.0], 1, 1);
        let b = tabularize(
            &grid(vec![1.0], 1, 1),
            &TabularizeParams {
                anchor: PixelAnchor::Center,
            },
        );
        let result = fuse(
            &[
                (LayerSpec::new("a", NullPolicy::Keep), &a),
                (LayerSpec::new("b", NullPolicy::Keep), &b),
            ],
            &FusionParams::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn flood_policy_table() {
        let specs = flood_layer_specs();
        let names: Vec<&str> = specs.iter().map(|s| s.column.as_str()).collect();
        assert_eq!(
            names,
            [DTM_VALUE, LULC_CODE, FLOOD_BINARY, DIST_TO_RIVER, DIST_TO_TRIBUTARIES, IS_BASIN]
        );
        assert_eq!(specs[2].policy, NullPolicy::Fill(0.0));
        assert_eq!(specs[3].policy, NullPolicy::Keep);
        assert_eq!(specs[0].policy, NullPolicy::Require);
    }
}

use serde::Serialize;

/// One fused coordinate with a value per column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRow {
    pub x: f64,
    pub y: f64,
    pub values: Vec<Option<f64>>,
}

/// Result of a fusion: named columns over coordinate rows.
///
/// Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureTable {
    columns: Vec<String>,
    rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub(crate) fn new(columns: Vec<String>, rows: Vec<FeatureRow>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column in row order
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = Option<f64>> + '_> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| row.values[idx]))
    }

    /// Value at `row` in column `name`, `None` when missing or out of range
    pub fn get(&self, row: usize, name: &str) -> Option<f64> {
        let idx = self.column_index(name)?;
        self.rows.get(row)?.values[idx]
    }

    /// Number of missing values in column `name`
    pub fn missing_count(&self, name: &str) -> Option<usize> {
        self.column(name).map(|values| values.filter(Option::is_none).count())
    }
}

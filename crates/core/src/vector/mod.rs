//! Vector data structures
//!
//! A [`VectorLayer`] is what a loader hands to the pipeline: an ordered set
//! of features, the CRS they are expressed in and the source they were read
//! from. The pipeline only ever borrows layers immutably.

use crate::crs::CRS;
use geo_types::Geometry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

/// A geographic feature with geometry and attributes
#[derive(Debug, Clone)]
pub struct Feature {
    /// Feature geometry
    pub geometry: Option<Geometry<f64>>,
    /// Feature attributes
    pub properties: HashMap<String, AttributeValue>,
    /// Optional feature ID
    pub id: Option<String>,
}

impl Feature {
    /// Create a new feature with geometry
    pub fn new(geometry: impl Into<Geometry<f64>>) -> Self {
        Self {
            geometry: Some(geometry.into()),
            properties: HashMap::new(),
            id: None,
        }
    }

    /// Create a feature with no geometry
    pub fn empty() -> Self {
        Self {
            geometry: None,
            properties: HashMap::new(),
            id: None,
        }
    }

    /// Set an attribute
    pub fn set_property(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.properties.insert(key.into(), value);
    }

    /// Get an attribute
    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }
}

/// An ordered, immutable set of features in one CRS
#[derive(Debug, Clone, Default)]
pub struct VectorLayer {
    features: Vec<Feature>,
    crs: Option<CRS>,
    source: String,
}

impl VectorLayer {
    /// Build a layer from already-parsed features
    pub fn from_features(source: impl Into<String>, crs: Option<CRS>, features: Vec<Feature>) -> Self {
        Self {
            features,
            crs,
            source: source.into(),
        }
    }

    /// Build a layer of attribute-less geometries
    pub fn from_geometries<G>(source: impl Into<String>, crs: Option<CRS>, geometries: G) -> Self
    where
        G: IntoIterator,
        G::Item: Into<Geometry<f64>>,
    {
        let features = geometries.into_iter().map(Feature::new).collect();
        Self::from_features(source, crs, features)
    }

    /// A layer with no features
    pub fn empty(source: impl Into<String>, crs: Option<CRS>) -> Self {
        Self::from_features(source, crs, Vec::new())
    }

    /// Where the layer was read from (path, URI, or a descriptive name)
    pub fn source(&self) -> &str {
        &self.source
    }

    /// CRS of the geometries
    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Iterate over the features that carry a geometry
    pub fn geometries(&self) -> impl Iterator<Item = &Geometry<f64>> {
        self.features.iter().filter_map(|f| f.geometry.as_ref())
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }
}

//! GeoJSON vector loading
//!
//! RFC 7946 files are WGS84 by definition, but most GIS exports of projected
//! data still carry the legacy `crs` member
//! (`{"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::31983"}}`),
//! which is honoured when present.

use std::collections::HashMap;
use std::path::Path;

use geojson::{FeatureCollection, GeoJson, JsonObject, JsonValue};
use tracing::debug;

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::vector::{AttributeValue, Feature, VectorLayer};

/// Load a GeoJSON file into a [`VectorLayer`]
pub fn read_geojson<P: AsRef<Path>>(path: P) -> Result<VectorLayer> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| Error::io_at(path, e))?;
    parse_geojson(&content, &path.display().to_string())
        .map_err(|e| Error::load(path, e))
}

/// Parse GeoJSON text into a [`VectorLayer`] labelled with `source`
pub fn parse_geojson(content: &str, source: &str) -> Result<VectorLayer> {
    let geojson: GeoJson = content
        .parse()
        .map_err(|e: geojson::Error| Error::Other(format!("GeoJSON parse error: {}", e)))?;

    let (features, crs) = match geojson {
        GeoJson::FeatureCollection(FeatureCollection {
            features,
            foreign_members,
            ..
        }) => {
            let crs = foreign_members.as_ref().and_then(legacy_crs);
            (features, crs)
        }
        GeoJson::Feature(f) => (vec![f], None),
        GeoJson::Geometry(g) => (
            vec![geojson::Feature {
                bbox: None,
                geometry: Some(g),
                id: None,
                properties: None,
                foreign_members: None,
            }],
            None,
        ),
    };

    let mut out = Vec::with_capacity(features.len());
    for feature in features {
        let geometry = match feature.geometry {
            Some(g) => Some(
                geo_types::Geometry::<f64>::try_from(g)
                    .map_err(|e| Error::Other(format!("Invalid geometry: {}", e)))?,
            ),
            None => None,
        };

        let properties = feature
            .properties
            .as_ref()
            .map(convert_properties)
            .unwrap_or_default();

        let id = feature.id.map(|id| match id {
            geojson::feature::Id::String(s) => s,
            geojson::feature::Id::Number(n) => n.to_string(),
        });

        out.push(Feature {
            geometry,
            properties,
            id,
        });
    }

    let crs = crs.unwrap_or_else(CRS::wgs84);
    debug!("Parsed {} features from {} ({})", out.len(), source, crs);

    Ok(VectorLayer::from_features(source, Some(crs), out))
}

/// Extract an EPSG code from a legacy `crs` member
fn legacy_crs(members: &JsonObject) -> Option<CRS> {
    let name = members
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()?;

    // urn:ogc:def:crs:EPSG::31983, urn:ogc:def:crs:OGC:1.3:CRS84, EPSG:31983
    if name.ends_with("CRS84") {
        return Some(CRS::wgs84());
    }
    let code = name.rsplit(':').next()?.parse::<u32>().ok()?;
    Some(CRS::from_epsg(code))
}

fn convert_properties(props: &JsonObject) -> HashMap<String, AttributeValue> {
    props
        .iter()
        .map(|(k, v)| (k.clone(), convert_value(v)))
        .collect()
}

fn convert_value(value: &JsonValue) -> AttributeValue {
    match value {
        JsonValue::Null => AttributeValue::Null,
        JsonValue::Bool(b) => AttributeValue::Bool(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => AttributeValue::Int(i),
            None => AttributeValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => AttributeValue::String(s.clone()),
        other => AttributeValue::String(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLOODS: &str = r#"{
        "type": "FeatureCollection",
        "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::31983" } },
        "features": [
            { "type": "Feature", "id": 7, "properties": { "ano": 2019, "bairro": "Centro", "prof": 0.4 },
              "geometry": { "type": "Point", "coordinates": [333015.0, 7394985.0] } },
            { "type": "Feature", "properties": null, "geometry": null }
        ]
    }"#;

    #[test]
    fn parses_legacy_crs_and_properties() {
        let layer = parse_geojson(FLOODS, "floods").unwrap();
        assert_eq!(layer.crs().and_then(|c| c.epsg()), Some(31983));
        assert_eq!(layer.len(), 2);
        assert_eq!(layer.geometries().count(), 1);

        let first = &layer.features()[0];
        assert_eq!(first.id.as_deref(), Some("7"));
        assert_eq!(first.get_property("ano"), Some(&AttributeValue::Int(2019)));
        assert_eq!(first.get_property("prof"), Some(&AttributeValue::Float(0.4)));
    }

    #[test]
    fn defaults_to_wgs84() {
        let layer = parse_geojson(
            r#"{"type": "Point", "coordinates": [-46.63, -23.55]}"#,
            "inline",
        )
        .unwrap();
        assert_eq!(layer.crs().and_then(|c| c.epsg()), Some(4326));
        assert_eq!(layer.len(), 1);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_geojson("{ not json", "bad").is_err());
    }
}

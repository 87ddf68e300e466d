// src/io/vector.rs
use std::fs;
use std::path::Path;

use geo::{BooleanOps, MultiPolygon, Polygon};
use geojson::{FeatureCollection, GeoJson, JsonObject, JsonValue};

use crate::error::{Error, Result};
use crate::feature::Feature;
use crate::processing::pipeline::Reference;

/// Read an AOI from a GeoJSON file
pub fn read_aoi(path: &Path) -> Result<Feature> {
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    parse_aoi(&text)
}

/// Parse a GeoJSON geometry, feature or feature collection into one
/// multipolygon. Polygons from several features are unioned.
pub fn parse_aoi(text: &str) -> Result<Feature> {
    let geojson: GeoJson = text
        .parse()
        .map_err(|e: geojson::Error| Error::GeoJson(e.to_string()))?;

    let geometries = match geojson {
        GeoJson::Geometry(geometry) => vec![geometry],
        GeoJson::Feature(feature) => feature.geometry.into_iter().collect(),
        GeoJson::FeatureCollection(collection) => collection
            .features
            .into_iter()
            .filter_map(|f| f.geometry)
            .collect(),
    };
    if geometries.is_empty() {
        return Err(Error::InvalidGeometry("GeoJSON holds no geometry".into()));
    }

    let mut polygons: Vec<Polygon<f64>> = Vec::new();
    for geometry in geometries {
        let geometry = geo_types::Geometry::<f64>::try_from(geometry.value)
            .map_err(|e| Error::GeoJson(e.to_string()))?;
        match geometry {
            geo_types::Geometry::Polygon(p) => polygons.push(p),
            geo_types::Geometry::MultiPolygon(mp) => polygons.extend(mp.0),
            other => {
                return Err(Error::InvalidGeometry(format!(
                    "AOI must be polygonal, found {other:?}"
                )))
            }
        }
    }

    let merged = match polygons.len() {
        1 => MultiPolygon::new(polygons),
        _ => polygons
            .into_iter()
            .fold(MultiPolygon::new(vec![]), |acc, p| {
                acc.union(&MultiPolygon::new(vec![p]))
            }),
    };
    Ok(Feature::new(merged))
}

fn to_geojson_feature(name: &str, feature: &Feature) -> geojson::Feature {
    let mut properties = JsonObject::new();
    properties.insert("name".to_string(), JsonValue::from(name));
    for (key, value) in &feature.properties {
        properties.insert(key.clone(), JsonValue::from(*value));
    }
    geojson::Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::from(&feature.geometry))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Reference geometries as a FeatureCollection, properties carried over
pub fn features_to_geojson(references: &[Reference]) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: references
            .iter()
            .map(|r| to_geojson_feature(&r.name, &r.feature))
            .collect(),
        foreign_members: None,
    }
}

pub fn write_features(path: &Path, references: &[Reference]) -> Result<()> {
    let collection = features_to_geojson(references);
    fs::write(path, GeoJson::from(collection).to_string()).map_err(|e| Error::io(path, e))
}

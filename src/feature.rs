// src/feature.rs
use std::collections::BTreeMap;

use geo::{Area, MultiPolygon};

/// Property keys written by the reference geometry stage
pub mod props {
    pub const BUFFER_WIDTH: &str = "Buffer_width";
    pub const BUFFER_AREA: &str = "Buffer_area";
    pub const BUFFER_DIFF: &str = "Buffer_diff";
    pub const URBAN_AREA: &str = "Urban_Area";
}

/// A polygon with named numeric properties
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: MultiPolygon<f64>,
    pub properties: BTreeMap<String, f64>,
}

impl Feature {
    pub fn new(geometry: impl Into<MultiPolygon<f64>>) -> Self {
        Self {
            geometry: geometry.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Set (or overwrite) a property
    pub fn with_property(mut self, key: &str, value: f64) -> Self {
        self.properties.insert(key.to_string(), value);
        self
    }

    pub fn property(&self, key: &str) -> Option<f64> {
        self.properties.get(key).copied()
    }

    /// Planar area in CRS units squared
    pub fn area(&self) -> f64 {
        self.geometry.unsigned_area()
    }
}

// src/catalog.rs
use std::collections::HashMap;

use chrono::NaiveDate;
use geo::{BoundingRect, Intersects, MultiPolygon};

use crate::error::{Error, Result};
use crate::raster::{Collection, Scene};

/// Source of timestamped multi-band scenes
pub trait SceneCatalog: Send + Sync {
    /// Scenes of `collection_id` dated in `[start, end)` that overlap `geometry`
    fn query(
        &self,
        collection_id: &str,
        geometry: &MultiPolygon<f64>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Collection>;
}

/// Catalog over collections already loaded in memory
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    collections: HashMap<String, Collection>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, collection: Collection) {
        self.collections
            .insert(collection.id().to_string(), collection);
    }

    pub fn with_collection(mut self, collection: Collection) -> Self {
        self.insert(collection);
        self
    }
}

impl SceneCatalog for MemoryCatalog {
    fn query(
        &self,
        collection_id: &str,
        geometry: &MultiPolygon<f64>,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Collection> {
        let collection = self
            .collections
            .get(collection_id)
            .ok_or_else(|| Error::Config(format!("unknown collection '{collection_id}'")))?;

        let dated = collection.filter_date(start, end);
        let scenes = dated
            .scenes()
            .iter()
            .filter(|scene| overlaps(scene, geometry))
            .cloned()
            .collect();
        Ok(Collection::new(collection_id, scenes))
    }
}

/// A scene overlaps when any of its bands covers part of the geometry's bounds
pub fn overlaps(scene: &Scene, geometry: &MultiPolygon<f64>) -> bool {
    let Some(bounds) = geometry.bounding_rect() else {
        return false;
    };
    scene
        .bands
        .values()
        .any(|band| band.transform().extent(band.rows(), band.cols()).intersects(&bounds))
}

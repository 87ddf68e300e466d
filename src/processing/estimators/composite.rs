// src/processing/estimators/composite.rs
use std::sync::Arc;

use tracing::info;

use crate::catalog::SceneCatalog;
use crate::error::{Error, Result, Stage};
use crate::processing::estimators::{EstimationContext, LstEstimator};
use crate::raster::{Raster, Reducer};
use crate::utils::scaling::{COMPOSITE_LST_SCALE, KELVIN_OFFSET};

/// Temporal mean of a precomputed 8-day LST product stored as scaled integers
pub struct CompositeEstimator {
    catalog: Arc<dyn SceneCatalog>,
    collection_id: String,
    band: String,
    scale_factor: f64,
    zonal_scale: f64,
    name: String,
}

impl CompositeEstimator {
    pub fn new(
        catalog: Arc<dyn SceneCatalog>,
        collection_id: impl Into<String>,
        band: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            collection_id: collection_id.into(),
            band: band.into(),
            scale_factor: COMPOSITE_LST_SCALE,
            zonal_scale: 1000.0,
            name: "MODIS".to_string(),
        }
    }

    pub fn with_scale_factor(mut self, scale_factor: f64) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    pub fn with_zonal_scale(mut self, zonal_scale: f64) -> Self {
        self.zonal_scale = zonal_scale;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl LstEstimator for CompositeEstimator {
    fn name(&self) -> &str {
        &self.name
    }

    fn stage(&self) -> Stage {
        Stage::CompositeLst
    }

    fn zonal_scale(&self) -> f64 {
        self.zonal_scale
    }

    fn estimate(&self, ctx: &EstimationContext<'_>) -> Result<Raster> {
        let window = ctx.window;
        let scenes = self
            .catalog
            .query(&self.collection_id, ctx.clip, window.start, window.end)?
            .filter_window(&window);
        if scenes.is_empty() {
            return Err(Error::EmptyInputCollection {
                collection: self.collection_id.clone(),
                window: window.to_string(),
            });
        }
        info!(collection = %self.collection_id, scenes = scenes.len(), "compositing LST");

        let mean = ctx.processor.reduce(&scenes, &self.band, Reducer::Mean)?;
        ctx.processor.cancel_token().check()?;
        let scale_factor = self.scale_factor;
        let celsius = ctx
            .processor
            .install(|| mean.map(|raw| raw * scale_factor - KELVIN_OFFSET));
        ctx.clip_and_mask(&celsius)
    }
}

// src/processing/estimators/toolbox.rs
use std::sync::Arc;

use chrono::NaiveDate;
use geo::MultiPolygon;
use tracing::info;

use crate::error::{Error, Result, Stage};
use crate::processing::estimators::{EstimationContext, LstEstimator};
use crate::raster::{Collection, Raster, Reducer};
use crate::utils::scaling::KELVIN_OFFSET;

/// External library producing per-scene LST collections
pub trait LstToolbox: Send + Sync {
    /// Scenes of `satellite` in `[start, end)` over `geometry`, each carrying
    /// an `LST` band in Kelvin
    fn collection(
        &self,
        satellite: &str,
        start: NaiveDate,
        end: NaiveDate,
        geometry: &MultiPolygon<f64>,
        use_ndvi: bool,
    ) -> Result<Collection>;
}

/// Median of a toolbox-produced per-scene LST collection
pub struct ToolboxEstimator {
    toolbox: Arc<dyn LstToolbox>,
    satellite: String,
    use_ndvi: bool,
    band: String,
    reducer: Reducer,
    zonal_scale: f64,
    name: String,
}

impl ToolboxEstimator {
    pub fn new(toolbox: Arc<dyn LstToolbox>, satellite: impl Into<String>) -> Self {
        let satellite = satellite.into();
        Self {
            toolbox,
            name: satellite.clone(),
            satellite,
            use_ndvi: true,
            band: "LST".to_string(),
            reducer: Reducer::Median,
            zonal_scale: 30.0,
        }
    }

    pub fn with_ndvi(mut self, use_ndvi: bool) -> Self {
        self.use_ndvi = use_ndvi;
        self
    }

    pub fn with_reducer(mut self, reducer: Reducer) -> Self {
        self.reducer = reducer;
        self
    }

    pub fn with_zonal_scale(mut self, scale: f64) -> Self {
        self.zonal_scale = scale;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl LstEstimator for ToolboxEstimator {
    fn name(&self) -> &str {
        &self.name
    }

    fn stage(&self) -> Stage {
        Stage::ToolboxLst
    }

    fn zonal_scale(&self) -> f64 {
        self.zonal_scale
    }

    fn estimate(&self, ctx: &EstimationContext<'_>) -> Result<Raster> {
        let window = ctx.window;
        let scenes = self
            .toolbox
            .collection(&self.satellite, window.start, window.end, ctx.clip, self.use_ndvi)?
            .filter_window(&window);
        if scenes.is_empty() {
            return Err(Error::EmptyInputCollection {
                collection: self.satellite.clone(),
                window: window.to_string(),
            });
        }
        info!(satellite = %self.satellite, scenes = scenes.len(), "reducing toolbox LST");

        let kelvin = ctx.processor.reduce(&scenes, &self.band, self.reducer)?;
        ctx.processor.cancel_token().check()?;
        let celsius = ctx.processor.install(|| kelvin.offset(-KELVIN_OFFSET));
        ctx.clip_and_mask(&celsius)
    }
}

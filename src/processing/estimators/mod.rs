// src/processing/estimators/mod.rs
//! Land surface temperature estimators.
//!
//! Every estimator produces a Celsius raster clipped to the context's clip
//! geometry with water pixels masked out.

pub mod composite;
pub mod physical;
pub mod toolbox;

use std::sync::Arc;

use geo::MultiPolygon;

use crate::error::{Result, Stage};
use crate::processing::parallel::ParallelProcessor;
use crate::raster::{Mask, Raster, TimeWindow};
use crate::region::water_mask_for;
use crate::utils::cache::NodeCache;

pub use composite::CompositeEstimator;
pub use physical::{cloud_mask, LandsatBands, PhysicalEstimator};
pub use toolbox::{LstToolbox, ToolboxEstimator};

/// Inputs shared by every estimator in a run
pub struct EstimationContext<'a> {
    pub window: TimeWindow,
    /// The urban boundary
    pub aoi: &'a MultiPolygon<f64>,
    /// Geometry the output is clipped to, contains the AOI
    pub clip: &'a MultiPolygon<f64>,
    pub water_occurrence: &'a Raster,
    pub processor: &'a ParallelProcessor,
    pub cache: &'a NodeCache,
}

impl EstimationContext<'_> {
    /// Water mask on the grid of `raster`, memoized per grid
    pub fn water_mask(&self, raster: &Raster) -> Result<Arc<Mask>> {
        let key = format!("water_mask/{}", raster.grid_key());
        self.cache
            .get_or_try_insert(&key, || Ok(water_mask_for(raster, self.water_occurrence)))
    }

    /// Clip to the context geometry, then drop water pixels
    pub fn clip_and_mask(&self, raster: &Raster) -> Result<Raster> {
        let water = self.water_mask(raster)?;
        raster.clip(self.clip).update_mask(&water)
    }
}

pub trait LstEstimator: Send + Sync {
    /// Short name used in reports and layer names
    fn name(&self) -> &str;

    /// Stage errors are attributed to
    fn stage(&self) -> Stage;

    /// Pixel size zonal statistics over this estimator's output use
    fn zonal_scale(&self) -> f64;

    /// Celsius LST for the context's window and geometry
    fn estimate(&self, ctx: &EstimationContext<'_>) -> Result<Raster>;
}

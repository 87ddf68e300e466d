// src/processing/estimators/physical.rs
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::SceneCatalog;
use crate::error::{Error, Result, Stage};
use crate::processing::estimators::{EstimationContext, LstEstimator};
use crate::processing::indices::{Emissivity, FractionalVegetation, Ndvi, PlanckInversion};
use crate::processing::zonal::ZonalReducer;
use crate::raster::{Collection, Mask, Raster, Reducer, Scene};

/// Cloud scores above this value (0-100 scale) are masked
pub const DEFAULT_CLOUD_THRESHOLD: f64 = 10.0;

/// Band names of the thermal and reflectance collections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandsatBands {
    #[serde(default = "default_brightness")]
    pub brightness: String,
    #[serde(default = "default_cloud")]
    pub cloud: String,
    #[serde(default = "default_nir")]
    pub nir: String,
    #[serde(default = "default_red")]
    pub red: String,
}

fn default_brightness() -> String {
    "B10".to_string()
}

fn default_cloud() -> String {
    "cloud".to_string()
}

fn default_nir() -> String {
    "B5".to_string()
}

fn default_red() -> String {
    "B4".to_string()
}

impl Default for LandsatBands {
    fn default() -> Self {
        Self {
            brightness: default_brightness(),
            cloud: default_cloud(),
            nir: default_nir(),
            red: default_red(),
        }
    }
}

/// Keep-mask of cells with a known cloud score no greater than `threshold`
pub fn cloud_mask(score: &Raster, threshold: f64) -> Mask {
    Mask::from_fn(score.shape(), |(row, col)| {
        score.get(row, col).is_some_and(|s| s <= threshold)
    })
}

/// LST from thermal brightness temperature and NDVI-derived emissivity
pub struct PhysicalEstimator {
    catalog: Arc<dyn SceneCatalog>,
    thermal_collection: String,
    reflectance_collection: String,
    bands: LandsatBands,
    cloud_threshold: f64,
    ndvi_scale: f64,
    zonal_scale: f64,
    name: String,
}

impl PhysicalEstimator {
    pub fn new(
        catalog: Arc<dyn SceneCatalog>,
        thermal_collection: impl Into<String>,
        reflectance_collection: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            thermal_collection: thermal_collection.into(),
            reflectance_collection: reflectance_collection.into(),
            bands: LandsatBands::default(),
            cloud_threshold: DEFAULT_CLOUD_THRESHOLD,
            ndvi_scale: 30.0,
            zonal_scale: 30.0,
            name: "Landsat".to_string(),
        }
    }

    pub fn with_bands(mut self, bands: LandsatBands) -> Self {
        self.bands = bands;
        self
    }

    pub fn with_cloud_threshold(mut self, threshold: f64) -> Self {
        self.cloud_threshold = threshold;
        self
    }

    pub fn with_ndvi_scale(mut self, scale: f64) -> Self {
        self.ndvi_scale = scale;
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

    fn scenes(&self, id: &str, ctx: &EstimationContext<'_>) -> Result<Collection> {
        let window = ctx.window;
        let scenes = self
            .catalog
            .query(id, ctx.clip, window.start, window.end)?
            .filter_window(&window);
        if scenes.is_empty() {
            return Err(Error::EmptyInputCollection {
                collection: id.to_string(),
                window: window.to_string(),
            });
        }
        Ok(scenes)
    }

    /// Scene with every band masked by its own cloud score, if it carries one
    fn mask_clouds(&self, scene: &Scene) -> Result<Scene> {
        match scene.bands.get(&self.bands.cloud) {
            Some(score) => scene.update_mask(&cloud_mask(score, self.cloud_threshold)),
            None => Ok(scene.clone()),
        }
    }

    /// Median brightness temperature (K) over cloud-free pixels
    fn brightness_temperature(&self, ctx: &EstimationContext<'_>) -> Result<Raster> {
        let thermal = self.scenes(&self.thermal_collection, ctx)?;
        info!(collection = %self.thermal_collection, scenes = thermal.len(), "compositing brightness temperature");
        let cloud_free = thermal.map_scenes(|scene| {
            // the thermal collection must carry the score band
            scene.band(&self.bands.cloud)?;
            self.mask_clouds(scene)
        })?;
        ctx.processor
            .reduce(&cloud_free, &self.bands.brightness, Reducer::Median)
    }

    /// Median NDVI, clipped and water masked
    fn ndvi(&self, ctx: &EstimationContext<'_>) -> Result<Raster> {
        let reflectance = self.scenes(&self.reflectance_collection, ctx)?;
        info!(collection = %self.reflectance_collection, scenes = reflectance.len(), "compositing NDVI");
        let kernel = Ndvi::new(0, 1, None);
        let per_scene = reflectance.map_scenes(|scene| {
            let scene = self.mask_clouds(scene)?;
            let ndvi = ctx.processor.process(
                &kernel,
                &[scene.band(&self.bands.nir)?, scene.band(&self.bands.red)?],
            )?;
            Ok(Scene::new(scene.date).with_band("NDVI", ndvi))
        })?;
        let median = ctx.processor.reduce(&per_scene, "NDVI", Reducer::Median)?;
        ctx.clip_and_mask(&median)
    }
}

impl LstEstimator for PhysicalEstimator {
    fn name(&self) -> &str {
        &self.name
    }

    fn stage(&self) -> Stage {
        Stage::PhysicalLst
    }

    fn zonal_scale(&self) -> f64 {
        self.zonal_scale
    }

    fn estimate(&self, ctx: &EstimationContext<'_>) -> Result<Raster> {
        let tb = ctx.processor.install(|| self.brightness_temperature(ctx))?;
        let ndvi = ctx.processor.install(|| self.ndvi(ctx))?;

        let range = ZonalReducer::from_processor(ctx.processor)
            .reduce_min_max(&ndvi, ctx.aoi, self.ndvi_scale, None)?
            .ok_or_else(|| Error::DataUnavailable("NDVI has no valid pixels over the AOI".into()))?;
        debug!(min = range.min, max = range.max, "NDVI range");

        let fv = ctx
            .processor
            .process(&FractionalVegetation::new(range.min, range.max)?, &[&ndvi])?;
        let emissivity = ctx.processor.process(&Emissivity, &[&fv])?;
        let lst = ctx
            .processor
            .process(&PlanckInversion::new(0, 1), &[&tb, &emissivity])?;

        let water = ctx.water_mask(&lst)?;
        lst.update_mask(&water)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::processing::indices::planck::surface_temperature;
    use crate::processing::parallel::ParallelProcessor;
    use crate::raster::{GeoTransform, TimeWindow};
    use crate::utils::cache::NodeCache;
    use chrono::NaiveDate;
    use geo::{Coord, MultiPolygon, Rect};

    fn grid() -> GeoTransform {
        GeoTransform::new(0.0, 4.0, 1.0, -1.0)
    }

    fn day(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, m, d).unwrap()
    }

    fn catalog() -> Arc<MemoryCatalog> {
        let thermal = Scene::new(day(7, 1))
            .with_band("B10", Raster::filled(4, 4, 300.0, grid()))
            .with_band("cloud", Raster::filled(4, 4, 0.0, grid()));
        let nir: Vec<f64> = (0..16).map(|i| 0.3 + 0.1 * (i % 4) as f64).collect();
        let reflectance = Scene::new(day(7, 9))
            .with_band("B5", Raster::from_vec(nir, 4, 4, grid()).unwrap())
            .with_band("B4", Raster::filled(4, 4, 0.1, grid()));
        Arc::new(
            MemoryCatalog::new()
                .with_collection(Collection::new("thermal", vec![thermal]))
                .with_collection(Collection::new("sr", vec![reflectance])),
        )
    }

    fn run(estimator: &PhysicalEstimator, window: TimeWindow) -> Result<Raster> {
        let aoi: MultiPolygon<f64> =
            Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 4.0, y: 4.0 }).to_polygon().into();
        let mut occurrence = vec![0.0; 16];
        occurrence[15] = 40.0;
        let occurrence = Raster::from_vec(occurrence, 4, 4, grid()).unwrap();
        let processor = ParallelProcessor::new(Some(2)).unwrap();
        let cache = NodeCache::new();
        let ctx = EstimationContext {
            window,
            aoi: &aoi,
            clip: &aoi,
            water_occurrence: &occurrence,
            processor: &processor,
            cache: &cache,
        };
        estimator.estimate(&ctx)
    }

    fn summer() -> TimeWindow {
        TimeWindow::new(day(1, 1), NaiveDate::from_ymd_opt(2021, 1, 1).unwrap(), (152, 243))
    }

    #[test]
    fn cloud_threshold_is_inclusive() {
        let score = Raster::from_vec(vec![9.0, 10.0, 11.0, f64::NAN], 1, 4, GeoTransform::default())
            .unwrap();
        let mask = cloud_mask(&score, DEFAULT_CLOUD_THRESHOLD);
        assert!(mask.get(0, 0));
        assert!(mask.get(0, 1));
        assert!(!mask.get(0, 2));
        assert!(!mask.get(0, 3));
    }

    #[test]
    fn estimates_lst_from_brightness_and_emissivity() {
        let estimator = PhysicalEstimator::new(catalog(), "thermal", "sr")
            .with_ndvi_scale(1.0)
            .with_zonal_scale(1.0);
        let lst = run(&estimator, summer()).unwrap();

        // least vegetated column is bare soil, greenest is full cover
        let bare = lst.get(0, 0).unwrap();
        let green = lst.get(0, 3).unwrap();
        assert!((bare - surface_temperature(300.0, 0.986)).abs() < 1e-9);
        assert!((green - surface_temperature(300.0, 0.990)).abs() < 1e-9);
        assert!(green < bare);

        // water cell
        assert_eq!(lst.get(3, 3), None);
        assert_eq!(lst.valid_count(), 15);
    }

    #[test]
    fn reflectance_off_the_thermal_grid_is_rejected() {
        let thermal = Scene::new(day(7, 1))
            .with_band("B10", Raster::filled(4, 4, 300.0, grid()))
            .with_band("cloud", Raster::filled(4, 4, 0.0, grid()));
        // same shape, one pixel further east
        let shifted = GeoTransform::new(1.0, 4.0, 1.0, -1.0);
        let nir: Vec<f64> = (0..16).map(|i| 0.3 + 0.1 * (i % 4) as f64).collect();
        let reflectance = Scene::new(day(7, 9))
            .with_band("B5", Raster::from_vec(nir, 4, 4, shifted).unwrap())
            .with_band("B4", Raster::filled(4, 4, 0.1, shifted));
        let catalog = Arc::new(
            MemoryCatalog::new()
                .with_collection(Collection::new("thermal", vec![thermal]))
                .with_collection(Collection::new("sr", vec![reflectance])),
        );
        let estimator = PhysicalEstimator::new(catalog, "thermal", "sr").with_ndvi_scale(1.0);
        assert!(matches!(
            run(&estimator, summer()),
            Err(Error::GridMismatch { .. })
        ));
    }

    #[test]
    fn uniform_ndvi_is_a_domain_error() {
        let thermal = Scene::new(day(7, 1))
            .with_band("B10", Raster::filled(4, 4, 300.0, grid()))
            .with_band("cloud", Raster::filled(4, 4, 0.0, grid()));
        let reflectance = Scene::new(day(7, 9))
            .with_band("B5", Raster::filled(4, 4, 0.4, grid()))
            .with_band("B4", Raster::filled(4, 4, 0.1, grid()));
        let catalog = Arc::new(
            MemoryCatalog::new()
                .with_collection(Collection::new("thermal", vec![thermal]))
                .with_collection(Collection::new("sr", vec![reflectance])),
        );
        let estimator = PhysicalEstimator::new(catalog, "thermal", "sr").with_ndvi_scale(1.0);
        assert!(matches!(
            run(&estimator, summer()),
            Err(Error::NumericDomainError(_))
        ));
    }

    #[test]
    fn empty_window_is_reported() {
        let estimator = PhysicalEstimator::new(catalog(), "thermal", "sr");
        let winter = TimeWindow::new(day(1, 1), day(3, 1), (1, 366));
        assert!(matches!(
            run(&estimator, winter),
            Err(Error::EmptyInputCollection { .. })
        ));
    }

    #[test]
    fn cloudy_scenes_leave_no_brightness() {
        let thermal = Scene::new(day(7, 1))
            .with_band("B10", Raster::filled(4, 4, 300.0, grid()))
            .with_band("cloud", Raster::filled(4, 4, 11.0, grid()));
        let estimator = PhysicalEstimator::new(
            Arc::new(MemoryCatalog::new().with_collection(Collection::new("thermal", vec![thermal]))),
            "thermal",
            "sr",
        );
        let tb = {
            let aoi: MultiPolygon<f64> =
                Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 4.0, y: 4.0 }).to_polygon().into();
            let occurrence = Raster::filled(4, 4, 0.0, grid());
            let processor = ParallelProcessor::new(Some(1)).unwrap();
            let cache = NodeCache::new();
            let ctx = EstimationContext {
                window: summer(),
                aoi: &aoi,
                clip: &aoi,
                water_occurrence: &occurrence,
                processor: &processor,
                cache: &cache,
            };
            estimator.brightness_temperature(&ctx).unwrap()
        };
        assert_eq!(tb.valid_count(), 0);
    }
}

// src/config.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::SceneCatalog;
use crate::error::{Error, Result};
use crate::io::{FileRegion, ManifestCatalog, RasterFormat};
use crate::processing::estimators::{CompositeEstimator, LandsatBands, PhysicalEstimator};
use crate::processing::parallel::{ParallelProcessor, DEFAULT_MAX_PIXELS};
use crate::processing::pipeline::{ClipExtent, PipelineSettings, SuhiPipeline};
use crate::processing::reference::{BufferSearch, FIXED_BUFFER_DISTANCE};
use crate::processing::suhi::RuralFallback;
use crate::raster::TimeWindow;
use crate::utils::scaling::COMPOSITE_LST_SCALE;

/// A full pipeline run, read from JSON
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    #[serde(default)]
    pub global: GlobalParams,
    pub window: TimeWindow,
    pub region: FileRegion,
    /// Scene manifest for the composite and physical estimators
    pub catalog: PathBuf,
    #[serde(default)]
    pub composite: Option<CompositeParams>,
    #[serde(default)]
    pub physical: Option<PhysicalParams>,
    #[serde(default)]
    pub references: ReferenceParams,
    #[serde(default)]
    pub outputs: OutputParams,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct GlobalParams {
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default = "default_max_pixels")]
    pub max_pixels: usize,
    #[serde(default)]
    pub rural_fallback: RuralFallback,
    #[serde(default)]
    pub clip: ClipExtent,
}

impl Default for GlobalParams {
    fn default() -> Self {
        Self {
            threads: None,
            max_pixels: default_max_pixels(),
            rural_fallback: RuralFallback::default(),
            clip: ClipExtent::default(),
        }
    }
}

fn default_max_pixels() -> usize {
    DEFAULT_MAX_PIXELS
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct CompositeParams {
    pub collection: String,
    #[serde(default = "default_composite_band")]
    pub band: String,
    #[serde(default = "default_composite_scale_factor")]
    pub scale_factor: f64,
    #[serde(default = "default_composite_zonal_scale")]
    pub zonal_scale: f64,
    #[serde(default = "default_composite_name")]
    pub name: String,
}

fn default_composite_band() -> String {
    "LST_Day_1km".to_string()
}

fn default_composite_scale_factor() -> f64 {
    COMPOSITE_LST_SCALE
}

fn default_composite_zonal_scale() -> f64 {
    1000.0
}

fn default_composite_name() -> String {
    "MODIS".to_string()
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct PhysicalParams {
    pub thermal_collection: String,
    pub reflectance_collection: String,
    #[serde(default)]
    pub bands: LandsatBands,
    #[serde(default = "default_cloud_threshold")]
    pub cloud_threshold: f64,
    #[serde(default = "default_landsat_scale")]
    pub ndvi_scale: f64,
    #[serde(default = "default_landsat_scale")]
    pub zonal_scale: f64,
    #[serde(default = "default_physical_name")]
    pub name: String,
}

fn default_cloud_threshold() -> f64 {
    10.0
}

fn default_landsat_scale() -> f64 {
    30.0
}

fn default_physical_name() -> String {
    "Landsat".to_string()
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ReferenceParams {
    #[serde(default = "default_fixed_distance")]
    pub fixed_distance: f64,
    #[serde(default)]
    pub search: BufferSearch,
}

impl Default for ReferenceParams {
    fn default() -> Self {
        Self {
            fixed_distance: default_fixed_distance(),
            search: BufferSearch::default(),
        }
    }
}

fn default_fixed_distance() -> f64 {
    FIXED_BUFFER_DISTANCE
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct OutputParams {
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,
    #[serde(default = "default_true")]
    pub report: bool,
    #[serde(default = "default_true")]
    pub rasters: bool,
    /// GeoTIFF when built with GDAL, JSON documents otherwise
    #[serde(default)]
    pub raster_format: RasterFormat,
    #[serde(default = "default_true")]
    pub features: bool,
}

impl Default for OutputParams {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            report: true,
            rasters: true,
            raster_format: RasterFormat::default(),
            features: true,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_true() -> bool {
    true
}

impl PipelineConfig {
    /// Parse and validate a config file. Relative paths resolve against its directory.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let mut config: PipelineConfig = serde_json::from_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for path in [
            &mut self.region.aoi,
            &mut self.region.water_occurrence,
            &mut self.region.landcover,
            &mut self.catalog,
            &mut self.outputs.directory,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.composite.is_none() && self.physical.is_none() {
            return Err(Error::Config(
                "at least one of `composite` or `physical` must be configured".into(),
            ));
        }
        if self.window.start >= self.window.end {
            return Err(Error::Config(format!(
                "empty date range {}..{}",
                self.window.start, self.window.end
            )));
        }
        let (first, last) = self.window.day_of_year;
        if first == 0 || last > 366 || first > last {
            return Err(Error::Config(format!("invalid day-of-year window {first}-{last}")));
        }
        if self.global.max_pixels == 0 {
            return Err(Error::Config("max_pixels must be positive".into()));
        }
        Ok(())
    }

    pub fn settings(&self) -> PipelineSettings {
        PipelineSettings {
            window: self.window,
            fixed_distance: self.references.fixed_distance,
            search: self.references.search,
            rural_fallback: self.global.rural_fallback,
            clip: self.global.clip,
        }
    }

    /// Pipeline over the configured region, manifest and estimators
    pub fn build(&self) -> Result<SuhiPipeline> {
        let processor =
            ParallelProcessor::new(self.global.threads)?.with_max_pixels(self.global.max_pixels);
        let catalog: Arc<dyn SceneCatalog> = Arc::new(ManifestCatalog::from_path(&self.catalog)?);

        let mut pipeline =
            SuhiPipeline::new(Arc::new(self.region.clone()), processor, self.settings());
        if let Some(params) = &self.composite {
            pipeline = pipeline.with_estimator(Box::new(
                CompositeEstimator::new(catalog.clone(), &params.collection, &params.band)
                    .with_scale_factor(params.scale_factor)
                    .with_zonal_scale(params.zonal_scale)
                    .with_name(&params.name),
            ));
        }
        if let Some(params) = &self.physical {
            pipeline = pipeline.with_estimator(Box::new(
                PhysicalEstimator::new(
                    catalog.clone(),
                    &params.thermal_collection,
                    &params.reflectance_collection,
                )
                .with_bands(params.bands.clone())
                .with_cloud_threshold(params.cloud_threshold)
                .with_ndvi_scale(params.ndvi_scale)
                .with_zonal_scale(params.zonal_scale)
                .with_name(&params.name),
            ));
        }
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "window": {"start": "2020-01-01", "end": "2021-01-01"},
        "region": {
            "aoi": "nyc.geojson",
            "water_occurrence": "occurrence.tif",
            "landcover": "nlcd.tif"
        },
        "catalog": "scenes.json",
        "composite": {"collection": "MODIS/061/MOD11A2"}
    }"#;

    #[test]
    fn defaults_fill_omitted_fields() {
        let config: PipelineConfig = serde_json::from_str(MINIMAL).unwrap();
        config.validate().unwrap();

        assert_eq!(config.window.day_of_year, (152, 243));
        assert_eq!(config.global.max_pixels, DEFAULT_MAX_PIXELS);
        assert_eq!(config.global.rural_fallback, RuralFallback::Fail);
        assert_eq!(config.global.clip, ClipExtent::StudyArea);
        assert_eq!(config.references.fixed_distance, 2000.0);
        assert_eq!(config.references.search, BufferSearch::default());

        let composite = config.composite.as_ref().unwrap();
        assert_eq!(composite.band, "LST_Day_1km");
        assert_eq!(composite.scale_factor, 0.02);
        assert_eq!(composite.zonal_scale, 1000.0);
        assert!(config.physical.is_none());
        assert!(config.outputs.report && config.outputs.rasters && config.outputs.features);
        assert_eq!(config.outputs.raster_format, RasterFormat::default());
    }

    #[test]
    fn physical_defaults() {
        let params: PhysicalParams = serde_json::from_str(
            r#"{"thermal_collection": "LC08/T1", "reflectance_collection": "LC08/T1_L2"}"#,
        )
        .unwrap();
        assert_eq!(params.cloud_threshold, 10.0);
        assert_eq!(params.ndvi_scale, 30.0);
        assert_eq!(params.bands, LandsatBands::default());
    }

    #[test]
    fn legacy_fallback_is_selectable() {
        let global: GlobalParams =
            serde_json::from_str(r#"{"rural_fallback": "zero", "clip": "aoi", "threads": 4}"#)
                .unwrap();
        assert_eq!(global.rural_fallback, RuralFallback::Zero);
        assert_eq!(global.clip, ClipExtent::Aoi);
        assert_eq!(global.threads, Some(4));
    }

    #[test]
    fn an_estimator_is_required() {
        let mut config: PipelineConfig = serde_json::from_str(MINIMAL).unwrap();
        config.composite = None;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn paths_resolve_against_the_config_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        fs::write(&path, MINIMAL).unwrap();

        let config = PipelineConfig::from_path(&path).unwrap();
        assert_eq!(config.region.aoi, dir.path().join("nyc.geojson"));
        assert_eq!(config.catalog, dir.path().join("scenes.json"));
        assert_eq!(config.outputs.directory, dir.path().join("output"));
    }
}

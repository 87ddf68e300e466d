// src/processing/pipeline.rs
//! Staged S-UHI pipeline: region, references, estimators, zonal means, compositor.

use std::sync::Arc;

use geo::{Buffer, MultiPolygon};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result, Stage, StageContext};
use crate::feature::{props, Feature};
use crate::processing::estimators::{EstimationContext, LstEstimator};
use crate::processing::parallel::ParallelProcessor;
use crate::processing::reference::{
    area_matched_reference, fixed_reference, validate, BufferSearch, FIXED_BUFFER_DISTANCE,
};
use crate::processing::suhi::{suhi_raster, suhi_scalar, RuralFallback};
use crate::processing::zonal::{ZonalReducer, ZonalStatistic};
use crate::raster::{Mask, Raster, TimeWindow};
use crate::region::{class_mask_for, RegionProvider, NON_URBAN_CLASSES, URBAN_CLASSES};
use crate::sink::{LayerSink, VisParams};
use crate::utils::cache::NodeCache;

pub const FIXED_REFERENCE: &str = "fixed";
pub const MATCHED_REFERENCE: &str = "area_matched";

/// Geometry the estimators clip their output to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipExtent {
    /// The urban boundary only. Rural rings then see no pixels.
    Aoi,
    /// The AOI grown by the widest reference ring
    #[default]
    StudyArea,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub window: TimeWindow,
    pub fixed_distance: f64,
    pub search: BufferSearch,
    pub rural_fallback: RuralFallback,
    pub clip: ClipExtent,
}

impl PipelineSettings {
    pub fn new(window: TimeWindow) -> Self {
        Self {
            window,
            fixed_distance: FIXED_BUFFER_DISTANCE,
            search: BufferSearch::default(),
            rural_fallback: RuralFallback::default(),
            clip: ClipExtent::default(),
        }
    }
}

/// A reference geometry with the name it is reported under
#[derive(Debug, Clone)]
pub struct Reference {
    pub name: String,
    pub feature: Feature,
}

#[derive(Debug, Clone)]
pub struct NamedRaster {
    pub name: String,
    pub raster: Raster,
    pub vis: VisParams,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceSummary {
    pub name: String,
    pub width: Option<f64>,
    pub area: f64,
    pub area_diff: Option<f64>,
}

impl ReferenceSummary {
    fn from_reference(reference: &Reference) -> Self {
        Self {
            name: reference.name.clone(),
            width: reference.feature.property(props::BUFFER_WIDTH),
            area: reference.feature.area(),
            area_diff: reference.feature.property(props::BUFFER_DIFF),
        }
    }
}

/// S-UHI of one estimator against one rural reference
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuhiResult {
    pub estimator: String,
    pub reference: String,
    pub scale: f64,
    pub urban_mean: Option<f64>,
    pub urban_pixels: usize,
    pub rural_mean: Option<f64>,
    pub rural_pixels: usize,
    pub suhi: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuhiReport {
    pub window: TimeWindow,
    pub aoi_area: f64,
    pub references: Vec<ReferenceSummary>,
    pub results: Vec<SuhiResult>,
}

impl SuhiReport {
    /// Result for an estimator and reference pair
    pub fn result(&self, estimator: &str, reference: &str) -> Option<&SuhiResult> {
        self.results
            .iter()
            .find(|r| r.estimator == estimator && r.reference == reference)
    }
}

pub struct PipelineOutput {
    pub report: SuhiReport,
    pub references: Vec<Reference>,
    /// LST per estimator, then S-UHI per estimator and reference
    pub rasters: Vec<NamedRaster>,
}

pub struct SuhiPipeline {
    region: Arc<dyn RegionProvider>,
    estimators: Vec<Box<dyn LstEstimator>>,
    processor: ParallelProcessor,
    settings: PipelineSettings,
    sink: Option<Arc<dyn LayerSink>>,
    cache: NodeCache,
}

impl SuhiPipeline {
    pub fn new(
        region: Arc<dyn RegionProvider>,
        processor: ParallelProcessor,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            region,
            estimators: Vec::new(),
            processor,
            settings,
            sink: None,
            cache: NodeCache::new(),
        }
    }

    pub fn with_estimator(mut self, estimator: Box<dyn LstEstimator>) -> Self {
        self.estimators.push(estimator);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn LayerSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn processor(&self) -> &ParallelProcessor {
        &self.processor
    }

    /// Intermediates memoized by earlier runs
    pub fn cache(&self) -> &NodeCache {
        &self.cache
    }

    pub fn run(&self) -> Result<PipelineOutput> {
        if self.estimators.is_empty() {
            return Err(Error::Config("no LST estimator configured".into()));
        }
        let settings = &self.settings;

        let aoi = self.region.aoi().in_stage(Stage::Region, || "AOI".into())?;
        validate(&aoi.geometry, "AOI").in_stage(Stage::Region, || "AOI".into())?;
        info!(area = aoi.area(), window = %settings.window, "AOI loaded");

        let references = self.references(&aoi)?;
        for reference in &references {
            self.emit(|sink| sink.add_feature(&reference.name, &reference.feature));
        }

        let clip = self.clip_geometry(&aoi, &references)?;
        let occurrence = self
            .cache
            .get_or_try_insert("water_occurrence", || self.region.water_occurrence())
            .in_stage(Stage::Region, || "water occurrence".into())?;
        let landcover = self
            .cache
            .get_or_try_insert("landcover", || self.region.landcover())
            .in_stage(Stage::Region, || "land cover".into())?;

        let ctx = EstimationContext {
            window: settings.window,
            aoi: &aoi.geometry,
            clip: &clip,
            water_occurrence: &occurrence,
            processor: &self.processor,
            cache: &self.cache,
        };

        let estimates = self.processor.install(|| {
            self.estimators
                .par_iter()
                .map(|estimator| {
                    info!(estimator = estimator.name(), "estimating LST");
                    let lst = estimator.estimate(&ctx).in_stage(estimator.stage(), || {
                        format!("{} over {}", estimator.name(), settings.window)
                    })?;
                    let rows =
                        self.composite(&**estimator, &lst, &aoi, &references, &landcover)?;
                    Ok((estimator.name().to_string(), lst, rows))
                })
                .collect::<Result<Vec<_>>>()
        })?;

        let mut results = Vec::new();
        let mut rasters = Vec::new();
        for (name, lst, rows) in estimates {
            let layer = format!("LST {name}");
            self.emit(|sink| sink.add_raster(&layer, &lst, &VisParams::lst()));
            rasters.push(NamedRaster {
                name: layer,
                raster: lst,
                vis: VisParams::lst(),
            });
            for (row, suhi) in rows {
                let layer = format!("S-UHI {} {}", row.estimator, row.reference);
                self.emit(|sink| {
                    sink.add_raster(&layer, &suhi, &VisParams::suhi());
                    sink.print_value(&layer, row.suhi);
                });
                info!(estimator = %row.estimator, reference = %row.reference, suhi = row.suhi, "S-UHI");
                rasters.push(NamedRaster {
                    name: layer,
                    raster: suhi,
                    vis: VisParams::suhi(),
                });
                results.push(row);
            }
        }

        let report = SuhiReport {
            window: settings.window,
            aoi_area: aoi.area(),
            references: references.iter().map(ReferenceSummary::from_reference).collect(),
            results,
        };
        Ok(PipelineOutput {
            report,
            references,
            rasters,
        })
    }

    /// Fixed and area-matched rings, built concurrently
    pub fn references(&self, aoi: &Feature) -> Result<Vec<Reference>> {
        let settings = &self.settings;
        let (fixed, matched) = self.processor.install(|| {
            rayon::join(
                || fixed_reference(aoi, settings.fixed_distance),
                || area_matched_reference(aoi, &settings.search),
            )
        });
        let fixed = fixed.in_stage(Stage::ReferenceGeometry, || {
            format!("fixed ring at {}", settings.fixed_distance)
        })?;
        let matched = matched.in_stage(Stage::ReferenceGeometry, || "area-matched search".into())?;
        Ok(vec![
            Reference {
                name: FIXED_REFERENCE.to_string(),
                feature: fixed,
            },
            Reference {
                name: MATCHED_REFERENCE.to_string(),
                feature: matched,
            },
        ])
    }

    fn clip_geometry(
        &self,
        aoi: &Feature,
        references: &[Reference],
    ) -> Result<Arc<MultiPolygon<f64>>> {
        let extent = self.settings.clip;
        self.cache
            .get_or_try_insert(&format!("clip/{extent:?}"), || match extent {
                ClipExtent::Aoi => Ok(aoi.geometry.clone()),
                ClipExtent::StudyArea => {
                    let widest = references
                        .iter()
                        .filter_map(|r| r.feature.property(props::BUFFER_WIDTH))
                        .fold(self.settings.fixed_distance, f64::max);
                    debug!(distance = widest, "study area buffer");
                    Ok(aoi.geometry.buffer(widest))
                }
            })
            .in_stage(Stage::Region, || "clip geometry".into())
    }

    fn class_mask(
        &self,
        lst: &Raster,
        landcover: &Raster,
        label: &str,
        classes: &[u16],
    ) -> Result<Arc<Mask>> {
        let key = format!("class_mask/{label}/{}", lst.grid_key());
        self.cache
            .get_or_try_insert(&key, || Ok(class_mask_for(lst, landcover, classes)))
    }

    /// Urban mean, then one rural mean and S-UHI per reference
    fn composite(
        &self,
        estimator: &dyn LstEstimator,
        lst: &Raster,
        aoi: &Feature,
        references: &[Reference],
        landcover: &Raster,
    ) -> Result<Vec<(SuhiResult, Raster)>> {
        let name = estimator.name();
        let scale = estimator.zonal_scale();
        let fallback = self.settings.rural_fallback;
        let reducer = ZonalReducer::from_processor(&self.processor);

        let urban_mask = self.class_mask(lst, landcover, "urban", URBAN_CLASSES)?;
        let rural_mask = self.class_mask(lst, landcover, "rural", NON_URBAN_CLASSES)?;

        let urban = reducer
            .reduce_mean(lst, &aoi.geometry, scale, Some(urban_mask.as_ref()))
            .in_stage(Stage::ZonalReduction, || format!("urban mean of {name}"))?;
        let urban_lst = lst.clip(&aoi.geometry);

        references
            .par_iter()
            .map(|reference| {
                let context = || format!("{name} against the {} reference", reference.name);
                let rural = reducer
                    .reduce_mean(lst, &reference.feature.geometry, scale, Some(rural_mask.as_ref()))
                    .in_stage(Stage::ZonalReduction, context)?;
                let suhi =
                    suhi_scalar(&urban, &rural, fallback).in_stage(Stage::Compositor, context)?;
                let raster = suhi_raster(&urban_lst, &urban_mask, &rural, fallback)
                    .in_stage(Stage::Compositor, context)?;
                Ok((result_row(name, &reference.name, scale, &urban, &rural, suhi), raster))
            })
            .collect()
    }

    fn emit(&self, f: impl FnOnce(&dyn LayerSink)) {
        if let Some(sink) = &self.sink {
            f(sink.as_ref());
        }
    }
}

fn result_row(
    estimator: &str,
    reference: &str,
    scale: f64,
    urban: &ZonalStatistic,
    rural: &ZonalStatistic,
    suhi: f64,
) -> SuhiResult {
    SuhiResult {
        estimator: estimator.to_string(),
        reference: reference.to_string(),
        scale,
        urban_mean: urban.value(),
        urban_pixels: urban.count(),
        rural_mean: rural.value(),
        rural_pixels: rural.count(),
        suhi,
    }
}

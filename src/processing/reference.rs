// src/processing/reference.rs
//! Rural reference geometries derived from the urban boundary.

use geo::{Area, BooleanOps, Buffer, MultiPolygon, Validation};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::feature::{props, Feature};

/// Width of the fixed rural ring, in CRS units
pub const FIXED_BUFFER_DISTANCE: f64 = 2000.0;

/// Candidate widths `start, start + step, ...` (`count` of them)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BufferSearch {
    #[serde(default = "default_step")]
    pub start: f64,
    #[serde(default = "default_step")]
    pub step: f64,
    #[serde(default = "default_count")]
    pub count: usize,
}

fn default_step() -> f64 {
    30.0
}

fn default_count() -> usize {
    100
}

impl Default for BufferSearch {
    fn default() -> Self {
        Self {
            start: default_step(),
            step: default_step(),
            count: default_count(),
        }
    }
}

impl BufferSearch {
    pub fn widths(&self) -> Vec<f64> {
        (0..self.count)
            .map(|i| self.start + i as f64 * self.step)
            .collect()
    }
}

/// Reject empty, zero-area or self-intersecting geometry
pub fn validate(geometry: &MultiPolygon<f64>, what: &str) -> Result<()> {
    if geometry.0.is_empty() || geometry.unsigned_area() <= 0.0 {
        return Err(Error::InvalidGeometry(format!("{what} is empty")));
    }
    if !geometry.is_valid() {
        return Err(Error::InvalidGeometry(format!("{what} is not a valid polygon")));
    }
    Ok(())
}

/// `buffer(polygon, distance) - polygon`
pub fn ring(polygon: &MultiPolygon<f64>, distance: f64) -> Result<MultiPolygon<f64>> {
    if !(distance.is_finite() && distance > 0.0) {
        return Err(Error::InvalidGeometry(format!(
            "buffer distance must be positive, got {distance}"
        )));
    }
    let ring = polygon.buffer(distance).difference(polygon);
    validate(&ring, &format!("ring at {distance}"))?;
    Ok(ring)
}

/// Annulus at a fixed distance around the AOI
pub fn fixed_reference(aoi: &Feature, distance: f64) -> Result<Feature> {
    let geometry = ring(&aoi.geometry, distance)?;
    let area = geometry.unsigned_area();
    Ok(Feature::new(geometry)
        .with_property(props::BUFFER_WIDTH, distance)
        .with_property(props::BUFFER_AREA, area)
        .with_property(props::URBAN_AREA, aoi.area()))
}

struct Candidate {
    width: f64,
    geometry: MultiPolygon<f64>,
    area: f64,
    diff: f64,
}

/// Ring whose area best matches the AOI's own area.
///
/// Every candidate width is evaluated; the smallest `|ring area - AOI area|`
/// wins and ties go to the narrower width.
pub fn area_matched_reference(aoi: &Feature, search: &BufferSearch) -> Result<Feature> {
    if search.count == 0 {
        return Err(Error::Config("buffer search needs at least one candidate".into()));
    }
    let urban_area = aoi.area();

    let candidates = search
        .widths()
        .into_par_iter()
        .map(|width| {
            let geometry = ring(&aoi.geometry, width)?;
            let area = geometry.unsigned_area();
            Ok(Candidate {
                width,
                geometry,
                area,
                diff: (area - urban_area).abs(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let best = candidates
        .into_iter()
        .reduce(|best, c| if c.diff < best.diff { c } else { best })
        .ok_or_else(|| Error::InvalidGeometry("no buffer candidate".into()))?;

    debug!(width = best.width, diff = best.diff, "area-matched buffer selected");
    Ok(Feature::new(best.geometry)
        .with_property(props::BUFFER_WIDTH, best.width)
        .with_property(props::BUFFER_AREA, best.area)
        .with_property(props::BUFFER_DIFF, best.diff)
        .with_property(props::URBAN_AREA, urban_area))
}

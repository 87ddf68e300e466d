// src/processing/zonal.rs
//! Zonal reductions of a raster over a polygon.
//!
//! Reductions run on a grid of cell size `scale` anchored at the raster
//! origin. A coarser grid averages the valid source pixels whose centres fall
//! in each cell; an equal or finer grid samples the source pixel under the cell
//! centre. Only cells whose centres lie inside the polygon contribute.

use geo::{BoundingRect, Contains, Coord, MultiPolygon, Point};
use itertools::{Itertools, MinMaxResult};
use rayon::prelude::*;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::processing::parallel::{CancelToken, ParallelProcessor};
use crate::raster::{Mask, Raster};

/// Outcome of a zonal reduction. `NoData` is distinct from a zero value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ZonalStatistic {
    Value { value: f64, count: usize },
    NoData,
}

impl ZonalStatistic {
    pub fn value(&self) -> Option<f64> {
        match self {
            ZonalStatistic::Value { value, .. } => Some(*value),
            ZonalStatistic::NoData => None,
        }
    }

    pub fn count(&self) -> usize {
        match self {
            ZonalStatistic::Value { count, .. } => *count,
            ZonalStatistic::NoData => 0,
        }
    }

    pub fn is_no_data(&self) -> bool {
        matches!(self, ZonalStatistic::NoData)
    }

    /// The value, or `DataUnavailable` described by `what`
    pub fn require(&self, what: impl FnOnce() -> String) -> Result<f64> {
        self.value().ok_or_else(|| Error::DataUnavailable(what()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinMax {
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

/// Output grid window covering the polygon's bounds
struct ZoneGrid {
    origin: Coord<f64>,
    step_x: f64,
    step_y: f64,
    rows: std::ops::Range<usize>,
    cols: std::ops::Range<usize>,
}

impl ZoneGrid {
    fn cell_count(&self) -> usize {
        self.rows.len() * self.cols.len()
    }

    fn center(&self, row: usize, col: usize) -> Coord<f64> {
        Coord {
            x: self.origin.x + (col as f64 + 0.5) * self.step_x,
            y: self.origin.y + (row as f64 + 0.5) * self.step_y,
        }
    }

    fn corners(&self, row: usize, col: usize) -> (Coord<f64>, Coord<f64>) {
        (
            Coord {
                x: self.origin.x + col as f64 * self.step_x,
                y: self.origin.y + row as f64 * self.step_y,
            },
            Coord {
                x: self.origin.x + (col + 1) as f64 * self.step_x,
                y: self.origin.y + (row + 1) as f64 * self.step_y,
            },
        )
    }
}

pub struct ZonalReducer {
    max_pixels: usize,
    cancel: CancelToken,
}

impl ZonalReducer {
    pub fn new(max_pixels: usize, cancel: CancelToken) -> Self {
        Self { max_pixels, cancel }
    }

    pub fn from_processor(processor: &ParallelProcessor) -> Self {
        Self::new(processor.max_pixels(), processor.cancel_token().clone())
    }

    /// Mean of valid cells inside `polygon`, restricted by `mask` when given
    pub fn reduce_mean(
        &self,
        raster: &Raster,
        polygon: &MultiPolygon<f64>,
        scale: f64,
        mask: Option<&Mask>,
    ) -> Result<ZonalStatistic> {
        let values = self.sample(raster, polygon, scale, mask)?;
        if values.is_empty() {
            return Ok(ZonalStatistic::NoData);
        }
        Ok(ZonalStatistic::Value {
            value: values.iter().sum::<f64>() / values.len() as f64,
            count: values.len(),
        })
    }

    /// Combined min and max in one pass, `None` when no cell is valid
    pub fn reduce_min_max(
        &self,
        raster: &Raster,
        polygon: &MultiPolygon<f64>,
        scale: f64,
        mask: Option<&Mask>,
    ) -> Result<Option<MinMax>> {
        let values = self.sample(raster, polygon, scale, mask)?;
        let count = values.len();
        Ok(match values.into_iter().minmax_by(f64::total_cmp) {
            MinMaxResult::NoElements => None,
            MinMaxResult::OneElement(v) => Some(MinMax { min: v, max: v, count }),
            MinMaxResult::MinMax(min, max) => Some(MinMax { min, max, count }),
        })
    }

    fn sample(
        &self,
        raster: &Raster,
        polygon: &MultiPolygon<f64>,
        scale: f64,
        mask: Option<&Mask>,
    ) -> Result<Vec<f64>> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(Error::Config(format!("invalid reduction scale {scale}")));
        }
        if let Some(mask) = mask {
            raster.check_aligned(mask.shape())?;
        }
        let Some(grid) = zone_grid(raster, polygon, scale) else {
            return Ok(Vec::new());
        };

        let cells = grid.cell_count();
        if cells > self.max_pixels {
            return Err(Error::PixelBudgetExceeded {
                requested: cells,
                limit: self.max_pixels,
            });
        }
        self.cancel.check()?;

        let source_px = raster.transform().pixel_size();
        let valid_at = |row: usize, col: usize| -> Option<f64> {
            raster
                .get(row, col)
                .filter(|_| mask.map_or(true, |m| m.get(row, col)))
        };

        let rows = grid
            .rows
            .clone()
            .into_par_iter()
            .map(|row| -> Result<Vec<f64>> {
                self.cancel.check()?;
                let mut out = Vec::new();
                for col in grid.cols.clone() {
                    let center = grid.center(row, col);
                    if !polygon.contains(&Point::from(center)) {
                        continue;
                    }
                    let value = if scale <= source_px {
                        source_cell(raster, center).and_then(|(r, c)| valid_at(r, c))
                    } else {
                        block_mean(raster, grid.corners(row, col), &valid_at)
                    };
                    out.extend(value);
                }
                Ok(out)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(rows.into_iter().flatten().collect())
    }
}

/// Source pixel containing `coord`
fn source_cell(raster: &Raster, coord: Coord<f64>) -> Option<(usize, usize)> {
    let (row, col) = raster.transform().to_pixel(coord);
    if row < 0.0 || col < 0.0 {
        return None;
    }
    let (row, col) = (row.floor() as usize, col.floor() as usize);
    (row < raster.rows() && col < raster.cols()).then_some((row, col))
}

/// Mean of valid source pixels whose centres fall between two cell corners
fn block_mean(
    raster: &Raster,
    (a, b): (Coord<f64>, Coord<f64>),
    valid_at: &impl Fn(usize, usize) -> Option<f64>,
) -> Option<f64> {
    let (ra, ca) = raster.transform().to_pixel(a);
    let (rb, cb) = raster.transform().to_pixel(b);
    let span = |lo: f64, hi: f64, len: usize| {
        // pixel k has its centre at k + 0.5
        let first = (lo.min(hi) - 0.5).ceil().max(0.0) as usize;
        let last = ((lo.max(hi) - 0.5).ceil().max(0.0) as usize).min(len);
        first..last
    };

    let mut sum = 0.0;
    let mut count = 0usize;
    for row in span(ra, rb, raster.rows()) {
        for col in span(ca, cb, raster.cols()) {
            if let Some(v) = valid_at(row, col) {
                sum += v;
                count += 1;
            }
        }
    }
    (count > 0).then(|| sum / count as f64)
}

/// Window of the `scale` grid that overlaps both raster and polygon bounds
fn zone_grid(raster: &Raster, polygon: &MultiPolygon<f64>, scale: f64) -> Option<ZoneGrid> {
    let bounds = polygon.bounding_rect()?;
    let transform = raster.transform();
    let step_x = scale * transform.pixel_width.signum();
    let step_y = scale * transform.pixel_height.signum();
    let total_cols = (raster.cols() as f64 * transform.pixel_width.abs() / scale).ceil() as usize;
    let total_rows = (raster.rows() as f64 * transform.pixel_height.abs() / scale).ceil() as usize;

    let index_range = |lo: f64, hi: f64, origin: f64, step: f64, total: usize| {
        let a = (lo - origin) / step;
        let b = (hi - origin) / step;
        let first = a.min(b).floor().max(0.0);
        let last = a.max(b).floor();
        if last < 0.0 || first >= total as f64 {
            return None;
        }
        Some(first as usize..(last as usize + 1).min(total))
    };

    let cols = index_range(
        bounds.min().x,
        bounds.max().x,
        transform.origin_x,
        step_x,
        total_cols,
    )?;
    let rows = index_range(
        bounds.min().y,
        bounds.max().y,
        transform.origin_y,
        step_y,
        total_rows,
    )?;

    Some(ZoneGrid {
        origin: Coord {
            x: transform.origin_x,
            y: transform.origin_y,
        },
        step_x,
        step_y,
        rows,
        cols,
    })
}

// src/raster/collection.rs
use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, NaiveDate};
use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::processing::parallel::CancelToken;
use crate::raster::{Mask, Raster};

/// Date range (start inclusive, end exclusive) plus an inclusive day-of-year window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    #[serde(default = "default_day_of_year")]
    pub day_of_year: (u32, u32),
}

/// June 1 to August 31 in a non-leap year
fn default_day_of_year() -> (u32, u32) {
    (152, 243)
}

impl TimeWindow {
    pub fn new(start: NaiveDate, end: NaiveDate, day_of_year: (u32, u32)) -> Self {
        Self {
            start,
            end,
            day_of_year,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        let doy = date.ordinal();
        date >= self.start
            && date < self.end
            && doy >= self.day_of_year.0
            && doy <= self.day_of_year.1
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{} doy {}-{}",
            self.start, self.end, self.day_of_year.0, self.day_of_year.1
        )
    }
}

/// Temporal reducer collapsing a band of a collection into one raster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reducer {
    Mean,
    Median,
}

impl Reducer {
    fn apply(self, values: &mut [f64]) -> f64 {
        match self {
            Reducer::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Reducer::Median => {
                values.sort_by(f64::total_cmp);
                let n = values.len();
                if n % 2 == 0 {
                    (values[n / 2 - 1] + values[n / 2]) / 2.0
                } else {
                    values[n / 2]
                }
            }
        }
    }
}

/// One acquisition: named, grid-aligned bands sharing a date
#[derive(Debug, Clone)]
pub struct Scene {
    pub date: NaiveDate,
    pub bands: BTreeMap<String, Raster>,
}

impl Scene {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            bands: BTreeMap::new(),
        }
    }

    pub fn with_band(mut self, name: impl Into<String>, raster: Raster) -> Self {
        self.bands.insert(name.into(), raster);
        self
    }

    pub fn band(&self, name: &str) -> Result<&Raster> {
        self.bands.get(name).ok_or_else(|| Error::MissingBand {
            band: name.to_string(),
            date: self.date.to_string(),
        })
    }

    /// Apply `mask` to every band of the scene
    pub fn update_mask(&self, mask: &Mask) -> Result<Scene> {
        let bands = self
            .bands
            .iter()
            .map(|(name, raster)| Ok((name.clone(), raster.update_mask(mask)?)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(Scene {
            date: self.date,
            bands,
        })
    }
}

/// Ordered scenes of one catalog collection
#[derive(Debug, Clone, Default)]
pub struct Collection {
    id: String,
    scenes: Vec<Scene>,
}

impl Collection {
    pub fn new(id: impl Into<String>, mut scenes: Vec<Scene>) -> Self {
        scenes.sort_by_key(|s| s.date);
        Self {
            id: id.into(),
            scenes,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    /// Scenes dated in `[start, end)`
    pub fn filter_date(&self, start: NaiveDate, end: NaiveDate) -> Collection {
        self.filtered(|s| s.date >= start && s.date < end)
    }

    /// Scenes whose day of year lies in the inclusive window
    pub fn filter_day_of_year(&self, first: u32, last: u32) -> Collection {
        self.filtered(|s| (first..=last).contains(&s.date.ordinal()))
    }

    pub fn filter_window(&self, window: &TimeWindow) -> Collection {
        self.filtered(|s| window.contains(s.date))
    }

    fn filtered(&self, keep: impl Fn(&Scene) -> bool) -> Collection {
        Collection {
            id: self.id.clone(),
            scenes: self.scenes.iter().filter(|s| keep(s)).cloned().collect(),
        }
    }

    /// Transform every scene, failing on the first error
    pub fn map_scenes(&self, f: impl Fn(&Scene) -> Result<Scene>) -> Result<Collection> {
        Ok(Collection {
            id: self.id.clone(),
            scenes: self.scenes.iter().map(f).collect::<Result<_>>()?,
        })
    }

    /// Collapse `band` over time. A cell is valid when at least one scene has
    /// a valid value there; the reducer only sees valid values. Every scene
    /// must share the first scene's grid.
    pub fn reduce(&self, band: &str, reducer: Reducer, cancel: &CancelToken) -> Result<Raster> {
        let first = match self.scenes.first() {
            Some(scene) => scene.band(band)?,
            None => {
                return Err(Error::EmptyInputCollection {
                    collection: self.id.clone(),
                    window: format!("band {band}"),
                })
            }
        };
        let rasters = self
            .scenes
            .iter()
            .map(|s| {
                let raster = s.band(band)?;
                first.check_grid(raster)?;
                Ok(raster)
            })
            .collect::<Result<Vec<_>>>()?;
        cancel.check()?;

        let reduced: Array2<f64> = Zip::indexed(first.values()).par_map_collect(|(row, col), _| {
            if cancel.is_cancelled() {
                return f64::NAN;
            }
            let mut stack: Vec<f64> = rasters.iter().filter_map(|r| r.get(row, col)).collect();
            if stack.is_empty() {
                f64::NAN
            } else {
                reducer.apply(&mut stack)
            }
        });
        cancel.check()?;

        let mut out = Raster::new(reduced, *first.transform());
        if let Some(crs) = first.crs() {
            out = out.with_crs(crs);
        }
        Ok(out)
    }
}

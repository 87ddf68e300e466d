// src/sink.rs
//! Inspection sink for intermediate layers and values.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::feature::Feature;
use crate::raster::Raster;

/// Display style of a raster layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisParams {
    pub min: f64,
    pub max: f64,
    pub palette: Vec<String>,
}

impl VisParams {
    pub fn new(min: f64, max: f64, palette: &[&str]) -> Self {
        Self {
            min,
            max,
            palette: palette.iter().map(|c| c.to_string()).collect(),
        }
    }

    /// Blue to red ramp for summer LST in Celsius
    pub fn lst() -> Self {
        Self::new(
            10.0,
            45.0,
            &[
                "040274", "0602ff", "30c8e2", "3be285", "fff705", "ff8b13", "ff0000", "911003",
            ],
        )
    }

    /// Diverging ramp for S-UHI intensity in Celsius
    pub fn suhi() -> Self {
        Self::new(-5.0, 10.0, &["313695", "ffffbf", "a50026"])
    }
}

impl Default for VisParams {
    fn default() -> Self {
        Self::lst()
    }
}

/// Receives layers for display or inspection
pub trait LayerSink: Send + Sync {
    fn add_raster(&self, name: &str, raster: &Raster, vis: &VisParams);

    fn add_feature(&self, name: &str, feature: &Feature);

    fn print_value(&self, name: &str, value: f64);
}

/// Writes layer summaries to the log
#[derive(Debug, Default)]
pub struct LogSink;

impl LayerSink for LogSink {
    fn add_raster(&self, name: &str, raster: &Raster, vis: &VisParams) {
        match raster.summary() {
            Some((min, max, mean)) => info!(
                layer = name,
                valid = raster.valid_count(),
                min,
                max,
                mean,
                vis_min = vis.min,
                vis_max = vis.max,
                "raster layer"
            ),
            None => info!(layer = name, "raster layer has no valid pixels"),
        }
    }

    fn add_feature(&self, name: &str, feature: &Feature) {
        info!(layer = name, area = feature.area(), properties = ?feature.properties, "feature layer");
    }

    fn print_value(&self, name: &str, value: f64) {
        info!(name, value, "value");
    }
}

/// Entry kept by [`RecordingSink`]
#[derive(Debug, Clone, PartialEq)]
pub enum Layer {
    Raster { name: String, valid: usize },
    Feature { name: String },
    Value { name: String, value: f64 },
}

/// Keeps every layer it receives, in order
#[derive(Debug, Default)]
pub struct RecordingSink {
    layers: Mutex<Vec<Layer>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layers(&self) -> Vec<Layer> {
        self.layers.lock().clone()
    }

    /// Value printed under `name`, if any
    pub fn value(&self, name: &str) -> Option<f64> {
        self.layers.lock().iter().find_map(|layer| match layer {
            Layer::Value { name: n, value } if n == name => Some(*value),
            _ => None,
        })
    }
}

impl LayerSink for RecordingSink {
    fn add_raster(&self, name: &str, raster: &Raster, _vis: &VisParams) {
        self.layers.lock().push(Layer::Raster {
            name: name.to_string(),
            valid: raster.valid_count(),
        });
    }

    fn add_feature(&self, name: &str, _feature: &Feature) {
        self.layers.lock().push(Layer::Feature {
            name: name.to_string(),
        });
    }

    fn print_value(&self, name: &str, value: f64) {
        self.layers.lock().push(Layer::Value {
            name: name.to_string(),
            value,
        });
    }
}

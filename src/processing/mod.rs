// src/processing/mod.rs
pub mod estimators;
pub mod indices;
pub mod parallel;
pub mod pipeline;
pub mod reference;
pub mod suhi;
pub mod zonal;

// Re-export main components
pub use parallel::{CancelToken, IndexCalculator, ParallelProcessor};
pub use pipeline::{PipelineOutput, PipelineSettings, SuhiPipeline, SuhiReport};
pub use zonal::{ZonalReducer, ZonalStatistic};

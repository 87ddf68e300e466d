// src/processing/parallel.rs
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::error::{Error, Result};
use crate::raster::{Collection, Raster, Reducer};

/// Default ceiling on the number of cells a single kernel or reduction may touch
pub const DEFAULT_MAX_PIXELS: usize = 100_000_000;

/// Shared flag used to abandon long-running computations
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once `cancel` has been called
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

pub struct ParallelProcessor {
    threads: usize,
    pool: ThreadPool,
    max_pixels: usize,
    cancel: CancelToken,
}

impl ParallelProcessor {
    pub fn new(threads: Option<usize>) -> Result<Self> {
        let threads = threads.unwrap_or_else(num_cpus::get).max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("suhi-worker-{i}"))
            .build()
            .map_err(|e| Error::Config(format!("failed to build thread pool: {e}")))?;

        Ok(Self {
            threads,
            pool,
            max_pixels: DEFAULT_MAX_PIXELS,
            cancel: CancelToken::new(),
        })
    }

    pub fn with_max_pixels(mut self, max_pixels: usize) -> Self {
        self.max_pixels = max_pixels;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn max_pixels(&self) -> usize {
        self.max_pixels
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn check_budget(&self, pixels: usize) -> Result<()> {
        if pixels > self.max_pixels {
            return Err(Error::PixelBudgetExceeded {
                requested: pixels,
                limit: self.max_pixels,
            });
        }
        Ok(())
    }

    /// Run `f` on the processor's thread pool
    pub fn install<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        self.pool.install(f)
    }

    /// Run a per-pixel kernel over aligned input rasters
    pub fn process<I: IndexCalculator + ?Sized>(
        &self,
        calculator: &I,
        inputs: &[&Raster],
    ) -> Result<Raster> {
        if inputs.len() < calculator.required_bands() {
            return Err(Error::Config(format!(
                "not enough input bands for {}: required {}, provided {}",
                calculator.name(),
                calculator.required_bands(),
                inputs.len()
            )));
        }

        let first = inputs.first().ok_or_else(|| {
            Error::Config(format!("{} received no input rasters", calculator.name()))
        })?;
        for input in &inputs[1..] {
            first.check_grid(input)?;
        }
        let (rows, cols) = first.shape();
        self.check_budget(rows * cols)?;
        self.cancel.check()?;

        debug!(kernel = calculator.name(), rows, cols, "running kernel");
        let result = self.install(|| calculator.calculate(inputs))?;

        self.cancel.check()?;
        Ok(result)
    }
}

impl ParallelProcessor {
    /// Temporal reduction of one band of `collection`, budgeted and cancellable
    pub fn reduce(&self, collection: &Collection, band: &str, reducer: Reducer) -> Result<Raster> {
        if let Some(scene) = collection.scenes().first() {
            self.check_budget(scene.band(band)?.len())?;
        }
        self.cancel.check()?;

        debug!(collection = collection.id(), band, scenes = collection.len(), "temporal reduction");
        self.install(|| collection.reduce(band, reducer, &self.cancel))
    }
}

/// Per-pixel raster kernel
pub trait IndexCalculator: Send + Sync {
    /// Calculate the output raster from aligned input rasters
    fn calculate(&self, inputs: &[&Raster]) -> Result<Raster>;

    /// Return the number of required input rasters
    fn required_bands(&self) -> usize;

    /// Return the name of the kernel
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::indices::Ndvi;
    use crate::raster::{GeoTransform, Scene};
    use chrono::NaiveDate;

    struct Doubler;

    impl IndexCalculator for Doubler {
        fn calculate(&self, inputs: &[&Raster]) -> Result<Raster> {
            Ok(inputs[0].scale(2.0))
        }

        fn required_bands(&self) -> usize {
            1
        }

        fn name(&self) -> &str {
            "doubler"
        }
    }

    /// Kernel that declares no inputs
    struct Constant;

    impl IndexCalculator for Constant {
        fn calculate(&self, inputs: &[&Raster]) -> Result<Raster> {
            Ok(inputs[0].map(|_| 1.0))
        }

        fn required_bands(&self) -> usize {
            0
        }

        fn name(&self) -> &str {
            "constant"
        }
    }

    fn scene(day: u32, kelvin: f64, transform: GeoTransform) -> Scene {
        let date = NaiveDate::from_ymd_opt(2020, 7, day).unwrap();
        Scene::new(date).with_band("LST", Raster::filled(4, 4, kelvin, transform))
    }

    #[test]
    fn kernel_without_inputs_is_rejected() {
        let processor = ParallelProcessor::new(Some(1)).unwrap();
        assert!(matches!(processor.process(&Constant, &[]), Err(Error::Config(_))));
    }

    #[test]
    fn inputs_on_different_footprints_are_rejected() {
        let processor = ParallelProcessor::new(Some(2)).unwrap();
        let nir = Raster::filled(4, 4, 0.5, GeoTransform::new(0.0, 4.0, 1.0, -1.0));
        let red = Raster::filled(4, 4, 0.1, GeoTransform::new(1000.0, 4.0, 1.0, -1.0));
        assert!(matches!(
            processor.process(&Ndvi::new(0, 1, None), &[&nir, &red]),
            Err(Error::GridMismatch { .. })
        ));
    }

    #[test]
    fn reduction_is_budgeted_and_cancellable() {
        let grid = GeoTransform::new(0.0, 4.0, 1.0, -1.0);
        let scenes = Collection::new("modis", vec![scene(1, 300.0, grid), scene(9, 310.0, grid)]);

        let processor = ParallelProcessor::new(Some(2)).unwrap();
        let mean = processor.reduce(&scenes, "LST", Reducer::Mean).unwrap();
        assert_eq!(mean.get(2, 2), Some(305.0));

        let small = ParallelProcessor::new(Some(1)).unwrap().with_max_pixels(8);
        assert!(matches!(
            small.reduce(&scenes, "LST", Reducer::Mean),
            Err(Error::PixelBudgetExceeded { requested: 16, limit: 8 })
        ));

        let token = CancelToken::new();
        token.cancel();
        let cancelled = ParallelProcessor::new(Some(1)).unwrap().with_cancel_token(token);
        assert!(matches!(
            cancelled.reduce(&scenes, "LST", Reducer::Mean),
            Err(Error::Cancelled)
        ));
    }

    #[test]
    fn rejects_missing_inputs() {
        let processor = ParallelProcessor::new(Some(2)).unwrap();
        assert!(matches!(processor.process(&Doubler, &[]), Err(Error::Config(_))));
    }

    #[test]
    fn enforces_pixel_budget() {
        let processor = ParallelProcessor::new(Some(1)).unwrap().with_max_pixels(10);
        let raster = Raster::filled(4, 4, 1.0, GeoTransform::default());
        assert!(matches!(
            processor.process(&Doubler, &[&raster]),
            Err(Error::PixelBudgetExceeded { requested: 16, limit: 10 })
        ));
    }

    #[test]
    fn cancelled_processor_stops() {
        let token = CancelToken::new();
        let processor = ParallelProcessor::new(Some(1))
            .unwrap()
            .with_cancel_token(token.clone());
        let raster = Raster::filled(2, 2, 1.0, GeoTransform::default());

        assert!(processor.process(&Doubler, &[&raster]).is_ok());
        token.cancel();
        assert!(matches!(
            processor.process(&Doubler, &[&raster]),
            Err(Error::Cancelled)
        ));
    }
}

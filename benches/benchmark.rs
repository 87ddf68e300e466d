// benches/benchmark.rs
use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use geo::{Coord, MultiPolygon, Rect};
use suhi_calc::feature::Feature;
use suhi_calc::processing::indices::Ndvi;
use suhi_calc::processing::parallel::{IndexCalculator, ParallelProcessor};
use suhi_calc::processing::reference::{area_matched_reference, BufferSearch};
use suhi_calc::processing::zonal::ZonalReducer;
use suhi_calc::raster::{GeoTransform, Raster};

const SIZE: usize = 1024;

fn band(base: f64, modulo: usize) -> Raster {
    let data = (0..SIZE * SIZE).map(|i| base + (i % modulo) as f64).collect();
    Raster::from_vec(data, SIZE, SIZE, GeoTransform::new(0.0, SIZE as f64 * 30.0, 30.0, -30.0))
        .unwrap()
}

fn city(side: f64) -> MultiPolygon<f64> {
    Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: side, y: side })
        .to_polygon()
        .into()
}

/// NDVI kernel in isolation and through the processor's pool
fn benchmark_ndvi(c: &mut Criterion) {
    let nir = band(5000.0, 100);
    let red = band(2500.0, 50);
    let ndvi = Ndvi::new(0, 1, None);
    let processor = ParallelProcessor::new(None).unwrap();

    c.bench_function("ndvi_kernel", |b| {
        b.iter(|| ndvi.calculate(black_box(&[&nir, &red])))
    });
    c.bench_function("ndvi_processor", |b| {
        b.iter(|| processor.process(&ndvi, black_box(&[&nir, &red])))
    });
}

/// Zonal mean at source resolution and aggregated to 1 km
fn benchmark_zonal(c: &mut Criterion) {
    let lst = band(20.0, 17);
    let aoi = city(SIZE as f64 * 30.0 * 0.75);
    let processor = ParallelProcessor::new(None).unwrap();
    let reducer = ZonalReducer::from_processor(&processor);

    c.bench_function("zonal_mean_30m", |b| {
        b.iter(|| processor.install(|| reducer.reduce_mean(black_box(&lst), &aoi, 30.0, None)))
    });
    c.bench_function("zonal_mean_1km", |b| {
        b.iter(|| processor.install(|| reducer.reduce_mean(black_box(&lst), &aoi, 1000.0, None)))
    });
}

fn benchmark_buffer_search(c: &mut Criterion) {
    let aoi = Feature::new(city(10_000.0));
    let search = BufferSearch::default();
    let mut group = c.benchmark_group("reference");
    group.sample_size(10);
    group.bench_function("area_matched_search", |b| {
        b.iter(|| area_matched_reference(black_box(&aoi), &search))
    });
    group.finish();
}

criterion_group!(benches, benchmark_ndvi, benchmark_zonal, benchmark_buffer_search);
criterion_main!(benches);

//! Benchmarks for colorization, PNG encoding and figure compositing.
//!
//! Run with: cargo bench --package renderer --bench render_benchmarks

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use pipeline::{processors, Layer};
use renderer::colormap::{colorize, Colormap};
use renderer::png::create_png_auto;
use renderer::{quickmap, Fig3dSettings, Figure3d};
use test_utils::cone_dem;
use topoviz_common::RasterGrid;

const SIZES: [usize; 3] = [64, 256, 512];

fn bench_colorize(c: &mut Criterion) {
    let mut group = c.benchmark_group("colorize");
    let cmap = Colormap::by_name("terrain").unwrap();

    for size in SIZES {
        let dem = cone_dem(size, size, 500.0);
        group.throughput(Throughput::Elements((size * size) as u64));
        group.bench_with_input(BenchmarkId::new("terrain", size), &dem, |b, dem| {
            b.iter(|| black_box(colorize(dem, 0.0, 500.0, &cmap, 1.0)));
        });
    }

    group.finish();
}

fn bench_png_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("png_encoding");
    let gray = Colormap::by_name("gray").unwrap();
    let terrain = Colormap::by_name("terrain").unwrap();

    for size in SIZES {
        let dem = cone_dem(size, size, 500.0);
        let shaded = colorize(&dem, 0.0, 500.0, &gray, 1.0);
        let colored = colorize(&dem, 0.0, 500.0, &terrain, 1.0);
        group.throughput(Throughput::Bytes((size * size * 4) as u64));
        group.bench_with_input(BenchmarkId::new("indexed_gray", size), &shaded, |b, pixels| {
            b.iter(|| black_box(create_png_auto(pixels, size, size, &[]).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("rgba_terrain", size), &colored, |b, pixels| {
            b.iter(|| black_box(create_png_auto(pixels, size, size, &[]).unwrap()));
        });
    }

    group.finish();
}

fn shaded_dem(size: usize) -> Layer {
    Layer::builder(RasterGrid::new(cone_dem(size, size, 500.0), 30.0))
        .name("dem")
        .cbar("Elevation (m)")
        .processor(processors::hillshade_processor(315.0, 50.0, 1.0, true))
        .build()
        .unwrap()
}

fn bench_figures(c: &mut Criterion) {
    let mut group = c.benchmark_group("figures");
    group.sample_size(10);

    for size in [64, 256] {
        group.bench_with_input(BenchmarkId::new("quickmap_png", size), &size, |b, &size| {
            b.iter(|| {
                let fig = quickmap(vec![shaded_dem(size)]).unwrap();
                black_box(fig.to_png().unwrap())
            });
        });
        group.bench_with_input(BenchmarkId::new("scene_render", size), &size, |b, &size| {
            b.iter(|| {
                let mut fig = Figure3d::new(Fig3dSettings {
                    window_size: (640, 480),
                    ..Fig3dSettings::default()
                });
                fig.add_maps(vec![shaded_dem(size)], None).unwrap();
                black_box(fig.render().unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_colorize, bench_png_encoding, bench_figures);
criterion_main!(benches);

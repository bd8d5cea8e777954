use criterion::{black_box, criterion_group, criterion_main, Criterion, BenchmarkId};
use fieldmosaic_rs::image_pipeline::{
    BinToGeoTiffPipeline, CpuDebayer, FrameShape, FrameTelemetry, PipelineConfig, RasterWriteOptions, RawFrame,
    SensorSide, TiffCompression,
};
use fieldmosaic_rs::image_pipeline::telemetry::Vec3;

fn generate_mock_bayer_data(width: usize, height: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            data.push(((x * 3 + y * 5) % 256) as u8);
        }
    }
    data
}

fn telemetry(shape: FrameShape) -> FrameTelemetry {
    let mut telemetry = FrameTelemetry::new(Vec3::new(10.0, 5.0, 1.5), Vec3::new(0.877, 2.276, 0.0));
    telemetry.left_shape = Some(shape);
    telemetry
}

fn benchmark_debayer_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("debayer_by_size");

    let sizes = vec![(256, 256, "256x256"), (1024, 768, "1024x768"), (3296, 2472, "3296x2472")];

    for (width, height, label) in sizes {
        let frame = RawFrame {
            width,
            height,
            data: generate_mock_bayer_data(width, height),
        };
        group.bench_with_input(BenchmarkId::from_parameter(label), &frame, |b, frame| {
            let debayer = CpuDebayer::new();
            b.iter(|| debayer.process(black_box(frame)));
        });
    }

    group.finish();
}

fn benchmark_compression_methods(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_to_geotiff");
    let shape = FrameShape { width: 1024, height: 768 };
    let data = generate_mock_bayer_data(shape.width, shape.height);
    let telemetry = telemetry(shape);

    let compressions = vec![
        (TiffCompression::None, "none"),
        (TiffCompression::Lzw, "lzw"),
        (TiffCompression::DeflateFast, "deflate_fast"),
    ];

    for (compression, label) in compressions {
        group.bench_with_input(BenchmarkId::from_parameter(label), &data, |b, data| {
            let config = PipelineConfig::builder()
                .write_options(RasterWriteOptions::builder().compression(compression).build())
                .build();
            let pipeline = BinToGeoTiffPipeline::new(&config);

            b.iter(|| {
                let mut output = Vec::new();
                let _ = pipeline.convert(black_box(data), &telemetry, SensorSide::Left, &mut output);
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_debayer_sizes, benchmark_compression_methods);
criterion_main!(benches);

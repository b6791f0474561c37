use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{Rgba, RgbaImage};
use snapshot_service::utils::output_filename;
use snapshot_service::{
    validate, BitmapEncoder, CaptureDefaults, OutputFormat, ParamValue, RawBitmap, RawCaptureParams,
};
use std::collections::HashMap;
use std::io::Cursor;
use std::time::Duration;

// Fast settings for all benchmarks
fn configure_fast_group(group: &mut criterion::BenchmarkGroup<criterion::measurement::WallTime>) {
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_millis(500));
    group.sample_size(20);
}

fn page_like_png(width: u32, height: u32) -> RawBitmap {
    // Flat bands with a little detail, roughly what a rendered page compresses like
    let img = RgbaImage::from_fn(width, height, |x, y| {
        let band = (y / 40) as u8;
        let detail = if (x / 8 + y / 8) % 7 == 0 { 60 } else { 0 };
        Rgba([240 - band.wrapping_mul(3) - detail, 240 - detail, 245, 255])
    });
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .expect("encode benchmark input");
    RawBitmap(buf)
}

fn benchmark_validation(c: &mut Criterion) {
    let mut group = c.benchmark_group("validation");
    configure_fast_group(&mut group);

    let defaults = CaptureDefaults::default();
    let query: HashMap<String, String> = [
        ("url", "https://example.com/docs?page=2"),
        ("width", "1280"),
        ("height", "720"),
        ("quality", "85"),
        ("fullPage", "true"),
        ("waitUntil", "load"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    group.bench_function("query", |b| {
        b.iter(|| {
            let raw = RawCaptureParams::from_query(black_box(&query));
            let _ = black_box(validate(raw, &defaults));
        });
    });

    group.bench_function("rejected_url", |b| {
        b.iter(|| {
            let raw = RawCaptureParams {
                url: Some(ParamValue::Text("not-a-url".to_string())),
                ..Default::default()
            };
            let _ = black_box(validate(raw, &defaults));
        });
    });

    group.finish();
}

fn benchmark_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("encoding");
    configure_fast_group(&mut group);

    let raw = page_like_png(800, 600);

    for format in [OutputFormat::Jpeg, OutputFormat::Webp, OutputFormat::Png] {
        let encoder = BitmapEncoder::new(format);
        group.bench_with_input(BenchmarkId::new("800x600", format.extension()), &raw, |b, raw| {
            b.iter(|| {
                let _ = black_box(encoder.encode(raw, 80));
            });
        });
    }

    let encoder = BitmapEncoder::new(OutputFormat::Jpeg);
    for quality in [30u8, 80, 100] {
        group.bench_with_input(BenchmarkId::new("jpeg_quality", quality), &quality, |b, &quality| {
            b.iter(|| {
                let _ = black_box(encoder.encode(&raw, quality));
            });
        });
    }

    group.finish();
}

fn benchmark_output_filename(c: &mut Criterion) {
    let mut group = c.benchmark_group("output_filename");
    configure_fast_group(&mut group);

    let url = url::Url::parse("https://example.com/a/long/path with spaces/index.html").expect("valid url");

    group.bench_function("sanitize", |b| {
        b.iter(|| black_box(output_filename(black_box(&url), OutputFormat::Jpeg)));
    });

    group.finish();
}

criterion_group!(benches, benchmark_validation, benchmark_encoding, benchmark_output_filename);
criterion_main!(benches);

//! Criterion microbenches for dsport's YOLO label codec.
//!
//! Run with: `cargo bench`
//!
//! These benchmarks measure the performance of:
//! - Annotation file decoding (parse_annotation_text)
//! - Label line encoding (format_label_line)

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;
use std::path::Path;

use dsport::ir::io_yolo::{format_label_line, parse_annotation_text, YoloLabelRow};
use dsport::ir::{Annotation, Image, LabelCategories};

const LABEL_FIXTURE: &str = "0 0.512500 0.431250 0.200000 0.312500
1 0.125000 0.250000 0.050000 0.100000
2 0.900000 0.900000 0.100000 0.100000

0 0.333333 0.666667 0.250000 0.125000
3 0.500000 0.500000 1.000000 1.000000
";

fn categories() -> LabelCategories {
    LabelCategories::from_names(["person", "car", "dog", "bicycle"]).expect("valid names")
}

/// Benchmark decoding a whole annotation file against a known image size.
fn bench_label_decode(c: &mut Criterion) {
    let categories = categories();
    let image = Image::from_info(Some((480, 640)), Some("jpg"));

    let mut group = c.benchmark_group("yolo_decode");
    group.throughput(Throughput::Bytes(LABEL_FIXTURE.len() as u64));

    group.bench_function("parse_annotation_text", |b| {
        b.iter(|| {
            let anns = parse_annotation_text(
                black_box(LABEL_FIXTURE),
                Path::new("bench.txt"),
                &image,
                &categories,
            )
            .unwrap();
            black_box(anns)
        })
    });

    group.finish();
}

/// Benchmark encoding pixel boxes back into label lines.
fn bench_label_encode(c: &mut Criterion) {
    let annotations: Vec<Annotation> = (0..64)
        .map(|i| Annotation::bbox(i as f64 * 4.0, i as f64 * 3.0, 32.0, 24.0, i % 4))
        .collect();

    let mut group = c.benchmark_group("yolo_encode");
    group.throughput(Throughput::Elements(annotations.len() as u64));

    group.bench_function("format_label_line", |b| {
        b.iter(|| {
            let mut out = String::new();
            for ann in black_box(&annotations) {
                let row = YoloLabelRow::from_annotation(ann, 640.0, 480.0);
                out.push_str(&format_label_line(&row));
                out.push('\n');
            }
            black_box(out)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_label_decode, bench_label_encode);
criterion_main!(benches);

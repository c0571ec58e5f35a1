#![allow(dead_code)]

use dsport::ir::{Annotation, Dataset, DatasetItem, Image, LabelCategories};
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

/// Label files keep six decimals of normalized coordinates.
pub fn eps_yolo(image_w: u32, image_h: u32) -> f64 {
    image_w.max(image_h) as f64 * 1e-6
}

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

/// `(width, height)` of a plausible image.
pub fn arb_image_size() -> impl Strategy<Value = (u32, u32)> {
    (1u32..=4096, 1u32..=4096)
}

/// A box with positive size fully inside a `width` x `height` image.
pub fn arb_bbox_within(width: u32, height: u32, label_count: usize) -> BoxedStrategy<Annotation> {
    let (w, h) = (width as f64, height as f64);
    (0.0..1.0f64, 0.0..1.0f64, 0.01..1.0f64, 0.01..1.0f64, 0..label_count)
        .prop_map(move |(fx, fy, fw, fh, label)| {
            let bw = fw * w;
            let bh = fh * h;
            let x = fx * (w - bw);
            let y = fy * (h - bh);
            Annotation::bbox(x, y, bw, bh, label)
        })
        .boxed()
}

fn arb_item(index: usize, label_count: usize, max_anns: usize) -> BoxedStrategy<DatasetItem> {
    arb_image_size()
        .prop_flat_map(move |(width, height)| {
            (
                Just((width, height)),
                prop::collection::vec(arb_bbox_within(width, height, label_count), 0..=max_anns),
            )
        })
        .prop_map(move |((width, height), annotations)| {
            DatasetItem::new(format!("item_{index:03}"), "train")
                .with_media(Image::from_info(Some((height, width)), Some("jpg")))
                .with_annotations(annotations)
        })
        .boxed()
}

/// A single-subset dataset whose images exist only as known sizes.
pub fn arb_dataset(max_items: usize, max_labels: usize, max_anns: usize) -> BoxedStrategy<Dataset> {
    (1..=max_labels, 1..=max_items)
        .prop_flat_map(move |(label_count, item_count)| {
            (0..item_count)
                .map(|index| arb_item(index, label_count, max_anns))
                .collect::<Vec<_>>()
                .prop_map(move |items| {
                    let names = (0..label_count).map(|i| format!("label_{i}"));
                    let mut dataset = Dataset::new(LabelCategories::from_names(names).unwrap());
                    for item in items {
                        dataset.add_item(item);
                    }
                    dataset
                })
        })
        .boxed()
}

/// Compares boxes item by item, allowing `eps` pixels of drift per field.
pub fn assert_boxes_equivalent(a: &Dataset, b: &Dataset) -> Result<(), String> {
    let left: Vec<&DatasetItem> = a.items().collect();
    let right: Vec<&DatasetItem> = b.items().collect();
    if left.len() != right.len() {
        return Err(format!("item count {} != {}", left.len(), right.len()));
    }

    for (x, y) in left.iter().zip(&right) {
        if x.id != y.id || x.subset != y.subset {
            return Err(format!("item {}/{} != {}/{}", x.subset, x.id, y.subset, y.id));
        }
        if x.annotations.len() != y.annotations.len() {
            return Err(format!("item {}: annotation count differs", x.id));
        }

        let (height, width) = x
            .media
            .as_ref()
            .and_then(|media| media.size().ok().flatten())
            .ok_or_else(|| format!("item {}: no image size", x.id))?;
        let eps = eps_yolo(width, height);

        for (p, q) in x.annotations.iter().zip(&y.annotations) {
            let drift = [
                (p.bbox.x - q.bbox.x).abs(),
                (p.bbox.y - q.bbox.y).abs(),
                (p.bbox.w - q.bbox.w).abs(),
                (p.bbox.h - q.bbox.h).abs(),
            ];
            if p.label != q.label || drift.iter().any(|d| *d > eps) {
                return Err(format!("item {}: {:?} != {:?} (eps {eps})", x.id, p, q));
            }
        }
    }
    Ok(())
}

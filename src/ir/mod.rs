//! In-memory dataset model and on-disk codecs.
//!
//! The model is deliberately small: a [`Dataset`] holds named subsets of
//! [`DatasetItem`]s, each with optional [`Media`] and a list of labeled
//! bounding boxes in pixel units. Labels are indices into one shared
//! [`LabelCategories`].
//!
//! # Example
//!
//! ```
//! use dsport::ir::{Annotation, Dataset, DatasetItem, Image, LabelCategories};
//!
//! let categories = LabelCategories::from_names(["person", "car"]).unwrap();
//! let mut dataset = Dataset::new(categories);
//! dataset.add_item(
//!     DatasetItem::new("frame_0001", "train")
//!         .with_media(Image::from_info(Some((480, 640)), Some("jpg")))
//!         .with_annotation(Annotation::bbox(10.0, 20.0, 100.0, 50.0, 1)),
//! );
//! assert_eq!(dataset.len(), 1);
//! ```

mod bbox;
pub mod categories;
pub mod image_meta;
pub mod io_yolo;
pub mod io_yolo_loose;
mod media;
mod model;
mod space;

pub use bbox::BBoxXYWH;
pub use categories::LabelCategories;
pub use image_meta::{ImageInfoSource, ImageMeta};
pub use media::{normalize_ext, Crypter, Image, Media, NullCrypter, PointCloud};
pub use model::{
    Annotation, Dataset, DatasetItem, ItemLoader, ItemRef, ItemSlot, Subset, DEFAULT_SUBSET_NAME,
};
pub use space::{Normalized, Pixel};

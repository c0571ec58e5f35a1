//! Dataset export: shared per-run context and the `convert`/`patch` entry
//! points.
//!
//! An [`Exporter`] knows one on-disk format. [`convert`] writes a fresh copy
//! of a dataset into a directory that is absent or safe to overwrite.
//! [`patch`] reaches the same end state but goes through
//! [`publish::publish_dir`], so an existing directory is only replaced once
//! the new copy has been written completely.

pub mod publish;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::warn;

use crate::error::DsportError;
use crate::ir::{normalize_ext, Crypter, Dataset, DatasetItem, Image, ItemRef, Media, NullCrypter};
use crate::policy::ErrorPolicy;

/// Caller-facing export knobs.
#[derive(Clone, Debug, Default)]
pub struct ExportOptions {
    /// Copy media bytes next to the annotations.
    pub save_media: bool,
    /// Forces this extension for every saved image.
    pub image_ext: Option<String>,
    /// Replaces the format's default image extension.
    pub default_image_ext: Option<String>,
    /// Also write `dataset_meta.json`.
    pub save_dataset_meta: bool,
    /// Image directory, relative to the save directory.
    pub images_dir: Option<PathBuf>,
    /// Point cloud directory, relative to the save directory.
    pub pcd_dir: Option<PathBuf>,
    /// Applied to images saved with encryption requested.
    pub crypter: Option<Arc<dyn Crypter>>,
}

/// How an item changed since the dataset was last written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemStatus {
    Added,
    Modified,
    Removed,
}

/// Item-level changes handed to [`patch`].
#[derive(Clone, Debug, Default)]
pub struct DatasetPatch {
    updated_items: BTreeMap<ItemRef, ItemStatus>,
}

impl DatasetPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, item: ItemRef, status: ItemStatus) {
        self.updated_items.insert(item, status);
    }

    pub fn status(&self, item: &ItemRef) -> Option<ItemStatus> {
        self.updated_items.get(item).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ItemRef, ItemStatus)> {
        self.updated_items.iter().map(|(item, status)| (item, *status))
    }

    pub fn removed(&self) -> impl Iterator<Item = &ItemRef> {
        self.iter()
            .filter(|(_, status)| *status == ItemStatus::Removed)
            .map(|(item, _)| item)
    }

    pub fn len(&self) -> usize {
        self.updated_items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updated_items.is_empty()
    }
}

/// Everything one export run needs, fixed at construction.
///
/// Holds no mutable state, so a clone can be handed to each worker of a
/// fanned-out export.
#[derive(Clone)]
pub struct ExportContext {
    save_dir: PathBuf,
    save_media: bool,
    images_dir: PathBuf,
    pcd_dir: PathBuf,
    crypter: Arc<dyn Crypter>,
    image_ext: Option<String>,
    default_image_ext: String,
    save_dataset_meta: bool,
    patch: Option<DatasetPatch>,
}

impl fmt::Debug for ExportContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportContext")
            .field("save_dir", &self.save_dir)
            .field("save_media", &self.save_media)
            .field("images_dir", &self.images_dir)
            .field("pcd_dir", &self.pcd_dir)
            .field("crypter", &self.crypter)
            .field("image_ext", &self.image_ext)
            .field("default_image_ext", &self.default_image_ext)
            .finish_non_exhaustive()
    }
}

impl ExportContext {
    /// Builds the context for writing into `save_dir`.
    ///
    /// `format_default_ext` is the format's fallback image extension; it is
    /// overridden by [`ExportOptions::default_image_ext`]. An empty result is
    /// a configuration error.
    pub fn new(
        save_dir: &Path,
        options: &ExportOptions,
        format_default_ext: &str,
    ) -> Result<Self, DsportError> {
        let default_image_ext = options
            .default_image_ext
            .as_deref()
            .map(normalize_ext)
            .filter(|ext| !ext.is_empty())
            .unwrap_or_else(|| normalize_ext(format_default_ext));
        if default_image_ext.is_empty() {
            return Err(DsportError::Config {
                path: save_dir.to_path_buf(),
                message: "a default image extension is required".to_string(),
            });
        }

        let image_ext = options
            .image_ext
            .as_deref()
            .map(normalize_ext)
            .filter(|ext| !ext.is_empty())
            .map(str::to_string);

        let under_save_dir = |dir: &Option<PathBuf>| match dir {
            Some(dir) => save_dir.join(dir),
            None => save_dir.to_path_buf(),
        };

        Ok(Self {
            save_dir: save_dir.to_path_buf(),
            save_media: options.save_media,
            images_dir: under_save_dir(&options.images_dir),
            pcd_dir: under_save_dir(&options.pcd_dir),
            crypter: options
                .crypter
                .clone()
                .unwrap_or_else(|| Arc::new(NullCrypter)),
            image_ext,
            default_image_ext: default_image_ext.to_string(),
            save_dataset_meta: options.save_dataset_meta,
            patch: None,
        })
    }

    pub fn with_patch(mut self, patch: DatasetPatch) -> Self {
        self.patch = Some(patch);
        self
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    pub fn save_media(&self) -> bool {
        self.save_media
    }

    pub fn save_dataset_meta(&self) -> bool {
        self.save_dataset_meta
    }

    pub fn images_dir(&self) -> &Path {
        &self.images_dir
    }

    pub fn pcd_dir(&self) -> &Path {
        &self.pcd_dir
    }

    pub fn crypter(&self) -> &dyn Crypter {
        self.crypter.as_ref()
    }

    pub fn patch(&self) -> Option<&DatasetPatch> {
        self.patch.as_ref()
    }

    /// Extension for an image: explicit override, then the source's own
    /// extension, then the format default.
    pub fn find_image_ext<'a>(&'a self, image: Option<&'a Image>) -> &'a str {
        self.image_ext
            .as_deref()
            .or_else(|| image.and_then(Image::ext))
            .unwrap_or(&self.default_image_ext)
    }

    /// `<id><suffix>` with `/` separators preserved from the item id.
    fn make_item_filename(item: &DatasetItem, name: Option<&str>) -> String {
        name.unwrap_or(&item.id).to_string()
    }

    pub fn make_image_filename(&self, item: &DatasetItem, name: Option<&str>) -> String {
        let image = item.media.as_ref().and_then(Media::as_image);
        format!(
            "{}.{}",
            Self::make_item_filename(item, name),
            self.find_image_ext(image)
        )
    }

    /// Point cloud files always use `.pcd`.
    pub fn make_pcd_filename(&self, item: &DatasetItem, name: Option<&str>) -> String {
        format!("{}.pcd", Self::make_item_filename(item, name))
    }

    /// `<id>/extra_image_<index>.<ext>` for images attached to a point cloud.
    pub fn make_pcd_extra_image_filename(
        &self,
        item: &DatasetItem,
        index: usize,
        image: &Image,
    ) -> String {
        format!(
            "{}/extra_image_{}.{}",
            item.id,
            index,
            self.find_image_ext(Some(image))
        )
    }

    /// Saves the item's image under `basedir` (default: the images dir).
    ///
    /// An item without image data only logs a warning.
    pub fn save_image(
        &self,
        item: &DatasetItem,
        basedir: Option<&Path>,
        fname: Option<&str>,
        encryption: bool,
    ) -> Result<(), DsportError> {
        let Some(image) = item
            .media
            .as_ref()
            .and_then(Media::as_image)
            .filter(|image| image.has_data())
        else {
            warn!("Item '{}' has no image", item.id);
            return Ok(());
        };

        let basedir = basedir.unwrap_or(&self.images_dir);
        let fname = match fname {
            Some(fname) => fname.to_string(),
            None => self.make_image_filename(item, None),
        };
        let path = basedir.join(fname);

        if encryption {
            image.save(&path, self.crypter())
        } else {
            image.save(&path, &NullCrypter)
        }
    }

    /// Saves the item's point cloud under `basedir` (default: the pcd dir)
    /// and its extra images under the images dir.
    ///
    /// An item without a point cloud only logs a warning.
    pub fn save_point_cloud(
        &self,
        item: &DatasetItem,
        basedir: Option<&Path>,
        fname: Option<&str>,
    ) -> Result<(), DsportError> {
        let Some(pcd) = item.media.as_ref().and_then(Media::as_point_cloud) else {
            warn!("Item '{}' has no pcd", item.id);
            return Ok(());
        };

        let basedir = basedir.unwrap_or(&self.pcd_dir);
        let fname = match fname {
            Some(fname) => fname.to_string(),
            None => self.make_pcd_filename(item, None),
        };
        pcd.save(&basedir.join(fname), &NullCrypter)?;

        for (index, image) in pcd.extra_images().iter().enumerate() {
            if !image.has_data() {
                warn!("Item '{}' extra image {} has no data", item.id, index);
                continue;
            }
            let path = self
                .images_dir
                .join(self.make_pcd_extra_image_filename(item, index, image));
            image.save(&path, &NullCrypter)?;
        }

        Ok(())
    }
}

/// Counts of what an export wrote.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub subsets: usize,
    pub items: usize,
    pub annotations: usize,
}

impl fmt::Display for ExportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} subset(s), {} item(s), {} annotation(s)",
            self.subsets, self.items, self.annotations
        )
    }
}

/// Writes a dataset in one on-disk format.
pub trait Exporter {
    /// Image extension used when neither the caller nor the source names one.
    const DEFAULT_IMAGE_EXT: &'static str;

    /// Writes `dataset` into `ctx.save_dir()`, routing per-record failures
    /// through `policy`.
    fn apply(
        &self,
        dataset: &mut Dataset,
        ctx: &ExportContext,
        policy: &mut dyn ErrorPolicy,
    ) -> Result<ExportSummary, DsportError>;
}

/// Writes a full copy of `dataset` into `save_dir`.
///
/// `save_dir` must be absent or safe to overwrite; see [`patch`] otherwise.
pub fn convert<E: Exporter>(
    exporter: &E,
    dataset: &mut Dataset,
    save_dir: &Path,
    options: &ExportOptions,
    policy: &mut dyn ErrorPolicy,
) -> Result<ExportSummary, DsportError> {
    let ctx = ExportContext::new(save_dir, options, E::DEFAULT_IMAGE_EXT)?;
    exporter.apply(dataset, &ctx, policy)
}

/// Writes `dataset` to `save_dir`, replacing any existing directory only
/// after the new copy is complete.
///
/// On failure an existing `save_dir` is left as it was and no staging
/// directory remains.
pub fn patch<E: Exporter>(
    exporter: &E,
    dataset: &mut Dataset,
    patch: &DatasetPatch,
    save_dir: &Path,
    options: &ExportOptions,
    policy: &mut dyn ErrorPolicy,
) -> Result<ExportSummary, DsportError> {
    publish::publish_dir(save_dir, |dir| {
        let ctx = ExportContext::new(dir, options, E::DEFAULT_IMAGE_EXT)?.with_patch(patch.clone());
        exporter.apply(dataset, &ctx, policy)
    })
}

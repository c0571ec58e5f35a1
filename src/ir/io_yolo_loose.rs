//! Directory-scanned YOLO layouts: plain "loose" YOLO and Ultralytics.
//!
//! Both keep images under `<root>/images/<subset>/` and annotation files
//! under `<root>/labels/<subset>/`. They differ only in where label names
//! come from: `obj.names` for the loose layout, the `names` entry of
//! `data.yaml` for Ultralytics. A `dataset_meta.json` at the root overrides
//! either.
//!
//! Unlike the descriptor layout, items are decoded eagerly while reading,
//! one subset per call.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Deserialize;
use walkdir::WalkDir;

use super::categories::{has_meta_file, load_names_file, parse_meta_file};
use super::image_meta::{resolve_image_info, ImageInfoSource};
use super::io_yolo::parse_annotations;
use super::model::{Dataset, DatasetItem, ItemRef, DEFAULT_SUBSET_NAME};
use super::{Image, LabelCategories};
use crate::error::DsportError;
use crate::policy::ErrorPolicy;

pub const LOOSE_NAMES_FILE: &str = "obj.names";
pub const ULTRALYTICS_META_FILE: &str = "data.yaml";

const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "bmp", "webp", "tif", "tiff"];
const LABEL_EXTENSION: &str = "txt";
/// root / images / <subset> / file
const MAX_SCAN_DEPTH: usize = 3;

/// Which category file a loose layout carries.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LooseFlavor {
    #[default]
    Loose,
    Ultralytics,
}

/// Options for [`read_yolo_loose`].
#[derive(Clone, Debug)]
pub struct LooseReadOptions {
    pub subset: String,
    /// Annotation files to read. `None` reads every `.txt` file found for
    /// the subset, see [`find_label_urls`].
    pub urls: Option<Vec<PathBuf>>,
    pub image_info: ImageInfoSource,
    pub flavor: LooseFlavor,
}

impl Default for LooseReadOptions {
    fn default() -> Self {
        Self {
            subset: DEFAULT_SUBSET_NAME.to_string(),
            urls: None,
            image_info: ImageInfoSource::default(),
            flavor: LooseFlavor::default(),
        }
    }
}

/// Reads one subset of a loose or Ultralytics YOLO directory.
///
/// Each annotation file is paired with the image of the same file stem in
/// the subset's folder. Any failure on an item is reported through `policy`
/// as an item error; a skipped item is simply absent from the result.
pub fn read_yolo_loose(
    root: &Path,
    options: &LooseReadOptions,
    policy: &mut dyn ErrorPolicy,
) -> Result<Dataset, DsportError> {
    if !root.is_dir() {
        return Err(DsportError::Config {
            path: root.to_path_buf(),
            message: "dataset root should be a directory".to_string(),
        });
    }

    let image_info = resolve_image_info(root, &options.image_info)?;
    let categories = load_loose_categories(root, options.flavor)?;

    let mut images: HashMap<String, PathBuf> = HashMap::new();
    for path in scan_files(root, &IMAGE_EXTENSIONS)? {
        if subset_from_parent(&path, root) == options.subset {
            images.insert(file_stem(&path), path);
        }
    }

    let urls = match &options.urls {
        Some(urls) => urls.clone(),
        None => find_label_urls(root, &options.subset)?,
    };

    let mut dataset = Dataset::new(categories);
    let subset_name = options.subset.as_str();
    dataset.subset_mut(subset_name);

    for url in &urls {
        let fname = file_stem(url);
        let loaded = images
            .get(&fname)
            .ok_or_else(|| DsportError::ImageNotFound {
                annotation_path: url.clone(),
                expected_stem: fname.clone(),
            })
            .and_then(|image_path| {
                let image = Image::from_file(image_path, image_info.get(&fname).copied());
                let annotations = parse_annotations(url, &image, dataset.categories())?;
                Ok(DatasetItem::new(fname.as_str(), subset_name)
                    .with_media(image)
                    .with_annotations(annotations))
            });

        match loaded {
            Ok(item) => dataset.add_item(item),
            Err(err) => policy
                .report_item_error(err, &ItemRef::new(fname, subset_name))
                .into_result()?,
        }
    }

    debug!(
        "read {} of {} item(s) for subset '{}' from {}",
        dataset.len(),
        urls.len(),
        subset_name,
        root.display()
    );
    Ok(dataset)
}

/// Lists annotation files that belong to `subset`, sorted by path.
pub fn find_label_urls(root: &Path, subset: &str) -> Result<Vec<PathBuf>, DsportError> {
    let mut urls: Vec<PathBuf> = scan_files(root, &[LABEL_EXTENSION])?
        .into_iter()
        .filter(|path| subset_from_parent(path, root) == subset)
        .collect();
    urls.sort();
    Ok(urls)
}

/// Subset a scanned file belongs to: its parent folder's name, or the
/// default subset for files directly under `root`.
pub fn subset_from_parent(path: &Path, root: &Path) -> String {
    match path.parent() {
        Some(parent) if parent != root => parent
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_SUBSET_NAME.to_string()),
        _ => DEFAULT_SUBSET_NAME.to_string(),
    }
}

fn load_loose_categories(root: &Path, flavor: LooseFlavor) -> Result<LabelCategories, DsportError> {
    if has_meta_file(root) {
        return parse_meta_file(root);
    }
    match flavor {
        LooseFlavor::Loose => load_names_file(&root.join(LOOSE_NAMES_FILE)),
        LooseFlavor::Ultralytics => read_data_yaml_names(&root.join(ULTRALYTICS_META_FILE)),
    }
}

#[derive(Debug, Deserialize)]
struct DataYaml {
    names: DataYamlNames,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DataYamlNames {
    Sequence(Vec<String>),
    Mapping(BTreeMap<usize, String>),
}

/// Reads `names` from an Ultralytics `data.yaml`.
///
/// Index mappings with gaps get `class_<index>` placeholders so that label
/// ids in annotation files keep their meaning.
fn read_data_yaml_names(path: &Path) -> Result<LabelCategories, DsportError> {
    let data = fs::read_to_string(path).map_err(DsportError::Io)?;
    let parsed: DataYaml =
        serde_yaml::from_str(&data).map_err(|source| DsportError::DataYamlParse {
            path: path.to_path_buf(),
            source,
        })?;

    let names = match parsed.names {
        DataYamlNames::Sequence(names) => names,
        DataYamlNames::Mapping(mapping) => {
            let count = mapping.keys().next_back().map_or(0, |max| max + 1);
            (0..count)
                .map(|index| match mapping.get(&index) {
                    Some(name) if !name.trim().is_empty() => name.clone(),
                    _ => format!("class_{index}"),
                })
                .collect()
        }
    };

    LabelCategories::from_names(names)
}

fn scan_files(root: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>, DsportError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root)
        .max_depth(MAX_SCAN_DEPTH)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| DsportError::Config {
            path: root.to_path_buf(),
            message: format!("failed while traversing directory: {source}"),
        })?;

        if entry.file_type().is_file() && has_extension(entry.path(), extensions) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };

    allowed
        .iter()
        .any(|allowed_ext| ext.eq_ignore_ascii_case(allowed_ext))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

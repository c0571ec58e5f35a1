//! YOLO (darknet) reader and writer for the descriptor-based layout.
//!
//! A dataset root looks like this:
//!
//! ```text
//! obj.data              classes = 2 / train = data/train.txt / names = data/obj.names
//! obj.names             one label per line
//! train.txt             data/obj_train_data/img1.jpg, one media path per line
//! obj_train_data/       img1.jpg + img1.txt
//! ```
//!
//! Items are registered as pending paths when the dataset is opened and are
//! decoded on first read. The label-line codec in this module is shared with
//! [`io_yolo_loose`](super::io_yolo_loose).

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};

use super::categories::{load_categories, save_meta_file};
use super::image_meta::{resolve_image_info, ImageInfoSource, ImageMeta};
use super::model::{Annotation, Dataset, DatasetItem, ItemLoader, ItemRef};
use super::{BBoxXYWH, Image, LabelCategories, Media, Normalized};
use crate::error::DsportError;
use crate::export::{ExportContext, ExportSummary, Exporter, ItemStatus};
use crate::policy::ErrorPolicy;

pub const DESCRIPTOR_FILE: &str = "obj.data";
pub const NAMES_FILE: &str = "obj.names";
/// Descriptor keys that never name a subset.
pub const RESERVED_CONFIG_KEYS: [&str; 3] = ["classes", "names", "backup"];
pub const DEFAULT_IMAGE_EXT: &str = "jpg";

const ANNOTATION_EXT: &str = "txt";
/// Prefix every path written into the descriptor and list files carries.
const DATA_PREFIX: &str = "data/";
const EXPECTED_FIELDS: usize = 5;

/// Options for [`read_yolo_strict`].
#[derive(Clone, Debug, Default)]
pub struct StrictReadOptions {
    pub image_info: ImageInfoSource,
}

/// Opens a descriptor-based YOLO dataset.
///
/// `config_path` is the `obj.data` file or the directory holding it. List
/// files are read eagerly; items are loaded on first access through the
/// returned dataset.
pub fn read_yolo_strict(
    config_path: &Path,
    options: &StrictReadOptions,
) -> Result<Dataset, DsportError> {
    let config_path = if config_path.is_dir() {
        config_path.join(DESCRIPTOR_FILE)
    } else {
        config_path.to_path_buf()
    };
    if !config_path.is_file() {
        return Err(DsportError::Config {
            path: config_path,
            message: "can't read dataset descriptor file".to_string(),
        });
    }

    let root = config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let image_info = resolve_image_info(&root, &options.image_info)?;

    let text = fs::read_to_string(&config_path).map_err(DsportError::Io)?;
    let config = parse_descriptor(&text);

    let names_value = config
        .iter()
        .find(|(key, _)| key == "names")
        .map(|(_, value)| value.as_str())
        .ok_or_else(|| DsportError::Config {
            path: config_path.clone(),
            message: "failed to parse names file path from config".to_string(),
        })?;
    let categories = load_categories(&root.join(localize_path(names_value)))?;

    let mut dataset = Dataset::new(categories);
    for (subset_name, list_value) in config
        .iter()
        .filter(|(key, _)| !RESERVED_CONFIG_KEYS.contains(&key.as_str()))
    {
        let list_path = root.join(localize_path(list_value));
        if !list_path.is_file() {
            return Err(DsportError::Config {
                path: list_path,
                message: format!("can't find '{subset_name}' subset list file"),
            });
        }

        let list = fs::read_to_string(&list_path).map_err(DsportError::Io)?;
        let subset = dataset.subset_mut(subset_name);
        for line in list.lines().filter(|line| !line.trim().is_empty()) {
            subset.insert_pending(name_from_path(line), localize_path(line));
        }
        debug!(
            "registered {} item(s) for subset '{}' from {}",
            subset.pending_count(),
            subset_name,
            list_path.display()
        );
    }

    Ok(dataset.with_loader(Box::new(YoloStrictLoader { root, image_info })))
}

/// Parses `key = value` descriptor lines in file order.
///
/// Lines that do not match are ignored. A repeated key keeps its first
/// position and takes the last value.
pub fn parse_descriptor(text: &str) -> Vec<(String, String)> {
    let mut config: Vec<(String, String)> = Vec::new();
    for line in text.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();
        if key.is_empty()
            || value.is_empty()
            || !key.chars().all(|c| c.is_alphanumeric() || c == '_')
        {
            continue;
        }

        match config.iter_mut().find(|(existing, _)| existing == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => config.push((key.to_string(), value.to_string())),
        }
    }
    config
}

/// Normalizes a path from a descriptor or list file to a root-relative,
/// `/`-separated form with the leading `data/` removed.
pub fn localize_path(path: &str) -> String {
    let path = normalize_path(path.trim());
    match path.strip_prefix(DATA_PREFIX) {
        Some(rest) => rest.to_string(),
        None => path,
    }
}

/// Derives an item id from a list-file entry.
///
/// `data/obj_train_data/sub/img1.jpg` becomes `sub/img1`: the `data/` prefix
/// and the per-subset folder are dropped, then the extension.
pub fn name_from_path(path: &str) -> String {
    let path = localize_path(path);
    let path = match path.split_once('/') {
        Some((_, rest)) if !path.starts_with('/') => rest,
        _ => path.as_str(),
    };
    strip_extension(path).to_string()
}

/// Collapses `.`, `..`, and repeated separators, like a lexical normpath.
fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let absolute = path.starts_with('/');

    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push(".."),
            },
            part => parts.push(part),
        }
    }

    let joined = parts.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}

fn strip_extension(path: &str) -> &str {
    let name_start = path.rfind('/').map_or(0, |i| i + 1);
    let name = &path[name_start..];
    let stem_len = name.trim_start_matches('.').len();
    match name.rfind('.') {
        Some(dot) if dot >= name.len() - stem_len => &path[..name_start + dot],
        _ => path,
    }
}

#[derive(Debug)]
struct YoloStrictLoader {
    root: PathBuf,
    image_info: ImageMeta,
}

impl ItemLoader for YoloStrictLoader {
    fn load(
        &self,
        item: &ItemRef,
        media_path: &Path,
        categories: &LabelCategories,
    ) -> Result<DatasetItem, DsportError> {
        let image_path = self.root.join(media_path);
        let image = Image::from_file(&image_path, self.image_info.get(&item.id).copied());
        let anno_path = image_path.with_extension(ANNOTATION_EXT);
        let annotations = parse_annotations(&anno_path, &image, categories)?;

        Ok(DatasetItem::new(item.id.clone(), item.subset.clone())
            .with_media(image)
            .with_annotations(annotations))
    }
}

/// Reads and decodes one annotation file against `image`'s size.
pub fn parse_annotations(
    anno_path: &Path,
    image: &Image,
    categories: &LabelCategories,
) -> Result<Vec<Annotation>, DsportError> {
    let content = fs::read_to_string(anno_path).map_err(DsportError::Io)?;
    parse_annotation_text(&content, anno_path, image, categories)
}

/// Decodes annotation file contents.
///
/// The image size is only resolved when there is at least one non-empty
/// line, so an empty file never touches the image.
pub fn parse_annotation_text(
    content: &str,
    path: &Path,
    image: &Image,
    categories: &LabelCategories,
) -> Result<Vec<Annotation>, DsportError> {
    let lines: Vec<(usize, &str)> = content
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
        .collect();
    if lines.is_empty() {
        return Ok(Vec::new());
    }

    let (image_height, image_width) = require_image_size(image)?;

    let mut annotations = Vec::with_capacity(lines.len());
    for (line_num, line) in lines {
        let Some(row) = parse_label_line(line, path, line_num, categories.len())? else {
            continue;
        };
        annotations.push(row.to_annotation(image_width as f64, image_height as f64));
    }
    Ok(annotations)
}

fn require_image_size(image: &Image) -> Result<(u32, u32), DsportError> {
    let missing = || DsportError::ImageInfoMissing {
        path: image.path().map(Path::to_path_buf).unwrap_or_default(),
    };
    match image.size() {
        Ok(Some(size)) => Ok(size),
        Ok(None) => Err(missing()),
        Err(_) if !image.has_data() => Err(missing()),
        Err(err) => Err(err),
    }
}

/// One decoded label line, still in normalized center form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YoloLabelRow {
    pub label: usize,
    pub cx: f64,
    pub cy: f64,
    pub w: f64,
    pub h: f64,
}

impl YoloLabelRow {
    pub fn to_annotation(&self, image_width: f64, image_height: f64) -> Annotation {
        let bbox = BBoxXYWH::<Normalized>::from_cxcywh(self.cx, self.cy, self.w, self.h)
            .to_pixel(image_width, image_height);
        Annotation {
            bbox,
            label: self.label,
        }
    }

    pub fn from_annotation(annotation: &Annotation, image_width: f64, image_height: f64) -> Self {
        let (cx, cy, w, h) = annotation
            .bbox
            .to_normalized(image_width, image_height)
            .to_cxcywh();
        Self {
            label: annotation.label,
            cx,
            cy,
            w,
            h,
        }
    }
}

/// Parses one `label cx cy w h` line.
///
/// Blank lines yield `None`. Labels at or beyond `category_count` are
/// reported as [`DsportError::UndeclaredLabel`].
pub fn parse_label_line(
    line: &str,
    file_path: &Path,
    line_num: usize,
    category_count: usize,
) -> Result<Option<YoloLabelRow>, DsportError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    let &[label, cx, cy, w, h] = fields.as_slice() else {
        return Err(DsportError::Structural {
            path: file_path.to_path_buf(),
            line: line_num,
            message: format!(
                "unexpected field count {} in the bbox description, expected {} fields (label, xc, yc, w, h)",
                fields.len(),
                EXPECTED_FIELDS
            ),
        });
    };

    let label_id = label
        .parse::<i64>()
        .map_err(|_| invalid_field(label, "bbox label id", "integer", file_path, line_num))?;
    let label = usize::try_from(label_id)
        .ok()
        .filter(|&label| label < category_count)
        .ok_or_else(|| DsportError::UndeclaredLabel {
            path: file_path.to_path_buf(),
            line: line_num,
            label_id,
            category_count,
        })?;

    let w = parse_f64_field(w, "bbox width", file_path, line_num)?;
    let h = parse_f64_field(h, "bbox height", file_path, line_num)?;
    let cx = parse_f64_field(cx, "bbox center x", file_path, line_num)?;
    let cy = parse_f64_field(cy, "bbox center y", file_path, line_num)?;

    Ok(Some(YoloLabelRow { label, cx, cy, w, h }))
}

/// Formats a row as written to annotation files.
pub fn format_label_line(row: &YoloLabelRow) -> String {
    format!(
        "{} {:.6} {:.6} {:.6} {:.6}",
        row.label, row.cx, row.cy, row.w, row.h
    )
}

/// Fuzz-only entrypoint for YOLO single-line parsing.
#[cfg(feature = "fuzzing")]
pub fn fuzz_parse_label_line(input: &str) -> Result<(), DsportError> {
    let _ = parse_label_line(input, Path::new("<fuzz>"), 1, usize::MAX)?;
    Ok(())
}

fn parse_f64_field(
    raw: &str,
    field_name: &str,
    file_path: &Path,
    line_num: usize,
) -> Result<f64, DsportError> {
    raw.parse::<f64>()
        .map_err(|_| invalid_field(raw, field_name, "floating-point number", file_path, line_num))
}

fn invalid_field(
    raw: &str,
    field_name: &str,
    expected: &str,
    file_path: &Path,
    line_num: usize,
) -> DsportError {
    DsportError::Structural {
        path: file_path.to_path_buf(),
        line: line_num,
        message: format!("can't parse {field_name} from '{raw}', expected {expected}"),
    }
}

/// Writes the descriptor-based layout read by [`read_yolo_strict`].
#[derive(Clone, Copy, Debug, Default)]
pub struct YoloExporter;

impl Exporter for YoloExporter {
    const DEFAULT_IMAGE_EXT: &'static str = DEFAULT_IMAGE_EXT;

    fn apply(
        &self,
        dataset: &mut Dataset,
        ctx: &ExportContext,
        policy: &mut dyn ErrorPolicy,
    ) -> Result<ExportSummary, DsportError> {
        dataset.materialize(policy)?;

        let save_dir = ctx.save_dir();
        if let Some(subset) = dataset
            .subsets()
            .iter()
            .find(|subset| RESERVED_CONFIG_KEYS.contains(&subset.name()))
        {
            return Err(DsportError::Config {
                path: save_dir.to_path_buf(),
                message: format!(
                    "can't export subset '{}': the name is reserved in {}",
                    subset.name(),
                    DESCRIPTOR_FILE
                ),
            });
        }

        if let Some(patch) = ctx.patch() {
            let removed = patch.removed().count();
            info!(
                "patching YOLO dataset: {} updated item(s), {} removed",
                patch.iter().filter(|(_, status)| *status != ItemStatus::Removed).count(),
                removed
            );
        }

        fs::create_dir_all(save_dir).map_err(DsportError::Io)?;
        let categories = dataset.categories();
        write_names_file(&save_dir.join(NAMES_FILE), categories)?;
        if ctx.save_dataset_meta() {
            save_meta_file(save_dir, categories)?;
        }

        let mut summary = ExportSummary::default();
        let mut descriptor = format!("classes = {}\n", categories.len());

        for subset in dataset.subsets() {
            let subset_folder = format!("obj_{}_data", subset.name());
            let subset_dir = save_dir.join(&subset_folder);
            fs::create_dir_all(&subset_dir).map_err(DsportError::Io)?;

            let mut list = String::new();
            for item in subset.iter() {
                match export_item(item, &subset_dir, categories, ctx, policy) {
                    Ok((image_name, written)) => {
                        list.push_str(&format!("{DATA_PREFIX}{subset_folder}/{image_name}\n"));
                        summary.items += 1;
                        summary.annotations += written;
                    }
                    Err(err) => policy
                        .report_item_error(err, &item.item_ref())
                        .into_result()?,
                }
            }

            let list_name = format!("{}.{}", subset.name(), ANNOTATION_EXT);
            fs::write(save_dir.join(&list_name), list).map_err(DsportError::Io)?;
            descriptor.push_str(&format!("{} = {DATA_PREFIX}{list_name}\n", subset.name()));
            summary.subsets += 1;
        }

        descriptor.push_str(&format!("names = {DATA_PREFIX}{NAMES_FILE}\n"));
        descriptor.push_str("backup = backup/\n");
        fs::write(save_dir.join(DESCRIPTOR_FILE), descriptor).map_err(DsportError::Io)?;

        debug!("exported YOLO dataset to {}: {summary}", save_dir.display());
        Ok(summary)
    }
}

fn write_names_file(path: &Path, categories: &LabelCategories) -> Result<(), DsportError> {
    let mut text = String::new();
    for (_, name) in categories.iter() {
        text.push_str(name);
        text.push('\n');
    }
    fs::write(path, text).map_err(DsportError::Io)
}

/// Writes one item's annotation file (and image, when requested).
///
/// Returns the image file name used in the list file and the number of boxes
/// written. Out-of-range labels are reported per box; an abort comes back as
/// [`DsportError::Aborted`].
fn export_item(
    item: &DatasetItem,
    subset_dir: &Path,
    categories: &LabelCategories,
    ctx: &ExportContext,
    policy: &mut dyn ErrorPolicy,
) -> Result<(String, usize), DsportError> {
    let image = item.media.as_ref().and_then(Media::as_image);
    let image_name = ctx.make_image_filename(item, None);

    if ctx.save_media() {
        ctx.save_image(item, Some(subset_dir), Some(&image_name), true)?;
    }

    let anno_path = subset_dir.join(format!("{}.{}", item.id, ANNOTATION_EXT));
    let mut text = String::new();
    let mut written = 0;

    if !item.annotations.is_empty() {
        let (image_height, image_width) = match image {
            Some(image) => require_image_size(image)?,
            None => {
                return Err(DsportError::ImageInfoMissing {
                    path: PathBuf::from(&image_name),
                })
            }
        };

        for (idx, annotation) in item.annotations.iter().enumerate() {
            if !categories.contains(annotation.label) {
                let err = DsportError::UndeclaredLabel {
                    path: anno_path.clone(),
                    line: idx + 1,
                    label_id: i64::try_from(annotation.label).unwrap_or(i64::MAX),
                    category_count: categories.len(),
                };
                policy
                    .report_annotation_error(err, &item.item_ref())
                    .into_result()?;
                continue;
            }

            let row =
                YoloLabelRow::from_annotation(annotation, image_width as f64, image_height as f64);
            text.push_str(&format_label_line(&row));
            text.push('\n');
            written += 1;
        }
    }

    if let Some(parent) = anno_path.parent() {
        fs::create_dir_all(parent).map_err(DsportError::Io)?;
    }
    fs::write(&anno_path, text).map_err(DsportError::Io)?;
    Ok((image_name, written))
}

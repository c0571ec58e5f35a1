//! Per-dataset image size index.
//!
//! `images.meta` lets a dataset declare image sizes up front so that decoding
//! never has to open the images. Each line is `<item_id> <height> <width>`;
//! blank lines and `#` comments are ignored.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::DsportError;

/// Default file name of the image size index at a dataset root.
pub const DEFAULT_IMAGE_META_FILE_NAME: &str = "images.meta";

/// Item id → `(height, width)`.
pub type ImageMeta = HashMap<String, (u32, u32)>;

/// Where a reader should take image sizes from.
#[derive(Clone, Debug, Default)]
pub enum ImageInfoSource {
    /// Use `images.meta` at the dataset root if present, otherwise nothing.
    #[default]
    Auto,
    /// Load an explicit index file.
    File(PathBuf),
    /// Use an in-memory index.
    Map(ImageMeta),
}

/// Resolves an [`ImageInfoSource`] against a dataset root.
pub fn resolve_image_info(
    root: &Path,
    source: &ImageInfoSource,
) -> Result<ImageMeta, DsportError> {
    match source {
        ImageInfoSource::Auto => {
            let default_path = root.join(DEFAULT_IMAGE_META_FILE_NAME);
            if default_path.is_file() {
                load_image_meta_file(&default_path)
            } else {
                Ok(ImageMeta::new())
            }
        }
        ImageInfoSource::File(path) => load_image_meta_file(path),
        ImageInfoSource::Map(meta) => Ok(meta.clone()),
    }
}

pub fn load_image_meta_file(path: &Path) -> Result<ImageMeta, DsportError> {
    let data = fs::read_to_string(path).map_err(DsportError::Io)?;
    let mut meta = ImageMeta::new();

    for (line_idx, line) in data.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let invalid = |message: String| DsportError::Config {
            path: path.to_path_buf(),
            message: format!("line {}: {message}", line_idx + 1),
        };

        // Ids may contain spaces; the two size fields are always last.
        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        let [id_fields @ .., height, width] = fields.as_slice() else {
            return Err(invalid(format!(
                "expected '<item_id> <height> <width>', found '{trimmed}'"
            )));
        };
        if id_fields.is_empty() {
            return Err(invalid(format!("missing item id in '{trimmed}'")));
        }

        let height = height
            .parse::<u32>()
            .map_err(|_| invalid(format!("invalid height '{height}'")))?;
        let width = width
            .parse::<u32>()
            .map_err(|_| invalid(format!("invalid width '{width}'")))?;

        meta.insert(id_fields.join(" "), (height, width));
    }

    Ok(meta)
}

pub fn save_image_meta_file(path: &Path, meta: &ImageMeta) -> Result<(), DsportError> {
    let mut entries: Vec<_> = meta.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    let mut out = String::new();
    for (item_id, (height, width)) in entries {
        out.push_str(&format!("{item_id} {height} {width}\n"));
    }
    fs::write(path, out).map_err(DsportError::Io)
}

use std::path::PathBuf;
use thiserror::Error;

use crate::ir::ItemRef;

/// The main error type for dsport operations.
#[derive(Debug, Error)]
pub enum DsportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid dataset configuration at {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("Malformed annotation at {path}:{line}: {message}")]
    Structural {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error(
        "Undeclared label {label_id} at {path}:{line} (dataset declares {category_count} label(s))"
    )]
    UndeclaredLabel {
        path: PathBuf,
        line: usize,
        label_id: i64,
        category_count: usize,
    },

    #[error("Label '{name}' is declared more than once")]
    DuplicateLabel { name: String },

    #[error("Failed to process item {item}: {source}")]
    Item {
        item: ItemRef,
        #[source]
        source: Box<DsportError>,
    },

    #[error("Failed to process annotations of item {item}: {source}")]
    Annotation {
        item: ItemRef,
        #[source]
        source: Box<DsportError>,
    },

    #[error(transparent)]
    Aborted(#[from] FatalAbort),

    #[error("Failed to parse dataset meta file {path}: {source}")]
    MetaFileParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write dataset meta file {path}: {source}")]
    MetaFileWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse YAML at {path}: {source}")]
    DataYamlParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to read image dimensions from {path}: {source}")]
    ImageDimensionRead {
        path: PathBuf,
        #[source]
        source: imagesize::ImageError,
    },

    #[error("Can't find image info for '{path}'")]
    ImageInfoMissing { path: PathBuf },

    #[error("No image found for annotation file {annotation_path} (expected stem '{expected_stem}')")]
    ImageNotFound {
        annotation_path: PathBuf,
        expected_stem: String,
    },

    #[error("Export to {path} failed: {message}")]
    Export { path: PathBuf, message: String },
}

impl DsportError {
    /// Returns true for decode failures scoped to annotation content (bad
    /// field counts, unparsable numbers, undeclared labels).
    pub fn is_annotation_level(&self) -> bool {
        matches!(
            self,
            DsportError::Structural { .. } | DsportError::UndeclaredLabel { .. }
        )
    }

    /// Returns true if this error is the fatal-abort signal.
    pub fn is_abort(&self) -> bool {
        matches!(self, DsportError::Aborted(_))
    }
}

/// Signal that the current conversion must stop immediately.
///
/// Produced only by an [`ErrorPolicy`](crate::policy::ErrorPolicy). Once
/// raised it is never reclassified: reporting it to a policy again hands the
/// same value back.
#[derive(Debug, Error)]
#[error("Conversion aborted: {cause}")]
pub struct FatalAbort {
    #[source]
    cause: Box<DsportError>,
}

impl FatalAbort {
    pub(crate) fn new(cause: DsportError) -> Self {
        Self {
            cause: Box::new(cause),
        }
    }

    /// The classified error that triggered the abort.
    pub fn cause(&self) -> &DsportError {
        &self.cause
    }

    pub fn into_cause(self) -> DsportError {
        *self.cause
    }
}

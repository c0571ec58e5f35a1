//! Media handles attached to dataset items.
//!
//! Pixel decoding is out of scope: images are carried as file references or
//! raw encoded bytes, and the only thing ever read from them is the header
//! size. Saving copies the encoded bytes, passing them through a
//! [`Crypter`] when one is configured.

use std::borrow::Cow;
use std::cell::OnceCell;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::DsportError;

/// Encryption capability applied to media bytes on save.
pub trait Crypter: fmt::Debug + Send + Sync {
    /// Returns true if this crypter leaves bytes untouched.
    fn is_null(&self) -> bool {
        false
    }

    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, DsportError>;
}

/// Crypter that passes bytes through unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullCrypter;

impl Crypter for NullCrypter {
    fn is_null(&self) -> bool {
        true
    }

    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, DsportError> {
        Ok(data.to_vec())
    }
}

/// Strips a leading dot so `".jpg"` and `"jpg"` compare equal.
pub fn normalize_ext(ext: &str) -> &str {
    ext.trim().trim_start_matches('.')
}

#[derive(Clone)]
enum ImageSource {
    File(PathBuf),
    Bytes(Arc<[u8]>),
    Missing,
}

impl fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageSource::File(path) => f.debug_tuple("File").field(path).finish(),
            ImageSource::Bytes(data) => write!(f, "Bytes({} bytes)", data.len()),
            ImageSource::Missing => f.write_str("Missing"),
        }
    }
}

/// An encoded image, its extension, and its size once known.
///
/// Sizes are `(height, width)`.
#[derive(Clone, Debug)]
pub struct Image {
    source: ImageSource,
    ext: Option<String>,
    size: OnceCell<(u32, u32)>,
}

impl Image {
    /// References an image file. `size` skips the header probe when known.
    pub fn from_file(path: impl Into<PathBuf>, size: Option<(u32, u32)>) -> Self {
        let path = path.into();
        let ext = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_string);
        Self {
            source: ImageSource::File(path),
            ext,
            size: known_size(size),
        }
    }

    /// Wraps already-encoded image bytes.
    pub fn from_bytes(
        data: impl Into<Arc<[u8]>>,
        ext: Option<&str>,
        size: Option<(u32, u32)>,
    ) -> Self {
        Self {
            source: ImageSource::Bytes(data.into()),
            ext: ext.map(|ext| normalize_ext(ext).to_string()),
            size: known_size(size),
        }
    }

    /// Image metadata without any pixel data behind it.
    pub fn from_info(size: Option<(u32, u32)>, ext: Option<&str>) -> Self {
        Self {
            source: ImageSource::Missing,
            ext: ext.map(|ext| normalize_ext(ext).to_string()),
            size: known_size(size),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.source {
            ImageSource::File(path) => Some(path),
            _ => None,
        }
    }

    /// Source extension without the leading dot.
    pub fn ext(&self) -> Option<&str> {
        self.ext.as_deref().filter(|ext| !ext.is_empty())
    }

    pub fn has_data(&self) -> bool {
        match &self.source {
            ImageSource::File(path) => path.is_file(),
            ImageSource::Bytes(data) => !data.is_empty(),
            ImageSource::Missing => false,
        }
    }

    /// Returns `(height, width)`, reading the image header on first use.
    ///
    /// `Ok(None)` means there is neither a known size nor data to probe.
    pub fn size(&self) -> Result<Option<(u32, u32)>, DsportError> {
        if let Some(size) = self.size.get() {
            return Ok(Some(*size));
        }

        let probed = match &self.source {
            ImageSource::File(path) => Some(read_image_dimensions(path)?),
            ImageSource::Bytes(data) => Some(read_blob_dimensions(data)?),
            ImageSource::Missing => None,
        };

        Ok(probed.map(|size| *self.size.get_or_init(|| size)))
    }

    /// Encoded bytes of the image.
    pub fn data(&self) -> Result<Cow<'_, [u8]>, DsportError> {
        match &self.source {
            ImageSource::File(path) => Ok(Cow::Owned(fs::read(path).map_err(DsportError::Io)?)),
            ImageSource::Bytes(data) => Ok(Cow::Borrowed(data.as_ref())),
            ImageSource::Missing => Err(DsportError::Export {
                path: PathBuf::new(),
                message: "image has no data".to_string(),
            }),
        }
    }

    /// Writes the encoded bytes to `path`, creating parent directories.
    pub fn save(&self, path: &Path, crypter: &dyn Crypter) -> Result<(), DsportError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(DsportError::Io)?;
        }

        if crypter.is_null() {
            if let ImageSource::File(src) = &self.source {
                if src.as_path() != path {
                    fs::copy(src, path).map_err(DsportError::Io)?;
                }
                return Ok(());
            }
        }

        let data = self.data()?;
        let bytes = crypter.encrypt(&data)?;
        fs::write(path, bytes).map_err(DsportError::Io)
    }
}

/// A point cloud file plus the related images that travel with it.
#[derive(Clone, Debug)]
pub struct PointCloud {
    path: PathBuf,
    extra_images: Vec<Image>,
}

impl PointCloud {
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            extra_images: Vec::new(),
        }
    }

    pub fn with_extra_images(mut self, images: Vec<Image>) -> Self {
        self.extra_images = images;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn extra_images(&self) -> &[Image] {
        &self.extra_images
    }

    pub fn has_data(&self) -> bool {
        self.path.is_file()
    }

    /// Writes the point cloud bytes to `path`, creating parent directories.
    pub fn save(&self, path: &Path, crypter: &dyn Crypter) -> Result<(), DsportError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(DsportError::Io)?;
        }
        if crypter.is_null() {
            if self.path != path {
                fs::copy(&self.path, path).map_err(DsportError::Io)?;
            }
            return Ok(());
        }
        let data = fs::read(&self.path).map_err(DsportError::Io)?;
        fs::write(path, crypter.encrypt(&data)?).map_err(DsportError::Io)
    }
}

/// Media carried by a dataset item.
#[derive(Clone, Debug)]
pub enum Media {
    Image(Image),
    PointCloud(PointCloud),
}

impl Media {
    pub fn as_image(&self) -> Option<&Image> {
        match self {
            Media::Image(image) => Some(image),
            Media::PointCloud(_) => None,
        }
    }

    pub fn as_point_cloud(&self) -> Option<&PointCloud> {
        match self {
            Media::PointCloud(pcd) => Some(pcd),
            Media::Image(_) => None,
        }
    }

    /// `(height, width)` for images; point clouds have no 2D size.
    pub fn size(&self) -> Result<Option<(u32, u32)>, DsportError> {
        match self {
            Media::Image(image) => image.size(),
            Media::PointCloud(_) => Ok(None),
        }
    }

    pub fn has_data(&self) -> bool {
        match self {
            Media::Image(image) => image.has_data(),
            Media::PointCloud(pcd) => pcd.has_data(),
        }
    }

    pub fn extension(&self) -> Option<&str> {
        match self {
            Media::Image(image) => image.ext(),
            Media::PointCloud(_) => Some("pcd"),
        }
    }

    pub fn save(&self, path: &Path, crypter: &dyn Crypter) -> Result<(), DsportError> {
        match self {
            Media::Image(image) => image.save(path, crypter),
            Media::PointCloud(pcd) => pcd.save(path, crypter),
        }
    }
}

impl From<Image> for Media {
    fn from(image: Image) -> Self {
        Media::Image(image)
    }
}

impl From<PointCloud> for Media {
    fn from(pcd: PointCloud) -> Self {
        Media::PointCloud(pcd)
    }
}

fn known_size(size: Option<(u32, u32)>) -> OnceCell<(u32, u32)> {
    let cell = OnceCell::new();
    if let Some(size) = size {
        let _ = cell.set(size);
    }
    cell
}

fn checked_dimensions(
    path: &Path,
    size: imagesize::ImageSize,
) -> Result<(u32, u32), DsportError> {
    let width: u32 = size.width.try_into().map_err(|_| DsportError::Config {
        path: path.to_path_buf(),
        message: format!("image width {} does not fit in u32", size.width),
    })?;
    let height: u32 = size.height.try_into().map_err(|_| DsportError::Config {
        path: path.to_path_buf(),
        message: format!("image height {} does not fit in u32", size.height),
    })?;
    Ok((height, width))
}

fn read_image_dimensions(path: &Path) -> Result<(u32, u32), DsportError> {
    let size = imagesize::size(path).map_err(|source| DsportError::ImageDimensionRead {
        path: path.to_path_buf(),
        source,
    })?;
    checked_dimensions(path, size)
}

fn read_blob_dimensions(data: &[u8]) -> Result<(u32, u32), DsportError> {
    let path = Path::new("<memory>");
    let size = imagesize::blob_size(data).map_err(|source| DsportError::ImageDimensionRead {
        path: path.to_path_buf(),
        source,
    })?;
    checked_dimensions(path, size)
}

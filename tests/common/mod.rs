#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

pub fn bmp_bytes(width: u32, height: u32) -> Vec<u8> {
    let row_stride = (width * 3).div_ceil(4) * 4;
    let pixel_array_size = row_stride * height;
    let file_size = 54 + pixel_array_size;

    let mut bytes = Vec::with_capacity(file_size as usize);
    bytes.extend_from_slice(b"BM");
    bytes.extend_from_slice(&file_size.to_le_bytes());
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes.extend_from_slice(&54u32.to_le_bytes());

    bytes.extend_from_slice(&40u32.to_le_bytes());
    bytes.extend_from_slice(&(width as i32).to_le_bytes());
    bytes.extend_from_slice(&(height as i32).to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&24u16.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&pixel_array_size.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());

    bytes.resize(file_size as usize, 0);
    bytes
}

pub fn write_bmp(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, bmp_bytes(width, height)).expect("write bmp file");
}

pub fn write_file(path: &Path, contents: impl AsRef<[u8]>) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, contents).expect("write file");
}

/// One item of a descriptor-layout fixture.
pub struct FixtureItem<'a> {
    pub id: &'a str,
    /// `(width, height)` of a BMP to write, or `None` for no image file.
    pub image: Option<(u32, u32)>,
    pub labels: &'a str,
}

impl<'a> FixtureItem<'a> {
    pub fn new(id: &'a str, image: Option<(u32, u32)>, labels: &'a str) -> Self {
        Self { id, image, labels }
    }
}

/// Writes a descriptor-layout dataset with a single `train` subset and
/// returns the path of its `obj.data`.
pub fn write_strict_dataset(root: &Path, names: &[&str], items: &[FixtureItem<'_>]) -> PathBuf {
    let mut list = String::new();
    for item in items {
        let image_rel = format!("obj_train_data/{}.bmp", item.id);
        if let Some((width, height)) = item.image {
            write_bmp(&root.join(&image_rel), width, height);
        }
        write_file(
            &root.join(format!("obj_train_data/{}.txt", item.id)),
            item.labels,
        );
        list.push_str(&format!("data/{image_rel}\n"));
    }

    write_file(&root.join("obj.names"), names.join("\n") + "\n");
    write_file(&root.join("train.txt"), list);

    let descriptor = root.join("obj.data");
    write_file(
        &descriptor,
        format!(
            "classes = {}\ntrain = data/train.txt\nnames = data/obj.names\nbackup = backup/\n",
            names.len()
        ),
    );
    descriptor
}

/// Every file under `root`, keyed by relative path.
pub fn snapshot_dir(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(root)
        .into_iter()
        .map(|entry| entry.expect("walk dir"))
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            let rel = entry
                .path()
                .strip_prefix(root)
                .expect("inside root")
                .to_path_buf();
            (rel, fs::read(entry.path()).expect("read file"))
        })
        .collect()
}

/// Names of entries in `parent` that look like staging directories.
pub fn staging_leftovers(parent: &Path) -> Vec<String> {
    fs::read_dir(parent)
        .expect("read parent dir")
        .map(|entry| entry.expect("dir entry").file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".tmp"))
        .collect()
}

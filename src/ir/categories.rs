//! Label category registry and its on-disk sources.
//!
//! Labels are identified by their insertion position. Two sources exist:
//! a flat names file (one label per line) and a `dataset_meta.json` sidecar.
//! When the sidecar sits next to the names file it always wins.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::DsportError;

/// File name of the category sidecar.
pub const DATASET_META_FILE: &str = "dataset_meta.json";

/// Ordered, append-only set of label names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelCategories {
    names: Vec<String>,
    lookup: HashMap<String, usize>,
}

impl LabelCategories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from names in index order.
    pub fn from_names<I, S>(names: I) -> Result<Self, DsportError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut categories = Self::new();
        for name in names {
            categories.add(name)?;
        }
        Ok(categories)
    }

    /// Appends a label and returns its index.
    pub fn add(&mut self, name: impl Into<String>) -> Result<usize, DsportError> {
        let name = name.into();
        if self.lookup.contains_key(&name) {
            return Err(DsportError::DuplicateLabel { name });
        }

        let index = self.names.len();
        self.lookup.insert(name.clone(), index);
        self.names.push(name);
        Ok(index)
    }

    pub fn resolve(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.lookup.get(name).copied()
    }

    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        index < self.names.len()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Iterates `(index, name)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(index, name)| (index, name.as_str()))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DatasetMeta {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    labels: Vec<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    label_map: BTreeMap<String, String>,
}

fn meta_file_path(dir: &Path) -> PathBuf {
    dir.join(DATASET_META_FILE)
}

/// Returns true if `dir` holds a category sidecar.
pub fn has_meta_file(dir: &Path) -> bool {
    meta_file_path(dir).is_file()
}

/// Reads the category sidecar in `dir`.
///
/// `labels` entries come first, then `label_map` entries ordered by their
/// numeric key. Names already seen are not added twice.
pub fn parse_meta_file(dir: &Path) -> Result<LabelCategories, DsportError> {
    let path = meta_file_path(dir);
    let file = File::open(&path).map_err(DsportError::Io)?;
    let meta: DatasetMeta =
        serde_json::from_reader(BufReader::new(file)).map_err(|source| {
            DsportError::MetaFileParse {
                path: path.clone(),
                source,
            }
        })?;

    let mut indexed = Vec::with_capacity(meta.label_map.len());
    for (key, name) in meta.label_map {
        let index = key.trim().parse::<usize>().map_err(|_| DsportError::Config {
            path: path.clone(),
            message: format!("label_map key '{key}' is not a non-negative integer"),
        })?;
        indexed.push((index, name));
    }
    indexed.sort_by_key(|(index, _)| *index);

    let mut categories = LabelCategories::new();
    for name in meta
        .labels
        .into_iter()
        .chain(indexed.into_iter().map(|(_, name)| name))
    {
        if categories.find(&name).is_none() {
            categories.add(name)?;
        }
    }

    Ok(categories)
}

/// Writes the category sidecar into `dir`.
pub fn save_meta_file(dir: &Path, categories: &LabelCategories) -> Result<(), DsportError> {
    let meta = DatasetMeta {
        labels: Vec::new(),
        label_map: categories
            .iter()
            .map(|(index, name)| (index.to_string(), name.to_string()))
            .collect(),
    };

    let path = meta_file_path(dir);
    let file = File::create(&path).map_err(DsportError::Io)?;
    serde_json::to_writer_pretty(BufWriter::new(file), &meta)
        .map_err(|source| DsportError::MetaFileWrite { path, source })
}

/// Reads a flat names file, one label per non-empty line.
pub fn load_names_file(path: &Path) -> Result<LabelCategories, DsportError> {
    let data = fs::read_to_string(path).map_err(DsportError::Io)?;
    LabelCategories::from_names(
        data.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty()),
    )
}

/// Loads categories for a names file, preferring a sidecar in the same
/// directory.
pub fn load_categories(names_path: &Path) -> Result<LabelCategories, DsportError> {
    let dir = names_path.parent().unwrap_or_else(|| Path::new(""));
    if has_meta_file(dir) {
        return parse_meta_file(dir);
    }
    load_names_file(names_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_assigns_positional_indices() {
        let mut categories = LabelCategories::new();
        assert_eq!(categories.add("cat").unwrap(), 0);
        assert_eq!(categories.add("dog").unwrap(), 1);

        assert_eq!(categories.len(), 2);
        assert_eq!(categories.resolve(1), Some("dog"));
        assert_eq!(categories.resolve(2), None);
        assert_eq!(categories.find("cat"), Some(0));
        assert!(categories.contains(1));
        assert!(!categories.contains(2));
    }

    #[test]
    fn add_rejects_duplicates() {
        let mut categories = LabelCategories::from_names(["cat"]).unwrap();
        let err = categories.add("cat").unwrap_err();
        assert!(matches!(err, DsportError::DuplicateLabel { name } if name == "cat"));
        assert_eq!(categories.len(), 1);
    }

    #[test]
    fn names_file_skips_blank_lines() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let path = temp.path().join("obj.names");
        fs::write(&path, "person\n\n  car  \n").expect("write names");

        let categories = load_names_file(&path).expect("load names");
        let names: Vec<&str> = categories.iter().map(|(_, name)| name).collect();
        assert_eq!(names, vec!["person", "car"]);
    }

    #[test]
    fn sidecar_takes_precedence_over_names_file() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let names_path = temp.path().join("obj.names");
        fs::write(&names_path, "wrong\nvalues\n").expect("write names");
        fs::write(
            temp.path().join(DATASET_META_FILE),
            r#"{"label_map": {"1": "bicycle", "0": "person", "10": "truck"}}"#,
        )
        .expect("write meta");

        let categories = load_categories(&names_path).expect("load categories");
        assert_eq!(categories.resolve(0), Some("person"));
        assert_eq!(categories.resolve(1), Some("bicycle"));
        assert_eq!(categories.resolve(2), Some("truck"));
        assert_eq!(categories.len(), 3);
    }

    #[test]
    fn sidecar_roundtrips_through_save() {
        let temp = tempfile::tempdir().expect("create temp dir");
        let categories = LabelCategories::from_names(["a", "b", "c"]).unwrap();

        save_meta_file(temp.path(), &categories).expect("save meta");
        assert!(has_meta_file(temp.path()));

        let restored = parse_meta_file(temp.path()).expect("parse meta");
        assert_eq!(restored, categories);
    }

    #[test]
    fn sidecar_rejects_non_numeric_keys() {
        let temp = tempfile::tempdir().expect("create temp dir");
        fs::write(
            temp.path().join(DATASET_META_FILE),
            r#"{"label_map": {"first": "person"}}"#,
        )
        .expect("write meta");

        let err = parse_meta_file(temp.path()).unwrap_err();
        assert!(matches!(err, DsportError::Config { .. }));
    }
}

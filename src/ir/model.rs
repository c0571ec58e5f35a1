//! Dataset item store.
//!
//! A [`Dataset`] is a list of named [`Subset`]s plus one shared
//! [`LabelCategories`]. Subsets keep their items in insertion order. An
//! entry may start out as a raw media path ([`ItemSlot::Pending`]) and is
//! turned into a full [`DatasetItem`] by the dataset's [`ItemLoader`] the
//! first time it is read. Entries whose loading fails are reported to the
//! active [`ErrorPolicy`] and then marked [`ItemSlot::Failed`], which hides
//! them from every later read.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use log::debug;

use super::bbox::BBoxXYWH;
use super::categories::LabelCategories;
use super::media::Media;
use super::space::Pixel;
use crate::error::{DsportError, FatalAbort};
use crate::policy::ErrorPolicy;

/// Subset name used when a layout does not name one.
pub const DEFAULT_SUBSET_NAME: &str = "default";

/// Identifies an item: ids are unique per subset, not globally.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemRef {
    pub id: String,
    pub subset: String,
}

impl ItemRef {
    pub fn new(id: impl Into<String>, subset: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subset: subset.into(),
        }
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' (subset '{}')", self.id, self.subset)
    }
}

/// A labeled bounding box in absolute pixel units.
#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub bbox: BBoxXYWH<Pixel>,
    /// Index into the dataset's [`LabelCategories`].
    pub label: usize,
}

impl Annotation {
    pub fn bbox(x: f64, y: f64, w: f64, h: f64, label: usize) -> Self {
        Self {
            bbox: BBoxXYWH::from_xywh(x, y, w, h),
            label,
        }
    }
}

/// One dataset record.
#[derive(Clone, Debug)]
pub struct DatasetItem {
    pub id: String,
    pub subset: String,
    pub media: Option<Media>,
    pub annotations: Vec<Annotation>,
}

impl DatasetItem {
    pub fn new(id: impl Into<String>, subset: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subset: subset.into(),
            media: None,
            annotations: Vec::new(),
        }
    }

    pub fn with_media(mut self, media: impl Into<Media>) -> Self {
        self.media = Some(media.into());
        self
    }

    pub fn with_annotations(mut self, annotations: Vec<Annotation>) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn with_annotation(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn item_ref(&self) -> ItemRef {
        ItemRef::new(self.id.clone(), self.subset.clone())
    }
}

/// Materialization state of one subset entry.
#[derive(Clone, Debug)]
pub enum ItemSlot {
    /// Only the media path (relative to the loader's root) is known.
    Pending(PathBuf),
    Loaded(DatasetItem),
    /// Loading failed and was reported; the entry is skipped from now on.
    Failed,
}

/// Turns a pending entry into a full item.
pub trait ItemLoader: fmt::Debug {
    fn load(
        &self,
        item: &ItemRef,
        media_path: &Path,
        categories: &LabelCategories,
    ) -> Result<DatasetItem, DsportError>;
}

/// A named, ordered partition of items.
#[derive(Clone, Debug)]
pub struct Subset {
    name: String,
    entries: Vec<(String, ItemSlot)>,
    positions: HashMap<String, usize>,
}

impl Subset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds an entry to be loaded on first read. A repeated id keeps its
    /// original position and takes the new path.
    pub fn insert_pending(&mut self, id: impl Into<String>, media_path: impl Into<PathBuf>) {
        self.put(id.into(), ItemSlot::Pending(media_path.into()));
    }

    /// Adds a fully built item. A repeated id keeps its original position.
    pub fn insert(&mut self, mut item: DatasetItem) {
        item.subset.clone_from(&self.name);
        let id = item.id.clone();
        self.put(id, ItemSlot::Loaded(item));
    }

    fn put(&mut self, id: String, slot: ItemSlot) {
        match self.positions.get(&id) {
            Some(&pos) => self.entries[pos].1 = slot,
            None => {
                self.positions.insert(id.clone(), self.entries.len());
                self.entries.push((id, slot));
            }
        }
    }

    /// Number of entries not known to have failed.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, slot)| !matches!(slot, ItemSlot::Failed))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, slot)| matches!(slot, ItemSlot::Pending(_)))
            .count()
    }

    pub fn slot(&self, id: &str) -> Option<&ItemSlot> {
        self.positions.get(id).map(|&pos| &self.entries[pos].1)
    }

    /// Loaded items in insertion order, skipping failed entries.
    ///
    /// The subset must not have pending entries; load them first with
    /// [`Dataset::materialize`] or iterate through [`Dataset::load_items`].
    /// Debug builds panic on a pending entry.
    pub fn iter(&self) -> impl Iterator<Item = &DatasetItem> {
        debug_assert!(
            self.pending_count() == 0,
            "subset '{}' iterated with {} unloaded entr(ies)",
            self.name,
            self.pending_count()
        );
        self.entries.iter().filter_map(|(_, slot)| match slot {
            ItemSlot::Loaded(item) => Some(item),
            _ => None,
        })
    }

    fn materialize_at(
        &mut self,
        pos: usize,
        categories: &LabelCategories,
        loader: Option<&dyn ItemLoader>,
        policy: &mut dyn ErrorPolicy,
    ) -> Result<(), FatalAbort> {
        let Subset { name, entries, .. } = self;
        let (id, slot) = &mut entries[pos];
        let ItemSlot::Pending(media_path) = slot else {
            return Ok(());
        };

        let item_ref = ItemRef::new(id.clone(), name.clone());
        let loaded = match loader {
            Some(loader) => loader.load(&item_ref, media_path, categories),
            None => Err(DsportError::Config {
                path: media_path.clone(),
                message: "dataset has pending items but no loader".to_string(),
            }),
        };

        match loaded {
            Ok(item) => {
                *slot = ItemSlot::Loaded(item);
                Ok(())
            }
            Err(err) => {
                *slot = ItemSlot::Failed;
                let outcome = if err.is_annotation_level() {
                    policy.report_annotation_error(err, &item_ref)
                } else {
                    policy.report_item_error(err, &item_ref)
                };
                outcome.into_result()
            }
        }
    }
}

/// Subsets plus the categories they share.
#[derive(Debug, Default)]
pub struct Dataset {
    subsets: Vec<Subset>,
    categories: LabelCategories,
    loader: Option<Box<dyn ItemLoader>>,
}

impl Dataset {
    pub fn new(categories: LabelCategories) -> Self {
        Self {
            subsets: Vec::new(),
            categories,
            loader: None,
        }
    }

    pub fn with_loader(mut self, loader: Box<dyn ItemLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn categories(&self) -> &LabelCategories {
        &self.categories
    }

    pub fn subsets(&self) -> &[Subset] {
        &self.subsets
    }

    pub fn subset(&self, name: &str) -> Option<&Subset> {
        self.subsets.iter().find(|s| s.name == name)
    }

    /// Returns the named subset, creating it at the end if missing.
    pub fn subset_mut(&mut self, name: &str) -> &mut Subset {
        let pos = match self.subsets.iter().position(|s| s.name == name) {
            Some(pos) => pos,
            None => {
                self.subsets.push(Subset::new(name));
                self.subsets.len() - 1
            }
        };
        &mut self.subsets[pos]
    }

    /// Inserts an item into the subset named by `item.subset`.
    pub fn add_item(&mut self, item: DatasetItem) {
        let subset = item.subset.clone();
        self.subset_mut(&subset).insert(item);
    }

    /// Entries across all subsets that are not known to have failed.
    pub fn len(&self) -> usize {
        self.subsets.iter().map(Subset::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Loads every pending entry in subset and list order.
    ///
    /// Failures go through `policy`; a skipped entry is marked failed and
    /// loading moves on. An abort stops immediately.
    pub fn materialize(&mut self, policy: &mut dyn ErrorPolicy) -> Result<(), FatalAbort> {
        let loader = self.loader.as_deref();
        for subset in &mut self.subsets {
            let pending = subset.pending_count();
            if pending == 0 {
                continue;
            }
            for pos in 0..subset.entries.len() {
                subset.materialize_at(pos, &self.categories, loader, policy)?;
            }
            debug!(
                "materialized subset '{}': {} pending entr(ies) processed, {} item(s) available",
                subset.name,
                pending,
                subset.len()
            );
        }
        Ok(())
    }

    /// Returns one item, loading it first if it is still pending.
    ///
    /// `Ok(None)` means the item does not exist or failed to load.
    pub fn get(
        &mut self,
        subset: &str,
        id: &str,
        policy: &mut dyn ErrorPolicy,
    ) -> Result<Option<&DatasetItem>, FatalAbort> {
        let loader = self.loader.as_deref();
        let Some(target) = self.subsets.iter_mut().find(|s| s.name == subset) else {
            return Ok(None);
        };
        let Some(&pos) = target.positions.get(id) else {
            return Ok(None);
        };

        target.materialize_at(pos, &self.categories, loader, policy)?;
        Ok(match &target.entries[pos].1 {
            ItemSlot::Loaded(item) => Some(item),
            _ => None,
        })
    }

    /// All loaded items, subset by subset. See [`Subset::iter`].
    pub fn items(&self) -> impl Iterator<Item = &DatasetItem> {
        self.subsets.iter().flat_map(Subset::iter)
    }

    /// Loads whatever is still pending, then iterates the items that made
    /// it through `policy`, subset by subset in list order.
    pub fn load_items(
        &mut self,
        policy: &mut dyn ErrorPolicy,
    ) -> Result<impl Iterator<Item = &DatasetItem>, FatalAbort> {
        self.materialize(policy)?;
        Ok(self.items())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{FailFast, Tolerant};

    #[derive(Debug)]
    struct StubLoader;

    impl ItemLoader for StubLoader {
        fn load(
            &self,
            item: &ItemRef,
            media_path: &Path,
            _categories: &LabelCategories,
        ) -> Result<DatasetItem, DsportError> {
            match media_path.to_str() {
                Some("bad_field.jpg") => Err(DsportError::Structural {
                    path: media_path.with_extension("txt"),
                    line: 1,
                    message: "unexpected field count 3".to_string(),
                }),
                Some("missing.jpg") => Err(DsportError::ImageInfoMissing {
                    path: media_path.to_path_buf(),
                }),
                _ => Ok(DatasetItem::new(item.id.clone(), item.subset.clone())
                    .with_annotation(Annotation::bbox(1.0, 2.0, 3.0, 4.0, 0))),
            }
        }
    }

    fn lazy_dataset() -> Dataset {
        let mut dataset = Dataset::new(LabelCategories::from_names(["cat"]).unwrap())
            .with_loader(Box::new(StubLoader));
        let train = dataset.subset_mut("train");
        train.insert_pending("a", "a.jpg");
        train.insert_pending("b", "bad_field.jpg");
        train.insert_pending("c", "missing.jpg");
        train.insert_pending("d", "d.jpg");
        dataset
    }

    #[test]
    fn tolerant_materialize_evicts_failures() {
        let mut dataset = lazy_dataset();
        let mut policy = Tolerant::new();

        dataset.materialize(&mut policy).expect("tolerant never aborts");

        let ids: Vec<&str> = dataset.items().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "d"]);
        assert_eq!(dataset.len(), 2);
        assert_eq!(policy.report().annotation_count(), 1);
        assert_eq!(policy.report().item_count(), 1);

        let train = dataset.subset("train").unwrap();
        assert!(matches!(train.slot("b"), Some(ItemSlot::Failed)));
    }

    #[test]
    fn fail_fast_materialize_stops_at_first_failure() {
        let mut dataset = lazy_dataset();
        let err = dataset.materialize(&mut FailFast).unwrap_err();

        assert!(matches!(err.cause(), DsportError::Annotation { item, .. } if item.id == "b"));
        let train = dataset.subset("train").unwrap();
        assert!(matches!(train.slot("a"), Some(ItemSlot::Loaded(_))));
        assert!(matches!(train.slot("d"), Some(ItemSlot::Pending(_))));
    }

    #[test]
    fn load_items_yields_loaded_entries_in_order() {
        let mut dataset = lazy_dataset();
        let mut policy = Tolerant::new();

        let ids: Vec<String> = dataset
            .load_items(&mut policy)
            .expect("tolerant never aborts")
            .map(|item| item.id.clone())
            .collect();
        assert_eq!(ids, vec!["a", "d"]);
        assert_eq!(dataset.subset("train").unwrap().pending_count(), 0);
    }

    #[test]
    fn load_items_surfaces_abort() {
        let mut dataset = lazy_dataset();
        let err = dataset.load_items(&mut FailFast).err().expect("abort on 'b'");
        assert!(matches!(err.cause(), DsportError::Annotation { item, .. } if item.id == "b"));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "unloaded entr")]
    fn iterating_pending_subset_panics_in_debug() {
        let dataset = lazy_dataset();
        let _ = dataset.items().count();
    }

    #[test]
    fn get_loads_on_first_access_and_caches() {
        let mut dataset = lazy_dataset();
        let mut policy = FailFast;

        let item = dataset.get("train", "d", &mut policy).unwrap().unwrap();
        assert_eq!(item.annotations.len(), 1);
        assert_eq!(dataset.subset("train").unwrap().pending_count(), 3);
        assert!(matches!(
            dataset.subset("train").unwrap().slot("d"),
            Some(ItemSlot::Loaded(_))
        ));
        assert!(dataset.get("train", "zzz", &mut policy).unwrap().is_none());
        assert!(dataset.get("val", "d", &mut policy).unwrap().is_none());
    }

    #[test]
    fn repeated_ids_keep_first_position() {
        let mut subset = Subset::new("train");
        subset.insert(DatasetItem::new("x", "ignored"));
        subset.insert(DatasetItem::new("y", "ignored"));
        subset.insert(
            DatasetItem::new("x", "ignored").with_annotation(Annotation::bbox(0.0, 0.0, 1.0, 1.0, 0)),
        );

        let items: Vec<&DatasetItem> = subset.iter().collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, "x");
        assert_eq!(items[0].annotations.len(), 1);
        assert_eq!(items[0].subset, "train");
    }

    #[test]
    fn pending_without_loader_is_an_item_error() {
        let mut dataset = Dataset::new(LabelCategories::new());
        dataset.subset_mut("train").insert_pending("a", "a.jpg");

        let mut policy = Tolerant::new();
        dataset.materialize(&mut policy).unwrap();
        assert!(dataset.is_empty());
        assert_eq!(policy.report().item_count(), 1);
    }
}

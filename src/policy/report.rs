//! Record of everything a tolerant run dropped.
//!
//! Mirrors the way a conversion summary is printed: counts first, then one
//! line per skipped record.

use std::fmt;

use crate::error::DsportError;
use crate::ir::ItemRef;

/// Granularity of a skipped record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipKind {
    Item,
    Annotation,
}

/// One skipped record and the classified error behind it.
#[derive(Debug)]
pub struct SkipRecord {
    pub kind: SkipKind,
    pub error: DsportError,
}

impl SkipRecord {
    /// The item the error was reported against.
    pub fn item(&self) -> Option<&ItemRef> {
        match &self.error {
            DsportError::Item { item, .. } | DsportError::Annotation { item, .. } => Some(item),
            _ => None,
        }
    }
}

/// Skipped records in the order they were reported.
#[derive(Debug, Default)]
pub struct SkipReport {
    records: Vec<SkipRecord>,
}

impl SkipReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, kind: SkipKind, error: DsportError) {
        self.records.push(SkipRecord { kind, error });
    }

    pub fn records(&self) -> &[SkipRecord] {
        &self.records
    }

    pub fn item_count(&self) -> usize {
        self.count(SkipKind::Item)
    }

    pub fn annotation_count(&self) -> usize {
        self.count(SkipKind::Annotation)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn count(&self, kind: SkipKind) -> usize {
        self.records.iter().filter(|r| r.kind == kind).count()
    }
}

impl fmt::Display for SkipReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.records.is_empty() {
            return writeln!(f, "No records skipped.");
        }

        writeln!(
            f,
            "Skipped {} item(s) and {} annotation group(s):",
            self.item_count(),
            self.annotation_count()
        )?;
        for record in &self.records {
            let tag = match record.kind {
                SkipKind::Item => "item",
                SkipKind::Annotation => "annotation",
            };
            writeln!(f, "  - [{}] {}", tag, record.error)?;
        }
        Ok(())
    }
}

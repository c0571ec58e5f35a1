//! Per-record error isolation for batch conversions.
//!
//! Readers and writers hand every per-item or per-annotation failure to an
//! [`ErrorPolicy`]. The policy answers with a [`PolicyOutcome`]:
//!
//! - [`PolicyOutcome::Continue`]: the caller drops the offending record and
//!   moves on to the next one.
//! - [`PolicyOutcome::Abort`]: the caller stops and returns the
//!   [`FatalAbort`] up to the `convert`/`patch` boundary without handling it.
//!
//! Raw errors are wrapped as [`DsportError::Item`] or
//! [`DsportError::Annotation`] with the original kept as the source. An error
//! that already is an abort is handed back unchanged and never wrapped again.

pub mod report;

pub use report::{SkipKind, SkipRecord, SkipReport};

use log::warn;

use crate::error::{DsportError, FatalAbort};
use crate::ir::ItemRef;

/// What the caller must do after reporting an error.
#[must_use = "skip the record on Continue, stop the run on Abort"]
#[derive(Debug)]
pub enum PolicyOutcome {
    Continue,
    Abort(FatalAbort),
}

impl PolicyOutcome {
    /// `Ok(())` to skip and continue, `Err` to unwind with `?`.
    pub fn into_result(self) -> Result<(), FatalAbort> {
        match self {
            PolicyOutcome::Continue => Ok(()),
            PolicyOutcome::Abort(abort) => Err(abort),
        }
    }

    pub fn is_abort(&self) -> bool {
        matches!(self, PolicyOutcome::Abort(_))
    }
}

/// Decides whether a conversion continues past a bad record.
///
/// Implementors override the `handle_*` hooks; the `report_*` entry points
/// do the wrapping and must not be overridden to wrap aborts.
pub trait ErrorPolicy {
    /// Reports a failure of a whole item. On `Continue` the item is skipped.
    fn report_item_error(&mut self, error: DsportError, item: &ItemRef) -> PolicyOutcome {
        match error {
            DsportError::Aborted(abort) => PolicyOutcome::Abort(abort),
            other => self.handle_item_error(DsportError::Item {
                item: item.clone(),
                source: Box::new(other),
            }),
        }
    }

    /// Reports a failure in an item's annotations. On `Continue` the
    /// annotation is skipped.
    fn report_annotation_error(&mut self, error: DsportError, item: &ItemRef) -> PolicyOutcome {
        match error {
            DsportError::Aborted(abort) => PolicyOutcome::Abort(abort),
            other => self.handle_annotation_error(DsportError::Annotation {
                item: item.clone(),
                source: Box::new(other),
            }),
        }
    }

    /// Receives an already wrapped [`DsportError::Item`].
    fn handle_item_error(&mut self, error: DsportError) -> PolicyOutcome {
        fail(error)
    }

    /// Receives an already wrapped [`DsportError::Annotation`].
    fn handle_annotation_error(&mut self, error: DsportError) -> PolicyOutcome {
        fail(error)
    }
}

/// Escalates `error` to an abort.
pub fn fail(error: DsportError) -> PolicyOutcome {
    PolicyOutcome::Abort(FatalAbort::new(error))
}

/// Aborts on the first reported error. This is the default.
#[derive(Clone, Copy, Debug, Default)]
pub struct FailFast;

impl ErrorPolicy for FailFast {}

/// Logs and records every reported error, then lets the batch continue.
#[derive(Debug, Default)]
pub struct Tolerant {
    report: SkipReport,
}

impl Tolerant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self) -> &SkipReport {
        &self.report
    }

    pub fn into_report(self) -> SkipReport {
        self.report
    }
}

impl ErrorPolicy for Tolerant {
    fn handle_item_error(&mut self, error: DsportError) -> PolicyOutcome {
        warn!("skipping item: {error}");
        self.report.record(SkipKind::Item, error);
        PolicyOutcome::Continue
    }

    fn handle_annotation_error(&mut self, error: DsportError) -> PolicyOutcome {
        warn!("skipping annotation: {error}");
        self.report.record(SkipKind::Annotation, error);
        PolicyOutcome::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;
    use std::path::PathBuf;

    fn structural() -> DsportError {
        DsportError::Structural {
            path: PathBuf::from("a.txt"),
            line: 3,
            message: "unexpected field count 4".to_string(),
        }
    }

    fn item() -> ItemRef {
        ItemRef::new("img1", "train")
    }

    #[test]
    fn fail_fast_aborts_with_chained_item_error() {
        let mut policy = FailFast;
        let outcome = policy.report_item_error(structural(), &item());

        let PolicyOutcome::Abort(abort) = outcome else {
            panic!("expected abort");
        };
        match abort.cause() {
            DsportError::Item { item, source } => {
                assert_eq!(item.id, "img1");
                assert!(matches!(**source, DsportError::Structural { line: 3, .. }));
            }
            other => panic!("expected Item error, got {other:?}"),
        }
        assert!(abort.source().is_some());
    }

    #[test]
    fn tolerant_records_and_continues() {
        let mut policy = Tolerant::new();
        assert!(!policy.report_item_error(structural(), &item()).is_abort());
        assert!(!policy
            .report_annotation_error(structural(), &item())
            .is_abort());

        let report = policy.report();
        assert_eq!(report.item_count(), 1);
        assert_eq!(report.annotation_count(), 1);
        assert!(matches!(
            report.records()[1].error,
            DsportError::Annotation { .. }
        ));
    }

    #[test]
    fn abort_is_reraised_verbatim() {
        let mut fail_fast = FailFast;
        let PolicyOutcome::Abort(abort) = fail_fast.report_item_error(structural(), &item()) else {
            panic!("expected abort");
        };

        // Even a tolerant policy must hand an existing abort back untouched.
        let mut tolerant = Tolerant::new();
        let outcome = tolerant.report_annotation_error(DsportError::Aborted(abort), &item());
        let PolicyOutcome::Abort(again) = outcome else {
            panic!("abort must not be swallowed");
        };
        assert!(matches!(again.cause(), DsportError::Item { .. }));
        assert!(tolerant.report().is_empty());
    }

    #[test]
    fn into_result_maps_outcomes() {
        assert!(PolicyOutcome::Continue.into_result().is_ok());
        assert!(fail(structural()).into_result().is_err());
    }
}

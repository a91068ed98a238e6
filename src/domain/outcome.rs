//! Value types flowing from the render stage to the rewrite stage.

use std::path::PathBuf;

use crate::domain::formula::FormulaSpan;

/// A rendered artifact paired with the span it replaces.
///
/// Artifact identifiers are assigned in call order while renders complete in
/// arbitrary order, so the originating span is carried explicitly rather
/// than inferred from completion order.
#[derive(Debug, Clone)]
pub struct RenderedFormula {
    pub artifact: PathBuf,
    pub span: FormulaSpan,
}

/// Everything the rewrite stage needs for one document.
///
/// Produced by the document pipeline, consumed by the rewrite pass, never
/// mutated in between. `results` is sorted by ascending span start offset.
#[derive(Debug, Clone)]
pub struct DocumentOutcome {
    pub document: PathBuf,
    pub results: Vec<RenderedFormula>,
}

impl DocumentOutcome {
    /// Outcome for a document without any formula blocks; such documents are
    /// excluded from the rewrite pass.
    pub fn empty(document: PathBuf) -> Self {
        Self {
            document,
            results: Vec::new(),
        }
    }

    pub fn has_results(&self) -> bool {
        !self.results.is_empty()
    }
}

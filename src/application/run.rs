//! Run-level sequencing: fan-out across documents, aggregation, and the
//! final rewrite pass.

use std::{io, path::Path, sync::Arc};

use futures::future;
use tokio::fs;
use tracing::{error, info, warn};

use crate::{
    config::Settings,
    domain::outcome::{DocumentOutcome, RenderedFormula},
    infra::{
        discovery,
        error::InfraError,
        export::RasterExporter,
        typeset::{TypesetOptions, Typesetter},
    },
};

use super::{
    coordinator::RenderCoordinator, error::AppError, namer::ArtifactNamer,
    pipeline::DocumentPipeline,
};

#[derive(Debug, Clone, Copy)]
pub struct RunSummary {
    pub processed: usize,
    pub rewritten: usize,
}

/// Execute one full run: discover documents, render every document's
/// formulas concurrently, then rewrite the documents whose renders all
/// succeeded.
///
/// A document's render failure aborts only that document; siblings complete
/// independently, and the rewrite pass begins once every pipeline has
/// settled. The run as a whole fails (non-zero exit) when any document's
/// render stage failed.
pub async fn run(settings: &Settings) -> Result<RunSummary, AppError> {
    let workdir = settings.workdir.as_path();
    let artifact_root = workdir.join(&settings.artifacts.directory);
    let backup_root = workdir.join(&settings.artifacts.backup_directory);

    fs::create_dir_all(&backup_root)
        .await
        .map_err(InfraError::Io)?;

    let namer = Arc::new(ArtifactNamer::initialize(
        &artifact_root,
        &settings.artifacts.raster_extension,
    )?);
    let typesetter = Arc::new(Typesetter::new(
        settings.typeset.cli_path.clone(),
        TypesetOptions {
            format: settings.typeset.format,
            scale: settings.typeset.scale,
            display_errors: settings.typeset.display_errors,
            undefined_char_error: settings.typeset.undefined_char_error,
        },
    ));
    let exporter = Arc::new(RasterExporter::new(settings.export.cli_path.clone()));
    let coordinator = RenderCoordinator::new(
        typesetter,
        exporter,
        namer,
        settings.artifacts.raster_extension.clone(),
    );
    let pipeline = DocumentPipeline::new(coordinator, backup_root, artifact_root);

    let documents = discovery::documents(
        workdir,
        &settings.documents.chapter_prefix,
        &settings.documents.extension,
    )
    .map_err(InfraError::Io)?;
    info!(
        target = "application::run",
        documents = documents.len(),
        workdir = %workdir.display(),
        "Starting run"
    );

    let settled = future::join_all(documents.iter().map(|document| {
        let pipeline = pipeline.clone();
        async move { (document.clone(), pipeline.process(document).await) }
    }))
    .await;

    let total = settled.len();
    let mut failed = 0usize;
    let mut outcomes = Vec::with_capacity(total);
    for (document, result) in settled {
        match result {
            Ok(outcome) => outcomes.push(outcome),
            Err(err) => {
                failed += 1;
                error!(
                    target = "application::run",
                    document = %document.display(),
                    error = %err,
                    "Document render failed; leaving document unmodified"
                );
            }
        }
    }

    // Best-effort stage: a single document's rewrite failure is logged and
    // does not abort the rest of the run.
    let mut rewritten = 0usize;
    for outcome in outcomes.iter().filter(|outcome| outcome.has_results()) {
        match rewrite_document(workdir, outcome).await {
            Ok(true) => rewritten += 1,
            Ok(false) => {}
            Err(err) => warn!(
                target = "application::run",
                document = %outcome.document.display(),
                error = %err,
                "Failed to rewrite document"
            ),
        }
    }

    if failed > 0 {
        return Err(AppError::Render { failed, total });
    }
    Ok(RunSummary {
        processed: total,
        rewritten,
    })
}

/// Replace each rendered span in the document with an image reference.
/// Returns `Ok(false)` when the document no longer matches the scanned
/// spans and was skipped.
async fn rewrite_document(workdir: &Path, outcome: &DocumentOutcome) -> Result<bool, io::Error> {
    let text = fs::read_to_string(&outcome.document).await?;
    let Some(rewritten) = splice_references(&text, &outcome.results, workdir) else {
        warn!(
            target = "application::run",
            document = %outcome.document.display(),
            "Document changed between scan and rewrite; skipping"
        );
        return Ok(false);
    };
    fs::write(&outcome.document, rewritten).await?;
    info!(
        target = "application::run",
        document = %outcome.document.display(),
        formulas = outcome.results.len(),
        "Document rewritten"
    );
    Ok(true)
}

/// Offset-based exact-span replacement. Every recorded span is re-validated
/// against the current text before splicing; any mismatch returns `None` so
/// artifacts are never misassigned to the wrong occurrence.
fn splice_references(
    text: &str,
    results: &[RenderedFormula],
    workdir: &Path,
) -> Option<String> {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;
    for result in results {
        let span = &result.span;
        if span.start < cursor || text.get(span.start..span.end) != Some(span.raw.as_str()) {
            return None;
        }
        out.push_str(&text[cursor..span.start]);
        out.push_str("![](");
        out.push_str(&embed_target(&result.artifact, workdir));
        out.push(')');
        cursor = span.end;
    }
    out.push_str(&text[cursor..]);
    Some(out)
}

/// Image target relative to the document. Documents sit one level deep in
/// chapter directories, so the workdir prefix is swapped for `../`.
fn embed_target(artifact: &Path, workdir: &Path) -> String {
    match artifact.strip_prefix(workdir) {
        Ok(relative) => format!("../{}", relative.display()),
        Err(_) => artifact.display().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use crate::domain::formula::{self, FormulaSpan};

    use super::*;

    fn result_for(span: FormulaSpan, artifact: &str) -> RenderedFormula {
        RenderedFormula {
            artifact: PathBuf::from(artifact),
            span,
        }
    }

    #[test]
    fn splices_references_in_offset_order() {
        let text = "one ```mr x ```mrend two ```mr y ```mrend three";
        let spans = formula::scan(text);
        let results = vec![
            result_for(spans[0].clone(), "book/assets/formula/doc.md/1.png"),
            result_for(spans[1].clone(), "book/assets/formula/doc.md/2.png"),
        ];

        let rewritten =
            splice_references(text, &results, Path::new("book")).expect("spliced");
        assert_eq!(
            rewritten,
            "one ![](../assets/formula/doc.md/1.png) two ![](../assets/formula/doc.md/2.png) three"
        );
    }

    #[test]
    fn stale_text_is_rejected_rather_than_misassigned() {
        let text = "one ```mr x ```mrend two";
        let spans = formula::scan(text);
        let results = vec![result_for(spans[0].clone(), "book/assets/1.png")];

        let edited = text.replace("one", "ONE!");
        assert!(splice_references(&edited, &results, Path::new("book")).is_none());
    }

    #[test]
    fn rewrite_of_rewritten_text_is_a_noop() {
        let text = "one ```mr x ```mrend two";
        let spans = formula::scan(text);
        let results = vec![result_for(spans[0].clone(), "book/assets/1.png")];

        let rewritten = splice_references(text, &results, Path::new("book")).expect("spliced");
        assert!(formula::scan(&rewritten).is_empty());
    }

    #[test]
    fn embed_target_outside_workdir_falls_back_to_full_path() {
        let target = embed_target(Path::new("/elsewhere/1.png"), Path::new("book"));
        assert_eq!(target, "/elsewhere/1.png");
    }
}

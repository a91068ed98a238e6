//! Concurrent rendering of all formula spans in one document.

use std::{io, path::Path, sync::Arc};

use futures::future;
use thiserror::Error;
use tokio::fs;
use tracing::debug;

use crate::{
    domain::{
        formula::{self, FormulaSpan},
        outcome::RenderedFormula,
    },
    infra::{
        export::{ExportError, RasterExporter},
        typeset::{TypesetError, Typesetter},
    },
};

use super::namer::ArtifactNamer;

const VECTOR_EXTENSION: &str = "svg";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Typeset(#[from] TypesetError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("io error while rendering artifact: {0}")]
    Io(#[from] io::Error),
}

/// Drives the typeset and export collaborators for every span of a document.
#[derive(Debug, Clone)]
pub struct RenderCoordinator {
    typesetter: Arc<Typesetter>,
    exporter: Arc<RasterExporter>,
    namer: Arc<ArtifactNamer>,
    raster_extension: String,
}

impl RenderCoordinator {
    pub fn new(
        typesetter: Arc<Typesetter>,
        exporter: Arc<RasterExporter>,
        namer: Arc<ArtifactNamer>,
        raster_extension: impl Into<String>,
    ) -> Self {
        Self {
            typesetter,
            exporter,
            namer,
            raster_extension: raster_extension.into(),
        }
    }

    /// Render every span concurrently (unbounded fan-out) and wait for all of
    /// them. Identifiers are assigned in call order while completion order is
    /// unconstrained, so each result carries its originating span and the
    /// collected batch is sorted back into ascending offset order. Any
    /// typeset, export, or file failure fails the whole batch.
    pub async fn render_all(
        &self,
        spans: Vec<FormulaSpan>,
        out_dir: &Path,
    ) -> Result<Vec<RenderedFormula>, RenderError> {
        let renders = spans.into_iter().map(|span| self.render_one(span, out_dir));
        let mut results = future::try_join_all(renders).await?;
        results.sort_by_key(|result| result.span.start);
        Ok(results)
    }

    async fn render_one(
        &self,
        span: FormulaSpan,
        out_dir: &Path,
    ) -> Result<RenderedFormula, RenderError> {
        let source = formula::strip_markers(&span.raw);
        let id = self.namer.next();

        let svg = self.typesetter.typeset(&source).await?;
        let vector_path = out_dir.join(format!("{id}.{VECTOR_EXTENSION}"));
        let raster_path = out_dir.join(format!("{id}.{}", self.raster_extension));

        fs::write(&vector_path, format!("{svg}\n")).await?;
        self.exporter.export(&vector_path, &raster_path).await?;
        fs::remove_file(&vector_path).await?;

        debug!(
            target = "application::coordinator",
            artifact = %raster_path.display(),
            id,
            "Formula rendered"
        );
        Ok(RenderedFormula {
            artifact: raster_path,
            span,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::{fs, os::unix::fs::PermissionsExt, path::PathBuf};

    use tempfile::TempDir;

    use crate::infra::typeset::TypesetOptions;

    use super::*;

    fn make_executable(path: &PathBuf) {
        let mut perms = fs::metadata(path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).expect("set perms");
    }

    fn fake_typesetter(dir: &TempDir) -> Arc<Typesetter> {
        let script_path = dir.path().join("fake-typeset");
        fs::write(
            &script_path,
            r#"#!/bin/sh
set -eu
for arg in "$@"; do formula="$arg"; done
case "$formula" in
  *fail*)
    echo "typeset error: $formula" >&2
    exit 3
    ;;
esac
printf '<svg>%s</svg>' "$formula"
"#,
        )
        .expect("write script");
        make_executable(&script_path);
        Arc::new(Typesetter::new(script_path, TypesetOptions::default()))
    }

    fn fake_exporter(dir: &TempDir) -> Arc<RasterExporter> {
        let script_path = dir.path().join("fake-export");
        fs::write(
            &script_path,
            r#"#!/bin/sh
set -eu
cp "$1" "$2"
"#,
        )
        .expect("write script");
        make_executable(&script_path);
        Arc::new(RasterExporter::new(script_path))
    }

    fn span(raw: &str, start: usize) -> FormulaSpan {
        FormulaSpan {
            raw: raw.to_owned(),
            start,
            end: start + raw.len(),
        }
    }

    #[tokio::test]
    async fn renders_spans_and_preserves_document_order() {
        let dir = TempDir::new().expect("temp dir");
        let out_dir = dir.path().join("out");
        fs::create_dir_all(&out_dir).expect("mkdir");

        let coordinator = RenderCoordinator::new(
            fake_typesetter(&dir),
            fake_exporter(&dir),
            Arc::new(ArtifactNamer::starting_at(0)),
            "png",
        );

        let spans = vec![
            span("```mr a ```mrend", 0),
            span("```mr b ```mrend", 40),
            span("```mr c ```mrend", 80),
        ];
        let results = coordinator
            .render_all(spans.clone(), &out_dir)
            .await
            .expect("render");

        assert_eq!(results.len(), 3);
        for (result, expected) in results.iter().zip(&spans) {
            assert_eq!(&result.span, expected);
        }
        for id in 1..=3u64 {
            assert!(out_dir.join(format!("{id}.png")).is_file());
            assert!(!out_dir.join(format!("{id}.svg")).exists());
        }
        let rendered = fs::read_to_string(&results[0].artifact).expect("read artifact");
        assert_eq!(rendered, "<svg>a</svg>\n");
    }

    #[tokio::test]
    async fn one_bad_formula_fails_the_whole_batch() {
        let dir = TempDir::new().expect("temp dir");
        let out_dir = dir.path().join("out");
        fs::create_dir_all(&out_dir).expect("mkdir");

        let coordinator = RenderCoordinator::new(
            fake_typesetter(&dir),
            fake_exporter(&dir),
            Arc::new(ArtifactNamer::starting_at(0)),
            "png",
        );

        let spans = vec![
            span("```mr ok ```mrend", 0),
            span("```mr fail ```mrend", 40),
            span("```mr also-ok ```mrend", 80),
        ];
        let err = coordinator
            .render_all(spans, &out_dir)
            .await
            .expect_err("batch failure");
        assert!(matches!(err, RenderError::Typeset(TypesetError::Cli { .. })));
    }
}

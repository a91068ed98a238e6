//! Per-document orchestration: read, scan, back up, render.

use std::{
    io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

use crate::domain::{formula, outcome::DocumentOutcome};

use super::coordinator::{RenderCoordinator, RenderError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to read document: {0}")]
    Read(io::Error),
    #[error("failed to back up document: {0}")]
    Backup(io::Error),
    #[error("failed to create artifact directory: {0}")]
    OutputDir(io::Error),
    #[error("document path has no file name: {0}")]
    InvalidPath(PathBuf),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Processes one document at a time: each instance owns the text it reads,
/// so no locking is needed around document content.
#[derive(Debug, Clone)]
pub struct DocumentPipeline {
    coordinator: RenderCoordinator,
    backup_root: PathBuf,
    artifact_root: PathBuf,
}

impl DocumentPipeline {
    pub fn new(
        coordinator: RenderCoordinator,
        backup_root: PathBuf,
        artifact_root: PathBuf,
    ) -> Self {
        Self {
            coordinator,
            backup_root,
            artifact_root,
        }
    }

    /// Scan a document and render all of its formula blocks.
    ///
    /// A document without formula blocks completes with an empty outcome and
    /// is left untouched: no backup, no artifact directory, no render. Any
    /// read, backup, or render failure fails the whole invocation; no
    /// partial outcome is returned.
    pub async fn process(&self, document: &Path) -> Result<DocumentOutcome, PipelineError> {
        let text = fs::read_to_string(document)
            .await
            .map_err(PipelineError::Read)?;
        let spans = formula::scan(&text);
        if spans.is_empty() {
            debug!(
                target = "application::pipeline",
                document = %document.display(),
                "No formula blocks found"
            );
            return Ok(DocumentOutcome::empty(document.to_owned()));
        }

        let filename = document
            .file_name()
            .ok_or_else(|| PipelineError::InvalidPath(document.to_owned()))?;

        info!(
            target = "application::pipeline",
            document = %document.display(),
            spans = spans.len(),
            "Rendering formula blocks"
        );

        fs::copy(document, self.backup_root.join(filename))
            .await
            .map_err(PipelineError::Backup)?;

        let out_dir = self.artifact_root.join(filename);
        fs::create_dir_all(&out_dir)
            .await
            .map_err(PipelineError::OutputDir)?;

        let results = self.coordinator.render_all(spans, &out_dir).await?;
        Ok(DocumentOutcome {
            document: document.to_owned(),
            results,
        })
    }
}

//! The external raster export collaborator: one SVG file in, one PNG file out.

use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    process::Stdio,
    time::Instant,
};

use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to invoke export CLI: {0}")]
    Io(io::Error),
    #[error("export CLI unavailable: {0}")]
    NotFound(io::Error),
    #[error("raster export failed (exit {exit_code:?}): {stderr}")]
    Cli {
        exit_code: Option<i32>,
        stderr: String,
    },
}

/// Wrapper around the vector-to-raster export executable. The CLI takes the
/// input and output paths as positional arguments; errors are propagated,
/// never retried.
#[derive(Debug, Clone)]
pub struct RasterExporter {
    cli_path: PathBuf,
}

impl RasterExporter {
    pub fn new(cli_path: PathBuf) -> Self {
        Self { cli_path }
    }

    pub async fn export(&self, input: &Path, output: &Path) -> Result<(), ExportError> {
        let started_at = Instant::now();

        let result = Command::new(&self.cli_path)
            .arg(input)
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|err| {
                warn!(
                    target = "infra::export",
                    op = "export",
                    result = "error",
                    error_code = "spawn_cli",
                    cli_path = %self.cli_path.display(),
                    error = %err,
                    "Failed to spawn export CLI"
                );
                if err.kind() == ErrorKind::NotFound {
                    ExportError::NotFound(err)
                } else {
                    ExportError::Io(err)
                }
            })?;

        if !result.status.success() {
            let exit_code = result.status.code();
            let stderr = String::from_utf8_lossy(&result.stderr).into_owned();
            warn!(
                target = "infra::export",
                op = "export",
                result = "error",
                error_code = "export_cli",
                exit_code = exit_code.map(i64::from).unwrap_or(-1),
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                input = %input.display(),
                stderr = %stderr,
                "Export CLI invocation failed"
            );
            return Err(ExportError::Cli { exit_code, stderr });
        }

        info!(
            target = "infra::export",
            op = "export",
            result = "ok",
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            input = %input.display(),
            output = %output.display(),
            "Artifact exported"
        );
        Ok(())
    }
}

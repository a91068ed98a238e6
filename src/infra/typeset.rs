//! The external typesetting collaborator: formula source in, SVG data out.

use std::{
    io::{self, ErrorKind},
    path::PathBuf,
    process::Stdio,
    str::FromStr,
    time::Instant,
};

use thiserror::Error;
use tokio::process::Command;
use tracing::{info, warn};

/// Input language handed to the typesetting CLI.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FormulaFormat {
    #[default]
    Tex,
    InlineTex,
    MathMl,
}

impl FormulaFormat {
    fn as_arg(self) -> &'static str {
        match self {
            FormulaFormat::Tex => "TeX",
            FormulaFormat::InlineTex => "inline-TeX",
            FormulaFormat::MathMl => "MathML",
        }
    }
}

impl FromStr for FormulaFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "tex" => Ok(FormulaFormat::Tex),
            "inline-tex" => Ok(FormulaFormat::InlineTex),
            "mathml" => Ok(FormulaFormat::MathMl),
            other => Err(format!(
                "unknown formula format `{other}` (expected tex, inline-tex, or mathml)"
            )),
        }
    }
}

/// Explicit typesetting options, fixed at process start.
#[derive(Debug, Clone)]
pub struct TypesetOptions {
    /// Input language. Default: TeX.
    pub format: FormulaFormat,
    /// Output scale factor. Default: 1.0.
    pub scale: f64,
    /// Report typesetting errors instead of rendering an error box. Default: true.
    pub display_errors: bool,
    /// Treat undefined characters as errors. Default: true.
    pub undefined_char_error: bool,
}

impl Default for TypesetOptions {
    fn default() -> Self {
        Self {
            format: FormulaFormat::Tex,
            scale: 1.0,
            display_errors: true,
            undefined_char_error: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum TypesetError {
    #[error("failed to invoke typesetting CLI: {0}")]
    Io(io::Error),
    #[error("typesetting CLI unavailable: {0}")]
    NotFound(io::Error),
    #[error("typesetting failed (exit {exit_code:?}): {stderr}")]
    Cli {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("typesetting CLI produced non-UTF-8 output")]
    InvalidOutput,
}

/// Wrapper around the typesetting executable. No extensions are loaded; the
/// options are baked in at construction and shared by every invocation.
#[derive(Debug, Clone)]
pub struct Typesetter {
    cli_path: PathBuf,
    options: TypesetOptions,
}

impl Typesetter {
    pub fn new(cli_path: PathBuf, options: TypesetOptions) -> Self {
        Self { cli_path, options }
    }

    /// Typeset one formula, returning the SVG data printed on stdout.
    pub async fn typeset(&self, formula: &str) -> Result<String, TypesetError> {
        let started_at = Instant::now();

        let mut command = Command::new(&self.cli_path);
        command
            .arg("--format")
            .arg(self.options.format.as_arg())
            .arg("--scale")
            .arg(self.options.scale.to_string());
        if self.options.display_errors {
            command.arg("--display-errors");
        }
        if self.options.undefined_char_error {
            command.arg("--undefined-char-error");
        }
        command
            .arg("--")
            .arg(formula)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let output = command.output().await.map_err(|err| {
            warn!(
                target = "infra::typeset",
                op = "typeset",
                result = "error",
                error_code = "spawn_cli",
                cli_path = %self.cli_path.display(),
                error = %err,
                "Failed to spawn typesetting CLI"
            );
            if err.kind() == ErrorKind::NotFound {
                TypesetError::NotFound(err)
            } else {
                TypesetError::Io(err)
            }
        })?;

        if !output.status.success() {
            let exit_code = output.status.code();
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            warn!(
                target = "infra::typeset",
                op = "typeset",
                result = "error",
                error_code = "typeset_cli",
                exit_code = exit_code.map(i64::from).unwrap_or(-1),
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                stderr = %stderr,
                "Typesetting CLI invocation failed"
            );
            return Err(TypesetError::Cli { exit_code, stderr });
        }

        let svg = String::from_utf8(output.stdout).map_err(|_| TypesetError::InvalidOutput)?;
        info!(
            target = "infra::typeset",
            op = "typeset",
            result = "ok",
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            svg_bytes = svg.len(),
            "Formula typeset"
        );
        Ok(svg)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::{fs, os::unix::fs::PermissionsExt, path::PathBuf};

    use tempfile::TempDir;

    use super::*;

    fn make_executable(path: &PathBuf) {
        let mut perms = fs::metadata(path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).expect("set perms");
    }

    #[tokio::test]
    async fn captures_svg_from_stdout() {
        let dir = TempDir::new().expect("temp dir");
        let script_path = dir.path().join("fake-typeset");
        let args_path = dir.path().join("args.log");
        let script = format!(
            r#"#!/bin/sh
set -eu
echo "$@" > "{args_file}"
for arg in "$@"; do formula="$arg"; done
printf '<svg>%s</svg>' "$formula"
"#,
            args_file = args_path.display()
        );
        fs::write(&script_path, script).expect("write script");
        make_executable(&script_path);

        let typesetter = Typesetter::new(script_path, TypesetOptions::default());
        let svg = typesetter.typeset("x^2").await.expect("svg");
        assert_eq!(svg, "<svg>x^2</svg>");

        let args = fs::read_to_string(&args_path).expect("read args");
        assert!(args.contains("--format TeX"), "unexpected args: {args}");
        assert!(args.contains("--scale 1"), "unexpected args: {args}");
        assert!(args.contains("--display-errors"), "unexpected args: {args}");
        assert!(
            args.contains("--undefined-char-error"),
            "unexpected args: {args}"
        );
    }

    #[tokio::test]
    async fn surfaces_cli_errors() {
        let dir = TempDir::new().expect("temp dir");
        let script_path = dir.path().join("fake-typeset");
        fs::write(
            &script_path,
            r#"#!/bin/sh
echo "undefined control sequence" >&2
exit 5
"#,
        )
        .expect("write script");
        make_executable(&script_path);

        let typesetter = Typesetter::new(script_path, TypesetOptions::default());
        let err = typesetter.typeset("\\nope").await.expect_err("cli failure");
        match err {
            TypesetError::Cli { exit_code, stderr } => {
                assert_eq!(exit_code, Some(5));
                assert!(stderr.contains("undefined control sequence"));
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_cli_maps_to_not_found() {
        let typesetter = Typesetter::new(
            PathBuf::from("/nonexistent/typeset-cli"),
            TypesetOptions::default(),
        );
        let err = typesetter.typeset("x").await.expect_err("missing cli");
        assert!(matches!(err, TypesetError::NotFound(_)));
    }
}

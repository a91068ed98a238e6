//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{path::PathBuf, str::FromStr};

use clap::{Args, Parser, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::infra::typeset::FormulaFormat;

const LOCAL_CONFIG_BASENAME: &str = "texrast";
const DEFAULT_WORKDIR: &str = ".";
const DEFAULT_CHAPTER_PREFIX: &str = "Chap";
const DEFAULT_DOCUMENT_EXTENSION: &str = "md";
const DEFAULT_ARTIFACT_DIR: &str = "assets/formula";
const DEFAULT_BACKUP_DIR: &str = "backups";
const DEFAULT_RASTER_EXTENSION: &str = "png";
const DEFAULT_TYPESET_CLI_PATH: &str = "tex2svg";
const DEFAULT_EXPORT_CLI_PATH: &str = "svgexport";
const DEFAULT_TYPESET_SCALE: f64 = 1.0;


/// Command-line arguments for the texrast binary.
#[derive(Debug, Parser)]
#[command(
    name = "texrast",
    version,
    about = "Render embedded TeX formula blocks in a Markdown tree to PNG images"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "TEXRAST_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the working root containing the chapter directories.
    #[arg(long = "workdir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub workdir: Option<PathBuf>,

    /// Override the chapter directory name prefix.
    #[arg(long = "documents-chapter-prefix", value_name = "PREFIX")]
    pub chapter_prefix: Option<String>,

    /// Override the document file extension.
    #[arg(long = "documents-extension", value_name = "EXT")]
    pub document_extension: Option<String>,

    /// Override the typesetting CLI executable path.
    #[arg(long = "typeset-cli-path", value_name = "PATH")]
    pub typeset_cli_path: Option<PathBuf>,

    /// Override the formula input format (tex|inline-tex|mathml).
    #[arg(long = "typeset-format", value_name = "FORMAT")]
    pub typeset_format: Option<String>,

    /// Override the typesetting scale factor.
    #[arg(long = "typeset-scale", value_name = "FACTOR")]
    pub typeset_scale: Option<f64>,

    /// Override the raster export CLI executable path.
    #[arg(long = "export-cli-path", value_name = "PATH")]
    pub export_cli_path: Option<PathBuf>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

/// Fully-resolved run settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub workdir: PathBuf,
    pub documents: DocumentSettings,
    pub artifacts: ArtifactSettings,
    pub typeset: TypesetSettings,
    pub export: ExportSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone)]
pub struct DocumentSettings {
    pub chapter_prefix: String,
    pub extension: String,
}

#[derive(Debug, Clone)]
pub struct ArtifactSettings {
    pub directory: PathBuf,
    pub backup_directory: PathBuf,
    pub raster_extension: String,
}

#[derive(Debug, Clone)]
pub struct TypesetSettings {
    pub cli_path: PathBuf,
    pub format: FormulaFormat,
    pub scale: f64,
    pub display_errors: bool,
    pub undefined_char_error: bool,
}

#[derive(Debug, Clone)]
pub struct ExportSettings {
    pub cli_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Parse CLI arguments and load settings with the configured precedence.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let cli = CliArgs::parse();
    let settings = load(&cli)?;
    Ok((cli, settings))
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder =
        Config::builder().add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("TEXRAST").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    workdir: Option<PathBuf>,
    documents: RawDocumentSettings,
    artifacts: RawArtifactSettings,
    typeset: RawTypesetSettings,
    export: RawExportSettings,
    logging: RawLoggingSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDocumentSettings {
    chapter_prefix: Option<String>,
    extension: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawArtifactSettings {
    directory: Option<PathBuf>,
    backup_directory: Option<PathBuf>,
    raster_extension: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawTypesetSettings {
    cli_path: Option<PathBuf>,
    format: Option<String>,
    scale: Option<f64>,
    display_errors: Option<bool>,
    undefined_char_error: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawExportSettings {
    cli_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(workdir) = overrides.workdir.as_ref() {
            self.workdir = Some(workdir.clone());
        }
        if let Some(prefix) = overrides.chapter_prefix.as_ref() {
            self.documents.chapter_prefix = Some(prefix.clone());
        }
        if let Some(extension) = overrides.document_extension.as_ref() {
            self.documents.extension = Some(extension.clone());
        }
        if let Some(path) = overrides.typeset_cli_path.as_ref() {
            self.typeset.cli_path = Some(path.clone());
        }
        if let Some(format) = overrides.typeset_format.as_ref() {
            self.typeset.format = Some(format.clone());
        }
        if let Some(scale) = overrides.typeset_scale {
            self.typeset.scale = Some(scale);
        }
        if let Some(path) = overrides.export_cli_path.as_ref() {
            self.export.cli_path = Some(path.clone());
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            workdir,
            documents,
            artifacts,
            typeset,
            export,
            logging,
        } = raw;

        let workdir = workdir.unwrap_or_else(|| PathBuf::from(DEFAULT_WORKDIR));
        let documents = build_document_settings(documents)?;
        let artifacts = build_artifact_settings(artifacts)?;
        let typeset = build_typeset_settings(typeset)?;
        let export = build_export_settings(export);
        let logging = build_logging_settings(logging)?;

        Ok(Self {
            workdir,
            documents,
            artifacts,
            typeset,
            export,
            logging,
        })
    }
}

fn build_document_settings(
    documents: RawDocumentSettings,
) -> Result<DocumentSettings, LoadError> {
    let chapter_prefix = documents
        .chapter_prefix
        .unwrap_or_else(|| DEFAULT_CHAPTER_PREFIX.to_string());
    if chapter_prefix.is_empty() {
        return Err(LoadError::invalid(
            "documents.chapter_prefix",
            "must not be empty",
        ));
    }

    let extension = documents
        .extension
        .unwrap_or_else(|| DEFAULT_DOCUMENT_EXTENSION.to_string());
    if extension.is_empty() || extension.starts_with('.') {
        return Err(LoadError::invalid(
            "documents.extension",
            "must be a bare extension without a leading dot",
        ));
    }

    Ok(DocumentSettings {
        chapter_prefix,
        extension,
    })
}

fn build_artifact_settings(
    artifacts: RawArtifactSettings,
) -> Result<ArtifactSettings, LoadError> {
    let directory = artifacts
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACT_DIR));
    let backup_directory = artifacts
        .backup_directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKUP_DIR));

    let raster_extension = artifacts
        .raster_extension
        .unwrap_or_else(|| DEFAULT_RASTER_EXTENSION.to_string());
    if raster_extension.is_empty() || raster_extension.starts_with('.') {
        return Err(LoadError::invalid(
            "artifacts.raster_extension",
            "must be a bare extension without a leading dot",
        ));
    }

    Ok(ArtifactSettings {
        directory,
        backup_directory,
        raster_extension,
    })
}

fn build_typeset_settings(typeset: RawTypesetSettings) -> Result<TypesetSettings, LoadError> {
    let cli_path = typeset
        .cli_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TYPESET_CLI_PATH));

    let format = match typeset.format {
        Some(value) => FormulaFormat::from_str(&value)
            .map_err(|reason| LoadError::invalid("typeset.format", reason))?,
        None => FormulaFormat::default(),
    };

    let scale = typeset.scale.unwrap_or(DEFAULT_TYPESET_SCALE);
    if !scale.is_finite() || scale <= 0.0 {
        return Err(LoadError::invalid(
            "typeset.scale",
            "must be a positive finite number",
        ));
    }

    Ok(TypesetSettings {
        cli_path,
        format,
        scale,
        display_errors: typeset.display_errors.unwrap_or(true),
        undefined_char_error: typeset.undefined_char_error.unwrap_or(true),
    })
}

fn build_export_settings(export: RawExportSettings) -> ExportSettings {
    ExportSettings {
        cli_path: export
            .cli_path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_CLI_PATH)),
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

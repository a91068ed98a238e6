//! texrast renders embedded TeX formula blocks in a Markdown tree to PNG
//! images and rewrites the documents to reference the generated files.
//!
//! The crate is split into three layers: [`domain`] holds the pure formula
//! scanning logic and the value types flowing through a run, [`infra`] wraps
//! the external collaborators (document discovery, the typesetting CLI, the
//! raster export CLI, telemetry), and [`application`] coordinates the
//! extraction-render-rewrite pipeline.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;

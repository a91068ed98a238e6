//! Application layer: the extraction-render-rewrite pipeline.

pub mod coordinator;
pub mod error;
pub mod namer;
pub mod pipeline;
pub mod run;

//! Infrastructure layer: external collaborators and process-wide services.

pub mod discovery;
pub mod error;
pub mod export;
pub mod telemetry;
pub mod typeset;

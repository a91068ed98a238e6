//! Domain layer: formula extraction and the value types of a run.

pub mod formula;
pub mod outcome;

//! Core traits implemented by external collaborators.

pub mod engine;

pub use engine::{ConversionEngine, EngineOption};

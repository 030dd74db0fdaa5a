//! # dcm2stl-core
//!
//! Core crate for dcm2stl. Contains the configuration schemas, the
//! control-protocol trait every conversion engine implements, and the
//! unified error system.
//!
//! This crate has **no** internal dependencies on other dcm2stl crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;

pub use error::AppError;
pub use result::AppResult;
pub use traits::engine::{ConversionEngine, EngineOption};

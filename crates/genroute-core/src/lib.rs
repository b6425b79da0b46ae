//! Shared foundation for genroute: the capability model, error kinds,
//! configuration, and media file saving.

pub mod config;
pub mod error;
pub mod media;
pub mod types;
pub mod utils;

pub use error::{GenError, Result};

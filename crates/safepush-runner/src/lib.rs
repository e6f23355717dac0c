//! Validation campaign: configuration, test-case runner, fuzz engine and
//! the push verdict.

pub mod campaign;
pub mod cases;
pub mod config;
pub mod error;
pub mod fuzz;
pub mod verdict;

pub use campaign::*;
pub use cases::*;
pub use config::*;
pub use error::*;
pub use fuzz::*;
pub use verdict::*;

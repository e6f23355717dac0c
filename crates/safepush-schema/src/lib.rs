//! Schema parsing, backwards-compatibility checks, description lint and
//! input resolution against a version's contract.

pub mod compat;
pub mod inputs;
pub mod lint;
pub mod openapi;

pub use compat::*;
pub use inputs::*;
pub use lint::*;
pub use openapi::*;

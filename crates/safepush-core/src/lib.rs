#![forbid(unsafe_code)]

//! Shared model, ports and error taxonomy for the safe-push validation engine.

pub mod backoff;
pub mod case;
pub mod error;
pub mod model;
pub mod outcome;
pub mod ports;
pub mod schema;
pub mod util;
pub mod verdict;

pub use backoff::*;
pub use case::*;
pub use error::*;
pub use model::*;
pub use outcome::*;
pub use ports::*;
pub use schema::*;
pub use util::*;
pub use verdict::*;

//! Output checkers, two-version output comparison and the structured query
//! language used by `jq_query` test cases.

pub mod compare;
pub mod context;
pub mod evaluate;
pub mod judge;
pub mod media;
pub mod pixels;
pub mod query;

pub use compare::*;
pub use context::*;
pub use evaluate::*;
pub use judge::*;
pub use media::*;
pub use pixels::*;
pub use query::*;

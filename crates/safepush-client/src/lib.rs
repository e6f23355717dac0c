//! Network and toolchain adapters behind the engine's ports.

pub mod anthropic;
pub mod cog;
pub mod fetch;
pub mod predict;
pub mod replicate;

pub use anthropic::*;
pub use cog::*;
pub use fetch::*;
pub use predict::*;
pub use replicate::*;

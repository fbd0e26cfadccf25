//! Stackmerge core library: merges system-wide and per-runtime collapsed
//! stack profiles into one enriched artifact.

mod artifact;
mod collapsed;
mod config;
mod containers;
mod enrichment;
mod error;
mod error_stack;
mod merge;
mod scale;
mod stacks;

pub use artifact::*;
pub use collapsed::*;
pub use config::*;
pub use containers::*;
pub use enrichment::*;
pub use error::*;
pub use error_stack::*;
pub use merge::*;
pub use scale::*;
pub use stacks::*;

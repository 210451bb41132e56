//! Shared gitit data models consumed by the engine and the object store crates.

pub mod diff;
pub mod object;

pub use diff::*;
pub use object::*;

//! Reference sequence consumed from the alignment index.
//!
//! The index engine that produces the packed reference is external; this
//! module only reads (and, for fixtures, writes) the `<prefix>.pac` file.

mod base;
mod packed;

pub use base::{BaseCode, BASE_CLASSES, CANONICAL_BASES};
pub use packed::{PackedReference, ReferenceError, PAC_MAGIC, PAC_SUFFIX};

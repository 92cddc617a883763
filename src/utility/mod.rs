//! Utilities
//!
mod utility;
#[cfg(test)]
pub(crate) mod testing;

pub use utility::*;

//! Pure data types for hako — values, execution results, process lifecycle.
//!
//! This crate is a leaf dependency with no async runtime and no I/O. It exists
//! so that embedders (front ends, display layers) can work with hako's type
//! system without pulling hako-kernel's transitive deps.

pub mod binding;
pub mod process;
pub mod result;
pub mod value;

// Flat re-exports for convenience
pub use binding::*;
pub use process::*;
pub use result::*;
pub use value::*;

//! Shared helpers.

pub mod fs;
pub mod process;

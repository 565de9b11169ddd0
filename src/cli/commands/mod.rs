//! Command execution.

mod build;

pub use build::execute_build;

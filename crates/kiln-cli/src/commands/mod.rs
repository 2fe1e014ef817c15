//! Command implementations.
//!
//! - [`build`] - one build of the requested targets
//! - [`dev`] - watch mode
//! - [`check`] - configuration and target validation
//!
//! Each command exposes an async `execute` taking its parsed arguments.

pub mod build;
pub mod check;
pub mod dev;
pub(crate) mod utils;

pub use build::execute as build_execute;
pub use check::execute as check_execute;
pub use dev::execute as dev_execute;

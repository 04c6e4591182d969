//! One module per CLI command.

pub mod install;
pub mod list;
pub mod lock;

//! WINDMAR CLI library.
//!
//! Command handlers, output rendering and logging setup shared by the
//! `windmar-cli` binary and its tests.

pub mod commands;
pub mod logging;
pub mod output;

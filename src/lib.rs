//! rcman - supervised robocopy invocations with per-run logging.

pub mod config;
pub mod display;
pub mod logs;
pub mod robocopy;
pub mod supervisor;

//! Robocopy invocation boundary: command building and process control.

mod command;
mod process;

pub use command::*;
pub use process::*;

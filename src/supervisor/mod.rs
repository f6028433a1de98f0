//! Process supervision: single-slot lifecycle, output draining, cancellation.

mod events;
mod runner;
mod state;

pub use events::*;
pub use runner::*;
pub use state::*;

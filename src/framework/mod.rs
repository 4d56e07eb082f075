//! Runs one polling pass and remembers what it has processed.
//!
//! See: [`run`], [`StateTracker`]

mod pipeline;
pub mod state;

pub use pipeline::*;
pub use state::StateTracker;

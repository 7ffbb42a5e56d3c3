//! Value objects that flow through a lottery run.

mod events;
mod types;

pub use events::*;
pub use types::*;

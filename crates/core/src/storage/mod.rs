//! Persistence of lotteries, units, families and their preferences.

mod sqlite;
mod store;

pub use sqlite::*;
pub use store::*;

//! Scan history storage backends

mod memory;
mod postgres;

pub use memory::InMemoryHistoryStore;
pub use postgres::PgHistoryStore;

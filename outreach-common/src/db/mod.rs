//! Database initialization and shared helpers

pub mod init;

pub use init::{init_database, init_memory_database};

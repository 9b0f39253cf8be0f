//! SQLite persistence for the local envelope blob

mod connection;
mod kv_repository;
mod migrations;

pub use connection::Database;
pub use kv_repository::SqliteBlobStorage;

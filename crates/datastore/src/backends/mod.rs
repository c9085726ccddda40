//! Database Backend Abstractions
//!
//! Backends turn a URL into a pool of connections that can run native queries.
//! PostgreSQL is the only shipped backend.

pub mod core;
pub mod postgres;

pub use core::*;
pub use postgres::PostgresBackend;

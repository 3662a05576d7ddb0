//! `PostgreSQL` store implementation for Turnstile.
//!
//! This crate provides a production-ready PostgreSQL-based store that implements
//! the `RegistrationStore` trait from `turnstile-core`. It supports:
//!
//! - Conditional `UPDATE ... RETURNING` admits (never read-then-write)
//! - Derived event status recomputed in the same statement as the counter
//! - Per-event row locks that serialize ledger work on one event
//! - A partial unique index enforcing one active registration per identity
//! - Connection pooling and transactions
//!
//! # Example
//!
//! ```ignore
//! use turnstile_postgres::PostgresRegistrationStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresRegistrationStore::new("postgres://localhost/turnstile").await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod rows;
pub mod schema;
mod store;

pub use store::PostgresRegistrationStore;

//! SQLite-backed local store for pocketledger.
//!
//! Implements the core `EntityStore` boundary with Diesel over an r2d2
//! pool. Reads go straight to the pool; every mutation funnels through a
//! single writer actor and runs inside an immediate transaction, so a write
//! fully applies or is fully rejected.

pub mod budgets;
pub mod cards;
pub mod db;
pub mod errors;
mod row;
pub mod schema;
pub mod transactions;

pub use budgets::BudgetCategoryStore;
pub use cards::CardStore;
pub use db::{create_pool, get_connection, init, run_migrations, spawn_writer, WriteHandle};
pub use errors::StorageError;
pub use transactions::TransactionStore;

//! Account, Strategy and StrategyAccount management.
//!
//! PostgreSQL-backed storage for the entities in §3 that are not themselves
//! part of the order-execution hot path.

mod models;
mod repository;

pub use models::{Account, Strategy, StrategyAccount};
pub use repository::{AccountRepository, StrategyAccountRepository, StrategyRepository};

//! OpenOrder, PendingOrder, Trade and CancelQueue entities and persistence.

pub mod models;
pub mod repository;

pub use models::{CancelQueueEntry, CancelQueueStatus, OpenOrder, PendingOrder, Trade};
pub use repository::{OrderRepository, PgOrderRepository};

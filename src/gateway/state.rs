//! Shared axum application state: the handles every HTTP handler needs,
//! built once at startup and cloned (cheaply, via `Arc`) per request.

use std::sync::Arc;

use crate::context::ExecutionContext;
use crate::dispatcher::Dispatcher;
use crate::market::MarketCacheRegistry;
use crate::orders::repository::OrderRepository;
use crate::queue::QueueManager;

#[derive(Clone)]
pub struct AppState {
    pub context: Arc<ExecutionContext>,
    pub dispatcher: Arc<Dispatcher>,
    pub queue: Arc<QueueManager>,
    pub market_caches: Arc<MarketCacheRegistry>,
    pub orders: Arc<dyn OrderRepository>,
}

impl AppState {
    pub fn new(
        context: Arc<ExecutionContext>,
        dispatcher: Arc<Dispatcher>,
        queue: Arc<QueueManager>,
        market_caches: Arc<MarketCacheRegistry>,
        orders: Arc<dyn OrderRepository>,
    ) -> Self {
        AppState {
            context,
            dispatcher,
            queue,
            market_caches,
            orders,
        }
    }
}

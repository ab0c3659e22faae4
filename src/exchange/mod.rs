//! ExchangeRegistry: the per-account `ExchangePort` client cache (§5).
//!
//! Concrete exchange clients (their REST/WS wire protocols, signing,
//! reconnection) are out of scope here — this registry only owns the
//! LRU+TTL lifecycle around whatever `ExchangePort` a `ExchangeClientFactory`
//! constructs. Grounded in the teacher's per-thread HTTP client cache
//! pattern, generalized from "cache keyed by event-loop id" to "cache keyed
//! by account_id" since credentials (not the event loop) are what makes one
//! client distinct from another here.

use std::sync::Arc;

use cached::stores::TimedSizedCache;
use cached::Cached;
use tokio::sync::Mutex;

use crate::account::Account;
use crate::core_types::AccountId;
use crate::error::{EngineError, EngineResult};
use crate::exchange_port::ExchangePort;

const CLIENT_TTL_SECS: u64 = 3_600;
const MAX_CLIENTS: usize = 100;

/// Builds a concrete `ExchangePort` for one `Account`. Implemented at the
/// integration edge — this crate only defines the port (`exchange_port.rs`);
/// a deployment supplies the factory that knows how to construct a Binance,
/// Bybit, or Upbit client from `Account::credentials`.
pub trait ExchangeClientFactory: Send + Sync {
    fn build(&self, account: &Account) -> EngineResult<Arc<dyn ExchangePort>>;
}

/// Per-account client cache: 1-hour TTL, capped at 100 entries, invalidated
/// per-account on credential rotation (§5).
pub struct ExchangeRegistry {
    factory: Arc<dyn ExchangeClientFactory>,
    clients: Mutex<TimedSizedCache<AccountId, Arc<dyn ExchangePort>>>,
}

impl ExchangeRegistry {
    pub fn new(factory: Arc<dyn ExchangeClientFactory>) -> Self {
        ExchangeRegistry {
            factory,
            clients: Mutex::new(TimedSizedCache::with_size_and_lifespan(
                MAX_CLIENTS,
                CLIENT_TTL_SECS,
            )),
        }
    }

    /// Returns the cached client for `account`, building and inserting one
    /// on a miss or expiry.
    pub async fn get(&self, account: &Account) -> EngineResult<Arc<dyn ExchangePort>> {
        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.cache_get(&account.id) {
            return Ok(client.clone());
        }

        let client = self.factory.build(account)?;
        clients.cache_set(account.id, client.clone());
        Ok(client)
    }

    /// Evicts one account's cached client — called after a credential
    /// rotation so the next order path rebuilds against the new secret.
    pub async fn invalidate(&self, account_id: AccountId) {
        self.clients.lock().await.cache_remove(&account_id);
    }

    pub async fn clear(&self) {
        self.clients.lock().await.cache_clear();
    }
}

/// Factory stub used only where the engine is exercised without a real
/// exchange integration (tests, demo `main.rs` wiring). Any call through
/// the resulting `ExchangePort` returns `ExchangeError::Other`; it exists so
/// the rest of the service can boot and the admin surface can be exercised
/// without a live exchange credential.
pub struct UnimplementedExchangeFactory;

impl ExchangeClientFactory for UnimplementedExchangeFactory {
    fn build(&self, account: &Account) -> EngineResult<Arc<dyn ExchangePort>> {
        Err(EngineError::Internal(format!(
            "no ExchangeClientFactory wired up for exchange '{}' (account {})",
            account.exchange, account.id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unimplemented_factory_fails_closed() {
        let registry = ExchangeRegistry::new(Arc::new(UnimplementedExchangeFactory));
        let account = Account {
            id: 1,
            exchange: "binance".into(),
            credentials: "opaque".into(),
            is_testnet: true,
            is_active: true,
        };
        assert!(registry.get(&account).await.is_err());
    }
}

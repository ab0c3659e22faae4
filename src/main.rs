//! Process entrypoint: loads config, connects the database, wires every
//! repository/service, warms the market caches, spawns the background
//! workers, and serves the HTTP gateway until a shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use signal_exec::account::AccountRepository;
use signal_exec::alerts::{AlertSink, NullAlertSink, TelegramAlertSink};
use signal_exec::cancel_queue::{CancelQueueWorker, PgCancelQueueRepository};
use signal_exec::config::AppConfig;
use signal_exec::context::ExecutionContext;
use signal_exec::db::Database;
use signal_exec::dispatcher::Dispatcher;
use signal_exec::events::{EventEmitter, NullEventEmitter};
use signal_exec::exchange::{ExchangeRegistry, UnimplementedExchangeFactory};
use signal_exec::executor::OrderExecutor;
use signal_exec::gateway;
use signal_exec::gateway::state::AppState;
use signal_exec::logging::init_logging;
use signal_exec::market::{warmup_caches, run_refresher, MarketCacheRegistry, WarmupTarget};
use signal_exec::orders::PgOrderRepository;
use signal_exec::position::{PgPositionRepository, PgStrategyCapitalRepository};
use signal_exec::queue::{QueueManager, RebalanceScheduler};
use signal_exec::rate_limiter::RateLimiter;
use signal_exec::reconciler::Reconciler;

fn config_path() -> String {
    std::env::args().nth(1).unwrap_or_else(|| "config.yaml".to_string())
}

fn build_alert_sink(config: &AppConfig) -> Arc<dyn AlertSink> {
    match &config.telegram {
        Some(telegram) => Arc::new(TelegramAlertSink::new(
            telegram.bot_token.clone(),
            telegram.chat_id.clone(),
        )),
        None => Arc::new(NullAlertSink),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load(&config_path())?;
    let config = Arc::new(config);

    // `_guard` must outlive `main`: dropping it flushes the non-blocking
    // file writer.
    let _guard = init_logging(&config);
    tracing::info!("starting signal-exec");

    let db = Database::connect(&config.database_url, config.db_pool_size).await?;
    db.health_check().await?;
    let pool = db.pool().clone();

    let rate_limiter = Arc::new(RateLimiter::new());
    for (name, exchange_config) in &config.exchanges {
        rate_limiter.configure(name, exchange_config.rate_limit.clone());
    }

    // No concrete ExchangePort integration ships with this crate (§6) — a
    // deployment supplies its own `ExchangeClientFactory` for the exchanges
    // it actually trades on. This keeps the process bootable end to end.
    let registry = Arc::new(ExchangeRegistry::new(Arc::new(UnimplementedExchangeFactory)));
    let context = Arc::new(ExecutionContext::new(pool.clone(), config.clone(), registry.clone()));

    let orders: Arc<dyn signal_exec::orders::OrderRepository> = Arc::new(PgOrderRepository::new(pool.clone()));
    let positions: Arc<dyn signal_exec::position::PositionRepository> = Arc::new(PgPositionRepository::new(pool.clone()));
    let capital: Arc<dyn signal_exec::position::StrategyCapitalRepository> = Arc::new(PgStrategyCapitalRepository::new(pool.clone()));
    let cancel_queue: Arc<dyn signal_exec::cancel_queue::CancelQueueRepository> = Arc::new(PgCancelQueueRepository::new(pool.clone()));

    let events: Arc<dyn EventEmitter> = Arc::new(NullEventEmitter);
    let alerts = build_alert_sink(&config);

    let market_caches = Arc::new(MarketCacheRegistry::new());

    let bootstrap_targets = AccountRepository::list_active_bootstrap_targets(&pool).await?;
    let mut warmup_targets = Vec::with_capacity(bootstrap_targets.len());
    for (account, market_type) in &bootstrap_targets {
        let exchange_config = config.exchanges.get(&account.exchange.to_lowercase());
        let api_sourced = exchange_config.map(|e| e.api_sourced_market_info).unwrap_or(false);
        match registry.get(account).await {
            Ok(client) => warmup_targets.push(WarmupTarget {
                exchange_name: account.exchange.clone(),
                market_type: *market_type,
                client,
                api_sourced,
            }),
            Err(err) => {
                tracing::warn!(account_id = account.id, exchange = %account.exchange, error = %err, "no exchange client available for bootstrap, skipping warmup for this account");
            }
        }
    }
    warmup_caches(&market_caches, &warmup_targets).await;

    let queue = Arc::new(QueueManager::new(
        pool.clone(),
        orders.clone(),
        events.clone(),
        alerts.clone(),
        config.max_orders_per_symbol_type_side,
        config.max_retry_count,
    ));

    let executor = Arc::new(OrderExecutor::new(
        orders.clone(),
        queue.clone(),
        rate_limiter.clone(),
        market_caches.clone(),
        events.clone(),
        alerts.clone(),
    ));

    let dispatcher = Arc::new(Dispatcher::new(context.clone(), orders.clone(), executor.clone(), events.clone()));

    let shutdown = CancellationToken::new();

    let scheduler = RebalanceScheduler::new(
        queue.clone(),
        orders.clone(),
        context.clone(),
        alerts.clone(),
        config.rebalance_tick(),
    );
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown.clone()));

    let reconciler = Reconciler::new(
        pool.clone(),
        orders.clone(),
        positions.clone(),
        events.clone(),
        context.clone(),
        Duration::from_secs(5),
    );
    let reconciler_handle = tokio::spawn(reconciler.run(shutdown.clone()));

    let cancel_worker = CancelQueueWorker::new(
        cancel_queue.clone(),
        orders.clone(),
        events.clone(),
        alerts.clone(),
        context.clone(),
        Duration::from_secs(2),
    );
    let cancel_worker_handle = tokio::spawn(cancel_worker.run(shutdown.clone()));

    let pnl_sweep = signal_exec::position::UnrealizedPnlSweep::new(
        positions.clone(),
        capital.clone(),
        context.clone(),
        Duration::from_secs(60),
    );
    let pnl_sweep_handle = tokio::spawn(pnl_sweep.run(shutdown.clone()));

    let refresher_handle = tokio::spawn(run_refresher(
        market_caches.clone(),
        warmup_targets,
        config.precision_cache_refresh_interval(),
        shutdown.clone(),
    ));

    let state = AppState::new(context.clone(), dispatcher, queue, market_caches, orders);

    let serve_shutdown = shutdown.clone();
    let server_handle = tokio::spawn(gateway::serve(state, &config.server.bind_addr, config.server.port, serve_shutdown));

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, draining background tasks");
    shutdown.cancel();

    let _ = tokio::join!(
        scheduler_handle,
        reconciler_handle,
        cancel_worker_handle,
        pnl_sweep_handle,
        refresher_handle,
    );
    server_handle.await??;

    tracing::info!("signal-exec stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("install SIGINT handler");
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

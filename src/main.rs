use anyhow::{Context, Result};
use payment_gateway::{
    build_router, spawn_workers, telemetry, AppState, CircuitBreaker, CircuitBreakerConfig,
    GatewayConfig, HealthMonitor, HealthState, InMemoryPaymentStore, PaymentQueue, PaymentRouter,
    PaymentStore, ProcessorClient, ProcessorId, RedisPaymentStore, ReqwestHttpClient,
    RouterConfig,
};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing().context("failed to initialize tracing")?;

    info!("Starting payment gateway...");

    let config = GatewayConfig::from_env().context("invalid configuration")?;
    config.log_configuration();

    let store: Arc<dyn PaymentStore> = match &config.redis_url {
        Some(url) => Arc::new(
            RedisPaymentStore::connect(url)
                .await
                .context("failed to connect to Redis")?,
        ),
        None => {
            warn!("REDIS_URL not set, payments are kept in memory");
            Arc::new(InMemoryPaymentStore::new())
        }
    };

    let http_client = Arc::new(
        ReqwestHttpClient::new(config.http_timeout).context("failed to build HTTP client")?,
    );
    let default = ProcessorClient::new(
        ProcessorId::Default,
        config.default_processor_url.clone(),
        http_client.clone(),
    );
    let fallback = ProcessorClient::new(
        ProcessorId::Fallback,
        config.fallback_processor_url.clone(),
        http_client,
    );

    let health = HealthState::new();
    let monitor = HealthMonitor::new(
        default.clone(),
        fallback.clone(),
        health.clone(),
        config.health_check_interval,
    )
    .spawn();

    let breaker = Arc::new(CircuitBreaker::new(
        "default",
        CircuitBreakerConfig {
            failure_threshold: config.breaker_failure_threshold,
            cooldown: config.breaker_cooldown,
        },
    ));
    let router = Arc::new(PaymentRouter::new(
        default,
        fallback,
        breaker,
        health,
        store,
        RouterConfig {
            call_timeout: config.processor_timeout,
            offset_requested_at: config.health_offset_requested_at,
            health_aware_routing: config.health_aware_routing,
            ..RouterConfig::default()
        },
    ));

    let queue = PaymentQueue::new(config.queue_capacity);
    let workers = spawn_workers(
        config.worker_concurrency,
        &queue,
        router.clone(),
        config.retry_limit(),
    );

    let app = build_router(AppState {
        queue: queue.clone(),
        router,
    });

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!(bind_address = %bind_addr, "Server running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!(pending = queue.len(), "Server stopped, draining payment queue");
    queue.close();
    monitor.abort();

    for worker in workers {
        if let Err(e) = worker.await {
            warn!(error = %e, "Payment worker ended abnormally");
        }
    }

    info!("Payment gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

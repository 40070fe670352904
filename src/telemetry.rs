use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn default_filter() -> &'static str {
    match std::env::var("RUST_ENV").as_deref() {
        Ok("production") => "payment_gateway=info,server=info,tower_http=warn,axum=warn,reqwest=warn",
        Ok("development") => "payment_gateway=debug,server=debug,tower_http=debug,axum=trace,reqwest=info",
        Ok("test") => "payment_gateway=warn,server=warn,tower_http=warn",
        _ => "payment_gateway=info,server=info,tower_http=warn,axum=warn,reqwest=warn",
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over the `RUST_ENV` defaults;
/// `LOG_FORMAT=json` switches to JSON lines.
pub fn init_tracing() -> Result<(), tracing_subscriber::util::TryInitError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter()));
    let registry = tracing_subscriber::registry().with(env_filter);

    if std::env::var("LOG_FORMAT").as_deref() == Ok("json") {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(true)
                    .with_file(cfg!(debug_assertions))
                    .compact(),
            )
            .try_init()
    }
}

pub mod api;
pub mod circuit_breaker;
pub mod config;
pub mod health_monitor;
pub mod http_client;
pub mod models;
pub mod payment_store;
pub mod processor;
pub mod queue;
pub mod router;
pub mod summary;
pub mod telemetry;
pub mod worker;

pub use api::{build_router, AppState};
pub use circuit_breaker::{BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use config::{ConfigError, GatewayConfig};
pub use health_monitor::{HealthMonitor, HealthState};
pub use http_client::{HttpClient, HttpClientError, HttpResponse, MockHttpClient, ReqwestHttpClient};
pub use models::{PaymentRecord, PaymentRequest, ProcessorId, QueuedPayment, ServiceHealth};
pub use payment_store::{InMemoryPaymentStore, PaymentStore, RedisPaymentStore, StoreError};
pub use processor::{ProcessorClient, ProcessorError};
pub use queue::{PaymentQueue, QueueClosed};
pub use router::{PaymentRouter, RouteError, RouterConfig};
pub use summary::{summarize, PaymentsSummary, SummaryResult};
pub use worker::{spawn_workers, PaymentWorker, WorkOutcome};

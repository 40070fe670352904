use crate::circuit_breaker::{BreakerError, CircuitBreaker};
use crate::health_monitor::HealthState;
use crate::models::{PaymentRecord, PaymentRequest, ProcessorId};
use crate::payment_store::{PaymentStore, StoreError};
use crate::processor::{ProcessorClient, ProcessorError};
use crate::summary::{summarize, PaymentsSummary};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time;
use tracing::{debug, error, instrument, warn};

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("both processors failed (default: {default}; fallback: {fallback})")]
    AllProcessorsFailed {
        default: BreakerError<ProcessorError>,
        fallback: ProcessorError,
    },
    #[error("fallback failed while default was reported failing: {0}")]
    FallbackFailed(ProcessorError),
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Deadline for a single processor call, independent of the HTTP client's own timeout.
    pub call_timeout: Duration,
    /// Shift `requestedAt` forward by the processor's last reported minimum response time.
    pub offset_requested_at: bool,
    /// Skip the default processor while the health monitor reports it failing.
    pub health_aware_routing: bool,
    pub persist_attempts: u32,
    pub persist_retry_delay: Duration,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            offset_requested_at: false,
            health_aware_routing: false,
            persist_attempts: 3,
            persist_retry_delay: Duration::from_millis(10),
        }
    }
}

/// Sends each payment to the default processor through the circuit breaker, falls back to
/// the fallback processor, and records whichever one accepted it.
pub struct PaymentRouter {
    default: ProcessorClient,
    fallback: ProcessorClient,
    breaker: Arc<CircuitBreaker>,
    health: HealthState,
    store: Arc<dyn PaymentStore>,
    config: RouterConfig,
}

impl PaymentRouter {
    pub fn new(
        default: ProcessorClient,
        fallback: ProcessorClient,
        breaker: Arc<CircuitBreaker>,
        health: HealthState,
        store: Arc<dyn PaymentStore>,
        config: RouterConfig,
    ) -> Self {
        Self {
            default,
            fallback,
            breaker,
            health,
            store,
            config,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Routes one payment. Fails only when no processor accepted it.
    #[instrument(skip(self, request), fields(correlation_id = %request.correlation_id, amount = request.amount))]
    pub async fn process_payment(&self, request: &PaymentRequest) -> Result<ProcessorId, RouteError> {
        let default_error = if self.skip_default() {
            debug!("Default processor reported failing, going straight to fallback");
            None
        } else {
            let requested_at = self.requested_at(ProcessorId::Default);
            let attempt = self
                .breaker
                .execute(|| self.call(&self.default, request, requested_at))
                .await;

            match attempt {
                Ok(()) => {
                    self.record(ProcessorId::Default, request, requested_at, Utc::now())
                        .await;
                    return Ok(ProcessorId::Default);
                }
                Err(e) => {
                    debug!(error = %e, "Default processor attempt failed");
                    Some(e)
                }
            }
        };

        let requested_at = self.requested_at(ProcessorId::Fallback);
        match self.call(&self.fallback, request, requested_at).await {
            Ok(()) => {
                self.record(ProcessorId::Fallback, request, requested_at, Utc::now())
                    .await;
                Ok(ProcessorId::Fallback)
            }
            Err(fallback) => Err(match default_error {
                Some(default) => RouteError::AllProcessorsFailed { default, fallback },
                None => RouteError::FallbackFailed(fallback),
            }),
        }
    }

    pub async fn get_payments(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<PaymentsSummary, StoreError> {
        let records = self.store.get_payments(from, to).await?;
        Ok(summarize(&records))
    }

    pub async fn purge_payments(&self) -> Result<(), StoreError> {
        self.store.purge_payments().await
    }

    fn skip_default(&self) -> bool {
        self.config.health_aware_routing && self.health.best_processor() == ProcessorId::Fallback
    }

    fn requested_at(&self, processor: ProcessorId) -> DateTime<Utc> {
        let now = Utc::now();
        if !self.config.offset_requested_at {
            return now;
        }

        let offset = chrono::Duration::from_std(self.health.min_response_time(processor))
            .unwrap_or_default();
        now + offset
    }

    async fn call(
        &self,
        processor: &ProcessorClient,
        request: &PaymentRequest,
        requested_at: DateTime<Utc>,
    ) -> Result<(), ProcessorError> {
        let submission =
            processor.post_payment(&request.correlation_id, request.amount, requested_at);

        match time::timeout(self.config.call_timeout, submission).await {
            Ok(result) => result,
            Err(_) => Err(ProcessorError::Timeout {
                processor: processor.id(),
                timeout_ms: self.config.call_timeout.as_millis(),
            }),
        }
    }

    /// The processor already accepted the payment, so a failed write is retried here and
    /// never turned into a routing failure.
    async fn record(
        &self,
        processor_id: ProcessorId,
        request: &PaymentRequest,
        requested_at: DateTime<Utc>,
        responded_at: DateTime<Utc>,
    ) {
        let record = PaymentRecord {
            processor_id,
            correlation_id: request.correlation_id.clone(),
            requested_at,
            responded_at,
            amount: request.amount,
        };
        let attempts = self.config.persist_attempts.max(1);

        for attempt in 1..=attempts {
            match self.store.add_payment(&record).await {
                Ok(()) => return,
                Err(e) if attempt < attempts => {
                    warn!(processor = %processor_id, attempt, error = %e, "Failed to save processed payment, retrying");
                    time::sleep(self.config.persist_retry_delay).await;
                }
                Err(e) => {
                    error!(
                        processor = %processor_id,
                        correlation_id = %record.correlation_id,
                        amount = record.amount,
                        error = %e,
                        "Payment accepted by processor but could not be saved"
                    );
                }
            }
        }
    }
}

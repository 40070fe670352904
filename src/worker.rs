use crate::models::{ProcessorId, QueuedPayment};
use crate::queue::PaymentQueue;
use crate::router::PaymentRouter;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOutcome {
    Processed(ProcessorId),
    Requeued,
    Dropped,
}

pub struct PaymentWorker {
    id: usize,
    queue: PaymentQueue,
    router: Arc<PaymentRouter>,
    retry_limit: Option<u32>,
}

impl PaymentWorker {
    pub fn new(
        id: usize,
        queue: PaymentQueue,
        router: Arc<PaymentRouter>,
        retry_limit: Option<u32>,
    ) -> Self {
        Self {
            id,
            queue,
            router,
            retry_limit,
        }
    }

    /// Drains the queue until it is closed and empty.
    pub async fn run(self) {
        debug!(worker_id = self.id, "Payment worker started");

        while let Some(payment) = self.queue.consume().await {
            self.process(payment).await;
        }

        debug!(worker_id = self.id, "Payment worker stopped");
    }

    #[instrument(
        skip(self, payment),
        fields(
            worker_id = self.id,
            correlation_id = %payment.request.correlation_id,
            amount = payment.request.amount,
            attempt = payment.attempts.saturating_add(1)
        )
    )]
    pub async fn process(&self, mut payment: QueuedPayment) -> WorkOutcome {
        let error = match self.router.process_payment(&payment.request).await {
            Ok(processor) => {
                debug!(processor = %processor, "Payment processed");
                return WorkOutcome::Processed(processor);
            }
            Err(e) => e,
        };

        payment.attempts = payment.attempts.saturating_add(1);

        if let Some(limit) = self.retry_limit {
            if payment.attempts >= limit {
                error!(
                    correlation_id = %payment.request.correlation_id,
                    amount = payment.request.amount,
                    attempts = payment.attempts,
                    error = %error,
                    "Dropping payment after exhausting routing attempts"
                );
                return WorkOutcome::Dropped;
            }
        }

        warn!(attempts = payment.attempts, error = %error, "Payment not accepted, requeueing");

        let correlation_id = payment.request.correlation_id.clone();
        let amount = payment.request.amount;
        match self.queue.publish(payment).await {
            Ok(()) => WorkOutcome::Requeued,
            Err(e) => {
                error!(
                    correlation_id = %correlation_id,
                    amount,
                    error = %e,
                    "Could not requeue payment"
                );
                WorkOutcome::Dropped
            }
        }
    }
}

/// Starts `concurrency` workers sharing `queue`.
pub fn spawn_workers(
    concurrency: usize,
    queue: &PaymentQueue,
    router: Arc<PaymentRouter>,
    retry_limit: Option<u32>,
) -> Vec<JoinHandle<()>> {
    info!(concurrency, ?retry_limit, "Starting payment workers");

    (0..concurrency)
        .map(|id| {
            let worker = PaymentWorker::new(id, queue.clone(), router.clone(), retry_limit);
            tokio::spawn(worker.run())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
    use crate::health_monitor::HealthState;
    use crate::http_client::MockHttpClient;
    use crate::models::PaymentRequest;
    use crate::payment_store::InMemoryPaymentStore;
    use crate::processor::ProcessorClient;
    use crate::router::RouterConfig;
    use std::time::Duration;

    const DEFAULT_URL: &str = "http://default.example.com/payments";
    const FALLBACK_URL: &str = "http://fallback.example.com/payments";

    fn create_router(http_client: Arc<MockHttpClient>, store: InMemoryPaymentStore) -> Arc<PaymentRouter> {
        Arc::new(PaymentRouter::new(
            ProcessorClient::new(ProcessorId::Default, "http://default.example.com", http_client.clone()),
            ProcessorClient::new(ProcessorId::Fallback, "http://fallback.example.com", http_client),
            Arc::new(CircuitBreaker::new(
                "default",
                CircuitBreakerConfig {
                    failure_threshold: 1,
                    cooldown: Duration::from_millis(20),
                },
            )),
            HealthState::new(),
            Arc::new(store),
            RouterConfig {
                call_timeout: Duration::from_millis(100),
                ..RouterConfig::default()
            },
        ))
    }

    fn payment(id: &str) -> QueuedPayment {
        QueuedPayment::new(PaymentRequest {
            correlation_id: id.to_string(),
            amount: 10.0,
        })
    }

    #[tokio::test]
    async fn test_failed_payment_is_requeued_with_attempt_count() {
        let http_client = Arc::new(
            MockHttpClient::new()
                .with_response(DEFAULT_URL, 500, "")
                .with_response(FALLBACK_URL, 500, ""),
        );
        let queue = PaymentQueue::new(4);
        let worker = PaymentWorker::new(0, queue.clone(), create_router(http_client, InMemoryPaymentStore::new()), None);

        assert_eq!(worker.process(payment("a1")).await, WorkOutcome::Requeued);

        let requeued = queue.consume().await.unwrap();
        assert_eq!(requeued.request.correlation_id, "a1");
        assert_eq!(requeued.attempts, 1);
    }

    #[tokio::test]
    async fn test_attempt_count_saturates_without_limit() {
        let http_client = Arc::new(MockHttpClient::new().with_default_response(500, ""));
        let queue = PaymentQueue::new(4);
        let worker = PaymentWorker::new(0, queue.clone(), create_router(http_client, InMemoryPaymentStore::new()), None);

        let mut worn_out = payment("a1");
        worn_out.attempts = u32::MAX;

        assert_eq!(worker.process(worn_out).await, WorkOutcome::Requeued);
        assert_eq!(queue.consume().await.unwrap().attempts, u32::MAX);
    }

    #[tokio::test]
    async fn test_retry_limit_drops_payment() {
        let http_client = Arc::new(
            MockHttpClient::new()
                .with_response(DEFAULT_URL, 500, "")
                .with_response(FALLBACK_URL, 500, ""),
        );
        let queue = PaymentQueue::new(4);
        let worker = PaymentWorker::new(0, queue.clone(), create_router(http_client, InMemoryPaymentStore::new()), Some(3));

        let mut exhausted = payment("a1");
        exhausted.attempts = 2;

        assert_eq!(worker.process(exhausted).await, WorkOutcome::Dropped);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_requeue_into_closed_queue_is_dropped() {
        let http_client = Arc::new(MockHttpClient::new().with_default_response(503, ""));
        let queue = PaymentQueue::new(4);
        let worker = PaymentWorker::new(0, queue.clone(), create_router(http_client, InMemoryPaymentStore::new()), None);

        queue.close();

        assert_eq!(worker.process(payment("a1")).await, WorkOutcome::Dropped);
    }

    #[tokio::test]
    async fn test_pool_retries_until_processor_recovers() {
        let http_client = Arc::new(
            MockHttpClient::new()
                .with_response(DEFAULT_URL, 500, "")
                .with_response(FALLBACK_URL, 500, ""),
        );
        let store = InMemoryPaymentStore::new();
        let queue = PaymentQueue::new(16);
        let handles = spawn_workers(2, &queue, create_router(http_client.clone(), store.clone()), None);

        queue.publish(payment("a1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.is_empty());

        http_client.set_response(FALLBACK_URL, 200, "{}");
        tokio::time::timeout(Duration::from_secs(2), async {
            while store.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("payment should eventually be recorded");

        queue.close();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("a1").unwrap().processor_id, ProcessorId::Fallback);
    }

    #[tokio::test]
    async fn test_pool_stops_after_close() {
        let http_client = Arc::new(MockHttpClient::new().with_default_response(200, "{}"));
        let store = InMemoryPaymentStore::new();
        let queue = PaymentQueue::new(16);
        let handles = spawn_workers(4, &queue, create_router(http_client, store.clone()), Some(5));

        for i in 0..10 {
            queue.publish(payment(&format!("p{i}"))).await.unwrap();
        }
        queue.close();

        for handle in handles {
            tokio::time::timeout(Duration::from_secs(2), handle)
                .await
                .expect("worker should exit once the queue is drained")
                .unwrap();
        }

        assert_eq!(store.len(), 10);
    }
}

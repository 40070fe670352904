use crate::models::PaymentRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("failed to serialize payment record: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("payment store unavailable: {0}")]
    Unavailable(String),
}

/// Record of payments accepted by the processors.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn add_payment(&self, record: &PaymentRecord) -> Result<(), StoreError>;

    /// Records whose `requested_at` lies in `[from, to]`, in no particular order.
    async fn get_payments(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PaymentRecord>, StoreError>;

    async fn purge_payments(&self) -> Result<(), StoreError>;
}

fn in_range(record: &PaymentRecord, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
    record.requested_at >= from && record.requested_at <= to
}

const PAYMENTS_KEY: &str = "payments";

/// Decodes the hash fields read back from Redis. Unreadable values are logged and skipped.
fn decode_records(
    items: HashMap<String, String>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Vec<PaymentRecord> {
    items
        .into_iter()
        .filter_map(|(correlation_id, json_data)| {
            match serde_json::from_str::<PaymentRecord>(&json_data) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(correlation_id = %correlation_id, error = %e, "Skipping unreadable payment record");
                    None
                }
            }
        })
        .filter(|record| in_range(record, from, to))
        .collect()
}

/// Keeps every record as a JSON value in one Redis hash, keyed by correlation id.
pub struct RedisPaymentStore {
    connection: MultiplexedConnection,
    key: String,
}

impl RedisPaymentStore {
    pub async fn connect(redis_url: &str) -> Result<Self, StoreError> {
        Self::connect_with_key(redis_url, PAYMENTS_KEY).await
    }

    /// Same as [`connect`](Self::connect) but keeps records under `key`.
    pub async fn connect_with_key(redis_url: &str, key: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let mut connection = client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut connection).await?;

        Ok(Self {
            connection,
            key: key.to_string(),
        })
    }
}

#[async_trait]
impl PaymentStore for RedisPaymentStore {
    async fn add_payment(&self, record: &PaymentRecord) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let json_data = serde_json::to_string(record)?;

        let _: () = conn
            .hset(&self.key, &record.correlation_id, json_data)
            .await?;
        Ok(())
    }

    async fn get_payments(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PaymentRecord>, StoreError> {
        let mut conn = self.connection.clone();
        let items: HashMap<String, String> = conn.hgetall(&self.key).await?;

        Ok(decode_records(items, from, to))
    }

    async fn purge_payments(&self) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();
        let _: () = conn.del(&self.key).await?;
        Ok(())
    }
}

/// Process-local store. Used when no Redis is configured, and as the test double.
#[derive(Clone, Default)]
pub struct InMemoryPaymentStore {
    records: Arc<DashMap<String, PaymentRecord>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, correlation_id: &str) -> Option<PaymentRecord> {
        self.records
            .get(correlation_id)
            .map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn add_payment(&self, record: &PaymentRecord) -> Result<(), StoreError> {
        self.records
            .insert(record.correlation_id.clone(), record.clone());
        Ok(())
    }

    async fn get_payments(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PaymentRecord>, StoreError> {
        Ok(self
            .records
            .iter()
            .filter(|entry| in_range(entry.value(), from, to))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn purge_payments(&self) -> Result<(), StoreError> {
        self.records.clear();
        Ok(())
    }
}

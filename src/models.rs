use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a downstream payment processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorId {
    Default,
    Fallback,
}

impl ProcessorId {
    pub const ALL: [ProcessorId; 2] = [ProcessorId::Default, ProcessorId::Fallback];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessorId::Default => "default",
            ProcessorId::Fallback => "fallback",
        }
    }
}

impl fmt::Display for ProcessorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `POST /payments`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    #[serde(rename = "correlationId")]
    pub correlation_id: String,
    pub amount: f64,
}

/// A payment waiting in the queue, with the number of routing attempts already spent on it.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedPayment {
    pub request: PaymentRequest,
    pub attempts: u32,
}

impl QueuedPayment {
    pub fn new(request: PaymentRequest) -> Self {
        Self {
            request,
            attempts: 0,
        }
    }
}

/// Latest health report of a processor, as returned by `/payments/service-health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub failing: bool,
    #[serde(rename = "minResponseTime")]
    pub min_response_time: u64,
}

impl ServiceHealth {
    pub fn new(failing: bool, min_response_time: u64) -> Self {
        Self {
            failing,
            min_response_time,
        }
    }
}

/// A payment accepted by one of the processors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRecord {
    #[serde(rename = "processorId")]
    pub processor_id: ProcessorId,
    #[serde(rename = "correlationId")]
    pub correlation_id: String,
    #[serde(rename = "requestedAt")]
    pub requested_at: DateTime<Utc>,
    #[serde(rename = "respondedAt")]
    pub responded_at: DateTime<Utc>,
    pub amount: f64,
}

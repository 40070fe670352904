use crate::models::{PaymentRecord, ProcessorId};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SummaryResult {
    #[serde(rename = "totalRequests")]
    pub total_requests: u64,
    #[serde(skip)]
    pub total_amount_cents: i128,
    #[serde(rename = "totalAmount")]
    pub total_amount: f64,
}

impl SummaryResult {
    fn add(&mut self, amount: f64) {
        self.total_requests += 1;
        self.total_amount_cents = self.total_amount_cents.saturating_add(to_cents(amount));
    }

    fn finish(&mut self) {
        self.total_amount = self.total_amount_cents as f64 / 100.0;
    }
}

/// Body of `GET /payments-summary`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PaymentsSummary {
    pub default: SummaryResult,
    pub fallback: SummaryResult,
}

impl PaymentsSummary {
    pub fn get(&self, processor: ProcessorId) -> &SummaryResult {
        match processor {
            ProcessorId::Default => &self.default,
            ProcessorId::Fallback => &self.fallback,
        }
    }

    fn get_mut(&mut self, processor: ProcessorId) -> &mut SummaryResult {
        match processor {
            ProcessorId::Default => &mut self.default,
            ProcessorId::Fallback => &mut self.fallback,
        }
    }
}

/// Amounts are summed in integer cents and only turned back into a float at the end.
pub fn summarize<'a, I>(records: I) -> PaymentsSummary
where
    I: IntoIterator<Item = &'a PaymentRecord>,
{
    let mut summary = PaymentsSummary::default();

    for record in records {
        summary.get_mut(record.processor_id).add(record.amount);
    }

    summary.default.finish();
    summary.fallback.finish();
    summary
}

fn to_cents(amount: f64) -> i128 {
    (amount * 100.0).round() as i128
}

use crate::models::{PaymentRequest, QueuedPayment};
use crate::queue::PaymentQueue;
use crate::router::PaymentRouter;
use crate::summary::PaymentsSummary;
use axum::{
    body::Bytes,
    extract::{Query, Request, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info_span, instrument, warn, Span};
use uuid::Uuid;

const DEFAULT_FROM: &str = "2000-01-01T00:00:00Z";
const DEFAULT_TO: &str = "2900-01-01T00:00:00Z";

#[derive(Clone)]
pub struct AppState {
    pub queue: PaymentQueue,
    pub router: Arc<PaymentRouter>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    from: Option<String>,
    to: Option<String>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/payments", post(create_payment))
        .route("/payments-summary", get(get_payments_summary))
        .route("/purge-payments", post(purge_payments))
        .route("/health", get(health))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(|request: &Request| {
                            info_span!(
                                "http_request",
                                method = %request.method(),
                                uri = %request.uri(),
                                version = ?request.version(),
                            )
                        })
                        .on_response(|response: &Response, latency: Duration, _span: &Span| {
                            debug!(
                                status = response.status().as_u16(),
                                latency_ms = latency.as_millis(),
                                "HTTP response"
                            );
                        }),
                )
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Accepts a payment for asynchronous processing. Waits only while the queue is full.
#[instrument(skip_all, fields(
    request_id = tracing::field::Empty,
    correlation_id = tracing::field::Empty,
    amount = tracing::field::Empty
))]
async fn create_payment(State(state): State<AppState>, body: Bytes) -> StatusCode {
    let span = Span::current();
    span.record("request_id", tracing::field::display(Uuid::new_v4()));

    let payment: PaymentRequest = match serde_json::from_slice(&body) {
        Ok(payment) => payment,
        Err(e) => {
            debug!(error = %e, "Rejecting malformed payment");
            return StatusCode::BAD_REQUEST;
        }
    };
    span.record("correlation_id", payment.correlation_id.as_str());
    span.record("amount", payment.amount);

    match state.queue.publish(QueuedPayment::new(payment)).await {
        Ok(()) => StatusCode::CREATED,
        Err(e) => {
            warn!(error = %e, "Payment refused, queue is closed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

#[instrument(skip(state))]
async fn get_payments_summary(
    State(state): State<AppState>,
    Query(params): Query<SummaryQuery>,
) -> Result<Json<PaymentsSummary>, StatusCode> {
    let from = parse_bound(params.from.as_deref(), DEFAULT_FROM)?;
    let to = parse_bound(params.to.as_deref(), DEFAULT_TO)?;

    match state.router.get_payments(from, to).await {
        Ok(summary) => Ok(Json(summary)),
        Err(e) => {
            error!(error = %e, "Failed to read payments summary");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[instrument(skip(state))]
async fn purge_payments(State(state): State<AppState>) -> StatusCode {
    match state.router.purge_payments().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            error!(error = %e, "Failed to purge payments");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

async fn health() -> impl IntoResponse {
    "OK"
}

fn parse_bound(value: Option<&str>, default: &str) -> Result<DateTime<Utc>, StatusCode> {
    let value = value.filter(|v| !v.is_empty()).unwrap_or(default);

    DateTime::parse_from_rfc3339(value)
        .map(|date| date.with_timezone(&Utc))
        .map_err(|e| {
            debug!(value, error = %e, "Rejecting summary date");
            StatusCode::BAD_REQUEST
        })
}

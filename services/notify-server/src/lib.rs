// wxpay notify server - inbound payment notifications
// Verifies gateway callbacks and records each paid order once

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use wxpay::{fields, NotificationVerifier, NotifyOutcome, Record};

/// Paid order as reported by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaidOrder {
    pub transaction_id: String,
    pub out_trade_no: String,
    pub total_fee: String,
    pub received_at: DateTime<Utc>,
}

/// Paid orders keyed by gateway transaction id.
///
/// Redelivered callbacks hit the same key and leave the first entry as is.
#[derive(Debug, Default)]
pub struct PaymentStore {
    orders: DashMap<String, PaidOrder>,
}

impl PaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a verified callback. Returns false when the callback cannot be
    /// applied and the gateway should retry.
    pub fn apply(&self, record: &Record) -> bool {
        if !record.is_success() {
            // Failed payments carry nothing to apply; acknowledge them
            info!(
                out_trade_no = record.get_str(fields::OUT_TRADE_NO).unwrap_or_default(),
                "non-success payment notification"
            );
            return true;
        }

        let Some(transaction_id) = record.get_str(fields::TRANSACTION_ID).filter(|s| !s.is_empty())
        else {
            warn!("paid notification without transaction_id");
            return false;
        };

        self.orders
            .entry(transaction_id.to_string())
            .or_insert_with(|| {
                info!(transaction_id, "payment recorded");
                PaidOrder {
                    transaction_id: transaction_id.to_string(),
                    out_trade_no: record
                        .get_str(fields::OUT_TRADE_NO)
                        .unwrap_or_default()
                        .to_string(),
                    total_fee: record
                        .get_str(fields::TOTAL_FEE)
                        .unwrap_or_default()
                        .to_string(),
                    received_at: Utc::now(),
                }
            });
        true
    }

    pub fn get(&self, transaction_id: &str) -> Option<PaidOrder> {
        self.orders.get(transaction_id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<NotificationVerifier>,
    pub payments: Arc<PaymentStore>,
}

impl AppState {
    pub fn new(verifier: NotificationVerifier) -> Self {
        Self {
            verifier: Arc::new(verifier),
            payments: Arc::new(PaymentStore::new()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub merchants: usize,
    pub payments: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/notify", post(handle_notify))
        .route("/payments/:transaction_id", get(get_payment))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// The reply body is the only acknowledgement channel, so every outcome is a 200
async fn handle_notify(State(state): State<AppState>, body: Bytes) -> Response {
    let payments = state.payments.clone();
    let reply = state.verifier.handle(&body, |record| payments.apply(record));

    if let NotifyOutcome::RepliedFail(reason) = &reply.outcome {
        warn!(%reason, "notification answered with FAIL");
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/xml; charset=utf-8")],
        reply.body,
    )
        .into_response()
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "wxpay-notify-server",
        version: env!("CARGO_PKG_VERSION"),
        merchants: state.verifier.merchants().len(),
        payments: state.payments.len(),
    })
}

async fn get_payment(
    State(state): State<AppState>,
    Path(transaction_id): Path<String>,
) -> Result<Json<PaidOrder>, StatusCode> {
    state
        .payments
        .get(&transaction_id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn metrics_handler() -> Result<String, (StatusCode, String)> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to export metrics: {e}"),
            )
        })?;
    String::from_utf8(buffer).map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use tower::ServiceExt;
use wxpay::{MerchantCredentials, NotificationVerifier, Record};
use wxpay_notify_server::{router, AppState};

const KEY: &str = "8934e7d15453e97507ef794cf7b0519d";

fn state() -> AppState {
    AppState::new(NotificationVerifier::new(vec![MerchantCredentials {
        app_id: "wx426b3015555a46be".to_string(),
        mch_id: "1900009851".to_string(),
        key: KEY.to_string(),
    }]))
}

fn callback(transaction_id: &str, key: &str) -> String {
    let mut record: Record = [
        ("appid", "wx426b3015555a46be"),
        ("mch_id", "1900009851"),
        ("nonce_str", "5K8264ILTKCH16CQ2502SI8ZNMTM67VS"),
        ("out_trade_no", "20240101001"),
        ("result_code", "SUCCESS"),
        ("return_code", "SUCCESS"),
        ("total_fee", "888"),
        ("transaction_id", transaction_id),
    ]
    .into_iter()
    .collect();
    record.set_sign(key);
    record.to_xml().unwrap()
}

async fn post_notify(state: AppState, body: String) -> (StatusCode, Record) {
    let response = router(state)
        .oneshot(
            Request::post("/notify")
                .header("content-type", "text/xml")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, Record::from_xml(&bytes).unwrap())
}

#[tokio::test]
async fn test_verified_callback_is_recorded_once() {
    let state = state();

    let (status, reply) = post_notify(state.clone(), callback("4200000001", KEY)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply.return_code(), Some("SUCCESS"));
    assert!(reply.verify_sign(KEY));

    let first = state.payments.get("4200000001").unwrap();
    assert_eq!(first.total_fee, "888");

    let (_, reply) = post_notify(state.clone(), callback("4200000001", KEY)).await;
    assert_eq!(reply.return_code(), Some("SUCCESS"));
    assert_eq!(state.payments.len(), 1);
    assert_eq!(state.payments.get("4200000001").unwrap(), first);
}

#[tokio::test]
async fn test_forged_callback_is_refused() {
    let state = state();

    let (status, reply) = post_notify(state.clone(), callback("4200000002", "forged")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply.return_code(), Some("FAIL"));
    assert!(!reply.has_sign());
    assert!(state.payments.is_empty());
}

#[tokio::test]
async fn test_missing_transaction_id_asks_for_retry() {
    let mut record: Record = [("return_code", "SUCCESS"), ("result_code", "SUCCESS")]
        .into_iter()
        .collect();
    record.set_sign(KEY);

    let (_, reply) = post_notify(state(), record.to_xml().unwrap()).await;
    assert_eq!(reply.return_code(), Some("FAIL"));
}

#[tokio::test]
async fn test_health_and_unknown_payment() {
    let app = router(state());

    let response = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::get("/payments/unknown").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

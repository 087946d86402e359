//! Notification verification scenarios

use wxpay::{MerchantCredentials, NotificationVerifier, NotifyOutcome, Record};

fn merchant(app_id: &str, mch_id: &str, key: &str) -> MerchantCredentials {
    MerchantCredentials {
        app_id: app_id.to_string(),
        mch_id: mch_id.to_string(),
        key: key.to_string(),
    }
}

fn payment_callback(key: &str) -> Vec<u8> {
    let mut record: Record = [
        ("appid", "wx2421b1c4370ec43b"),
        ("attach", "支付测试"),
        ("bank_type", "CFT"),
        ("fee_type", "CNY"),
        ("is_subscribe", "Y"),
        ("mch_id", "10000100"),
        ("nonce_str", "5d2b6c2a8db53831f7eda20af46e531c"),
        ("openid", "oUpF8uMEb4qRXf22hE3X68TekukE"),
        ("out_trade_no", "1409811653"),
        ("result_code", "SUCCESS"),
        ("return_code", "SUCCESS"),
        ("time_end", "20140903131540"),
        ("total_fee", "1"),
        ("trade_type", "JSAPI"),
        ("transaction_id", "1004400740201409030005092168"),
    ]
    .into_iter()
    .collect();
    record.set_sign(key);
    record.to_xml().unwrap().into_bytes()
}

fn parse(body: &str) -> Record {
    Record::from_xml(body.as_bytes()).unwrap()
}

#[test]
fn test_bad_signature_gets_unsigned_fail() {
    let verifier = NotificationVerifier::new(vec![merchant("wx1", "10000100", "key-a")]);
    let body = b"<xml><return_code>SUCCESS</return_code><out_trade_no>1409811653</out_trade_no><sign>BADSIGN</sign></xml>";

    let mut calls = 0;
    let reply = verifier.handle(body, |_| {
        calls += 1;
        true
    });

    assert_eq!(calls, 0);
    assert!(matches!(reply.outcome, NotifyOutcome::RepliedFail(_)));
    assert!(reply.body.starts_with("<xml><return_code><![CDATA[FAIL]]></return_code>"));
    assert!(!parse(&reply.body).has_sign());
}

#[test]
fn test_second_merchant_verifies() {
    let a = merchant("wxA", "1", "key-a");
    let b = merchant("wxB", "2", "key-b");
    let verifier = NotificationVerifier::new(vec![a.clone(), b]);

    let mut seen = None;
    let reply = verifier.handle(&payment_callback("key-b"), |record| {
        seen = record.get_str("transaction_id").map(str::to_string);
        true
    });

    assert_eq!(reply.outcome, NotifyOutcome::RepliedSuccess);
    assert_eq!(seen.as_deref(), Some("1004400740201409030005092168"));

    let reply = parse(&reply.body);
    assert!(reply.verify_sign("key-b"));
    assert!(!reply.verify_sign("key-a"));
    assert_eq!(verifier.merchants()[0], a);
}

#[test]
fn test_redelivery_gets_identical_reply() {
    let verifier = NotificationVerifier::new(vec![merchant("wx1", "10000100", "key-a")]);
    let body = payment_callback("key-a");

    let first = verifier.handle(&body, |_| true);
    let second = verifier.handle(&body, |_| true);

    assert_eq!(first.outcome, NotifyOutcome::RepliedSuccess);
    assert_eq!(first, second);
}

#[test]
fn test_malformed_bodies_get_fail() {
    let verifier = NotificationVerifier::new(vec![merchant("wx1", "10000100", "key-a")]);

    let bodies: [&[u8]; 4] = [
        b"",
        b"not xml",
        b"<xml><return_code>SUCCESS</return_code>",
        b"<?xml version=\"1.0\"?><!DOCTYPE xml [<!ENTITY xxe SYSTEM \"file:///etc/passwd\">]><xml><a>&xxe;</a></xml>",
    ];
    for body in bodies {
        let reply = verifier.handle(body, |_| panic!("process must not run"));
        assert!(matches!(reply.outcome, NotifyOutcome::RepliedFail(_)));
        assert_eq!(parse(&reply.body).return_code(), Some("FAIL"));
        assert!(!reply.body.contains("root:"));
    }
}

#[test]
fn test_deeply_nested_body_gets_fail() {
    let verifier = NotificationVerifier::new(vec![merchant("wx1", "10000100", "key-a")]);
    let levels = 200_000;
    let body = format!("<xml>{}{}</xml>", "<a>".repeat(levels), "</a>".repeat(levels));

    let reply = verifier.handle(body.as_bytes(), |_| panic!("process must not run"));

    assert_eq!(
        reply.outcome,
        NotifyOutcome::RepliedFail("Malformed payload: nesting too deep".to_string())
    );
    assert!(!parse(&reply.body).has_sign());
}

#[test]
fn test_tampered_amount_is_refused() {
    let verifier = NotificationVerifier::new(vec![merchant("wx1", "10000100", "key-a")]);
    let body = String::from_utf8(payment_callback("key-a"))
        .unwrap()
        .replace("<total_fee>1</total_fee>", "<total_fee>100</total_fee>");

    let reply = verifier.handle(body.as_bytes(), |_| true);
    assert_eq!(
        reply.outcome,
        NotifyOutcome::RepliedFail("signature verification failed".to_string())
    );
}

#[tokio::test]
async fn test_async_process_failure_replies_fail() {
    let verifier = NotificationVerifier::new(vec![merchant("wx1", "10000100", "key-a")]);
    let reply = verifier
        .handle_async(&payment_callback("key-a"), |_record| async { false })
        .await;

    assert_eq!(
        reply.outcome,
        NotifyOutcome::RepliedFail("processing failed".to_string())
    );
    assert!(!parse(&reply.body).has_sign());
}

//! Payment notification verification
//!
//! The gateway POSTs an `<xml>` callback and expects an `<xml>` reply with a
//! `return_code`. It does not say which merchant the callback belongs to, so
//! every configured account is tried in order and the first one whose key
//! verifies the signature wins. Callbacks may be redelivered; the process
//! function must apply its effect idempotently.

use crate::{
    config::{MerchantCredentials, Settings},
    fields,
    metrics::NOTIFICATIONS_TOTAL,
    Record,
};
use std::future::Future;
use tracing::{debug, info, warn};

/// Served when the reply record cannot be encoded
const FALLBACK_FAIL_REPLY: &str =
    "<xml><return_code><![CDATA[FAIL]]></return_code><return_msg><![CDATA[internal error]]></return_msg></xml>";

/// Terminal state of one callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// Verified and processed; the gateway stops retrying
    RepliedSuccess,
    /// Rejected or not processed; the gateway retries later
    RepliedFail(String),
}

impl NotifyOutcome {
    /// Label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            NotifyOutcome::RepliedSuccess => "success",
            NotifyOutcome::RepliedFail(_) => "fail",
        }
    }
}

/// Reply to write back as the HTTP response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Outcome
    pub outcome: NotifyOutcome,
    /// Reply XML
    pub body: String,
}

/// Verifies callbacks against a list of merchant accounts
#[derive(Debug, Clone)]
pub struct NotificationVerifier {
    merchants: Vec<MerchantCredentials>,
    sign_reply: bool,
}

/// Result of parsing and verifying the raw body
enum Verified<'a> {
    Accepted(Record, &'a MerchantCredentials),
    Refused(String),
}

impl NotificationVerifier {
    /// Create verifier; candidates are tried in order
    pub fn new(merchants: Vec<MerchantCredentials>) -> Self {
        Self {
            merchants,
            sign_reply: true,
        }
    }

    /// Create verifier from the configured candidates
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.notify_candidates())
    }

    /// Whether SUCCESS replies are signed (on by default)
    pub fn with_reply_signing(mut self, sign_reply: bool) -> Self {
        self.sign_reply = sign_reply;
        self
    }

    /// Candidate accounts
    pub fn merchants(&self) -> &[MerchantCredentials] {
        &self.merchants
    }

    /// Handle one callback with a synchronous process function.
    ///
    /// `process` runs at most once, and only for a verified callback. It
    /// returns `true` once the payment's effect is durably applied.
    pub fn handle<F>(&self, body: &[u8], process: F) -> Notification
    where
        F: FnOnce(&Record) -> bool,
    {
        match self.verify(body) {
            Verified::Accepted(record, merchant) => {
                let processed = process(&record);
                self.reply(processed, merchant)
            }
            Verified::Refused(reason) => self.fail(reason),
        }
    }

    /// Handle one callback with an asynchronous process function
    pub async fn handle_async<F, Fut>(&self, body: &[u8], process: F) -> Notification
    where
        F: FnOnce(Record) -> Fut,
        Fut: Future<Output = bool>,
    {
        match self.verify(body) {
            Verified::Accepted(record, merchant) => {
                let processed = process(record).await;
                self.reply(processed, merchant)
            }
            Verified::Refused(reason) => self.fail(reason),
        }
    }

    fn verify(&self, body: &[u8]) -> Verified<'_> {
        let record = match Record::from_xml(body) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "malformed notification");
                return Verified::Refused(e.to_string());
            }
        };

        if !record.has_sign() {
            warn!("unsigned notification");
            return Verified::Refused("notification is not signed".to_string());
        }

        match self.merchants.iter().find(|m| record.verify_sign(&m.key)) {
            Some(merchant) => {
                debug!(mch_id = %merchant.mch_id, "notification signature verified");
                Verified::Accepted(record, merchant)
            }
            None => {
                warn!(
                    candidates = self.merchants.len(),
                    "notification signature matches no merchant"
                );
                Verified::Refused("signature verification failed".to_string())
            }
        }
    }

    fn reply(&self, processed: bool, merchant: &MerchantCredentials) -> Notification {
        if !processed {
            return self.fail("processing failed".to_string());
        }

        let mut reply = Record::new();
        reply.set(fields::RETURN_CODE, fields::SUCCESS);
        reply.set(fields::RETURN_MSG, "OK");
        if self.sign_reply {
            reply.set_sign(&merchant.key);
        }

        info!("notification processed");
        finish(NotifyOutcome::RepliedSuccess, &reply)
    }

    fn fail(&self, reason: String) -> Notification {
        let mut reply = Record::new();
        reply.set(fields::RETURN_CODE, fields::FAIL);
        reply.set(fields::RETURN_MSG, reason.as_str());
        finish(NotifyOutcome::RepliedFail(reason), &reply)
    }
}

fn finish(outcome: NotifyOutcome, reply: &Record) -> Notification {
    NOTIFICATIONS_TOTAL
        .with_label_values(&[outcome.label()])
        .inc();

    let body = reply.to_xml().unwrap_or_else(|e| {
        warn!(error = %e, "failed to encode notification reply");
        FALLBACK_FAIL_REPLY.to_string()
    });
    Notification { outcome, body }
}

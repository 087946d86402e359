//! # WeChat Pay gateway SDK
//!
//! Client for the gateway's XML-over-HTTPS API:
//! - Canonical MD5 signing shared by every request and response
//! - `<xml>` wire codec with CDATA escaping and entity-safe parsing
//! - Gateway client: validate, enrich, sign, transmit, parse, verify
//! - Sandbox key exchange and best-effort timing telemetry
//! - Asynchronous payment notification verification (multi-merchant)
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │   GatewayClient              NotificationVerifier    │
//! │  (outbound round trips)      (inbound callbacks)     │
//! └──────┬──────────────┬───────────────┬────────────────┘
//!        │              │               │
//! ┌──────▼─────┐ ┌──────▼──────┐ ┌──────▼──────┐
//! │ Transport  │ │  XML codec  │ │   Signer    │
//! │ (reqwest)  │ │ (quick-xml) │ │   (MD5)     │
//! └────────────┘ └──────┬──────┘ └──────┬──────┘
//!                ┌──────▼───────────────▼──────┐
//!                │           Record            │
//!                └─────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod client;
pub mod config;
pub mod error;
pub mod fields;
pub mod metrics;
pub mod notify;
pub mod record;
pub mod report;
pub mod request;
pub mod sign;
pub mod transport;
pub mod xml;

pub use client::{ClientOptions, GatewayClient};
pub use crate::config::{
    MerchantConfig, MerchantCredentials, ReportLevel, Settings, SharedMerchantConfig,
};
pub use error::{Error, Result};
pub use notify::{Notification, NotificationVerifier, NotifyOutcome};
pub use record::{Record, Value};
pub use request::{
    CloseOrder, GatewayRequest, MicroPay, Operation, OrderQuery, Refund, Report, UnifiedOrder,
};
pub use transport::{HttpTransport, Transport};

/// Production gateway base URL
pub const DEFAULT_BASE_URL: &str = "https://api.mch.weixin.qq.com";

/// Default business request timeout (seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 6;

/// Default timing report timeout (seconds)
pub const DEFAULT_REPORT_TIMEOUT_SECONDS: u64 = 1;

/// Maximum nonce length accepted by the gateway
pub const NONCE_LENGTH: usize = 32;

//! Gateway client
//!
//! Each call runs one round trip through fixed stages:
//! validate → enrich → sign → transmit → parse → verify. Validation errors
//! surface before any network I/O.
//!
//! In sandbox mode the client first exchanges the production key for a
//! sandbox key and installs it into the shared [`MerchantConfig`]. That write
//! is visible to every client holding the same config; callers mixing sandbox
//! and production traffic on one config must serialize them.

use crate::{
    config::{MerchantConfig, ReportLevel, Settings, SharedMerchantConfig},
    fields,
    metrics::{GATEWAY_REQUESTS_TOTAL, GATEWAY_REQUEST_DURATION},
    report,
    request::{
        CloseOrder, GatewayRequest, MicroPay, Operation, OrderQuery, Refund, ResponseCheck,
        SandboxSignKey, UnifiedOrder,
    },
    transport::{HttpTransport, Transport},
    Error, Record, Result,
};
use rand::Rng;
use reqwest::Method;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Landing page that renders a NATIVE `code_url` as a QR code
pub const CODE_URL_PREFIX: &str = "http://paysdk.weixin.qq.com/example/qrcode.php?data=";

/// Round trip stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Checking mandatory fields
    Validating,
    /// Fetching the sandbox signing key (sandbox mode only)
    ExchangingSandboxKey,
    /// Checking merchant config and filling merchant and derived fields
    Enriching,
    /// Computing the request signature
    Signing,
    /// Waiting on the transport
    Transmitting,
    /// Decoding the response body
    ParsingResponse,
    /// Checking return_code and the response signature
    VerifyingResponse,
    /// Verified response returned
    Done,
    /// Round trip ended with an error
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Validating => "validating",
            Stage::ExchangingSandboxKey => "exchanging_sandbox_key",
            Stage::Enriching => "enriching",
            Stage::Signing => "signing",
            Stage::Transmitting => "transmitting",
            Stage::ParsingResponse => "parsing_response",
            Stage::VerifyingResponse => "verifying_response",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Client options
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Gateway base URL
    pub base_url: String,
    /// Default callback URL for unified orders
    pub notify_url: String,
    /// Payer / reporting IP
    pub client_ip: String,
    /// Business call timeout
    pub timeout: Duration,
    /// Timing report timeout
    pub report_timeout: Duration,
    /// Telemetry verbosity
    pub report_level: ReportLevel,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for ClientOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            notify_url: settings.notify_url.clone(),
            client_ip: settings.client_ip.clone(),
            timeout: Duration::from_secs(settings.timeout_seconds),
            report_timeout: Duration::from_secs(settings.report_timeout_seconds),
            report_level: settings.report_level,
        }
    }
}

/// Gateway client
#[derive(Clone)]
pub struct GatewayClient {
    transport: Arc<dyn Transport>,
    config: SharedMerchantConfig,
    options: ClientOptions,
}

impl GatewayClient {
    /// Create client
    pub fn new(
        transport: Arc<dyn Transport>,
        config: SharedMerchantConfig,
        options: ClientOptions,
    ) -> Self {
        Self {
            transport,
            config,
            options,
        }
    }

    /// Create client with the HTTPS transport
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        settings.merchant.validate()?;
        let transport = HttpTransport::from_settings(settings)?;
        Ok(Self::new(
            Arc::new(transport),
            settings.merchant.clone().shared(),
            ClientOptions::from(settings),
        ))
    }

    /// Shared merchant configuration
    pub fn config(&self) -> &SharedMerchantConfig {
        &self.config
    }

    /// Client options
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Query an order
    pub async fn order_query(&self, request: OrderQuery) -> Result<Record> {
        self.execute(request).await
    }

    /// Close an order
    pub async fn close_order(&self, request: CloseOrder) -> Result<Record> {
        self.execute(request).await
    }

    /// Refund an order (mutual TLS)
    pub async fn refund(&self, request: Refund) -> Result<Record> {
        self.execute(request).await
    }

    /// Create a prepay order
    pub async fn unified_order(&self, request: UnifiedOrder) -> Result<Record> {
        self.execute(request).await
    }

    /// Charge a scanned payment code
    pub async fn micropay(&self, request: MicroPay) -> Result<Record> {
        self.execute(request).await
    }

    /// Run a request with the default timeout
    pub async fn execute<R: GatewayRequest>(&self, request: R) -> Result<Record> {
        self.execute_with_timeout(request, self.options.timeout).await
    }

    /// Run a request with an explicit timeout
    pub async fn execute_with_timeout<R: GatewayRequest>(
        &self,
        request: R,
        timeout: Duration,
    ) -> Result<Record> {
        self.round_trip(R::OPERATION, request.into_record(), timeout)
            .await
    }

    #[instrument(skip_all, fields(operation = %operation))]
    async fn round_trip(
        &self,
        operation: Operation,
        record: Record,
        timeout: Duration,
    ) -> Result<Record> {
        let mut stage = Stage::Validating;
        let result = self.run(operation, record, timeout, &mut stage).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => {
                warn!(failed_at = %stage, error = %e, "gateway round trip failed");
                stage = Stage::Failed;
                e.kind()
            }
        };
        debug!(%stage, "round trip finished");
        GATEWAY_REQUESTS_TOTAL
            .with_label_values(&[operation.name(), outcome])
            .inc();

        result
    }

    async fn run(
        &self,
        operation: Operation,
        mut record: Record,
        timeout: Duration,
        stage: &mut Stage,
    ) -> Result<Record> {
        operation.validate(&record)?;

        let sandbox = self.config.read().sandbox && operation.has_sandbox();
        if sandbox {
            *stage = Stage::ExchangingSandboxKey;
            self.ensure_sandbox_key().await?;
        }

        *stage = Stage::Enriching;
        let config = self.config.read().clone();
        config.validate()?;
        self.enrich(operation, &mut record, &config);

        *stage = Stage::Signing;
        record.set_sign(config.signing_key());

        *stage = Stage::Transmitting;
        let url = operation.url(&self.options.base_url, sandbox);
        debug!(%url, "sending request");
        let start = Instant::now();
        let body = self
            .transport
            .request_xml(
                &record,
                &url,
                Method::POST,
                operation.requires_client_cert(),
                timeout,
            )
            .await?;
        let elapsed = start.elapsed();
        GATEWAY_REQUEST_DURATION
            .with_label_values(&[operation.name()])
            .observe(elapsed.as_secs_f64());

        *stage = Stage::ParsingResponse;
        let response = Record::from_xml(&body)?;

        *stage = Stage::VerifyingResponse;
        let verified = check_response(operation, &response, config.signing_key());

        if operation.is_reported() {
            self.submit_report(&url, elapsed, &response);
        }

        verified?;
        *stage = Stage::Done;
        debug!(elapsed_ms = elapsed.as_millis() as u64, "round trip completed");
        Ok(response)
    }

    fn enrich(&self, operation: Operation, record: &mut Record, config: &MerchantConfig) {
        if operation != Operation::SandboxSignKey {
            set_if_configured(record, fields::APPID, &config.app_id);
        }
        set_if_configured(record, fields::MCH_ID, &config.mch_id);

        if operation != Operation::Report {
            if let Some(sub_app_id) = &config.sub_app_id {
                set_if_configured(record, fields::SUB_APPID, sub_app_id);
            }
            if let Some(sub_mch_id) = &config.sub_mch_id {
                set_if_configured(record, fields::SUB_MCH_ID, sub_mch_id);
            }
        }

        if operation.fills_client_ip() {
            set_if_configured(record, fields::SPBILL_CREATE_IP, &self.options.client_ip);
        }
        if operation == Operation::UnifiedOrder {
            set_if_configured(record, fields::NOTIFY_URL, &self.options.notify_url);
        }

        record.set_default(fields::NONCE_STR, nonce_str());
    }

    /// Exchange the production key for a sandbox key, unless one is installed
    async fn ensure_sandbox_key(&self) -> Result<()> {
        if self.config.read().sandbox_key.is_some() {
            return Ok(());
        }
        self.setup_sandbox().await.map(|_| ())
    }

    /// Fetch a sandbox signing key and install it into the shared config.
    ///
    /// The key is only written after a well-formed SUCCESS reply carrying a
    /// non-empty `sandbox_signkey`; on any failure the config is untouched.
    pub async fn setup_sandbox(&self) -> Result<String> {
        let (mch_id, key) = {
            let config = self.config.read();
            config.validate()?;
            (config.mch_id.clone(), config.key.clone())
        };

        let mut record = SandboxSignKey::new()
            .mch_id(&mch_id)
            .nonce_str(&nonce_str())
            .into_record();
        Operation::SandboxSignKey.validate(&record)?;
        record.set_sign(&key);

        let url = Operation::SandboxSignKey.url(&self.options.base_url, true);
        let body = self
            .transport
            .request_xml(&record, &url, Method::POST, false, self.options.timeout)
            .await?;
        let response = Record::from_xml(&body)?;
        check_response(Operation::SandboxSignKey, &response, &key)?;

        let sandbox_key = response
            .get_str(fields::SANDBOX_SIGNKEY)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                Error::MalformedPayload("key exchange reply has no sandbox_signkey".to_string())
            })?
            .to_string();

        self.config.write().install_sandbox_key(sandbox_key.clone());
        info!(mch_id = %mch_id, "sandbox signing key installed");
        Ok(sandbox_key)
    }

    fn submit_report(&self, url: &str, elapsed: Duration, response: &Record) {
        if !report::should_report(self.options.report_level, response) {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let report = report::build_report(url, elapsed, response, &self.options.client_ip);
        let client = self.clone();
        runtime.spawn(async move {
            let timeout = client.options.report_timeout;
            if let Err(e) = client.execute_with_timeout(report, timeout).await {
                debug!(error = %e, "timing report dropped");
            }
        });
    }

    /// QR landing URL for a NATIVE `code_url`; empty input is returned as is
    pub fn code_url(url: &str) -> String {
        if url.is_empty() {
            return String::new();
        }
        let encoded: String = url::form_urlencoded::byte_serialize(url.as_bytes()).collect();
        format!("{CODE_URL_PREFIX}{encoded}")
    }

    /// Signed parameter set an app passes to the wallet SDK for `prepay_id`
    pub fn app_payment_params(&self, prepay_id: &str) -> Result<Record> {
        let config = self.config.read().clone();
        config.validate()?;

        let mut params = Record::new();
        params.set("appid", config.app_id.as_str());
        params.set("partnerid", config.mch_id.as_str());
        params.set("prepayid", prepay_id);
        params.set("package", "Sign=WXPay");
        params.set("noncestr", nonce_str());
        params.set("timestamp", chrono::Utc::now().timestamp().to_string());
        params.set_sign(config.signing_key());
        Ok(params)
    }
}

fn set_if_configured(record: &mut Record, key: &str, value: &str) {
    if !value.is_empty() {
        record.set_default(key, value);
    }
}

/// Check return_code, then the signature as the operation requires
fn check_response(operation: Operation, response: &Record, key: &str) -> Result<()> {
    if response.return_code() != Some(fields::SUCCESS) {
        return Err(Error::Rejected {
            return_code: response.return_code().unwrap_or_default().to_string(),
            message: response.return_msg().unwrap_or_default().to_string(),
        });
    }

    match operation.response_check() {
        ResponseCheck::Required if !response.has_sign() => Err(Error::SignatureMismatch(
            format!("{operation} response is not signed"),
        )),
        ResponseCheck::Required | ResponseCheck::IfSigned
            if response.has_sign() && !response.verify_sign(key) =>
        {
            Err(Error::SignatureMismatch(format!(
                "{operation} response signature does not match"
            )))
        }
        _ => Ok(()),
    }
}

/// Random lowercase alphanumeric nonce of [`crate::NONCE_LENGTH`] characters
pub fn nonce_str() -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..crate::NONCE_LENGTH)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

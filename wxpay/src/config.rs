//! Merchant configuration and process settings

use crate::{Error, Result};
use config::{Environment, File};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::sync::Arc;

/// Merchant configuration shared by clients.
///
/// The sandbox key exchange writes the negotiated key into this value. Clients
/// running concurrently against one instance must be synchronized by the
/// caller: a production round trip can start while a sandbox client installs
/// its key.
pub type SharedMerchantConfig = Arc<RwLock<MerchantConfig>>;

/// One payee account
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MerchantConfig {
    /// Public account / app ID
    pub app_id: String,
    /// Merchant ID
    pub mch_id: String,
    /// Shared signing secret
    pub key: String,
    /// Sub-merchant app ID (service-provider mode)
    pub sub_app_id: Option<String>,
    /// Sub-merchant ID (service-provider mode)
    pub sub_mch_id: Option<String>,
    /// Client certificate (PEM) for mutual TLS
    pub ssl_cert_path: Option<String>,
    /// Client private key (PEM) for mutual TLS
    pub ssl_key_path: Option<String>,
    /// Route requests to the sandbox
    pub sandbox: bool,
    /// Key negotiated with the sandbox; replaces `key` while `sandbox` is on
    #[serde(skip)]
    pub sandbox_key: Option<String>,
}

impl MerchantConfig {
    /// Create config from credentials
    pub fn new(
        app_id: impl Into<String>,
        mch_id: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            mch_id: mch_id.into(),
            key: key.into(),
            ..Default::default()
        }
    }

    /// Key used to sign and verify right now
    pub fn signing_key(&self) -> &str {
        match (&self.sandbox_key, self.sandbox) {
            (Some(key), true) => key,
            _ => &self.key,
        }
    }

    /// Install the sandbox key returned by the key exchange
    pub fn install_sandbox_key(&mut self, key: impl Into<String>) {
        self.sandbox_key = Some(key.into());
    }

    /// Credentials tuple for callback verification
    pub fn credentials(&self) -> MerchantCredentials {
        MerchantCredentials {
            app_id: self.app_id.clone(),
            mch_id: self.mch_id.clone(),
            key: self.signing_key().to_string(),
        }
    }

    /// Check that the account is usable for signing
    pub fn validate(&self) -> Result<()> {
        if self.mch_id.is_empty() {
            return Err(Error::Config("merchant mch_id is not configured".to_string()));
        }
        if self.key.is_empty() {
            return Err(Error::Config("merchant key is not configured".to_string()));
        }
        Ok(())
    }

    /// Wrap for sharing between clients
    pub fn shared(self) -> SharedMerchantConfig {
        Arc::new(RwLock::new(self))
    }
}

impl fmt::Debug for MerchantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MerchantConfig")
            .field("app_id", &self.app_id)
            .field("mch_id", &self.mch_id)
            .field("key", &"<redacted>")
            .field("sub_app_id", &self.sub_app_id)
            .field("sub_mch_id", &self.sub_mch_id)
            .field("ssl_cert_path", &self.ssl_cert_path)
            .field("ssl_key_path", &self.ssl_key_path)
            .field("sandbox", &self.sandbox)
            .field("sandbox_key", &self.sandbox_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Credentials a callback may be signed with
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerchantCredentials {
    /// Public account / app ID
    pub app_id: String,
    /// Merchant ID
    pub mch_id: String,
    /// Shared signing secret
    pub key: String,
}

impl fmt::Debug for MerchantCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MerchantCredentials")
            .field("app_id", &self.app_id)
            .field("mch_id", &self.mch_id)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// HTTP proxy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Proxy host; `0.0.0.0` disables the proxy
    pub host: String,
    /// Proxy port; 0 disables the proxy
    pub port: u16,
}

impl ProxyConfig {
    /// Proxy URL, if enabled
    pub fn url(&self) -> Option<String> {
        if self.host.is_empty() || self.host == "0.0.0.0" || self.port == 0 {
            None
        } else {
            Some(format!("http://{}:{}", self.host, self.port))
        }
    }
}

/// Which round trips are reported to the gateway's timing endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ReportLevel {
    /// Never report
    Off,
    /// Report only calls that did not succeed
    #[default]
    FailuresOnly,
    /// Report every call
    All,
}

impl TryFrom<u8> for ReportLevel {
    type Error = String;

    fn try_from(level: u8) -> std::result::Result<Self, Self::Error> {
        match level {
            0 => Ok(ReportLevel::Off),
            1 => Ok(ReportLevel::FailuresOnly),
            2 => Ok(ReportLevel::All),
            other => Err(format!("invalid report level {other}, expected 0, 1 or 2")),
        }
    }
}

impl From<ReportLevel> for u8 {
    fn from(level: ReportLevel) -> Self {
        match level {
            ReportLevel::Off => 0,
            ReportLevel::FailuresOnly => 1,
            ReportLevel::All => 2,
        }
    }
}

/// Process-wide settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Default merchant
    pub merchant: MerchantConfig,
    /// HTTP proxy
    pub proxy: Option<ProxyConfig>,
    /// Telemetry verbosity
    pub report_level: ReportLevel,
    /// Default callback URL for unified orders
    pub notify_url: String,
    /// Payer / reporting IP
    pub client_ip: String,
    /// Business call timeout
    pub timeout_seconds: u64,
    /// Timing report timeout
    pub report_timeout_seconds: u64,
    /// Gateway base URL
    pub base_url: String,
    /// Accounts tried in order when verifying callbacks
    #[serde(default)]
    pub notify_merchants: Vec<MerchantCredentials>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            merchant: MerchantConfig::default(),
            proxy: None,
            report_level: ReportLevel::default(),
            notify_url: String::new(),
            client_ip: "127.0.0.1".to_string(),
            timeout_seconds: crate::DEFAULT_REQUEST_TIMEOUT_SECONDS,
            report_timeout_seconds: crate::DEFAULT_REPORT_TIMEOUT_SECONDS,
            base_url: crate::DEFAULT_BASE_URL.to_string(),
            notify_merchants: Vec::new(),
        }
    }
}

impl Settings {
    /// Load from `WXPAY_CONFIG_FILE` (or `config/wxpay`) and `WXPAY__*` env vars
    pub fn from_env() -> Result<Self> {
        let file = env::var("WXPAY_CONFIG_FILE").unwrap_or_else(|_| "config/wxpay".to_string());
        Self::load(Some(&file))
    }

    /// Load defaults, an optional file, then environment overrides.
    ///
    /// The default merchant must be usable unless `notify_merchants` is
    /// configured; clients check it again in [`crate::GatewayClient::from_settings`].
    pub fn load(file: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("merchant.sandbox", false)?
            .set_default("report_level", 1)?
            .set_default("notify_url", "")?
            .set_default("client_ip", "127.0.0.1")?
            .set_default("timeout_seconds", crate::DEFAULT_REQUEST_TIMEOUT_SECONDS)?
            .set_default("report_timeout_seconds", crate::DEFAULT_REPORT_TIMEOUT_SECONDS)?
            .set_default("base_url", crate::DEFAULT_BASE_URL)?;

        if let Some(path) = file {
            builder = builder.add_source(File::with_name(path).required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix("WXPAY")
                .prefix_separator("__")
                .separator("__"),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        // The default merchant is only a callback candidate when no list is set
        if settings.notify_merchants.is_empty() {
            settings.merchant.validate()?;
        }
        Ok(settings)
    }

    /// Callback verification candidates: the configured list, or the
    /// default merchant alone
    pub fn notify_candidates(&self) -> Vec<MerchantCredentials> {
        if self.notify_merchants.is_empty() {
            vec![self.merchant.credentials()]
        } else {
            self.notify_merchants.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_signing_key_follows_sandbox() {
        let mut config = MerchantConfig::new("wx1", "100", "prod-key");
        config.install_sandbox_key("sandbox-key");
        assert_eq!(config.signing_key(), "prod-key");

        config.sandbox = true;
        assert_eq!(config.signing_key(), "sandbox-key");
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = MerchantConfig::new("wx1", "100", "super-secret");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("wx1"));
    }

    #[test]
    fn test_proxy_disabled_values() {
        let proxy = ProxyConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
        };
        assert_eq!(proxy.url(), None);

        let proxy = ProxyConfig {
            host: "10.0.0.1".to_string(),
            port: 0,
        };
        assert_eq!(proxy.url(), None);

        let proxy = ProxyConfig {
            host: "10.0.0.1".to_string(),
            port: 3128,
        };
        assert_eq!(proxy.url().as_deref(), Some("http://10.0.0.1:3128"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
report_level = 2
notify_url = "https://shop.example/notify"

[merchant]
app_id = "wx426b3015555a46be"
mch_id = "1900009851"
key = "8934e7d15453e97507ef794cf7b0519d"

[[notify_merchants]]
app_id = "wxA"
mch_id = "1"
key = "keyA"

[[notify_merchants]]
app_id = "wxB"
mch_id = "2"
key = "keyB"
"#
        )
        .unwrap();

        let settings = Settings::load(file.path().to_str()).unwrap();
        assert_eq!(settings.merchant.mch_id, "1900009851");
        assert_eq!(settings.report_level, ReportLevel::All);
        assert_eq!(settings.timeout_seconds, 6);
        assert_eq!(settings.base_url, crate::DEFAULT_BASE_URL);
        assert_eq!(settings.notify_candidates().len(), 2);
        assert_eq!(settings.notify_candidates()[1].key, "keyB");
    }

    #[test]
    fn test_load_requires_merchant_key() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[merchant]\nmch_id = \"1900009851\"").unwrap();

        let err = Settings::load(file.path().to_str()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_with_only_notify_merchants() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[[notify_merchants]]
app_id = "wxA"
mch_id = "1"
key = "keyA"
"#
        )
        .unwrap();

        let settings = Settings::load(file.path().to_str()).unwrap();
        assert!(settings.merchant.mch_id.is_empty());
        assert_eq!(settings.notify_candidates().len(), 1);
        assert_eq!(settings.notify_candidates()[0].mch_id, "1");
    }

    #[test]
    fn test_default_candidate_is_merchant() {
        let settings = Settings {
            merchant: MerchantConfig::new("wx1", "100", "k"),
            ..Default::default()
        };
        assert_eq!(
            settings.notify_candidates(),
            vec![MerchantCredentials {
                app_id: "wx1".to_string(),
                mch_id: "100".to_string(),
                key: "k".to_string(),
            }]
        );
    }
}

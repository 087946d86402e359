//! HTTPS transport

use crate::{config::Settings, Error, Record, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Identity, Method, Proxy};
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;
use tracing::debug;

/// Gateway transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Plain request. GET appends `params` as a query string, other methods
    /// send them form-encoded. Any HTTP status is returned to the caller.
    ///
    /// Bounded by the transport's default request timeout.
    async fn request(&self, url: &str, method: Method, params: &Record) -> Result<(u16, Bytes)>;

    /// Send a signed record as XML and return the raw response body.
    ///
    /// Non-2xx statuses, empty bodies and timeouts are transport errors.
    async fn request_xml(
        &self,
        payload: &Record,
        url: &str,
        method: Method,
        use_client_cert: bool,
        timeout: Duration,
    ) -> Result<Bytes>;
}

/// Transport options
#[derive(Debug, Clone, Default)]
pub struct HttpOptions {
    /// HTTP proxy URL
    pub proxy: Option<String>,
    /// Client certificate path (PEM)
    pub ssl_cert_path: Option<String>,
    /// Client key path (PEM)
    pub ssl_key_path: Option<String>,
    /// Connection timeout
    pub connect_timeout: Option<Duration>,
    /// Total time for calls without an explicit timeout
    /// (default [`crate::DEFAULT_REQUEST_TIMEOUT_SECONDS`])
    pub request_timeout: Option<Duration>,
}

impl HttpOptions {
    /// Options from process settings
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            proxy: settings.proxy.as_ref().and_then(|p| p.url()),
            ssl_cert_path: settings.merchant.ssl_cert_path.clone(),
            ssl_key_path: settings.merchant.ssl_key_path.clone(),
            connect_timeout: None,
            request_timeout: Some(Duration::from_secs(settings.timeout_seconds)),
        }
    }
}

/// reqwest transport. Connections are made over IPv4.
pub struct HttpTransport {
    client: Client,
    cert_client: Option<Client>,
}

impl HttpTransport {
    /// Create transport; loads the client identity when both PEM paths are set
    pub fn new(options: HttpOptions) -> Result<Self> {
        let client = Self::builder(&options)?
            .build()
            .map_err(|e| Error::Config(format!("HTTP client: {e}")))?;

        let cert_client = match (&options.ssl_cert_path, &options.ssl_key_path) {
            (Some(cert_path), Some(key_path)) => {
                let identity = load_identity(cert_path, key_path)?;
                Some(
                    Self::builder(&options)?
                        .identity(identity)
                        .build()
                        .map_err(|e| Error::Config(format!("HTTP client: {e}")))?,
                )
            }
            _ => None,
        };

        Ok(Self {
            client,
            cert_client,
        })
    }

    /// Create transport from process settings
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(HttpOptions::from_settings(settings))
    }

    fn builder(options: &HttpOptions) -> Result<reqwest::ClientBuilder> {
        let mut builder = Client::builder()
            .local_address(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
            .connect_timeout(options.connect_timeout.unwrap_or(Duration::from_secs(5)))
            .timeout(options.request_timeout.unwrap_or(Duration::from_secs(
                crate::DEFAULT_REQUEST_TIMEOUT_SECONDS,
            )));

        if let Some(proxy) = &options.proxy {
            let proxy = Proxy::all(proxy).map_err(|e| Error::Config(format!("proxy: {e}")))?;
            builder = builder.proxy(proxy);
        }

        Ok(builder)
    }
}

fn load_identity(cert_path: &str, key_path: &str) -> Result<Identity> {
    let mut pem = std::fs::read(cert_path)
        .map_err(|e| Error::Config(format!("read client certificate {cert_path}: {e}")))?;
    let key = std::fs::read(key_path)
        .map_err(|e| Error::Config(format!("read client key {key_path}: {e}")))?;
    pem.push(b'\n');
    pem.extend_from_slice(&key);
    Identity::from_pem(&pem).map_err(|e| Error::Config(format!("client identity: {e}")))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, url: &str, method: Method, params: &Record) -> Result<(u16, Bytes)> {
        let query = params.to_query_string();
        let request = if method == Method::GET {
            let url = match (query.is_empty(), url.contains('?')) {
                (true, _) => url.to_string(),
                (false, true) => format!("{url}&{query}"),
                (false, false) => format!("{url}?{query}"),
            };
            self.client.get(url)
        } else {
            self.client
                .request(method, url)
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(query)
        };

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        debug!(url, status, bytes = body.len(), "HTTP request completed");
        Ok((status, body))
    }

    async fn request_xml(
        &self,
        payload: &Record,
        url: &str,
        method: Method,
        use_client_cert: bool,
        timeout: Duration,
    ) -> Result<Bytes> {
        let client = if use_client_cert {
            self.cert_client.as_ref().ok_or_else(|| {
                Error::Config("client certificate and key paths are not configured".to_string())
            })?
        } else {
            &self.client
        };

        let xml = payload.to_xml()?;
        let response = client
            .request(method, url)
            .timeout(timeout)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .body(xml)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(Error::Transport {
                status: Some(status.as_u16()),
                message,
            });
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Err(Error::Transport {
                status: Some(status.as_u16()),
                message: "empty response body".to_string(),
            });
        }

        debug!(url, status = status.as_u16(), bytes = body.len(), "XML request completed");
        Ok(body)
    }
}

//! Single-request HTTP execution
//!
//! [`Transport`] owns one pooled reqwest client configured with the timeouts,
//! redirect policy and TLS settings from [`TransportConfig`]. Every failure
//! before a response arrives becomes an [`Error::Transport`] naming the URL.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use reqwest::redirect::Policy;
use reqwest::{Certificate, Client};
use tracing::{debug, warn};

use super::request::Request;
use crate::error::Error;
use crate::headers::Headers;

/// Default total timeout for a request
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connect timeout for a request
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default number of redirects followed before giving up
pub const DEFAULT_MAX_REDIRECTS: usize = 3;

/// Connection settings for a [`Transport`]
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Total time allowed for a request, body included
    pub timeout: Duration,
    /// Time allowed to establish the connection
    pub connect_timeout: Duration,
    pub max_redirects: usize,
    pub user_agent: String,
    /// Validate server certificates
    pub verify_tls: bool,
    /// Extra PEM bundle of trusted roots
    pub ca_bundle: Option<PathBuf>,
    /// Trust the bundled webpki roots
    pub built_in_roots: bool,
    /// Headers sent with every request
    pub default_headers: Vec<(String, String)>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            user_agent: default_user_agent(),
            verify_tls: true,
            ca_bundle: None,
            built_in_roots: true,
            default_headers: vec![(
                "Accept-Language".to_string(),
                "en-us,en;q=0.5".to_string(),
            )],
        }
    }
}

impl TransportConfig {
    /// Whether the client has no trusted root bundle to validate against.
    ///
    /// With verification on and no roots, redirects that change scheme are not
    /// followed: the hop would fail certificate validation on the new host.
    pub fn lacks_trusted_roots(&self) -> bool {
        self.verify_tls && !self.built_in_roots && self.ca_bundle.is_none()
    }
}

/// Descriptive User-Agent identifying the client and its version
pub fn default_user_agent() -> String {
    format!(
        "{}/{} (+https://instaphp.com)",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    )
}

/// A fully buffered HTTP response as received
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    /// Reason phrase for the status, `"Unknown"` for non-standard codes
    pub reason: String,
    pub headers: Headers,
    pub body: Vec<u8>,
    /// Final URL after redirects
    pub url: String,
    pub method: super::Method,
    pub elapsed: Duration,
}

impl RawResponse {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Executes requests against a shared connection pool
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    config: TransportConfig,
}

impl Transport {
    /// Builds the underlying client.
    ///
    /// Fails with a transport error when the TLS bundle cannot be read or the
    /// client cannot be created.
    pub fn new(config: TransportConfig) -> Result<Self, Error> {
        let mut builder = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .redirect(redirect_policy(&config))
            .tls_built_in_root_certs(config.built_in_roots);

        if !config.verify_tls {
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(path) = &config.ca_bundle {
            let pem = std::fs::read(path).map_err(|e| Error::Transport {
                code: e.raw_os_error(),
                message: format!("cannot read CA bundle {}: {e}", path.display()),
                url: String::new(),
            })?;
            let certs = Certificate::from_pem_bundle(&pem).map_err(|e| Error::Transport {
                code: None,
                message: format!("invalid CA bundle {}: {e}", path.display()),
                url: String::new(),
            })?;
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        if config.lacks_trusted_roots() {
            warn!("no trusted root bundle; redirects across schemes will not be followed");
        }

        let client = builder.build().map_err(|e| Error::from_reqwest(&e, ""))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    /// Turns a [`Request`] into a ready-to-send reqwest request
    pub(crate) fn build(&self, request: &Request) -> Result<reqwest::Request, Error> {
        let url = request.wire_url();
        let mut builder = self.client.request(request.method.into(), &url);

        for (name, value) in self.config.default_headers.iter().chain(&request.headers) {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = request.wire_body() {
            builder = builder
                .header(
                    reqwest::header::CONTENT_TYPE,
                    "application/x-www-form-urlencoded",
                )
                .body(body);
        }

        builder.build().map_err(|e| Error::from_reqwest(&e, &url))
    }

    /// Sends a request and buffers the whole response
    pub async fn execute(&self, request: &Request) -> Result<RawResponse, Error> {
        let built = self.build(request)?;
        send(self.client.clone(), built, request.method).await
    }
}

/// Sends a built request on `client`.
///
/// Owns all of its inputs so the future can be stored by the multiplexer.
pub(crate) async fn send(
    client: Client,
    request: reqwest::Request,
    method: super::Method,
) -> Result<RawResponse, Error> {
    let url = request.url().to_string();
    let started = Instant::now();
    debug!(%method, %url, "sending HTTP request");

    let response = match client.execute(request).await {
        Ok(response) => response,
        Err(err) => {
            debug!(%method, %url, error = %err, "HTTP request failed");
            return Err(Error::from_reqwest(&err, &url));
        }
    };

    let status = response.status();
    let final_url = response.url().to_string();
    let headers = Headers::from(response.headers());
    let body = response
        .bytes()
        .await
        .map_err(|e| Error::from_reqwest(&e, &final_url))?
        .to_vec();
    let elapsed = started.elapsed();

    debug!(
        %method,
        url = %final_url,
        status = status.as_u16(),
        elapsed_ms = elapsed.as_millis() as u64,
        "received HTTP response"
    );

    Ok(RawResponse {
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
        headers,
        body,
        url: final_url,
        method,
        elapsed,
    })
}

fn redirect_policy(config: &TransportConfig) -> Policy {
    let max = config.max_redirects;
    if max == 0 {
        return Policy::none();
    }
    let same_scheme_only = config.lacks_trusted_roots();
    Policy::custom(move |attempt| {
        if attempt.previous().len() > max {
            return attempt.error(format!("too many redirects (max {max})"));
        }
        if same_scheme_only {
            let crosses = attempt
                .previous()
                .last()
                .is_some_and(|prev| prev.scheme() != attempt.url().scheme());
            if crosses {
                return attempt.stop();
            }
        }
        attempt.follow()
    })
}

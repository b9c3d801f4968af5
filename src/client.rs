//! API client facade
//!
//! [`Client`] resolves logical paths against the configured endpoint,
//! decorates parameters with the application's credentials, runs requests
//! through the [`Transport`] and classifies the result. GET responses are
//! served from and stored to the configured cache.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{self, cache_key, Cache};
use crate::config::ClientConfig;
use crate::error::Error;
use crate::http::{
    encode, Method, Multiplexer, Params, Request, Transport, ACCESS_TOKEN_PARAM, CLIENT_ID_PARAM,
};
use crate::response::{classify, Response};

/// Path of the OAuth token exchange, outside the versioned API
pub const OAUTH_TOKEN_PATH: &str = "/oauth/access_token";

/// Path of the OAuth authorization page
pub const OAUTH_AUTHORIZE_PATH: &str = "/oauth/authorize/";

/// Client for the REST API
#[derive(Debug)]
pub struct Client {
    config: ClientConfig,
    transport: Transport,
    cache: Option<Arc<dyn Cache>>,
    access_token: String,
    current_user: Option<Value>,
}

impl Client {
    /// Builds the transport and, when enabled, opens the cache.
    ///
    /// A cache that cannot be opened is logged and left out; the client then
    /// always goes to the network.
    pub fn new(config: ClientConfig) -> Result<Self, Error> {
        let transport = Transport::new(config.transport.clone())?;

        let cache: Option<Arc<dyn Cache>> = if config.cache.enabled {
            match cache::open_engine(&config.cache) {
                Ok(cache) => Some(Arc::from(cache)),
                Err(e) => {
                    warn!(engine = %config.cache.engine, error = %e, "cache unavailable, continuing without it");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            access_token: config.access_token.clone(),
            config,
            transport,
            cache,
            current_user: None,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn cache(&self) -> Option<&dyn Cache> {
        self.cache.as_deref()
    }

    /// A multiplexer sharing this client's connection pool
    pub fn multiplexer(&self) -> Multiplexer {
        Multiplexer::new(self.transport.clone())
    }

    pub fn set_access_token(&mut self, access_token: impl Into<String>) {
        self.access_token = access_token.into();
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Whether an access token is set. The token itself is not validated.
    pub fn is_authorized(&self) -> bool {
        !self.access_token.is_empty()
    }

    /// User returned by the last successful [`Client::exchange_code`]
    pub fn current_user(&self) -> Option<&Value> {
        self.current_user.as_ref()
    }

    /// Normalizes an API path: wraps it in slashes, collapses repeated
    /// slashes and prefixes the API version unless it is already there.
    pub fn build_path(&self, path: &str, add_version: bool) -> String {
        let wrapped = format!("/{path}/");
        let mut normalized = String::with_capacity(wrapped.len());
        for ch in wrapped.chars() {
            if ch == '/' && normalized.ends_with('/') {
                continue;
            }
            normalized.push(ch);
        }

        let prefix = format!("/{}/", self.config.version);
        if add_version && !normalized.starts_with(&prefix) {
            normalized = format!("/{}{}", self.config.version, normalized);
        }
        normalized
    }

    /// Absolute URL for an API path
    pub fn url(&self, path: &str, add_version: bool) -> String {
        format!(
            "{}{}",
            self.config.endpoint.trim_end_matches('/'),
            self.build_path(path, add_version)
        )
    }

    /// Builds a request for `path` with credentials attached.
    ///
    /// The client id is added unless the caller set one. The access token is
    /// added when the client holds one, and then the client id is dropped on
    /// the wire.
    pub fn request(&self, method: Method, path: &str, params: Params) -> Request {
        let mut params = params;
        if !self.config.client_id.is_empty() && !params.contains(CLIENT_ID_PARAM) {
            params.set(CLIENT_ID_PARAM, self.config.client_id.clone());
        }
        if self.is_authorized() && !params.contains(ACCESS_TOKEN_PARAM) {
            params.set(ACCESS_TOKEN_PARAM, self.access_token.clone());
        }
        Request::new(method, self.url(path, true)).params(params)
    }

    pub async fn get(&self, path: &str, params: Params) -> Result<Response, Error> {
        self.send(self.request(Method::Get, path, params)).await
    }

    pub async fn post(&self, path: &str, params: Params) -> Result<Response, Error> {
        self.send(self.request(Method::Post, path, params)).await
    }

    pub async fn put(&self, path: &str, params: Params) -> Result<Response, Error> {
        self.send(self.request(Method::Put, path, params)).await
    }

    pub async fn delete(&self, path: &str, params: Params) -> Result<Response, Error> {
        self.send(self.request(Method::Delete, path, params)).await
    }

    /// Executes a prepared request and classifies the response.
    ///
    /// For GET the cache is consulted first, and a response without an error
    /// is stored afterwards.
    pub async fn send(&self, request: Request) -> Result<Response, Error> {
        let key = match (request.method, self.cache()) {
            (Method::Get, Some(_)) => Some(cache_key(
                &request.url,
                &request.wire_params().to_query_string(),
            )),
            _ => None,
        };

        if let (Some(key), Some(cache)) = (&key, &self.cache) {
            if let Some(response) = read_cached(Arc::clone(cache), key.clone()).await {
                debug!(url = %request.url, %key, "cache hit");
                return Ok(response);
            }
            debug!(url = %request.url, %key, "cache miss");
        }

        let raw = self.transport.execute(&request).await?;
        let response = classify(&raw);

        if let (Some(key), Some(cache)) = (&key, self.cache()) {
            if !response.is_error() {
                match cache.write_json(key, &response, None) {
                    Ok(()) => debug!(url = %request.url, %key, "cached response"),
                    Err(e) => warn!(%key, error = %e, "failed to cache response"),
                }
            }
        }

        response.into_result()
    }

    /// URL of the OAuth authorization page. `display_touch` asks for the
    /// mobile layout.
    pub fn authorize_url(&self, display_touch: bool) -> String {
        format!(
            "{}{}?client_id={}&redirect_uri={}&scope={}&response_type=code{}",
            self.config.endpoint.trim_end_matches('/'),
            OAUTH_AUTHORIZE_PATH,
            encode(&self.config.client_id),
            encode(&self.config.redirect_uri),
            self.config.scope,
            if display_touch { "&display=touch" } else { "" }
        )
    }

    /// Trades an authorization code for an access token.
    ///
    /// On success the token and the returned user are kept on the client for
    /// later calls.
    pub async fn exchange_code(&mut self, code: &str) -> Result<Response, Error> {
        let params = Params::new()
            .with(CLIENT_ID_PARAM, self.config.client_id.clone())
            .with("client_secret", self.config.client_secret.clone())
            .with("grant_type", "authorization_code")
            .with("redirect_uri", self.config.redirect_uri.clone())
            .with("code", code);
        let request = Request::post(self.url(OAUTH_TOKEN_PATH, false)).params(params);

        let response = self.send(request).await?;
        if let Some(auth) = &response.auth {
            debug!("stored access token from code exchange");
            self.access_token = auth.access_token.clone();
            self.current_user = Some(auth.user.clone());
        }
        Ok(response)
    }
}

/// Reads a cached response off the async workers; file reads may sleep
/// between retries
async fn read_cached(cache: Arc<dyn Cache>, key: String) -> Option<Response> {
    match tokio::task::spawn_blocking(move || cache.read_json::<Response>(&key)).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "cache read task failed");
            None
        }
    }
}

/// Fills each `{}` in `template` with the next argument, percent-encoded.
///
/// Placeholders without a matching argument are left as they are; surplus
/// arguments are ignored.
pub fn format_path(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut pieces = template.split("{}").peekable();
    while let Some(piece) = pieces.next() {
        out.push_str(piece);
        if pieces.peek().is_some() {
            match args.next() {
                Some(arg) => out.push_str(&encode(arg)),
                None => out.push_str("{}"),
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use tempfile::TempDir;

    fn client() -> Client {
        Client::new(ClientConfig {
            client_id: "abc".to_string(),
            redirect_uri: "https://example.com/callback?x=1".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_build_path_normalizes_slashes() {
        let client = client();
        assert_eq!(client.build_path("users/self", true), "/v1/users/self/");
        assert_eq!(client.build_path("//media///popular", true), "/v1/media/popular/");
        assert_eq!(client.build_path("", true), "/v1/");
    }

    #[test]
    fn test_build_path_keeps_existing_version() {
        let client = client();
        assert_eq!(client.build_path("/v1/tags/cats", true), "/v1/tags/cats/");
        assert_eq!(client.build_path("v1", true), "/v1/");
        assert_eq!(client.build_path("/v1x/a", true), "/v1/v1x/a/");
    }

    #[test]
    fn test_build_path_without_version() {
        let client = client();
        assert_eq!(
            client.build_path("/oauth/access_token", false),
            "/oauth/access_token/"
        );
    }

    #[test]
    fn test_url_joins_endpoint() {
        let client = client();
        assert_eq!(
            client.url("media/popular", true),
            "https://api.instagram.com/v1/media/popular/"
        );
    }

    #[test]
    fn test_format_path_encodes_arguments() {
        assert_eq!(
            format_path("/tags/{}/media/recent", &["snow day"]),
            "/tags/snow+day/media/recent"
        );
        assert_eq!(
            format_path("/media/{}/comments/{}", &["1/2", "3"]),
            "/media/1%2F2/comments/3"
        );
        assert_eq!(format_path("/users/{}/{}", &["self"]), "/users/self/{}");
        assert_eq!(format_path("/plain", &["ignored"]), "/plain");
    }

    #[test]
    fn test_request_adds_client_id_without_token() {
        let client = client();
        let request = client.request(Method::Get, "media/popular", Params::new());
        assert_eq!(request.params.get(CLIENT_ID_PARAM), Some("abc"));
        assert!(!request.params.contains(ACCESS_TOKEN_PARAM));
        assert!(request.wire_url().ends_with("?client_id=abc"));
    }

    #[test]
    fn test_request_with_token_drops_client_id_on_wire() {
        let mut client = client();
        client.set_access_token("tok");
        let request = client.request(Method::Get, "users/self", Params::new().with("count", "5"));

        let wire = request.wire_params();
        assert_eq!(wire.get(ACCESS_TOKEN_PARAM), Some("tok"));
        assert!(!wire.contains(CLIENT_ID_PARAM));
        assert_eq!(wire.get("count"), Some("5"));
    }

    #[test]
    fn test_access_token_lifecycle() {
        let mut client = client();
        assert!(!client.is_authorized());
        assert!(client.current_user().is_none());

        client.set_access_token("tok");
        assert!(client.is_authorized());
        assert_eq!(client.access_token(), "tok");

        client.set_access_token("");
        assert!(!client.is_authorized());
    }

    #[test]
    fn test_authorize_url() {
        let client = client();
        let url = client.authorize_url(false);
        assert_eq!(
            url,
            "https://api.instagram.com/oauth/authorize/?client_id=abc\
             &redirect_uri=https%3A%2F%2Fexample.com%2Fcallback%3Fx%3D1\
             &scope=comments+relationships+likes&response_type=code"
        );
        assert!(client.authorize_url(true).ends_with("&display=touch"));
    }

    #[test]
    fn test_cache_disabled_by_default() {
        assert!(client().cache().is_none());
    }

    #[test]
    fn test_cache_opened_when_enabled() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let client = Client::new(ClientConfig {
            cache: CacheConfig {
                enabled: true,
                dir: Some(temp_dir.path().to_path_buf()),
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap();
        assert!(client.cache().is_some());
    }

    #[test]
    fn test_unknown_cache_engine_is_not_fatal() {
        let client = Client::new(ClientConfig {
            cache: CacheConfig {
                enabled: true,
                engine: "redis".to_string(),
                ..Default::default()
            },
            ..Default::default()
        })
        .unwrap();
        assert!(client.cache().is_none());
    }
}

//! Normalized API responses and the classifier that produces them
//!
//! [`classify`] turns a [`RawResponse`] into a [`Response`]. The body is
//! inspected in a fixed order:
//!
//! 1. embed payloads (`provider_url`) return straight away, without an error
//! 2. bodies that are not a JSON object are malformed
//! 3. a top-level `message` is an API error
//! 4. `access_token` fills [`Response::auth`]
//! 5. `meta` (or a top-level OAuth error envelope) is copied, and a
//!    `meta.code` other than 200 is an API error
//! 6. `data` and `pagination` are always copied
//! 7. rate-limit headers are always read
//!
//! The first error found is kept. The HTTP status is then checked on its own:
//! 429 is always a rate-limit error, while 400/500/502/503 become HTTP status
//! errors unless the API already explained the failure in its envelope.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;
use crate::headers::Headers;
use crate::http::{Method, Params, RawResponse};

/// Header holding the request quota for the credential
pub const RATE_LIMIT_HEADER: &str = "X-Ratelimit-Limit";

/// Header holding the requests left in the current window
pub const RATE_LIMIT_REMAINING_HEADER: &str = "X-Ratelimit-Remaining";

/// Fallback error type when the API does not name one
const DEFAULT_ERROR_TYPE: &str = "APIError";

/// The API's status envelope
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub code: Option<u16>,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
}

impl Meta {
    /// Reads the envelope leniently: numeric strings are accepted for `code`
    /// and unknown fields are ignored
    fn from_object(object: &Map<String, Value>) -> Self {
        let code = object.get("code").and_then(|code| match code {
            Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });
        Self {
            code,
            error_type: object.get("error_type").map(value_text),
            error_message: object.get("error_message").map(value_text),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code.map_or(true, |code| code == 200)
    }
}

/// Token and user returned by an OAuth code exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Auth {
    pub access_token: String,
    #[serde(default)]
    pub user: Value,
}

/// A classified API response.
///
/// `error` is set only when classification found a failure; `data`, `meta`
/// and `pagination` may still be filled from the same body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Effective URL after redirects
    pub url: String,
    pub method: Method,
    /// Query parameters of the effective URL
    pub params: Params,
    pub status: u16,
    pub data: Option<Value>,
    pub meta: Option<Meta>,
    pub pagination: Option<Value>,
    pub auth: Option<Auth>,
    /// Third-party embed descriptor (oEmbed)
    pub embed: Option<Value>,
    pub headers: Headers,
    pub rate_limit: u32,
    pub rate_limit_remaining: u32,
    /// Raw response body
    pub json: String,
    #[serde(skip)]
    pub error: Option<Error>,
}

impl Response {
    fn from_raw(raw: &RawResponse) -> Self {
        let params = url::Url::parse(&raw.url)
            .map(|url| url.query_pairs().into_owned().collect())
            .unwrap_or_default();

        Self {
            url: raw.url.clone(),
            method: raw.method,
            params,
            status: raw.status,
            data: None,
            meta: None,
            pagination: None,
            auth: None,
            embed: None,
            headers: raw.headers.clone(),
            rate_limit: 0,
            rate_limit_remaining: 0,
            json: raw.body_text(),
            error: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Splits off the classified error, if any
    pub fn into_result(mut self) -> Result<Response, Error> {
        match self.error.take() {
            Some(error) => Err(error),
            None => Ok(self),
        }
    }
}

/// Classifies a raw HTTP response
pub fn classify(raw: &RawResponse) -> Response {
    let mut response = Response::from_raw(raw);

    let body = match serde_json::from_slice::<Value>(&raw.body) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    };

    if let Some(embed) = body
        .as_ref()
        .filter(|object| object.get("provider_url").is_some_and(|v| !is_blank(v)))
    {
        response.embed = Some(Value::Object(embed.clone()));
        read_rate_limits(&mut response);
        return response;
    }

    let error = match &body {
        None => Some(malformed(raw)),
        Some(object) => classify_body(object, raw, &mut response),
    };

    response.error = escalate(raw, error);
    read_rate_limits(&mut response);
    response
}

/// Populates the response from a decoded body and returns the first API error
fn classify_body(
    body: &Map<String, Value>,
    raw: &RawResponse,
    response: &mut Response,
) -> Option<Error> {
    let mut error = None;

    if let Some(message) = body.get("message") {
        let error_type = body
            .get("type")
            .map(value_text)
            .unwrap_or_else(|| DEFAULT_ERROR_TYPE.to_string());
        error = Some(api_error(raw, error_type, raw.status, value_text(message)));
    }

    if let Some(token) = body.get("access_token").filter(|v| !is_blank(v)) {
        response.auth = Some(Auth {
            access_token: value_text(token),
            user: body.get("user").cloned().unwrap_or(Value::Null),
        });
    }

    let meta = match body.get("meta") {
        Some(Value::Object(meta)) => Some(Meta::from_object(meta)),
        // OAuth endpoints report errors as a bare envelope at the top level
        _ => Some(Meta::from_object(body)).filter(|meta| !meta.is_success()),
    };
    if let Some(meta) = meta {
        if let (None, Some(code)) = (&error, meta.code.filter(|&code| code != 200)) {
            error = Some(api_error(
                raw,
                meta.error_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ERROR_TYPE.to_string()),
                code,
                meta.error_message.clone().unwrap_or_default(),
            ));
        }
        response.meta = Some(meta);
    }

    response.data = body.get("data").cloned();
    response.pagination = body.get("pagination").cloned();

    error
}

/// Applies the status-code rules on top of the body classification
fn escalate(raw: &RawResponse, error: Option<Error>) -> Option<Error> {
    match raw.status {
        429 => {
            let message = match &error {
                Some(Error::Api { message, .. }) if !message.is_empty() => message.clone(),
                _ => status_message(429).to_string(),
            };
            Some(Error::RateLimitExceeded {
                message,
                url: raw.url.clone(),
                headers: raw.headers.clone(),
            })
        }
        400 | 500 | 502 | 503 => match error {
            Some(api @ Error::Api { .. }) => Some(api),
            Some(Error::MalformedResponse { message, .. }) => {
                Some(http_status(raw, message))
            }
            _ => Some(http_status(raw, raw.reason.clone())),
        },
        _ => error,
    }
}

fn malformed(raw: &RawResponse) -> Error {
    Error::MalformedResponse {
        code: raw.status,
        message: status_message(raw.status).to_string(),
        url: raw.url.clone(),
        headers: raw.headers.clone(),
    }
}

fn http_status(raw: &RawResponse, message: String) -> Error {
    Error::HttpStatus {
        code: raw.status,
        message,
        url: raw.url.clone(),
        headers: raw.headers.clone(),
    }
}

fn api_error(raw: &RawResponse, error_type: String, code: u16, message: String) -> Error {
    Error::Api {
        error_type,
        code,
        message,
        url: raw.url.clone(),
        headers: raw.headers.clone(),
    }
}

fn read_rate_limits(response: &mut Response) {
    response.rate_limit = header_u32(&response.headers, RATE_LIMIT_HEADER);
    response.rate_limit_remaining = header_u32(&response.headers, RATE_LIMIT_REMAINING_HEADER);
}

fn header_u32(headers: &Headers, name: &str) -> u32 {
    headers
        .get(name)
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(0)
}

/// Canned message for a status whose body could not be decoded
pub fn status_message(status: u16) -> &'static str {
    match status {
        400 => "Bad request",
        401 => "The API says you are unauthorized",
        402 => "The API says payment is required",
        403 => "The API says you are forbidden",
        404 => "The requested resource was not found",
        405 => "Method not allowed",
        429 => "Too many requests",
        500 => "The API hit an internal error",
        501 => "Not implemented",
        502 => "Bad gateway",
        503 => "The API is currently unavailable",
        504 => "Gateway timeout",
        505 => "HTTP version not supported",
        _ => "Unknown error occurred making this request",
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null | Value::Bool(false) => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(true) | Value::Number(_) => false,
    }
}

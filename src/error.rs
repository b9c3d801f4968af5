//! Error taxonomy for API calls
//!
//! Every failed call surfaces as one [`Error`] variant carrying the request URL,
//! a numeric code and a message. Response headers are attached whenever a
//! response was actually received.

use std::fmt;

use thiserror::Error;

use crate::headers::Headers;

/// Classification of an [`Error`], for callers that only need to branch on the kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Connection, timeout or I/O failure before a response was received
    Transport,
    /// 5xx, or a 400 that carried no API error envelope
    HttpStatus,
    /// HTTP 429
    RateLimitExceeded,
    /// The API's own error envelope (`meta` or top-level `message`)
    ApiError,
    /// The body could not be decoded as a JSON object
    MalformedResponse,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Transport => "transport",
            ErrorKind::HttpStatus => "http status",
            ErrorKind::RateLimitExceeded => "rate limit exceeded",
            ErrorKind::ApiError => "api error",
            ErrorKind::MalformedResponse => "malformed response",
        };
        f.write_str(name)
    }
}

/// Errors returned by the transport and the response classifier
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The request never produced a response
    #[error("Transport error for {url}: {message}")]
    Transport {
        /// Underlying OS error code, when the failure came from the socket layer
        code: Option<i32>,
        message: String,
        url: String,
    },

    /// The server answered with a status that is a failure by itself
    #[error("HTTP {code} from {url}: {message}")]
    HttpStatus {
        code: u16,
        message: String,
        url: String,
        headers: Headers,
    },

    /// The server answered with 429
    #[error("Rate limit exceeded for {url}: {message}")]
    RateLimitExceeded {
        message: String,
        url: String,
        headers: Headers,
    },

    /// The API reported an error in its own envelope
    #[error("{error_type} ({code}): {message}")]
    Api {
        /// API error type, e.g. `OAuthParameterException`
        error_type: String,
        code: u16,
        message: String,
        url: String,
        headers: Headers,
    },

    /// The body was empty or not a JSON object
    #[error("Malformed response ({code}) from {url}: {message}")]
    MalformedResponse {
        code: u16,
        message: String,
        url: String,
        headers: Headers,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Transport { .. } => ErrorKind::Transport,
            Error::HttpStatus { .. } => ErrorKind::HttpStatus,
            Error::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            Error::Api { .. } => ErrorKind::ApiError,
            Error::MalformedResponse { .. } => ErrorKind::MalformedResponse,
        }
    }

    /// Numeric code: the HTTP status, the API's `meta.code`, or the OS error
    /// code for transport failures (0 when unknown)
    pub fn code(&self) -> i64 {
        match self {
            Error::Transport { code, .. } => code.map(i64::from).unwrap_or(0),
            Error::HttpStatus { code, .. }
            | Error::Api { code, .. }
            | Error::MalformedResponse { code, .. } => i64::from(*code),
            Error::RateLimitExceeded { .. } => 429,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Error::Transport { message, .. }
            | Error::HttpStatus { message, .. }
            | Error::RateLimitExceeded { message, .. }
            | Error::Api { message, .. }
            | Error::MalformedResponse { message, .. } => message,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            Error::Transport { url, .. }
            | Error::HttpStatus { url, .. }
            | Error::RateLimitExceeded { url, .. }
            | Error::Api { url, .. }
            | Error::MalformedResponse { url, .. } => url,
        }
    }

    /// Response headers, absent for transport failures
    pub fn headers(&self) -> Option<&Headers> {
        match self {
            Error::Transport { .. } => None,
            Error::HttpStatus { headers, .. }
            | Error::RateLimitExceeded { headers, .. }
            | Error::Api { headers, .. }
            | Error::MalformedResponse { headers, .. } => Some(headers),
        }
    }

    /// The API error type for [`Error::Api`]
    pub fn error_type(&self) -> Option<&str> {
        match self {
            Error::Api { error_type, .. } => Some(error_type),
            _ => None,
        }
    }

    /// Builds a transport error from a reqwest failure, digging the OS error
    /// code out of the source chain when there is one.
    pub(crate) fn from_reqwest(err: &reqwest::Error, url: &str) -> Self {
        let mut message = err.to_string();
        if err.is_timeout() {
            message = format!("timed out: {message}");
        }
        Error::Transport {
            code: io_error_code(err),
            message,
            url: url.to_string(),
        }
    }
}

fn io_error_code(err: &(dyn std::error::Error + 'static)) -> Option<i32> {
    let mut source = err.source();
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            if let Some(code) = io.raw_os_error() {
                return Some(code);
            }
        }
        source = inner.source();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_accessors() {
        let err = Error::Api {
            error_type: "OAuthParameterException".to_string(),
            code: 400,
            message: "bad token".to_string(),
            url: "https://api.instagram.com/v1/users/self/".to_string(),
            headers: Headers::default(),
        };

        assert_eq!(err.kind(), ErrorKind::ApiError);
        assert_eq!(err.code(), 400);
        assert_eq!(err.error_type(), Some("OAuthParameterException"));
        assert_eq!(err.message(), "bad token");
        assert!(err.headers().is_some());
        assert_eq!(err.to_string(), "OAuthParameterException (400): bad token");
    }

    #[test]
    fn test_transport_error_has_no_headers() {
        let err = Error::Transport {
            code: Some(111),
            message: "connection refused".to_string(),
            url: "http://127.0.0.1:1/".to_string(),
        };

        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.code(), 111);
        assert!(err.headers().is_none());
        assert!(err.to_string().contains("http://127.0.0.1:1/"));
    }

    #[test]
    fn test_rate_limit_code_is_429() {
        let err = Error::RateLimitExceeded {
            message: "slow down".to_string(),
            url: "u".to_string(),
            headers: Headers::default(),
        };
        assert_eq!(err.code(), 429);
        assert_eq!(err.kind().to_string(), "rate limit exceeded");
    }
}

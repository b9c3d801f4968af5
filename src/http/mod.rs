//! HTTP transport: request shaping, single-request execution and the
//! multiplexer for concurrent in-flight requests

mod multiplexer;
mod request;
mod transport;

pub use multiplexer::{Handle, Multiplexer};
pub use request::{encode, Method, Params, Request, ACCESS_TOKEN_PARAM, CLIENT_ID_PARAM};
pub use transport::{
    default_user_agent, RawResponse, Transport, TransportConfig, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_MAX_REDIRECTS, DEFAULT_TIMEOUT,
};

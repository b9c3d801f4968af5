//! instaclient library
//!
//! Client core for the Instagram REST API: request shaping and transport, a
//! multiplexer for concurrent requests, the response classifier and a TTL
//! response cache.

pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod headers;
pub mod http;
pub mod response;

pub use client::{format_path, Client};
pub use config::{CacheConfig, ClientConfig};
pub use error::{Error, ErrorKind};
pub use headers::Headers;
pub use response::{classify, Response};

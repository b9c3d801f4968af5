//! Several in-flight requests driven by one poll loop
//!
//! [`Multiplexer::submit`] queues a request and returns a [`Handle`].
//! [`Multiplexer::await_response`] drives every in-flight transfer until the
//! requested one finishes. Transfers that complete along the way are parked in
//! a completed store so a later `await_response` on their handle returns
//! without polling again.
//!
//! Nothing here spawns tasks: all transfers progress inside the caller's
//! `await`, in completion order.

use std::collections::HashMap;
use std::fmt;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tracing::debug;

use super::request::Request;
use super::transport::{send, RawResponse, Transport};
use crate::error::Error;

/// Opaque ticket for a submitted request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

type Transfer = BoxFuture<'static, (Handle, Result<RawResponse, Error>)>;

/// Request multiplexer bound to one [`Transport`]
pub struct Multiplexer {
    transport: Transport,
    next_id: u64,
    in_flight: FuturesUnordered<Transfer>,
    /// Finished transfers not yet claimed
    completed: HashMap<Handle, Result<RawResponse, Error>>,
    /// Target URL of every unclaimed handle
    urls: HashMap<Handle, String>,
}

impl Multiplexer {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            next_id: 0,
            in_flight: FuturesUnordered::new(),
            completed: HashMap::new(),
            urls: HashMap::new(),
        }
    }

    /// Registers a request and starts it.
    ///
    /// Fails immediately when the request cannot be built (bad URL, bad
    /// header). Inside a tokio runtime the new transfer is polled once right
    /// away so its connection starts before the first `await_response`.
    pub fn submit(&mut self, request: &Request) -> Result<Handle, Error> {
        let built = self.transport.build(request)?;
        let handle = Handle(self.next_id);
        self.next_id += 1;

        let url = built.url().to_string();
        debug!(%handle, method = %request.method, %url, "submitting request");
        self.urls.insert(handle, url);

        let client = self.transport.client().clone();
        let method = request.method;
        self.in_flight.push(
            async move { (handle, send(client, built, method).await) }.boxed(),
        );

        if tokio::runtime::Handle::try_current().is_ok() {
            self.drain_ready();
        }
        Ok(handle)
    }

    /// Waits for the transfer behind `handle`.
    ///
    /// Returns at once when the transfer already completed during an earlier
    /// poll. A handle that was never issued, or was already claimed, yields a
    /// transport error.
    pub async fn await_response(&mut self, handle: Handle) -> Result<RawResponse, Error> {
        if let Some(result) = self.claim(handle) {
            return result;
        }
        if !self.urls.contains_key(&handle) {
            return Err(unknown_handle(handle, String::new()));
        }

        while let Some((finished, result)) = self.in_flight.next().await {
            if finished == handle {
                self.urls.remove(&handle);
                self.drain_ready();
                return result;
            }
            debug!(handle = %finished, "storing completed transfer");
            self.completed.insert(finished, result);
        }

        let url = self.urls.remove(&handle).unwrap_or_default();
        Err(unknown_handle(handle, url))
    }

    /// Waits for every outstanding transfer, in handle order
    pub async fn await_all(&mut self) -> Vec<(Handle, Result<RawResponse, Error>)> {
        while let Some((finished, result)) = self.in_flight.next().await {
            self.completed.insert(finished, result);
        }
        self.urls.clear();
        let mut results: Vec<_> = self.completed.drain().collect();
        results.sort_by_key(|(handle, _)| *handle);
        results
    }

    /// Number of transfers still running
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Number of finished transfers waiting to be claimed
    pub fn completed(&self) -> usize {
        self.completed.len()
    }

    pub fn is_completed(&self, handle: Handle) -> bool {
        self.completed.contains_key(&handle)
    }

    fn claim(&mut self, handle: Handle) -> Option<Result<RawResponse, Error>> {
        let result = self.completed.remove(&handle)?;
        self.urls.remove(&handle);
        Some(result)
    }

    /// Polls every transfer once without waiting and parks the ones that
    /// finished
    fn drain_ready(&mut self) {
        while let Some(Some((finished, result))) = self.in_flight.next().now_or_never() {
            debug!(handle = %finished, "storing completed transfer");
            self.completed.insert(finished, result);
        }
    }
}

fn unknown_handle(handle: Handle, url: String) -> Error {
    Error::Transport {
        code: None,
        message: format!("no in-flight request for handle {handle}"),
        url,
    }
}

impl fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Multiplexer")
            .field("in_flight", &self.in_flight.len())
            .field("completed", &self.completed.len())
            .finish()
    }
}

//! Shared fixtures for the integration tests: an in-memory transport that
//! answers from a route table, and clients wired to it.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use hondana::Result;
use hondana::net::{HttpClient, RateLimiter, RawResponse, Request, Transport};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

type Reply = Box<dyn Fn(&Request) -> RawResponse + Send + Sync>;

/// Answers requests by the longest matching URL prefix; unknown URLs get a
/// 404. Every request is recorded.
#[derive(Default)]
pub struct Stub {
    routes: Mutex<Vec<(String, Reply)>>,
    seen: Mutex<Vec<Request>>,
}

impl fmt::Debug for Stub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stub")
            .field("requests", &self.seen.lock().len())
            .finish()
    }
}

impl Stub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route<F>(&self, prefix: &str, reply: F)
    where
        F: Fn(&Request) -> RawResponse + Send + Sync + 'static,
    {
        self.routes.lock().push((prefix.to_string(), Box::new(reply)));
    }

    pub fn json(&self, prefix: &str, body: Value) {
        self.route(prefix, move |req| json(200, &body, &req.url));
    }

    pub fn html(&self, prefix: &str, body: &'static str) {
        self.route(prefix, move |req| html(body, &req.url));
    }

    pub fn status(&self, prefix: &str, status: u16) {
        self.route(prefix, move |req| RawResponse {
            status,
            url: req.url.clone(),
            ..Default::default()
        });
    }

    pub fn requests(&self) -> Vec<Request> {
        self.seen.lock().clone()
    }

    /// Number of requests whose URL starts with `prefix`.
    pub fn hits(&self, prefix: &str) -> usize {
        self.seen
            .lock()
            .iter()
            .filter(|r| r.url.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl Transport for Stub {
    async fn send(&self, request: &Request, _timeout: Duration) -> Result<RawResponse> {
        self.seen.lock().push(request.clone());
        let routes = self.routes.lock();
        let reply = routes
            .iter()
            .filter(|(prefix, _)| request.url.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, reply)| reply(request));
        Ok(reply.unwrap_or_else(|| RawResponse {
            status: 404,
            url: request.url.clone(),
            ..Default::default()
        }))
    }
}

pub fn json(status: u16, body: &Value, url: &str) -> RawResponse {
    RawResponse {
        status,
        headers: HashMap::from([("content-type".into(), "application/json".into())]),
        body: Bytes::from(body.to_string()),
        url: url.to_string(),
    }
}

pub fn html(body: &str, url: &str) -> RawResponse {
    RawResponse {
        status: 200,
        headers: HashMap::from([("content-type".into(), "text/html; charset=UTF-8".into())]),
        body: Bytes::from(body.to_string()),
        url: url.to_string(),
    }
}

pub fn image(body: &'static [u8], url: &str) -> RawResponse {
    RawResponse {
        status: 200,
        headers: HashMap::from([("content-type".into(), "image/png".into())]),
        body: Bytes::from_static(body),
        url: url.to_string(),
    }
}

/// A client on `stub` with its own limiter, so tests never share waits.
pub fn client(stub: &Arc<Stub>) -> HttpClient {
    HttpClient::new()
        .with_transport(stub.clone())
        .with_rate_limiter(Arc::new(RateLimiter::new()))
}

/// Header value of a recorded request, ignoring name case.
pub fn header<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request
        .headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\nstub-image";

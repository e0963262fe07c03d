//! Collector transport
//!
//! The worker talks to the collector only through the [`Collector`] trait:
//! the production implementation is [`HttpCollector`]; tests plug in
//! scripted collectors.

mod auth;
mod client;
mod payload;
mod response;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

pub use auth::authorization_header;
pub use client::HttpCollector;
pub use payload::{encode_body, gzip, EncodedBody, PayloadError};
pub use response::{
    BatchDisposition, HttpResponseKind, InitOutcome, InitResponse, RemoteConfigEntry,
};

/// Remote endpoint receiving init requests and event batches
pub trait Collector: Send + Sync + 'static {
    /// Session-init handshake with the init annotations as body
    fn request_init<'a>(&'a self, body: &'a Value) -> BoxFuture<'a, InitOutcome>;

    /// Submit annotated events as one request
    fn send_events<'a>(&'a self, events: &'a [Value]) -> BoxFuture<'a, HttpResponseKind>;
}

impl Collector for HttpCollector {
    fn request_init<'a>(&'a self, body: &'a Value) -> BoxFuture<'a, InitOutcome> {
        self.init(body).boxed()
    }

    fn send_events<'a>(&'a self, events: &'a [Value]) -> BoxFuture<'a, HttpResponseKind> {
        self.events(events).boxed()
    }
}

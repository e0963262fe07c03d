//! HTTP collector client (reqwest)

use reqwest::header::{AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::PipelineConfig;

use super::auth::authorization_header;
use super::payload::{encode_body, EncodedBody};
use super::response::{HttpResponseKind, InitOutcome, InitResponse};

/// Longest response body echoed into logs
const MAX_LOGGED_BODY: usize = 512;

#[derive(Debug, Clone)]
pub struct HttpCollector {
    http: Client,
    base_url: String,
    game_key: String,
    game_secret: String,
    use_gzip: bool,
}

impl HttpCollector {
    pub fn new(config: &PipelineConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(config.http_timeout).build()?;
        Ok(Self {
            http,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            game_key: config.game_key.clone(),
            game_secret: config.game_secret.clone(),
            use_gzip: config.use_gzip,
        })
    }

    pub fn init_url(&self) -> String {
        format!("{}/v2/{}/init", self.base_url, self.game_key)
    }

    pub fn events_url(&self) -> String {
        format!("{}/v2/{}/events", self.base_url, self.game_key)
    }

    /// Signed POST carrying `body` unchanged
    pub fn build_request(
        &self,
        url: String,
        body: &EncodedBody,
    ) -> Result<RequestBuilder, HttpResponseKind> {
        let auth = authorization_header(&self.game_secret, &body.bytes)
            .map_err(|_| HttpResponseKind::JsonEncodeFailed)?;

        let mut request = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(AUTHORIZATION, auth)
            .body(body.bytes.clone());
        if body.gzipped {
            request = request.header(CONTENT_ENCODING, "gzip");
        }
        Ok(request)
    }

    async fn post(
        &self,
        url: String,
        body: &EncodedBody,
    ) -> Result<(HttpResponseKind, Vec<u8>), HttpResponseKind> {
        let response = self
            .build_request(url, body)?
            .send()
            .await
            .map_err(classify_error)?;
        let kind = HttpResponseKind::from_status(response.status().as_u16());
        let bytes = response.bytes().await.map_err(classify_error)?;
        Ok((kind, bytes.to_vec()))
    }

    /// Session-init handshake
    pub async fn init(&self, body: &Value) -> InitOutcome {
        let encoded = match encode_body(body, false) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, "could not encode init request");
                return InitOutcome::failed(HttpResponseKind::JsonEncodeFailed);
            }
        };
        debug!(url = %self.init_url(), body = %body, "sending init request");

        let (kind, bytes) = match self.post(self.init_url(), &encoded).await {
            Ok(result) => result,
            Err(kind) => return InitOutcome::failed(kind),
        };

        if !kind.is_success() {
            debug!(kind = %kind, body = %preview(&bytes), "init request refused");
            return InitOutcome::failed(kind);
        }

        match InitResponse::parse(&bytes) {
            Ok(parsed) => InitOutcome::new(kind, parsed),
            Err(e) => {
                warn!(error = %e, body = %preview(&bytes), "init response is not valid JSON");
                InitOutcome::failed(HttpResponseKind::JsonDecodeFailed)
            }
        }
    }

    /// Submit a batch of annotated events
    pub async fn events(&self, events: &[Value]) -> HttpResponseKind {
        let encoded = match encode_body(events, self.use_gzip) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, "could not encode event batch");
                return HttpResponseKind::JsonEncodeFailed;
            }
        };
        debug!(
            count = events.len(),
            bytes = encoded.bytes.len(),
            gzip = encoded.gzipped,
            "sending events"
        );

        match self.post(self.events_url(), &encoded).await {
            Ok((HttpResponseKind::BadRequest, bytes)) => {
                warn!(body = %preview(&bytes), "collector rejected event batch");
                HttpResponseKind::BadRequest
            }
            Ok((kind, _)) => kind,
            Err(kind) => kind,
        }
    }
}

fn classify_error(err: reqwest::Error) -> HttpResponseKind {
    if err.is_timeout() {
        HttpResponseKind::RequestTimeout
    } else {
        debug!(error = %err, "request failed without a response");
        HttpResponseKind::NoResponse
    }
}

fn preview(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.chars().take(MAX_LOGGED_BODY).collect()
}

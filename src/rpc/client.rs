//! HTTP/1 client for the RPC service

use super::{ClosePortRequest, ErrorResponse, HealthResponse, OpenPortRequest, StatusResponse};
use crate::{Error, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::CONTENT_TYPE;
use hyper::{Method, Request, StatusCode};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

/// Client for a remote `portmapper-server`
#[derive(Clone)]
pub struct RpcClient {
    server: String,
    client: Client<HttpConnector, Full<Bytes>>,
}

impl RpcClient {
    /// Client for the server at `server` (`host:port`)
    pub fn new(server: impl Into<String>) -> Self {
        let client = Client::builder(hyper_util::rt::TokioExecutor::new()).build_http();
        Self {
            server: server.into(),
            client,
        }
    }

    /// Call `OpenPort`
    pub async fn open_port(&self, request: &OpenPortRequest) -> Result<StatusResponse> {
        info!("Calling OpenPort on {}", self.server);
        self.call(Method::POST, "/OpenPort", Some(request)).await
    }

    /// Call `ClosePort`
    pub async fn close_port(&self, request: &ClosePortRequest) -> Result<StatusResponse> {
        info!("Calling ClosePort on {}", self.server);
        self.call(Method::POST, "/ClosePort", Some(request)).await
    }

    /// Query protocol availability
    pub async fn health(&self) -> Result<HealthResponse> {
        self.call::<(), _>(Method::GET, "/health", None).await
    }

    async fn call<B: Serialize, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let url = format!("http://{}{}", self.server, path);
        let payload = match body {
            Some(body) => serde_json::to_vec(body)?,
            None => Vec::new(),
        };

        let req = Request::builder()
            .method(method)
            .uri(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(Bytes::from(payload)))
            .map_err(|e| Error::Transport(format!("Failed to build request: {}", e)))?;

        let response = self
            .client
            .request(req)
            .await
            .map_err(|e| Error::Transport(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        let body = response
            .collect()
            .await
            .map_err(|e| Error::Transport(format!("Failed to read response: {}", e)))?
            .to_bytes();
        debug!("{} answered {} ({} bytes)", url, status, body.len());

        if status.is_success() {
            return Ok(serde_json::from_slice(&body)?);
        }

        let message = serde_json::from_slice::<ErrorResponse>(&body)
            .map(|e| e.error)
            .unwrap_or_else(|_| String::from_utf8_lossy(&body).into_owned());

        Err(match status {
            StatusCode::NOT_IMPLEMENTED => Error::NotImplemented(message),
            StatusCode::BAD_REQUEST => Error::InvalidArgument(message),
            _ => Error::Transport(format!("Server answered {}: {}", status, message)),
        })
    }
}

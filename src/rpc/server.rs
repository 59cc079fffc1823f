//! HTTP/1 server for the RPC service

use super::{ClosePortRequest, ErrorResponse, OpenPortRequest, RpcHandler};
use crate::{Error, Result};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Body, Incoming};
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Largest request body accepted, in bytes
pub(crate) const MAX_BODY_BYTES: usize = 4 * 1024;

/// RPC server hosting one shared [`RpcHandler`]
pub struct RpcServer {
    handler: Arc<RpcHandler>,
    local_addr: Option<SocketAddr>,
}

impl RpcServer {
    /// Create a server for `handler`
    pub fn new(handler: RpcHandler) -> Self {
        Self {
            handler: Arc::new(handler),
            local_addr: None,
        }
    }

    /// Bind to `addr` and serve connections in the background
    ///
    /// Returns the bound address, which differs from `addr` when port 0 was
    /// requested.
    pub async fn start(&mut self, addr: SocketAddr) -> Result<SocketAddr> {
        info!("Starting RPC server on {}", addr);

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Transport(format!("Failed to bind to {}: {}", addr, e)))?;

        let actual_addr = listener
            .local_addr()
            .map_err(|e| Error::Transport(format!("Failed to get local address: {}", e)))?;
        self.local_addr = Some(actual_addr);

        let handler = Arc::clone(&self.handler);
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, remote_addr)) => {
                        debug!("Accepted connection from {}", remote_addr);

                        let io = TokioIo::new(stream);
                        let handler = Arc::clone(&handler);

                        tokio::spawn(async move {
                            let service =
                                service_fn(move |req| handle_request(req, Arc::clone(&handler)));

                            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                                error!("Error serving connection: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                }
            }
        });

        info!("RPC server listening on {}", actual_addr);
        Ok(actual_addr)
    }

    /// Address the server is bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

/// Handle one HTTP request
async fn handle_request(
    req: Request<Incoming>,
    handler: Arc<RpcHandler>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    match (req.method(), req.uri().path()) {
        (&Method::POST, "/OpenPort") => {
            let body = read_body(req.into_body()).await;
            let response = match body.and_then(|body| decode::<OpenPortRequest>(&body)) {
                Ok(request) => handler.open_port(request).await,
                Err(e) => Err(e),
            };
            Ok(respond(response))
        }
        (&Method::POST, "/ClosePort") => {
            let body = read_body(req.into_body()).await;
            let response = match body.and_then(|body| decode::<ClosePortRequest>(&body)) {
                Ok(request) => handler.close_port(request).await,
                Err(e) => Err(e),
            };
            Ok(respond(response))
        }
        (&Method::GET, "/health") => Ok(json_response(StatusCode::OK, &handler.health())),
        _ => {
            debug!("Received unsupported request: {} {}", req.method(), req.uri().path());
            Ok(error_response(StatusCode::NOT_FOUND, "Not Found".to_string()))
        }
    }
}

/// Collect a request body of at most [`MAX_BODY_BYTES`]
pub(crate) async fn read_body<B>(body: B) -> Result<Bytes>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    Limited::new(body, MAX_BODY_BYTES)
        .collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| Error::InvalidArgument(format!("Failed to read request body: {}", e)))
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body)
        .map_err(|e| Error::InvalidArgument(format!("Invalid request format: {}", e)))
}

/// Turn a handler result into an HTTP response
fn respond<T: Serialize>(result: Result<T>) -> Response<Full<Bytes>> {
    match result {
        Ok(body) => json_response(StatusCode::OK, &body),
        Err(e) => {
            let status = status_for_error(&e);
            warn!("Request rejected with {}: {}", status, e);
            error_response(status, e.to_string())
        }
    }
}

pub(crate) fn status_for_error(error: &Error) -> StatusCode {
    match error {
        Error::InvalidArgument(_) | Error::InvalidLifetime => StatusCode::BAD_REQUEST,
        Error::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(status: StatusCode, error: String) -> Response<Full<Bytes>> {
    json_response(status, &ErrorResponse { error })
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let (status, body) = match serde_json::to_vec(body) {
        Ok(body) => (status, body),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Vec::new())
        }
    };

    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

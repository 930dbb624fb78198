//! # Ingress - Hyper 1.0 Native Entry Point
//!
//! Wires the designer backend's three routes onto a bare `TcpListener` +
//! `service_fn` loop. Routing is a match on `(Method, path)`; every request
//! runs inside a span carrying a fresh request id.

use crate::handlers::{self, AppState};
use crate::upstream::Completion;
use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde_json::Value;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::Instrument;

/// The designer backend service: one active flow, three routes.
pub struct FlowService {
    state: Arc<Mutex<AppState>>,
    upstream: Arc<dyn Completion>,
}

impl FlowService {
    pub fn new(upstream: Arc<dyn Completion>) -> Self {
        Self {
            state: Arc::new(Mutex::new(AppState::default())),
            upstream,
        }
    }

    /// Serve forever on `addr`.
    pub async fn serve(self, addr: SocketAddr) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("FlowChat backend listening on http://{}", addr);

        let state = self.state;
        let upstream = self.upstream;

        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);

            let state = state.clone();
            let upstream = upstream.clone();

            tokio::task::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let state = state.clone();
                    let upstream = upstream.clone();

                    async move {
                        let request_id = uuid::Uuid::new_v4().to_string();
                        let span = tracing::info_span!(
                            "HTTPRequest",
                            flowchat.http.method = %req.method(),
                            flowchat.http.path = %req.uri().path(),
                            flowchat.http.request_id = %request_id
                        );
                        let response = dispatch(req, &state, upstream.as_ref())
                            .instrument(span)
                            .await;
                        Ok::<_, Infallible>(response)
                    }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    tracing::error!("Error serving connection: {:?}", err);
                }
            });
        }
    }
}

async fn dispatch(
    req: Request<Incoming>,
    state: &Mutex<AppState>,
    upstream: &dyn Completion,
) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match (method, path.as_str()) {
        (Method::GET, "/health") => {
            let (status, body) = handlers::health();
            json_response(status, &body)
        }
        (Method::POST, "/submit") => {
            let body = match read_body(req).await {
                Ok(b) => b,
                Err(resp) => return resp,
            };
            let mut state = state.lock().await;
            let (status, reply) = handlers::submit(&mut state, &body);
            json_response(status, &reply)
        }
        (Method::POST, "/chat") => {
            let body = match read_body(req).await {
                Ok(b) => b,
                Err(resp) => return resp,
            };
            // The lock is held across the upstream call: turns are strictly
            // sequential per backend, exactly like the original.
            let mut state = state.lock().await;
            let (status, reply) = handlers::chat(&mut state, &body, upstream).await;
            json_response(status, &reply)
        }
        _ => json_response(
            StatusCode::NOT_FOUND,
            &serde_json::json!({ "error": "not_found" }),
        ),
    }
}

async fn read_body(req: Request<Incoming>) -> Result<Bytes, Response<Full<Bytes>>> {
    match req.into_body().collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) => {
            tracing::warn!(error = %e, "failed to read request body");
            Err(json_response(
                StatusCode::BAD_REQUEST,
                &serde_json::json!({ "error": "unreadable_body" }),
            ))
        }
    }
}

fn json_response(status: StatusCode, body: &Value) -> Response<Full<Bytes>> {
    let bytes = serde_json::to_vec(body).unwrap_or_default();
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(bytes)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}

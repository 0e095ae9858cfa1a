//! HTTP onboarding front-end
//!
//! Thin collaborator over the orchestrator: serves the onboarding form and
//! turns one POST into one `create_client` call. Success maps to 200 with
//! the structured record; every provisioning error maps uniformly to 500
//! with the error's text, without distinguishing the kind.

use crate::orchestrator::Provisioner;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Version information for the service
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");

const ONBOARD_FORM: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>BizCalc Client Onboarding</title>
    <style>
        body { font-family: sans-serif; max-width: 32rem; margin: 3rem auto; }
        label { display: block; margin-top: 1rem; }
        input { width: 100%; padding: 0.4rem; }
        button { margin-top: 1.5rem; padding: 0.5rem 1.5rem; }
        small { color: #666; }
    </style>
</head>
<body>
    <h1>Onboard a new client</h1>
    <form method="post" action="/create">
        <label for="client">Client name</label>
        <input type="text" id="client" name="client" required
               placeholder="acme">
        <small>Letters, numbers, and hyphens only</small>

        <label for="subdomain">Subdomain</label>
        <input type="text" id="subdomain" name="subdomain" required
               placeholder="acme.example.com">

        <label for="port">Backend port (leave blank to auto-allocate)</label>
        <input type="number" id="port" name="port" min="0" max="65535">

        <button type="submit">Create deployment</button>
    </form>
</body>
</html>
"##;

/// Helper to create a simple response - infallible with valid StatusCode
fn response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(body.into()))
        .expect("valid response with StatusCode enum")
}

/// Helper to create an HTML response
fn html_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "text/html; charset=utf-8")
        .body(Full::new(body.into()))
        .expect("valid response with StatusCode enum and static header")
}

/// Helper to create a JSON response
fn json_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(body.into()))
        .expect("valid response with StatusCode enum and static header")
}

/// Onboarding HTTP server
pub struct OnboardServer {
    bind_addr: SocketAddr,
    provisioner: Arc<Provisioner>,
    shutdown_rx: watch::Receiver<bool>,
}

impl OnboardServer {
    pub fn new(
        bind_addr: SocketAddr,
        provisioner: Arc<Provisioner>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            bind_addr,
            provisioner,
            shutdown_rx,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.bind_addr).await?;
        info!(addr = %self.bind_addr, "Onboarding server listening");

        let mut shutdown_rx = self.shutdown_rx.clone();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let provisioner = Arc::clone(&self.provisioner);
                            tokio::spawn(async move {
                                if let Err(e) = serve_connection(stream, provisioner).await {
                                    debug!(addr = %addr, error = %e, "Connection error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Onboarding server shutting down");
                        break;
                    }
                }
            }
        }

        Ok(())
    }
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    provisioner: Arc<Provisioner>,
) -> anyhow::Result<()> {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req| {
        let provisioner = Arc::clone(&provisioner);
        async move { handle_request(req, provisioner).await }
    });

    AutoBuilder::new(TokioExecutor::new())
        .serve_connection(io, service)
        .await
        .map_err(|e| anyhow::anyhow!("Connection error: {}", e))?;

    Ok(())
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    provisioner: Arc<Provisioner>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    debug!(%method, %path, "Onboarding request");

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/") => html_response(StatusCode::OK, ONBOARD_FORM),

        (&Method::GET, "/health") => response(StatusCode::OK, "ok"),

        (&Method::GET, "/version") => {
            let version_info = serde_json::json!({
                "name": PKG_NAME,
                "version": VERSION,
            });
            json_response(StatusCode::OK, version_info.to_string())
        }

        (&Method::POST, "/create") => {
            let body = req.into_body().collect().await?.to_bytes();
            handle_create(&body, provisioner).await
        }

        _ => response(StatusCode::NOT_FOUND, "not found"),
    };

    Ok(response)
}

async fn handle_create(body: &[u8], provisioner: Arc<Provisioner>) -> Response<Full<Bytes>> {
    let fields = parse_form(body);
    let client = fields.get("client").cloned().unwrap_or_default();
    let subdomain = fields.get("subdomain").cloned().unwrap_or_default();

    // Blank or absent port means auto-allocate; a non-numeric value is a
    // caller error rather than a provisioning failure
    let port_hint = match fields.get("port").map(|s| s.trim()) {
        None | Some("") => None,
        Some(raw) => match raw.parse::<u16>() {
            Ok(port) => Some(port),
            Err(_) => {
                return response(
                    StatusCode::BAD_REQUEST,
                    format!("invalid port value: {}", raw),
                );
            }
        },
    };

    // The orchestrator is synchronous and shells out to host tooling; keep
    // it off the async workers
    let result = tokio::task::spawn_blocking(move || {
        provisioner.create_client(&client, &subdomain, port_hint)
    })
    .await;

    match result {
        Ok(Ok(record)) => {
            let json = serde_json::to_string(&record).unwrap_or_else(|_| {
                format!(
                    r#"{{"id":"{}","hostname":"{}","port":{}}}"#,
                    record.id, record.hostname, record.port
                )
            });
            response(StatusCode::OK, format!("Client created: {}", json))
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Create failed");
            response(StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e))
        }
        Err(e) => {
            error!(error = %e, "Create task failed");
            response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error: internal task failure",
            )
        }
    }
}

/// Decode an `application/x-www-form-urlencoded` body into its fields.
/// Undecodable pairs are skipped rather than failing the whole request.
fn parse_form(body: &[u8]) -> HashMap<String, String> {
    let Ok(text) = std::str::from_utf8(body) else {
        return HashMap::new();
    };

    text.split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key_replaced = key.replace('+', " ");
            let key = urlencoding::decode(&key_replaced).ok()?;
            let value_replaced = value.replace('+', " ");
            let value = urlencoding::decode(&value_replaced).ok()?;
            Some((key.into_owned(), value.into_owned()))
        })
        .collect()
}

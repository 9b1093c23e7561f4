//! Raw `hyper` 1.0 HTTP listener: bind a socket, hand every accepted
//! connection off to the request shell as a `tower::Service`. No framework
//! on top of `hyper` — just `hyper`/`hyper-util`/`http-body-util`.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::shell::{ApiRequest, Method as ShellMethod, RequestShell};

/// Serves the request shell over HTTP at `addr` until the process is
/// killed. Each connection is handled on its own task, matching the
/// per-connection spawn pattern `hyper-util`'s own examples use.
pub async fn serve(shell: Arc<RequestShell>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "nexus-api listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let shell = shell.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let shell = shell.clone();
                async move { handle(shell, req).await }
            });
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                error!(%peer, error = %err, "connection error");
            }
        });
    }
}

async fn handle(
    shell: Arc<RequestShell>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = match *req.method() {
        hyper::Method::GET => ShellMethod::Get,
        hyper::Method::DELETE => ShellMethod::Delete,
        _ => ShellMethod::Post,
    };
    let path = req.uri().path().to_string();
    let bearer = req
        .headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);

    let body_bytes = req.into_body().collect().await?.to_bytes();
    let body: Value = if body_bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
    };

    let api_request = ApiRequest { method, path, bearer, body };
    let response = shell.handle(api_request).await;

    let payload = serde_json::to_vec(&response.body).unwrap_or_else(|_| b"{}".to_vec());
    let built = Response::builder()
        .status(response.status)
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(payload)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())));
    Ok(built)
}

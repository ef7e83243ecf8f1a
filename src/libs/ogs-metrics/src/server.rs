//! Prometheus pull exporter
//!
//! HTTP/1.1 server built on hyper. Serves `GET /metrics` with the
//! rendered registry and `GET /` as a health check. Other paths get a
//! 404, other methods a 405.

use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use crate::context::MetricsContext;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4";

/// Bound exporter endpoint
pub struct MetricsServer {
    listener: TcpListener,
    ctx: Arc<MetricsContext>,
}

impl MetricsServer {
    pub async fn bind(addr: SocketAddr, ctx: Arc<MetricsContext>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        log::info!("metrics_server() [http://{}]", listener.local_addr()?);
        Ok(MetricsServer { listener, ctx })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the task is dropped.
    pub async fn run(self) {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    log::error!("accept() failed: {e}");
                    continue;
                }
            };
            let io = TokioIo::new(stream);
            let ctx = self.ctx.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let ctx = ctx.clone();
                    async move { Ok::<_, Infallible>(route(req.method(), req.uri().path(), &ctx)) }
                });
                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    log::debug!("metrics connection {peer} closed: {e}");
                }
            });
        }
    }
}

fn route(method: &Method, path: &str, ctx: &MetricsContext) -> Response<Full<Bytes>> {
    if method != Method::GET {
        return text_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "text/plain",
            "Method Not Allowed\n".into(),
        );
    }
    match path {
        "/metrics" => text_response(StatusCode::OK, TEXT_FORMAT, ctx.render()),
        "/" => text_response(StatusCode::OK, "text/plain", "OK\n".into()),
        _ => text_response(StatusCode::NOT_FOUND, "text/plain", "Not Found\n".into()),
    }
}

fn text_response(
    status: StatusCode,
    content_type: &'static str,
    body: String,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

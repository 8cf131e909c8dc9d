//! The HTTP side of the browser session.
//!
//! A hyper server runs on a small tokio runtime and serves every
//! connection on its own task. Requests are forwarded to the session loop
//! over a channel and answered through a oneshot, so the loop itself stays
//! synchronous and sees one request at a time.

use std::convert::Infallible;
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Bytes, Incoming as IncomingBody};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tokio::runtime::Runtime;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Result, TarpError};

const MAX_BODY: usize = 1024 * 1024;
const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(30);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

type HtmlResponse = Response<Full<Bytes>>;

/// A cloneable handle on a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    url: String,
    address: SocketAddr,
    stopped: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<Incoming>,
}

impl SessionHandle {
    /// The address to open in a browser.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The socket the session listens on.
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Stop the session loop.
    ///
    /// A session stopped while still waiting for input fails.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let _ = self.events.send(Incoming::Stopped);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// What the server produced for the session loop.
pub(crate) enum Incoming {
    Request(HttpRequest),
    Stopped,
}

/// A request waiting for the session's answer.
pub(crate) struct HttpRequest {
    pub method: String,
    pub path: String,
    pub body: String,
    reply: oneshot::Sender<HtmlResponse>,
}

impl HttpRequest {
    /// Answer with an HTML page.
    pub fn respond_html(self, status: u16, body: &str) {
        self.respond(status, "text/html; charset=utf-8", body);
    }

    pub fn respond(self, status: u16, content_type: &'static str, body: &str) {
        let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
        *response.status_mut() =
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        if self.reply.send(response).is_err() {
            tracing::warn!("Client went away before {} {} was answered", self.method, self.path);
        }
    }
}

/// The session's server, bound to an ephemeral loopback port.
///
/// Dropping it stops accepting connections and gives in-flight responses
/// a short grace period to reach the client.
pub(crate) struct HttpServer {
    runtime: Runtime,
    handle: SessionHandle,
    events: mpsc::UnboundedReceiver<Incoming>,
    shutdown: Option<oneshot::Sender<()>>,
    serve_task: Option<JoinHandle<()>>,
}

impl HttpServer {
    pub fn bind() -> Result<Self> {
        let listener = StdTcpListener::bind("127.0.0.1:0").map_err(|e| TarpError::Http {
            message: format!("Failed to start browser UI: {}", e),
        })?;
        listener.set_nonblocking(true)?;
        let address = listener.local_addr()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("tarp-http")
            .enable_all()
            .build()?;
        let listener = {
            let _guard = runtime.enter();
            TcpListener::from_std(listener)?
        };

        let (events_tx, events) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let serve_task = runtime.spawn(serve(listener, events_tx.clone(), shutdown_rx));

        let handle = SessionHandle {
            url: format!("http://{}/", address),
            address,
            stopped: Arc::new(AtomicBool::new(false)),
            events: events_tx,
        };
        Ok(Self {
            runtime,
            handle,
            events,
            shutdown: Some(shutdown_tx),
            serve_task: Some(serve_task),
        })
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Block until the next request or a stop.
    pub fn next(&mut self) -> Result<Incoming> {
        if self.handle.is_stopped() {
            return Ok(Incoming::Stopped);
        }
        self.events.blocking_recv().ok_or_else(|| TarpError::Http {
            message: "Browser UI server exited unexpectedly".to_string(),
        })
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.serve_task.take() {
            if let Err(e) = self.runtime.block_on(task) {
                tracing::debug!("Browser UI server task ended abnormally: {}", e);
            }
        }
    }
}

async fn serve(
    listener: TcpListener,
    events: mpsc::UnboundedSender<Incoming>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let graceful = GracefulShutdown::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                };
                tracing::debug!("Connection from {}", peer);
                let events = events.clone();
                let service = service_fn(move |request| forward(request, events.clone()));
                let connection = http1::Builder::new()
                    .timer(TokioTimer::new())
                    .header_read_timeout(HEADER_READ_TIMEOUT)
                    .serve_connection(TokioIo::new(stream), service);
                let connection = graceful.watch(connection);
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        tracing::debug!("Connection from {} ended: {}", peer, e);
                    }
                });
            }
            _ = &mut shutdown => break,
        }
    }
    drop(listener);
    if tokio::time::timeout(SHUTDOWN_GRACE, graceful.shutdown())
        .await
        .is_err()
    {
        tracing::debug!("Browser UI connections still open after shutdown grace period");
    }
}

async fn forward(
    request: Request<IncomingBody>,
    events: mpsc::UnboundedSender<Incoming>,
) -> std::result::Result<HtmlResponse, Infallible> {
    let method = request.method().as_str().to_ascii_uppercase();
    let path = request.uri().path().to_string();
    let body = match Limited::new(request.into_body(), MAX_BODY).collect().await {
        Ok(collected) => String::from_utf8_lossy(&collected.to_bytes()).into_owned(),
        Err(e) => {
            tracing::debug!("Rejecting {} {}: {}", method, path, e);
            return Ok(plain_response(StatusCode::BAD_REQUEST, "<h1>Bad request</h1>"));
        }
    };
    tracing::debug!("{} {}", method, path);

    let (reply, response) = oneshot::channel();
    let request = HttpRequest {
        method,
        path,
        body,
        reply,
    };
    if events.send(Incoming::Request(request)).is_err() {
        return Ok(plain_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "<h1>Session is over</h1>",
        ));
    }
    Ok(response.await.unwrap_or_else(|_| {
        plain_response(StatusCode::SERVICE_UNAVAILABLE, "<h1>Session is over</h1>")
    }))
}

fn plain_response(status: StatusCode, body: &'static str) -> HtmlResponse {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}

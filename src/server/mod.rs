//! Tokio transport for a [`Router`].
//!
//! One task per TCP connection. Each task reads requests off the socket in a
//! loop, dispatches them, and writes the responses back in order until the
//! client closes or asks for `Connection: close`.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};
use crate::router::Router;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("listener I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Upper bound on buffered bytes for one request (headers plus body).
const MAX_REQUEST_BYTES: usize = 8 * 1024 * 1024;

const READ_BUFFER_CAPACITY: usize = 4096;

const ALLOWED_METHODS: &str = "GET, POST, PUT, PATCH, DELETE";

/// A bound listener that feeds HTTP/1.1 requests into a [`Router`].
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use routegate::config::AppConfig;
/// use routegate::router::RouterBuilder;
/// use routegate::server::Server;
/// use routegate::{Response, StatusCode};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let router = RouterBuilder::new(AppConfig::default())
///         .get("/", "HomeController::index", |_ctx| async {
///             Response::new(StatusCode::Ok).body("Hello!")
///         })
///         .build()?;
///
///     Server::bind("127.0.0.1:8080").await?.serve(Arc::new(router)).await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// # Errors
    ///
    /// [`ServerError::Bind`] when the address is taken or not permitted.
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_owned(),
                source,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Address actually bound; useful after binding port `0`.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Dispatches every request through `router`.
    ///
    /// # Errors
    ///
    /// [`ServerError::Io`] if the listener fails.
    pub async fn serve(self, router: Arc<Router>) -> Result<(), ServerError> {
        self.run(move |request| {
            let router = Arc::clone(&router);
            async move { router.dispatch(request).await }
        })
        .await
    }

    /// Accept loop over an arbitrary async request handler.
    ///
    /// Never returns under normal operation; failed accepts are logged and
    /// skipped.
    ///
    /// # Errors
    ///
    /// [`ServerError::Io`] if the listener fails.
    pub async fn run<H, F>(self, handler: H) -> Result<(), ServerError>
    where
        H: Fn(Request) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        let handler = Arc::new(handler);
        info!(address = %self.local_addr, "routegate accepting connections");

        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "accept failed");
                    continue;
                }
            };

            debug!(%peer, "client connected");
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                if let Err(e) = serve_connection(stream, peer, handler).await {
                    warn!(%peer, error = %e, "connection dropped");
                }
            });
        }
    }
}

/// Response for a request that never reaches the router, or `None` while
/// more bytes are needed.
fn rejection(err: &RequestError) -> Option<Response> {
    let response = match err {
        RequestError::Incomplete => return None,
        RequestError::UnsupportedMethod(_) => {
            Response::new(StatusCode::MethodNotAllowed).header("Allow", ALLOWED_METHODS)
        }
        other => Response::new(StatusCode::BadRequest).body(format!("Bad Request: {other}")),
    };
    Some(response.keep_alive(false))
}

async fn serve_connection<H, F>(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<H>,
) -> Result<(), std::io::Error>
where
    H: Fn(Request) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    let mut buf = BytesMut::with_capacity(READ_BUFFER_CAPACITY);

    loop {
        if stream.read_buf(&mut buf).await? == 0 {
            debug!(%peer, "client hung up");
            return Ok(());
        }

        if buf.len() > MAX_REQUEST_BYTES {
            warn!(%peer, limit = MAX_REQUEST_BYTES, "request over size limit");
            let response = Response::new(StatusCode::PayloadTooLarge)
                .body("Request entity too large")
                .keep_alive(false);
            return stream.write_all(&response.into_bytes()).await;
        }

        let (request, head_len) = match Request::parse(&buf) {
            Ok(parsed) => parsed,
            Err(err) => match rejection(&err) {
                None => continue,
                Some(response) => {
                    warn!(%peer, error = %err, status = response.status().as_u16(), "request rejected");
                    return stream.write_all(&response.into_bytes()).await;
                }
            },
        };

        let end = head_len + request.content_length().unwrap_or(0);
        if buf.len() < end {
            continue;
        }

        let request = request.with_body(buf[head_len..end].to_vec());
        let keep_alive = request.is_keep_alive();
        debug!(%peer, method = %request.method(), path = %request.path(), "routing request");

        let response = handler(request).await.keep_alive(keep_alive);
        stream.write_all(&response.into_bytes()).await?;
        stream.flush().await?;
        let _ = buf.split_to(end);

        if !keep_alive {
            return Ok(());
        }
    }
}

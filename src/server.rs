//! TCP server for the query receiver.
//!
//! Binds the configured address, accepts connections and frames HTTP/1.x
//! requests off each one, handing every complete request to the shared
//! [`RequestHandler`].

use crate::config::Config;
use crate::protocols::http::{parse_head, ParseResult, Request, RequestError, RequestHandler, Response};
use crate::query::QueryAggregator;
use bytes::BytesMut;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, trace, warn};

/// Read buffer size
const BUFFER_SIZE: usize = 16 * 1024;

/// Listen backlog
const BACKLOG: i32 = 1024;

/// Per-connection request size limits
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_header_bytes: usize,
    pub max_body_bytes: usize,
}

impl From<&Config> for Limits {
    fn from(config: &Config) -> Self {
        Limits {
            max_header_bytes: config.max_header_bytes,
            max_body_bytes: config.max_body_bytes,
        }
    }
}

/// Server startup errors
#[derive(Debug)]
pub enum ServerError {
    /// The listen address could not be bound
    Bind { addr: SocketAddr, source: io::Error },
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServerError::Bind { addr, source } => {
                write!(f, "Unable to start server at {}: {}", addr, source)
            }
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServerError::Bind { source, .. } => Some(source),
        }
    }
}

/// Server instance
pub struct Server {
    config: Config,
    handler: Arc<RequestHandler>,
    connection_limit: Arc<Semaphore>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Self {
        let handler = RequestHandler::new(config.path.clone(), QueryAggregator::new(config.decoder));

        Server {
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
            handler: Arc::new(handler),
            config,
        }
    }

    /// Bind the configured address. Must be called inside a tokio runtime.
    pub fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr = self.config.listen;
        create_listener(addr)
            .and_then(TcpListener::from_std)
            .map_err(|source| ServerError::Bind { addr, source })
    }

    /// Bind and serve until the process exits.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self.bind()?;
        info!(
            address = %self.config.listen,
            path = %self.config.path,
            "Server listening"
        );
        self.serve(listener).await;
        Ok(())
    }

    /// Accept connections from `listener` and serve each on its own task.
    pub async fn serve(&self, listener: TcpListener) {
        let limits = Limits::from(&self.config);

        loop {
            // Wait for a connection slot
            let Ok(permit) = self.connection_limit.clone().acquire_owned().await else {
                return;
            };

            match listener.accept().await {
                Ok((stream, addr)) => {
                    debug!(peer = %addr, "New connection");

                    let handler = Arc::clone(&self.handler);

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, handler, limits).await {
                            debug!(peer = %addr, error = %e, "Connection error");
                        }
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(BACKLOG)?;

    Ok(socket.into())
}

/// Serve requests from one client connection until it closes.
///
/// Requests are answered in the order they arrive. The connection is closed
/// after a framing error or when the request does not ask for keep-alive.
pub async fn handle_connection<S>(
    mut stream: S,
    handler: Arc<RequestHandler>,
    limits: Limits,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);
    let mut output = BytesMut::with_capacity(BUFFER_SIZE);

    loop {
        let head = match parse_head(&buffer, limits.max_header_bytes) {
            ParseResult::Complete(head) => head,
            ParseResult::Incomplete => {
                let n = stream.read_buf(&mut buffer).await?;
                if n == 0 {
                    if !buffer.is_empty() {
                        trace!(pending = buffer.len(), "Connection closed mid-request");
                    } else {
                        trace!("Connection closed by client");
                    }
                    return Ok(());
                }
                continue;
            }
            ParseResult::Error(e) => {
                warn!(error = %e, "Rejecting request");
                return reject(&mut stream, &e).await;
            }
        };

        if head.content_length > limits.max_body_bytes {
            let e = RequestError::BodyTooLarge {
                length: head.content_length,
                limit: limits.max_body_bytes,
            };
            warn!(error = %e, "Rejecting request");
            return reject(&mut stream, &e).await;
        }

        let total = head.header_len + head.content_length;
        while buffer.len() < total {
            let n = stream.read_buf(&mut buffer).await?;
            if n == 0 {
                trace!(pending = buffer.len(), needed = total, "Connection closed mid-body");
                return Ok(());
            }
        }

        let mut frame = buffer.split_to(total);
        let body = frame.split_off(head.header_len).freeze();
        let request = Request::from_head(head, body);
        let keep_alive = request.keep_alive();

        let response = handler.handle(&request);
        debug!(
            method = %request.method,
            status = response.status.as_u16(),
            body_len = response.body.len(),
            "Sending response"
        );

        output.clear();
        response.encode(keep_alive, &mut output);
        stream.write_all(&output).await?;

        if !keep_alive {
            stream.shutdown().await?;
            return Ok(());
        }
    }
}

/// Answer a framing error and close.
async fn reject<S>(
    stream: &mut S,
    error: &RequestError,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
where
    S: AsyncWrite + Unpin,
{
    let response = Response::text(error.status(), format!("{}\n", error));
    let mut output = BytesMut::new();
    response.encode(false, &mut output);
    stream.write_all(&output).await?;
    stream.shutdown().await?;
    Ok(())
}

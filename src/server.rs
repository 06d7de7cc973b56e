//! Listener, connection tasks and graceful shutdown.
//!
//! [`Server::serve`] stops accepting on SIGTERM or Ctrl-C, waits for every
//! open connection to finish its in-flight requests, then returns. Under
//! Kubernetes keep `terminationGracePeriodSeconds` above the slowest
//! request so the drain completes before SIGKILL.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Incoming};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::engine::Engine;
use crate::error::{BoxError, Error};
use crate::pipeline::Pipeline;
use crate::request::Request;
use crate::response::Response;

/// Serves a built [`Pipeline`] over HTTP/1.1 and HTTP/2.
pub struct Server {
    addr: String,
}

impl Server {
    /// Remembers `addr` for [`serve`](Server::serve); an unparsable address
    /// is reported there as [`Error::Addr`].
    ///
    /// ```rust,no_run
    /// use plait::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// # let _ = server;
    /// ```
    pub fn bind(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    /// Serves `engine` until SIGTERM or Ctrl-C, then drains open
    /// connections before returning.
    pub async fn serve(self, engine: &Engine) -> Result<(), Error> {
        self.serve_with_shutdown(engine, shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve), stopping when `shutdown` resolves.
    pub async fn serve_with_shutdown(
        self,
        engine: &Engine,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let addr: SocketAddr = self.addr.parse().map_err(|_| Error::Addr(self.addr.clone()))?;
        let listener = TcpListener::bind(addr).await?;
        let pipeline = engine.handler();
        let body_limit = usize::try_from(engine.config().max_multipart_memory).unwrap_or(usize::MAX);
        info!(%addr, routes = pipeline.routes().len(), "plait listening");

        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                () = &mut shutdown => {
                    info!(open = connections.len(), "shutting down, draining connections");
                    break;
                }

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        connections.spawn(connection(stream, peer, Arc::clone(&pipeline), body_limit));
                    }
                    Err(e) => error!("accept failed: {e}"),
                },

                // Finished tasks are reaped as we go.
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        while connections.join_next().await.is_some() {}
        info!("plait stopped");
        Ok(())
    }
}

async fn connection(stream: TcpStream, peer: SocketAddr, pipeline: Arc<Pipeline>, body_limit: usize) {
    let service = service_fn(move |req| dispatch(Arc::clone(&pipeline), req, peer, body_limit));
    let served = ConnBuilder::new(TokioExecutor::new())
        .serve_connection(TokioIo::new(stream), service)
        .await;
    if let Err(e) = served {
        error!(%peer, "connection failed: {e}");
    }
}

/// Reads the body, then hands the request to the pipeline. Every failure
/// becomes a response.
async fn dispatch(
    pipeline: Arc<Pipeline>,
    req: hyper::Request<Incoming>,
    peer: SocketAddr,
    body_limit: usize,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match read_body(body, body_limit).await {
        Ok(body) => body,
        Err(status) => {
            warn!(%peer, %status, limit = body_limit, "request body rejected");
            return Ok(Response::status(status).into_inner());
        }
    };

    let response = pipeline.handle(Request::from_parts(parts, body, Some(peer))).await;
    Ok(response.into_inner())
}

/// Buffers at most `limit` bytes of `body`: 413 past the limit, 400 when
/// the body cannot be read.
async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, StatusCode>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(StatusCode::PAYLOAD_TOO_LARGE),
        Err(e) => {
            warn!("failed to read request body: {e}");
            Err(StatusCode::BAD_REQUEST)
        }
    }
}

/// SIGTERM or SIGINT on Unix, Ctrl-C elsewhere. A handler that cannot be
/// installed is logged and never fires.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => {}
        () = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bodies_past_the_limit_are_413() {
        let body = Full::new(Bytes::from(vec![b'x'; 64]));
        assert_eq!(read_body(body, 16).await, Err(StatusCode::PAYLOAD_TOO_LARGE));

        let body = Full::new(Bytes::from_static(b"small"));
        assert_eq!(read_body(body, 16).await, Ok(Bytes::from_static(b"small")));
    }
}

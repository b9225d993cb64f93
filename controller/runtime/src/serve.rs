use crate::Body;
use anyhow::Result;
use hyper::{body::Incoming, Request, Response};
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
    service::TowerToHyperService,
};
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Serves HTTP/1 and HTTP/2 connections until the drain is signaled. Open connections are shut
/// down gracefully and hold the drain until their in-flight requests complete.
pub async fn serve<S>(
    server: &'static str,
    listener: TcpListener,
    svc: S,
    drain: drain::Watch,
) -> Result<()>
where
    S: tower::Service<Request<Incoming>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, server, "Listening");
    loop {
        let (io, client) = tokio::select! {
            res = listener.accept() => res?,
            _release = drain.clone().signaled() => {
                debug!(server, "Stopped accepting connections");
                return Ok(());
            }
        };

        let svc = TowerToHyperService::new(svc.clone());
        let drain = drain.clone();
        tokio::spawn(async move {
            let builder = auto::Builder::new(TokioExecutor::new());
            let conn = builder.serve_connection(TokioIo::new(io), svc);
            tokio::pin!(conn);
            tokio::select! {
                res = conn.as_mut() => {
                    if let Err(error) = res {
                        debug!(%client, %error, "Connection failed");
                    }
                }
                release = drain.signaled() => {
                    conn.as_mut().graceful_shutdown();
                    if let Err(error) = release.release_after(conn).await {
                        debug!(%client, %error, "Connection failed during shutdown");
                    }
                }
            }
        });
    }
}

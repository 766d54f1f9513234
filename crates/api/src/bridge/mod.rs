//! Raw TCP bridge for clients that cannot speak full HTTP.
//!
//! Each connection carries one line-framed request (see [`framing`]). The
//! request is dispatched into the same axum [`Router`] as the HTTP listener,
//! so authentication, limits and error mapping are identical. Framing
//! errors, and requests not fully received within the read timeout, are
//! answered with `400 PROTOCOL_ERROR` and never reach a handler.

pub mod framing;

use std::net::SocketAddr;
use std::time::Duration;

use axum::response::IntoResponse;
use axum::Router;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use crate::error::AppError;
use framing::{read_request, write_response, FramingError};

/// Limits applied to every bridge connection.
#[derive(Debug, Clone, Copy)]
pub struct BridgeLimits {
    /// Largest accepted `Content-Length`.
    pub max_body: usize,
    /// Time allowed to receive the whole request, head and body.
    pub read_timeout: Duration,
}

/// Accept bridge connections until `cancel` is triggered.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    limits: BridgeLimits,
    cancel: CancellationToken,
) {
    match listener.local_addr() {
        Ok(addr) => tracing::info!(%addr, "Bridge listener started"),
        Err(e) => tracing::warn!(error = %e, "Bridge listener started on unknown address"),
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Bridge listener stopping");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(handle_connection(stream, peer, router.clone(), limits));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Bridge accept failed");
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    router: Router,
    limits: BridgeLimits,
) {
    let (read, mut write) = stream.into_split();
    let mut reader = BufReader::new(read);

    let read = tokio::time::timeout(
        limits.read_timeout,
        read_request(&mut reader, limits.max_body),
    )
    .await;
    let Ok(read) = read else {
        tracing::warn!(
            %peer,
            timeout_ms = limits.read_timeout.as_millis() as u64,
            "Bridge read timed out",
        );
        let response = AppError::Protocol(format!(
            "Request not received within {}s",
            limits.read_timeout.as_secs_f64()
        ))
        .into_response();
        if let Err(e) = write_response(&mut write, response).await {
            tracing::debug!(%peer, error = %e, "Bridge response write failed");
        }
        return;
    };

    let response = match read {
        Ok(Some(request)) => {
            tracing::debug!(%peer, method = %request.method, uri = %request.uri, "Bridge request");
            router
                .oneshot(request.into_http())
                .await
                .unwrap_or_else(|never| match never {})
        }
        Ok(None) => return,
        Err(FramingError::Io(e)) => {
            tracing::debug!(%peer, error = %e, "Bridge connection dropped");
            return;
        }
        Err(e) => {
            tracing::warn!(%peer, error = %e, "Bridge framing error");
            AppError::Protocol(e.to_string()).into_response()
        }
    };

    if let Err(e) = write_response(&mut write, response).await {
        tracing::debug!(%peer, error = %e, "Bridge response write failed");
    }
}

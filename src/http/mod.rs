//! HTTP server for the tasks API.
//!
//! Uses tokio directly: one task per connection, one request per connection.

pub mod request;
pub mod response;
pub mod routes;

use std::sync::Arc;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::error::Result;

pub use request::{read_request, Request, RequestError};
pub use response::Response;
pub use routes::{route, AppState};

/// Accept connections until the listener fails.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    info!(addr = ?listener.local_addr().ok(), "Server listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, &state).await {
                error!(%peer, error = %e, "Error handling connection");
            }
        });
    }
}

pub async fn handle_connection<S>(mut stream: S, state: &AppState) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let started = Instant::now();

    let response = match read_request(&mut stream).await {
        Ok(request) => {
            let response = route(state, &request).await;
            info!(
                method = %request.method,
                path = %request.path,
                status = response.status(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Request handled"
            );
            response
        }
        Err(e) => {
            warn!(error = %e, "Rejected request");
            Response::error(e.status_code(), &e.to_string())
        }
    };

    stream.write_all(&response.to_bytes()).await?;
    stream.flush().await?;
    stream.shutdown().await
}

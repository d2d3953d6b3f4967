//! HTTP server setup.
//!
//! Every request goes to a single fallback handler that buffers the body and hands it to
//! the [`Transcoder`]. Routing happens inside the transcoder's route table, not in axum.
use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::response::Response;
use http_body_util::LengthLimitError;
use std::error::Error;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use transcode_core::render::render_status;
use transcode_core::{Code, Dispatcher, Status, Transcoder};

struct AppState<D> {
    transcoder: Arc<Transcoder<D>>,
    body_limit: usize,
}

impl<D> Clone for AppState<D> {
    fn clone(&self) -> Self {
        Self {
            transcoder: self.transcoder.clone(),
            body_limit: self.body_limit,
        }
    }
}

/// Builds the axum router serving every binding of `transcoder`.
pub fn router<D: Dispatcher>(transcoder: Arc<Transcoder<D>>, body_limit: usize) -> Router {
    Router::new()
        .fallback(transcode_handler::<D>)
        .with_state(AppState {
            transcoder,
            body_limit,
        })
        .layer(TraceLayer::new_for_http())
}

/// Serves `router` on `listener` until Ctrl+C.
pub async fn run(listener: TcpListener, router: Router) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "HTTP server starting");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

async fn transcode_handler<D: Dispatcher>(State(state): State<AppState<D>>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();

    let body = match axum::body::to_bytes(body, state.body_limit).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::debug!(error = %e, limit = state.body_limit, "Rejected request body");
            let status = if exceeds_limit(&e) {
                Status::from_code(
                    Code::ResourceExhausted,
                    format!("Request body exceeds {} bytes", state.body_limit),
                )
            } else {
                Status::invalid_argument(format!("Failed to read request body: {e}"))
            };
            return render_status(&status).map(Body::from);
        }
    };

    state
        .transcoder
        .handle(Request::from_parts(parts, body))
        .await
        .map(Body::from)
}

fn exceeds_limit(error: &axum::Error) -> bool {
    std::iter::successors(Some(error as &(dyn Error + 'static)), |&e| e.source()).any(|e| e.is::<LengthLimitError>())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

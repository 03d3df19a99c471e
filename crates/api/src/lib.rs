//! HTTP edge: router assembly, middleware stack, and the serve loop.

mod auth;
mod error;
mod middleware;
mod routes;
mod schemas;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::{ApiError, ApiResult, ErrorBody};
pub use state::AppState;

/// Build the full application router.
///
/// Layer order (outermost first): CORS, trace, rate limit, request context,
/// process-time headers, then the routes.
pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .nest("/recommendations", routes::recommendations::routes())
        .nest("/sentiment", routes::sentiment::routes())
        .nest("/tasks", routes::tasks::routes())
        .nest("/admin", routes::admin::routes(Arc::clone(&state)))
        .nest("/health", routes::health::routes())
        .nest("/livreurs", routes::couriers::routes());

    Router::new()
        .nest(&state.config.api.prefix, api)
        .layer(axum::middleware::from_fn(middleware::process_time))
        .layer(axum::middleware::from_fn(middleware::request_context))
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state),
            middleware::rate_limit,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: Arc<AppState>) -> Result<()> {
    let addr = format!("{}:{}", state.config.api.host, state.config.api.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, prefix = %state.config.api.prefix, "http edge listening");

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

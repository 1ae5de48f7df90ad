use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::Request;
use axum::middleware::{Next, from_fn};
use axum::response::IntoResponse;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use utoipa::{
    OpenApi,
    openapi::{Info, OpenApiBuilder},
};
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;

use crate::{context::AppContext, devices, settings::WebserverSettings};

#[derive(OpenApi)]
struct ApiDoc;

pub async fn start(settings: &WebserverSettings, context: AppContext) -> Result<()> {
    let context_arc = Arc::new(context);
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .nest("/devices", devices::router())
        .with_state(context_arc)
        .layer(from_fn(error_logging_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    let api = OpenApiBuilder::from(api)
        .info(Info::new("Push Dispatch Operator Console API", "0.1.0"))
        .build();

    let router = router.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api));

    let host = settings
        .host
        .parse()
        .with_context(|| format!("Invalid webserver host: {}", settings.host))?;
    let addr = SocketAddr::new(host, settings.port);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let server = axum::serve(listener, router.into_make_service());

    let socket_addr = server.local_addr()?;
    info!(
        "Starting operator console on {}:{}",
        settings.host,
        socket_addr.port()
    );

    server.await.context("Server error")?;

    Ok(())
}

/// Logs failed requests: client errors as warnings, server errors as errors.
async fn error_logging_middleware(request: Request<Body>, next: Next) -> impl IntoResponse {
    let path = request.uri().path().to_owned();
    let method = request.method().clone();

    let response = next.run(request).await;

    let status = response.status();
    if status.is_server_error() {
        error!(status = status.as_u16(), %path, %method, "Request failed");
    } else if status.is_client_error() {
        warn!(status = status.as_u16(), %path, %method, "Request rejected");
    }

    response
}

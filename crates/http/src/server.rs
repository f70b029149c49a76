use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::{Path as UrlPath, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use parking_lot::RwLock;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::adapter::{LegacyRequest, channel_response};
use crate::bridge::{DevBridge, route_key_from_path};
use crate::loader::{ModuleLoader, RemoteHandler};

/// Dev server: the reserved prefix goes through the bridge, everything else
/// is served from `static_dir`.
pub fn dev_router(bridge: Arc<DevBridge>, static_dir: &Path) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(static_dir))
        .layer(middleware::from_fn_with_state(bridge, bridge_middleware))
        .layer(TraceLayer::new_for_http())
}

async fn bridge_middleware(
    State(bridge): State<Arc<DevBridge>>,
    request: Request,
    next: Next,
) -> Response {
    if route_key_from_path(request.uri().path()).is_none() {
        return next.run(request).await;
    }

    let (mut sink, pending) = channel_response();
    let legacy = LegacyRequest::from_axum(request);
    tokio::spawn(async move {
        bridge.handle(legacy, &mut sink).await;
    });

    match pending.into_response().await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!("bridge produced no response: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

#[derive(Clone)]
struct FunctionsState {
    dir: PathBuf,
    loader: Arc<dyn ModuleLoader>,
    handlers: Arc<RwLock<HashMap<String, Arc<dyn RemoteHandler>>>>,
}

/// Production host: `<dir>/<name>.js` is served at `/<name>`, with CORS
/// open to `http://localhost:*` origins.
pub fn functions_router(dir: impl Into<PathBuf>, loader: Arc<dyn ModuleLoader>) -> Router {
    let state = FunctionsState {
        dir: dir.into(),
        loader,
        handlers: Arc::new(RwLock::new(HashMap::new())),
    };

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin: &HeaderValue, _| {
            is_local_origin(origin)
        }))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/:name", any(invoke_function))
        .fallback(function_not_found)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn is_local_origin(origin: &HeaderValue) -> bool {
    origin
        .to_str()
        .map(|origin| {
            origin == "http://localhost"
                || origin
                    .strip_prefix("http://localhost:")
                    .is_some_and(|port| {
                        !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit())
                    })
        })
        .unwrap_or(false)
}

fn is_function_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

async fn function_not_found() -> Response {
    (StatusCode::NOT_FOUND, "Function not found").into_response()
}

async fn invoke_function(
    State(state): State<FunctionsState>,
    UrlPath(name): UrlPath<String>,
    request: Request,
) -> Response {
    if request.method() == Method::OPTIONS {
        return StatusCode::NO_CONTENT.into_response();
    }
    if !is_function_name(&name) {
        return function_not_found().await;
    }

    let cached = state.handlers.read().get(&name).cloned();
    let handler = match cached {
        Some(handler) => handler,
        None => {
            let path = state.dir.join(format!("{}.js", name));
            match state.loader.load(&path).await {
                Ok(handler) => {
                    state.handlers.write().insert(name.clone(), Arc::clone(&handler));
                    handler
                }
                Err(err) => {
                    tracing::debug!("{}: {}", name, err);
                    return function_not_found().await;
                }
            }
        }
    };

    match handler.call(request).await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!("function {} failed: {}", name, err);
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
        }
    }
}

/// Bind `addr` and serve `app` until the server stops.
pub async fn serve(addr: SocketAddr, app: Router) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await
}

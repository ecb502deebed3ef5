use crate::api::consent::{save_cookies, show_cookies};
use crate::api::errors::AppError;
use crate::api::extract::{download, show_form, submit_form};
use crate::api::ratelimit::limit_requests;
use crate::api::AppState;
use crate::assets;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

/// Build the Axum router with all routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    // Page routes count against the per-client limits; assets and the
    // health probe do not.
    let page_routes = Router::new()
        .route("/", get(show_form).post(submit_form))
        .route("/download", post(download))
        .route("/cookies", get(show_cookies).post(save_cookies))
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            limit_requests,
        ));

    Router::new()
        .merge(page_routes)
        .route("/health", get(health_check))
        .route("/assets/{*path}", get(assets::serve_asset))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            check_host,
        ))
        .layer(middleware::map_response(add_security_headers))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Reject requests whose `Host` is not in `allowed_hosts`.
///
/// An entry starting with `.` matches that domain and any subdomain.
async fn check_host(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if state.allowed_hosts.is_empty() {
        return Ok(next.run(req).await);
    }
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| req.uri().host())
        .map(strip_port)
        .unwrap_or_default();
    if !host_allowed(host, &state.allowed_hosts) {
        tracing::warn!(host = %host, "Rejected request for disallowed host");
        return Err(AppError::BadRequest("Invalid Host header.".to_string()));
    }
    Ok(next.run(req).await)
}

fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        // IPv6 literal: keep the brackets, drop any port after them.
        return host.find(']').map_or(host, |end| &host[..=end]);
    }
    host.rsplit_once(':').map_or(host, |(name, _)| name)
}

fn host_allowed(host: &str, allowed: &[String]) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if host.is_empty() {
        return false;
    }
    allowed.iter().any(|pattern| {
        let pattern = pattern.to_ascii_lowercase();
        if pattern == "*" {
            true
        } else if let Some(domain) = pattern.strip_prefix('.') {
            host == domain || host.ends_with(&pattern)
        } else {
            host == pattern
        }
    })
}

/// Inject security headers on every HTTP response.
async fn add_security_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'self'"),
    );
    headers.insert(
        header::STRICT_TRANSPORT_SECURITY,
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::X_FRAME_OPTIONS,
        HeaderValue::from_static("SAMEORIGIN"),
    );
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.remove(header::SERVER);
    response
}

/// GET /health — Simple health check endpoint.
async fn health_check() -> &'static str {
    "ok"
}

async fn not_found() -> AppError {
    AppError::NotFound
}

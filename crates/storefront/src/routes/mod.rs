//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /                          - Product listing
//! GET  /products                  - Product listing (keywords, page)
//! GET  /products/{slug}           - Product detail
//! GET  /t/{*permalink}            - Taxon listing
//!
//! GET  /cart                      - Current cart
//! PUT  /cart/empty                - Empty the cart
//! POST /orders/populate           - Add a variant to the cart
//! GET  /orders/{number}           - Order detail
//! GET  /orders/{number}/edit      - Cart for the current order
//! PUT  /orders/{number}           - Update email and quantities
//!
//! GET  /checkout                  - Redirect to the current step
//! GET  /checkout/{state}          - Show a checkout step
//! PATCH /checkout/update/{state}  - Submit a checkout step
//!
//! GET  /health                    - Liveness
//! GET  /health/ready              - Readiness
//! ```
//!
//! HTML forms cannot send `PUT` or `PATCH`, so every write also accepts `POST`.

pub mod checkout;
pub mod health;
pub mod orders;
pub mod products;
pub mod taxons;

use axum::{
    Router,
    http::{HeaderMap, header::REFERER},
    middleware::from_fn,
    routing::{get, patch, post, put},
};
use sentry_tower::{NewSentryLayer, SentryHttpLayer};
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tower_sessions::SessionStore;
use tracing::Span;

use crate::config::ConfigError;
use crate::middleware::{
    create_session_layer, order_rate_limiter, request_id_middleware, security_headers_middleware,
};
use crate::state::AppState;

/// Create the catalog routes router.
pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::index))
        .route("/products", get(products::index))
        .route("/products/{slug}", get(products::show))
        .route("/t/{*permalink}", get(taxons::show))
}

/// Create the cart and order read routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/cart", get(orders::cart))
        .route("/orders/{number}", get(orders::show))
        .route("/orders/{number}/edit", get(orders::edit))
        .route("/checkout", get(checkout::edit_current))
        .route("/checkout/{state}", get(checkout::edit))
}

/// Create the order write routes router.
pub fn order_write_routes() -> Router<AppState> {
    Router::new()
        .route("/orders/populate", post(orders::populate))
        .route("/orders/{number}", put(orders::update).post(orders::update))
        .route("/cart/empty", put(orders::empty).post(orders::empty))
        .route(
            "/checkout/update/{state}",
            patch(checkout::update).post(checkout::update),
        )
}

/// Create all routes for the storefront.
pub fn routes(rate_limit: bool) -> Router<AppState> {
    let writes = if rate_limit {
        order_write_routes().layer(order_rate_limiter())
    } else {
        order_write_routes()
    };

    Router::new()
        .merge(health::routes())
        .merge(catalog_routes())
        .merge(order_routes())
        .merge(writes)
}

/// Build the complete application: routes, middleware and state.
///
/// # Errors
///
/// Returns an error if the session secret cannot sign cookies.
pub fn app<S>(state: AppState, session_store: S) -> Result<Router, ConfigError>
where
    S: SessionStore + Clone,
{
    let session_layer = create_session_layer(session_store, state.config())?;

    Ok(routes(state.config().rate_limit)
        .layer(session_layer)
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
        // Sentry layers (outermost for full request coverage)
        .layer(NewSentryLayer::new_from_top())
        .layer(SentryHttpLayer::new().enable_transaction()))
}

/// Path (and query) of the `Referer` header, if it parses.
///
/// Only the path is kept so redirects never leave the storefront.
pub fn referer_path(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(REFERER)?.to_str().ok()?;
    let url = if raw.starts_with('/') {
        url::Url::parse("http://localhost").ok()?.join(raw).ok()?
    } else {
        url::Url::parse(raw).ok()?
    };
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    Some(match url.query() {
        Some(query) => format!("{}?{query}", url.path()),
        None => url.path().to_owned(),
    })
}

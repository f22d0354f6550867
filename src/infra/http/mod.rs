mod contact;
mod middleware;
mod peer;
pub mod rate_limit;

pub use middleware::{CorsPolicy, RATE_LIMITED_METRIC};
pub use peer::PeerAddr;
pub use rate_limit::{Admission, ContactRateLimiter};

use std::sync::Arc;

use axum::{
    Router,
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use crate::application::contact::ContactService;

use middleware::{apply_cors, log_responses, rate_limit, security_headers, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub contact: Arc<ContactService>,
    pub rate_limiter: Arc<ContactRateLimiter>,
    pub cors: Arc<CorsPolicy>,
    pub max_body_bytes: usize,
}

pub fn build_router(state: HttpState) -> Router {
    let limiter = state.rate_limiter.clone();
    let cors = state.cors.clone();

    // Body decoding sits outside the limiter; only well-formed bodies take a slot.
    let relay_routes = Router::new()
        .route("/send-email", post(contact::send_email))
        .layer(axum_middleware::from_fn_with_state(limiter, rate_limit))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            contact::decode_submission,
        ));

    Router::new()
        .route("/_health", get(health))
        .merge(relay_routes)
        .fallback(not_found)
        .with_state(state)
        .layer(axum_middleware::from_fn_with_state(cors, apply_cors))
        .layer(axum_middleware::from_fn(security_headers))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::middleware::{make_span_with_request_id, request_id_middleware};

use super::{handlers, sse, AppState};

/// Creates the application router with all routes and HTTP layers
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        // Parties
        .route("/parties", post(handlers::create_party))
        .route(
            "/parties/:slug",
            get(handlers::get_party).put(handlers::update_status),
        )
        .route("/parties/:slug/force-complete", post(handlers::force_complete))
        // Membership
        .route(
            "/parties/:slug/members",
            get(handlers::list_members).post(handlers::member_action),
        )
        .route("/parties/:slug/members/me", get(handlers::my_membership))
        .route("/parties/:slug/preferences", post(handlers::submit_preferences))
        // Swiping
        .route("/parties/:slug/movies", get(handlers::party_movies))
        .route(
            "/parties/:slug/swipe",
            get(handlers::next_candidate).post(handlers::swipe),
        )
        .route("/parties/:slug/swipe/complete", post(handlers::complete_swiping))
        .route("/parties/:slug/rankings", get(handlers::member_rankings))
        .route("/parties/:slug/results", get(handlers::party_results))
        .route("/parties/:slug/events", get(sse::party_events))
        // Standalone contracts
        .route("/recommendations", post(handlers::recommend))
        .route("/metadata/track", post(handlers::lookup_track))
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

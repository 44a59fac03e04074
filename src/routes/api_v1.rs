/*!
 * API v1 Routes
 *
 * Route table for the admin notification API.
 */

use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::handlers::{notifications, AppState};

/// Create the /api/v1 route tree
pub fn create_api_v1_routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/notifications/trainee/{trainee_id}",
            get(notifications::list_for_trainee),
        )
        .route(
            "/notifications/trainee/{trainee_id}/failed",
            get(notifications::list_failed_for_trainee),
        )
        .route(
            "/notifications/trainee/{trainee_id}/{id}",
            delete(notifications::delete),
        )
        .route(
            "/notifications/{id}/status",
            put(notifications::update_status),
        )
        .route("/notifications/{id}/resend", post(notifications::resend))
        .route(
            "/notifications/placement/rollout-correction",
            post(notifications::placement_rollout_correction),
        )
        .with_state(state)
}

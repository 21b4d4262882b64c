//! API route definitions for the identity registry.

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::SharedState;

/// Create API routes
pub fn api_routes() -> Router<SharedState> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Identity lifecycle
        .route("/api/identities", post(handlers::submit))
        .route("/api/identities/pending", get(handlers::pending))
        .route("/api/identities/check", post(handlers::check_identity))
        .route("/api/identities/:subject_id", get(handlers::get_record))
        .route("/api/identities/:subject_id/status", get(handlers::subject_status))
        .route("/api/identities/:subject_id/approve", post(handlers::approve))
        .route("/api/identities/:subject_id/revoke", post(handlers::revoke))
        .route("/api/identities/:subject_id/verify", post(handlers::verify))
        // Accumulator
        .route("/api/tree", get(handlers::tree_info))
        .route("/api/tree/root", get(handlers::current_root))
        .route("/api/tree/rebuild", post(handlers::rebuild))
        .route("/api/tree/validate", get(handlers::validate))
        .route("/api/stats", get(handlers::stats))
        // Snapshots and maintenance
        .route("/api/snapshots/reload", post(handlers::reload_snapshot))
        .route("/api/snapshots", post(handlers::save_snapshot))
        .route("/api/ledger", get(handlers::ledger_info))
        .route("/api/reset", post(handlers::reset))
}

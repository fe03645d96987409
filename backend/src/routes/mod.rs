//! Route definitions for the Cannabis Cultivation Compliance Platform

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};

use crate::{handlers, middleware::auth_middleware, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health check (public)
        .route("/health", get(handlers::health_check))
        // Protected routes - batch lifecycle
        .nest("/batches", batch_routes())
        // Protected routes - traceability ledger queries
        .nest("/events", event_routes())
        // Protected routes - reconciliation views
        .nest("/reconciliation", reconciliation_routes())
        // Protected routes - physical count justification
        .nest("/counts", count_routes())
        // Protected routes - loss/theft incidents
        .nest("/loss-theft", loss_theft_routes())
        // Protected routes - regulatory reports
        .nest("/reports", report_routes())
        // Protected routes - facility lookups
        .nest("/facilities", facility_routes())
}

/// Batch lifecycle routes (protected)
fn batch_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_batches).post(handlers::create_batch))
        .route("/available", get(handlers::list_available_batches))
        .route(
            "/:batch_id",
            get(handlers::get_batch).delete(handlers::delete_batch),
        )
        // Lifecycle actions
        .route("/:batch_id/split", post(handlers::split_batch))
        .route("/:batch_id/process", post(handlers::process_batch))
        .route("/:batch_id/status", post(handlers::change_batch_status))
        .route("/:batch_id/archive", post(handlers::archive_batch))
        .route("/:batch_id/restore", post(handlers::restore_batch))
        .route(
            "/:batch_id/recall",
            post(handlers::recall_batch).delete(handlers::remove_batch_recall),
        )
        // Quantity paths
        .route("/:batch_id/fulfill", post(handlers::fulfill_order))
        .route("/:batch_id/ship", post(handlers::ship_batch))
        .route("/:batch_id/destroy", post(handlers::destroy_batch_quantity))
        .route("/:batch_id/move", post(handlers::move_batch))
        .route("/:batch_id/harvest", post(handlers::record_batch_harvest))
        .route("/:batch_id/receive", post(handlers::receive_batch_delivery))
        // Ledger and reconciliation views
        .route("/:batch_id/events", get(handlers::get_batch_events))
        .route(
            "/:batch_id/reconciliation",
            get(handlers::get_batch_reconciliation),
        )
        .route(
            "/:batch_id/counts",
            get(handlers::get_batch_counts).post(handlers::record_count),
        )
        .route(
            "/:batch_id/analyze-shortage",
            post(handlers::analyze_batch_shortage),
        )
        .route_layer(middleware::from_fn(auth_middleware))
}

/// Traceability ledger query routes (protected)
fn event_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_facility_events))
        .route_layer(middleware::from_fn(auth_middleware))
}

/// Facility-wide reconciliation routes (protected)
fn reconciliation_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/facilities/:facility_id",
            get(handlers::get_facility_reconciliation),
        )
        .route_layer(middleware::from_fn(auth_middleware))
}

/// Physical count justification routes (protected)
fn count_routes() -> Router<AppState> {
    Router::new()
        .route("/:count_id/justify", post(handlers::justify_count))
        .route_layer(middleware::from_fn(auth_middleware))
}

/// Loss/theft incident routes (protected)
fn loss_theft_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_loss_theft_reports).post(handlers::create_loss_theft_report),
        )
        .route(
            "/:report_id",
            get(handlers::get_loss_theft_report).put(handlers::update_loss_theft_report),
        )
        .route(
            "/:report_id/investigation",
            put(handlers::update_investigation),
        )
        .route(
            "/:report_id/hc-submission",
            post(handlers::submit_to_health_canada),
        )
        .route(
            "/:report_id/hc-reportability",
            get(handlers::get_hc_reportability),
        )
        .route_layer(middleware::from_fn(auth_middleware))
}

/// Regulatory report routes (protected)
fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/:report_type", get(handlers::generate_report))
        .route_layer(middleware::from_fn(auth_middleware))
}

/// Facility lookup routes (protected)
fn facility_routes() -> Router<AppState> {
    Router::new()
        .route("/areas/:area_id", get(handlers::get_cultivation_area))
        .route(
            "/discrepancy-reasons/:reason_id",
            get(handlers::get_discrepancy_reason),
        )
        .route("/:facility_id", get(handlers::get_facility))
        .route_layer(middleware::from_fn(auth_middleware))
}

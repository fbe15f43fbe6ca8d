use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::api::handlers;
use crate::api::handlers::AppState;
use crate::store::traits::Store;

pub fn create_router<S: Store + 'static>() -> Router<AppState<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Organisation and repository registration
        .route(
            "/organisations/:org_id",
            put(handlers::upsert_organisation::<S>),
        )
        .route(
            "/organisations/:org_id/repositories/:repo_id",
            put(handlers::upsert_repository::<S>),
        )
        // Repository-wide entity queries
        .route(
            "/organisations/:org_id/repositories/:repo_id/entities",
            get(handlers::list_entities::<S>).post(handlers::create_entity::<S>),
        )
        .route(
            "/organisations/:org_id/repositories/:repo_id/entity-count",
            get(handlers::count_entities::<S>),
        )
        .route(
            "/organisations/:org_id/repositories/:repo_id/root-entities",
            get(handlers::list_root_entities::<S>),
        )
        // Single entity
        .route(
            "/organisations/:org_id/repositories/:repo_id/entities/:entity_id",
            get(handlers::get_entity::<S>)
                .put(handlers::update_entity::<S>)
                .delete(handlers::delete_entity::<S>),
        )
        .route(
            "/organisations/:org_id/repositories/:repo_id/entities/:entity_id/subclasses",
            get(handlers::list_subclasses::<S>),
        )
        // Versions
        .route(
            "/organisations/:org_id/repositories/:repo_id/entities/:entity_id/versions",
            get(handlers::list_versions::<S>),
        )
        .route(
            "/organisations/:org_id/repositories/:repo_id/entities/:entity_id/versions/:version",
            delete(handlers::delete_version::<S>),
        )
        .route(
            "/organisations/:org_id/repositories/:repo_id/entities/:entity_id/versions/:version/current",
            post(handlers::set_current_version::<S>),
        )
        .route(
            "/organisations/:org_id/repositories/:repo_id/entities/:entity_id/versions/:version/hide",
            post(handlers::hide_version::<S>),
        )
        // Annotations
        .route(
            "/organisations/:org_id/repositories/:repo_id/entities/:entity_id/annotations/:property",
            get(handlers::get_annotations::<S>),
        )
        .route(
            "/organisations/:org_id/repositories/:repo_id/entities/:entity_id/versions/:version/annotations",
            delete(handlers::delete_annotations::<S>),
        )
        .route(
            "/organisations/:org_id/repositories/:repo_id/entities/:entity_id/versions/:version/annotations/:property",
            put(handlers::set_annotations::<S>),
        )
        // Forking
        .route(
            "/organisations/:org_id/repositories/:repo_id/entities/:entity_id/fork",
            get(handlers::get_forking_stats::<S>).post(handlers::create_fork::<S>),
        )
}

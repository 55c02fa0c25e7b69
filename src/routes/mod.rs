// HTTP introspection routes

mod http;

use axum::{Router, routing::get};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::uve_table::VmUveTable;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) table: Arc<VmUveTable>,
}

pub fn app(table: Arc<VmUveTable>) -> Router {
    let state = AppState { table };
    Router::new()
        .route("/", get(|| async { "vm-uve introspect" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/vms", get(http::list_vms_handler)) // GET /api/vms
        .route("/api/vms/{name}", get(http::vm_uve_handler)) // GET /api/vms/{name}
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}

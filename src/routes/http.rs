// GET handlers: version, VM list, last-sent UVE per VM

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use super::AppState;

const NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// GET /version: returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /api/vms: names of the VMs with a UVE entry.
pub(super) async fn list_vms_handler(State(state): State<AppState>) -> impl IntoResponse {
    axum::Json(state.table.vm_names())
}

/// GET /api/vms/{name}: what was last sent for the VM.
pub(super) async fn vm_uve_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.table.sent_snapshot(&name) {
        Some(sent) => axum::Json(sent).into_response(),
        None => (StatusCode::NOT_FOUND, format!("no uve entry for vm {name}")).into_response(),
    }
}

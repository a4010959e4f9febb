use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, warn};

use crate::model::PurchaseRequest;
use crate::purchase::{PurchaseError, PurchaseWorkflow};
use crate::registry::{load_listing, Listing};
use crate::sheets::RegistrySheet;
use crate::title::TitleResolver;

pub const CONNECT_FAILED: &str = "Unable to connect to registry system";

#[derive(Clone)]
pub struct AppState {
    pub sheet: Arc<dyn RegistrySheet>,
    pub resolver: Arc<dyn TitleResolver>,
    pub purchases: Arc<PurchaseWorkflow>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/api/registry", get(registry_handler))
        .route("/purchase_item", post(purchase_handler))
        .fallback(not_found_handler)
        .with_state(state)
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn healthz_handler() -> &'static str {
    "ok"
}

async fn registry_handler(State(state): State<AppState>) -> Json<Listing> {
    Json(load_listing(state.sheet.as_ref(), state.resolver.as_ref()).await)
}

async fn purchase_handler(
    State(state): State<AppState>,
    payload: Result<Json<PurchaseRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            warn!(reason = %rejection.body_text(), "rejected purchase payload");
            return error_response(rejection.status(), "Invalid purchase request");
        }
    };

    match state.purchases.record(request).await {
        Ok(receipt) => Json(json!({ "success": true, "message": receipt.message })).into_response(),
        Err(err @ PurchaseError::Validation { .. }) => {
            error_response(StatusCode::BAD_REQUEST, &err.to_string())
        }
        Err(PurchaseError::Connectivity(err)) => {
            error!(%err, "error processing purchase");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, CONNECT_FAILED)
        }
    }
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Page Not Found")
}

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use crate::policy::context::RequestContext;
use crate::policy::defaults::default_rules;
use crate::policy::enforcer::Enforcer;
use crate::policy::loader::load_overrides;
use crate::policy::overrides::Overrides;
use crate::policy::types::{EnforceRequest, ReloadResponse};

#[derive(Clone)]
pub struct PolicyState {
    pub enforcer: Arc<Enforcer>,
    /// Override file re-read on `POST /v1/reload`
    pub overrides_file: Option<PathBuf>,
}

pub fn router(state: PolicyState) -> Router {
    Router::new()
        .route("/v1/enforce", post(handle_enforce))
        .route("/v1/rules", get(handle_rules))
        .route("/v1/reload", post(handle_reload))
        .route("/healthz", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_enforce(
    State(state): State<PolicyState>,
    Json(req): Json<EnforceRequest>,
) -> impl IntoResponse {
    let ctx: RequestContext = req.context.into();
    match state.enforcer.enforce(&req.operation, &ctx) {
        Ok(decision) => Json(decision).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn handle_rules(State(state): State<PolicyState>) -> impl IntoResponse {
    Json(state.enforcer.list_rules())
}

async fn handle_reload(State(state): State<PolicyState>) -> impl IntoResponse {
    let overrides = match &state.overrides_file {
        Some(path) => match load_overrides(path) {
            Ok(o) => o,
            Err(e) => {
                tracing::error!(error = %e, "policy reload failed, keeping current rules");
                return (StatusCode::BAD_REQUEST, e.into_response()).into_response();
            }
        },
        None => Overrides::new(),
    };
    match state.enforcer.rebuild(&default_rules(), &overrides) {
        Ok(rules) => Json(ReloadResponse { rules }).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "policy reload failed, keeping current rules");
            (StatusCode::BAD_REQUEST, e.into_response()).into_response()
        }
    }
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

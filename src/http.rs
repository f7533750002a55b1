//! HTTP routes: submit expressions, list requests, view and edit the
//! configuration, stop the service.

use crate::config::{EditOutcome, persist};
use crate::engine::Engine;
use crate::error::Result;
use crate::model::RequestView;
use axum::{
    Form, Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Input that shuts the service down instead of being evaluated.
pub const STOP_KEYWORD: &str = "stop";

/// State shared across routes.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    /// Where edits are persisted. `None` keeps edits in memory only.
    pub config_path: Option<PathBuf>,
    /// Held across snapshot and save so saves land in snapshot order.
    persist_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, config_path: Option<PathBuf>) -> Self {
        Self {
            engine,
            config_path,
            persist_lock: Arc::new(Mutex::new(())),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SubmitForm {
    #[serde(rename = "Expression", default)]
    pub expression: String,
}

/// List endpoints wrap their items in a `data` field.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
}

#[derive(Debug, Serialize)]
pub struct EditResponse {
    #[serde(flatten)]
    pub outcome: EditOutcome,
    pub config: BTreeMap<String, u64>,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: &'static str,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", post(submit_expression))
        .route("/exprs", post(submit_expression).get(list_expressions))
        .route("/config", get(show_config).post(edit_config))
        .route("/editconfig", post(edit_config))
        .route("/stop", get(stop).post(stop))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until the engine is shut down.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let engine = Arc::clone(&state.engine);
    info!(addr = ?listener.local_addr().ok(), "http server listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { engine.stopped().await })
        .await?;
    Ok(())
}

/// POST / and POST /exprs - Submit an expression
async fn submit_expression(
    State(state): State<AppState>,
    Form(form): Form<SubmitForm>,
) -> Response {
    if form.expression.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(MessageResponse {
                message: "empty expression",
            }),
        )
            .into_response();
    }
    if form.expression == STOP_KEYWORD {
        state.engine.shutdown();
        return (
            StatusCode::ACCEPTED,
            Json(MessageResponse {
                message: "stopping",
            }),
        )
            .into_response();
    }

    let request = state.engine.submit(form.expression);
    (StatusCode::CREATED, Json(request.view())).into_response()
}

/// GET /exprs - List every request in submission order
async fn list_expressions(State(state): State<AppState>) -> Json<ListResponse<RequestView>> {
    Json(ListResponse {
        data: state.engine.requests(),
    })
}

/// GET /config - Current configuration
async fn show_config(State(state): State<AppState>) -> Json<BTreeMap<String, u64>> {
    Json(state.engine.config_snapshot())
}

/// POST /config and POST /editconfig - Apply a batch of key/value edits
async fn edit_config(
    State(state): State<AppState>,
    Form(pairs): Form<HashMap<String, String>>,
) -> Json<EditResponse> {
    let outcome = state.engine.edit_config(pairs);

    let config = {
        let _guard = state.persist_lock.lock().await;
        let config = state.engine.config_snapshot();
        if let Some(path) = state.config_path.clone() {
            let snapshot = config.clone();
            let target = path.clone();
            match tokio::task::spawn_blocking(move || persist::save(&target, &snapshot)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(path = %path.display(), "failed to persist config: {e}"),
                Err(e) => error!(path = %path.display(), "config save task failed: {e}"),
            }
        }
        config
    };

    // Shrinking can wait on busy workers; don't hold the response for it.
    let engine = Arc::clone(&state.engine);
    tokio::spawn(async move {
        engine.reconcile().await;
    });

    Json(EditResponse { outcome, config })
}

/// GET /stop and POST /stop - Shut the service down immediately
async fn stop(State(state): State<AppState>) -> (StatusCode, Json<MessageResponse>) {
    state.engine.shutdown();
    (
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: "stopping",
        }),
    )
}

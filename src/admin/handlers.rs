use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::activation::{ActivationController, ActivationError, ActivationStatus, RegenerateOutcome, Trigger};
use crate::compose::{ConflictReport, Diagnostics};
use crate::config::ComposerConfig;
use crate::fragments::{InstallError, SourceId};
use crate::parser::RenameError;

pub type AdminState = Arc<ActivationController>;

#[derive(Debug, Serialize, Deserialize)]
pub struct ResolveConflictRequest {
    /// Lane key as reported in the conflict list.
    pub key: String,
    pub winner: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RenameRouteRequest {
    /// Fragment path as reported in diagnostics.
    pub source: String,
    /// Location spec (`/api/`, `= /health`) or normalized key.
    pub from: String,
    pub to: String,
}

/// `GET /config`: the effective configuration plus what clients need to
/// find the API.
#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    #[serde(rename = "apiBasePath")]
    pub api_base_path: String,
    pub version: &'static str,
    #[serde(flatten)]
    pub config: ComposerConfig,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Errors surfaced to API callers.
pub struct ApiError(ActivationError);

impl From<ActivationError> for ApiError {
    fn from(e: ActivationError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ActivationError::Install(InstallError::InvalidName(_)) => StatusCode::BAD_REQUEST,
            ActivationError::Install(InstallError::Io { .. })
            | ActivationError::Store(_)
            | ActivationError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ActivationError::UnknownConflict(_) | ActivationError::UnknownSource(_) => StatusCode::NOT_FOUND,
            ActivationError::NotACandidate { .. } => StatusCode::BAD_REQUEST,
            ActivationError::OverrideSupremacy { .. } => StatusCode::CONFLICT,
            ActivationError::Rename { error, .. } => match error {
                RenameError::NotFound(_) => StatusCode::NOT_FOUND,
                RenameError::Ambiguous { .. } => StatusCode::CONFLICT,
                RenameError::Unparsed(_) | RenameError::InvalidPattern { .. } => StatusCode::BAD_REQUEST,
            },
        };
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Admin request failed");
        } else {
            tracing::warn!(error = %self.0, "Admin request rejected");
        }
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

fn outcome_response(outcome: RegenerateOutcome) -> Response {
    let status = if outcome.activated() {
        StatusCode::OK
    } else {
        StatusCode::UNPROCESSABLE_ENTITY
    };
    (status, Json(outcome)).into_response()
}

pub async fn reload(State(controller): State<AdminState>) -> Response {
    outcome_response(controller.regenerate(Trigger::Manual).await)
}

pub async fn install_app(
    State(controller): State<AdminState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let text = String::from_utf8_lossy(&body);
    let outcome = controller.install_app(&name, &text).await?;
    Ok(outcome_response(outcome))
}

pub async fn get_status(State(controller): State<AdminState>) -> Json<ActivationStatus> {
    Json(controller.status().as_ref().clone())
}

pub async fn get_conflicts(State(controller): State<AdminState>) -> Json<Vec<ConflictReport>> {
    Json(controller.conflicts())
}

pub async fn get_diagnostics(State(controller): State<AdminState>) -> Json<Diagnostics> {
    Json(
        controller
            .last_composition()
            .map(|c| c.diagnostics.clone())
            .unwrap_or_default(),
    )
}

pub async fn resolve_conflict(
    State(controller): State<AdminState>,
    Json(request): Json<ResolveConflictRequest>,
) -> Result<Response, ApiError> {
    let outcome = controller
        .resolve_conflict(&request.key, SourceId::new(request.winner))
        .await?;
    Ok(outcome_response(outcome))
}

pub async fn rename_route(
    State(controller): State<AdminState>,
    Json(request): Json<RenameRouteRequest>,
) -> Result<Response, ApiError> {
    let outcome = controller
        .rename_route(SourceId::new(request.source), &request.from, &request.to)
        .await?;
    Ok(outcome_response(outcome))
}

pub async fn get_config(State(controller): State<AdminState>) -> Json<ConfigResponse> {
    let config = controller.config().clone();
    Json(ConfigResponse {
        api_base_path: config.admin.base_path.clone(),
        version: env!("CARGO_PKG_VERSION"),
        config,
    })
}

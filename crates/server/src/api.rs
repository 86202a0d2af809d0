//! Requisition API routes.
//!
//! - `POST   /asset-requisitions`                     : submit a requisition
//! - `GET    /asset-requisitions?status=&limit=`      : list visible requisitions
//! - `GET    /asset-requisitions/{id}`                : fetch one requisition
//! - `DELETE /asset-requisitions/{id}`                : withdraw
//! - `POST   /asset-requisitions/{id}/manager-action` : approve | reject | hold
//! - `POST   /asset-requisitions/{id}/hr-action`      : approve | reject
//! - `GET    /asset-types`                            : active asset catalog
//! - `GET    /users/me`                               : the caller's directory record

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use reqflow_core::domain::asset_type::AssetType;
use reqflow_core::domain::requisition::{
    NewRequisition, Requisition, RequisitionId, RequisitionStatus,
};
use reqflow_core::domain::user::User;
use reqflow_core::errors::{ApplicationError, DomainError, InterfaceError};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::auth::AuthenticatedActor;
use crate::service::{RequisitionService, WithdrawalReceipt};

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RequisitionService>,
}

impl AppState {
    pub fn new(service: RequisitionService) -> Self {
        Self { service: Arc::new(service) }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/asset-requisitions", get(list_requisitions).post(create_requisition))
        .route("/asset-requisitions/", delete(withdraw_blank_id))
        .route("/asset-requisitions/{id}", get(get_requisition).delete(withdraw_requisition))
        .route("/asset-requisitions/{id}/manager-action", post(manager_action))
        .route("/asset-requisitions/{id}/hr-action", post(hr_action))
        .route("/asset-types", get(list_asset_types))
        .route("/users/me", get(current_user))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub kind: &'static str,
    pub detail: String,
    pub correlation_id: String,
}

/// An interface error bound to the HTTP status it is reported with.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: InterfaceError,
}

impl ApiError {
    pub fn new(error: ApplicationError, correlation_id: &str) -> Self {
        let error = error.into_interface(correlation_id);
        Self { status: status_for(&error), error }
    }

    fn malformed_body(rejection: JsonRejection, correlation_id: &str) -> Self {
        let status = match rejection {
            JsonRejection::MissingJsonContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            _ => StatusCode::UNPROCESSABLE_ENTITY,
        };
        Self {
            status,
            error: InterfaceError::BadRequest {
                message: rejection.body_text(),
                correlation_id: correlation_id.to_owned(),
            },
        }
    }

    fn malformed_query(rejection: QueryRejection, correlation_id: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: InterfaceError::BadRequest {
                message: rejection.body_text(),
                correlation_id: correlation_id.to_owned(),
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

/// Bad-state conflicts are reported as 400 alongside validation failures.
pub fn status_for(error: &InterfaceError) -> StatusCode {
    match error {
        InterfaceError::BadRequest { .. } | InterfaceError::Conflict { .. } => {
            StatusCode::BAD_REQUEST
        }
        InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!(
                event_name = "http.request.failed",
                correlation_id = %self.error.correlation_id(),
                status = self.status.as_u16(),
                kind = self.error.kind(),
                detail = %self.error.message(),
                "request failed"
            );
        } else {
            warn!(
                event_name = "http.request.rejected",
                correlation_id = %self.error.correlation_id(),
                status = self.status.as_u16(),
                kind = self.error.kind(),
                detail = %self.error.message(),
                "request rejected"
            );
        }

        let body = ErrorBody {
            error: self.error.user_message(),
            kind: self.error.kind(),
            detail: self.error.message().to_owned(),
            correlation_id: self.error.correlation_id().to_owned(),
        };
        (self.status, Json(body)).into_response()
    }
}

async fn create_requisition(
    State(state): State<AppState>,
    auth: AuthenticatedActor,
    payload: Result<Json<NewRequisition>, JsonRejection>,
) -> Result<Json<Requisition>, ApiError> {
    let Json(input) =
        payload.map_err(|rejection| ApiError::malformed_body(rejection, &auth.correlation_id))?;

    state
        .service
        .create(&auth.actor, input, &auth.correlation_id)
        .await
        .map(Json)
        .map_err(|error| ApiError::new(error, &auth.correlation_id))
}

async fn list_requisitions(
    State(state): State<AppState>,
    auth: AuthenticatedActor,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<Requisition>>, ApiError> {
    let Query(params) =
        params.map_err(|rejection| ApiError::malformed_query(rejection, &auth.correlation_id))?;
    let status = parse_status_filter(params.status.as_deref())
        .map_err(|error| ApiError::new(error.into(), &auth.correlation_id))?;

    state
        .service
        .list(&auth.actor, status, params.limit)
        .await
        .map(Json)
        .map_err(|error| ApiError::new(error, &auth.correlation_id))
}

/// Empty and `all` mean no filter; anything else must name a status.
fn parse_status_filter(raw: Option<&str>) -> Result<Option<RequisitionStatus>, DomainError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) if value.eq_ignore_ascii_case("all") => Ok(None),
        Some(value) => RequisitionStatus::parse(value)
            .map(Some)
            .ok_or_else(|| DomainError::Validation(format!("unknown status filter `{value}`"))),
    }
}

async fn get_requisition(
    State(state): State<AppState>,
    auth: AuthenticatedActor,
    uri: Uri,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<Requisition>, ApiError> {
    let id = requisition_id(id, &uri, &auth)?;
    state
        .service
        .get(&auth.actor, &id)
        .await
        .map(Json)
        .map_err(|error| ApiError::new(error, &auth.correlation_id))
}

async fn manager_action(
    State(state): State<AppState>,
    auth: AuthenticatedActor,
    uri: Uri,
    id: Result<Path<String>, PathRejection>,
    payload: Result<Json<ActionRequest>, JsonRejection>,
) -> Result<Json<Requisition>, ApiError> {
    let id = requisition_id(id, &uri, &auth)?;
    let Json(request) =
        payload.map_err(|rejection| ApiError::malformed_body(rejection, &auth.correlation_id))?;

    state
        .service
        .manager_action(
            &auth.actor,
            &id,
            &request.action,
            request.reason,
            &auth.correlation_id,
        )
        .await
        .map(Json)
        .map_err(|error| ApiError::new(error, &auth.correlation_id))
}

async fn hr_action(
    State(state): State<AppState>,
    auth: AuthenticatedActor,
    uri: Uri,
    id: Result<Path<String>, PathRejection>,
    payload: Result<Json<ActionRequest>, JsonRejection>,
) -> Result<Json<Requisition>, ApiError> {
    let id = requisition_id(id, &uri, &auth)?;
    let Json(request) =
        payload.map_err(|rejection| ApiError::malformed_body(rejection, &auth.correlation_id))?;

    state
        .service
        .hr_action(
            &auth.actor,
            &id,
            &request.action,
            request.reason,
            &auth.correlation_id,
        )
        .await
        .map(Json)
        .map_err(|error| ApiError::new(error, &auth.correlation_id))
}

async fn withdraw_requisition(
    State(state): State<AppState>,
    auth: AuthenticatedActor,
    uri: Uri,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<WithdrawalReceipt>, ApiError> {
    let id = requisition_id(id, &uri, &auth)?;
    withdraw(&state, &auth, id).await
}

/// A segment that does not percent-decode to UTF-8 names no requisition, so
/// it is reported as a miss carrying the raw segment.
fn requisition_id(
    id: Result<Path<String>, PathRejection>,
    uri: &Uri,
    auth: &AuthenticatedActor,
) -> Result<RequisitionId, ApiError> {
    match id {
        Ok(Path(id)) => Ok(RequisitionId(id)),
        Err(_) => Err(ApiError::new(
            ApplicationError::not_found("requisition", raw_id_segment(uri)),
            &auth.correlation_id,
        )),
    }
}

fn raw_id_segment(uri: &Uri) -> &str {
    uri.path()
        .strip_prefix("/asset-requisitions/")
        .and_then(|rest| rest.split('/').next())
        .unwrap_or_default()
}

/// `DELETE /asset-requisitions/` carries an empty id, which is a plain miss.
async fn withdraw_blank_id(
    State(state): State<AppState>,
    auth: AuthenticatedActor,
) -> Result<Json<WithdrawalReceipt>, ApiError> {
    withdraw(&state, &auth, RequisitionId(String::new())).await
}

async fn withdraw(
    state: &AppState,
    auth: &AuthenticatedActor,
    id: RequisitionId,
) -> Result<Json<WithdrawalReceipt>, ApiError> {
    state
        .service
        .withdraw(&auth.actor, &id, &auth.correlation_id)
        .await
        .map(Json)
        .map_err(|error| ApiError::new(error, &auth.correlation_id))
}

async fn list_asset_types(
    State(state): State<AppState>,
    auth: AuthenticatedActor,
) -> Result<Json<Vec<AssetType>>, ApiError> {
    state
        .service
        .asset_types()
        .await
        .map(Json)
        .map_err(|error| ApiError::new(error, &auth.correlation_id))
}

async fn current_user(auth: AuthenticatedActor) -> Json<User> {
    Json(auth.user)
}

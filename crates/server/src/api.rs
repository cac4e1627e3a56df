//! JSON invocation surface, one endpoint per engine use case:
//!
//! - `POST /api/v1/tiers`                       — configure a tier (admin)
//! - `GET  /api/v1/tiers?division=&category=`   — list a scope's tiers
//! - `POST /api/v1/transactions`                — submit a transaction
//! - `GET  /api/v1/transactions/{id}`           — status snapshot
//! - `POST /api/v1/transactions/{id}/actions`   — signing action
//! - `GET  /api/v1/transactions/{id}/history`   — audit history

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use loa_core::domain::identity::UserId;
use loa_core::domain::scope::ScopeKey;
use loa_core::domain::tier::{SlotAssignments, Tier, TierId};
use loa_core::domain::transaction::{TransactionId, TransactionType};
use loa_core::errors::InterfaceError;
use loa_core::machine::{ActionCommand, ActionDecision};

use crate::service::{ServiceError, SubmitRequest, WorkflowService};

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<WorkflowService>,
    pub admin_token: Option<SecretString>,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub detail: String,
    pub correlation_id: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/tiers", post(configure_tier).get(list_tiers))
        .route("/api/v1/transactions", post(submit_transaction))
        .route("/api/v1/transactions/{id}", get(get_status))
        .route("/api/v1/transactions/{id}/actions", post(act))
        .route("/api/v1/transactions/{id}/history", get(get_history))
        .with_state(state)
}

fn reject(
    correlation_id: &str,
    status: StatusCode,
    error: impl Into<String>,
    detail: impl Into<String>,
) -> (StatusCode, Json<ApiError>) {
    (
        status,
        Json(ApiError {
            error: error.into(),
            detail: detail.into(),
            correlation_id: correlation_id.to_string(),
        }),
    )
}

fn map_service_error(
    correlation_id: &str,
    error: ServiceError,
) -> (StatusCode, Json<ApiError>) {
    match error {
        ServiceError::UnknownTransaction(id) => reject(
            correlation_id,
            StatusCode::NOT_FOUND,
            "transaction not found",
            format!("transaction `{id}` was not found"),
        ),
        ServiceError::Application(application) => {
            let detail = application.to_string();
            let interface = application.into_interface(correlation_id);
            let status = match &interface {
                InterfaceError::BadRequest { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
                InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            };
            if status.is_server_error() {
                warn!(
                    event_name = "loa.api.request_failed",
                    correlation_id,
                    error = %detail,
                    "request failed"
                );
            }
            reject(correlation_id, status, interface.user_message(), detail)
        }
    }
}

fn require_admin(
    state: &ApiState,
    headers: &HeaderMap,
    correlation_id: &str,
) -> Result<(), (StatusCode, Json<ApiError>)> {
    let Some(expected) = &state.admin_token else {
        return Ok(());
    };

    let supplied = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    if supplied == Some(expected.expose_secret()) {
        Ok(())
    } else {
        Err(reject(
            correlation_id,
            StatusCode::UNAUTHORIZED,
            "authorization required",
            "tier configuration requires a valid admin bearer token",
        ))
    }
}

#[derive(Debug, Deserialize)]
pub struct ConfigureTierRequest {
    pub id: Option<String>,
    pub division: String,
    pub category: String,
    pub level: u32,
    pub min_amount: Decimal,
    pub max_amount: Decimal,
    pub reviewer1: Option<String>,
    pub reviewer2: Option<String>,
    pub approver1: Option<String>,
    pub approver2: Option<String>,
    pub approver3: Option<String>,
}

async fn configure_tier(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(request): Json<ConfigureTierRequest>,
) -> ApiResult<Tier> {
    let correlation_id = Uuid::new_v4().to_string();
    require_admin(&state, &headers, &correlation_id)?;

    let signer = |value: Option<String>| {
        value.filter(|value| !value.trim().is_empty()).map(UserId)
    };
    let tier = Tier {
        id: TierId(request.id.unwrap_or_else(|| Uuid::new_v4().to_string())),
        scope: ScopeKey::new(request.division, request.category),
        level: request.level,
        range: loa_core::AmountRange::new(request.min_amount, request.max_amount),
        assignments: SlotAssignments {
            reviewer1: signer(request.reviewer1),
            reviewer2: signer(request.reviewer2),
            approver1: signer(request.approver1),
            approver2: signer(request.approver2),
            approver3: signer(request.approver3),
        },
    };

    let tier = state
        .service
        .configure_tier(tier)
        .await
        .map_err(|error| map_service_error(&correlation_id, error))?;
    Ok(Json(tier))
}

#[derive(Debug, Deserialize)]
pub struct ListTiersQuery {
    pub division: String,
    pub category: String,
}

async fn list_tiers(
    State(state): State<ApiState>,
    Query(query): Query<ListTiersQuery>,
) -> ApiResult<Vec<Tier>> {
    let correlation_id = Uuid::new_v4().to_string();
    let scope = ScopeKey::new(query.division, query.category);

    let tiers = state
        .service
        .list_tiers(&scope)
        .await
        .map_err(|error| map_service_error(&correlation_id, error))?;
    Ok(Json(tiers))
}

#[derive(Debug, Deserialize)]
pub struct SubmitTransactionRequest {
    pub division: String,
    pub category: String,
    pub tx_type: String,
    pub amount: Decimal,
    pub requested_by: String,
}

async fn submit_transaction(
    State(state): State<ApiState>,
    Json(request): Json<SubmitTransactionRequest>,
) -> ApiResult<loa_core::Transaction> {
    let correlation_id = Uuid::new_v4().to_string();

    let Some(tx_type) = TransactionType::parse(&request.tx_type) else {
        return Err(reject(
            &correlation_id,
            StatusCode::UNPROCESSABLE_ENTITY,
            "The request could not be processed. Check inputs and try again.",
            format!("unknown transaction type `{}`", request.tx_type),
        ));
    };

    let transaction = state
        .service
        .submit_transaction(SubmitRequest {
            scope: ScopeKey::new(request.division, request.category),
            tx_type,
            amount: request.amount,
            requested_by: UserId::new(request.requested_by),
        })
        .await
        .map_err(|error| map_service_error(&correlation_id, error))?;
    Ok(Json(transaction))
}

#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    pub actor: String,
    pub decision: String,
    pub remarks: Option<String>,
    pub request_id: Option<String>,
}

async fn act(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(request): Json<ActionRequest>,
) -> ApiResult<crate::service::ActionReceipt> {
    let correlation_id = Uuid::new_v4().to_string();

    let Some(decision) = ActionDecision::parse(&request.decision) else {
        return Err(reject(
            &correlation_id,
            StatusCode::UNPROCESSABLE_ENTITY,
            "The request could not be processed. Check inputs and try again.",
            format!("unknown decision `{}` (expected approve|reject)", request.decision),
        ));
    };

    let receipt = state
        .service
        .act(ActionCommand {
            transaction_id: TransactionId(id),
            actor: UserId::new(request.actor),
            decision,
            remarks: request.remarks,
            request_id: request.request_id,
        })
        .await
        .map_err(|error| map_service_error(&correlation_id, error))?;
    Ok(Json(receipt))
}

async fn get_status(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<crate::service::StatusView> {
    let correlation_id = Uuid::new_v4().to_string();

    let status = state
        .service
        .get_status(&TransactionId(id))
        .await
        .map_err(|error| map_service_error(&correlation_id, error))?;
    Ok(Json(status))
}

async fn get_history(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> ApiResult<crate::service::HistoryView> {
    let correlation_id = Uuid::new_v4().to_string();

    let history = state
        .service
        .get_history(&TransactionId(id))
        .await
        .map_err(|error| map_service_error(&correlation_id, error))?;
    Ok(Json(history))
}

//! HTTP request handlers for registry operations.

use ark_bn254::Fr;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use identity_circuits::field::decimal;
use identity_circuits::IdentityFields;
use identity_registry::{
    ContentId, IdentityRecord, LedgerInfo, RebuildReport, RegistryError, RegistryStats,
    StateChange, Status, TreeInfo, TreeValidation, Verification,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::SharedState;

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// ============ Lifecycle ============

#[derive(Deserialize)]
pub struct SubmitRequest {
    pub subject_id: String,
    #[serde(flatten)]
    pub fields: IdentityFields,
}

pub async fn submit(
    State(state): State<SharedState>,
    Json(req): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<IdentityRecord>), ApiError> {
    let subject_id = req.subject_id.trim();
    if subject_id.is_empty() {
        return Err(ApiError::bad_request("subject_id is required"));
    }
    let record = state.engine.submit(subject_id, &req.fields).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn approve(
    State(state): State<SharedState>,
    Path(subject_id): Path<String>,
) -> ApiResult<StateChange> {
    Ok(Json(state.engine.approve(&subject_id).await?))
}

#[derive(Deserialize)]
pub struct RevokeRequest {
    pub reason: String,
}

pub async fn revoke(
    State(state): State<SharedState>,
    Path(subject_id): Path<String>,
    Json(req): Json<RevokeRequest>,
) -> ApiResult<StateChange> {
    Ok(Json(state.engine.revoke(&subject_id, &req.reason).await?))
}

pub async fn verify(
    State(state): State<SharedState>,
    Path(subject_id): Path<String>,
    Json(fields): Json<IdentityFields>,
) -> ApiResult<Verification> {
    Ok(Json(state.engine.verify(&subject_id, &fields).await?))
}

// ============ Queries ============

pub async fn get_record(
    State(state): State<SharedState>,
    Path(subject_id): Path<String>,
) -> ApiResult<IdentityRecord> {
    state
        .engine
        .record(&subject_id)
        .await?
        .map(Json)
        .ok_or_else(|| RegistryError::NotFound(subject_id).into())
}

#[derive(Serialize)]
pub struct SubjectStatus {
    pub subject_id: String,
    pub status: Option<Status>,
    pub submitted: bool,
    pub approved: bool,
    pub verified: bool,
}

pub async fn subject_status(
    State(state): State<SharedState>,
    Path(subject_id): Path<String>,
) -> ApiResult<SubjectStatus> {
    let record = state.engine.record(&subject_id).await?;
    let approved = state.engine.is_approved(&subject_id).await?;
    Ok(Json(SubjectStatus {
        status: record.as_ref().map(|r| r.status),
        submitted: record.is_some(),
        verified: record.is_some_and(|r| r.status == Status::Verified),
        approved,
        subject_id,
    }))
}

pub async fn pending(State(state): State<SharedState>) -> ApiResult<Vec<IdentityRecord>> {
    Ok(Json(state.engine.pending_records().await?))
}

#[derive(Serialize)]
pub struct ApprovalCheck {
    #[serde(with = "decimal")]
    pub identity_commitment: Fr,
    pub approved: bool,
}

pub async fn check_identity(
    State(state): State<SharedState>,
    Json(fields): Json<IdentityFields>,
) -> ApiResult<ApprovalCheck> {
    let (identity_commitment, approved) = state.engine.check_identity_approval(&fields).await?;
    Ok(Json(ApprovalCheck {
        identity_commitment,
        approved,
    }))
}

// ============ Accumulator ============

#[derive(Serialize)]
pub struct RootResponse {
    #[serde(with = "decimal")]
    pub root: Fr,
}

pub async fn tree_info(State(state): State<SharedState>) -> ApiResult<TreeInfo> {
    Ok(Json(state.engine.tree_info().await?))
}

/// Root currently published on the ledger.
pub async fn current_root(State(state): State<SharedState>) -> ApiResult<RootResponse> {
    Ok(Json(RootResponse {
        root: state.engine.current_root().await?,
    }))
}

pub async fn rebuild(State(state): State<SharedState>) -> ApiResult<RebuildReport> {
    Ok(Json(state.engine.rebuild_and_publish().await?))
}

pub async fn validate(State(state): State<SharedState>) -> ApiResult<TreeValidation> {
    Ok(Json(state.engine.validate_tree().await?))
}

pub async fn stats(State(state): State<SharedState>) -> ApiResult<RegistryStats> {
    Ok(Json(state.engine.stats().await?))
}

// ============ Snapshots & maintenance ============

pub async fn reload_snapshot(State(state): State<SharedState>) -> ApiResult<RootResponse> {
    Ok(Json(RootResponse {
        root: state.engine.reload_from_snapshot_store().await?,
    }))
}

#[derive(Serialize)]
pub struct SnapshotSaved {
    pub id: ContentId,
}

pub async fn save_snapshot(State(state): State<SharedState>) -> ApiResult<SnapshotSaved> {
    Ok(Json(SnapshotSaved {
        id: state.engine.save_snapshot().await?,
    }))
}

pub async fn ledger_info(State(state): State<SharedState>) -> ApiResult<LedgerInfo> {
    let info = state.ledger.info().await.map_err(RegistryError::from)?;
    Ok(Json(info))
}

pub async fn reset(State(state): State<SharedState>) -> Result<StatusCode, ApiError> {
    state.engine.reset().await?;
    Ok(StatusCode::NO_CONTENT)
}

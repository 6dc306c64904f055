//! Financing catalog and quotation routes.
//!
//! - `GET  /api/financing/quote`        — installment options for a price
//! - `GET  /api/financing/public`       — storefront plan listing
//! - `GET  /api/financing/plans`        — admin plan listing (raw)
//! - `POST /api/financing/plans`        — create a plan
//! - `PUT  /api/financing/plans/{id}`   — replace a plan
//! - `DELETE /api/financing/plans/{id}` — hard-delete a plan
//! - `POST /api/financing/bulk`         — bulk plan upsert, continue on bad rows
//! - `GET  /api/financing/groups`       — list groups
//! - `POST /api/financing/groups`       — create a group
//! - `PUT  /api/financing/groups/{key}` — update a group
//! - `DELETE /api/financing/groups/{key}` — delete a group

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use financia_core::domain::plan::{FinancingGroup, FinancingPlan, PlanId};
use financia_core::errors::ApplicationError;
use financia_core::quoting::eligibility::{select_candidates, EligibilityRequest};
use financia_core::quoting::{engine, fallback};
use financia_db::repositories::{BulkUpsertResult, PlanFilter, RepositoryError};

use crate::bootstrap::AppState;

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

pub(crate) type ErrorResponse = (StatusCode, Json<ApiError>);

/// Maps the application error taxonomy onto HTTP statuses: validation 422,
/// missing references 404, unreachable repository 503, domain guards 400.
pub(crate) fn error_response(error: ApplicationError) -> ErrorResponse {
    let status = match &error {
        ApplicationError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ApplicationError::PlanNotFound { .. }
        | ApplicationError::ProductNotFound(_)
        | ApplicationError::OrderNotFound(_)
        | ApplicationError::GroupNotFound(_) => StatusCode::NOT_FOUND,
        ApplicationError::Repository(_) => StatusCode::SERVICE_UNAVAILABLE,
        ApplicationError::Domain(_) => StatusCode::BAD_REQUEST,
    };
    if status.is_server_error() {
        error!(event_name = "api.error", error = %error, "request failed");
    }
    (status, Json(ApiError { error: error.to_string() }))
}

pub(crate) fn repository_error(error: RepositoryError) -> ApplicationError {
    ApplicationError::Repository(error.to_string())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/financing/quote", get(quote))
        .route("/api/financing/public", get(public_plans))
        .route("/api/financing/plans", get(list_plans).post(create_plan))
        .route("/api/financing/plans/{id}", axum::routing::put(update_plan).delete(delete_plan))
        .route("/api/financing/bulk", post(bulk_upsert))
        .route("/api/financing/groups", get(list_groups).post(create_group))
        .route(
            "/api/financing/groups/{key}",
            axum::routing::put(update_group).delete(delete_group),
        )
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Quotation
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteQuery {
    pub price: Decimal,
    #[serde(default)]
    pub down_pct: Option<Decimal>,
    #[serde(default)]
    pub group_key: Option<String>,
    /// Comma-separated explicit plan id allow-list.
    #[serde(default)]
    pub plan_ids: Option<String>,
}

fn parse_plan_ids(raw: Option<&str>) -> Vec<PlanId> {
    raw.map(|value| {
        value
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| PlanId(id.to_string()))
            .collect()
    })
    .unwrap_or_default()
}

fn validated_down_pct(
    requested: Option<Decimal>,
    default: Decimal,
) -> Result<Decimal, ApplicationError> {
    let down_pct = requested.unwrap_or(default);
    if down_pct < Decimal::ZERO || down_pct > Decimal::ONE {
        return Err(ApplicationError::Validation(format!(
            "downPct must be between 0 and 1, got {down_pct}"
        )));
    }
    Ok(down_pct)
}

pub async fn quote(
    State(state): State<AppState>,
    Query(query): Query<QuoteQuery>,
) -> Result<Json<engine::QuoteResponse>, ErrorResponse> {
    let down_pct =
        validated_down_pct(query.down_pct, state.default_down_pct).map_err(error_response)?;
    let plan_ids = parse_plan_ids(query.plan_ids.as_deref());

    let filter = PlanFilter {
        plan_ids: plan_ids.clone(),
        group_key: query.group_key.clone(),
        only_active: true,
    };
    let plans = match state.plans.list(filter).await {
        Ok(plans) => plans,
        Err(repo_error) => {
            // Preview quoting degrades to the local table rather than failing;
            // the synthetic plans in it can never be ordered.
            warn!(
                event_name = "financing.quote.fallback",
                error = %repo_error,
                "plan repository unreachable, serving local quote table"
            );
            return Ok(Json(fallback::local_quote(query.price, down_pct)));
        }
    };

    let request = EligibilityRequest {
        price: query.price,
        plan_ids,
        group_key: query.group_key,
        category: None,
    };
    let candidates = select_candidates(&plans, &request);
    let items = engine::quote(query.price, down_pct, &candidates);

    Ok(Json(engine::QuoteResponse { price: query.price, down_pct, items }))
}

#[derive(Debug, Deserialize)]
pub struct PublicQuery {
    #[serde(default)]
    pub group: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicPlansResponse {
    pub default_down_pct: Decimal,
    pub plans: Vec<FinancingPlan>,
}

/// Storefront plan listing: active plans in the requested group (ungrouped
/// plans included), months ascending.
pub async fn public_plans(
    State(state): State<AppState>,
    Query(query): Query<PublicQuery>,
) -> Result<Json<PublicPlansResponse>, ErrorResponse> {
    let filter =
        PlanFilter { plan_ids: vec![], group_key: query.group.clone(), only_active: true };
    let plans = match state.plans.list(filter).await {
        Ok(plans) => plans,
        Err(repo_error) => {
            warn!(
                event_name = "financing.public.fallback",
                error = %repo_error,
                "plan repository unreachable, serving local plan table"
            );
            fallback::fallback_plans()
        }
    };

    Ok(Json(PublicPlansResponse { default_down_pct: state.default_down_pct, plans }))
}

// ---------------------------------------------------------------------------
// Plan administration
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanPayload {
    #[serde(default)]
    pub code: Option<i64>,
    pub description: String,
    pub months: u32,
    pub surcharge_pct: Decimal,
    #[serde(default)]
    pub group_key: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub min_price: Option<Decimal>,
    #[serde(default)]
    pub max_price: Option<Decimal>,
    #[serde(default)]
    pub include_categories: Vec<String>,
    #[serde(default)]
    pub exclude_categories: Vec<String>,
}

fn default_active() -> bool {
    true
}

impl PlanPayload {
    fn into_plan(self, id: PlanId) -> FinancingPlan {
        FinancingPlan {
            id,
            code: self.code,
            description: self.description,
            months: self.months,
            surcharge_pct: self.surcharge_pct,
            group_key: self.group_key,
            active: self.active,
            min_price: self.min_price,
            max_price: self.max_price,
            include_categories: self.include_categories,
            exclude_categories: self.exclude_categories,
        }
    }
}

pub async fn list_plans(
    State(state): State<AppState>,
) -> Result<Json<Vec<FinancingPlan>>, ErrorResponse> {
    let plans = state
        .plans
        .list(PlanFilter::default())
        .await
        .map_err(|e| error_response(repository_error(e)))?;
    Ok(Json(plans))
}

pub async fn create_plan(
    State(state): State<AppState>,
    Json(payload): Json<PlanPayload>,
) -> Result<(StatusCode, Json<FinancingPlan>), ErrorResponse> {
    let plan = payload.into_plan(PlanId::generate());
    plan.validate()
        .map_err(|e| error_response(ApplicationError::Validation(e.to_string())))?;

    state
        .plans
        .create(plan.clone())
        .await
        .map_err(|e| error_response(repository_error(e)))?;

    info!(event_name = "financing.plan.created", plan_id = %plan.id.0, "financing plan created");
    Ok((StatusCode::CREATED, Json(plan)))
}

pub async fn update_plan(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<PlanPayload>,
) -> Result<Json<FinancingPlan>, ErrorResponse> {
    let plan = payload.into_plan(PlanId(id.clone()));
    plan.validate()
        .map_err(|e| error_response(ApplicationError::Validation(e.to_string())))?;

    let updated = state
        .plans
        .update(plan.clone())
        .await
        .map_err(|e| error_response(repository_error(e)))?;
    if !updated {
        return Err(error_response(ApplicationError::PlanNotFound { reference: id }));
    }

    info!(event_name = "financing.plan.updated", plan_id = %plan.id.0, "financing plan updated");
    Ok(Json(plan))
}

pub async fn delete_plan(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ErrorResponse> {
    let deleted = state
        .plans
        .delete(&PlanId(id.clone()))
        .await
        .map_err(|e| error_response(repository_error(e)))?;
    if !deleted {
        return Err(error_response(ApplicationError::PlanNotFound { reference: id }));
    }

    info!(event_name = "financing.plan.deleted", plan_id = %id, "financing plan deleted");
    Ok(Json(MessageResponse { success: true, message: format!("plan {id} deleted") }))
}

#[derive(Debug, Serialize)]
pub struct BulkResponse {
    pub applied: u64,
    pub skipped: u64,
}

/// Bulk plan upsert. The payload must be a JSON array; rows that fail to
/// deserialize or violate plan invariants are skipped, the rest still apply.
pub async fn bulk_upsert(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<BulkResponse>, ErrorResponse> {
    let rows = payload.as_array().ok_or_else(|| {
        error_response(ApplicationError::Validation("payload must be an array of plans".to_string()))
    })?;

    let mut malformed = 0u64;
    let mut plans = Vec::with_capacity(rows.len());
    for row in rows {
        match serde_json::from_value::<PlanPayload>(row.clone()) {
            Ok(payload) => plans.push(payload.into_plan(PlanId::generate())),
            Err(_) => malformed += 1,
        }
    }

    let BulkUpsertResult { applied, skipped } = state
        .plans
        .upsert_bulk(plans)
        .await
        .map_err(|e| error_response(repository_error(e)))?;
    let skipped = skipped + malformed;

    info!(
        event_name = "financing.plan.bulk_upserted",
        applied = applied,
        skipped = skipped,
        "bulk plan upsert finished"
    );
    Ok(Json(BulkResponse { applied, skipped }))
}

// ---------------------------------------------------------------------------
// Group administration
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPayload {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub order: i64,
    #[serde(default = "default_active")]
    pub active: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroupPayload {
    pub key: String,
    #[serde(flatten)]
    pub group: GroupPayload,
}

impl GroupPayload {
    fn into_group(self, key: String) -> FinancingGroup {
        FinancingGroup {
            key,
            name: self.name,
            description: self.description,
            order: self.order,
            active: self.active,
        }
    }
}

pub async fn list_groups(
    State(state): State<AppState>,
) -> Result<Json<Vec<FinancingGroup>>, ErrorResponse> {
    let groups =
        state.groups.list().await.map_err(|e| error_response(repository_error(e)))?;
    Ok(Json(groups))
}

pub async fn create_group(
    State(state): State<AppState>,
    Json(payload): Json<CreateGroupPayload>,
) -> Result<(StatusCode, Json<FinancingGroup>), ErrorResponse> {
    let group = payload.group.into_group(payload.key);
    group
        .validate()
        .map_err(|e| error_response(ApplicationError::Validation(e.to_string())))?;

    state
        .groups
        .create(group.clone())
        .await
        .map_err(|e| error_response(repository_error(e)))?;

    info!(event_name = "financing.group.created", group_key = %group.key, "financing group created");
    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn update_group(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(payload): Json<GroupPayload>,
) -> Result<Json<FinancingGroup>, ErrorResponse> {
    let group = payload.into_group(key.clone());
    group
        .validate()
        .map_err(|e| error_response(ApplicationError::Validation(e.to_string())))?;

    let updated = state
        .groups
        .update(group.clone())
        .await
        .map_err(|e| error_response(repository_error(e)))?;
    if !updated {
        return Err(error_response(ApplicationError::GroupNotFound(key)));
    }

    Ok(Json(group))
}

pub async fn delete_group(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<MessageResponse>, ErrorResponse> {
    let deleted =
        state.groups.delete(&key).await.map_err(|e| error_response(repository_error(e)))?;
    if !deleted {
        return Err(error_response(ApplicationError::GroupNotFound(key)));
    }

    info!(event_name = "financing.group.deleted", group_key = %key, "financing group deleted");
    Ok(Json(MessageResponse { success: true, message: format!("group {key} deleted") }))
}

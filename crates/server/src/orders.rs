//! Order creation and administration routes.
//!
//! - `POST  /api/orders`      — create an order with frozen financing snapshots
//! - `GET   /api/orders`      — paginated listing with phone/status/date filters
//! - `GET   /api/orders/{id}` — fetch one order
//! - `PATCH /api/orders/{id}` — status change (history appended), notes, customer
//!
//! Order creation is the only write path for financing snapshots: each item's
//! plan is re-resolved fresh from the repository and recomputed against the
//! line subtotal, never trusted from the client and never taken from the
//! fallback table.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use financia_core::domain::order::{
    Currency, Customer, FinancingSnapshot, Order, OrderId, OrderItem, OrderStatus, OrderTotals,
    StatusChange,
};
use financia_core::domain::plan::{FinancingPlan, PlanId};
use financia_core::domain::product::ProductId;
use financia_core::errors::ApplicationError;
use financia_core::phone::normalize_phone;
use financia_db::repositories::{OrderListFilter, Pagination};

use crate::bootstrap::AppState;
use crate::financing::{error_response, repository_error, ErrorResponse};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/orders", get(list_orders).post(create_order))
        .route("/api/orders/{id}", get(get_order).patch(patch_order))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerPayload {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub doc_number: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFinancingPayload {
    #[serde(default)]
    pub plan_id: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemPayload {
    pub product_id: String,
    pub quantity: u32,
    #[serde(default)]
    pub financing: Option<ItemFinancingPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderPayload {
    pub customer: CustomerPayload,
    pub items: Vec<OrderItemPayload>,
    #[serde(default)]
    pub currency: Option<Currency>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub shipping_total: Option<Decimal>,
    #[serde(default)]
    pub discount_total: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerPatchPayload {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub doc_number: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchOrderPayload {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub customer: Option<CustomerPatchPayload>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListQuery {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderListResponse {
    pub data: Vec<Order>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u64,
    pub has_more: bool,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

pub async fn create_order(
    State(state): State<AppState>,
    Json(payload): Json<CreateOrderPayload>,
) -> Result<(StatusCode, Json<Order>), ErrorResponse> {
    let order = build_order(&state, payload).await.map_err(error_response)?;

    state
        .orders
        .create(&order)
        .await
        .map_err(|e| error_response(repository_error(e)))?;

    info!(
        event_name = "orders.created",
        order_id = %order.id.0,
        item_count = order.items.len(),
        grand_total = %order.totals.grand_total,
        "order created"
    );
    Ok((StatusCode::CREATED, Json(order)))
}

/// Assembles the complete order in memory. Items are processed sequentially in
/// payload order and any failure aborts before a single row is written.
async fn build_order(
    state: &AppState,
    payload: CreateOrderPayload,
) -> Result<Order, ApplicationError> {
    let customer = validated_customer(payload.customer)?;
    if payload.items.is_empty() {
        return Err(ApplicationError::Validation("order items must not be empty".to_string()));
    }

    let mut items = Vec::with_capacity(payload.items.len());
    for item in payload.items {
        items.push(build_item(state, item).await?);
    }

    let totals = OrderTotals::from_items(
        &items,
        payload.discount_total.unwrap_or(Decimal::ZERO).max(Decimal::ZERO),
        payload.shipping_total.unwrap_or(Decimal::ZERO).max(Decimal::ZERO),
    );

    let now = Utc::now();
    Ok(Order {
        id: OrderId::generate(),
        status: OrderStatus::EnProceso,
        customer,
        items,
        notes: payload.notes,
        currency: payload.currency.unwrap_or(Currency::Ars),
        totals,
        status_history: vec![StatusChange { at: now, from: None, to: OrderStatus::EnProceso }],
        created_at: now,
        updated_at: now,
    })
}

fn validated_customer(payload: CustomerPayload) -> Result<Customer, ApplicationError> {
    let name = payload.name.trim().to_string();
    if name.is_empty() {
        return Err(ApplicationError::Validation("customer name is required".to_string()));
    }
    let phone = normalize_phone(&payload.phone);
    if phone.is_empty() {
        return Err(ApplicationError::Validation(
            "customer phone must contain at least one digit".to_string(),
        ));
    }
    Ok(Customer { name, phone, email: payload.email, doc_number: payload.doc_number })
}

async fn build_item(
    state: &AppState,
    payload: OrderItemPayload,
) -> Result<OrderItem, ApplicationError> {
    if payload.quantity == 0 {
        return Err(ApplicationError::Validation(format!(
            "quantity must be at least 1 for product {}",
            payload.product_id
        )));
    }

    let product = state
        .products
        .find_by_id(&ProductId(payload.product_id.clone()))
        .await
        .map_err(repository_error)?
        .ok_or_else(|| ApplicationError::ProductNotFound(payload.product_id.clone()))?;

    let unit_price = product.unit_price();
    let sub_total = unit_price * Decimal::from(payload.quantity);

    let financing = match payload.financing {
        Some(request) => {
            let plan = resolve_plan(state, &request).await?;
            let config = product.financing.as_ref();
            let down_pct =
                config.and_then(|c| c.down_pct).unwrap_or(state.default_down_pct);
            Some(FinancingSnapshot::build(
                &plan,
                sub_total,
                product.financing_mode(),
                config.and_then(|c| c.group_key.clone()),
                Some(down_pct),
            )?)
        }
        None => None,
    };

    let grand_total =
        financing.as_ref().map(|snap| snap.total_with_surcharge).unwrap_or(sub_total);

    Ok(OrderItem {
        product_id: product.id,
        product_title: product.title,
        category: product.category,
        subcategory: product.subcategory,
        unit_price,
        quantity: payload.quantity,
        financing,
        sub_total,
        grand_total,
    })
}

/// Resolves the referenced plan fresh from the repository: canonical id takes
/// precedence, legacy numeric code is the fallback. Client-supplied figures
/// are never used.
async fn resolve_plan(
    state: &AppState,
    request: &ItemFinancingPayload,
) -> Result<FinancingPlan, ApplicationError> {
    if let Some(id) = &request.plan_id {
        return state
            .plans
            .find_by_id(&PlanId(id.clone()))
            .await
            .map_err(repository_error)?
            .ok_or_else(|| ApplicationError::PlanNotFound { reference: id.clone() });
    }
    if let Some(code) = request.code {
        return state
            .plans
            .find_by_code(code)
            .await
            .map_err(repository_error)?
            .ok_or_else(|| ApplicationError::PlanNotFound { reference: format!("code {code}") });
    }
    Err(ApplicationError::Validation(
        "item financing requires a planId or a legacy code".to_string(),
    ))
}

pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Order>, ErrorResponse> {
    let order = state
        .orders
        .find_by_id(&OrderId(id.clone()))
        .await
        .map_err(|e| error_response(repository_error(e)))?
        .ok_or_else(|| error_response(ApplicationError::OrderNotFound(id)))?;
    Ok(Json(order))
}

pub async fn patch_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<PatchOrderPayload>,
) -> Result<Json<Order>, ErrorResponse> {
    let mut order = state
        .orders
        .find_by_id(&OrderId(id.clone()))
        .await
        .map_err(|e| error_response(repository_error(e)))?
        .ok_or_else(|| error_response(ApplicationError::OrderNotFound(id.clone())))?;

    let now = Utc::now();

    if let Some(status) = &payload.status {
        let next: OrderStatus = status
            .parse()
            .map_err(|e: financia_core::errors::DomainError| {
                error_response(ApplicationError::Domain(e))
            })?;
        order.set_status(next, now);
    }
    if let Some(notes) = payload.notes {
        order.notes = Some(notes);
        order.updated_at = now;
    }
    if let Some(customer) = payload.customer {
        apply_customer_patch(&mut order, customer).map_err(error_response)?;
        order.updated_at = now;
    }

    let updated = state
        .orders
        .update(&order)
        .await
        .map_err(|e| error_response(repository_error(e)))?;
    if !updated {
        return Err(error_response(ApplicationError::OrderNotFound(id)));
    }

    info!(
        event_name = "orders.updated",
        order_id = %order.id.0,
        status = order.status.as_str(),
        "order updated"
    );
    Ok(Json(order))
}

fn apply_customer_patch(
    order: &mut Order,
    patch: CustomerPatchPayload,
) -> Result<(), ApplicationError> {
    if let Some(name) = patch.name {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ApplicationError::Validation("customer name is required".to_string()));
        }
        order.customer.name = name;
    }
    if let Some(phone) = patch.phone {
        let phone = normalize_phone(&phone);
        if phone.is_empty() {
            return Err(ApplicationError::Validation(
                "customer phone must contain at least one digit".to_string(),
            ));
        }
        order.customer.phone = phone;
    }
    if let Some(email) = patch.email {
        order.customer.email = Some(email);
    }
    if let Some(doc_number) = patch.doc_number {
        order.customer.doc_number = Some(doc_number);
    }
    Ok(())
}

pub async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<OrderListResponse>, ErrorResponse> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<OrderStatus>)
        .transpose()
        .map_err(|e| error_response(ApplicationError::Domain(e)))?;

    let filter = OrderListFilter {
        phone_prefix: query
            .phone
            .as_deref()
            .map(normalize_phone)
            .filter(|prefix| !prefix.is_empty()),
        status,
        created_from: parse_date("from", query.from.as_deref()).map_err(error_response)?,
        created_to: parse_date("to", query.to.as_deref()).map_err(error_response)?,
    };
    let pagination = Pagination {
        page: query.page.unwrap_or(1),
        page_size: query.page_size.unwrap_or(20),
    };

    let page = state
        .orders
        .list(filter, pagination)
        .await
        .map_err(|e| error_response(repository_error(e)))?;

    Ok(Json(OrderListResponse {
        data: page.data,
        page: page.page,
        page_size: page.page_size,
        total: page.total,
        total_pages: page.total_pages,
        has_more: page.has_more,
    }))
}

fn parse_date(
    field: &str,
    value: Option<&str>,
) -> Result<Option<DateTime<Utc>>, ApplicationError> {
    value
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| ApplicationError::Validation(format!("invalid {field} date: {e}")))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::{Path, Query, State};
    use axum::http::StatusCode;
    use axum::Json;
    use rust_decimal_macros::dec;

    use financia_core::domain::order::OrderStatus;
    use financia_core::domain::plan::{FinancingPlan, PlanId};
    use financia_core::domain::product::{
        FinancingMode, Product, ProductFinancingConfig, ProductId,
    };
    use financia_db::repositories::{
        InMemoryGroupRepository, InMemoryOrderRepository, InMemoryPlanRepository,
        InMemoryProductRepository,
    };

    use super::*;
    use crate::bootstrap::AppState;

    fn plan(id: &str, code: Option<i64>, months: u32, surcharge_pct: rust_decimal::Decimal) -> FinancingPlan {
        FinancingPlan {
            id: PlanId(id.to_string()),
            code,
            description: format!("{months} CUOTAS"),
            months,
            surcharge_pct,
            group_key: None,
            active: true,
            min_price: None,
            max_price: None,
            include_categories: vec![],
            exclude_categories: vec![],
        }
    }

    fn product(id: &str, price: rust_decimal::Decimal) -> Product {
        Product {
            id: ProductId(id.to_string()),
            title: format!("Producto {id}"),
            description: None,
            price,
            sales_price: None,
            category: "bicicletas".to_string(),
            subcategory: None,
            stock: 10,
            financing: None,
        }
    }

    struct TestHarness {
        state: AppState,
        orders: Arc<InMemoryOrderRepository>,
    }

    fn harness(plans: Vec<FinancingPlan>, products: Vec<Product>) -> TestHarness {
        let orders = Arc::new(InMemoryOrderRepository::new());
        let state = AppState {
            plans: Arc::new(InMemoryPlanRepository::with_plans(plans)),
            groups: Arc::new(InMemoryGroupRepository::new()),
            products: Arc::new(InMemoryProductRepository::with_products(products)),
            orders: orders.clone(),
            default_down_pct: dec!(0.15),
        };
        TestHarness { state, orders }
    }

    fn payload(items: Vec<OrderItemPayload>) -> CreateOrderPayload {
        CreateOrderPayload {
            customer: CustomerPayload {
                name: "Ana García".to_string(),
                phone: "+54 9 381 123-4567".to_string(),
                email: None,
                doc_number: None,
            },
            items,
            currency: None,
            notes: None,
            shipping_total: None,
            discount_total: None,
        }
    }

    fn financed_item(product_id: &str, quantity: u32, plan_id: &str) -> OrderItemPayload {
        OrderItemPayload {
            product_id: product_id.to_string(),
            quantity,
            financing: Some(ItemFinancingPayload {
                plan_id: Some(plan_id.to_string()),
                code: None,
            }),
        }
    }

    #[tokio::test]
    async fn creates_order_with_frozen_snapshot() {
        let h = harness(
            vec![plan("plan-6c", Some(2), 6, dec!(0.30))],
            vec![product("prod-1", dec!(50000))],
        );

        let (status, Json(order)) = create_order(
            State(h.state.clone()),
            Json(payload(vec![financed_item("prod-1", 2, "plan-6c")])),
        )
        .await
        .expect("create order");

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(order.status, OrderStatus::EnProceso);
        assert_eq!(order.customer.phone, "5493811234567");

        let snap = order.items[0].financing.as_ref().expect("snapshot");
        // Surcharge applies to the full line subtotal (2 * 50000).
        assert_eq!(snap.surcharge_amount, dec!(30000));
        assert_eq!(snap.total_with_surcharge, dec!(130000));
        assert_eq!(snap.installment_amount.round_dp(2), dec!(21666.67));
        assert_eq!(snap.plan_code, Some(2));
        assert_eq!(snap.down_pct, Some(dec!(0.15)));

        assert_eq!(order.totals.items_sub_total, dec!(100000));
        assert_eq!(order.totals.surcharge_total, dec!(30000));
        assert_eq!(order.totals.grand_total, dec!(130000));
        assert_eq!(order.status_history.len(), 1);
        assert_eq!(order.status_history[0].from, None);

        assert_eq!(h.orders.len(), 1);
    }

    #[tokio::test]
    async fn resolves_plan_by_legacy_code() {
        let h = harness(
            vec![plan("plan-3c", Some(1), 3, dec!(0.30))],
            vec![product("prod-1", dec!(100000))],
        );
        let item = OrderItemPayload {
            product_id: "prod-1".to_string(),
            quantity: 1,
            financing: Some(ItemFinancingPayload { plan_id: None, code: Some(1) }),
        };

        let (_, Json(order)) =
            create_order(State(h.state), Json(payload(vec![item]))).await.expect("create");
        let snap = order.items[0].financing.as_ref().expect("snapshot");
        assert_eq!(snap.plan_ref, Some(PlanId("plan-3c".to_string())));
        assert_eq!(snap.months, 3);
    }

    #[tokio::test]
    async fn unresolvable_plan_aborts_the_whole_order() {
        let h = harness(
            vec![plan("plan-6c", Some(2), 6, dec!(0.30))],
            vec![product("prod-1", dec!(50000)), product("prod-2", dec!(80000))],
        );

        let (status, Json(body)) = create_order(
            State(h.state),
            Json(payload(vec![
                financed_item("prod-1", 1, "plan-6c"),
                financed_item("prod-2", 1, "plan-ghost"),
            ])),
        )
        .await
        .expect_err("must fail");

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.error.contains("plan-ghost"));
        // Nothing was persisted: the first item never reached the repository.
        assert!(h.orders.is_empty());
    }

    #[tokio::test]
    async fn unknown_product_aborts_the_whole_order() {
        let h = harness(vec![], vec![]);

        let (status, _) = create_order(
            State(h.state),
            Json(payload(vec![OrderItemPayload {
                product_id: "prod-ghost".to_string(),
                quantity: 1,
                financing: None,
            }])),
        )
        .await
        .expect_err("must fail");

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(h.orders.is_empty());
    }

    #[tokio::test]
    async fn empty_items_are_rejected() {
        let h = harness(vec![], vec![]);
        let (status, _) =
            create_order(State(h.state), Json(payload(vec![]))).await.expect_err("must fail");
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn product_down_pct_override_lands_in_the_snapshot() {
        let mut on_promo = product("prod-1", dec!(100000));
        on_promo.financing = Some(ProductFinancingConfig {
            mode: FinancingMode::Override,
            group_key: Some("bikes".to_string()),
            down_pct: Some(dec!(0.25)),
            plan_ids: None,
        });
        let h = harness(vec![plan("plan-6c", None, 6, dec!(0.30))], vec![on_promo]);

        let (_, Json(order)) = create_order(
            State(h.state),
            Json(payload(vec![financed_item("prod-1", 1, "plan-6c")])),
        )
        .await
        .expect("create");

        let snap = order.items[0].financing.as_ref().expect("snapshot");
        assert_eq!(snap.down_pct, Some(dec!(0.25)));
        assert_eq!(snap.group_key.as_deref(), Some("bikes"));
        assert!(matches!(snap.mode_applied, FinancingMode::Override));
    }

    #[tokio::test]
    async fn patch_changes_status_and_appends_history() {
        let h = harness(
            vec![plan("plan-6c", None, 6, dec!(0.30))],
            vec![product("prod-1", dec!(50000))],
        );
        let (_, Json(order)) = create_order(
            State(h.state.clone()),
            Json(payload(vec![financed_item("prod-1", 1, "plan-6c")])),
        )
        .await
        .expect("create");

        let Json(updated) = patch_order(
            State(h.state.clone()),
            Path(order.id.0.clone()),
            Json(PatchOrderPayload {
                status: Some("vendido".to_string()),
                notes: Some("pagado en efectivo".to_string()),
                customer: None,
            }),
        )
        .await
        .expect("patch");

        assert_eq!(updated.status, OrderStatus::Vendido);
        assert_eq!(updated.notes.as_deref(), Some("pagado en efectivo"));
        assert_eq!(updated.status_history.len(), 2);
        assert_eq!(updated.status_history[1].from, Some(OrderStatus::EnProceso));
    }

    #[tokio::test]
    async fn patch_rejects_unknown_status() {
        let h = harness(
            vec![plan("plan-6c", None, 6, dec!(0.30))],
            vec![product("prod-1", dec!(50000))],
        );
        let (_, Json(order)) = create_order(
            State(h.state.clone()),
            Json(payload(vec![financed_item("prod-1", 1, "plan-6c")])),
        )
        .await
        .expect("create");

        let (status, _) = patch_order(
            State(h.state),
            Path(order.id.0),
            Json(PatchOrderPayload {
                status: Some("entregado".to_string()),
                notes: None,
                customer: None,
            }),
        )
        .await
        .expect_err("must reject");
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_order_is_not_found() {
        let h = harness(vec![], vec![]);
        let (status, _) = get_order(State(h.state), Path("ord-ghost".to_string()))
            .await
            .expect_err("must 404");
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_normalizes_the_phone_filter() {
        let h = harness(
            vec![plan("plan-6c", None, 6, dec!(0.30))],
            vec![product("prod-1", dec!(50000))],
        );
        create_order(
            State(h.state.clone()),
            Json(payload(vec![financed_item("prod-1", 1, "plan-6c")])),
        )
        .await
        .expect("create");

        let Json(listed) = list_orders(
            State(h.state),
            Query(OrderListQuery {
                page: None,
                page_size: None,
                phone: Some("+54 9 381".to_string()),
                status: None,
                from: None,
                to: None,
            }),
        )
        .await
        .expect("list");

        assert_eq!(listed.total, 1);
        assert_eq!(listed.data[0].customer.phone, "5493811234567");
    }

    #[tokio::test]
    async fn list_rejects_malformed_dates() {
        let h = harness(vec![], vec![]);
        let (status, _) = list_orders(
            State(h.state),
            Query(OrderListQuery {
                page: None,
                page_size: None,
                phone: None,
                status: None,
                from: Some("yesterday".to_string()),
                to: None,
            }),
        )
        .await
        .expect_err("must reject");
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use financia_core::domain::order::{
    Currency, Customer, FinancingSnapshot, Order, OrderId, OrderItem, OrderStatus, OrderTotals,
    StatusChange,
};
use financia_core::domain::plan::PlanId;
use financia_core::domain::product::{FinancingMode, ProductId};

use super::{
    parse_datetime, parse_decimal, OrderListFilter, OrderPage, OrderRepository, Pagination,
    RepositoryError,
};
use crate::DbPool;

pub struct SqlOrderRepository {
    pool: DbPool,
}

fn mode_to_str(mode: FinancingMode) -> &'static str {
    match mode {
        FinancingMode::Inherit => "inherit",
        FinancingMode::Override => "override",
        FinancingMode::Disabled => "disabled",
    }
}

fn mode_from_str(value: &str) -> Result<FinancingMode, RepositoryError> {
    match value {
        "inherit" => Ok(FinancingMode::Inherit),
        "override" => Ok(FinancingMode::Override),
        "disabled" => Ok(FinancingMode::Disabled),
        other => Err(RepositoryError::Decode(format!("unknown financing mode `{other}`"))),
    }
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Maps an `orders` row into an [`Order`] shell; items and history are
    /// loaded separately.
    fn order_from_row(row: &SqliteRow) -> Result<Order, RepositoryError> {
        let status = OrderStatus::from_str(&row.try_get::<String, _>("status")?)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;
        let currency = Currency::from_str(&row.try_get::<String, _>("currency")?)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        Ok(Order {
            id: OrderId(row.try_get("id")?),
            status,
            customer: Customer {
                name: row.try_get("customer_name")?,
                phone: row.try_get("customer_phone")?,
                email: row.try_get("customer_email")?,
                doc_number: row.try_get("customer_doc_number")?,
            },
            items: Vec::new(),
            notes: row.try_get("notes")?,
            currency,
            totals: OrderTotals {
                items_sub_total: parse_decimal(
                    "items_sub_total",
                    &row.try_get::<String, _>("items_sub_total")?,
                )?,
                surcharge_total: parse_decimal(
                    "surcharge_total",
                    &row.try_get::<String, _>("surcharge_total")?,
                )?,
                discount_total: parse_decimal(
                    "discount_total",
                    &row.try_get::<String, _>("discount_total")?,
                )?,
                shipping_total: parse_decimal(
                    "shipping_total",
                    &row.try_get::<String, _>("shipping_total")?,
                )?,
                grand_total: parse_decimal(
                    "grand_total",
                    &row.try_get::<String, _>("grand_total")?,
                )?,
            },
            status_history: Vec::new(),
            created_at: parse_datetime("created_at", &row.try_get::<String, _>("created_at")?)?,
            updated_at: parse_datetime("updated_at", &row.try_get::<String, _>("updated_at")?)?,
        })
    }

    fn item_from_row(row: &SqliteRow) -> Result<OrderItem, RepositoryError> {
        // A populated fin_months marks the presence of a frozen snapshot.
        let financing = match row.try_get::<Option<i64>, _>("fin_months")? {
            Some(months) => {
                let months = u32::try_from(months).map_err(|_| {
                    RepositoryError::Decode(format!("fin_months out of range: {months}"))
                })?;
                let mode = mode_from_str(
                    row.try_get::<Option<String>, _>("fin_mode_applied")?
                        .as_deref()
                        .unwrap_or("inherit"),
                )?;
                Some(FinancingSnapshot {
                    plan_ref: row.try_get::<Option<String>, _>("fin_plan_ref")?.map(PlanId),
                    mode_applied: mode,
                    group_key: row.try_get("fin_group_key")?,
                    plan_code: row.try_get("fin_plan_code")?,
                    months,
                    surcharge_pct: parse_decimal(
                        "fin_surcharge_pct",
                        &row.try_get::<String, _>("fin_surcharge_pct")?,
                    )?,
                    down_pct: row
                        .try_get::<Option<String>, _>("fin_down_pct")?
                        .map(|value| parse_decimal("fin_down_pct", &value))
                        .transpose()?,
                    surcharge_amount: parse_decimal(
                        "fin_surcharge_amount",
                        &row.try_get::<String, _>("fin_surcharge_amount")?,
                    )?,
                    total_with_surcharge: parse_decimal(
                        "fin_total_with_surcharge",
                        &row.try_get::<String, _>("fin_total_with_surcharge")?,
                    )?,
                    installment_amount: parse_decimal(
                        "fin_installment_amount",
                        &row.try_get::<String, _>("fin_installment_amount")?,
                    )?,
                })
            }
            None => None,
        };

        let quantity = row.try_get::<i64, _>("quantity")?;
        Ok(OrderItem {
            product_id: ProductId(row.try_get("product_id")?),
            product_title: row.try_get("product_title")?,
            category: row.try_get("category")?,
            subcategory: row.try_get("subcategory")?,
            unit_price: parse_decimal("unit_price", &row.try_get::<String, _>("unit_price")?)?,
            quantity: u32::try_from(quantity).map_err(|_| {
                RepositoryError::Decode(format!("quantity out of range: {quantity}"))
            })?,
            financing,
            sub_total: parse_decimal("sub_total", &row.try_get::<String, _>("sub_total")?)?,
            grand_total: parse_decimal("grand_total", &row.try_get::<String, _>("grand_total")?)?,
        })
    }

    fn history_from_row(row: &SqliteRow) -> Result<StatusChange, RepositoryError> {
        let from = row
            .try_get::<Option<String>, _>("from_status")?
            .map(|value| OrderStatus::from_str(&value))
            .transpose()
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;
        let to = OrderStatus::from_str(&row.try_get::<String, _>("to_status")?)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;
        Ok(StatusChange {
            at: parse_datetime("at", &row.try_get::<String, _>("at")?)?,
            from,
            to,
        })
    }

    async fn load_details(&self, order: &mut Order) -> Result<(), RepositoryError> {
        let item_rows =
            sqlx::query("SELECT * FROM order_items WHERE order_id = ? ORDER BY position ASC")
                .bind(&order.id.0)
                .fetch_all(&self.pool)
                .await?;
        order.items =
            item_rows.iter().map(Self::item_from_row).collect::<Result<Vec<_>, _>>()?;

        let history_rows = sqlx::query(
            "SELECT * FROM order_status_history WHERE order_id = ? ORDER BY id ASC",
        )
        .bind(&order.id.0)
        .fetch_all(&self.pool)
        .await?;
        order.status_history =
            history_rows.iter().map(Self::history_from_row).collect::<Result<Vec<_>, _>>()?;
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn create(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, status, customer_name, customer_phone, customer_email,
                customer_doc_number, notes, currency, items_sub_total,
                surcharge_total, discount_total, shipping_total, grand_total,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&order.id.0)
        .bind(order.status.as_str())
        .bind(&order.customer.name)
        .bind(&order.customer.phone)
        .bind(&order.customer.email)
        .bind(&order.customer.doc_number)
        .bind(&order.notes)
        .bind(order.currency.as_str())
        .bind(order.totals.items_sub_total.to_string())
        .bind(order.totals.surcharge_total.to_string())
        .bind(order.totals.discount_total.to_string())
        .bind(order.totals.shipping_total.to_string())
        .bind(order.totals.grand_total.to_string())
        .bind(order.created_at.to_rfc3339())
        .bind(order.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for (position, item) in order.items.iter().enumerate() {
            let snap = item.financing.as_ref();
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    order_id, position, product_id, product_title, category,
                    subcategory, unit_price, quantity, sub_total, grand_total,
                    fin_plan_ref, fin_mode_applied, fin_group_key, fin_plan_code,
                    fin_months, fin_surcharge_pct, fin_down_pct,
                    fin_surcharge_amount, fin_total_with_surcharge,
                    fin_installment_amount
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&order.id.0)
            .bind(position as i64)
            .bind(&item.product_id.0)
            .bind(&item.product_title)
            .bind(&item.category)
            .bind(&item.subcategory)
            .bind(item.unit_price.to_string())
            .bind(i64::from(item.quantity))
            .bind(item.sub_total.to_string())
            .bind(item.grand_total.to_string())
            .bind(snap.and_then(|s| s.plan_ref.as_ref().map(|p| p.0.clone())))
            .bind(snap.map(|s| mode_to_str(s.mode_applied)))
            .bind(snap.and_then(|s| s.group_key.clone()))
            .bind(snap.and_then(|s| s.plan_code))
            .bind(snap.map(|s| i64::from(s.months)))
            .bind(snap.map(|s| s.surcharge_pct.to_string()))
            .bind(snap.and_then(|s| s.down_pct.map(|d| d.to_string())))
            .bind(snap.map(|s| s.surcharge_amount.to_string()))
            .bind(snap.map(|s| s.total_with_surcharge.to_string()))
            .bind(snap.map(|s| s.installment_amount.to_string()))
            .execute(&mut *tx)
            .await?;
        }

        for change in &order.status_history {
            sqlx::query(
                "INSERT INTO order_status_history (order_id, at, from_status, to_status) VALUES (?, ?, ?, ?)",
            )
            .bind(&order.id.0)
            .bind(change.at.to_rfc3339())
            .bind(change.from.map(|s| s.as_str()))
            .bind(change.to.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };

        let mut order = Self::order_from_row(&row)?;
        self.load_details(&mut order).await?;
        Ok(Some(order))
    }

    /// Items are frozen at creation time and never rewritten here; only the
    /// mutable head of the order (status, customer, notes, totals) and the
    /// history trail are updated.
    async fn update(&self, order: &Order) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = ?, customer_name = ?, customer_phone = ?,
                customer_email = ?, customer_doc_number = ?, notes = ?,
                discount_total = ?, shipping_total = ?, grand_total = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(order.status.as_str())
        .bind(&order.customer.name)
        .bind(&order.customer.phone)
        .bind(&order.customer.email)
        .bind(&order.customer.doc_number)
        .bind(&order.notes)
        .bind(order.totals.discount_total.to_string())
        .bind(order.totals.shipping_total.to_string())
        .bind(order.totals.grand_total.to_string())
        .bind(order.updated_at.to_rfc3339())
        .bind(&order.id.0)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM order_status_history WHERE order_id = ?")
            .bind(&order.id.0)
            .execute(&mut *tx)
            .await?;
        for change in &order.status_history {
            sqlx::query(
                "INSERT INTO order_status_history (order_id, at, from_status, to_status) VALUES (?, ?, ?, ?)",
            )
            .bind(&order.id.0)
            .bind(change.at.to_rfc3339())
            .bind(change.from.map(|s| s.as_str()))
            .bind(change.to.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn list(
        &self,
        filter: OrderListFilter,
        pagination: Pagination,
    ) -> Result<OrderPage, RepositoryError> {
        let pagination = pagination.clamped();

        let mut count_builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) AS count FROM orders WHERE 1 = 1");
        let mut page_builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM orders WHERE 1 = 1");

        for builder in [&mut count_builder, &mut page_builder] {
            if let Some(prefix) = &filter.phone_prefix {
                builder.push(" AND customer_phone LIKE ");
                builder.push_bind(format!("{prefix}%"));
            }
            if let Some(status) = filter.status {
                builder.push(" AND status = ");
                builder.push_bind(status.as_str());
            }
            if let Some(from) = filter.created_from {
                builder.push(" AND created_at >= ");
                builder.push_bind(from.to_rfc3339());
            }
            if let Some(to) = filter.created_to {
                builder.push(" AND created_at <= ");
                builder.push_bind(to.to_rfc3339());
            }
        }

        let total = count_builder
            .build()
            .fetch_one(&self.pool)
            .await?
            .try_get::<i64, _>("count")?
            .max(0) as u64;

        page_builder.push(" ORDER BY created_at DESC LIMIT ");
        page_builder.push_bind(i64::from(pagination.page_size));
        page_builder.push(" OFFSET ");
        page_builder.push_bind(pagination.offset());

        let rows = page_builder.build().fetch_all(&self.pool).await?;
        let mut data = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut order = Self::order_from_row(row)?;
            self.load_details(&mut order).await?;
            data.push(order);
        }

        let total_pages = total.div_ceil(u64::from(pagination.page_size));
        let has_more = u64::from(pagination.page) < total_pages;

        Ok(OrderPage {
            data,
            page: pagination.page,
            page_size: pagination.page_size,
            total,
            total_pages,
            has_more,
        })
    }
}

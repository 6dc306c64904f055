use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::plan::{FinancingPlan, PlanId};
use crate::domain::product::{FinancingMode, ProductId};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn generate() -> Self {
        Self(format!("ord-{}", uuid::Uuid::new_v4()))
    }
}

/// Order lifecycle status. Transitions are deliberately permissive: admins may
/// move an order between any statuses for corrections, and every change is
/// recorded in the append-only history instead of being locked out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    EnProceso,
    Vendido,
    Cancelado,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EnProceso => "en_proceso",
            Self::Vendido => "vendido",
            Self::Cancelado => "cancelado",
        }
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "en_proceso" => Ok(Self::EnProceso),
            "vendido" => Ok(Self::Vendido),
            "cancelado" => Ok(Self::Cancelado),
            other => Err(DomainError::UnknownStatus(other.to_string())),
        }
    }
}

/// One entry in the append-only status trail. `from` is absent on the entry
/// written at creation time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub from: Option<OrderStatus>,
    pub to: OrderStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub name: String,
    /// Digits-only, normalized at the boundary.
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub doc_number: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Currency {
    #[serde(rename = "ARS")]
    Ars,
    #[serde(rename = "USD")]
    Usd,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ars => "ARS",
            Self::Usd => "USD",
        }
    }
}

impl std::str::FromStr for Currency {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "ARS" => Ok(Self::Ars),
            "USD" => Ok(Self::Usd),
            other => Err(DomainError::InvariantViolation(format!(
                "unsupported currency `{other}`"
            ))),
        }
    }
}

/// Immutable financing figures frozen onto an order item at creation time.
///
/// Once written this is never recomputed from the live plan: it is the record
/// of what the customer agreed to, and it survives later plan edits and hard
/// deletes (`plan_ref` may dangle).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancingSnapshot {
    #[serde(default)]
    pub plan_ref: Option<PlanId>,
    pub mode_applied: FinancingMode,
    #[serde(default)]
    pub group_key: Option<String>,
    #[serde(default)]
    pub plan_code: Option<i64>,
    pub months: u32,
    pub surcharge_pct: Decimal,
    #[serde(default)]
    pub down_pct: Option<Decimal>,
    pub surcharge_amount: Decimal,
    pub total_with_surcharge: Decimal,
    pub installment_amount: Decimal,
}

impl FinancingSnapshot {
    /// Freezes the financing figures for one order line.
    ///
    /// The surcharge applies to the full line subtotal; `down_pct` is carried
    /// as informational metadata about the product configuration in effect and
    /// does not reduce the financed base here. That matches the storefront's
    /// historical order math and must not drift from it.
    pub fn build(
        plan: &FinancingPlan,
        sub_total: Decimal,
        mode_applied: FinancingMode,
        group_key: Option<String>,
        down_pct: Option<Decimal>,
    ) -> Result<Self, DomainError> {
        if plan.months == 0 {
            return Err(DomainError::ArithmeticGuard {
                reason: format!("plan `{}` has zero months", plan.id.0),
            });
        }
        if plan.surcharge_pct < Decimal::ZERO {
            return Err(DomainError::ArithmeticGuard {
                reason: format!("plan `{}` has a negative surcharge", plan.id.0),
            });
        }

        let sub_total = sub_total.max(Decimal::ZERO);
        let surcharge_amount = sub_total * plan.surcharge_pct;
        let total_with_surcharge = sub_total + surcharge_amount;
        let installment_amount = total_with_surcharge / Decimal::from(plan.months);

        Ok(Self {
            plan_ref: Some(plan.id.clone()),
            mode_applied,
            group_key,
            plan_code: plan.code,
            months: plan.months,
            surcharge_pct: plan.surcharge_pct,
            down_pct,
            surcharge_amount,
            total_with_surcharge,
            installment_amount,
        })
    }
}

/// One order line with its point-in-time product and financing snapshots.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: ProductId,
    pub product_title: String,
    pub category: String,
    #[serde(default)]
    pub subcategory: Option<String>,
    pub unit_price: Decimal,
    pub quantity: u32,
    #[serde(default)]
    pub financing: Option<FinancingSnapshot>,
    pub sub_total: Decimal,
    pub grand_total: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotals {
    pub items_sub_total: Decimal,
    pub surcharge_total: Decimal,
    pub discount_total: Decimal,
    pub shipping_total: Decimal,
    pub grand_total: Decimal,
}

impl OrderTotals {
    pub fn from_items(items: &[OrderItem], discount_total: Decimal, shipping_total: Decimal) -> Self {
        let items_sub_total: Decimal = items.iter().map(|item| item.sub_total).sum();
        let surcharge_total: Decimal = items
            .iter()
            .filter_map(|item| item.financing.as_ref())
            .map(|snap| snap.surcharge_amount)
            .sum();

        Self {
            items_sub_total,
            surcharge_total,
            discount_total,
            shipping_total,
            grand_total: items_sub_total + surcharge_total - discount_total + shipping_total,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub status: OrderStatus,
    pub customer: Customer,
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub notes: Option<String>,
    pub currency: Currency,
    pub totals: OrderTotals,
    pub status_history: Vec<StatusChange>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Moves the order to `next`, appending a history entry. Setting the
    /// current status again is a no-op.
    pub fn set_status(&mut self, next: OrderStatus, at: DateTime<Utc>) {
        if self.status == next {
            return;
        }
        self.status_history.push(StatusChange { at, from: Some(self.status), to: next });
        self.status = next;
        self.updated_at = at;
    }
}

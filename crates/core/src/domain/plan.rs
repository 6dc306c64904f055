use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

/// Group key applied to plans that carry no explicit group. Plans in this
/// bucket are offered inside every group's quote.
pub const DEFAULT_GROUP_KEY: &str = "default";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlanId(pub String);

impl PlanId {
    pub fn generate() -> Self {
        Self(format!("plan-{}", uuid::Uuid::new_v4()))
    }
}

/// A single installment offer.
///
/// `code` is a legacy numeric identifier kept for backward compatibility with
/// historical orders; `id` is canonical. Plans are hard-deleted, so anything
/// that needs to survive a deletion must snapshot the plan's figures instead
/// of joining against it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancingPlan {
    pub id: PlanId,
    #[serde(default)]
    pub code: Option<i64>,
    pub description: String,
    pub months: u32,
    pub surcharge_pct: Decimal,
    #[serde(default)]
    pub group_key: Option<String>,
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

impl FinancingPlan {
    /// Checks the plan invariants: at least one installment and a
    /// non-negative surcharge.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.description.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "plan description must not be empty".to_string(),
            ));
        }
        if self.months == 0 {
            return Err(DomainError::InvariantViolation(
                "plan months must be at least 1".to_string(),
            ));
        }
        if self.surcharge_pct < Decimal::ZERO {
            return Err(DomainError::InvariantViolation(
                "plan surcharge_pct must not be negative".to_string(),
            ));
        }
        if let (Some(min), Some(max)) = (self.min_price, self.max_price) {
            if min > max {
                return Err(DomainError::InvariantViolation(
                    "plan min_price must not exceed max_price".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Effective group key, falling back to the implicit default bucket for
    /// ungrouped plans.
    pub fn effective_group_key(&self) -> &str {
        self.group_key.as_deref().unwrap_or(DEFAULT_GROUP_KEY)
    }
}

/// A named bucket of plans, selectable at the product level.
///
/// `FinancingPlan::group_key` references `key` by convention only; deleting a
/// group orphans its plans, which then behave as ungrouped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancingGroup {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub order: i64,
    pub active: bool,
}

impl FinancingGroup {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.key.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "group key must not be empty".to_string(),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "group name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::plan::{FinancingPlan, PlanId};

/// Global default down-payment fraction (15%) applied when the request does
/// not specify one.
pub fn default_down_pct() -> Decimal {
    Decimal::new(15, 2)
}

/// One computed installment option. Ephemeral: quote items are recomputed on
/// every request and never persisted standalone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteItem {
    pub plan_id: PlanId,
    #[serde(default)]
    pub code: Option<i64>,
    pub description: String,
    pub months: u32,
    pub surcharge_pct: Decimal,
    pub monthly: Decimal,
    pub total: Decimal,
    pub down_amount: Decimal,
    pub down_pct: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub price: Decimal,
    pub down_pct: Decimal,
    pub items: Vec<QuoteItem>,
}

/// Computes installment options for `price` across the given plans.
///
/// Per plan: `down = price * down_pct`, `balance = max(0, price - down)`,
/// `total = balance * (1 + surcharge_pct)`, `monthly = total / months`.
///
/// Inactive and zero-month plans are skipped rather than rejected: the quote
/// surface treats "nothing to offer" as a valid empty result. The returned
/// list is sorted by months ascending, then surcharge ascending; every
/// consumer relies on that ordering.
pub fn quote(price: Decimal, down_pct: Decimal, plans: &[FinancingPlan]) -> Vec<QuoteItem> {
    let down_amount = (price * down_pct).max(Decimal::ZERO);
    let balance = (price - down_amount).max(Decimal::ZERO);

    let mut items: Vec<QuoteItem> = plans
        .iter()
        .filter(|plan| plan.active && plan.months > 0 && plan.surcharge_pct >= Decimal::ZERO)
        .map(|plan| {
            let total = balance * (Decimal::ONE + plan.surcharge_pct);
            QuoteItem {
                plan_id: plan.id.clone(),
                code: plan.code,
                description: plan.description.clone(),
                months: plan.months,
                surcharge_pct: plan.surcharge_pct,
                monthly: total / Decimal::from(plan.months),
                total,
                down_amount,
                down_pct,
            }
        })
        .collect();

    sort_items(&mut items);
    items
}

/// Shortest term first, cheapest surcharge as tiebreak.
pub fn sort_items(items: &mut [QuoteItem]) {
    items.sort_by(|a, b| {
        a.months.cmp(&b.months).then_with(|| a.surcharge_pct.cmp(&b.surcharge_pct))
    });
}

/// Best-per-term reduction: keeps only the lowest-surcharge option for each
/// distinct number of installments. Used by the "best offers" views (card
/// preview, compact selector); admin listings show the raw set instead.
pub fn dedupe_best(items: &[QuoteItem]) -> Vec<QuoteItem> {
    let mut best: Vec<QuoteItem> = Vec::new();
    for item in items {
        match best.iter_mut().find(|kept| kept.months == item.months) {
            Some(kept) => {
                if item.surcharge_pct < kept.surcharge_pct {
                    *kept = item.clone();
                }
            }
            None => best.push(item.clone()),
        }
    }
    sort_items(&mut best);
    best
}

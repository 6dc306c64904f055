use rust_decimal::Decimal;

use crate::domain::plan::{FinancingPlan, PlanId};
use crate::quoting::engine::{self, QuoteResponse};

/// Hardcoded mirror of the representative plan set, used by presentation
/// widgets when the plan repository is unreachable so checkout is never
/// blocked by a backend outage.
///
/// Last-resort affordance only: figures computed from this table are shown to
/// the user but must never be persisted onto an order, and the synthetic ids
/// deliberately do not exist in the live repository.
pub fn fallback_plans() -> Vec<FinancingPlan> {
    let rows: [(i64, &str, u32, Decimal); 8] = [
        (1, "3 CUOTAS", 3, Decimal::new(30, 2)),
        (2, "6 CUOTAS", 6, Decimal::new(50, 2)),
        (5, "6 CUOTAS S/I", 6, Decimal::ZERO),
        (4, "PROMO 10 CUOTAS", 10, Decimal::new(30, 2)),
        (3, "12 CUOTAS", 12, Decimal::ONE),
        (10, "12 CUOTAS PRODUCTOS ALTO VALOR", 12, Decimal::new(50, 2)),
        (11, "CELU 18 CUOTAS + AURI", 18, Decimal::new(180, 2)),
        (6, "PROMO BICI 18 CUOTAS", 18, Decimal::new(9455, 4)),
    ];

    rows.into_iter()
        .map(|(code, description, months, surcharge_pct)| FinancingPlan {
            id: PlanId(format!("fallback-{code}")),
            code: Some(code),
            description: description.to_string(),
            months,
            surcharge_pct,
            group_key: None,
            active: true,
            min_price: None,
            max_price: None,
            include_categories: vec![],
            exclude_categories: vec![],
        })
        .collect()
}

/// Computes a quote from the hardcoded table through the identical engine,
/// ordering, and guard rules as a live quote.
pub fn local_quote(price: Decimal, down_pct: Decimal) -> QuoteResponse {
    let items = engine::quote(price, down_pct, &fallback_plans());
    QuoteResponse { price, down_pct, items }
}

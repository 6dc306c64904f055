use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::plan::{FinancingPlan, PlanId};
use crate::domain::product::{FinancingMode, Product};

/// What a caller knows about the thing being financed. The resolver applies
/// every plan constraint it can evaluate against this; constraints whose
/// context is absent (no category on a bare price quote) are not applied.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EligibilityRequest {
    pub price: Decimal,
    /// Explicit allow-list. Highest priority: when non-empty, group selection
    /// is ignored and membership is re-checked here even if the repository
    /// already filtered by id.
    #[serde(default)]
    pub plan_ids: Vec<PlanId>,
    #[serde(default)]
    pub group_key: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// Selects the candidate plans to quote.
///
/// Selection order: explicit `plan_ids` allow-list, else `group_key` (where
/// ungrouped plans are implicitly part of every group), else all active
/// plans. Per-plan min/max price bounds and category include/exclude lists
/// are enforced here for every call site, not left to presentation code.
pub fn select_candidates(
    plans: &[FinancingPlan],
    request: &EligibilityRequest,
) -> Vec<FinancingPlan> {
    plans
        .iter()
        .filter(|plan| plan.active)
        .filter(|plan| matches_selection(plan, request))
        .filter(|plan| within_price_bounds(plan, request.price))
        .filter(|plan| category_allowed(plan, request.category.as_deref()))
        .cloned()
        .collect()
}

/// Resolves a product's financing configuration into an eligibility request,
/// or `None` when the product offers no financing at all (`mode = disabled`,
/// or an override with an explicitly empty plan list).
pub fn product_request(product: &Product, price: Decimal) -> Option<EligibilityRequest> {
    let config = product.financing.as_ref();
    let mode = config.map(|c| c.mode).unwrap_or_default();

    let base = EligibilityRequest {
        price,
        plan_ids: vec![],
        group_key: None,
        category: Some(product.category.clone()),
    };

    match mode {
        FinancingMode::Disabled => None,
        FinancingMode::Inherit => Some(base),
        FinancingMode::Override => {
            let config = config?;
            match &config.plan_ids {
                Some(ids) if ids.is_empty() => None,
                Some(ids) => Some(EligibilityRequest { plan_ids: ids.clone(), ..base }),
                None => Some(EligibilityRequest { group_key: config.group_key.clone(), ..base }),
            }
        }
    }
}

fn matches_selection(plan: &FinancingPlan, request: &EligibilityRequest) -> bool {
    if !request.plan_ids.is_empty() {
        return request.plan_ids.contains(&plan.id);
    }
    if let Some(group_key) = &request.group_key {
        // Ungrouped plans are global: they show up in every group's quote.
        return plan.group_key.is_none() || plan.group_key.as_deref() == Some(group_key);
    }
    true
}

fn within_price_bounds(plan: &FinancingPlan, price: Decimal) -> bool {
    if let Some(min) = plan.min_price {
        if price < min {
            return false;
        }
    }
    if let Some(max) = plan.max_price {
        if price > max {
            return false;
        }
    }
    true
}

fn category_allowed(plan: &FinancingPlan, category: Option<&str>) -> bool {
    let Some(category) = category else {
        // Bare price quotes carry no category; category rules need one.
        return true;
    };
    if plan.exclude_categories.iter().any(|excluded| excluded == category) {
        return false;
    }
    if !plan.include_categories.is_empty() {
        return plan.include_categories.iter().any(|included| included == category);
    }
    true
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use crate::domain::plan::{FinancingPlan, PlanId};
    use crate::domain::product::{
        FinancingMode, Product, ProductFinancingConfig, ProductId,
    };

    use super::{product_request, select_candidates, EligibilityRequest};

    fn plan(id: &str, group_key: Option<&str>) -> FinancingPlan {
        FinancingPlan {
            id: PlanId(id.to_string()),
            code: None,
            description: format!("plan {id}"),
            months: 6,
            surcharge_pct: dec!(0.30),
            group_key: group_key.map(str::to_string),
            active: true,
            min_price: None,
            max_price: None,
            include_categories: vec![],
            exclude_categories: vec![],
        }
    }

    fn request(price: Decimal) -> EligibilityRequest {
        EligibilityRequest { price, plan_ids: vec![], group_key: None, category: None }
    }

    #[test]
    fn no_filter_selects_all_active_plans() {
        let mut inactive = plan("c", None);
        inactive.active = false;
        let plans = [plan("a", None), plan("b", Some("bikes")), inactive];

        let selected = select_candidates(&plans, &request(dec!(50000)));
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn plan_id_list_wins_over_group_and_ignores_grouping() {
        let plans = [plan("a", Some("bikes")), plan("b", Some("phones")), plan("c", None)];
        let req = EligibilityRequest {
            plan_ids: vec![PlanId("b".to_string())],
            group_key: Some("bikes".to_string()),
            ..request(dec!(50000))
        };

        let selected = select_candidates(&plans, &req);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, PlanId("b".to_string()));
    }

    #[test]
    fn plan_id_list_never_revives_inactive_plans() {
        let mut inactive = plan("a", None);
        inactive.active = false;
        let req = EligibilityRequest {
            plan_ids: vec![PlanId("a".to_string())],
            ..request(dec!(50000))
        };

        assert!(select_candidates(&[inactive], &req).is_empty());
    }

    #[test]
    fn group_query_includes_ungrouped_plans() {
        let plans = [plan("a", Some("bikes")), plan("b", Some("phones")), plan("c", None)];
        let req = EligibilityRequest { group_key: Some("bikes".to_string()), ..request(dec!(50000)) };

        let selected = select_candidates(&plans, &req);
        let ids: Vec<&str> = selected.iter().map(|p| p.id.0.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn price_bounds_are_enforced_centrally() {
        let mut bounded = plan("a", None);
        bounded.min_price = Some(dec!(10000));
        bounded.max_price = Some(dec!(200000));
        let plans = [bounded];

        assert!(select_candidates(&plans, &request(dec!(5000))).is_empty());
        assert_eq!(select_candidates(&plans, &request(dec!(150000))).len(), 1);
        assert!(select_candidates(&plans, &request(dec!(250000))).is_empty());
    }

    #[test]
    fn category_lists_are_enforced_when_category_is_known() {
        let mut restricted = plan("a", None);
        restricted.include_categories = vec!["bicicletas".to_string()];
        let mut banned = plan("b", None);
        banned.exclude_categories = vec!["celulares".to_string()];
        let plans = [restricted, banned];

        let bikes = EligibilityRequest {
            category: Some("bicicletas".to_string()),
            ..request(dec!(50000))
        };
        let candidates = select_candidates(&plans, &bikes);
        let ids: Vec<&str> = candidates.iter().map(|p| p.id.0.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["a", "b"]);

        let phones = EligibilityRequest {
            category: Some("celulares".to_string()),
            ..request(dec!(50000))
        };
        assert!(select_candidates(&plans, &phones).is_empty());

        // Without a category only the price bounds apply.
        assert_eq!(select_candidates(&plans, &request(dec!(50000))).len(), 2);
    }

    fn product(config: Option<ProductFinancingConfig>) -> Product {
        Product {
            id: ProductId("prod-1".to_string()),
            title: "Bicicleta".to_string(),
            description: None,
            price: dec!(100000),
            sales_price: None,
            category: "bicicletas".to_string(),
            subcategory: None,
            stock: 1,
            financing: config,
        }
    }

    #[test]
    fn disabled_mode_suppresses_financing() {
        let config = ProductFinancingConfig { mode: FinancingMode::Disabled, ..Default::default() };
        assert!(product_request(&product(Some(config)), dec!(100000)).is_none());
    }

    #[test]
    fn override_with_empty_plan_list_suppresses_financing() {
        let config = ProductFinancingConfig {
            mode: FinancingMode::Override,
            plan_ids: Some(vec![]),
            ..Default::default()
        };
        assert!(product_request(&product(Some(config)), dec!(100000)).is_none());
    }

    #[test]
    fn override_with_plan_list_requests_exactly_those_plans() {
        let config = ProductFinancingConfig {
            mode: FinancingMode::Override,
            plan_ids: Some(vec![PlanId("a".to_string())]),
            group_key: Some("bikes".to_string()),
            ..Default::default()
        };
        let req = product_request(&product(Some(config)), dec!(100000)).expect("request");
        assert_eq!(req.plan_ids, vec![PlanId("a".to_string())]);
        assert_eq!(req.group_key, None);
        assert_eq!(req.category.as_deref(), Some("bicicletas"));
    }

    #[test]
    fn override_without_plan_list_uses_the_group() {
        let config = ProductFinancingConfig {
            mode: FinancingMode::Override,
            group_key: Some("bikes".to_string()),
            ..Default::default()
        };
        let req = product_request(&product(Some(config)), dec!(100000)).expect("request");
        assert!(req.plan_ids.is_empty());
        assert_eq!(req.group_key.as_deref(), Some("bikes"));
    }

    #[test]
    fn inherit_and_missing_config_request_the_default_set() {
        for prod in [product(None), product(Some(ProductFinancingConfig::default()))] {
            let req = product_request(&prod, dec!(100000)).expect("request");
            assert!(req.plan_ids.is_empty());
            assert_eq!(req.group_key, None);
        }
    }
}

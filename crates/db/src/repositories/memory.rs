//! In-memory repositories for exercising orchestration without a database.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use financia_core::domain::order::{Order, OrderId};
use financia_core::domain::plan::{FinancingGroup, FinancingPlan, PlanId};
use financia_core::domain::product::{Product, ProductId};

use super::{
    BulkUpsertResult, GroupRepository, OrderListFilter, OrderPage, OrderRepository, Pagination,
    PlanFilter, PlanRepository, ProductRepository, RepositoryError,
};

fn acquire<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
pub struct InMemoryPlanRepository {
    plans: Mutex<Vec<FinancingPlan>>,
}

impl InMemoryPlanRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_plans(plans: Vec<FinancingPlan>) -> Self {
        Self { plans: Mutex::new(plans) }
    }
}

#[async_trait]
impl PlanRepository for InMemoryPlanRepository {
    async fn list(&self, filter: PlanFilter) -> Result<Vec<FinancingPlan>, RepositoryError> {
        let plans = acquire(&self.plans);
        let mut matched: Vec<FinancingPlan> = plans
            .iter()
            .filter(|plan| !filter.only_active || plan.active)
            .filter(|plan| {
                if !filter.plan_ids.is_empty() {
                    filter.plan_ids.contains(&plan.id)
                } else if let Some(group_key) = &filter.group_key {
                    plan.group_key.as_deref().is_none_or(|key| key == group_key)
                } else {
                    true
                }
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            a.months.cmp(&b.months).then(a.surcharge_pct.cmp(&b.surcharge_pct))
        });
        Ok(matched)
    }

    async fn find_by_id(&self, id: &PlanId) -> Result<Option<FinancingPlan>, RepositoryError> {
        Ok(acquire(&self.plans).iter().find(|plan| &plan.id == id).cloned())
    }

    async fn find_by_code(&self, code: i64) -> Result<Option<FinancingPlan>, RepositoryError> {
        Ok(acquire(&self.plans).iter().find(|plan| plan.code == Some(code)).cloned())
    }

    async fn create(&self, plan: FinancingPlan) -> Result<(), RepositoryError> {
        acquire(&self.plans).push(plan);
        Ok(())
    }

    async fn update(&self, plan: FinancingPlan) -> Result<bool, RepositoryError> {
        let mut plans = acquire(&self.plans);
        match plans.iter_mut().find(|existing| existing.id == plan.id) {
            Some(existing) => {
                *existing = plan;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: &PlanId) -> Result<bool, RepositoryError> {
        let mut plans = acquire(&self.plans);
        let before = plans.len();
        plans.retain(|plan| &plan.id != id);
        Ok(plans.len() < before)
    }

    async fn upsert_bulk(
        &self,
        incoming: Vec<FinancingPlan>,
    ) -> Result<BulkUpsertResult, RepositoryError> {
        let mut result = BulkUpsertResult::default();
        let mut plans = acquire(&self.plans);
        for mut plan in incoming {
            if plan.validate().is_err() {
                result.skipped += 1;
                continue;
            }
            let target = plans.iter_mut().find(|existing| match plan.code {
                Some(code) => existing.code == Some(code),
                None => {
                    existing.description == plan.description && existing.months == plan.months
                }
            });
            match target {
                Some(existing) => {
                    plan.id = existing.id.clone();
                    *existing = plan;
                }
                None => {
                    plan.id = PlanId::generate();
                    plans.push(plan);
                }
            }
            result.applied += 1;
        }
        Ok(result)
    }
}

#[derive(Default)]
pub struct InMemoryGroupRepository {
    groups: Mutex<Vec<FinancingGroup>>,
}

impl InMemoryGroupRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GroupRepository for InMemoryGroupRepository {
    async fn list(&self) -> Result<Vec<FinancingGroup>, RepositoryError> {
        let mut groups = acquire(&self.groups).clone();
        groups.sort_by(|a, b| {
            b.active
                .cmp(&a.active)
                .then(a.order.cmp(&b.order))
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(groups)
    }

    async fn create(&self, group: FinancingGroup) -> Result<(), RepositoryError> {
        acquire(&self.groups).push(group);
        Ok(())
    }

    async fn update(&self, group: FinancingGroup) -> Result<bool, RepositoryError> {
        let mut groups = acquire(&self.groups);
        match groups.iter_mut().find(|existing| existing.key == group.key) {
            Some(existing) => {
                *existing = group;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, RepositoryError> {
        let mut groups = acquire(&self.groups);
        let before = groups.len();
        groups.retain(|group| group.key != key);
        Ok(groups.len() < before)
    }
}

#[derive(Default)]
pub struct InMemoryProductRepository {
    products: Mutex<HashMap<ProductId, Product>>,
}

impl InMemoryProductRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: Vec<Product>) -> Self {
        let map = products.into_iter().map(|product| (product.id.clone(), product)).collect();
        Self { products: Mutex::new(map) }
    }
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn find_by_id(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(acquire(&self.products).get(id).cloned())
    }

    async fn save(&self, product: Product) -> Result<(), RepositoryError> {
        acquire(&self.products).insert(product.id.clone(), product);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: Mutex<Vec<Order>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        acquire(&self.orders).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn create(&self, order: &Order) -> Result<(), RepositoryError> {
        acquire(&self.orders).push(order.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(acquire(&self.orders).iter().find(|order| &order.id == id).cloned())
    }

    async fn update(&self, order: &Order) -> Result<bool, RepositoryError> {
        let mut orders = acquire(&self.orders);
        match orders.iter_mut().find(|existing| existing.id == order.id) {
            Some(existing) => {
                *existing = order.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list(
        &self,
        filter: OrderListFilter,
        pagination: Pagination,
    ) -> Result<OrderPage, RepositoryError> {
        let pagination = pagination.clamped();
        let orders = acquire(&self.orders);
        let mut matched: Vec<Order> = orders
            .iter()
            .filter(|order| {
                filter
                    .phone_prefix
                    .as_deref()
                    .is_none_or(|prefix| order.customer.phone.starts_with(prefix))
            })
            .filter(|order| filter.status.is_none_or(|status| order.status == status))
            .filter(|order| filter.created_from.is_none_or(|from| order.created_at >= from))
            .filter(|order| filter.created_to.is_none_or(|to| order.created_at <= to))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = matched.len() as u64;
        let total_pages = total.div_ceil(u64::from(pagination.page_size));
        let data: Vec<Order> = matched
            .into_iter()
            .skip(pagination.offset() as usize)
            .take(pagination.page_size as usize)
            .collect();

        Ok(OrderPage {
            data,
            page: pagination.page,
            page_size: pagination.page_size,
            total,
            total_pages,
            has_more: u64::from(pagination.page) < total_pages,
        })
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use financia_core::domain::order::{Order, OrderId, OrderStatus};
use financia_core::domain::plan::{FinancingGroup, FinancingPlan, PlanId};
use financia_core::domain::product::{Product, ProductId};

pub mod group;
pub mod memory;
pub mod order;
pub mod plan;
pub mod product;

pub use group::SqlGroupRepository;
pub use memory::{
    InMemoryGroupRepository, InMemoryOrderRepository, InMemoryPlanRepository,
    InMemoryProductRepository,
};
pub use order::SqlOrderRepository;
pub use plan::SqlPlanRepository;
pub use product::SqlProductRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Filter for plan listings. When `plan_ids` is non-empty it takes priority
/// and the group key is ignored; a group key also matches ungrouped plans.
#[derive(Clone, Debug, Default)]
pub struct PlanFilter {
    pub plan_ids: Vec<PlanId>,
    pub group_key: Option<String>,
    pub only_active: bool,
}

/// Outcome of a bulk plan upsert. Rows are applied independently; a bad row
/// never blocks the rest of the batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BulkUpsertResult {
    pub applied: u64,
    pub skipped: u64,
}

#[async_trait]
pub trait PlanRepository: Send + Sync {
    async fn list(&self, filter: PlanFilter) -> Result<Vec<FinancingPlan>, RepositoryError>;
    async fn find_by_id(&self, id: &PlanId) -> Result<Option<FinancingPlan>, RepositoryError>;
    async fn find_by_code(&self, code: i64) -> Result<Option<FinancingPlan>, RepositoryError>;
    async fn create(&self, plan: FinancingPlan) -> Result<(), RepositoryError>;
    /// Returns false when no plan with the given id exists.
    async fn update(&self, plan: FinancingPlan) -> Result<bool, RepositoryError>;
    /// Hard delete. Historical orders keep their snapshots.
    async fn delete(&self, id: &PlanId) -> Result<bool, RepositoryError>;
    /// Upserts each row by legacy code when present, otherwise by
    /// (description, months). Invalid rows are skipped, the rest still apply.
    async fn upsert_bulk(&self, plans: Vec<FinancingPlan>)
        -> Result<BulkUpsertResult, RepositoryError>;
}

#[async_trait]
pub trait GroupRepository: Send + Sync {
    /// Active groups first, then by sort order, then by name.
    async fn list(&self) -> Result<Vec<FinancingGroup>, RepositoryError>;
    async fn create(&self, group: FinancingGroup) -> Result<(), RepositoryError>;
    async fn update(&self, group: FinancingGroup) -> Result<bool, RepositoryError>;
    async fn delete(&self, key: &str) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn find_by_id(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError>;
    async fn save(&self, product: Product) -> Result<(), RepositoryError>;
}

#[derive(Clone, Debug, Default)]
pub struct OrderListFilter {
    /// Normalized phone prefix match.
    pub phone_prefix: Option<String>,
    pub status: Option<OrderStatus>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, page_size: 20 }
    }
}

impl Pagination {
    pub fn clamped(self) -> Self {
        Self { page: self.page.max(1), page_size: self.page_size.clamp(1, 100) }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }
}

#[derive(Clone, Debug)]
pub struct OrderPage {
    pub data: Vec<Order>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
    pub total_pages: u64,
    pub has_more: bool,
}

pub(crate) fn parse_decimal(
    field: &str,
    value: &str,
) -> Result<rust_decimal::Decimal, RepositoryError> {
    use std::str::FromStr;
    rust_decimal::Decimal::from_str(value)
        .map_err(|error| RepositoryError::Decode(format!("invalid decimal for {field}: {error}")))
}

pub(crate) fn parse_datetime(field: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("invalid timestamp for {field}: {error}")))
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persists the complete order (items and history included) in a single
    /// transaction. Either the whole order is written or nothing is.
    async fn create(&self, order: &Order) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError>;
    /// Writes back a mutated order (status, notes, customer, history).
    async fn update(&self, order: &Order) -> Result<bool, RepositoryError>;
    async fn list(
        &self,
        filter: OrderListFilter,
        pagination: Pagination,
    ) -> Result<OrderPage, RepositoryError>;
}

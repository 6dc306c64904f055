pub mod config;
pub mod domain;
pub mod errors;
pub mod phone;
pub mod quoting;

pub use domain::order::{
    Currency, Customer, FinancingSnapshot, Order, OrderId, OrderItem, OrderStatus, OrderTotals,
    StatusChange,
};
pub use domain::plan::{FinancingGroup, FinancingPlan, PlanId, DEFAULT_GROUP_KEY};
pub use domain::product::{FinancingMode, Product, ProductFinancingConfig, ProductId};
pub use errors::{ApplicationError, DomainError};
pub use quoting::eligibility::{product_request, select_candidates, EligibilityRequest};
pub use quoting::engine::{default_down_pct, dedupe_best, quote, QuoteItem, QuoteResponse};
pub use quoting::fallback::{fallback_plans, local_quote};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::plan::PlanId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

impl ProductId {
    pub fn generate() -> Self {
        Self(format!("prod-{}", uuid::Uuid::new_v4()))
    }
}

/// How a product participates in financing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinancingMode {
    /// Use the global default plan set.
    #[default]
    Inherit,
    /// Use the product's own group or explicit plan list.
    Override,
    /// Never offer financing for this product.
    Disabled,
}

/// Per-product financing override, embedded in the product record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductFinancingConfig {
    #[serde(default)]
    pub mode: FinancingMode,
    #[serde(default)]
    pub group_key: Option<String>,
    #[serde(default)]
    pub down_pct: Option<Decimal>,
    /// Explicit allow-list for `mode = override`. `None` means "no list
    /// chosen, use the group"; `Some(vec![])` means "explicitly no plans yet"
    /// and suppresses financing entirely.
    #[serde(default)]
    pub plan_ids: Option<Vec<PlanId>>,
}

/// Catalog product, reduced to the fields order creation and quoting need.
///
/// The historical payloads carry both `price` and `sales_price`; the canonical
/// unit price is resolved once through [`Product::unit_price`] and aliases
/// never reach the computation layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub sales_price: Option<Decimal>,
    pub category: String,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub financing: Option<ProductFinancingConfig>,
}

impl Product {
    /// The price an order line is charged at: `sales_price` when present,
    /// otherwise `price`.
    pub fn unit_price(&self) -> Decimal {
        self.sales_price.unwrap_or(self.price)
    }

    pub fn financing_mode(&self) -> FinancingMode {
        self.financing.as_ref().map(|f| f.mode).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::{FinancingMode, Product, ProductId};

    fn product() -> Product {
        Product {
            id: ProductId("prod-1".to_string()),
            title: "Bicicleta rodado 29".to_string(),
            description: None,
            price: dec!(100000),
            sales_price: None,
            category: "bicicletas".to_string(),
            subcategory: None,
            stock: 3,
            financing: None,
        }
    }

    #[test]
    fn sales_price_wins_over_list_price() {
        let mut on_sale = product();
        on_sale.sales_price = Some(dec!(85000));
        assert_eq!(on_sale.unit_price(), dec!(85000));
        assert_eq!(product().unit_price(), dec!(100000));
    }

    #[test]
    fn missing_financing_config_means_inherit() {
        assert_eq!(product().financing_mode(), FinancingMode::Inherit);
    }
}

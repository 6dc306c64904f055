use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use financia_core::domain::product::{Product, ProductFinancingConfig, ProductId};

use super::{parse_decimal, ProductRepository, RepositoryError};
use crate::DbPool;

pub struct SqlProductRepository {
    pool: DbPool,
}

impl SqlProductRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn product_from_row(row: &SqliteRow) -> Result<Product, RepositoryError> {
        let financing = match row.try_get::<Option<String>, _>("financing_json")? {
            Some(json) => Some(serde_json::from_str::<ProductFinancingConfig>(&json).map_err(
                |error| RepositoryError::Decode(format!("invalid financing_json: {error}")),
            )?),
            None => None,
        };
        let sales_price = row
            .try_get::<Option<String>, _>("sales_price")?
            .map(|value| parse_decimal("sales_price", &value))
            .transpose()?;

        Ok(Product {
            id: ProductId(row.try_get("id")?),
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            price: parse_decimal("price", &row.try_get::<String, _>("price")?)?,
            sales_price,
            category: row.try_get("category")?,
            subcategory: row.try_get("subcategory")?,
            stock: row.try_get("stock")?,
            financing,
        })
    }
}

#[async_trait]
impl ProductRepository for SqlProductRepository {
    async fn find_by_id(&self, id: &ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM products WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::product_from_row).transpose()
    }

    async fn save(&self, product: Product) -> Result<(), RepositoryError> {
        let financing_json = product
            .financing
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|error| {
                RepositoryError::Decode(format!("cannot encode financing config: {error}"))
            })?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO products (
                id, title, description, price, sales_price, category, subcategory,
                stock, financing_json, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                title = excluded.title,
                description = excluded.description,
                price = excluded.price,
                sales_price = excluded.sales_price,
                category = excluded.category,
                subcategory = excluded.subcategory,
                stock = excluded.stock,
                financing_json = excluded.financing_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&product.id.0)
        .bind(&product.title)
        .bind(&product.description)
        .bind(product.price.to_string())
        .bind(product.sales_price.map(|value| value.to_string()))
        .bind(&product.category)
        .bind(&product.subcategory)
        .bind(product.stock)
        .bind(financing_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

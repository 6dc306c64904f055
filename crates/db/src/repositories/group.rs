use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use financia_core::domain::plan::FinancingGroup;

use super::{GroupRepository, RepositoryError};
use crate::DbPool;

pub struct SqlGroupRepository {
    pool: DbPool,
}

impl SqlGroupRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn group_from_row(row: &SqliteRow) -> Result<FinancingGroup, RepositoryError> {
        Ok(FinancingGroup {
            key: row.try_get("key")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            order: row.try_get("sort_order")?,
            active: row.try_get::<i64, _>("active")? != 0,
        })
    }
}

#[async_trait]
impl GroupRepository for SqlGroupRepository {
    async fn list(&self) -> Result<Vec<FinancingGroup>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT * FROM financing_groups ORDER BY active DESC, sort_order ASC, name ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::group_from_row).collect()
    }

    async fn create(&self, group: FinancingGroup) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO financing_groups (key, name, description, sort_order, active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&group.key)
        .bind(&group.name)
        .bind(&group.description)
        .bind(group.order)
        .bind(i64::from(group.active))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, group: FinancingGroup) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE financing_groups
            SET name = ?, description = ?, sort_order = ?, active = ?, updated_at = ?
            WHERE key = ?
            "#,
        )
        .bind(&group.name)
        .bind(&group.description)
        .bind(group.order)
        .bind(i64::from(group.active))
        .bind(Utc::now().to_rfc3339())
        .bind(&group.key)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deleting a group does not cascade to its plans: their group_key simply
    /// dangles and they fall back to default-group semantics.
    async fn delete(&self, key: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM financing_groups WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use financia_core::domain::plan::FinancingGroup;

    use super::SqlGroupRepository;
    use crate::repositories::{GroupRepository, PlanFilter, PlanRepository, SqlPlanRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn group(key: &str, name: &str, order: i64, active: bool) -> FinancingGroup {
        FinancingGroup {
            key: key.to_string(),
            name: name.to_string(),
            description: None,
            order,
            active,
        }
    }

    #[tokio::test]
    async fn list_orders_active_first_then_sort_order_then_name() {
        let pool = setup_pool().await;
        let repo = SqlGroupRepository::new(pool.clone());
        repo.create(group("z-old", "Viejas promos", 0, false)).await.expect("create");
        repo.create(group("bikes", "Bicicletas", 2, true)).await.expect("create");
        repo.create(group("phones", "Celulares", 1, true)).await.expect("create");

        let listed = repo.list().await.expect("list");
        let keys: Vec<&str> = listed.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["phones", "bikes", "z-old"]);
        pool.close().await;
    }

    #[tokio::test]
    async fn update_and_delete_report_row_presence() {
        let pool = setup_pool().await;
        let repo = SqlGroupRepository::new(pool.clone());
        repo.create(group("bikes", "Bicicletas", 0, true)).await.expect("create");

        let mut renamed = group("bikes", "Bicis", 5, true);
        renamed.description = Some("Promos de bicicletas".to_string());
        assert!(repo.update(renamed).await.expect("update"));
        assert!(!repo.update(group("ghost", "Nada", 0, true)).await.expect("update missing"));

        assert!(repo.delete("bikes").await.expect("delete"));
        assert!(!repo.delete("bikes").await.expect("second delete"));
        pool.close().await;
    }

    #[tokio::test]
    async fn deleting_a_group_leaves_its_plans_behind() {
        let pool = setup_pool().await;
        let groups = SqlGroupRepository::new(pool.clone());
        let plans = SqlPlanRepository::new(pool.clone());

        groups.create(group("bikes", "Bicicletas", 0, true)).await.expect("create group");
        let mut plan = financia_core::domain::plan::FinancingPlan {
            id: financia_core::domain::plan::PlanId("plan-1".to_string()),
            code: None,
            description: "6 CUOTAS".to_string(),
            months: 6,
            surcharge_pct: rust_decimal::Decimal::ZERO,
            group_key: Some("bikes".to_string()),
            active: true,
            min_price: None,
            max_price: None,
            include_categories: vec![],
            exclude_categories: vec![],
        };
        plan.validate().expect("valid plan");
        plans.create(plan).await.expect("create plan");

        assert!(groups.delete("bikes").await.expect("delete group"));

        let survivors = plans.list(PlanFilter::default()).await.expect("list plans");
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].group_key.as_deref(), Some("bikes"));
        pool.close().await;
    }
}

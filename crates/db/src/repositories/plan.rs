use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row};

use financia_core::domain::plan::{FinancingPlan, PlanId};

use super::{parse_decimal, BulkUpsertResult, PlanFilter, PlanRepository, RepositoryError};
use crate::DbPool;

pub struct SqlPlanRepository {
    pool: DbPool,
}

impl SqlPlanRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn plan_from_row(row: &SqliteRow) -> Result<FinancingPlan, RepositoryError> {
        let surcharge_text: String = row.try_get("surcharge_pct")?;
        let min_price_text: Option<String> = row.try_get("min_price")?;
        let max_price_text: Option<String> = row.try_get("max_price")?;
        let include_json: String = row.try_get("include_categories")?;
        let exclude_json: String = row.try_get("exclude_categories")?;
        let months_raw: i64 = row.try_get("months")?;
        let months = u32::try_from(months_raw).map_err(|_| {
            RepositoryError::Decode(format!("plan months `{months_raw}` does not fit in u32"))
        })?;

        Ok(FinancingPlan {
            id: PlanId(row.try_get("id")?),
            code: row.try_get("code")?,
            description: row.try_get("description")?,
            months,
            surcharge_pct: parse_decimal("surcharge_pct", &surcharge_text)?,
            group_key: row.try_get("group_key")?,
            active: row.try_get::<i64, _>("active")? != 0,
            min_price: min_price_text
                .as_deref()
                .map(|text| parse_decimal("min_price", text))
                .transpose()?,
            max_price: max_price_text
                .as_deref()
                .map(|text| parse_decimal("max_price", text))
                .transpose()?,
            include_categories: serde_json::from_str(&include_json).map_err(|error| {
                RepositoryError::Decode(format!("invalid include_categories: {error}"))
            })?,
            exclude_categories: serde_json::from_str(&exclude_json).map_err(|error| {
                RepositoryError::Decode(format!("invalid exclude_categories: {error}"))
            })?,
        })
    }

    async fn find_one(&self, sql: &str, bind: &str) -> Result<Option<FinancingPlan>, RepositoryError> {
        let row = sqlx::query(sql).bind(bind).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::plan_from_row).transpose()
    }

    async fn insert_plan(&self, plan: &FinancingPlan) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO financing_plans (
                id, code, description, months, surcharge_pct, group_key, active,
                min_price, max_price, include_categories, exclude_categories,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&plan.id.0)
        .bind(plan.code)
        .bind(&plan.description)
        .bind(i64::from(plan.months))
        .bind(plan.surcharge_pct.to_string())
        .bind(&plan.group_key)
        .bind(i64::from(plan.active))
        .bind(plan.min_price.map(|d| d.to_string()))
        .bind(plan.max_price.map(|d| d.to_string()))
        .bind(encode_categories(&plan.include_categories)?)
        .bind(encode_categories(&plan.exclude_categories)?)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_plan_row(&self, id: &PlanId, plan: &FinancingPlan) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE financing_plans SET
                code = ?, description = ?, months = ?, surcharge_pct = ?,
                group_key = ?, active = ?, min_price = ?, max_price = ?,
                include_categories = ?, exclude_categories = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(plan.code)
        .bind(&plan.description)
        .bind(i64::from(plan.months))
        .bind(plan.surcharge_pct.to_string())
        .bind(&plan.group_key)
        .bind(i64::from(plan.active))
        .bind(plan.min_price.map(|d| d.to_string()))
        .bind(plan.max_price.map(|d| d.to_string()))
        .bind(encode_categories(&plan.include_categories)?)
        .bind(encode_categories(&plan.exclude_categories)?)
        .bind(Utc::now().to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Locates the row a bulk upsert should overwrite: by legacy code when
    /// the incoming row carries one, otherwise the oldest row matching
    /// (description, months). That pair is a match key only, duplicates
    /// across groups are allowed.
    async fn find_upsert_target(
        &self,
        plan: &FinancingPlan,
    ) -> Result<Option<PlanId>, RepositoryError> {
        let row = match plan.code {
            Some(code) => {
                sqlx::query("SELECT id FROM financing_plans WHERE code = ?")
                    .bind(code)
                    .fetch_optional(&self.pool)
                    .await?
            }
            None => {
                sqlx::query(
                    "SELECT id FROM financing_plans WHERE description = ? AND months = ? \
                     ORDER BY created_at ASC LIMIT 1",
                )
                .bind(&plan.description)
                .bind(i64::from(plan.months))
                .fetch_optional(&self.pool)
                .await?
            }
        };
        Ok(row.map(|row| PlanId(row.get("id"))))
    }
}

fn encode_categories(categories: &[String]) -> Result<String, RepositoryError> {
    serde_json::to_string(categories)
        .map_err(|error| RepositoryError::Decode(format!("invalid categories: {error}")))
}

#[async_trait]
impl PlanRepository for SqlPlanRepository {
    async fn list(&self, filter: PlanFilter) -> Result<Vec<FinancingPlan>, RepositoryError> {
        let mut query = QueryBuilder::new("SELECT * FROM financing_plans WHERE 1 = 1");

        if filter.only_active {
            query.push(" AND active = 1");
        }
        if !filter.plan_ids.is_empty() {
            query.push(" AND id IN (");
            let mut separated = query.separated(", ");
            for id in &filter.plan_ids {
                separated.push_bind(&id.0);
            }
            query.push(")");
        } else if let Some(group_key) = &filter.group_key {
            query.push(" AND (group_key IS NULL OR group_key = ");
            query.push_bind(group_key);
            query.push(")");
        }
        // surcharge_pct is a TEXT decimal; compare numerically.
        query.push(" ORDER BY months ASC, CAST(surcharge_pct AS REAL) ASC");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(Self::plan_from_row).collect()
    }

    async fn find_by_id(&self, id: &PlanId) -> Result<Option<FinancingPlan>, RepositoryError> {
        self.find_one("SELECT * FROM financing_plans WHERE id = ?", &id.0).await
    }

    async fn find_by_code(&self, code: i64) -> Result<Option<FinancingPlan>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM financing_plans WHERE code = ?")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::plan_from_row).transpose()
    }

    async fn create(&self, plan: FinancingPlan) -> Result<(), RepositoryError> {
        self.insert_plan(&plan).await
    }

    async fn update(&self, plan: FinancingPlan) -> Result<bool, RepositoryError> {
        self.update_plan_row(&plan.id.clone(), &plan).await
    }

    async fn delete(&self, id: &PlanId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM financing_plans WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_bulk(
        &self,
        plans: Vec<FinancingPlan>,
    ) -> Result<BulkUpsertResult, RepositoryError> {
        let mut outcome = BulkUpsertResult::default();

        for mut plan in plans {
            if plan.validate().is_err() {
                outcome.skipped += 1;
                continue;
            }

            let applied = match self.find_upsert_target(&plan).await {
                Ok(Some(existing_id)) => {
                    let result = self.update_plan_row(&existing_id, &plan).await;
                    matches!(result, Ok(true))
                }
                Ok(None) => {
                    plan.id = PlanId::generate();
                    self.insert_plan(&plan).await.is_ok()
                }
                Err(_) => false,
            };

            if applied {
                outcome.applied += 1;
            } else {
                outcome.skipped += 1;
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use financia_core::domain::plan::{FinancingPlan, PlanId};

    use super::SqlPlanRepository;
    use crate::repositories::{PlanFilter, PlanRepository};
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn plan(id: &str, code: Option<i64>, months: u32, group_key: Option<&str>) -> FinancingPlan {
        FinancingPlan {
            id: PlanId(id.to_string()),
            code,
            description: format!("{months} CUOTAS {id}"),
            months,
            surcharge_pct: dec!(0.30),
            group_key: group_key.map(str::to_string),
            active: true,
            min_price: None,
            max_price: None,
            include_categories: vec![],
            exclude_categories: vec![],
        }
    }

    #[tokio::test]
    async fn create_and_lookup_by_id_and_code() {
        let pool = setup_pool().await;
        let repo = SqlPlanRepository::new(pool.clone());

        let mut created = plan("plan-1", Some(7), 6, Some("bikes"));
        created.min_price = Some(dec!(10000));
        created.include_categories = vec!["bicicletas".to_string()];
        repo.create(created.clone()).await.expect("create plan");

        let by_id = repo
            .find_by_id(&PlanId("plan-1".to_string()))
            .await
            .expect("find by id")
            .expect("plan exists");
        assert_eq!(by_id, created);

        let by_code = repo.find_by_code(7).await.expect("find by code").expect("plan exists");
        assert_eq!(by_code.id, created.id);

        assert!(repo.find_by_code(99).await.expect("find by code").is_none());
        pool.close().await;
    }

    #[tokio::test]
    async fn list_filters_by_id_list_then_group_with_ungrouped_fallback() {
        let pool = setup_pool().await;
        let repo = SqlPlanRepository::new(pool.clone());
        repo.create(plan("plan-a", None, 3, Some("bikes"))).await.expect("create");
        repo.create(plan("plan-b", None, 6, Some("phones"))).await.expect("create");
        repo.create(plan("plan-c", None, 12, None)).await.expect("create");

        let by_group = repo
            .list(PlanFilter {
                group_key: Some("bikes".to_string()),
                only_active: true,
                ..PlanFilter::default()
            })
            .await
            .expect("list by group");
        let ids: Vec<&str> = by_group.iter().map(|p| p.id.0.as_str()).collect();
        assert_eq!(ids, vec!["plan-a", "plan-c"]);

        let by_ids = repo
            .list(PlanFilter {
                plan_ids: vec![PlanId("plan-b".to_string())],
                group_key: Some("bikes".to_string()),
                only_active: true,
            })
            .await
            .expect("list by ids");
        assert_eq!(by_ids.len(), 1);
        assert_eq!(by_ids[0].id.0, "plan-b");

        pool.close().await;
    }

    #[tokio::test]
    async fn same_term_plans_may_exist_in_different_groups() {
        let pool = setup_pool().await;
        let repo = SqlPlanRepository::new(pool.clone());

        let mut bikes = plan("plan-bikes", None, 12, Some("bikes"));
        bikes.description = "12 CUOTAS".to_string();
        let mut phones = plan("plan-phones", None, 12, Some("phones"));
        phones.description = "12 CUOTAS".to_string();

        repo.create(bikes).await.expect("create bikes plan");
        repo.create(phones).await.expect("create phones plan");

        let all = repo.list(PlanFilter::default()).await.expect("list");
        assert_eq!(all.len(), 2);
        pool.close().await;
    }

    #[tokio::test]
    async fn listing_orders_surcharge_numerically_not_lexically() {
        let pool = setup_pool().await;
        let repo = SqlPlanRepository::new(pool.clone());

        let mut steep = plan("plan-steep", None, 12, None);
        steep.surcharge_pct = dec!(10.0);
        let mut mild = plan("plan-mild", None, 12, None);
        mild.surcharge_pct = dec!(2.0);
        repo.create(steep).await.expect("create");
        repo.create(mild).await.expect("create");

        let listed = repo.list(PlanFilter::default()).await.expect("list");
        let ids: Vec<&str> = listed.iter().map(|p| p.id.0.as_str()).collect();
        assert_eq!(ids, vec!["plan-mild", "plan-steep"]);
        pool.close().await;
    }

    #[tokio::test]
    async fn inactive_plans_are_hidden_from_active_listings() {
        let pool = setup_pool().await;
        let repo = SqlPlanRepository::new(pool.clone());
        let mut inactive = plan("plan-off", None, 6, None);
        inactive.active = false;
        repo.create(inactive).await.expect("create");

        let active = repo
            .list(PlanFilter { only_active: true, ..PlanFilter::default() })
            .await
            .expect("list active");
        assert!(active.is_empty());

        let all = repo.list(PlanFilter::default()).await.expect("list all");
        assert_eq!(all.len(), 1);
        pool.close().await;
    }

    #[tokio::test]
    async fn update_and_delete_report_row_presence() {
        let pool = setup_pool().await;
        let repo = SqlPlanRepository::new(pool.clone());
        repo.create(plan("plan-1", None, 6, None)).await.expect("create");

        let mut changed = plan("plan-1", Some(3), 6, None);
        changed.surcharge_pct = dec!(0.50);
        assert!(repo.update(changed).await.expect("update"));

        let reloaded = repo
            .find_by_id(&PlanId("plan-1".to_string()))
            .await
            .expect("reload")
            .expect("exists");
        assert_eq!(reloaded.surcharge_pct, dec!(0.50));
        assert_eq!(reloaded.code, Some(3));

        assert!(repo.delete(&PlanId("plan-1".to_string())).await.expect("delete"));
        assert!(!repo.delete(&PlanId("plan-1".to_string())).await.expect("second delete"));
        assert!(!repo.update(plan("plan-ghost", None, 6, None)).await.expect("update missing"));
        pool.close().await;
    }

    #[tokio::test]
    async fn bulk_upsert_matches_by_code_then_description_and_months() {
        let pool = setup_pool().await;
        let repo = SqlPlanRepository::new(pool.clone());

        let mut seed = plan("plan-1", Some(2), 6, None);
        seed.description = "6 CUOTAS".to_string();
        repo.create(seed).await.expect("create");

        let mut by_code = plan("ignored-id", Some(2), 6, None);
        by_code.description = "6 CUOTAS".to_string();
        by_code.surcharge_pct = dec!(0.45);

        let mut fresh = plan("ignored-id-2", None, 10, None);
        fresh.description = "PROMO 10 CUOTAS".to_string();

        let outcome =
            repo.upsert_bulk(vec![by_code, fresh]).await.expect("bulk upsert");
        assert_eq!(outcome.applied, 2);
        assert_eq!(outcome.skipped, 0);

        // The existing row was updated in place, not duplicated.
        let all = repo.list(PlanFilter::default()).await.expect("list");
        assert_eq!(all.len(), 2);
        let updated = repo.find_by_code(2).await.expect("find").expect("exists");
        assert_eq!(updated.id.0, "plan-1");
        assert_eq!(updated.surcharge_pct, dec!(0.45));
        pool.close().await;
    }

    #[tokio::test]
    async fn bulk_upsert_skips_invalid_rows_and_continues() {
        let pool = setup_pool().await;
        let repo = SqlPlanRepository::new(pool.clone());

        let mut invalid = plan("bad", None, 6, None);
        invalid.months = 0;
        let valid = plan("good", None, 12, None);

        let outcome = repo.upsert_bulk(vec![invalid, valid]).await.expect("bulk upsert");
        assert_eq!(outcome.applied, 1);
        assert_eq!(outcome.skipped, 1);

        let all = repo.list(PlanFilter::default()).await.expect("list");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].months, 12);
        pool.close().await;
    }
}

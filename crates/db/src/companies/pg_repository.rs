use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Postgres, QueryBuilder, Row};

use crate::companies::models::{Company, CompanySearch, NewCompany, SearchType};
use crate::companies::repositories::{CompanyQueryRepository, CompanyRepository};
use compsync_common::error::{CompsyncError, CompsyncResult};

const COMPANY_COLUMNS: &str = "id, company_name, owner, company_desc, address, \
     create_time, update_time, code, uuid, last_sync_at, is_active";

const FTS_DOCUMENT: &str = "to_tsvector('simple', \
     company_name || ' ' || coalesce(owner, '') || ' ' || coalesce(address, ''))";

#[derive(Clone)]
pub struct PgCompanyRepository {
    pool: PgPool,
}

impl PgCompanyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn map_row(row: PgRow) -> Company {
        Company {
            id: row.get("id"),
            company_name: row.get("company_name"),
            owner: row.get("owner"),
            company_desc: row.get("company_desc"),
            address: row.get("address"),
            create_time: row.get("create_time"),
            update_time: row.get("update_time"),
            code: row.get("code"),
            uuid: row.get("uuid"),
            last_sync_at: row.get("last_sync_at"),
            is_active: row.get("is_active"),
        }
    }
}

/// Escape `%`, `_` and `\` so user input matches literally under `ilike`.
fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

fn push_search_filter(qb: &mut QueryBuilder<'_, Postgres>, search: &CompanySearch) {
    qb.push(" where is_active = true");

    let query = search.query.trim();
    if query.is_empty() {
        return;
    }

    match search.search_type {
        SearchType::Fts => {
            qb.push(" and ")
                .push(FTS_DOCUMENT)
                .push(" @@ plainto_tsquery('simple', ")
                .push_bind(query.to_owned())
                .push(")");
        }
        SearchType::Auto | SearchType::Like => {
            let pattern = format!("%{}%", escape_like(query));
            qb.push(" and (company_name ilike ")
                .push_bind(pattern.clone())
                .push(" or owner ilike ")
                .push_bind(pattern.clone())
                .push(" or address ilike ")
                .push_bind(pattern)
                .push(")");
        }
    }
}

#[async_trait]
impl CompanyRepository for PgCompanyRepository {
    async fn list_active(&self) -> CompsyncResult<Vec<Company>> {
        let rows = sqlx::query(&format!(
            "select {COMPANY_COLUMNS} from companies where is_active = true"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CompsyncError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Self::map_row).collect())
    }

    async fn insert_batch(
        &self,
        companies: &[NewCompany],
        synced_at: DateTime<Utc>,
    ) -> CompsyncResult<u64> {
        if companies.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CompsyncError::Database(e.to_string()))?;

        let mut qb = QueryBuilder::<Postgres>::new(
            "insert into companies (id, company_name, owner, company_desc, address, \
             create_time, update_time, code, uuid, last_sync_at, is_active) ",
        );
        qb.push_values(companies, |mut b, c| {
            b.push_bind(c.id)
                .push_bind(c.company_name.clone())
                .push_bind(c.owner.clone())
                .push_bind(c.company_desc.clone())
                .push_bind(c.address.clone())
                .push_bind(c.create_time)
                .push_bind(c.update_time)
                .push_bind(c.code.clone())
                .push_bind(c.uuid.clone())
                .push_bind(synced_at)
                .push_bind(true);
        });

        let result = qb
            .build()
            .execute(&mut *tx)
            .await
            .map_err(|e| CompsyncError::Database(format!("insert batch failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| CompsyncError::Database(e.to_string()))?;

        tracing::debug!(count = result.rows_affected(), "inserted companies");
        Ok(result.rows_affected())
    }

    async fn update_batch(
        &self,
        companies: &[NewCompany],
        synced_at: DateTime<Utc>,
    ) -> CompsyncResult<u64> {
        if companies.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CompsyncError::Database(e.to_string()))?;

        let mut updated = 0;
        for c in companies {
            let result = sqlx::query(
                "update companies
                 set company_name = $1, owner = $2, company_desc = $3, address = $4,
                     update_time = $5, code = $6, uuid = $7, last_sync_at = $8, is_active = true
                 where id = $9",
            )
            .bind(&c.company_name)
            .bind(&c.owner)
            .bind(&c.company_desc)
            .bind(&c.address)
            .bind(c.update_time)
            .bind(&c.code)
            .bind(&c.uuid)
            .bind(synced_at)
            .bind(c.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                CompsyncError::Database(format!("update of company {} failed: {e}", c.id))
            })?;

            if result.rows_affected() == 0 {
                // Dropping `tx` rolls back the rows already updated in this batch.
                return Err(CompsyncError::NotFound(format!(
                    "company {} vanished during update",
                    c.id
                )));
            }
            updated += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| CompsyncError::Database(e.to_string()))?;

        tracing::debug!(count = updated, "updated companies");
        Ok(updated)
    }
}

#[async_trait]
impl CompanyQueryRepository for PgCompanyRepository {
    async fn get_active_by_id(&self, id: i64) -> CompsyncResult<Option<Company>> {
        let row = sqlx::query(&format!(
            "select {COMPANY_COLUMNS} from companies where id = $1 and is_active = true"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CompsyncError::Database(e.to_string()))?;

        Ok(row.map(Self::map_row))
    }

    async fn search(&self, search: &CompanySearch) -> CompsyncResult<(Vec<Company>, i64)> {
        let mut count_qb = QueryBuilder::<Postgres>::new("select count(*) as cnt from companies");
        push_search_filter(&mut count_qb, search);
        let total: i64 = count_qb
            .build()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CompsyncError::Database(e.to_string()))?
            .get("cnt");

        let mut qb = QueryBuilder::<Postgres>::new(format!("select {COMPANY_COLUMNS} from companies"));
        push_search_filter(&mut qb, search);
        qb.push(" order by company_name, id");
        qb.push(" limit ").push_bind(search.page_size);
        qb.push(" offset ").push_bind(search.offset());

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CompsyncError::Database(e.to_string()))?;

        Ok((rows.into_iter().map(Self::map_row).collect(), total))
    }

    async fn record_search(
        &self,
        query: &str,
        result_count: i64,
        user_agent: Option<&str>,
    ) -> CompsyncResult<()> {
        sqlx::query(
            "insert into search_queries (query, result_count, user_agent) values ($1, $2, $3)",
        )
        .bind(query)
        .bind(result_count)
        .bind(user_agent)
        .execute(&self.pool)
        .await
        .map_err(|e| CompsyncError::Database(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations};

    async fn test_repo() -> Option<PgCompanyRepository> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = create_pool(&url).await.expect("db should connect");
        run_migrations(&pool).await.expect("migrations should apply");
        Some(PgCompanyRepository::new(pool))
    }

    /// Ids far from each other per test so parallel tests do not collide.
    fn company(id: i64, name: &str) -> NewCompany {
        NewCompany {
            id,
            company_name: name.to_string(),
            owner: Some("Zhang San".to_string()),
            company_desc: Some("widgets".to_string()),
            address: "1 Harbour Road".to_string(),
            create_time: Some(Utc::now()),
            update_time: Some(Utc::now()),
            code: Some("C-1".to_string()),
            uuid: None,
        }
    }

    async fn cleanup(repo: &PgCompanyRepository, ids: &[i64]) {
        sqlx::query("delete from companies where id = any($1)")
            .bind(ids)
            .execute(repo.pool())
            .await
            .expect("cleanup");
    }

    #[test]
    fn escape_like_escapes_wildcards() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[tokio::test]
    async fn insert_then_fetch_by_id() {
        let repo = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let ids = [9_100_001];
        cleanup(&repo, &ids).await;

        let written = repo
            .insert_batch(&[company(ids[0], "Insert Fetch Co")], Utc::now())
            .await
            .expect("insert");
        assert_eq!(written, 1);

        let row = repo
            .get_active_by_id(ids[0])
            .await
            .expect("get")
            .expect("row should exist");
        assert_eq!(row.company_name, "Insert Fetch Co");
        assert_eq!(row.address.as_deref(), Some("1 Harbour Road"));
        assert!(row.is_active);

        cleanup(&repo, &ids).await;
    }

    #[tokio::test]
    async fn insert_batch_is_all_or_nothing() {
        let repo = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let ids = [9_100_101, 9_100_102];
        cleanup(&repo, &ids).await;
        repo.insert_batch(&[company(ids[0], "Existing")], Utc::now())
            .await
            .expect("seed");

        // Second record duplicates the seeded id, so the whole batch must roll back.
        let err = repo
            .insert_batch(
                &[company(ids[1], "Fresh"), company(ids[0], "Duplicate")],
                Utc::now(),
            )
            .await;
        assert!(err.is_err());
        assert!(repo.get_active_by_id(ids[1]).await.expect("get").is_none());

        cleanup(&repo, &ids).await;
    }

    #[tokio::test]
    async fn update_batch_rewrites_fields() {
        let repo = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let ids = [9_100_201];
        cleanup(&repo, &ids).await;
        repo.insert_batch(&[company(ids[0], "Before")], Utc::now())
            .await
            .expect("seed");

        let mut changed = company(ids[0], "After");
        changed.owner = None;
        let updated = repo
            .update_batch(&[changed], Utc::now())
            .await
            .expect("update");
        assert_eq!(updated, 1);

        let row = repo.get_active_by_id(ids[0]).await.expect("get").unwrap();
        assert_eq!(row.company_name, "After");
        assert!(row.owner.is_none());

        cleanup(&repo, &ids).await;
    }

    #[tokio::test]
    async fn update_batch_rolls_back_on_missing_row() {
        let repo = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let ids = [9_100_301, 9_100_302];
        cleanup(&repo, &ids).await;
        repo.insert_batch(&[company(ids[0], "Stays")], Utc::now())
            .await
            .expect("seed");

        let result = repo
            .update_batch(
                &[company(ids[0], "Renamed"), company(ids[1], "Missing")],
                Utc::now(),
            )
            .await;
        assert!(result.is_err());

        let row = repo.get_active_by_id(ids[0]).await.expect("get").unwrap();
        assert_eq!(row.company_name, "Stays");

        cleanup(&repo, &ids).await;
    }

    #[tokio::test]
    async fn like_search_matches_owner_case_insensitively() {
        let repo = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let ids = [9_100_401, 9_100_402];
        cleanup(&repo, &ids).await;
        let mut a = company(ids[0], "Qxzlike Alpha");
        a.owner = Some("Qxzowner".to_string());
        let b = company(ids[1], "Unrelated Beta");
        repo.insert_batch(&[a, b], Utc::now()).await.expect("seed");

        let search = CompanySearch {
            query: "QXZOWNER".to_string(),
            search_type: SearchType::Like,
            page: 1,
            page_size: 10,
        };
        let (rows, total) = repo.search(&search).await.expect("search");
        assert_eq!(total, 1);
        assert_eq!(rows[0].id, ids[0]);

        cleanup(&repo, &ids).await;
    }

    #[tokio::test]
    async fn fts_search_matches_words() {
        let repo = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        let ids = [9_100_501];
        cleanup(&repo, &ids).await;
        repo.insert_batch(&[company(ids[0], "Zyxwv Holdings")], Utc::now())
            .await
            .expect("seed");

        let search = CompanySearch {
            query: "zyxwv".to_string(),
            search_type: SearchType::Fts,
            page: 1,
            page_size: 10,
        };
        let (rows, total) = repo.search(&search).await.expect("search");
        assert_eq!(total, 1);
        assert_eq!(rows[0].company_name, "Zyxwv Holdings");

        cleanup(&repo, &ids).await;
    }

    #[tokio::test]
    async fn record_search_inserts_row() {
        let repo = match test_repo().await {
            Some(r) => r,
            None => return,
        };
        repo.record_search("acme", 3, Some("test-agent"))
            .await
            .expect("record search");
    }
}

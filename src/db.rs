use anyhow::Context;
use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::models::{FilterOptions, Grant, Publication, ScholarCard, ScholarPage, ScholarRecord};
use crate::query::{total_pages, ScholarQuery, SqlValue, PAGE_SIZE};
use crate::store::{in_request_order, sorted_distinct, unique_ids, ScholarStore};

const RECORD_COLUMNS: &str = "id, name, title, email, department, position, should_email, \
     relevance_score, active_grants_count, tags, reasoning, requirements, \
     active_grants, expired_grants, publications";

const CARD_COLUMNS: &str = "id, name, title, department, position, should_email, \
     relevance_score, active_grants_count, tags, requirements, \
     jsonb_array_length(publications)::bigint AS publications_count";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("failed to connect to Postgres")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

pub async fn init_db(pool: &PgPool) -> AppResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Upserts scholars by id. With `replace` the collection is cleared first,
/// in the same transaction.
pub async fn import_records(
    pool: &PgPool,
    records: &[ScholarRecord],
    replace: bool,
) -> anyhow::Result<usize> {
    let mut tx = pool.begin().await?;

    if replace {
        let cleared = sqlx::query("DELETE FROM scholar_browser.scholars")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        info!(cleared, "cleared scholar collection");
    }

    let mut upserted = 0usize;
    for record in records {
        let result = sqlx::query(
            r#"
            INSERT INTO scholar_browser.scholars
            (id, name, title, email, department, position, should_email,
             relevance_score, active_grants_count, tags, reasoning, requirements,
             active_grants, expired_grants, publications)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                title = EXCLUDED.title,
                email = EXCLUDED.email,
                department = EXCLUDED.department,
                position = EXCLUDED.position,
                should_email = EXCLUDED.should_email,
                relevance_score = EXCLUDED.relevance_score,
                active_grants_count = EXCLUDED.active_grants_count,
                tags = EXCLUDED.tags,
                reasoning = EXCLUDED.reasoning,
                requirements = EXCLUDED.requirements,
                active_grants = EXCLUDED.active_grants,
                expired_grants = EXCLUDED.expired_grants,
                publications = EXCLUDED.publications,
                imported_at = now()
            "#,
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.title)
        .bind(&record.email)
        .bind(&record.department)
        .bind(&record.position)
        .bind(&record.should_email)
        .bind(record.relevance_score)
        .bind(record.active_grants_count)
        .bind(&record.tags)
        .bind(&record.reasoning)
        .bind(&record.requirements)
        .bind(Json(&record.active_grants))
        .bind(Json(&record.expired_grants))
        .bind(Json(&record.publications))
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to upsert scholar {}", record.id))?;

        if result.rows_affected() > 0 {
            upserted += 1;
        }
    }

    tx.commit().await?;
    Ok(upserted)
}

/// Single statement so the count and the page come from one snapshot.
pub fn list_sql(query: &ScholarQuery) -> (String, Vec<SqlValue>) {
    let mut filter = query.where_clause();
    let pagination = filter.paginate(PAGE_SIZE, query.offset());

    let sql = format!(
        "WITH matched AS (\
            SELECT {CARD_COLUMNS} FROM scholar_browser.scholars{where_sql}\
         ), page AS (\
            SELECT * FROM matched ORDER BY relevance_score DESC, id ASC{pagination}\
         ) \
         SELECT (SELECT COUNT(*) FROM matched) AS total, \
            COALESCE((SELECT json_agg(page ORDER BY relevance_score DESC, id ASC) FROM page), '[]'::json) AS data",
        where_sql = filter.sql,
    );

    (sql, filter.binds)
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    binds: Vec<SqlValue>,
) -> Query<'q, Postgres, PgArguments> {
    for value in binds {
        query = match value {
            SqlValue::Text(text) => query.bind(text),
            SqlValue::Int(int) => query.bind(int),
            SqlValue::BigInt(int) => query.bind(int),
            SqlValue::TextArray(values) => query.bind(values),
        };
    }
    query
}

fn row_to_record(row: &PgRow) -> Result<ScholarRecord, sqlx::Error> {
    let active_grants: Json<Vec<Grant>> = row.try_get("active_grants")?;
    let expired_grants: Json<Vec<Grant>> = row.try_get("expired_grants")?;
    let publications: Json<Vec<Publication>> = row.try_get("publications")?;

    Ok(ScholarRecord {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        title: row.try_get("title")?,
        email: row.try_get("email")?,
        department: row.try_get("department")?,
        position: row.try_get("position")?,
        should_email: row.try_get("should_email")?,
        relevance_score: row.try_get("relevance_score")?,
        active_grants_count: row.try_get("active_grants_count")?,
        tags: row.try_get("tags")?,
        reasoning: row.try_get("reasoning")?,
        requirements: row.try_get("requirements")?,
        active_grants: active_grants.0,
        expired_grants: expired_grants.0,
        publications: publications.0,
    })
}

#[async_trait]
impl ScholarStore for PgStore {
    async fn list(&self, query: &ScholarQuery) -> AppResult<ScholarPage> {
        let (sql, binds) = list_sql(query);
        let row = bind_all(sqlx::query(&sql), binds)
            .fetch_one(&self.pool)
            .await?;

        let total: i64 = row.try_get("total")?;
        let data: Json<Vec<ScholarCard>> = row.try_get("data")?;

        Ok(ScholarPage {
            data: data.0,
            total,
            page: query.page,
            total_pages: total_pages(total),
        })
    }

    async fn get(&self, id: &str) -> AppResult<ScholarRecord> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM scholar_browser.scholars WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(id.to_string()))?;

        Ok(row_to_record(&row)?)
    }

    async fn batch(&self, ids: &[String]) -> AppResult<Vec<ScholarRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!("SELECT {RECORD_COLUMNS} FROM scholar_browser.scholars WHERE id = ANY($1)");
        let rows = sqlx::query(&sql)
            .bind(unique_ids(ids))
            .fetch_all(&self.pool)
            .await?;

        let records = rows
            .iter()
            .map(row_to_record)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(in_request_order(ids, records))
    }

    async fn filter_options(&self) -> AppResult<FilterOptions> {
        let departments: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT department FROM scholar_browser.scholars")
                .fetch_all(&self.pool)
                .await?;
        let positions: Vec<String> =
            sqlx::query_scalar("SELECT DISTINCT position FROM scholar_browser.scholars")
                .fetch_all(&self.pool)
                .await?;

        Ok(FilterOptions {
            departments: sorted_distinct(departments.iter().map(String::as_str)),
            positions: sorted_distinct(positions.iter().map(String::as_str)),
        })
    }

    async fn all(&self) -> AppResult<Vec<ScholarRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM scholar_browser.scholars ORDER BY relevance_score DESC, id ASC"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(row_to_record)
            .collect::<Result<Vec<_>, _>>()?)
    }
}

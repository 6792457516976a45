//! Postgres-backed event log
//!
//! Table: `cloud_events(time, id, type, source, subject, raw)`.
//!
//! Payload predicates run against `convert_from(raw, 'UTF8')::jsonb -> 'data'`.
//! Nothing about the payload is indexed, so every identity query is a scan of
//! the table; `limit` bounds the result, not the scan.
//!
//! Only exact comparisons are pushed down to SQL. A filter carrying a pattern
//! fetches the rows that pass its exact fields and is finished in Rust with the
//! same selection code as the in-memory log, so patterns always mean what the
//! `regex` crate says they mean.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};

use super::event_log::{EventLog, StorageError};
use super::matching::{latest, latest_per_uid, matches, MatchTarget};
use crate::envelope::Envelope;
use crate::identity::{FieldMatcher, IdentityFilter};

/// Every payload query selects from this relation (aliased `e`)
const EVENTS_WITH_DATA: &str = "(SELECT ctid AS row_ref, time, id, raw, \
     convert_from(raw, 'UTF8')::jsonb -> 'data' AS data FROM cloud_events)";

/// jsonb paths of the identity triple
const IDENTITY_PATHS: [&str; 3] = ["{apiVersion}", "{kind}", "{metadata,name}"];

/// jsonb paths of the first owner reference
const PRIMARY_OWNER_PATHS: [&str; 3] = [
    "{metadata,ownerReferences,0,apiVersion}",
    "{metadata,ownerReferences,0,kind}",
    "{metadata,ownerReferences,0,name}",
];

fn sql_paths(target: MatchTarget) -> &'static [&'static str; 3] {
    match target {
        MatchTarget::Identity => &IDENTITY_PATHS,
        MatchTarget::PrimaryOwner => &PRIMARY_OWNER_PATHS,
    }
}

#[derive(Debug, FromRow)]
struct StoredRow {
    id: String,
    raw: Vec<u8>,
}

impl StoredRow {
    fn decode(self) -> Result<Envelope, StorageError> {
        let id = self.id;
        Envelope::from_raw(self.raw).map_err(|e| StorageError::Corrupt {
            id,
            reason: e.to_string(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct PgEventLog {
    pool: PgPool,
}

impl PgEventLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Rows passing the exact fields of `filter`, decoded and checked against
    /// the whole filter
    async fn candidates(
        &self,
        target: MatchTarget,
        filter: &IdentityFilter,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Vec<Envelope>, StorageError> {
        let mut qb = candidates_query(target, filter, as_of);
        let rows = qb
            .build_query_as::<StoredRow>()
            .fetch_all(&self.pool)
            .await?;

        let mut found = Vec::new();
        for row in rows {
            let envelope = row.decode()?;
            if matches(&envelope, target, filter) {
                found.push(envelope);
            }
        }
        Ok(found)
    }

    async fn select_latest_per_uid(
        &self,
        target: MatchTarget,
        filter: &IdentityFilter,
        limit: i64,
    ) -> Result<Vec<Envelope>, StorageError> {
        if filter.has_patterns() {
            let candidates = self.candidates(target, filter, None).await?;
            return Ok(latest_per_uid(candidates, limit));
        }

        let mut qb = latest_per_uid_query(sql_paths(target), filter, limit);
        let rows = qb
            .build_query_as::<StoredRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(StoredRow::decode).collect()
    }
}

fn has_exact(filter: &IdentityFilter) -> bool {
    [&filter.api_version, &filter.kind, &filter.name]
        .iter()
        .any(|m| matches!(m, FieldMatcher::Exact(_)))
}

/// Append ` AND <predicate>` for each exactly matched field. Pattern fields
/// are left to the caller.
fn push_exact_filter(
    qb: &mut QueryBuilder<'_, Postgres>,
    paths: &[&str; 3],
    filter: &IdentityFilter,
) {
    let matchers = [&filter.api_version, &filter.kind, &filter.name];

    for (path, matcher) in paths.iter().zip(matchers) {
        if let FieldMatcher::Exact(value) = matcher {
            qb.push(format!(" AND lower(e.data #>> '{}') = lower(", path));
            qb.push_bind(value.clone());
            qb.push(")");
        }
    }
}

fn candidates_query<'a>(
    target: MatchTarget,
    filter: &IdentityFilter,
    as_of: Option<DateTime<Utc>>,
) -> QueryBuilder<'a, Postgres> {
    // Rows are only cast to jsonb when SQL has a payload predicate to evaluate
    let mut qb = if has_exact(filter) {
        let mut qb = QueryBuilder::new(format!(
            "SELECT e.id, e.raw FROM {} e WHERE TRUE",
            EVENTS_WITH_DATA
        ));
        push_exact_filter(&mut qb, sql_paths(target), filter);
        qb
    } else {
        QueryBuilder::new("SELECT e.id, e.raw FROM cloud_events e WHERE TRUE")
    };

    if let Some(as_of) = as_of {
        qb.push(" AND e.time <= ");
        qb.push_bind(as_of);
    }
    qb
}

/// Latest row per `metadata.uid` among rows matching `filter` on `paths`,
/// ordered by uid (nulls last) then recency. `filter` must be pattern-free.
fn latest_per_uid_query<'a>(
    paths: &[&str; 3],
    filter: &IdentityFilter,
    limit: i64,
) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new(format!(
        r#"
        SELECT d.id, d.raw FROM (
            SELECT DISTINCT ON (m.dedup_key) m.id, m.raw, m.time, m.uid FROM (
                SELECT e.id, e.raw, e.time,
                       e.data #>> '{{metadata,uid}}' AS uid,
                       COALESCE('uid:' || (e.data #>> '{{metadata,uid}}'), 'row:' || e.row_ref::text) AS dedup_key
                FROM {} e
                WHERE TRUE"#,
        EVENTS_WITH_DATA
    ));
    push_exact_filter(&mut qb, paths, filter);
    qb.push(
        r#"
            ) m
            ORDER BY m.dedup_key, m.time DESC, m.id DESC
        ) d
        ORDER BY d.uid ASC NULLS LAST, d.time DESC, d.id DESC
        LIMIT "#,
    );
    qb.push_bind(limit);
    qb
}

#[async_trait]
impl EventLog for PgEventLog {
    async fn append(&self, envelope: &Envelope) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO cloud_events (time, id, type, source, subject, raw)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(envelope.time)
        .bind(&envelope.id)
        .bind(&envelope.event_type)
        .bind(&envelope.source)
        .bind(envelope.subject.as_deref())
        .bind(envelope.raw())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Envelope>, StorageError> {
        let row = sqlx::query_as::<_, StoredRow>(
            r#"
            SELECT id, raw FROM cloud_events
            WHERE id = $1
            ORDER BY time DESC
            LIMIT 1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(StoredRow::decode).transpose()
    }

    async fn find_all_by_id(&self, id: &str) -> Result<Vec<Envelope>, StorageError> {
        let rows = sqlx::query_as::<_, StoredRow>(
            r#"
            SELECT id, raw FROM cloud_events
            WHERE id = $1
            ORDER BY time ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StoredRow::decode).collect()
    }

    async fn find_latest_matching(
        &self,
        filter: &IdentityFilter,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Option<Envelope>, StorageError> {
        if filter.has_patterns() {
            let candidates = self.candidates(MatchTarget::Identity, filter, as_of).await?;
            return Ok(latest(candidates, as_of));
        }

        let mut qb = candidates_query(MatchTarget::Identity, filter, as_of);
        qb.push(" ORDER BY e.time DESC, e.id DESC LIMIT 1");

        let row = qb
            .build_query_as::<StoredRow>()
            .fetch_optional(&self.pool)
            .await?;

        row.map(StoredRow::decode).transpose()
    }

    async fn find_all_matching(
        &self,
        filter: &IdentityFilter,
        limit: i64,
    ) -> Result<Vec<Envelope>, StorageError> {
        self.select_latest_per_uid(MatchTarget::Identity, filter, limit)
            .await
    }

    async fn find_owned_by_primary_owner(
        &self,
        owner: &IdentityFilter,
        limit: i64,
    ) -> Result<Vec<Envelope>, StorageError> {
        self.select_latest_per_uid(MatchTarget::PrimaryOwner, owner, limit)
            .await
    }

    async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

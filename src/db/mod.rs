use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::{Executor, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use crate::config::WritePolicy;
use crate::models::{OutcomeSummary, SportRecord};

/// Row from the `sports` collection table
#[derive(Debug, sqlx::FromRow)]
struct SportRow {
    id: String,
    document: Json<Map<String, Value>>,
}

impl SportRow {
    /// Expose the store-assigned id as `_id`, next to the document fields.
    fn into_record(self) -> SportRecord {
        let mut document = self.document.0;
        document.insert("_id".to_string(), Value::String(self.id));
        SportRecord(document)
    }
}

// Connection
pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
}

/// Create the `sports` collection table if it does not exist yet.
///
/// `seq` keeps insertion order so that lookups return the first match,
/// `id` is the opaque document identifier handed out to clients.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS sports (
               seq INTEGER PRIMARY KEY AUTOINCREMENT,
               id TEXT NOT NULL UNIQUE,
               sport_type TEXT NOT NULL,
               document TEXT NOT NULL,
               created_at TEXT NOT NULL,
               updated_at TEXT NOT NULL
           )"#
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn ping(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

// Sport queries
pub async fn fetch_by_type(pool: &SqlitePool, sport_type: &str) -> Result<Option<SportRecord>, sqlx::Error> {
    let row = find_first(pool, sport_type).await?;
    Ok(row.map(SportRow::into_record))
}

/// Write `payload` for `sport_type` according to the configured policy.
pub async fn upsert(
    pool: &SqlitePool,
    policy: WritePolicy,
    sport_type: &str,
    payload: Map<String, Value>,
) -> Result<OutcomeSummary, sqlx::Error> {
    match policy {
        WritePolicy::Merge => merge_upsert(pool, sport_type, payload).await,
        WritePolicy::Insert => insert(pool, sport_type, payload).await,
    }
}

/// Unconditionally insert a new document; duplicates per sport type are allowed.
pub async fn insert(
    pool: &SqlitePool,
    sport_type: &str,
    payload: Map<String, Value>,
) -> Result<OutcomeSummary, sqlx::Error> {
    let id = new_document_id();
    let document = with_sport_type(payload, sport_type);
    insert_document(pool, &id, sport_type, &document).await?;

    tracing::debug!(%sport_type, %id, "inserted sport document");

    Ok(OutcomeSummary::Inserted { acknowledged: true, id })
}

/// Replace the top-level fields of the first document matching `sport_type`
/// with those in `payload`, creating the document when nothing matches.
///
/// Runs under `BEGIN IMMEDIATE`: the write lock is held from the lookup on,
/// so concurrent upserts wait on the busy timeout rather than upgrading a
/// read lock.
pub async fn merge_upsert(
    pool: &SqlitePool,
    sport_type: &str,
    payload: Map<String, Value>,
) -> Result<OutcomeSummary, sqlx::Error> {
    let mut tx = pool.begin_with("BEGIN IMMEDIATE").await?;

    let outcome = match find_first(&mut *tx, sport_type).await? {
        Some(row) => {
            let mut document = row.document.0;
            let modified = merge_fields(&mut document, payload);

            if modified {
                sqlx::query(
                    r#"UPDATE sports SET document = ?, updated_at = ? WHERE id = ?"#
                )
                .bind(Json(&document))
                .bind(now())
                .bind(&row.id)
                .execute(&mut *tx)
                .await?;
            }

            tracing::debug!(%sport_type, id = %row.id, modified, "merged sport document");

            OutcomeSummary::Updated {
                acknowledged: true,
                matched_count: 1,
                modified_count: u64::from(modified),
                upserted_id: None,
            }
        }
        None => {
            let id = new_document_id();
            let document = with_sport_type(payload, sport_type);
            insert_document(&mut *tx, &id, sport_type, &document).await?;

            tracing::debug!(%sport_type, %id, "upserted new sport document");

            OutcomeSummary::Updated {
                acknowledged: true,
                matched_count: 0,
                modified_count: 0,
                upserted_id: Some(id),
            }
        }
    };

    tx.commit().await?;

    Ok(outcome)
}

async fn find_first<'e, E>(executor: E, sport_type: &str) -> Result<Option<SportRow>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as::<_, SportRow>(
        r#"SELECT id, document FROM sports WHERE sport_type = ? ORDER BY seq LIMIT 1"#
    )
    .bind(sport_type)
    .fetch_optional(executor)
    .await
}

async fn insert_document<'e, E>(
    executor: E,
    id: &str,
    sport_type: &str,
    document: &Map<String, Value>,
) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let created_at = now();

    sqlx::query(
        r#"INSERT INTO sports (id, sport_type, document, created_at, updated_at)
           VALUES (?, ?, ?, ?, ?)"#
    )
    .bind(id)
    .bind(sport_type)
    .bind(Json(document))
    .bind(&created_at)
    .bind(&created_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Shallow `$set`-style merge. Returns whether any field changed.
fn merge_fields(document: &mut Map<String, Value>, patch: Map<String, Value>) -> bool {
    let mut modified = false;

    for (key, value) in patch {
        if document.get(&key) != Some(&value) {
            document.insert(key, value);
            modified = true;
        }
    }

    modified
}

fn with_sport_type(mut payload: Map<String, Value>, sport_type: &str) -> Map<String, Value> {
    payload.insert("sport_type".to_string(), Value::String(sport_type.to_string()));
    payload
}

fn new_document_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn test_pool() -> SqlitePool {
        // A single connection so every query sees the same in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();
        pool
    }

    fn payload(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected an object, got {other}"),
        }
    }

    async fn count_documents(pool: &SqlitePool, sport_type: &str) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM sports WHERE sport_type = ?")
            .bind(sport_type)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[test]
    fn merge_fields_reports_changes_only() {
        let mut document = payload(json!({"sport_type": "tennis", "en": {"format": "singles"}}));

        assert!(!merge_fields(&mut document, payload(json!({"en": {"format": "singles"}}))));
        assert!(merge_fields(&mut document, payload(json!({"en": {"format": "doubles"}, "zh": {}}))));
        assert_eq!(
            Value::Object(document),
            json!({"sport_type": "tennis", "en": {"format": "doubles"}, "zh": {}})
        );
    }

    #[tokio::test]
    async fn fetch_missing_sport_type_returns_none() {
        let pool = test_pool().await;
        assert!(fetch_by_type(&pool, "curling").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn insert_then_fetch_exposes_id_and_sport_type() {
        let pool = test_pool().await;
        let outcome = insert(&pool, "badminton", payload(json!({"en": {"format": "doubles"}, "zh": {}})))
            .await
            .unwrap();

        let OutcomeSummary::Inserted { acknowledged, id } = outcome.clone() else {
            panic!("expected an insert outcome, got {outcome:?}");
        };
        assert!(acknowledged);

        let record = fetch_by_type(&pool, "badminton").await.unwrap().unwrap();
        assert_eq!(record.id(), Some(id.as_str()));
        assert_eq!(record.sport_type(), Some("badminton"));
        assert_eq!(record.localization("en"), Some(&json!({"format": "doubles"})));
    }

    #[tokio::test]
    async fn insert_policy_keeps_duplicates_and_reads_the_first() {
        let pool = test_pool().await;
        let first = insert(&pool, "squash", payload(json!({"en": {"time": "18:00"}}))).await.unwrap();
        let second = insert(&pool, "squash", payload(json!({"en": {"time": "20:00"}}))).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(count_documents(&pool, "squash").await, 2);

        let record = fetch_by_type(&pool, "squash").await.unwrap().unwrap();
        assert_eq!(record.localization("en"), Some(&json!({"time": "18:00"})));
    }

    #[tokio::test]
    async fn merge_upsert_creates_then_matches() {
        let pool = test_pool().await;
        let body = payload(json!({"zh": {"format": "雙打"}, "en": {"format": "doubles"}}));

        let created = merge_upsert(&pool, "badminton", body.clone()).await.unwrap();
        let OutcomeSummary::Updated { matched_count: 0, modified_count: 0, upserted_id: Some(id), .. } =
            created.clone()
        else {
            panic!("expected an upsert outcome, got {created:?}");
        };

        let again = merge_upsert(&pool, "badminton", body).await.unwrap();
        assert_eq!(
            again,
            OutcomeSummary::Updated { acknowledged: true, matched_count: 1, modified_count: 0, upserted_id: None }
        );
        assert_eq!(count_documents(&pool, "badminton").await, 1);

        let record = fetch_by_type(&pool, "badminton").await.unwrap().unwrap();
        assert_eq!(record.id(), Some(id.as_str()));
    }

    #[tokio::test]
    async fn merge_upsert_replaces_fields_and_keeps_id() {
        let pool = test_pool().await;
        merge_upsert(&pool, "tennis", payload(json!({"zh": {}, "en": {"format": "singles", "date": "Mon"}})))
            .await
            .unwrap();
        let before = fetch_by_type(&pool, "tennis").await.unwrap().unwrap();

        let outcome = merge_upsert(&pool, "tennis", payload(json!({"en": {"format": "doubles"}})))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            OutcomeSummary::Updated { acknowledged: true, matched_count: 1, modified_count: 1, upserted_id: None }
        );

        let after = fetch_by_type(&pool, "tennis").await.unwrap().unwrap();
        assert_eq!(after.id(), before.id());
        assert_eq!(after.localization("en"), Some(&json!({"format": "doubles"})));
        assert_eq!(after.localization("zh"), Some(&json!({})));
        assert_eq!(after.sport_type(), Some("tennis"));
    }

    #[tokio::test]
    async fn upsert_dispatches_on_policy() {
        let pool = test_pool().await;
        let body = payload(json!({"zh": {}, "en": {}}));

        let inserted = upsert(&pool, WritePolicy::Insert, "golf", body.clone()).await.unwrap();
        assert!(matches!(inserted, OutcomeSummary::Inserted { .. }));

        let merged = upsert(&pool, WritePolicy::Merge, "golf", body).await.unwrap();
        assert!(matches!(merged, OutcomeSummary::Updated { matched_count: 1, .. }));
    }
}

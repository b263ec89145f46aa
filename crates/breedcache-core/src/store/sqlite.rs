use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::cache::CachedData;
use crate::models::{CatalogItem, TraitScores};

use super::{LocalStore, StoreError};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS breeds (
        id                  TEXT PRIMARY KEY,
        position            INTEGER NOT NULL,
        name                TEXT NOT NULL,
        images              TEXT NOT NULL DEFAULT '[]',
        description         TEXT NOT NULL DEFAULT '',
        temperament         TEXT NOT NULL DEFAULT '',
        origin              TEXT NOT NULL DEFAULT '',
        life_span           TEXT NOT NULL DEFAULT '',
        weight              TEXT NOT NULL DEFAULT '',
        hypoallergenic      INTEGER NOT NULL DEFAULT 0,
        affection_level     INTEGER NOT NULL DEFAULT 1,
        child_friendly      INTEGER NOT NULL DEFAULT 1,
        stranger_friendly   INTEGER NOT NULL DEFAULT 1,
        wikipedia_url       TEXT,
        is_favorite         INTEGER NOT NULL DEFAULT 0,
        listed              INTEGER NOT NULL DEFAULT 0,
        fetched_at          TEXT NOT NULL,
        images_fetched_at   TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_breeds_position ON breeds(position);
    CREATE INDEX IF NOT EXISTS idx_breeds_name ON breeds(name);
";

const SELECT_COLUMNS: &str = "id, name, images, description, temperament, origin, life_span, \
     weight, hypoallergenic, affection_level, child_friendly, stranger_friendly, \
     wikipedia_url, is_favorite, fetched_at";

/// Merge-by-id upsert. `is_favorite` survives a conflict. A row keeps its
/// position unless it is joining the list now, in which case it moves to the
/// end. The gallery freshness resets because page payloads carry only the
/// primary image.
const UPSERT_SQL: &str = "
    INSERT INTO breeds (id, position, name, images, description, temperament, origin,
                        life_span, weight, hypoallergenic, affection_level, child_friendly,
                        stranger_friendly, wikipedia_url, is_favorite, fetched_at, listed)
    VALUES (?1, (SELECT COALESCE(MAX(position), -1) + 1 FROM breeds), ?2, ?3, ?4, ?5, ?6,
            ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
    ON CONFLICT(id) DO UPDATE SET
        position = CASE WHEN breeds.listed = 0 AND excluded.listed = 1
                        THEN excluded.position ELSE breeds.position END,
        listed = MAX(breeds.listed, excluded.listed),
        name = excluded.name,
        images = excluded.images,
        description = excluded.description,
        temperament = excluded.temperament,
        origin = excluded.origin,
        life_span = excluded.life_span,
        weight = excluded.weight,
        hypoallergenic = excluded.hypoallergenic,
        affection_level = excluded.affection_level,
        child_friendly = excluded.child_friendly,
        stranger_friendly = excluded.stranger_friendly,
        wikipedia_url = excluded.wikipedia_url,
        fetched_at = excluded.fetched_at,
        images_fetched_at = NULL
";

/// SQLite-backed catalog store.
///
/// One connection behind a mutex: every operation is a short transaction, so
/// writes to the same row serialize (last writer wins) and a refresh can never
/// interleave with a favorite update inside a row.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    changes: watch::Sender<u64>,
}

impl SqliteStore {
    /// Open (or create) the catalog database at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "Catalog database opened");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        let (changes, _) = watch::channel(0);
        Ok(Self {
            conn: Mutex::new(conn),
            changes,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockFailed)
    }

    /// Run `op` inside one transaction and notify observers after commit
    fn write<T>(&self, op: impl FnOnce(&Transaction<'_>) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let result = op(&tx)?;
        tx.commit()?;
        drop(conn);
        self.changes.send_modify(|version| *version += 1);
        Ok(result)
    }

    fn query_rows(
        &self,
        sql: &str,
        param: Option<&str>,
    ) -> Result<Vec<CachedData<CatalogItem>>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(sql)?;
        let rows = match param {
            Some(p) => stmt.query_map(params![p], row_to_item)?,
            None => stmt.query_map([], row_to_item)?,
        };
        let items = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    fn upsert(
        tx: &Transaction<'_>,
        item: &CatalogItem,
        fetched_at: DateTime<Utc>,
        listed: bool,
    ) -> Result<(), StoreError> {
        let images = serde_json::to_string(&item.images)?;
        tx.prepare_cached(UPSERT_SQL)?.execute(params![
            item.id,
            item.name,
            images,
            item.description,
            item.temperament,
            item.origin,
            item.life_span,
            item.weight,
            item.hypoallergenic,
            item.traits.affection,
            item.traits.child_friendly,
            item.traits.stranger_friendly,
            item.wikipedia_url,
            item.is_favorite,
            fetched_at,
            listed,
        ])?;
        Ok(())
    }
}

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<CachedData<CatalogItem>> {
    let images_json: String = row.get(2)?;
    let images: Vec<String> = serde_json::from_str(&images_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let item = CatalogItem {
        id: row.get(0)?,
        name: row.get(1)?,
        images,
        description: row.get(3)?,
        temperament: row.get(4)?,
        origin: row.get(5)?,
        life_span: row.get(6)?,
        weight: row.get(7)?,
        hypoallergenic: row.get(8)?,
        traits: TraitScores::new(row.get(9)?, row.get(10)?, row.get(11)?),
        wikipedia_url: row.get(12)?,
        is_favorite: row.get(13)?,
    };
    let fetched_at: DateTime<Utc> = row.get(14)?;
    Ok(CachedData::at(item, fetched_at))
}

#[async_trait]
impl LocalStore for SqliteStore {
    async fn read_all(&self) -> Result<Vec<CachedData<CatalogItem>>, StoreError> {
        self.query_rows(
            &format!("SELECT {} FROM breeds WHERE listed = 1 ORDER BY position", SELECT_COLUMNS),
            None,
        )
    }

    async fn read_favorites(&self) -> Result<Vec<CachedData<CatalogItem>>, StoreError> {
        self.query_rows(
            &format!("SELECT {} FROM breeds WHERE is_favorite = 1 ORDER BY position", SELECT_COLUMNS),
            None,
        )
    }

    async fn read_by_id(&self, id: &str) -> Result<Option<CachedData<CatalogItem>>, StoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("SELECT {} FROM breeds WHERE id = ?1", SELECT_COLUMNS),
                params![id],
                row_to_item,
            )
            .optional()?;
        Ok(row)
    }

    async fn search_by_name(&self, term: &str) -> Result<Vec<CachedData<CatalogItem>>, StoreError> {
        // instr() rather than LIKE so '%' and '_' in the term match literally
        self.query_rows(
            &format!(
                "SELECT {} FROM breeds WHERE instr(lower(name), lower(?1)) > 0 ORDER BY position",
                SELECT_COLUMNS
            ),
            Some(term),
        )
    }

    async fn read_images(&self, id: &str) -> Result<Option<CachedData<Vec<String>>>, StoreError> {
        let conn = self.lock()?;
        let row: Option<(String, Option<DateTime<Utc>>)> = conn
            .query_row(
                "SELECT images, images_fetched_at FROM breeds WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        drop(conn);

        let Some((images_json, fetched_at)) = row else {
            return Ok(None);
        };
        let images: Vec<String> = serde_json::from_str(&images_json)?;
        if images.is_empty() {
            return Ok(None);
        }
        Ok(Some(match fetched_at {
            Some(at) => CachedData::at(images, at),
            None => CachedData::unvalidated(images),
        }))
    }

    async fn upsert_many(&self, items: &[CatalogItem]) -> Result<(), StoreError> {
        let now = Utc::now();
        self.write(|tx| {
            for item in items {
                Self::upsert(tx, item, now, true)?;
            }
            Ok(())
        })?;
        debug!(count = items.len(), "Upserted list rows");
        Ok(())
    }

    async fn upsert_detached(&self, items: &[CatalogItem]) -> Result<(), StoreError> {
        let now = Utc::now();
        self.write(|tx| {
            for item in items {
                Self::upsert(tx, item, now, false)?;
            }
            Ok(())
        })?;
        debug!(count = items.len(), "Upserted detached rows");
        Ok(())
    }

    async fn upsert_one(&self, item: &CatalogItem) -> Result<(), StoreError> {
        let now = Utc::now();
        self.write(|tx| Self::upsert(tx, item, now, false))
    }

    async fn replace_all(&self, items: &[CatalogItem]) -> Result<(), StoreError> {
        let now = Utc::now();
        self.write(|tx| {
            // Favorites outlive the list they came from; everything else goes
            tx.execute("DELETE FROM breeds WHERE is_favorite = 0", [])?;
            tx.execute("UPDATE breeds SET listed = 0", [])?;
            for item in items {
                Self::upsert(tx, item, now, true)?;
            }
            Ok(())
        })?;
        debug!(count = items.len(), "Replaced catalog rows");
        Ok(())
    }

    async fn update_favorite(&self, id: &str, is_favorite: bool) -> Result<(), StoreError> {
        self.write(|tx| {
            let updated = tx.execute(
                "UPDATE breeds SET is_favorite = ?1 WHERE id = ?2",
                params![is_favorite, id],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Ok(())
        })
    }

    async fn update_images(&self, id: &str, images: &[String]) -> Result<(), StoreError> {
        let images_json = serde_json::to_string(images)?;
        let now = Utc::now();
        self.write(|tx| {
            let updated = tx.execute(
                "UPDATE breeds SET images = ?1, images_fetched_at = ?2 WHERE id = ?3",
                params![images_json, now, id],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Ok(())
        })
    }

    async fn delete_all(&self) -> Result<(), StoreError> {
        self.write(|tx| {
            tx.execute("DELETE FROM breeds", [])?;
            Ok(())
        })
    }

    async fn delete_by_id(&self, id: &str) -> Result<(), StoreError> {
        self.write(|tx| {
            tx.execute("DELETE FROM breeds WHERE id = ?1", params![id])?;
            Ok(())
        })
    }

    fn changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{observe_all, observe_by_id, observe_search};
    use crate::testing::breed;
    use futures::StreamExt;
    use std::sync::Arc;

    fn ids(rows: &[CachedData<CatalogItem>]) -> Vec<&str> {
        rows.iter().map(|r| r.data.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_upsert_keeps_insertion_order() {
        let store = SqliteStore::open_in_memory().expect("open");
        store.upsert_many(&[breed("b"), breed("a")]).await.expect("upsert");
        store.upsert_many(&[breed("c")]).await.expect("upsert");

        let rows = store.read_all().await.expect("read");
        assert_eq!(ids(&rows), vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_detached_rows_stay_out_of_the_list() {
        let store = SqliteStore::open_in_memory().expect("open");
        store.upsert_many(&[breed("a")]).await.expect("upsert");
        store.upsert_detached(&[breed("s")]).await.expect("upsert");
        store.upsert_one(&breed("d")).await.expect("upsert");

        assert_eq!(ids(&store.read_all().await.expect("read")), vec!["a"]);
        assert!(store.read_by_id("s").await.expect("read").is_some());
        assert_eq!(store.search_by_name("breed").await.expect("search").len(), 3);

        // Reached by paging later: joins the list at the end
        store.upsert_many(&[breed("b"), breed("s")]).await.expect("upsert");
        assert_eq!(ids(&store.read_all().await.expect("read")), vec!["a", "b", "s"]);

        // A detached refresh never removes a row from the list
        store.upsert_detached(&[breed("a")]).await.expect("upsert");
        assert_eq!(ids(&store.read_all().await.expect("read")), vec!["a", "b", "s"]);
    }

    #[tokio::test]
    async fn test_upsert_preserves_favorite_and_position() {
        let store = SqliteStore::open_in_memory().expect("open");
        store.upsert_many(&[breed("a"), breed("b")]).await.expect("upsert");
        store.update_favorite("a", true).await.expect("favorite");

        let mut newer = breed("a");
        newer.name = "Renamed".to_string();
        store.upsert_many(&[newer]).await.expect("upsert");

        let rows = store.read_all().await.expect("read");
        assert_eq!(ids(&rows), vec!["a", "b"]);
        assert_eq!(rows[0].data.name, "Renamed");
        assert!(rows[0].data.is_favorite);
    }

    #[tokio::test]
    async fn test_replace_all_carries_favorites_for_shared_ids() {
        let store = SqliteStore::open_in_memory().expect("open");
        store.upsert_many(&[breed("a"), breed("b")]).await.expect("upsert");
        store.update_favorite("a", true).await.expect("favorite");
        store.update_favorite("b", true).await.expect("favorite");

        store.replace_all(&[breed("c"), breed("a")]).await.expect("replace");

        let rows = store.read_all().await.expect("read");
        assert_eq!(ids(&rows), vec!["c", "a"]);
        assert!(!rows[0].data.is_favorite);
        assert!(rows[1].data.is_favorite);

        // "b" left the list but is still a favorite
        let favorites = store.read_favorites().await.expect("read");
        assert_eq!(ids(&favorites), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_search_by_name_is_case_insensitive_substring() {
        let store = SqliteStore::open_in_memory().expect("open");
        let mut bengal = breed("beng");
        bengal.name = "Bengal".to_string();
        let mut siamese = breed("siam");
        siamese.name = "Siamese".to_string();
        store.upsert_many(&[bengal, siamese]).await.expect("upsert");

        let rows = store.search_by_name("ENG").await.expect("search");
        assert_eq!(ids(&rows), vec!["beng"]);
        assert!(store.search_by_name("100%").await.expect("search").is_empty());
    }

    #[tokio::test]
    async fn test_update_favorite_unknown_id() {
        let store = SqliteStore::open_in_memory().expect("open");
        let result = store.update_favorite("missing", true).await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_images_freshness() {
        let store = SqliteStore::open_in_memory().expect("open");
        store.upsert_one(&breed("a")).await.expect("upsert");

        let primary = store.read_images("a").await.expect("read").expect("row");
        assert!(primary.is_stale(chrono::Duration::days(1)));

        let gallery = vec!["https://img/1.jpg".to_string(), "https://img/2.jpg".to_string()];
        store.update_images("a", &gallery).await.expect("update");
        let fresh = store.read_images("a").await.expect("read").expect("row");
        assert_eq!(fresh.data, gallery);
        assert!(!fresh.is_stale(chrono::Duration::minutes(1)));

        // A page refetch overwrites the gallery with the primary image again
        store.upsert_one(&breed("a")).await.expect("upsert");
        let reset = store.read_images("a").await.expect("read").expect("row");
        assert_eq!(reset.data.len(), 1);
        assert!(reset.is_stale(chrono::Duration::days(1)));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = SqliteStore::open_in_memory().expect("open");
        store.upsert_many(&[breed("a"), breed("b")]).await.expect("upsert");
        store.delete_by_id("a").await.expect("delete");
        assert_eq!(ids(&store.read_all().await.expect("read")), vec!["b"]);
        store.delete_all().await.expect("delete");
        assert!(store.read_all().await.expect("read").is_empty());
    }

    #[tokio::test]
    async fn test_writes_bump_change_counter() {
        let store = SqliteStore::open_in_memory().expect("open");
        let rx = store.changes();
        store.upsert_one(&breed("a")).await.expect("upsert");
        store.update_favorite("a", true).await.expect("favorite");
        assert_eq!(*rx.borrow(), 2);
    }

    #[tokio::test]
    async fn test_observe_by_id_re_emits_on_write() {
        let store: Arc<dyn LocalStore> = Arc::new(SqliteStore::open_in_memory().expect("open"));
        store.upsert_one(&breed("a")).await.expect("upsert");

        let mut stream = observe_by_id(Arc::clone(&store), "a");
        let first = stream.next().await.flatten().expect("row");
        assert!(!first.is_favorite);

        store.update_favorite("a", true).await.expect("favorite");
        let second = stream.next().await.flatten().expect("row");
        assert!(second.is_favorite);
    }

    #[tokio::test]
    async fn test_observe_search_sees_new_rows() {
        let store: Arc<dyn LocalStore> = Arc::new(SqliteStore::open_in_memory().expect("open"));
        let mut stream = observe_search(Arc::clone(&store), "breed");
        assert!(stream.next().await.expect("emission").is_empty());

        store.upsert_one(&breed("a")).await.expect("upsert");
        assert_eq!(stream.next().await.expect("emission").len(), 1);
    }

    #[tokio::test]
    async fn test_observe_all_follows_list_rows_only() {
        let store: Arc<dyn LocalStore> = Arc::new(SqliteStore::open_in_memory().expect("open"));
        let mut stream = observe_all(Arc::clone(&store));
        assert!(stream.next().await.expect("emission").is_empty());

        store.upsert_one(&breed("x")).await.expect("upsert");
        assert!(stream.next().await.expect("emission").is_empty());

        store.upsert_many(&[breed("a"), breed("b")]).await.expect("upsert");
        let ids: Vec<_> = stream
            .next()
            .await
            .expect("emission")
            .into_iter()
            .map(|item| item.id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_open_on_disk_persists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("db").join("catalog.db");
        {
            let store = SqliteStore::open(&path).expect("open");
            store.upsert_one(&breed("a")).await.expect("upsert");
            store.update_favorite("a", true).await.expect("favorite");
        }
        let reopened = SqliteStore::open(&path).expect("reopen");
        let row = reopened.read_by_id("a").await.expect("read").expect("row");
        assert!(row.data.is_favorite);
    }
}

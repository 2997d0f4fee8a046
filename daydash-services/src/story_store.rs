//! Story Store
//!
//! SQLite-backed document store for [`Story`] aggregates. Each story is kept
//! as a JSON document keyed by a unique canonical URL; a side table indexes
//! every update id so dedup lookups and the feed cursor are single queries.

use std::cmp::Ordering;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction};

use daydash_core::Story;

/// How feed item identifiers are compared when computing the cursor and
/// ranking stories
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CursorOrdering {
    /// Decimal ids: longer ids are larger, equal lengths compare
    /// lexicographically ("10" > "9")
    #[default]
    Numeric,
    /// Plain string comparison ("9" > "10")
    Lexicographic,
}

impl CursorOrdering {
    /// Compare two identifiers
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        match self {
            CursorOrdering::Numeric => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
            CursorOrdering::Lexicographic => a.cmp(b),
        }
    }

    /// The largest identifier, if any
    pub fn max_id<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
        ids.into_iter().max_by(|a, b| self.compare(a, b))
    }

    /// SQL `ORDER BY` terms sorting `column` descending
    fn order_desc(&self, column: &str) -> String {
        match self {
            CursorOrdering::Numeric => format!("LENGTH({0}) DESC, {0} DESC", column),
            CursorOrdering::Lexicographic => format!("{} DESC", column),
        }
    }
}

/// Persistence operations the pipeline needs
pub trait StoryStore: Send + Sync {
    /// Largest update id across all stories, `""` when the store is empty
    fn cursor_max(&self) -> Result<String, StoreError>;

    /// The story holding an update with this feed item id
    fn find_by_update_id(&self, update_id: &str) -> Result<Option<Story>, StoreError>;

    /// The story for a canonical URL
    fn find_by_url(&self, url: &str) -> Result<Option<Story>, StoreError>;

    /// Insert a new story and assign its identity. Fails with
    /// [`StoreError::Conflict`] if a story already exists for the URL.
    fn insert(&self, story: &mut Story) -> Result<i64, StoreError>;

    /// Replace a persisted story's document
    fn update(&self, story: &Story) -> Result<(), StoreError>;

    /// Up to `limit` stories, most recently updated first. An empty store
    /// yields an empty list.
    fn recent_stories(&self, limit: usize) -> Result<Vec<Story>, StoreError>;
}

/// Story store backed by a single SQLite connection
pub struct SqliteStoryStore {
    conn: Mutex<Connection>,
    ordering: CursorOrdering,
}

impl SqliteStoryStore {
    /// Open (or create) the store at `db_path`
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Io(format!("Failed to create database directory: {}", e))
                })?;
            }
        }

        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    /// Create an in-memory store (useful for testing)
    pub fn new_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(conn),
            ordering: CursorOrdering::default(),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Use a different identifier ordering
    pub fn with_ordering(mut self, ordering: CursorOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS stories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL UNIQUE,
                short_url TEXT NOT NULL,
                data JSON NOT NULL,
                latest_update_id TEXT NOT NULL DEFAULT '',
                updated_at INTEGER DEFAULT (strftime('%s', 'now'))
            );

            CREATE TABLE IF NOT EXISTS story_updates (
                update_id TEXT PRIMARY KEY,
                story_id INTEGER NOT NULL REFERENCES stories(id) ON DELETE CASCADE,
                time INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_story_updates_story
            ON story_updates(story_id);
            "#,
        )?;

        Ok(())
    }

    fn latest_update_id(&self, story: &Story) -> String {
        self.ordering
            .max_id(story.updates.iter().map(|u| u.id.as_str()))
            .unwrap_or_default()
            .to_string()
    }

    /// Reject update ids already indexed under a different story
    fn check_update_ids(
        tx: &Transaction<'_>,
        story: &Story,
        own_id: Option<i64>,
    ) -> Result<(), StoreError> {
        let mut stmt = tx.prepare("SELECT story_id FROM story_updates WHERE update_id = ?1")?;

        for update in &story.updates {
            let owner: Option<i64> = stmt
                .query_row(params![update.id], |row| row.get(0))
                .optional()?;

            if let Some(owner) = owner {
                if Some(owner) != own_id {
                    return Err(StoreError::DuplicateUpdate {
                        update_id: update.id.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    fn index_updates(tx: &Transaction<'_>, story_id: i64, story: &Story) -> Result<(), StoreError> {
        let mut stmt = tx.prepare(
            "INSERT INTO story_updates (update_id, story_id, time) VALUES (?1, ?2, ?3)",
        )?;

        for update in &story.updates {
            stmt.execute(params![update.id, story_id, update.time])?;
        }

        Ok(())
    }

    fn decode(id: i64, data: &str) -> Result<Story, StoreError> {
        let mut story: Story = serde_json::from_str(data)?;
        story.id = Some(id);
        Ok(story)
    }

    fn find_one(&self, sql: &str, key: &str) -> Result<Option<Story>, StoreError> {
        let conn = self.conn.lock();

        let row = conn
            .query_row(sql, params![key], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })
            .optional()?;

        row.map(|(id, data)| Self::decode(id, &data)).transpose()
    }
}

impl StoryStore for SqliteStoryStore {
    fn cursor_max(&self) -> Result<String, StoreError> {
        let conn = self.conn.lock();

        let sql = format!(
            "SELECT update_id FROM story_updates ORDER BY {} LIMIT 1",
            self.ordering.order_desc("update_id")
        );

        let cursor: Option<String> = conn.query_row(&sql, [], |row| row.get(0)).optional()?;

        Ok(cursor.unwrap_or_default())
    }

    fn find_by_update_id(&self, update_id: &str) -> Result<Option<Story>, StoreError> {
        self.find_one(
            r#"
            SELECT s.id, s.data
            FROM stories s
            JOIN story_updates u ON u.story_id = s.id
            WHERE u.update_id = ?1
            "#,
            update_id,
        )
    }

    fn find_by_url(&self, url: &str) -> Result<Option<Story>, StoreError> {
        self.find_one("SELECT id, data FROM stories WHERE url = ?1", url)
    }

    fn insert(&self, story: &mut Story) -> Result<i64, StoreError> {
        let data = serde_json::to_string(&Story {
            id: None,
            ..story.clone()
        })?;
        let latest = self.latest_update_id(story);

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        Self::check_update_ids(&tx, story, None)?;

        let inserted = tx.execute(
            r#"
            INSERT INTO stories (url, short_url, data, latest_update_id)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![story.url, story.short_url, data, latest],
        );

        match inserted {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                return Err(StoreError::Conflict {
                    url: story.url.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        let id = tx.last_insert_rowid();
        Self::index_updates(&tx, id, story)?;
        tx.commit()?;

        story.id = Some(id);
        Ok(id)
    }

    fn update(&self, story: &Story) -> Result<(), StoreError> {
        let id = story.id.ok_or(StoreError::NotPersisted)?;
        let data = serde_json::to_string(&Story {
            id: None,
            ..story.clone()
        })?;
        let latest = self.latest_update_id(story);

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        Self::check_update_ids(&tx, story, Some(id))?;

        let changed = tx.execute(
            r#"
            UPDATE stories
            SET url = ?1, short_url = ?2, data = ?3, latest_update_id = ?4,
                updated_at = strftime('%s', 'now')
            WHERE id = ?5
            "#,
            params![story.url, story.short_url, data, latest, id],
        );

        match changed {
            Ok(0) => return Err(StoreError::NotFound { id }),
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                return Err(StoreError::Conflict {
                    url: story.url.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        tx.execute("DELETE FROM story_updates WHERE story_id = ?1", params![id])?;
        Self::index_updates(&tx, id, story)?;
        tx.commit()?;

        Ok(())
    }

    fn recent_stories(&self, limit: usize) -> Result<Vec<Story>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock();

        let sql = format!(
            "SELECT id, data FROM stories ORDER BY {}, id DESC LIMIT ?1",
            self.ordering.order_desc("latest_update_id")
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut stories = Vec::new();
        for row in rows {
            let (id, data) = row?;
            stories.push(Self::decode(id, &data)?);
        }

        Ok(stories)
    }
}

fn is_constraint_violation(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

/// Errors that can occur during story store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(String),

    #[error("A story already exists for {url}")]
    Conflict { url: String },

    #[error("Update {update_id} already belongs to another story")]
    DuplicateUpdate { update_id: String },

    #[error("Story has not been inserted yet")]
    NotPersisted,

    #[error("Story {id} not found")]
    NotFound { id: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use daydash_core::StoryUpdate;

    fn update(id: &str) -> StoryUpdate {
        StoryUpdate {
            id: id.to_string(),
            text: format!("text {}", id),
            time: id.parse::<i64>().unwrap_or(0) * 100,
            mediaurl: format!("http://img/{}.jpg", id),
            mediadata: String::new(),
        }
    }

    fn story(url: &str, ids: &[&str]) -> Story {
        let mut story = Story::new(url, format!("{}/short", url), update(ids[0]));
        for id in &ids[1..] {
            story.push_update(update(id));
        }
        story
    }

    #[test]
    fn test_cursor_empty_store() {
        let store = SqliteStoryStore::new_in_memory().unwrap();
        assert_eq!(store.cursor_max().unwrap(), "");
    }

    #[test]
    fn test_cursor_max() {
        let store = SqliteStoryStore::new_in_memory().unwrap();
        store.insert(&mut story("http://long/a", &["5"])).unwrap();
        store.insert(&mut story("http://long/b", &["9", "3"])).unwrap();

        assert_eq!(store.cursor_max().unwrap(), "9");
    }

    #[test]
    fn test_cursor_numeric_boundary() {
        let store = SqliteStoryStore::new_in_memory().unwrap();
        store.insert(&mut story("http://long/a", &["9"])).unwrap();
        store.insert(&mut story("http://long/b", &["10"])).unwrap();

        assert_eq!(store.cursor_max().unwrap(), "10");
    }

    #[test]
    fn test_cursor_lexicographic_boundary() {
        let store = SqliteStoryStore::new_in_memory()
            .unwrap()
            .with_ordering(CursorOrdering::Lexicographic);
        store.insert(&mut story("http://long/a", &["9"])).unwrap();
        store.insert(&mut story("http://long/b", &["10"])).unwrap();

        assert_eq!(store.cursor_max().unwrap(), "9");
    }

    #[test]
    fn test_ordering_compare() {
        assert_eq!(CursorOrdering::Numeric.compare("10", "9"), Ordering::Greater);
        assert_eq!(CursorOrdering::Lexicographic.compare("10", "9"), Ordering::Less);
        assert_eq!(
            CursorOrdering::Numeric.max_id(["1390", "1389", "999"]),
            Some("1390")
        );
    }

    #[test]
    fn test_insert_and_find_by_url_round_trip() {
        let store = SqliteStoryStore::new_in_memory().unwrap();
        let mut original = story("http://long/a", &["10", "11"]);
        let id = store.insert(&mut original).unwrap();

        let found = store.find_by_url("http://long/a").unwrap().unwrap();
        assert_eq!(found.id, Some(id));
        assert_eq!(found.url, original.url);
        assert_eq!(found.short_url, original.short_url);
        assert_eq!(found.updates, original.updates);
    }

    #[test]
    fn test_find_by_update_id() {
        let store = SqliteStoryStore::new_in_memory().unwrap();
        store.insert(&mut story("http://long/a", &["10"])).unwrap();

        let found = store.find_by_update_id("10").unwrap().unwrap();
        assert_eq!(found.url, "http://long/a");
        assert!(store.find_by_update_id("11").unwrap().is_none());
        assert!(store.find_by_url("http://long/missing").unwrap().is_none());
    }

    #[test]
    fn test_insert_duplicate_url_conflicts() {
        let store = SqliteStoryStore::new_in_memory().unwrap();
        store.insert(&mut story("http://long/a", &["10"])).unwrap();

        let result = store.insert(&mut story("http://long/a", &["11"]));
        assert!(matches!(result, Err(StoreError::Conflict { .. })));
        assert!(store.find_by_update_id("11").unwrap().is_none());
    }

    #[test]
    fn test_update_id_is_globally_unique() {
        let store = SqliteStoryStore::new_in_memory().unwrap();
        store.insert(&mut story("http://long/a", &["10"])).unwrap();

        let result = store.insert(&mut story("http://long/b", &["10"]));
        assert!(matches!(result, Err(StoreError::DuplicateUpdate { .. })));
        assert!(store.find_by_url("http://long/b").unwrap().is_none());
    }

    #[test]
    fn test_update_appends_and_reindexes() {
        let store = SqliteStoryStore::new_in_memory().unwrap();
        store.insert(&mut story("http://long/a", &["10"])).unwrap();

        let mut existing = store.find_by_url("http://long/a").unwrap().unwrap();
        existing.push_update(update("11"));
        store.update(&existing).unwrap();

        let found = store.find_by_update_id("11").unwrap().unwrap();
        assert_eq!(found.updates.len(), 2);
        assert_eq!(found.id, existing.id);
        assert_eq!(store.cursor_max().unwrap(), "11");
    }

    #[test]
    fn test_update_requires_identity() {
        let store = SqliteStoryStore::new_in_memory().unwrap();
        let result = store.update(&story("http://long/a", &["10"]));
        assert!(matches!(result, Err(StoreError::NotPersisted)));

        let mut ghost = story("http://long/a", &["10"]);
        ghost.id = Some(42);
        assert!(matches!(
            store.update(&ghost),
            Err(StoreError::NotFound { id: 42 })
        ));
    }

    #[test]
    fn test_recent_stories_newest_first() {
        let store = SqliteStoryStore::new_in_memory().unwrap();
        store.insert(&mut story("http://long/a", &["5"])).unwrap();
        store.insert(&mut story("http://long/b", &["12"])).unwrap();
        store.insert(&mut story("http://long/c", &["9", "30"])).unwrap();

        let recent = store.recent_stories(2).unwrap();
        let urls: Vec<_> = recent.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(urls, vec!["http://long/c", "http://long/b"]);
    }

    #[test]
    fn test_recent_stories_empty_store_is_ok() {
        let store = SqliteStoryStore::new_in_memory().unwrap();
        assert!(store.recent_stories(10).unwrap().is_empty());
        assert!(store.recent_stories(0).unwrap().is_empty());
    }
}

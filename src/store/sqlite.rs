use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use rusqlite_migration::{Migrations, M};

use crate::app::{Result, RivuletError};
use crate::domain::article::hash_content;
use crate::domain::{ArticleEntry, Category, Feed, Headline, Label, OwnerPrefs, UserArticleEntry};
use crate::query::context::CancelToken;
use crate::query::predicate::Predicate;
use crate::query::render::{
    format_timestamp, render_count, render_syntax_probe, HeadlineQuery, RenderedQuery,
};
use crate::query::search::LabelLookup;
use crate::store::fts::{self, TIMESTAMP_FORMAT};
use crate::store::{FeedCounter, Store, StoredArticle};

/// SQLite virtual machine steps between cancellation checks.
const PROGRESS_STEPS: i32 = 1000;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        fts::register_functions(&conn)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![M::up(include_str!(
            "../../migrations/001-initial/up.sql"
        ))]);

        let mut conn = self.conn()?;

        conn.execute("PRAGMA foreign_keys = ON", [])?;
        migrations
            .to_latest(&mut conn)
            .map_err(|e| RivuletError::Migration(e.to_string()))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            RivuletError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(1),
                Some(e.to_string()),
            ))
        })
    }

    /// Runs `f` with a progress handler that interrupts the statement once
    /// `cancel` fires. Interrupts surface as [`RivuletError::Cancelled`].
    fn guarded<T>(
        &self,
        cancel: &CancelToken,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        cancel.check()?;
        let conn = self.conn()?;

        let token = cancel.clone();
        conn.progress_handler(PROGRESS_STEPS, Some(move || token.is_cancelled()))
            .map_err(RivuletError::from_sqlite)?;
        let result = f(&*conn);
        conn.progress_handler(PROGRESS_STEPS, None::<fn() -> bool>)
            .map_err(RivuletError::from_sqlite)?;

        result.map_err(RivuletError::from_sqlite)
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
            .map(|dt| dt.and_utc())
            .ok()
    }

    fn opt_datetime(s: Option<String>) -> Option<DateTime<Utc>> {
        s.and_then(|s| Self::parse_datetime(&s))
    }

    fn map_headline(row: &rusqlite::Row<'_>) -> rusqlite::Result<Headline> {
        Ok(Headline {
            id: row.get(0)?,
            int_id: row.get(1)?,
            guid: row.get(2)?,
            title: row.get(3)?,
            link: row.get(4)?,
            author: row.get(5)?,
            content: row.get(6)?,
            score: row.get(7)?,
            date_entered: Self::opt_datetime(row.get(8)?),
            updated: Self::opt_datetime(row.get(9)?),
            unread: row.get(10)?,
            marked: row.get(11)?,
            published: row.get(12)?,
            note: row.get(13)?,
            feed_id: row.get(14)?,
            feed_title: row.get(15)?,
            last_read: Self::opt_datetime(row.get(16)?),
            last_marked: Self::opt_datetime(row.get(17)?),
            last_published: Self::opt_datetime(row.get(18)?),
            label_cache: row.get(19)?,
            tag_cache: row.get(20)?,
            year_week: row.get(21)?,
        })
    }

    fn map_feed(row: &rusqlite::Row<'_>) -> rusqlite::Result<Feed> {
        Ok(Feed {
            id: row.get(0)?,
            owner_uid: row.get(1)?,
            url: row.get(2)?,
            title: row.get(3)?,
            site_url: row.get(4)?,
            category_id: row.get(5)?,
            last_error: row.get(6)?,
            last_updated: Self::opt_datetime(row.get(7)?),
        })
    }

    fn map_category(row: &rusqlite::Row<'_>) -> rusqlite::Result<Category> {
        Ok(Category {
            id: row.get(0)?,
            owner_uid: row.get(1)?,
            parent_id: row.get(2)?,
            title: row.get(3)?,
        })
    }

    fn query_one<T: rusqlite::types::FromSql>(
        conn: &Connection,
        query: &RenderedQuery,
    ) -> rusqlite::Result<Option<T>> {
        conn.query_row(&query.sql, params_from_iter(query.params.iter()), |row| row.get(0))
            .optional()
    }
}

const FEED_COLUMNS: &str =
    "id, owner_uid, url, title, site_url, cat_id, last_error, last_updated";

impl LabelLookup for SqliteStore {
    fn find_label_id(&self, owner_uid: i64, caption: &str, cancel: &CancelToken) -> Result<Option<i64>> {
        self.guarded(cancel, |conn| {
            conn.query_row(
                "SELECT id FROM labels WHERE owner_uid = ?1 AND unicode_lower(caption) = unicode_lower(?2)",
                params![owner_uid, caption],
                |row| row.get(0),
            )
            .optional()
        })
    }
}

impl Store for SqliteStore {
    fn fetch_headlines(&self, query: &HeadlineQuery, cancel: &CancelToken) -> Result<Vec<Headline>> {
        let rendered = query.render_page();
        tracing::debug!(sql = %rendered.sql, params = rendered.params.len(), "headlines query");

        self.guarded(cancel, |conn| {
            let mut stmt = conn.prepare(&rendered.sql)?;
            let rows = stmt
                .query_map(params_from_iter(rendered.params.iter()), Self::map_headline)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    fn first_headline_id(
        &self,
        query: &HeadlineQuery,
        since: DateTime<Utc>,
        cancel: &CancelToken,
    ) -> Result<Option<i64>> {
        let rendered = query.render_first_id_probe(since);
        tracing::debug!(sql = %rendered.sql, "first id query");
        self.guarded(cancel, |conn| Self::query_one(conn, &rendered))
    }

    fn count_matching(
        &self,
        owner_uid: i64,
        allow_archived: bool,
        filter: &Predicate,
        cancel: &CancelToken,
    ) -> Result<i64> {
        let rendered = render_count(owner_uid, allow_archived, filter);
        self.guarded(cancel, |conn| {
            Ok(Self::query_one(conn, &rendered)?.unwrap_or(0))
        })
    }

    fn probe_search(&self, owner_uid: i64, filter: &Predicate, cancel: &CancelToken) -> Result<bool> {
        let rendered = render_syntax_probe(owner_uid, filter);
        let outcome = self.guarded(cancel, |conn| {
            // Evaluated on their own: the row probe may match no row and
            // then never reaches the full-text part.
            for (language, query) in filter.full_text_terms() {
                conn.query_row("SELECT ts_check(?1, ?2)", params![language, query], |_| Ok(()))?;
            }
            Self::query_one::<i64>(conn, &rendered)?;
            Ok(())
        });

        match outcome {
            Ok(()) => Ok(true),
            Err(RivuletError::Database(err)) if fts::is_query_error(&err) => {
                tracing::debug!(error = %err, "full-text query rejected");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    fn get_feed(&self, owner_uid: i64, id: i64, cancel: &CancelToken) -> Result<Option<Feed>> {
        self.guarded(cancel, |conn| {
            conn.query_row(
                &format!("SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?1 AND owner_uid = ?2"),
                params![id, owner_uid],
                Self::map_feed,
            )
            .optional()
        })
    }

    fn get_feeds(&self, owner_uid: i64, cancel: &CancelToken) -> Result<Vec<Feed>> {
        self.guarded(cancel, |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {FEED_COLUMNS} FROM feeds WHERE owner_uid = ?1 ORDER BY title, url"
            ))?;
            let feeds = stmt
                .query_map(params![owner_uid], Self::map_feed)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(feeds)
        })
    }

    fn get_category(&self, owner_uid: i64, id: i64, cancel: &CancelToken) -> Result<Option<Category>> {
        self.guarded(cancel, |conn| {
            conn.query_row(
                "SELECT id, owner_uid, parent_id, title FROM categories
                 WHERE id = ?1 AND owner_uid = ?2",
                params![id, owner_uid],
                Self::map_category,
            )
            .optional()
        })
    }

    fn get_categories(&self, owner_uid: i64, cancel: &CancelToken) -> Result<Vec<Category>> {
        self.guarded(cancel, |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, owner_uid, parent_id, title FROM categories
                 WHERE owner_uid = ?1 ORDER BY id",
            )?;
            let categories = stmt
                .query_map(params![owner_uid], Self::map_category)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(categories)
        })
    }

    fn get_label(&self, owner_uid: i64, id: i64, cancel: &CancelToken) -> Result<Option<Label>> {
        self.guarded(cancel, |conn| {
            conn.query_row(
                "SELECT id, owner_uid, caption FROM labels WHERE id = ?1 AND owner_uid = ?2",
                params![id, owner_uid],
                |row| {
                    Ok(Label {
                        id: row.get(0)?,
                        owner_uid: row.get(1)?,
                        caption: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }

    fn owner_prefs(&self, owner_uid: i64, defaults: &OwnerPrefs, cancel: &CancelToken) -> Result<OwnerPrefs> {
        let rows = self.guarded(cancel, |conn| {
            let mut stmt = conn.prepare("SELECT pref_name, value FROM prefs WHERE owner_uid = ?1")?;
            let rows = stmt
                .query_map(params![owner_uid], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<(String, String)>, _>>()?;
            Ok(rows)
        })?;
        Ok(OwnerPrefs::from_rows(defaults, rows))
    }

    fn feed_counters(
        &self,
        owner_uid: i64,
        fresh_since: DateTime<Utc>,
        cancel: &CancelToken,
    ) -> Result<Vec<FeedCounter>> {
        let fresh_since = format_timestamp(&fresh_since);
        self.guarded(cancel, |conn| {
            let mut stmt = conn.prepare(
                "SELECT ue.feed_id, f.cat_id,
                        SUM(ue.unread = 1),
                        SUM(ue.marked = 1),
                        SUM(ue.marked = 1 AND ue.unread = 1),
                        SUM(ue.published = 1 AND ue.unread = 1),
                        SUM(ue.unread = 1 AND e.score >= 0 AND e.date_entered > ?2)
                 FROM user_entries ue
                 JOIN entries e ON e.id = ue.ref_id
                 LEFT JOIN feeds f ON f.id = ue.feed_id
                 WHERE ue.owner_uid = ?1
                 GROUP BY ue.feed_id",
            )?;
            let counters = stmt
                .query_map(params![owner_uid, fresh_since], |row| {
                    Ok(FeedCounter {
                        feed_id: row.get(0)?,
                        category_id: row.get(1)?,
                        unread: row.get(2)?,
                        marked: row.get(3)?,
                        marked_unread: row.get(4)?,
                        published_unread: row.get(5)?,
                        fresh_unread: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(counters)
        })
    }

    fn label_unread_counts(&self, owner_uid: i64, cancel: &CancelToken) -> Result<Vec<(i64, i64)>> {
        self.guarded(cancel, |conn| {
            let mut stmt = conn.prepare(
                "SELECT l.id, COUNT(DISTINCT ue.int_id)
                 FROM labels l
                 LEFT JOIN user_labels ul ON ul.label_id = l.id
                 LEFT JOIN user_entries ue ON ue.ref_id = ul.article_id
                      AND ue.owner_uid = l.owner_uid AND ue.unread = 1
                 WHERE l.owner_uid = ?1
                 GROUP BY l.id",
            )?;
            let counts = stmt
                .query_map(params![owner_uid], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(counts)
        })
    }

    fn add_category(&self, category: &Category) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO categories (owner_uid, parent_id, title) VALUES (?1, ?2, ?3)",
            params![category.owner_uid, category.parent_id, category.title],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn add_feed(&self, feed: &Feed) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO feeds (owner_uid, url, title, site_url, cat_id, last_error, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                feed.owner_uid,
                feed.url,
                feed.title,
                feed.site_url,
                feed.category_id,
                feed.last_error,
                feed.last_updated.as_ref().map(format_timestamp),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn add_article(&self, article: &ArticleEntry, state: &UserArticleEntry) -> Result<StoredArticle> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO entries
                (guid, title, link, content, content_hash, author, score, date_entered, updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                article.guid,
                article.title,
                article.link,
                article.content,
                article.content_hash(),
                article.author,
                article.score,
                format_timestamp(&article.date_entered),
                format_timestamp(&article.updated),
            ],
        )?;
        let id: i64 = tx.query_row(
            "SELECT id FROM entries WHERE guid = ?1",
            params![article.guid],
            |row| row.get(0),
        )?;
        if inserted > 0 {
            tx.execute(
                "INSERT INTO entries_fts (rowid, body) VALUES (?1, ?2)",
                params![id, fts::to_index_text(&article.title, &article.content)],
            )?;
        }

        tx.execute(
            "INSERT INTO user_entries
                (ref_id, owner_uid, feed_id, unread, marked, published, note,
                 last_read, last_marked, last_published, label_cache, tag_cache)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                id,
                state.owner_uid,
                state.feed_id,
                state.unread,
                state.marked,
                state.published,
                state.note,
                state.last_read.as_ref().map(format_timestamp),
                state.last_marked.as_ref().map(format_timestamp),
                state.last_published.as_ref().map(format_timestamp),
                state.label_cache,
                state.tag_cache,
            ],
        )?;
        let int_id = tx.last_insert_rowid();

        tx.commit()?;
        Ok(StoredArticle { id, int_id })
    }

    fn update_article_content(&self, id: i64, content: &str) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let title: String = tx.query_row(
            "SELECT title FROM entries WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;

        tx.execute(
            "UPDATE entries SET content = ?1, content_hash = ?2 WHERE id = ?3",
            params![content, hash_content(content), id],
        )?;
        tx.execute("DELETE FROM entries_fts WHERE rowid = ?1", params![id])?;
        tx.execute(
            "INSERT INTO entries_fts (rowid, body) VALUES (?1, ?2)",
            params![id, fts::to_index_text(&title, content)],
        )?;

        tx.commit()?;
        Ok(())
    }

    fn add_label(&self, label: &Label) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO labels (owner_uid, caption) VALUES (?1, ?2)",
            params![label.owner_uid, label.caption],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn assign_label(&self, label_id: i64, article_id: i64) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO user_labels (label_id, article_id) VALUES (?1, ?2)",
            params![label_id, article_id],
        )?;
        conn.execute(
            "UPDATE user_entries SET label_cache = COALESCE(
                (SELECT group_concat(l.caption, ',') FROM user_labels ul
                 JOIN labels l ON l.id = ul.label_id
                 WHERE ul.article_id = user_entries.ref_id
                   AND l.owner_uid = user_entries.owner_uid), '')
             WHERE ref_id = ?1",
            params![article_id],
        )?;
        Ok(())
    }

    fn add_tag(&self, owner_uid: i64, int_id: i64, tag: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO tags (owner_uid, post_int_id, tag_name) VALUES (?1, ?2, ?3)",
            params![owner_uid, int_id, tag],
        )?;
        conn.execute(
            "UPDATE user_entries SET tag_cache = COALESCE(
                (SELECT group_concat(tag_name, ',') FROM tags WHERE post_int_id = ?1), '')
             WHERE int_id = ?1",
            params![int_id],
        )?;
        Ok(())
    }

    fn set_pref(&self, owner_uid: i64, name: &str, value: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO prefs (owner_uid, pref_name, value) VALUES (?1, ?2, ?3)
             ON CONFLICT (owner_uid, pref_name) DO UPDATE SET value = excluded.value",
            params![owner_uid, name, value],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;

    use super::*;
    use crate::domain::prefs::FRESH_ARTICLE_MAX_AGE;
    use crate::query::order::SortSpec;
    use crate::query::predicate::{Column, Membership};

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap()
    }

    fn seed(store: &SqliteStore) -> (i64, StoredArticle) {
        let mut feed = Feed::new(1, "https://example.com/feed.xml".into());
        feed.title = Some("Example".into());
        let feed_id = store.add_feed(&feed).unwrap();

        let mut article = ArticleEntry::new("guid-1", "Rust async in practice");
        article.content = "<p>Futures and executors</p>".into();
        article.date_entered = at(10);
        article.updated = at(10);
        let stored = store
            .add_article(&article, &UserArticleEntry::new(1, Some(feed_id)))
            .unwrap();
        (feed_id, stored)
    }

    fn query(filter: Predicate) -> HeadlineQuery {
        HeadlineQuery {
            owner_uid: 1,
            allow_archived: true,
            filter,
            order: SortSpec::default(),
            distinct: true,
            include_content: true,
            limit: Some(30),
            offset: 0,
        }
    }

    #[test]
    fn test_add_and_fetch_headline() {
        let store = SqliteStore::in_memory().unwrap();
        let (feed_id, stored) = seed(&store);

        let rows = store
            .fetch_headlines(&query(Predicate::True), &CancelToken::new())
            .unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.id, stored.id);
        assert_eq!(row.int_id, stored.int_id);
        assert_eq!(row.feed_id, Some(feed_id));
        assert_eq!(row.feed_title.as_deref(), Some("Example"));
        assert_eq!(row.date_entered, Some(at(10)));
        assert_eq!(row.year_week.as_deref(), Some("2024-18"));
        assert!(row.unread);
        assert_eq!(row.content.as_deref(), Some("<p>Futures and executors</p>"));
    }

    #[test]
    fn test_headlines_are_owner_scoped() {
        let store = SqliteStore::in_memory().unwrap();
        seed(&store);

        let mut q = query(Predicate::True);
        q.owner_uid = 2;
        assert!(store.fetch_headlines(&q, &CancelToken::new()).unwrap().is_empty());
    }

    #[test]
    fn test_shared_article_is_stored_once() {
        let store = SqliteStore::in_memory().unwrap();
        let (_, first) = seed(&store);

        let article = ArticleEntry::new("guid-1", "Rust async in practice");
        let second = store
            .add_article(&article, &UserArticleEntry::new(2, None))
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_ne!(first.int_id, second.int_id);
    }

    #[test]
    fn test_full_text_match() {
        let store = SqliteStore::in_memory().unwrap();
        seed(&store);
        let cancel = CancelToken::new();

        let hit = Predicate::FullTextMatch {
            language: "simple".into(),
            query: "rust & executors".into(),
        };
        assert_eq!(store.fetch_headlines(&query(hit), &cancel).unwrap().len(), 1);

        let miss = Predicate::FullTextMatch {
            language: "simple".into(),
            query: "rust & !futures".into(),
        };
        assert!(store.fetch_headlines(&query(miss), &cancel).unwrap().is_empty());
    }

    #[test]
    fn test_probe_search_rejects_bad_syntax() {
        let store = SqliteStore::in_memory().unwrap();
        let cancel = CancelToken::new();

        // Empty store: the row probe alone would never see the query.
        let bad = Predicate::FullTextMatch {
            language: "simple".into(),
            query: "foo bar".into(),
        };
        assert!(!store.probe_search(1, &bad, &cancel).unwrap());

        let unknown_language = Predicate::FullTextMatch {
            language: "klingon".into(),
            query: "foo".into(),
        };
        assert!(!store.probe_search(1, &unknown_language, &cancel).unwrap());

        let good = Predicate::FullTextMatch {
            language: "english".into(),
            query: "foo & bar".into(),
        };
        assert!(store.probe_search(1, &good, &cancel).unwrap());
    }

    #[test]
    fn test_cancelled_token_stops_reads() {
        let store = SqliteStore::in_memory().unwrap();
        seed(&store);

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = store.fetch_headlines(&query(Predicate::True), &cancel).unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_deadline_interrupts_running_statement() {
        let store = SqliteStore::in_memory().unwrap();
        let cancel = CancelToken::with_timeout(Duration::from_millis(50));

        let err = store
            .guarded(&cancel, |conn| {
                conn.query_row(
                    "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c)
                     SELECT COUNT(*) FROM c",
                    [],
                    |row| row.get::<_, i64>(0),
                )
            })
            .unwrap_err();
        assert!(err.is_cancelled());

        // The handler is removed afterwards.
        let n: i64 = store
            .guarded(&CancelToken::new(), |conn| conn.query_row("SELECT 1", [], |r| r.get(0)))
            .unwrap();
        assert_eq!(n, 1);
    }

    #[test]
    fn test_count_matching() {
        let store = SqliteStore::in_memory().unwrap();
        let (feed_id, _) = seed(&store);
        let cancel = CancelToken::new();

        let unread = Predicate::all(vec![
            Predicate::eq(Column::FeedId, feed_id),
            Predicate::eq(Column::Unread, true),
        ]);
        assert_eq!(store.count_matching(1, false, &unread, &cancel).unwrap(), 1);
        assert_eq!(
            store
                .count_matching(1, false, &Predicate::eq(Column::Marked, true), &cancel)
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_labels_and_tags() {
        let store = SqliteStore::in_memory().unwrap();
        let (_, stored) = seed(&store);
        let cancel = CancelToken::new();

        let label_id = store
            .add_label(&Label {
                id: 0,
                owner_uid: 1,
                caption: "Work".into(),
            })
            .unwrap();
        store.assign_label(label_id, stored.id).unwrap();
        store.add_tag(1, stored.int_id, "rust").unwrap();
        store.add_tag(1, stored.int_id, "async").unwrap();

        assert_eq!(store.find_label_id(1, "work", &cancel).unwrap(), Some(label_id));
        assert_eq!(store.find_label_id(2, "work", &cancel).unwrap(), None);

        let rows = store
            .fetch_headlines(
                &query(Predicate::Member(Membership::Tag {
                    owner_uid: 1,
                    name: "rust".into(),
                })),
                &cancel,
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].label_cache, "Work");
        let mut tags: Vec<&str> = rows[0].tag_cache.split(',').collect();
        tags.sort_unstable();
        assert_eq!(tags, vec!["async", "rust"]);

        assert_eq!(store.label_unread_counts(1, &cancel).unwrap(), vec![(label_id, 1)]);
    }

    #[test]
    fn test_feed_counters() {
        let store = SqliteStore::in_memory().unwrap();
        let (feed_id, _) = seed(&store);

        let mut starred = ArticleEntry::new("guid-2", "Starred");
        starred.date_entered = at(11);
        let mut state = UserArticleEntry::new(1, Some(feed_id));
        state.marked = true;
        state.unread = false;
        store.add_article(&starred, &state).unwrap();

        let counters = store.feed_counters(1, at(9), &CancelToken::new()).unwrap();
        assert_eq!(
            counters,
            vec![FeedCounter {
                feed_id: Some(feed_id),
                category_id: None,
                unread: 1,
                marked: 1,
                marked_unread: 0,
                published_unread: 0,
                fresh_unread: 1,
            }]
        );
    }

    #[test]
    fn test_prefs_override_defaults() {
        let store = SqliteStore::in_memory().unwrap();
        store.set_pref(1, FRESH_ARTICLE_MAX_AGE, "12").unwrap();
        store.set_pref(1, FRESH_ARTICLE_MAX_AGE, "6").unwrap();

        let cancel = CancelToken::new();
        let prefs = store.owner_prefs(1, &OwnerPrefs::default(), &cancel).unwrap();
        assert_eq!(prefs.fresh_article_max_age, 6);
        let other = store.owner_prefs(2, &OwnerPrefs::default(), &cancel).unwrap();
        assert_eq!(other, OwnerPrefs::default());
    }

    #[test]
    fn test_update_article_content_rehashes() {
        let store = SqliteStore::in_memory().unwrap();
        let (_, stored) = seed(&store);
        store.update_article_content(stored.id, "Tokio runtime").unwrap();

        let hit = Predicate::FullTextMatch {
            language: "simple".into(),
            query: "tokio".into(),
        };
        let rows = store.fetch_headlines(&query(hit), &CancelToken::new()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].content.as_deref(), Some("Tokio runtime"));

        let stale = Predicate::FullTextMatch {
            language: "simple".into(),
            query: "executors".into(),
        };
        assert!(store.fetch_headlines(&query(stale), &CancelToken::new()).unwrap().is_empty());
    }

    #[test]
    fn test_feed_lookup_is_owner_scoped() {
        let store = SqliteStore::in_memory().unwrap();
        let (feed_id, _) = seed(&store);
        let cancel = CancelToken::new();
        assert!(store.get_feed(1, feed_id, &cancel).unwrap().is_some());
        assert!(store.get_feed(2, feed_id, &cancel).unwrap().is_none());
        assert_eq!(store.get_feeds(1, &cancel).unwrap().len(), 1);
    }

    #[test]
    fn test_categories() {
        let store = SqliteStore::in_memory().unwrap();
        let root = store.add_category(&Category::new(1, "Tech")).unwrap();
        let mut child = Category::new(1, "Rust");
        child.parent_id = Some(root);
        let child_id = store.add_category(&child).unwrap();

        let cancel = CancelToken::new();
        let all = store.get_categories(1, &cancel).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(
            store.get_category(1, child_id, &cancel).unwrap().unwrap().parent_id,
            Some(root)
        );
        assert!(store.get_category(2, root, &cancel).unwrap().is_none());
    }

    #[test]
    fn test_cancelled_token_stops_owner_reads() {
        let store = SqliteStore::in_memory().unwrap();
        let (feed_id, _) = seed(&store);
        let cancel = CancelToken::new();
        cancel.cancel();

        assert!(store.get_feed(1, feed_id, &cancel).unwrap_err().is_cancelled());
        assert!(store.get_feeds(1, &cancel).unwrap_err().is_cancelled());
        assert!(store.get_category(1, 1, &cancel).unwrap_err().is_cancelled());
        assert!(store.get_categories(1, &cancel).unwrap_err().is_cancelled());
        assert!(store.get_label(1, 1, &cancel).unwrap_err().is_cancelled());
        assert!(store.find_label_id(1, "work", &cancel).unwrap_err().is_cancelled());
        assert!(store
            .owner_prefs(1, &OwnerPrefs::default(), &cancel)
            .unwrap_err()
            .is_cancelled());
    }

    #[test]
    fn test_title_filter_folds_non_ascii_case() {
        let store = SqliteStore::in_memory().unwrap();
        store
            .add_article(
                &ArticleEntry::new("guid-u", "Über alles"),
                &UserArticleEntry::new(1, None),
            )
            .unwrap();

        let rows = store
            .fetch_headlines(
                &query(Predicate::contains(Column::Title, "über")),
                &CancelToken::new(),
            )
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "Über alles");
    }

    #[test]
    fn test_index_row_per_shared_article() {
        let store = SqliteStore::in_memory().unwrap();
        let (_, stored) = seed(&store);
        store
            .add_article(
                &ArticleEntry::new("guid-1", "Rust async in practice"),
                &UserArticleEntry::new(2, None),
            )
            .unwrap();
        store.update_article_content(stored.id, "Tokio runtime").unwrap();

        let indexed: i64 = store
            .guarded(&CancelToken::new(), |conn| {
                conn.query_row("SELECT COUNT(*) FROM entries_fts", [], |r| r.get(0))
            })
            .unwrap();
        assert_eq!(indexed, 1);
    }
}

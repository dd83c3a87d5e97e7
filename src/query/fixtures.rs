//! Seed helpers for query tests. Every timestamp is relative to [`now`].

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};

use crate::domain::{ArticleEntry, Category, Feed, Label, OwnerPrefs, UserArticleEntry};
use crate::query::context::RequestContext;
use crate::store::{SqliteStore, Store, StoredArticle};

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap()
}

pub fn hours_ago(hours: i64) -> DateTime<Utc> {
    now() - TimeDelta::hours(hours)
}

pub fn store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::in_memory().unwrap())
}

pub fn ctx(owner_uid: i64) -> RequestContext {
    RequestContext::new(owner_uid, OwnerPrefs::default()).at(now())
}

pub fn category(store: &SqliteStore, owner_uid: i64, title: &str, parent: Option<i64>) -> i64 {
    let mut category = Category::new(owner_uid, title);
    category.parent_id = parent;
    store.add_category(&category).unwrap()
}

pub fn feed(store: &SqliteStore, owner_uid: i64, title: &str, cat_id: Option<i64>) -> i64 {
    let mut feed = Feed::new(owner_uid, format!("https://example.com/{title}.xml"));
    feed.title = Some(title.to_string());
    feed.category_id = cat_id;
    store.add_feed(&feed).unwrap()
}

pub fn label(store: &SqliteStore, owner_uid: i64, caption: &str) -> i64 {
    store
        .add_label(&Label {
            id: 0,
            owner_uid,
            caption: caption.to_string(),
        })
        .unwrap()
}

/// Unread article entered `age_hours` before [`now`].
pub fn article(
    store: &SqliteStore,
    owner_uid: i64,
    feed_id: Option<i64>,
    guid: &str,
    title: &str,
    age_hours: i64,
) -> StoredArticle {
    article_with(store, owner_uid, feed_id, guid, title, age_hours, |_, _| {})
}

pub fn article_with(
    store: &SqliteStore,
    owner_uid: i64,
    feed_id: Option<i64>,
    guid: &str,
    title: &str,
    age_hours: i64,
    tweak: impl FnOnce(&mut ArticleEntry, &mut UserArticleEntry),
) -> StoredArticle {
    let mut entry = ArticleEntry::new(guid, title);
    entry.date_entered = hours_ago(age_hours);
    entry.updated = entry.date_entered;
    let mut state = UserArticleEntry::new(owner_uid, feed_id);
    tweak(&mut entry, &mut state);
    store.add_article(&entry, &state).unwrap()
}

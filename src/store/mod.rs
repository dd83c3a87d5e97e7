pub mod fts;
pub mod sqlite;

use chrono::{DateTime, Utc};

use crate::app::Result;
use crate::domain::{ArticleEntry, Category, Feed, Headline, Label, OwnerPrefs, UserArticleEntry};
use crate::query::context::CancelToken;
use crate::query::predicate::Predicate;
use crate::query::render::HeadlineQuery;
use crate::query::search::LabelLookup;

pub use sqlite::SqliteStore;

/// Per-feed aggregates for one owner. `feed_id` is `None` for archived
/// articles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedCounter {
    pub feed_id: Option<i64>,
    pub category_id: Option<i64>,
    pub unread: i64,
    pub marked: i64,
    pub marked_unread: i64,
    pub published_unread: i64,
    pub fresh_unread: i64,
}

/// Ids assigned to a stored article.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredArticle {
    /// Shared article id.
    pub id: i64,
    /// Id of the owner's copy.
    pub int_id: i64,
}

pub trait Store: LabelLookup + Send + Sync {
    // Headline reads
    fn fetch_headlines(&self, query: &HeadlineQuery, cancel: &CancelToken) -> Result<Vec<Headline>>;
    fn first_headline_id(
        &self,
        query: &HeadlineQuery,
        since: DateTime<Utc>,
        cancel: &CancelToken,
    ) -> Result<Option<i64>>;
    fn count_matching(
        &self,
        owner_uid: i64,
        allow_archived: bool,
        filter: &Predicate,
        cancel: &CancelToken,
    ) -> Result<i64>;
    /// Runs `filter` against a single row. `Ok(false)` when the full-text
    /// part is malformed.
    fn probe_search(&self, owner_uid: i64, filter: &Predicate, cancel: &CancelToken) -> Result<bool>;

    // Owner data
    fn get_feed(&self, owner_uid: i64, id: i64, cancel: &CancelToken) -> Result<Option<Feed>>;
    fn get_feeds(&self, owner_uid: i64, cancel: &CancelToken) -> Result<Vec<Feed>>;
    fn get_category(&self, owner_uid: i64, id: i64, cancel: &CancelToken) -> Result<Option<Category>>;
    fn get_categories(&self, owner_uid: i64, cancel: &CancelToken) -> Result<Vec<Category>>;
    fn get_label(&self, owner_uid: i64, id: i64, cancel: &CancelToken) -> Result<Option<Label>>;
    fn owner_prefs(&self, owner_uid: i64, defaults: &OwnerPrefs, cancel: &CancelToken) -> Result<OwnerPrefs>;

    // Counters
    fn feed_counters(
        &self,
        owner_uid: i64,
        fresh_since: DateTime<Utc>,
        cancel: &CancelToken,
    ) -> Result<Vec<FeedCounter>>;
    fn label_unread_counts(&self, owner_uid: i64, cancel: &CancelToken) -> Result<Vec<(i64, i64)>>;

    // Ingestion
    fn add_category(&self, category: &Category) -> Result<i64>;
    fn add_feed(&self, feed: &Feed) -> Result<i64>;
    fn add_article(&self, article: &ArticleEntry, state: &UserArticleEntry) -> Result<StoredArticle>;
    fn update_article_content(&self, id: i64, content: &str) -> Result<()>;
    fn add_label(&self, label: &Label) -> Result<i64>;
    fn assign_label(&self, label_id: i64, article_id: i64) -> Result<()>;
    fn add_tag(&self, owner_uid: i64, int_id: i64, tag: &str) -> Result<()>;
    fn set_pref(&self, owner_uid: i64, name: &str, value: &str) -> Result<()>;
}

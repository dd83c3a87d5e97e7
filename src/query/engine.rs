//! Entry point for headline listings.
//!
//! ```text
//! resolve → plugin feed? → plan (search, view, order) → guard → fetch
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::{Result, RivuletError};
use crate::config::EngineConfig;
use crate::domain::{Headline, RawFeedRef};
use crate::plugin::PluginHost;
use crate::query::context::RequestContext;
use crate::query::counters::Counters;
use crate::query::dispatch::{self, FeedMeta, ViewMode};
use crate::query::guard;
use crate::query::resolver;
use crate::store::Store;

/// Limit, offset and the caller's remembered first row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageWindow {
    /// `0` means the configured default.
    pub limit: i64,
    pub offset: i64,
    pub expected_first_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadlineRequest {
    pub feed: RawFeedRef,
    #[serde(default)]
    pub is_cat: bool,
    #[serde(default)]
    pub include_children: bool,
    #[serde(default)]
    pub view_mode: ViewMode,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub search_language: Option<String>,
    /// Toolbar ordering name; empty for the feed's default.
    #[serde(default)]
    pub order_by: String,
    #[serde(default)]
    pub page: PageWindow,
    #[serde(default)]
    pub since_id: Option<i64>,
    #[serde(default)]
    pub start_ts: Option<DateTime<Utc>>,
    #[serde(default)]
    pub include_content: bool,
    #[serde(default)]
    pub skip_first_id_check: bool,
}

impl HeadlineRequest {
    pub fn new(feed: impl Into<RawFeedRef>) -> Self {
        Self {
            feed: feed.into(),
            is_cat: false,
            include_children: false,
            view_mode: ViewMode::default(),
            search: None,
            search_language: None,
            order_by: String::new(),
            page: PageWindow::default(),
            since_id: None,
            start_ts: None,
            include_content: false,
            skip_first_id_check: false,
        }
    }

    pub fn category(feed: impl Into<RawFeedRef>, include_children: bool) -> Self {
        Self {
            is_cat: true,
            include_children,
            ..Self::new(feed)
        }
    }

    pub fn with_view(mut self, view_mode: ViewMode) -> Self {
        self.view_mode = view_mode;
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_page(mut self, limit: i64, offset: i64, expected_first_id: Option<i64>) -> Self {
        self.page = PageWindow {
            limit,
            offset,
            expected_first_id,
        };
        self
    }
}

/// One listing plus everything the view needs to render around it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Headlines {
    pub rows: Vec<Headline>,
    #[serde(flatten)]
    pub meta: FeedMeta,
    pub highlight_words: Vec<String>,
    /// Current first row among recent arrivals, when the guard ran.
    pub first_id: Option<i64>,
    pub is_virtual_feed: bool,
    /// Set when the search could not be run; `rows` is then empty.
    pub query_error: Option<String>,
    /// The caller's cursor is stale; `rows` was not fetched.
    pub pagination_invalidated: bool,
}

#[derive(Debug)]
pub struct HeadlineEngine<S: Store> {
    store: Arc<S>,
    plugins: PluginHost,
    config: EngineConfig,
}

impl<S: Store> HeadlineEngine<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self::with_plugins(store, PluginHost::new(), config)
    }

    pub fn with_plugins(store: Arc<S>, plugins: PluginHost, config: EngineConfig) -> Self {
        Self {
            store,
            plugins,
            config,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn counters(&self) -> Counters<'_, S> {
        Counters::new(&self.store, &self.plugins, &self.config)
    }

    pub fn headlines(&self, request: &HeadlineRequest, ctx: &RequestContext) -> Result<Headlines> {
        ctx.cancel.check()?;

        let selection = resolver::resolve(
            &request.feed,
            request.is_cat,
            request.include_children,
            &ctx.prefs,
        )
        .ok_or_else(|| RivuletError::UnresolvedFeedReference(request.feed.to_string()))?;

        if let Some(pfeed_id) = selection.plugin_feed() {
            return self
                .plugins
                .feed_headlines(pfeed_id, request, ctx)?
                .ok_or_else(|| RivuletError::UnresolvedFeedReference(request.feed.to_string()));
        }

        let plan = dispatch::plan(&*self.store, &self.plugins, &self.config, request, selection, ctx)?;

        let mut result = Headlines {
            meta: plan.meta.clone(),
            is_virtual_feed: plan.selection.is_virtual_feed,
            ..Headlines::default()
        };
        if let Some(search) = &plan.search {
            result.highlight_words = search.highlight_words.clone();
            result.query_error = search.error.clone();
        }

        if guard::applies(&plan, request) {
            let outcome = guard::check(
                &*self.store,
                &plan.query,
                &request.page,
                ctx,
                self.config.first_id_window_minutes,
            )?;
            result.first_id = outcome.first_id;

            if outcome.invalidated {
                tracing::info!(
                    feed = %request.feed,
                    offset = request.page.offset,
                    expected = ?request.page.expected_first_id,
                    first_id = ?outcome.first_id,
                    "pagination cursor invalidated by new arrivals"
                );
                result.pagination_invalidated = true;
                return Ok(result);
            }
        }

        if plan.query.filter.is_false() {
            return Ok(result);
        }

        ctx.cancel.check()?;
        result.rows = self.store.fetch_headlines(&plan.query, &ctx.cancel)?;
        tracing::debug!(feed = %request.feed, rows = result.rows.len(), "fetched headlines");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::label_to_feed_id;
    use crate::domain::prefs::FRESH_ARTICLE_MAX_AGE;
    use crate::domain::reference::plugin_feed_to_feed_id;
    use crate::plugin::VirtualFeedHandler;
    use crate::query::context::CancelToken;
    use crate::query::fixtures;
    use crate::store::SqliteStore;

    fn engine(store: &Arc<SqliteStore>) -> HeadlineEngine<SqliteStore> {
        HeadlineEngine::new(store.clone(), EngineConfig::default())
    }

    fn titles(result: &Headlines) -> Vec<&str> {
        result.rows.iter().map(|r| r.title.as_str()).collect()
    }

    #[test]
    fn test_fresh_feed_scope() {
        let store = fixtures::store();
        let feed = fixtures::feed(&store, 1, "news", None);
        fixtures::article(&store, 1, Some(feed), "a", "Recent unread", 1);
        fixtures::article(&store, 1, Some(feed), "b", "Old unread", 30);
        fixtures::article_with(&store, 1, Some(feed), "c", "Recent read", 1, |_, ue| {
            ue.unread = false;
        });
        fixtures::article_with(&store, 1, Some(feed), "d", "Downvoted", 1, |e, _| e.score = -1);

        let result = engine(&store)
            .headlines(&HeadlineRequest::new(-3), &fixtures::ctx(1))
            .unwrap();
        assert_eq!(titles(&result), vec!["Recent unread"]);
        assert_eq!(result.meta.title, "Fresh articles");
        assert!(result.is_virtual_feed);
    }

    #[test]
    fn test_fresh_window_follows_owner_pref() {
        let store = fixtures::store();
        let feed = fixtures::feed(&store, 1, "news", None);
        fixtures::article(&store, 1, Some(feed), "b", "Old unread", 30);
        store.set_pref(1, FRESH_ARTICLE_MAX_AGE, "48").unwrap();

        let mut ctx = fixtures::ctx(1);
        ctx.prefs = store.owner_prefs(1, &ctx.prefs, &ctx.cancel).unwrap();
        let result = engine(&store).headlines(&HeadlineRequest::new(-3), &ctx).unwrap();
        assert_eq!(titles(&result), vec!["Old unread"]);
    }

    #[test]
    fn test_pagination_invalidated_skips_page() {
        let store = fixtures::store();
        let feed = fixtures::feed(&store, 1, "news", None);
        fixtures::article(&store, 1, Some(feed), "old", "Old", 2);
        let first = fixtures::article(&store, 1, Some(feed), "new-1", "New one", 0);
        let engine = engine(&store);
        let ctx = fixtures::ctx(1);

        let page_one = engine.headlines(&HeadlineRequest::new(feed), &ctx).unwrap();
        assert_eq!(page_one.first_id, Some(first.id));
        assert_eq!(page_one.rows.len(), 2);

        // Same timestamp, higher id: sorts ahead of the remembered row.
        let second = fixtures::article(&store, 1, Some(feed), "new-2", "New two", 0);
        let request = HeadlineRequest::new(feed).with_page(1, 1, Some(first.id));
        let stale = engine.headlines(&request, &ctx).unwrap();
        assert!(stale.pagination_invalidated);
        assert!(stale.rows.is_empty());
        assert_eq!(stale.first_id, Some(second.id));

        let request = HeadlineRequest::new(feed).with_page(30, 1, Some(second.id));
        let current = engine.headlines(&request, &ctx).unwrap();
        assert!(!current.pagination_invalidated);
        assert_eq!(titles(&current), vec!["New one", "Old"]);
    }

    #[test]
    fn test_guard_skipped_for_tags_and_searches() {
        let store = fixtures::store();
        let feed = fixtures::feed(&store, 1, "news", None);
        let post = fixtures::article(&store, 1, Some(feed), "new", "Rust news", 0);
        store.add_tag(1, post.int_id, "rust").unwrap();
        let engine = engine(&store);
        let ctx = fixtures::ctx(1);

        let tagged = engine
            .headlines(&HeadlineRequest::new("rust").with_page(30, 1, Some(9999)), &ctx)
            .unwrap();
        assert!(!tagged.pagination_invalidated);
        assert_eq!(tagged.first_id, None);
        assert_eq!(tagged.meta.title, "rust");

        let searched = engine
            .headlines(
                &HeadlineRequest::new(feed)
                    .with_search("rust")
                    .with_page(30, 0, Some(9999)),
                &ctx,
            )
            .unwrap();
        assert_eq!(searched.first_id, None);
        assert_eq!(searched.meta.title, "Search results: rust");
        assert_eq!(searched.highlight_words, vec!["rust"]);
        assert_eq!(titles(&searched), vec!["Rust news"]);

        let mut reversed = HeadlineRequest::new(feed).with_page(30, 1, Some(9999));
        reversed.order_by = "date_reverse".into();
        let reversed = engine.headlines(&reversed, &ctx).unwrap();
        assert!(!reversed.pagination_invalidated);
        assert_eq!(reversed.first_id, None);
    }

    #[test]
    fn test_malformed_search_degrades() {
        let store = fixtures::store();
        let feed = fixtures::feed(&store, 1, "news", None);
        fixtures::article(&store, 1, Some(feed), "a", "Rust and Go", 1);
        let engine = engine(&store);
        let ctx = fixtures::ctx(1);

        let result = engine
            .headlines(&HeadlineRequest::new(-4).with_search("rust & | go"), &ctx)
            .unwrap();
        assert!(result.rows.is_empty());
        assert_eq!(
            result.query_error.as_deref(),
            Some("Incorrect search syntax: rust & | go.")
        );

        let mut request = HeadlineRequest::new(-4).with_search("rust");
        request.search_language = Some("klingon".into());
        let result = engine.headlines(&request, &ctx).unwrap();
        assert!(result.rows.is_empty());
        assert!(result.query_error.is_some());
    }

    #[test]
    fn test_title_search_folds_unicode_case() {
        let store = fixtures::store();
        let feed = fixtures::feed(&store, 1, "news", None);
        fixtures::article(&store, 1, Some(feed), "a", "Über Rust", 1);
        fixtures::article(&store, 1, Some(feed), "b", "Unrelated", 2);

        let result = engine(&store)
            .headlines(&HeadlineRequest::new(feed).with_search("title:über"), &fixtures::ctx(1))
            .unwrap();
        assert_eq!(titles(&result), vec!["Über Rust"]);
        assert!(result.query_error.is_none());
    }

    #[test]
    fn test_blank_search_is_no_search() {
        let store = fixtures::store();
        let feed = fixtures::feed(&store, 1, "news", None);
        fixtures::article(&store, 1, Some(feed), "a", "Anything", 1);

        let result = engine(&store)
            .headlines(&HeadlineRequest::new(feed).with_search("   "), &fixtures::ctx(1))
            .unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.meta.title, "news");
    }

    #[test]
    fn test_unresolved_references() {
        let store = fixtures::store();
        let engine = engine(&store);
        let ctx = fixtures::ctx(1);

        for request in [
            HeadlineRequest::new(999),
            HeadlineRequest::new(-5),
            HeadlineRequest::category(999, false),
            HeadlineRequest::new(label_to_feed_id(42)),
            HeadlineRequest::new(plugin_feed_to_feed_id(1)),
        ] {
            let err = engine.headlines(&request, &ctx).unwrap_err();
            assert!(matches!(err, RivuletError::UnresolvedFeedReference(_)), "{request:?}");
        }
    }

    #[test]
    fn test_feeds_are_owner_scoped() {
        let store = fixtures::store();
        let feed = fixtures::feed(&store, 1, "mine", None);
        fixtures::article(&store, 1, Some(feed), "a", "Mine", 1);

        let err = engine(&store)
            .headlines(&HeadlineRequest::new(feed), &fixtures::ctx(2))
            .unwrap_err();
        assert!(matches!(err, RivuletError::UnresolvedFeedReference(_)));
    }

    #[test]
    fn test_cancelled_request() {
        let store = fixtures::store();
        let cancel = CancelToken::new();
        cancel.cancel();
        let ctx = fixtures::ctx(1).with_cancel(cancel);

        let err = engine(&store).headlines(&HeadlineRequest::new(-4), &ctx).unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_view_modes() {
        let store = fixtures::store();
        let feed = fixtures::feed(&store, 1, "news", None);
        fixtures::article_with(&store, 1, Some(feed), "a", "Read", 2, |_, ue| ue.unread = false);
        fixtures::article_with(&store, 1, Some(feed), "b", "Noted", 3, |_, ue| {
            ue.unread = false;
            ue.note = Some("look again".into());
        });
        let engine = engine(&store);
        let ctx = fixtures::ctx(1);
        let run = |mode: ViewMode| {
            engine
                .headlines(&HeadlineRequest::new(feed).with_view(mode), &ctx)
                .unwrap()
        };

        // Nothing unread: adaptive shows everything.
        assert_eq!(run(ViewMode::Adaptive).rows.len(), 2);
        assert!(run(ViewMode::Unread).rows.is_empty());
        assert_eq!(titles(&run(ViewMode::HasNote)), vec!["Noted"]);

        fixtures::article(&store, 1, Some(feed), "c", "Unread", 1);
        assert_eq!(titles(&run(ViewMode::Adaptive)), vec!["Unread"]);
        assert_eq!(run(ViewMode::AllArticles).rows.len(), 3);
    }

    #[test]
    fn test_category_with_children() {
        let store = fixtures::store();
        let parent = fixtures::category(&store, 1, "Tech", None);
        let child = fixtures::category(&store, 1, "Rust", Some(parent));
        let outer = fixtures::feed(&store, 1, "outer", Some(parent));
        let inner = fixtures::feed(&store, 1, "inner", Some(child));
        fixtures::article(&store, 1, Some(outer), "a", "Outer post", 2);
        fixtures::article(&store, 1, Some(inner), "b", "Inner post", 1);
        let engine = engine(&store);
        let ctx = fixtures::ctx(1);

        let own = engine
            .headlines(&HeadlineRequest::category(parent, false), &ctx)
            .unwrap();
        assert_eq!(titles(&own), vec!["Outer post"]);
        assert_eq!(own.meta.title, "Tech");

        let all = engine
            .headlines(&HeadlineRequest::category(parent, true), &ctx)
            .unwrap();
        assert_eq!(titles(&all), vec!["Inner post", "Outer post"]);
        assert_eq!(all.rows[0].feed_title.as_deref(), Some("inner"));
    }

    #[test]
    fn test_label_feed_includes_archived() {
        let store = fixtures::store();
        let label = fixtures::label(&store, 1, "Keep");
        let kept = fixtures::article(&store, 1, None, "gone", "Archived but labelled", 1);
        store.assign_label(label, kept.id).unwrap();

        let result = engine(&store)
            .headlines(&HeadlineRequest::new(label_to_feed_id(label)), &fixtures::ctx(1))
            .unwrap();
        assert_eq!(titles(&result), vec!["Archived but labelled"]);
        assert_eq!(result.meta.title, "Keep");
    }

    #[test]
    fn test_limit_since_id_and_start_ts() {
        let store = fixtures::store();
        let feed = fixtures::feed(&store, 1, "news", None);
        let first = fixtures::article(&store, 1, Some(feed), "a", "First", 5);
        fixtures::article(&store, 1, Some(feed), "b", "Second", 4);
        fixtures::article(&store, 1, Some(feed), "c", "Third", 3);
        let engine = engine(&store);
        let ctx = fixtures::ctx(1);

        let one = engine
            .headlines(&HeadlineRequest::new(feed).with_page(1, 0, None), &ctx)
            .unwrap();
        assert_eq!(titles(&one), vec!["Third"]);

        let mut request = HeadlineRequest::new(feed);
        request.since_id = Some(first.id);
        assert_eq!(titles(&engine.headlines(&request, &ctx).unwrap()), vec!["Third", "Second"]);

        let mut request = HeadlineRequest::new(feed);
        request.start_ts = Some(fixtures::hours_ago(3));
        assert_eq!(titles(&engine.headlines(&request, &ctx).unwrap()), vec!["Third"]);
    }

    struct Echo;

    impl VirtualFeedHandler for Echo {
        fn headlines(
            &self,
            pfeed_id: i64,
            _request: &HeadlineRequest,
            _ctx: &RequestContext,
        ) -> Result<Option<Headlines>> {
            Ok((pfeed_id == 3).then(|| Headlines {
                meta: FeedMeta {
                    title: "From plugin".into(),
                    ..FeedMeta::default()
                },
                ..Headlines::default()
            }))
        }

        fn unread_count(&self, _: i64, _: &RequestContext) -> Result<Option<i64>> {
            Ok(None)
        }
    }

    #[test]
    fn test_plugin_feed_bypasses_pipeline() {
        let store = fixtures::store();
        let mut plugins = PluginHost::new();
        plugins.add_feed_handler(Echo);
        let engine = HeadlineEngine::with_plugins(store, plugins, EngineConfig::default());

        let result = engine
            .headlines(&HeadlineRequest::new(plugin_feed_to_feed_id(3)), &fixtures::ctx(1))
            .unwrap();
        assert_eq!(result.meta.title, "From plugin");
    }

    #[test]
    fn test_serialized_shape() {
        let store = fixtures::store();
        let feed = fixtures::feed(&store, 1, "news", None);
        fixtures::article(&store, 1, Some(feed), "a", "Hello", 1);

        let result = engine(&store)
            .headlines(&HeadlineRequest::new(feed), &fixtures::ctx(1))
            .unwrap();
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["title"], "news");
        assert_eq!(json["rows"][0]["title"], "Hello");
        assert_eq!(json["pagination_invalidated"], false);
        assert_eq!(json["is_virtual_feed"], false);
        assert!(json["query_error"].is_null());
        assert!(json["highlight_words"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let request: HeadlineRequest =
            serde_json::from_str(r#"{"feed": "rust", "view_mode": "unread"}"#).unwrap();
        assert_eq!(request.feed, RawFeedRef::Name("rust".into()));
        assert_eq!(request.view_mode, ViewMode::Unread);
        assert_eq!(request.page, PageWindow::default());

        let request: HeadlineRequest = serde_json::from_str(r#"{"feed": -3}"#).unwrap();
        assert_eq!(request.feed, RawFeedRef::Id(-3));
    }

    #[test]
    fn test_numeric_string_feed_is_an_id() {
        let store = fixtures::store();
        let feed = fixtures::feed(&store, 1, "news", None);
        fixtures::article(&store, 1, Some(feed), "a", "Recent unread", 1);

        let request: HeadlineRequest = serde_json::from_str(r#"{"feed": "-3"}"#).unwrap();
        let result = engine(&store).headlines(&request, &fixtures::ctx(1)).unwrap();
        assert_eq!(result.meta.title, "Fresh articles");
        assert_eq!(titles(&result), vec!["Recent unread"]);
    }

    #[test]
    fn test_tag_listing_matches_tag_counter() {
        let store = fixtures::store();
        let feed = fixtures::feed(&store, 1, "news", None);
        let live = fixtures::article(&store, 1, Some(feed), "a", "Live", 2);
        let archived = fixtures::article(&store, 1, None, "b", "Archived", 1);
        store.add_tag(1, live.int_id, "rust").unwrap();
        store.add_tag(1, archived.int_id, "rust").unwrap();
        let engine = engine(&store);
        let ctx = fixtures::ctx(1);

        let result = engine.headlines(&HeadlineRequest::new("rust"), &ctx).unwrap();
        assert_eq!(titles(&result), vec!["Archived", "Live"]);

        let count = engine
            .counters()
            .count(&ctx, &RawFeedRef::Name("rust".into()), false, true)
            .unwrap();
        assert_eq!(count, result.rows.len() as i64);
    }
}

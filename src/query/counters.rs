//! Unread and starred counters, including recursive category totals.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::app::{Result, RivuletError};
use crate::config::EngineConfig;
use crate::domain::{Category, FeedReference, RawFeedRef, SpecialFeed};
use crate::plugin::PluginHost;
use crate::query::context::{CancelToken, RequestContext};
use crate::query::dispatch::{hours_before, strategy_predicate};
use crate::query::predicate::{Column, Predicate};
use crate::query::resolver::{self, ResolvedSelection};
use crate::store::Store;

/// An owner's categories as a parent → children map.
///
/// Traversals keep a visited set and stop at `max_depth`, so a corrupted
/// parent chain cannot loop.
#[derive(Debug, Clone, Default)]
pub struct CategoryForest {
    ids: Vec<i64>,
    children: HashMap<i64, Vec<i64>>,
    max_depth: usize,
}

impl CategoryForest {
    pub fn new(categories: &[Category], max_depth: usize) -> Self {
        let mut ids: Vec<i64> = categories.iter().map(|c| c.id).collect();
        ids.sort_unstable();

        let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
        for category in categories {
            if let Some(parent) = category.parent_id {
                children.entry(parent).or_default().push(category.id);
            }
        }
        for list in children.values_mut() {
            list.sort_unstable();
        }

        Self {
            ids,
            children,
            max_depth,
        }
    }

    pub fn load<S: Store>(store: &S, owner_uid: i64, max_depth: usize, cancel: &CancelToken) -> Result<Self> {
        Ok(Self::new(&store.get_categories(owner_uid, cancel)?, max_depth))
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }

    pub fn children(&self, id: i64) -> &[i64] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every category below `id`, sorted. `id` itself is not included.
    pub fn descendants(&self, id: i64) -> Vec<i64> {
        let mut seen = HashSet::from([id]);
        let mut out = Vec::new();
        let mut stack = vec![(id, 0usize)];

        while let Some((node, depth)) = stack.pop() {
            let children = self.children(node);
            if depth >= self.max_depth {
                if !children.is_empty() {
                    tracing::warn!(category = id, depth, "category tree too deep, ignoring deeper levels");
                }
                continue;
            }
            for &child in children {
                if !seen.insert(child) {
                    tracing::warn!(category = id, child, "category graph contains a cycle");
                    continue;
                }
                out.push(child);
                stack.push((child, depth + 1));
            }
        }

        out.sort_unstable();
        out
    }

    /// `own[id]` plus the own counts of all descendants.
    pub fn total(&self, id: i64, own: &HashMap<i64, i64>) -> i64 {
        let own_count = |c: &i64| own.get(c).copied().unwrap_or(0);
        own_count(&id) + self.descendants(id).iter().map(own_count).sum::<i64>()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UnreadMarked {
    pub unread: i64,
    pub marked: i64,
}

/// All counters an owner's sidebar shows, from one load of the feed
/// aggregates.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CountersSnapshot {
    pub feeds: BTreeMap<i64, UnreadMarked>,
    /// Recursive totals. Key `0` holds uncategorized feeds.
    pub categories: BTreeMap<i64, UnreadMarked>,
    /// Unread count per label id.
    pub labels: BTreeMap<i64, i64>,
    /// Unread count per special feed id.
    pub virtual_feeds: BTreeMap<i64, i64>,
    /// Unread articles in subscribed feeds.
    pub global_unread: i64,
}

pub struct Counters<'a, S: Store> {
    store: &'a S,
    plugins: &'a PluginHost,
    config: &'a EngineConfig,
}

impl<'a, S: Store> Counters<'a, S> {
    pub fn new(store: &'a S, plugins: &'a PluginHost, config: &'a EngineConfig) -> Self {
        Self {
            store,
            plugins,
            config,
        }
    }

    /// Counter shown next to one sidebar entry.
    pub fn count(
        &self,
        ctx: &RequestContext,
        raw: &RawFeedRef,
        is_cat: bool,
        unread_only: bool,
    ) -> Result<i64> {
        let selection = resolver::resolve(raw, is_cat, false, &ctx.prefs)
            .ok_or_else(|| RivuletError::UnresolvedFeedReference(raw.to_string()))?;
        self.count_resolved(ctx, &selection, is_cat, unread_only)
    }

    pub(crate) fn count_resolved(
        &self,
        ctx: &RequestContext,
        selection: &ResolvedSelection,
        is_cat: bool,
        unread_only: bool,
    ) -> Result<i64> {
        ctx.cancel.check()?;
        let unread = Predicate::eq(Column::Unread, true);

        let (filter, allow_archived) = match &selection.kind {
            FeedReference::Plugin(id) => {
                return Ok(self.plugins.feed_unread(*id, ctx)?.unwrap_or(0));
            }
            FeedReference::Special(_) if is_cat => return Ok(0),
            FeedReference::Special(SpecialFeed::RecentlyRead) => return Ok(0),
            // Categories count their own feeds only; children are added by
            // `category_unread`.
            FeedReference::Category(id) => (
                Predicate::all(vec![Predicate::eq(Column::CategoryId, *id), unread]),
                false,
            ),
            FeedReference::LabelsCategory | FeedReference::Label(_) => (
                Predicate::all(vec![strategy_predicate(selection, ctx, self.config, None), unread]),
                true,
            ),
            FeedReference::Uncategorized => (
                Predicate::all(vec![strategy_predicate(selection, ctx, self.config, None), unread]),
                false,
            ),
            _ => {
                let strategy = strategy_predicate(selection, ctx, self.config, None);
                let filter = if unread_only {
                    Predicate::all(vec![strategy, unread])
                } else {
                    strategy
                };
                (filter, true)
            }
        };

        self.store
            .count_matching(ctx.owner_uid, allow_archived, &filter, &ctx.cancel)
    }

    /// Unread articles in a category, optionally including every
    /// descendant category. `0` is the uncategorized bucket.
    pub fn category_unread(&self, ctx: &RequestContext, cat_id: i64, include_children: bool) -> Result<i64> {
        self.category_count(ctx, cat_id, include_children, Predicate::eq(Column::Unread, true))
    }

    /// Starred articles in a category's own feeds.
    pub fn category_marked(&self, ctx: &RequestContext, cat_id: i64) -> Result<i64> {
        self.category_count(ctx, cat_id, false, Predicate::eq(Column::Marked, true))
    }

    fn category_count(
        &self,
        ctx: &RequestContext,
        cat_id: i64,
        include_children: bool,
        state: Predicate,
    ) -> Result<i64> {
        ctx.cancel.check()?;
        let scope = if cat_id == 0 {
            Predicate::all(vec![
                Predicate::IsNull(Column::CategoryId),
                Predicate::NotNull(Column::FeedId),
            ])
        } else if include_children {
            let forest = CategoryForest::load(
                self.store,
                ctx.owner_uid,
                self.config.max_category_depth,
                &ctx.cancel,
            )?;
            let mut values = vec![cat_id];
            values.extend(forest.descendants(cat_id));
            Predicate::InList {
                column: Column::CategoryId,
                values,
            }
        } else {
            Predicate::eq(Column::CategoryId, cat_id)
        };

        self.store.count_matching(
            ctx.owner_uid,
            false,
            &Predicate::all(vec![scope, state]),
            &ctx.cancel,
        )
    }

    pub fn snapshot(&self, ctx: &RequestContext) -> Result<CountersSnapshot> {
        let owner = ctx.owner_uid;
        let fresh_since = hours_before(ctx.now, ctx.prefs.fresh_article_max_age);
        let rows = self.store.feed_counters(owner, fresh_since, &ctx.cancel)?;
        let feeds = self.store.get_feeds(owner, &ctx.cancel)?;
        let forest = CategoryForest::new(
            &self.store.get_categories(owner, &ctx.cancel)?,
            self.config.max_category_depth,
        );
        ctx.cancel.check()?;

        let mut snapshot = CountersSnapshot::default();
        for feed in &feeds {
            snapshot.feeds.insert(feed.id, UnreadMarked::default());
        }

        let mut own_unread: HashMap<i64, i64> = HashMap::new();
        let mut own_marked: HashMap<i64, i64> = HashMap::new();
        let (mut starred, mut published, mut fresh, mut all, mut archived) = (0, 0, 0, 0, 0);

        for row in &rows {
            starred += row.marked_unread;
            published += row.published_unread;
            all += row.unread;

            let Some(feed_id) = row.feed_id else {
                archived += row.unread;
                continue;
            };

            fresh += row.fresh_unread;
            snapshot.global_unread += row.unread;
            snapshot.feeds.insert(
                feed_id,
                UnreadMarked {
                    unread: row.unread,
                    marked: row.marked,
                },
            );

            let bucket = row.category_id.unwrap_or(0);
            *own_unread.entry(bucket).or_default() += row.unread;
            *own_marked.entry(bucket).or_default() += row.marked;
        }

        for &id in forest.ids() {
            snapshot.categories.insert(
                id,
                UnreadMarked {
                    unread: forest.total(id, &own_unread),
                    marked: forest.total(id, &own_marked),
                },
            );
        }
        snapshot.categories.insert(
            0,
            UnreadMarked {
                unread: own_unread.get(&0).copied().unwrap_or(0),
                marked: own_marked.get(&0).copied().unwrap_or(0),
            },
        );

        snapshot.labels = self
            .store
            .label_unread_counts(owner, &ctx.cancel)?
            .into_iter()
            .collect();

        for (special, count) in [
            (SpecialFeed::Starred, starred),
            (SpecialFeed::Published, published),
            (SpecialFeed::Fresh, fresh),
            (SpecialFeed::All, all),
            (SpecialFeed::Archived, archived),
            (SpecialFeed::RecentlyRead, 0),
        ] {
            snapshot.virtual_feeds.insert(special.id(), count);
        }

        tracing::debug!(
            owner,
            feeds = snapshot.feeds.len(),
            categories = snapshot.categories.len(),
            global_unread = snapshot.global_unread,
            "counters snapshot"
        );
        Ok(snapshot)
    }
}

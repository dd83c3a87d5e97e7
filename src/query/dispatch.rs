//! Turns a resolved selection and a request into one parameterized page
//! query plus the metadata shown above it.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::app::{Result, RivuletError};
use crate::config::EngineConfig;
use crate::domain::{FeedReference, SpecialFeed};
use crate::plugin::PluginHost;
use crate::query::context::RequestContext;
use crate::query::counters::{CategoryForest, Counters};
use crate::query::engine::HeadlineRequest;
use crate::query::order;
use crate::query::predicate::{Column, CompareOp, Membership, Predicate};
use crate::query::render::HeadlineQuery;
use crate::query::resolver::ResolvedSelection;
use crate::query::search::{self, CompiledSearch};
use crate::store::Store;

/// Which of the selection's rows a page shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum ViewMode {
    #[default]
    AllArticles,
    Unread,
    /// Unread rows when there are any, everything otherwise.
    Adaptive,
    Marked,
    Published,
    HasNote,
}

impl ViewMode {
    /// Unknown names fall back to [`ViewMode::AllArticles`].
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "unread" => Self::Unread,
            "adaptive" => Self::Adaptive,
            "marked" => Self::Marked,
            "published" => Self::Published,
            "has_note" => Self::HasNote,
            _ => Self::AllArticles,
        }
    }
}

impl From<String> for ViewMode {
    fn from(name: String) -> Self {
        Self::parse(&name)
    }
}

/// Header data for the feed being listed.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeedMeta {
    pub title: String,
    pub site_url: Option<String>,
    pub last_error: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl FeedMeta {
    fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct HeadlinePlan {
    pub selection: ResolvedSelection,
    pub query: HeadlineQuery,
    pub search: Option<CompiledSearch>,
    pub meta: FeedMeta,
}

impl HeadlinePlan {
    pub fn is_searching(&self) -> bool {
        self.search.is_some()
    }
}

pub(crate) fn hours_before(now: DateTime<Utc>, hours: i64) -> DateTime<Utc> {
    TimeDelta::try_hours(hours)
        .and_then(|delta| now.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn unread() -> Predicate {
    Predicate::eq(Column::Unread, true)
}

/// Base filter of a selection before view mode and search are applied.
///
/// `forest` supplies descendants when a category includes its children;
/// without it only the category itself is matched.
pub fn strategy_predicate(
    selection: &ResolvedSelection,
    ctx: &RequestContext,
    config: &EngineConfig,
    forest: Option<&CategoryForest>,
) -> Predicate {
    match &selection.kind {
        FeedReference::Feed(id) => Predicate::eq(Column::FeedId, *id),
        FeedReference::Category(id) => match forest {
            Some(forest) if selection.include_children => {
                let mut values = vec![*id];
                values.extend(forest.descendants(*id));
                Predicate::InList {
                    column: Column::CategoryId,
                    values,
                }
            }
            _ => Predicate::eq(Column::CategoryId, *id),
        },
        FeedReference::Uncategorized => Predicate::all(vec![
            Predicate::IsNull(Column::CategoryId),
            Predicate::NotNull(Column::FeedId),
        ]),
        FeedReference::LabelsCategory => Predicate::Member(Membership::AnyLabel {
            owner_uid: ctx.owner_uid,
        }),
        FeedReference::Label(id) => Predicate::Member(Membership::Label(*id)),
        FeedReference::Tag(name) => Predicate::Member(Membership::Tag {
            owner_uid: ctx.owner_uid,
            name: name.clone(),
        }),
        // Served by a plugin handler; never rendered.
        FeedReference::Plugin(_) => Predicate::False,
        FeedReference::Special(special) => match special {
            SpecialFeed::Starred => Predicate::eq(Column::Marked, true),
            SpecialFeed::Published => Predicate::eq(Column::Published, true),
            SpecialFeed::Fresh => {
                let hours = selection
                    .fresh_max_age_hours
                    .unwrap_or(ctx.prefs.fresh_article_max_age);
                Predicate::all(vec![
                    unread(),
                    Predicate::compare(Column::Score, CompareOp::Ge, 0),
                    Predicate::compare(
                        Column::DateEntered,
                        CompareOp::Gt,
                        hours_before(ctx.now, hours),
                    ),
                ])
            }
            SpecialFeed::All => Predicate::True,
            SpecialFeed::Archived => Predicate::IsNull(Column::FeedId),
            SpecialFeed::RecentlyRead => Predicate::all(vec![
                Predicate::eq(Column::Unread, false),
                Predicate::NotNull(Column::LastRead),
                Predicate::compare(
                    Column::LastRead,
                    CompareOp::Gt,
                    hours_before(ctx.now, config.recently_read_hours),
                ),
            ]),
        },
    }
}

/// Filter contributed by a fixed view mode. Adaptive is decided by the
/// planner because it needs a count.
fn view_predicate(mode: ViewMode, selection: &ResolvedSelection) -> Predicate {
    match mode {
        ViewMode::AllArticles | ViewMode::Adaptive => Predicate::True,
        ViewMode::Unread if selection.kind == FeedReference::Special(SpecialFeed::RecentlyRead) => {
            Predicate::True
        }
        ViewMode::Unread => unread(),
        ViewMode::Marked => Predicate::eq(Column::Marked, true),
        ViewMode::Published => Predicate::eq(Column::Published, true),
        ViewMode::HasNote => Predicate::all(vec![
            Predicate::NotNull(Column::Note),
            Predicate::compare(Column::Note, CompareOp::IsNot, ""),
        ]),
    }
}

/// Looks up the header data. Owned rows only; a missing feed, category or
/// label is an unresolved reference.
pub fn describe<S: Store>(
    store: &S,
    ctx: &RequestContext,
    selection: &ResolvedSelection,
    is_cat: bool,
) -> Result<FeedMeta> {
    let owner = ctx.owner_uid;
    let unresolved = |what: &str, id: i64| RivuletError::UnresolvedFeedReference(format!("{what} {id}"));

    let meta = match &selection.kind {
        FeedReference::Feed(id) => {
            let feed = store
                .get_feed(owner, *id, &ctx.cancel)?
                .ok_or_else(|| unresolved("feed", *id))?;
            FeedMeta {
                title: feed.display_title().to_string(),
                site_url: feed.site_url,
                last_error: feed.last_error,
                last_updated: feed.last_updated,
            }
        }
        FeedReference::Category(id) => {
            let category = store
                .get_category(owner, *id, &ctx.cancel)?
                .ok_or_else(|| unresolved("category", *id))?;
            FeedMeta::titled(category.title)
        }
        FeedReference::Uncategorized => FeedMeta::titled("Uncategorized"),
        FeedReference::LabelsCategory => FeedMeta::titled("Labels"),
        FeedReference::Special(_) if is_cat => FeedMeta::titled("Special"),
        FeedReference::Special(special) => FeedMeta::titled(special.title()),
        FeedReference::Label(id) => {
            let label = store
                .get_label(owner, *id, &ctx.cancel)?
                .ok_or_else(|| unresolved("label", *id))?;
            FeedMeta::titled(label.caption)
        }
        FeedReference::Tag(name) => FeedMeta::titled(name.clone()),
        FeedReference::Plugin(id) => FeedMeta::titled(format!("Plugin feed {id}")),
    };

    Ok(meta)
}

/// Compiles a search through the plugin chain or the built-in compiler and
/// degrades it when the storage rejects the full-text part.
fn compile_search<S: Store>(
    store: &S,
    plugins: &PluginHost,
    text: &str,
    language: Option<&str>,
    ctx: &RequestContext,
) -> Result<CompiledSearch> {
    let compiled = match plugins.translate_search(text, ctx) {
        Some(translated) => translated,
        None => search::compile(text, language, ctx, store)?,
    };

    if compiled.predicate.full_text_terms().is_empty() {
        return Ok(compiled);
    }

    if store.probe_search(ctx.owner_uid, &compiled.predicate, &ctx.cancel)? {
        Ok(compiled)
    } else {
        tracing::warn!(search = text, "full-text search rejected by storage, returning no rows");
        Ok(compiled.into_syntax_error())
    }
}

/// Builds the page query for `request`.
pub fn plan<S: Store>(
    store: &S,
    plugins: &PluginHost,
    config: &EngineConfig,
    request: &HeadlineRequest,
    selection: ResolvedSelection,
    ctx: &RequestContext,
) -> Result<HeadlinePlan> {
    let mut meta = describe(store, ctx, &selection, request.is_cat)?;

    let search_text = request
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    let search = match search_text {
        Some(text) => {
            meta.title = format!("Search results: {text}");
            Some(compile_search(
                store,
                plugins,
                text,
                request.search_language.as_deref(),
                ctx,
            )?)
        }
        None => None,
    };
    ctx.cancel.check()?;

    let forest = match selection.kind {
        FeedReference::Category(_) if selection.include_children => Some(CategoryForest::load(
            store,
            ctx.owner_uid,
            config.max_category_depth,
            &ctx.cancel,
        )?),
        _ => None,
    };
    let strategy = strategy_predicate(&selection, ctx, config, forest.as_ref());

    let view = match request.view_mode {
        ViewMode::Adaptive => adaptive_view(store, plugins, config, &selection, request, search.is_some(), ctx)?,
        mode => view_predicate(mode, &selection),
    };

    let search_filter = search
        .as_ref()
        .map(|s| s.predicate.clone())
        .unwrap_or(Predicate::True);
    let start_filter = request
        .start_ts
        .map(|ts| Predicate::compare(Column::DateEntered, CompareOp::Ge, ts))
        .unwrap_or(Predicate::True);
    let since_filter = request
        .since_id
        .map(|id| Predicate::compare(Column::EntryId, CompareOp::Gt, id))
        .unwrap_or(Predicate::True);

    let filter = Predicate::all(vec![search_filter, start_filter, view, since_filter, strategy]);
    let order = order::resolve(&request.order_by, &selection, &ctx.prefs, plugins);

    let query = HeadlineQuery {
        owner_uid: ctx.owner_uid,
        allow_archived: selection.allow_archived,
        filter,
        order,
        distinct: !ctx.prefs.headlines_no_distinct
            || selection.kind == FeedReference::LabelsCategory,
        include_content: request.include_content,
        limit: Some(config.clamp_limit(request.page.limit)),
        offset: request.page.offset.max(0),
    };

    tracing::debug!(
        feed = %request.feed,
        is_cat = request.is_cat,
        filter = ?query.filter,
        distinct = query.distinct,
        limit = ?query.limit,
        offset = query.offset,
        "planned headline query"
    );

    Ok(HeadlinePlan {
        selection,
        query,
        search,
        meta,
    })
}

fn adaptive_view<S: Store>(
    store: &S,
    plugins: &PluginHost,
    config: &EngineConfig,
    selection: &ResolvedSelection,
    request: &HeadlineRequest,
    searching: bool,
    ctx: &RequestContext,
) -> Result<Predicate> {
    if searching || selection.kind == FeedReference::Special(SpecialFeed::Starred) {
        return Ok(Predicate::True);
    }

    let counters = Counters::new(store, plugins, config);
    let unread_count = match selection.kind {
        FeedReference::Category(id) if selection.include_children => {
            counters.category_unread(ctx, id, true)?
        }
        _ => counters.count_resolved(ctx, selection, request.is_cat, true)?,
    };

    tracing::debug!(unread = unread_count, "adaptive view");
    Ok(if unread_count > 0 { unread() } else { Predicate::True })
}

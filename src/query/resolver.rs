use crate::domain::{FeedReference, OwnerPrefs, RawFeedRef, SpecialFeed};
use crate::query::order::{SortColumn, SortKey, SortSpec};

/// Outcome of classifying a caller's feed reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSelection {
    pub kind: FeedReference,
    /// The caller asked for the category view of this id.
    pub is_cat: bool,
    /// Descendant categories are included (category views only).
    pub include_children: bool,
    /// Rows whose owning feed was deleted (`feed_id IS NULL`) may match.
    pub allow_archived: bool,
    pub default_order_override: Option<SortSpec>,
    pub ignore_vfeed_grouping: bool,
    /// Rows come from more than one feed and carry their feed's title.
    pub is_virtual_feed: bool,
    /// Age window for the Fresh feed, in hours.
    pub fresh_max_age_hours: Option<i64>,
}

impl ResolvedSelection {
    fn new(kind: FeedReference, is_cat: bool) -> Self {
        Self {
            kind,
            is_cat,
            include_children: false,
            allow_archived: false,
            default_order_override: None,
            ignore_vfeed_grouping: false,
            is_virtual_feed: true,
            fresh_max_age_hours: None,
        }
    }

    /// A plugin handler serves this selection; the built-in pipeline is
    /// bypassed.
    pub fn plugin_feed(&self) -> Option<i64> {
        match self.kind {
            FeedReference::Plugin(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_tag(&self) -> bool {
        self.kind.is_tag()
    }
}

fn last_column_first(column: SortColumn) -> SortSpec {
    SortSpec::new(vec![
        SortKey::desc(column),
        SortKey::desc(SortColumn::DateEntered),
        SortKey::desc(SortColumn::Updated),
    ])
}

/// Resolves a raw reference. Pure: the result depends only on the
/// arguments. Returns `None` when the reference addresses nothing.
pub fn resolve(
    raw: &RawFeedRef,
    is_cat: bool,
    include_children: bool,
    prefs: &OwnerPrefs,
) -> Option<ResolvedSelection> {
    let kind = FeedReference::classify(raw, is_cat)?;
    let mut selection = ResolvedSelection::new(kind, is_cat);

    match &selection.kind {
        FeedReference::Feed(_) | FeedReference::Plugin(_) => {
            selection.is_virtual_feed = false;
        }
        FeedReference::Category(_) => {
            selection.include_children = include_children;
        }
        FeedReference::Uncategorized | FeedReference::LabelsCategory => {}
        FeedReference::Label(_) | FeedReference::Tag(_) => {
            selection.allow_archived = true;
        }
        FeedReference::Special(special) => match special {
            SpecialFeed::Archived => {
                selection.allow_archived = true;
                selection.is_virtual_feed = false;
            }
            SpecialFeed::Starred => {
                selection.allow_archived = true;
                selection.default_order_override = Some(last_column_first(SortColumn::LastMarked));
            }
            SpecialFeed::Published => {
                selection.allow_archived = true;
                selection.default_order_override =
                    Some(last_column_first(SortColumn::LastPublished));
            }
            SpecialFeed::Fresh => {
                selection.fresh_max_age_hours = Some(prefs.fresh_article_max_age);
            }
            SpecialFeed::All => {
                selection.allow_archived = true;
            }
            SpecialFeed::RecentlyRead => {
                selection.allow_archived = true;
                selection.ignore_vfeed_grouping = true;
                selection.default_order_override =
                    Some(SortSpec::new(vec![SortKey::desc(SortColumn::LastRead)]));
            }
        },
    }

    Some(selection)
}

use serde::{Deserialize, Serialize};

use crate::domain::{FeedReference, OwnerPrefs, SpecialFeed};
use crate::plugin::PluginHost;
use crate::query::resolver::ResolvedSelection;

/// Virtual feeds that are never clustered by feed. Category views of the
/// same ids are.
pub const NEVER_GROUP_FEEDS: [SpecialFeed; 2] = [SpecialFeed::RecentlyRead, SpecialFeed::Archived];

/// Virtual feeds clustered by feed only, without the week bucket. Category
/// views of the same ids keep the bucket.
pub const NEVER_GROUP_BY_DATE: [SpecialFeed; 3] =
    [SpecialFeed::Published, SpecialFeed::Starred, SpecialFeed::Fresh];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortColumn {
    Score,
    DateEntered,
    Updated,
    Title,
    LastMarked,
    LastPublished,
    LastRead,
    FeedTitle,
    /// ISO year and week of `date_entered`.
    YearWeek,
}

impl SortColumn {
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Score => "e.score",
            Self::DateEntered => "e.date_entered",
            Self::Updated => "e.updated",
            Self::Title => "e.title",
            Self::LastMarked => "ue.last_marked",
            Self::LastPublished => "ue.last_published",
            Self::LastRead => "ue.last_read",
            Self::FeedTitle => "f.title",
            Self::YearWeek => "iso_year_week(e.date_entered)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub const fn sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub column: SortColumn,
    pub direction: SortDirection,
}

impl SortKey {
    pub const fn asc(column: SortColumn) -> Self {
        Self {
            column,
            direction: SortDirection::Asc,
        }
    }

    pub const fn desc(column: SortColumn) -> Self {
        Self {
            column,
            direction: SortDirection::Desc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub keys: Vec<SortKey>,
    /// Disables the pagination guard for this ordering.
    pub skip_first_id_check: bool,
    pub ignore_grouping: bool,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self::new(vec![
            SortKey::desc(SortColumn::Score),
            SortKey::desc(SortColumn::DateEntered),
            SortKey::desc(SortColumn::Updated),
        ])
    }
}

impl SortSpec {
    pub fn new(keys: Vec<SortKey>) -> Self {
        Self {
            keys,
            skip_first_id_check: false,
            ignore_grouping: false,
        }
    }

    /// Orders selectable by name from the headline toolbar.
    pub fn from_alias(alias: &str) -> Option<Self> {
        match alias.trim() {
            "title" => Some(Self::new(vec![
                SortKey::asc(SortColumn::Title),
                SortKey::asc(SortColumn::DateEntered),
                SortKey::asc(SortColumn::Updated),
            ])),
            "date_reverse" => Some(Self {
                // Oldest-first shifts under every insert; the guard would
                // only report false invalidations.
                skip_first_id_check: true,
                ..Self::new(vec![SortKey::asc(SortColumn::Updated)])
            }),
            "feed_dates" => Some(Self::new(vec![SortKey::desc(SortColumn::Updated)])),
            _ => None,
        }
    }

    /// `ORDER BY` body. Always ends with the article id so equal keys page
    /// deterministically.
    pub fn to_sql(&self) -> String {
        let mut parts: Vec<String> = self
            .keys
            .iter()
            .map(|k| format!("{} {}", k.column.sql(), k.direction.sql()))
            .collect();
        parts.push("e.id DESC".to_string());
        parts.join(", ")
    }

    pub fn is_grouped(&self) -> bool {
        self.keys
            .first()
            .is_some_and(|k| matches!(k.column, SortColumn::YearWeek | SortColumn::FeedTitle))
    }
}

/// Picks the ordering for a headline request.
///
/// Precedence: plugin override, toolbar alias, the selection's own default,
/// then score/date. The feed grouping overlay is applied on top.
pub fn resolve(
    order_by: &str,
    selection: &ResolvedSelection,
    prefs: &OwnerPrefs,
    plugins: &PluginHost,
) -> SortSpec {
    let mut spec = plugins
        .override_order(order_by)
        .or_else(|| SortSpec::from_alias(order_by))
        .or_else(|| selection.default_order_override.clone())
        .unwrap_or_default();

    if selection.ignore_vfeed_grouping {
        spec.ignore_grouping = true;
    }

    if prefs.vfeed_group_by_feed && selection.is_virtual_feed && !spec.ignore_grouping {
        let weeks = if order_by.trim() == "date_reverse" {
            SortDirection::Asc
        } else {
            SortDirection::Desc
        };
        apply_grouping(&mut spec, selection, weeks);
    }

    tracing::debug!(order = %spec.to_sql(), skip_first_id = spec.skip_first_id_check, "resolved order");
    spec
}

fn apply_grouping(spec: &mut SortSpec, selection: &ResolvedSelection, weeks: SortDirection) {
    let special = match selection.kind {
        FeedReference::Special(special) if !selection.is_cat => Some(special),
        _ => None,
    };

    if special.is_some_and(|s| NEVER_GROUP_FEEDS.contains(&s)) {
        return;
    }

    let mut keys = Vec::with_capacity(spec.keys.len() + 2);
    if !special.is_some_and(|s| NEVER_GROUP_BY_DATE.contains(&s)) {
        keys.push(SortKey {
            column: SortColumn::YearWeek,
            direction: weeks,
        });
    }
    keys.push(SortKey::asc(SortColumn::FeedTitle));
    keys.append(&mut spec.keys);
    spec.keys = keys;
}

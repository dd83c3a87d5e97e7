use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::label::{feed_to_label_id, LABEL_BASE_INDEX};

/// Upper bound (exclusive) of the feed ids served by plugin handlers.
/// Plugin ids occupy `LABEL_BASE_INDEX < id < PLUGIN_FEED_BASE_INDEX`.
pub const PLUGIN_FEED_BASE_INDEX: i64 = -128;

pub fn feed_to_plugin_feed_id(feed_id: i64) -> i64 {
    PLUGIN_FEED_BASE_INDEX - 1 + feed_id.abs()
}

pub fn plugin_feed_to_feed_id(plugin_feed_id: i64) -> i64 {
    PLUGIN_FEED_BASE_INDEX - 1 - plugin_feed_id.abs()
}

/// Caller-supplied reference, before classification.
///
/// Deserializes from a JSON number or string; strings go through
/// [`RawFeedRef::parse`], so `"-3"` is the Fresh feed, not a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RawFeedRef {
    Id(i64),
    Name(String),
}

impl<'de> Deserialize<'de> for RawFeedRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Id(i64),
            Name(String),
        }

        Ok(match Wire::deserialize(deserializer)? {
            Wire::Id(id) => Self::Id(id),
            Wire::Name(name) => Self::parse(&name),
        })
    }
}

impl RawFeedRef {
    /// Numeric strings are ids; anything else names a tag.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<i64>() {
            Ok(id) => Self::Id(id),
            Err(_) => Self::Name(trimmed.to_string()),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Id(_))
    }
}

impl From<i64> for RawFeedRef {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for RawFeedRef {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl fmt::Display for RawFeedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{}", id),
            Self::Name(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecialFeed {
    Starred,
    Published,
    Fresh,
    All,
    Archived,
    RecentlyRead,
}

impl SpecialFeed {
    pub const fn id(self) -> i64 {
        match self {
            Self::Archived => 0,
            Self::Starred => -1,
            Self::Published => -2,
            Self::Fresh => -3,
            Self::All => -4,
            Self::RecentlyRead => -6,
        }
    }

    pub const fn title(self) -> &'static str {
        match self {
            Self::Starred => "Starred articles",
            Self::Published => "Published articles",
            Self::Fresh => "Fresh articles",
            Self::All => "All articles",
            Self::Archived => "Archived articles",
            Self::RecentlyRead => "Recently read",
        }
    }
}

/// A classified reference. Every numeric id maps to exactly one variant;
/// nothing else in the crate re-derives meaning from raw ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedReference {
    Feed(i64),
    Category(i64),
    Uncategorized,
    /// Category view of `-2`: every labelled article.
    LabelsCategory,
    Special(SpecialFeed),
    /// Decoded label id (not the virtual feed id).
    Label(i64),
    /// Decoded plugin feed id.
    Plugin(i64),
    Tag(String),
}

impl FeedReference {
    /// Classifies a raw reference. Returns `None` for ids inside a reserved
    /// range that addresses nothing.
    pub fn classify(raw: &RawFeedRef, is_cat: bool) -> Option<Self> {
        let id = match raw {
            RawFeedRef::Id(id) => *id,
            RawFeedRef::Name(name) => match RawFeedRef::parse(name) {
                RawFeedRef::Id(id) => id,
                RawFeedRef::Name(name) if name.is_empty() => return None,
                RawFeedRef::Name(name) => return Some(Self::Tag(name)),
            },
        };

        let reference = match (id, is_cat) {
            (id, false) if id > 0 => Self::Feed(id),
            (id, true) if id > 0 => Self::Category(id),
            (0, true) => Self::Uncategorized,
            (0, false) => Self::Special(SpecialFeed::Archived),
            (-1, _) => Self::Special(SpecialFeed::Starred),
            (-2, false) => Self::Special(SpecialFeed::Published),
            (-2, true) => Self::LabelsCategory,
            (-3, _) => Self::Special(SpecialFeed::Fresh),
            (-4, _) => Self::Special(SpecialFeed::All),
            (-6, _) => Self::Special(SpecialFeed::RecentlyRead),
            (id, _) if id < LABEL_BASE_INDEX => Self::Label(feed_to_label_id(id)),
            (id, false) if id < PLUGIN_FEED_BASE_INDEX => {
                Self::Plugin(feed_to_plugin_feed_id(id))
            }
            _ => return None,
        };

        Some(reference)
    }

    pub fn is_tag(&self) -> bool {
        matches!(self, Self::Tag(_))
    }

    pub fn is_category_view(&self) -> bool {
        matches!(
            self,
            Self::Category(_) | Self::Uncategorized | Self::LabelsCategory
        )
    }
}

pub mod article;
pub mod feed;
pub mod label;
pub mod prefs;
pub mod reference;

pub use article::{ArticleEntry, Headline, UserArticleEntry};
pub use feed::{Category, Feed};
pub use label::{feed_to_label_id, label_to_feed_id, Label, LABEL_BASE_INDEX};
pub use prefs::{OwnerPrefs, OwnerTimezone};
pub use reference::{FeedReference, RawFeedRef, SpecialFeed, PLUGIN_FEED_BASE_INDEX};

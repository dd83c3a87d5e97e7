use serde::{Deserialize, Serialize};

/// Upper bound (exclusive) of the feed ids that address labels.
pub const LABEL_BASE_INDEX: i64 = -1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub id: i64,
    pub owner_uid: i64,
    pub caption: String,
}

impl Label {
    /// The virtual feed id under which this label is browsed.
    pub fn feed_id(&self) -> i64 {
        label_to_feed_id(self.id)
    }
}

pub fn label_to_feed_id(label_id: i64) -> i64 {
    LABEL_BASE_INDEX - 1 - label_id.abs()
}

pub fn feed_to_label_id(feed_id: i64) -> i64 {
    LABEL_BASE_INDEX - 1 + feed_id.abs()
}

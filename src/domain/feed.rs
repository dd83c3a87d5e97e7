use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feed {
    pub id: i64,
    pub owner_uid: i64,
    pub url: String,
    pub title: Option<String>,
    pub site_url: Option<String>,
    pub category_id: Option<i64>,
    pub last_error: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Feed {
    pub fn new(owner_uid: i64, url: String) -> Self {
        Self {
            id: 0,
            owner_uid,
            url,
            title: None,
            site_url: None,
            category_id: None,
            last_error: None,
            last_updated: None,
        }
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.url)
    }
}

/// A node of an owner's category forest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub owner_uid: i64,
    pub parent_id: Option<i64>,
    pub title: String,
}

impl Category {
    pub fn new(owner_uid: i64, title: impl Into<String>) -> Self {
        Self {
            id: 0,
            owner_uid,
            parent_id: None,
            title: title.into(),
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A deduplicated article as supplied by ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleEntry {
    pub id: i64,
    pub guid: String,
    pub title: String,
    pub link: Option<String>,
    pub content: String,
    pub author: Option<String>,
    pub score: i64,
    pub date_entered: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl ArticleEntry {
    pub fn new(guid: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            guid: guid.into(),
            title: title.into(),
            link: None,
            content: String::new(),
            author: None,
            score: 0,
            date_entered: now,
            updated: now,
        }
    }

    /// Hash of the article body, recomputed whenever content changes.
    pub fn content_hash(&self) -> String {
        hash_content(&self.content)
    }
}

pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Per-owner state of one article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserArticleEntry {
    pub int_id: i64,
    pub ref_id: i64,
    pub owner_uid: i64,
    /// `None` once the article is archived (its feed was removed).
    pub feed_id: Option<i64>,
    pub unread: bool,
    pub marked: bool,
    pub published: bool,
    pub note: Option<String>,
    pub last_read: Option<DateTime<Utc>>,
    pub last_marked: Option<DateTime<Utc>>,
    pub last_published: Option<DateTime<Utc>>,
    pub label_cache: String,
    pub tag_cache: String,
}

impl UserArticleEntry {
    pub fn new(owner_uid: i64, feed_id: Option<i64>) -> Self {
        Self {
            int_id: 0,
            ref_id: 0,
            owner_uid,
            feed_id,
            unread: true,
            marked: false,
            published: false,
            note: None,
            last_read: None,
            last_marked: None,
            last_published: None,
            label_cache: String::new(),
            tag_cache: String::new(),
        }
    }
}

/// One row of a headline page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Headline {
    pub id: i64,
    pub int_id: i64,
    pub guid: String,
    pub title: String,
    pub link: Option<String>,
    pub author: Option<String>,
    pub content: Option<String>,
    pub score: i64,
    pub date_entered: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub unread: bool,
    pub marked: bool,
    pub published: bool,
    pub note: Option<String>,
    pub feed_id: Option<i64>,
    pub feed_title: Option<String>,
    pub last_read: Option<DateTime<Utc>>,
    pub last_marked: Option<DateTime<Utc>>,
    pub last_published: Option<DateTime<Utc>>,
    pub label_cache: String,
    pub tag_cache: String,
    /// ISO year-week bucket (`IYYY-IW`) of `date_entered`.
    pub year_week: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_deterministic() {
        let mut a = ArticleEntry::new("guid-1", "A");
        a.content = "<p>body</p>".into();
        let mut b = ArticleEntry::new("guid-2", "B");
        b.content = "<p>body</p>".into();
        assert_eq!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn test_content_hash_is_hex_sha256() {
        let hash = ArticleEntry::new("guid-1", "A").content_hash();
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_new_user_entry_starts_unread() {
        let entry = UserArticleEntry::new(1, Some(3));
        assert!(entry.unread);
        assert!(!entry.marked);
        assert_eq!(entry.feed_id, Some(3));
    }
}

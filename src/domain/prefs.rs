use chrono::{FixedOffset, Offset, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

pub const FRESH_ARTICLE_MAX_AGE: &str = "FRESH_ARTICLE_MAX_AGE";
pub const VFEED_GROUP_BY_FEED: &str = "VFEED_GROUP_BY_FEED";
pub const HEADLINES_NO_DISTINCT: &str = "HEADLINES_NO_DISTINCT";
pub const DEFAULT_SEARCH_LANGUAGE: &str = "DEFAULT_SEARCH_LANGUAGE";
pub const USER_TIMEZONE: &str = "USER_TIMEZONE";

/// Per-owner preferences consulted while building a headline query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OwnerPrefs {
    /// Hours an unread article stays "fresh".
    pub fresh_article_max_age: i64,
    pub vfeed_group_by_feed: bool,
    pub headlines_no_distinct: bool,
    pub default_search_language: String,
    /// IANA zone name such as `Europe/Berlin`, `UTC` or a fixed offset
    /// such as `+02:00`.
    pub timezone: String,
}

impl Default for OwnerPrefs {
    fn default() -> Self {
        Self {
            fresh_article_max_age: 24,
            vfeed_group_by_feed: false,
            headlines_no_distinct: false,
            default_search_language: "simple".into(),
            timezone: "UTC".into(),
        }
    }
}

impl OwnerPrefs {
    /// Applies stored `(name, value)` rows on top of `defaults`.
    pub fn from_rows<I>(defaults: &OwnerPrefs, rows: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut prefs = defaults.clone();

        for (name, value) in rows {
            let value = value.trim();
            match name.as_str() {
                FRESH_ARTICLE_MAX_AGE => match value.parse::<i64>() {
                    Ok(hours) if hours >= 0 => prefs.fresh_article_max_age = hours,
                    _ => tracing::warn!(pref = %name, value, "ignoring invalid preference value"),
                },
                VFEED_GROUP_BY_FEED => match parse_bool(value) {
                    Some(b) => prefs.vfeed_group_by_feed = b,
                    None => tracing::warn!(pref = %name, value, "ignoring invalid preference value"),
                },
                HEADLINES_NO_DISTINCT => match parse_bool(value) {
                    Some(b) => prefs.headlines_no_distinct = b,
                    None => tracing::warn!(pref = %name, value, "ignoring invalid preference value"),
                },
                DEFAULT_SEARCH_LANGUAGE if !value.is_empty() => {
                    prefs.default_search_language = value.to_lowercase();
                }
                USER_TIMEZONE => {
                    if OwnerTimezone::parse(value).is_some() {
                        prefs.timezone = value.to_string();
                    } else {
                        tracing::warn!(pref = %name, value, "ignoring invalid preference value");
                    }
                }
                _ => {}
            }
        }

        prefs
    }

    /// The owner's zone; UTC when the stored name is not understood.
    pub fn timezone(&self) -> OwnerTimezone {
        OwnerTimezone::parse(&self.timezone).unwrap_or(OwnerTimezone::Fixed(utc()))
    }
}

/// Zone in which an owner's dates are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerTimezone {
    /// Named zone; its offset follows daylight saving.
    Named(Tz),
    Fixed(FixedOffset),
}

impl OwnerTimezone {
    /// Fixed offsets first, then IANA names.
    pub fn parse(value: &str) -> Option<Self> {
        parse_offset(value)
            .map(Self::Fixed)
            .or_else(|| value.trim().parse::<Tz>().ok().map(Self::Named))
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parses `UTC`, `Z`, `GMT`, `+HH`, `+HH:MM` or `+HHMM`.
pub fn parse_offset(value: &str) -> Option<FixedOffset> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("utc") || value.eq_ignore_ascii_case("gmt") || value == "Z" {
        return Some(utc());
    }

    let (sign, rest) = match value.as_bytes().first()? {
        b'+' => (1, &value[1..]),
        b'-' => (-1, &value[1..]),
        _ => return None,
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        1 | 2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if hours > 14 || minutes > 59 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

//! `@date` tokens of the search language.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc};

use crate::domain::OwnerTimezone;

const ABSOLUTE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y", "%Y%m%d"];

/// Turns the text after `@` into the UTC calendar day it denotes, as
/// `YYYY-MM-DD`.
///
/// The text is read in the owner's timezone: an absolute date means local
/// midnight of that day, a relative one is measured back from `now`.
pub fn parse_search_date(text: &str, now: DateTime<Utc>, timezone: OwnerTimezone) -> Option<String> {
    match timezone {
        OwnerTimezone::Named(tz) => in_zone(text, now, &tz),
        OwnerTimezone::Fixed(offset) => in_zone(text, now, &offset),
    }
}

fn in_zone<Z: TimeZone>(text: &str, now: DateTime<Utc>, tz: &Z) -> Option<String> {
    let local = parse_local(text.trim(), now.with_timezone(tz))?;
    Some(local.with_timezone(&Utc).format("%Y-%m-%d").to_string())
}

fn parse_local<Z: TimeZone>(text: &str, now: DateTime<Z>) -> Option<DateTime<Z>> {
    let lower = text.to_lowercase();
    let today = now.date_naive();
    let tz = now.timezone();

    match lower.as_str() {
        "" => return None,
        "now" => return Some(now),
        "today" => return midnight(today, &tz),
        "yesterday" => return midnight(today - Duration::days(1), &tz),
        "tomorrow" => return midnight(today + Duration::days(1), &tz),
        _ => {}
    }

    for format in ABSOLUTE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(&lower, format) {
            return midnight(date, &tz);
        }
    }

    relative(&lower, now)
}

/// Start of `date` in `tz`. A day whose midnight is skipped by a DST jump
/// starts an hour later.
fn midnight<Z: TimeZone>(date: NaiveDate, tz: &Z) -> Option<DateTime<Z>> {
    let start = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&start)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(start + TimeDelta::hours(1))).earliest())
}

/// `3 days ago`, `-2 weeks`, `+1 day`, `1week`.
fn relative<Z: TimeZone>(text: &str, now: DateTime<Z>) -> Option<DateTime<Z>> {
    let (text, ago) = match text.strip_suffix("ago") {
        Some(rest) => (rest.trim_end(), true),
        None => (text, false),
    };

    if ago && text.starts_with(['+', '-']) {
        return None;
    }

    let (sign, rest) = match text.as_bytes().first()? {
        b'-' => (-1, &text[1..]),
        b'+' => (1, &text[1..]),
        _ if ago => (-1, text),
        _ => (1, text),
    };

    let rest = rest.trim_start();
    let digits = rest.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let amount: i64 = rest[..digits].parse().ok()?;
    let unit = rest[digits..].trim();

    let step = match unit.trim_end_matches('s') {
        "min" | "minute" => Duration::try_minutes(amount)?,
        "hour" | "h" => Duration::try_hours(amount)?,
        "day" | "d" => Duration::try_days(amount)?,
        "week" | "w" => Duration::try_weeks(amount)?,
        "month" => Duration::try_days(amount.checked_mul(30)?)?,
        "year" | "y" => Duration::try_days(amount.checked_mul(365)?)?,
        _ => return None,
    };

    if sign < 0 {
        now.checked_sub_signed(step)
    } else {
        now.checked_add_signed(step)
    }
}

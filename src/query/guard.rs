//! Pagination consistency check.
//!
//! A caller paging through a listing remembers the id of the first row it
//! saw. If an article arrived since then and now sorts ahead of that row,
//! every later offset is shifted by one; the caller has to start over.

use chrono::{DateTime, TimeDelta, Utc};

use crate::app::Result;
use crate::query::context::RequestContext;
use crate::query::dispatch::HeadlinePlan;
use crate::query::engine::{HeadlineRequest, PageWindow};
use crate::query::render::HeadlineQuery;
use crate::store::Store;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuardOutcome {
    /// First row among recent arrivals, under the page's filter and order.
    pub first_id: Option<i64>,
    pub invalidated: bool,
}

/// Tags, searches and orderings that opt out are never checked.
pub fn applies(plan: &HeadlinePlan, request: &HeadlineRequest) -> bool {
    !plan.selection.is_tag()
        && !plan.is_searching()
        && !plan.query.order.skip_first_id_check
        && !request.skip_first_id_check
}

fn window_start(now: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
    TimeDelta::try_minutes(minutes)
        .and_then(|window| now.checked_sub_signed(window))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub fn check<S: Store>(
    store: &S,
    query: &HeadlineQuery,
    page: &PageWindow,
    ctx: &RequestContext,
    window_minutes: i64,
) -> Result<GuardOutcome> {
    let since = window_start(ctx.now, window_minutes);
    let first_id = store.first_headline_id(query, since, &ctx.cancel)?;

    let invalidated = match (first_id, page.expected_first_id) {
        (Some(current), Some(expected)) => page.offset > 0 && expected != 0 && current != expected,
        _ => false,
    };

    tracing::debug!(?first_id, expected = ?page.expected_first_id, invalidated, "first id probe");
    Ok(GuardOutcome {
        first_id,
        invalidated,
    })
}

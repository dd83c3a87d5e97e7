//! Headline query pipeline: reference resolution, search compilation,
//! ordering, planning, pagination guard and counters.

pub mod context;
pub mod counters;
pub mod dates;
pub mod dispatch;
pub mod engine;
pub mod guard;
pub mod order;
pub mod predicate;
pub mod render;
pub mod resolver;
pub mod search;

#[cfg(test)]
pub(crate) mod fixtures;

pub use context::{CancelToken, RequestContext};
pub use counters::{Counters, CountersSnapshot};
pub use dispatch::ViewMode;
pub use engine::{HeadlineEngine, HeadlineRequest, Headlines, PageWindow};

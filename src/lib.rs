//! # Rivulet Headlines
//!
//! The headline query engine behind the Rivulet reader: lists an owner's
//! articles for a feed, category, label, tag or virtual feed, and computes
//! the unread counters shown next to each of them.
//!
//! ## Architecture
//!
//! ```text
//! RawFeedRef → Resolver → Planner (search, view, order) → Guard → Store
//!                                                          ↑
//!                                          SQLite (+ full-text functions)
//! ```
//!
//! - [`query`]: reference resolution, search compiler, ordering, planner,
//!   pagination guard and counters
//! - [`store`]: storage trait and its SQLite implementation
//! - [`plugin`]: typed extension points consulted by the engine
//!
//! ## Quick Start
//!
//! ```no_run
//! use rivulet_headlines::app::AppContext;
//! use rivulet_headlines::config::Config;
//! use rivulet_headlines::query::{HeadlineRequest, ViewMode};
//!
//! # fn main() -> rivulet_headlines::app::Result<()> {
//! let app = AppContext::new(Config::default())?;
//! let ctx = app.context_for(1)?;
//! let request = HeadlineRequest::new(-3)
//!     .with_view(ViewMode::Unread)
//!     .with_search("title:rust @yesterday");
//! let page = app.engine.headlines(&request, &ctx)?;
//! println!("{}: {} rows", page.meta.title, page.rows.len());
//! # Ok(())
//! # }
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together the store,
/// the engine and the loaded configuration.
pub mod app;

/// Configuration management.
///
/// Loads from `~/.config/rivulet/headlines.toml`: database location,
/// engine limits and owner preference defaults.
pub mod config;

/// Core domain models.
///
/// - [`FeedReference`](domain::FeedReference): classified feed/category/label/tag id
/// - [`Headline`](domain::Headline): one row of a listing
/// - [`OwnerPrefs`](domain::OwnerPrefs): per-owner preferences
pub mod domain;

/// Tracing subscriber setup.
pub mod logging;

/// Extension points: search translators, order overrides and plugin feeds.
pub mod plugin;

/// Headline query pipeline.
///
/// - [`HeadlineEngine`](query::HeadlineEngine): entry point for listings
/// - [`Counters`](query::Counters): unread/starred counters
/// - [`search`](query::search): the search micro-language
pub mod query;

/// SQLite persistence layer.
///
/// - [`Store`](store::Store): Trait defining storage operations
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;

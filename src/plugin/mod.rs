//! Extension points consulted by the headline engine.
//!
//! Each list is walked in registration order and the first `Some` wins.
//! Plugins hand back typed predicates and sort specs, never SQL text.

use crate::app::Result;
use crate::query::context::RequestContext;
use crate::query::engine::{HeadlineRequest, Headlines};
use crate::query::order::SortSpec;
use crate::query::search::CompiledSearch;

/// Replaces the built-in search compiler.
pub trait SearchTranslator: Send + Sync {
    fn translate(&self, search: &str, ctx: &RequestContext) -> Option<CompiledSearch>;
}

/// Replaces the built-in ordering for an `order_by` value.
pub trait OrderOverride: Send + Sync {
    fn override_order(&self, order_by: &str) -> Option<SortSpec>;
}

/// Serves the plugin feed id range. `pfeed_id` is the decoded plugin id.
pub trait VirtualFeedHandler: Send + Sync {
    fn headlines(
        &self,
        pfeed_id: i64,
        request: &HeadlineRequest,
        ctx: &RequestContext,
    ) -> Result<Option<Headlines>>;

    fn unread_count(&self, pfeed_id: i64, ctx: &RequestContext) -> Result<Option<i64>>;
}

#[derive(Default)]
pub struct PluginHost {
    search: Vec<Box<dyn SearchTranslator>>,
    order: Vec<Box<dyn OrderOverride>>,
    feeds: Vec<Box<dyn VirtualFeedHandler>>,
}

impl std::fmt::Debug for PluginHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHost")
            .field("search", &self.search.len())
            .field("order", &self.order.len())
            .field("feeds", &self.feeds.len())
            .finish()
    }
}

impl PluginHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_search_translator(&mut self, plugin: impl SearchTranslator + 'static) {
        self.search.push(Box::new(plugin));
    }

    pub fn add_order_override(&mut self, plugin: impl OrderOverride + 'static) {
        self.order.push(Box::new(plugin));
    }

    pub fn add_feed_handler(&mut self, plugin: impl VirtualFeedHandler + 'static) {
        self.feeds.push(Box::new(plugin));
    }

    pub fn translate_search(&self, search: &str, ctx: &RequestContext) -> Option<CompiledSearch> {
        self.search.iter().find_map(|p| p.translate(search, ctx))
    }

    pub fn override_order(&self, order_by: &str) -> Option<SortSpec> {
        self.order.iter().find_map(|p| p.override_order(order_by))
    }

    pub fn feed_headlines(
        &self,
        pfeed_id: i64,
        request: &HeadlineRequest,
        ctx: &RequestContext,
    ) -> Result<Option<Headlines>> {
        for handler in &self.feeds {
            if let Some(headlines) = handler.headlines(pfeed_id, request, ctx)? {
                return Ok(Some(headlines));
            }
        }
        Ok(None)
    }

    pub fn feed_unread(&self, pfeed_id: i64, ctx: &RequestContext) -> Result<Option<i64>> {
        for handler in &self.feeds {
            if let Some(count) = handler.unread_count(pfeed_id, ctx)? {
                return Ok(Some(count));
            }
        }
        Ok(None)
    }
}

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::app::error::{Result, RivuletError};
use crate::config::Config;
use crate::plugin::PluginHost;
use crate::query::{CancelToken, CountersSnapshot, HeadlineEngine, HeadlineRequest, Headlines, RequestContext};
use crate::store::sqlite::SqliteStore;
use crate::store::Store;

pub struct AppContext {
    pub store: Arc<SqliteStore>,
    pub engine: Arc<HeadlineEngine<SqliteStore>>,
    pub config: Config,
}

impl AppContext {
    pub fn new(config: Config) -> Result<Self> {
        Self::with_plugins(config, PluginHost::new())
    }

    pub fn with_plugins(config: Config, plugins: PluginHost) -> Result<Self> {
        let db_path = match &config.database.path {
            Some(p) => p.clone(),
            None => Self::default_db_path()?,
        };

        let store = Arc::new(SqliteStore::new(&db_path)?);
        tracing::debug!(path = %db_path.display(), "opened headline store");
        Ok(Self::from_store(store, config, plugins))
    }

    pub fn in_memory(config: Config) -> Result<Self> {
        let store = Arc::new(SqliteStore::in_memory()?);
        Ok(Self::from_store(store, config, PluginHost::new()))
    }

    fn from_store(store: Arc<SqliteStore>, config: Config, plugins: PluginHost) -> Self {
        let engine = Arc::new(HeadlineEngine::with_plugins(
            store.clone(),
            plugins,
            config.engine.clone(),
        ));

        Self {
            store,
            engine,
            config,
        }
    }

    fn default_db_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| RivuletError::Config("Could not find data directory".into()))?;
        let rivulet_dir = data_dir.join("rivulet");
        std::fs::create_dir_all(&rivulet_dir)?;
        Ok(rivulet_dir.join("rivulet.db"))
    }

    /// Request context for `owner_uid` with stored prefs applied and the
    /// configured deadline armed.
    pub fn context_for(&self, owner_uid: i64) -> Result<RequestContext> {
        let cancel = CancelToken::with_timeout(self.config.engine.query_timeout());
        let prefs = self.store.owner_prefs(owner_uid, &self.config.defaults, &cancel)?;
        Ok(RequestContext::new(owner_uid, prefs).with_cancel(cancel))
    }

    /// Runs a headline request off the async runtime. When the configured
    /// timeout elapses the request's token is tripped and `Cancelled` is
    /// returned.
    pub async fn headlines_with_timeout(
        &self,
        request: HeadlineRequest,
        ctx: RequestContext,
    ) -> Result<Headlines> {
        let engine = self.engine.clone();
        let cancel = ctx.cancel.clone();
        run_blocking(self.config.engine.query_timeout(), cancel, move || {
            engine.headlines(&request, &ctx)
        })
        .await
    }

    pub async fn counters_with_timeout(&self, ctx: RequestContext) -> Result<CountersSnapshot> {
        let engine = self.engine.clone();
        let cancel = ctx.cancel.clone();
        run_blocking(self.config.engine.query_timeout(), cancel, move || {
            engine.counters().snapshot(&ctx)
        })
        .await
    }
}

async fn run_blocking<T, F>(timeout: Duration, cancel: CancelToken, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let task = tokio::task::spawn_blocking(f);
    match tokio::time::timeout(timeout, task).await {
        Ok(joined) => joined.map_err(|e| RivuletError::Other(format!("task failed: {e}")))?,
        Err(_) => {
            // The worker sees the flag at its next progress callback.
            cancel.cancel();
            tracing::warn!(?timeout, "request timed out");
            Err(RivuletError::Cancelled)
        }
    }
}

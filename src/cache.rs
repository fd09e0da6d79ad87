use std::collections::HashMap;
use std::sync::Arc;

use fieldx::fxstruct;
use sea_orm::IntoActiveModel;
use tokio::sync::Mutex;

use crate::config::StoreConfig;
use crate::context::Context;
use crate::error::Error;
use crate::error::Result;
use crate::predicate::QueryDescriptor;
use crate::repository::Repository;
use crate::traits::ActiveModelOf;
use crate::traits::EntityController;
use crate::traits::ModelOf;
use crate::types::ListData;
use crate::types::ListPage;

// The map and its validity flag always change together.
struct CacheState<C>
where
    C: EntityController,
{
    map: HashMap<C::Key, Arc<ModelOf<C>>>,
    ok:  bool,
}

impl<C> Default for CacheState<C>
where
    C: EntityController,
{
    fn default() -> Self {
        Self {
            map: HashMap::new(),
            ok:  false,
        }
    }
}

/// Write-through memory image of a whole relation.
///
/// ```ignore
/// let cache = EntityCache::builder()
///     .controller(UserController)
///     .repository(Repository::new(Arc::new(UserController), db.clone()))
///     .build()
///     .expect("cache");
///
/// cache.add(&ctx, user).await?;
/// let user = cache.get(&ctx, &1).await?;
/// ```
///
/// The relation is loaded lazily by the first read and kept in memory from then on. Mutations go to the store first;
/// only when they affect rows is the cache reconciled, by re-reading the touched rows. A failure to re-read marks the
/// cache invalid and the next read loads the whole relation again.
///
/// All operations serialize on a single lock. Callbacks passed to [`foreach_cache`](Self::foreach_cache),
/// the `search_cache*` family and [`update_cache`](Self::update_cache) run with the lock held and must not call back
/// into the cache.
///
/// With `enabled` set to `false` every operation is forwarded to the [`Repository`] and the memory image is never
/// populated. Operations that only make sense over the image return empty results.
#[fxstruct(
    sync,
    no_new,
    default(off),
    builder(
        doc("Builder object of [`EntityCache`].", "", "See [`EntityCache::builder()`] method."),
        method_doc("Implement builder pattern for [`EntityCache`]."),
    )
)]
pub struct EntityCache<C>
where
    C: EntityController,
{
    #[fieldx(get(clone), builder(required, into))]
    controller: Arc<C>,

    #[fieldx(get, builder(required))]
    repository: Repository<C>,

    /// Whether the memory image is used at all. Fixed for the lifetime of the cache.
    #[fieldx(get("is_enabled", copy), default(true))]
    enabled: bool,

    #[fieldx(get(off), builder(off), default(Mutex::new(CacheState::default())))]
    state: Mutex<CacheState<C>>,
}

impl<C> EntityCache<C>
where
    C: EntityController,
    ModelOf<C>: IntoActiveModel<ActiveModelOf<C>> + Clone + Send + Sync,
    ActiveModelOf<C>: Send,
{
    /// Cache over `repository` with the memory image switched on or off as [`StoreConfig::cache`] says.
    pub fn with_config(controller: C, repository: Repository<C>, config: &StoreConfig) -> Result<Self> {
        Self::builder()
            .controller(controller)
            .repository(repository)
            .enabled(config.cache())
            .build()
            .map_err(|err| Error::Config(format!("can't build cache: {err:?}")))
    }

    fn table_name(&self) -> String {
        self.repository.gateway().table_name()
    }

    // Replace the image with the full relation unless it is valid already.
    async fn ensure_loaded(&self, ctx: &Context, state: &mut CacheState<C>) -> Result<()> {
        if state.ok {
            return Ok(());
        }

        match self.repository.all(ctx, &()).await {
            Ok(rows) => {
                state.map = rows
                    .into_iter()
                    .map(|m| (self.controller.key_of(&m), Arc::new(m)))
                    .collect();
                state.ok = true;
                tracing::debug!(table = %self.table_name(), rows = state.map.len(), "relation loaded");
                if let Some(observer) = self.repository.observer() {
                    observer.on_reload(state.map.len());
                }
                Ok(())
            }
            Err(err) => {
                state.ok = false;
                Err(err)
            }
        }
    }

    fn mark_invalid(&self, state: &mut CacheState<C>, err: &Error) {
        state.ok = false;
        tracing::warn!(table = %self.table_name(), "cache invalidated: {err}");
        if let Some(observer) = self.repository.observer() {
            observer.on_invalidate(err);
        }
    }

    // Re-read one row after it has been written. An invalid image is left for the next full load.
    async fn reload_one(&self, ctx: &Context, state: &mut CacheState<C>, key: &C::Key) {
        if !state.ok {
            return;
        }
        match self.repository.get(ctx, key).await {
            Ok(Some(model)) => {
                state.map.insert(key.clone(), Arc::new(model));
            }
            Ok(None) => {
                tracing::debug!(table = %self.table_name(), ?key, "written row is gone, nothing to reload");
            }
            Err(err) => self.mark_invalid(state, &err),
        }
    }

    async fn reload_many(&self, ctx: &Context, state: &mut CacheState<C>, keys: &[C::Key]) {
        if !state.ok {
            return;
        }
        match self.repository.find_in(ctx, keys).await {
            Ok(rows) => self.merge(state, rows),
            Err(err) => self.mark_invalid(state, &err),
        }
    }

    fn merge(&self, state: &mut CacheState<C>, rows: Vec<ModelOf<C>>) {
        for model in rows {
            state.map.insert(self.controller.key_of(&model), Arc::new(model));
        }
    }

    /// Every row of the relation.
    pub async fn all(&self, ctx: &Context) -> Result<Vec<Arc<ModelOf<C>>>> {
        if !self.enabled {
            return Ok(self.repository.all(ctx, &()).await?.into_iter().map(Arc::new).collect());
        }
        let mut state = self.state.lock().await;
        self.ensure_loaded(ctx, &mut state).await?;
        Ok(state.map.values().cloned().collect())
    }

    pub async fn get(&self, ctx: &Context, key: &C::Key) -> Result<Option<Arc<ModelOf<C>>>> {
        if !self.enabled {
            return Ok(self.repository.get(ctx, key).await?.map(Arc::new));
        }
        let mut state = self.state.lock().await;
        self.ensure_loaded(ctx, &mut state).await?;
        Ok(state.map.get(key).cloned())
    }

    pub async fn add(&self, ctx: &Context, model: ModelOf<C>) -> Result<u64> {
        let key = self.controller.key_of(&model);
        let rows = self.repository.add(ctx, model).await?;
        self.written(ctx, rows, &key).await;
        Ok(rows)
    }

    pub async fn update(&self, ctx: &Context, model: ModelOf<C>) -> Result<u64> {
        let key = self.controller.key_of(&model);
        let rows = self.repository.update(ctx, model).await?;
        self.written(ctx, rows, &key).await;
        Ok(rows)
    }

    pub async fn save(&self, ctx: &Context, model: ModelOf<C>) -> Result<u64> {
        let key = self.controller.key_of(&model);
        let rows = self.repository.save(ctx, model).await?;
        self.written(ctx, rows, &key).await;
        Ok(rows)
    }

    async fn written(&self, ctx: &Context, rows: u64, key: &C::Key) {
        if self.enabled && rows > 0 {
            let mut state = self.state.lock().await;
            self.reload_one(ctx, &mut state, key).await;
        }
    }

    /// Save all models in one transaction. The image is reconciled only after commit.
    pub async fn batch_save(&self, ctx: &Context, models: Vec<ModelOf<C>>) -> Result<u64> {
        let keys = models.iter().map(|m| self.controller.key_of(m)).collect::<Vec<_>>();
        let rows = self.repository.batch_save(ctx, models).await?;
        if self.enabled && rows > 0 {
            let mut state = self.state.lock().await;
            self.reload_many(ctx, &mut state, &keys).await;
        }
        Ok(rows)
    }

    pub async fn delete(&self, ctx: &Context, key: &C::Key) -> Result<u64> {
        let rows = self.repository.delete(ctx, key).await?;
        if self.enabled && rows > 0 {
            self.state.lock().await.map.remove(key);
        }
        Ok(rows)
    }

    pub async fn batch_delete(&self, ctx: &Context, keys: &[C::Key]) -> Result<u64> {
        let rows = self.repository.batch_delete(ctx, keys).await?;
        if self.enabled && rows > 0 {
            let mut state = self.state.lock().await;
            for key in keys {
                state.map.remove(key);
            }
        }
        Ok(rows)
    }

    /// Drop a key from the memory image only. The store is not touched.
    pub async fn delete_cache(&self, key: &C::Key) {
        if self.enabled {
            self.state.lock().await.map.remove(key);
        }
    }

    pub async fn batch_delete_cache(&self, keys: &[C::Key]) {
        if self.enabled {
            let mut state = self.state.lock().await;
            for key in keys {
                state.map.remove(key);
            }
        }
    }

    /// Call `f` for every cached row, in no particular order.
    pub async fn foreach_cache<F>(&self, ctx: &Context, mut f: F) -> Result<()>
    where
        F: FnMut(&C::Key, &ModelOf<C>),
    {
        if !self.enabled {
            return Ok(());
        }
        let mut state = self.state.lock().await;
        self.ensure_loaded(ctx, &mut state).await?;
        for (key, model) in state.map.iter() {
            f(key, model);
        }
        Ok(())
    }

    /// Cached rows matching `f`, in no particular order.
    pub async fn search_cache<F>(&self, ctx: &Context, mut f: F) -> Result<Vec<Arc<ModelOf<C>>>>
    where
        F: FnMut(&ModelOf<C>) -> bool,
    {
        if !self.enabled {
            return Ok(vec![]);
        }
        let mut state = self.state.lock().await;
        self.ensure_loaded(ctx, &mut state).await?;
        Ok(state.map.values().filter(|m| f(m)).cloned().collect())
    }

    /// Project every cached row through `f`, keeping the `Some` results.
    pub async fn search_cache_map<T, F>(&self, ctx: &Context, mut f: F) -> Result<Vec<T>>
    where
        F: FnMut(&ModelOf<C>) -> Option<T>,
    {
        if !self.enabled {
            return Ok(vec![]);
        }
        let mut state = self.state.lock().await;
        self.ensure_loaded(ctx, &mut state).await?;
        Ok(state.map.values().filter_map(|m| f(m)).collect())
    }

    /// Cached rows for `keys`, in the order of `keys`. Keys not in the cache are skipped.
    pub async fn search_cache_in(&self, ctx: &Context, keys: &[C::Key]) -> Result<Vec<Arc<ModelOf<C>>>> {
        if !self.enabled {
            return Ok(vec![]);
        }
        let mut state = self.state.lock().await;
        self.ensure_loaded(ctx, &mut state).await?;
        Ok(keys.iter().filter_map(|k| state.map.get(k).cloned()).collect())
    }

    /// Some cached row matching `f`.
    pub async fn search_cache_one<F>(&self, ctx: &Context, mut f: F) -> Result<Option<Arc<ModelOf<C>>>>
    where
        F: FnMut(&ModelOf<C>) -> bool,
    {
        if !self.enabled {
            return Ok(None);
        }
        let mut state = self.state.lock().await;
        self.ensure_loaded(ctx, &mut state).await?;
        Ok(state.map.values().find(|m| f(m)).cloned())
    }

    pub async fn cache_count<F>(&self, ctx: &Context, mut f: F) -> Result<usize>
    where
        F: FnMut(&ModelOf<C>) -> bool,
    {
        if !self.enabled {
            return Ok(0);
        }
        let mut state = self.state.lock().await;
        self.ensure_loaded(ctx, &mut state).await?;
        Ok(state.map.values().filter(|m| f(m)).count())
    }

    pub async fn cache_total(&self, ctx: &Context) -> Result<usize> {
        if !self.enabled {
            return Ok(0);
        }
        let mut state = self.state.lock().await;
        self.ensure_loaded(ctx, &mut state).await?;
        Ok(state.map.len())
    }

    /// Edit the cached row of `key` in place without writing to the store. `f` receives `None` if the key isn't
    /// cached or the cache is disabled.
    ///
    /// Rows already handed out to callers are not affected; the cache stores a modified copy.
    pub async fn update_cache<R, F>(&self, key: &C::Key, f: F) -> R
    where
        F: FnOnce(Option<&mut ModelOf<C>>) -> R,
    {
        if !self.enabled {
            return f(None);
        }
        let mut state = self.state.lock().await;
        f(state.map.get_mut(key).map(Arc::make_mut))
    }

    /// Paginated listing. Always served by the store.
    pub async fn list_page<D>(&self, ctx: &Context, page: &ListPage, query: &D) -> Result<ListData<ModelOf<C>>>
    where
        D: QueryDescriptor + ?Sized,
    {
        self.repository.list_page(ctx, page, query).await
    }

    /// Load the relation now if the image isn't valid.
    pub async fn load_all(&self, ctx: &Context) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let mut state = self.state.lock().await;
        self.ensure_loaded(ctx, &mut state).await
    }

    /// Refresh one key from the store. Failures invalidate the image instead of being reported.
    pub async fn load(&self, ctx: &Context, key: &C::Key) {
        if self.enabled {
            let mut state = self.state.lock().await;
            self.reload_one(ctx, &mut state, key).await;
        }
    }

    /// Merge the rows matching `query` into the image, replacing cached versions.
    pub async fn load_where<D>(&self, ctx: &Context, query: &D) -> Result<()>
    where
        D: QueryDescriptor + ?Sized,
    {
        if !self.enabled {
            return Ok(());
        }
        let mut state = self.state.lock().await;
        match self.repository.all(ctx, query).await {
            Ok(rows) => {
                self.merge(&mut state, rows);
                Ok(())
            }
            Err(err) => {
                self.mark_invalid(&mut state, &err);
                Err(err)
            }
        }
    }

    /// Force a full reload on the next read.
    pub async fn invalidate(&self) {
        self.state.lock().await.ok = false;
    }

    /// `true` if the image is loaded and valid.
    pub async fn is_loaded(&self) -> bool {
        self.state.lock().await.ok
    }
}

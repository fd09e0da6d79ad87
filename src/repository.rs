use std::sync::Arc;

use sea_orm::DatabaseConnection;
use sea_orm::FromQueryResult;
use sea_orm::IntoActiveModel;
use sea_orm::ModelTrait;
use sea_orm::Value;
use tracing::instrument;

use crate::context::Context;
use crate::error::Error;
use crate::error::Result;
use crate::gateway::is_empty_value;
use crate::gateway::Gateway;
use crate::predicate::Predicate;
use crate::predicate::QueryDescriptor;
use crate::traits::ActiveModelOf;
use crate::traits::ColumnOf;
use crate::traits::EntityController;
use crate::traits::ModelOf;
use crate::traits::Observer;
use crate::types::parse_order;
use crate::types::ListData;
use crate::types::ListPage;

/// Upper bound of keys bound into a single `IN (...)` list. SQLite refuses statements with more than 32766
/// parameters.
const MAX_KEYS_PER_STATEMENT: usize = 10_000;

/// Query facade over one entity: descriptor based listing and key based CRUD.
///
/// Each method takes the [`Context`] of the calling operation. The repository itself is cheap to clone.
pub struct Repository<C>
where
    C: EntityController,
{
    controller: Arc<C>,
    gateway:    Gateway<C::Entity>,
}

impl<C> Repository<C>
where
    C: EntityController,
    ModelOf<C>: IntoActiveModel<ActiveModelOf<C>> + Clone + Send + Sync,
    ActiveModelOf<C>: Send,
{
    pub fn new(controller: Arc<C>, conn: DatabaseConnection) -> Self {
        Self {
            controller,
            gateway: Gateway::new(conn),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.gateway = self.gateway.with_observer(observer);
        self
    }

    pub fn controller(&self) -> &Arc<C> {
        &self.controller
    }

    pub fn gateway(&self) -> &Gateway<C::Entity> {
        &self.gateway
    }

    pub(crate) fn observer(&self) -> Option<&Arc<dyn Observer>> {
        self.gateway.observer()
    }

    fn scoped(&self, ctx: &Context) -> Gateway<C::Entity> {
        self.gateway.clone().with_context(ctx.clone())
    }

    /// All rows matching `query`.
    pub async fn all<D>(&self, ctx: &Context, query: &D) -> Result<Vec<ModelOf<C>>>
    where
        D: QueryDescriptor + ?Sized,
    {
        let predicate = Predicate::from_descriptor(query)?;
        tracing::debug!(table = %self.gateway.table_name(), %predicate, "all");
        self.scoped(ctx).find(predicate.condition()).await
    }

    /// One page of rows matching `query` together with the number of all matching rows.
    pub async fn list_page<D>(&self, ctx: &Context, page: &ListPage, query: &D) -> Result<ListData<ModelOf<C>>>
    where
        D: QueryDescriptor + ?Sized,
    {
        let predicate = Predicate::from_descriptor(query)?;
        // Reject a bad order clause before anything is sent.
        parse_order(&page.order)?;
        tracing::debug!(table = %self.gateway.table_name(), %predicate, ?page, "list page");

        let gateway = self.scoped(ctx);
        let cond = predicate.condition();
        let total = gateway.count(cond.clone()).await?;
        let data = gateway.find_page(cond, page).await?;
        Ok(ListData { total, data })
    }

    pub async fn get(&self, ctx: &Context, key: &C::Key) -> Result<Option<ModelOf<C>>> {
        self.scoped(ctx).first(self.controller.key_condition(key)).await
    }

    /// Projection of the row identified by `key` onto `columns`.
    pub async fn get_select<T, I>(&self, ctx: &Context, key: &C::Key, columns: I) -> Result<Option<T>>
    where
        T: FromQueryResult + Send + Sync,
        I: IntoIterator<Item = ColumnOf<C>>,
    {
        self.scoped(ctx)
            .first_select(self.controller.key_condition(key), columns)
            .await
    }

    #[instrument(level = "trace", skip_all, fields(table = %self.gateway.table_name()))]
    pub async fn add(&self, ctx: &Context, mut model: ModelOf<C>) -> Result<u64> {
        if let Some(columns) = self.controller.timestamp_columns() {
            let now = chrono::Utc::now().timestamp();
            stamp(&mut model, columns.created_at, now);
            stamp(&mut model, columns.updated_at, now);
        }
        self.scoped(ctx).create(model).await
    }

    /// Write the non-empty columns of `model` into the row with the same key.
    #[instrument(level = "trace", skip_all, fields(table = %self.gateway.table_name()))]
    pub async fn update(&self, ctx: &Context, mut model: ModelOf<C>) -> Result<u64> {
        if let Some(columns) = self.controller.timestamp_columns() {
            stamp(&mut model, columns.updated_at, chrono::Utc::now().timestamp());
        }
        let key = self.controller.key_of(&model);
        self.scoped(ctx)
            .update(self.controller.key_condition(&key), model)
            .await
    }

    #[instrument(level = "trace", skip_all, fields(table = %self.gateway.table_name()))]
    pub async fn save(&self, ctx: &Context, model: ModelOf<C>) -> Result<u64> {
        let model = self.stamp_saved(model);
        self.scoped(ctx).save(model).await
    }

    pub async fn delete(&self, ctx: &Context, key: &C::Key) -> Result<u64> {
        self.scoped(ctx).delete(self.controller.key_condition(key)).await
    }

    /// Delete all rows identified by `keys` in one transaction.
    #[instrument(level = "trace", skip_all, fields(table = %self.gateway.table_name(), keys = keys.len()))]
    pub async fn batch_delete(&self, ctx: &Context, keys: &[C::Key]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let controller = self.controller.clone();
        let keys = keys.to_vec();
        self.scoped(ctx)
            .transaction(move |txn| {
                Box::pin(async move {
                    let mut rows = 0;
                    for chunk in keys.chunks(MAX_KEYS_PER_STATEMENT) {
                        rows += txn.delete_many(controller.keys_condition(chunk)).await?;
                    }
                    Ok::<_, Error>(rows)
                })
            })
            .await
    }

    /// Save every model in order within one transaction. Returns the number of models on commit.
    #[instrument(level = "trace", skip_all, fields(table = %self.gateway.table_name(), models = models.len()))]
    pub async fn batch_save(&self, ctx: &Context, models: Vec<ModelOf<C>>) -> Result<u64> {
        if models.is_empty() {
            return Ok(0);
        }
        let models = models.into_iter().map(|m| self.stamp_saved(m)).collect::<Vec<_>>();
        let count = models.len() as u64;
        self.scoped(ctx)
            .transaction(move |txn| {
                Box::pin(async move {
                    for model in models {
                        txn.save(model).await?;
                    }
                    Ok::<_, Error>(count)
                })
            })
            .await
    }

    /// Rows identified by `keys`. Missing keys are silently omitted.
    pub async fn find_in(&self, ctx: &Context, keys: &[C::Key]) -> Result<Vec<ModelOf<C>>> {
        let gateway = self.scoped(ctx);
        let mut rows = vec![];
        for chunk in keys.chunks(MAX_KEYS_PER_STATEMENT) {
            rows.extend(gateway.find(self.controller.keys_condition(chunk)).await?);
        }
        Ok(rows)
    }

    fn stamp_saved(&self, mut model: ModelOf<C>) -> ModelOf<C> {
        if let Some(columns) = self.controller.timestamp_columns() {
            let now = chrono::Utc::now().timestamp();
            if is_empty_value(&model.get(columns.created_at)) {
                stamp(&mut model, columns.created_at, now);
            }
            stamp(&mut model, columns.updated_at, now);
        }
        model
    }
}

impl<C> Clone for Repository<C>
where
    C: EntityController,
{
    fn clone(&self) -> Self {
        Self {
            controller: self.controller.clone(),
            gateway:    self.gateway.clone(),
        }
    }
}

impl<C> std::fmt::Debug for Repository<C>
where
    C: EntityController,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository").field("gateway", &self.gateway).finish()
    }
}

// Timestamp columns may be of any integer type. Columns that can't hold the value are left intact.
fn stamp<M: ModelTrait>(model: &mut M, column: <M::Entity as sea_orm::EntityTrait>::Column, now: i64) {
    let stamped = match model.get(column) {
        Value::BigInt(_) => Some(Value::BigInt(Some(now))),
        Value::Int(_) => i32::try_from(now).ok().map(|v| Value::Int(Some(v))),
        Value::BigUnsigned(_) => u64::try_from(now).ok().map(|v| Value::BigUnsigned(Some(v))),
        Value::Unsigned(_) => u32::try_from(now).ok().map(|v| Value::Unsigned(Some(v))),
        _ => None,
    };
    match stamped {
        Some(value) => model.set(column, value),
        None => tracing::warn!("timestamp column can't hold {now}, not stamped"),
    }
}

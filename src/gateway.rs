//! Generic single-relation access layer.
//!
//! A [`Gateway`] binds an entity type to a connection and sends exactly one statement per operation. Rows are
//! identified by a [`Condition`]; turning keys into conditions is the job of the
//! [`EntityController`](crate::traits::EntityController).

use std::fmt::Debug;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use sea_orm::entity::Iterable;
use sea_orm::sea_query::OnConflict;
use sea_orm::ActiveModelTrait;
use sea_orm::Condition;
use sea_orm::ConnectionTrait;
use sea_orm::DatabaseConnection;
use sea_orm::DatabaseTransaction;
use sea_orm::EntityName;
use sea_orm::EntityTrait;
use sea_orm::FromQueryResult;
use sea_orm::IdenStatic;
use sea_orm::IntoActiveModel;
use sea_orm::PaginatorTrait;
use sea_orm::PrimaryKeyToColumn;
use sea_orm::QueryFilter;
use sea_orm::QuerySelect;
use sea_orm::TransactionTrait;
use sea_orm::Value;
use tracing::instrument;

use crate::context::Context;
use crate::error::Error;
use crate::error::Result;
use crate::traits::Observer;
use crate::types::ListPage;
use crate::types::Statement;

/// A gateway bound to an open transaction.
pub type Transaction<E> = Gateway<E, DatabaseTransaction>;

/// Typed access to one relation over connection `C`.
///
/// Every operation runs within the gateway's [`Context`] and reports the statement it sends to the
/// [`Observer`], if there is one.
pub struct Gateway<E, C = DatabaseConnection>
where
    E: EntityTrait,
    C: ConnectionTrait,
{
    conn:     C,
    ctx:      Context,
    observer: Option<Arc<dyn Observer>>,
    _entity:  PhantomData<fn() -> E>,
}

impl<E, C> Gateway<E, C>
where
    E: EntityTrait,
    E::Model: IntoActiveModel<E::ActiveModel> + Send + Sync,
    E::ActiveModel: Send,
    C: ConnectionTrait,
{
    pub fn new(conn: C) -> Self {
        Self {
            conn,
            ctx: Context::background(),
            observer: None,
            _entity: PhantomData,
        }
    }

    pub fn with_context(mut self, ctx: Context) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn connection(&self) -> &C {
        &self.conn
    }

    pub fn observer(&self) -> Option<&Arc<dyn Observer>> {
        self.observer.as_ref()
    }

    pub fn table_name(&self) -> String {
        E::default().table_name().to_owned()
    }

    fn notify(&self, statement: Statement) {
        tracing::trace!(table = %self.table_name(), %statement, "sending statement");
        if let Some(observer) = &self.observer {
            observer.on_statement(statement);
        }
    }

    /// Insert a row with every column of `model` taken as is.
    #[instrument(level = "trace", skip_all, fields(table = %self.table_name()))]
    pub async fn create(&self, model: E::Model) -> Result<u64> {
        let am = full_active_model::<E>(model);
        self.notify(Statement::Insert);
        self.ctx
            .run(E::insert(am).exec_without_returning(&self.conn))
            .await
    }

    /// Apply the non-empty non-key columns of `model` to every row matching `cond`.
    ///
    /// A column is empty when it holds `NULL`, zero, `false` or an empty string. If `model` has no non-empty columns
    /// nothing is sent and zero rows are reported.
    #[instrument(level = "trace", skip(self, model), fields(table = %self.table_name()))]
    pub async fn update(&self, cond: Condition, model: E::Model) -> Result<u64> {
        let Some(changes) = changes_of::<E>(model)
        else {
            return Ok(0);
        };
        self.notify(Statement::Update);
        let res = self
            .ctx
            .run(E::update_many().set(changes).filter(cond).exec(&self.conn))
            .await?;
        Ok(res.rows_affected)
    }

    /// Insert `model` or overwrite the row with the same primary key.
    #[instrument(level = "trace", skip_all, fields(table = %self.table_name()))]
    pub async fn save(&self, model: E::Model) -> Result<u64> {
        let am = full_active_model::<E>(model);
        let rest = E::Column::iter().filter(|c| !is_primary::<E>(c)).collect::<Vec<_>>();
        let mut on_conflict = OnConflict::columns(primary_columns::<E>());
        if rest.is_empty() {
            on_conflict.do_nothing();
        }
        else {
            on_conflict.update_columns(rest);
        }
        self.notify(Statement::Upsert);
        self.ctx
            .run(E::insert(am).on_conflict(on_conflict).exec_without_returning(&self.conn))
            .await
    }

    #[instrument(level = "trace", skip(self), fields(table = %self.table_name()))]
    pub async fn delete(&self, cond: Condition) -> Result<u64> {
        self.notify(Statement::Delete);
        let res = self.ctx.run(E::delete_many().filter(cond).exec(&self.conn)).await?;
        Ok(res.rows_affected)
    }

    /// Same as [`delete`](Self::delete); kept for callers removing a key set.
    pub async fn delete_many(&self, cond: Condition) -> Result<u64> {
        self.delete(cond).await
    }

    #[instrument(level = "trace", skip(self), fields(table = %self.table_name()))]
    pub async fn first(&self, cond: Condition) -> Result<Option<E::Model>> {
        self.notify(Statement::First);
        self.ctx.run(E::find().filter(cond).one(&self.conn)).await
    }

    /// Fetch a projection of the first row matching `cond`.
    pub async fn first_select<T, I>(&self, cond: Condition, columns: I) -> Result<Option<T>>
    where
        T: FromQueryResult + Send + Sync,
        I: IntoIterator<Item = E::Column>,
    {
        self.notify(Statement::First);
        self.ctx
            .run(
                E::find()
                    .select_only()
                    .columns(columns)
                    .filter(cond)
                    .into_model::<T>()
                    .one(&self.conn),
            )
            .await
    }

    #[instrument(level = "trace", skip(self), fields(table = %self.table_name()))]
    pub async fn find(&self, cond: Condition) -> Result<Vec<E::Model>> {
        self.notify(Statement::Find);
        self.ctx.run(E::find().filter(cond).all(&self.conn)).await
    }

    /// Like [`find`](Self::find) but with offset, limit and order applied.
    #[instrument(level = "trace", skip(self), fields(table = %self.table_name()))]
    pub async fn find_page(&self, cond: Condition, page: &ListPage) -> Result<Vec<E::Model>> {
        let query = page.apply(E::find().filter(cond))?;
        self.notify(Statement::Find);
        self.ctx.run(query.all(&self.conn)).await
    }

    #[instrument(level = "trace", skip(self), fields(table = %self.table_name()))]
    pub async fn count(&self, cond: Condition) -> Result<u64> {
        self.notify(Statement::Count);
        self.ctx.run(E::find().filter(cond).count(&self.conn)).await
    }
}

impl<E, C> Gateway<E, C>
where
    E: EntityTrait,
    E::Model: IntoActiveModel<E::ActiveModel> + Send + Sync,
    E::ActiveModel: Send,
    C: ConnectionTrait + TransactionTrait,
{
    /// Open a transaction. The returned gateway inherits the context and the observer.
    ///
    /// A transaction dropped without [`commit`](Gateway::commit) is rolled back.
    pub async fn begin(&self) -> Result<Transaction<E>> {
        self.notify(Statement::Begin);
        let txn = self.ctx.run(self.conn.begin()).await?;
        Ok(Gateway {
            conn:     txn,
            ctx:      self.ctx.clone(),
            observer: self.observer.clone(),
            _entity:  PhantomData,
        })
    }

    /// Run `f` in a transaction. Commits if `f` succeeds, otherwise rolls back and reports
    /// [`Error::TransactionAborted`].
    ///
    /// ```ignore
    /// gateway
    ///     .transaction(|txn| {
    ///         Box::pin(async move {
    ///             txn.create(first).await?;
    ///             txn.create(second).await
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: for<'t> FnOnce(&'t Transaction<E>) -> Pin<Box<dyn Future<Output = Result<T>> + Send + 't>> + Send,
        T: Send,
    {
        let txn = self.begin().await?;
        match f(&txn).await {
            Ok(value) => {
                txn.commit().await.map_err(Error::aborted)?;
                Ok(value)
            }
            Err(err) => {
                txn.rollback().await;
                Err(Error::aborted(err))
            }
        }
    }
}

impl<E> Gateway<E, DatabaseTransaction>
where
    E: EntityTrait,
    E::Model: IntoActiveModel<E::ActiveModel> + Send + Sync,
    E::ActiveModel: Send,
{
    /// Commit the transaction. Once started, the commit is not interrupted by the context.
    pub async fn commit(self) -> Result<()> {
        self.ctx.check()?;
        self.notify(Statement::Commit);
        Ok(self.conn.commit().await?)
    }

    /// Roll the transaction back. Failures are only logged: the store discards an unfinished transaction anyway.
    pub async fn rollback(self) {
        self.notify(Statement::Rollback);
        let table = self.table_name();
        if let Err(err) = self.conn.rollback().await {
            tracing::warn!(%table, "rollback failed: {err}");
        }
    }
}

impl<E, C> Clone for Gateway<E, C>
where
    E: EntityTrait,
    C: ConnectionTrait + Clone,
{
    fn clone(&self) -> Self {
        Self {
            conn:     self.conn.clone(),
            ctx:      self.ctx.clone(),
            observer: self.observer.clone(),
            _entity:  PhantomData,
        }
    }
}

impl<E, C> Debug for Gateway<E, C>
where
    E: EntityTrait,
    C: ConnectionTrait,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("table", &E::default().table_name())
            .field("ctx", &self.ctx)
            .field("observed", &self.observer.is_some())
            .finish()
    }
}

pub(crate) fn primary_columns<E: EntityTrait>() -> Vec<E::Column> {
    E::PrimaryKey::iter().map(|pk| pk.into_column()).collect()
}

fn is_primary<E: EntityTrait>(column: &E::Column) -> bool {
    E::PrimaryKey::iter().any(|pk| pk.into_column().as_str() == column.as_str())
}

// Active model with every column set, so that inserts carry the complete row.
fn full_active_model<E>(model: E::Model) -> E::ActiveModel
where
    E: EntityTrait,
    E::Model: IntoActiveModel<E::ActiveModel>,
{
    let mut am = model.into_active_model();
    for c in E::Column::iter() {
        if let Some(v) = am.get(c).into_value() {
            am.set(c, v);
        }
    }
    am
}

// Non-key columns with non-empty values. `None` if there are none.
fn changes_of<E>(model: E::Model) -> Option<E::ActiveModel>
where
    E: EntityTrait,
    E::Model: IntoActiveModel<E::ActiveModel>,
{
    let am = model.into_active_model();
    let mut changes = <E::ActiveModel as ActiveModelTrait>::default();
    let mut changed = false;
    for c in E::Column::iter() {
        if is_primary::<E>(&c) {
            continue;
        }
        if let Some(v) = am.get(c).into_value() {
            if !is_empty_value(&v) {
                changes.set(c, v);
                changed = true;
            }
        }
    }
    changed.then_some(changes)
}

pub(crate) fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Bool(v) => !v.unwrap_or(false),
        Value::TinyInt(v) => v.unwrap_or(0) == 0,
        Value::SmallInt(v) => v.unwrap_or(0) == 0,
        Value::Int(v) => v.unwrap_or(0) == 0,
        Value::BigInt(v) => v.unwrap_or(0) == 0,
        Value::TinyUnsigned(v) => v.unwrap_or(0) == 0,
        Value::SmallUnsigned(v) => v.unwrap_or(0) == 0,
        Value::Unsigned(v) => v.unwrap_or(0) == 0,
        Value::BigUnsigned(v) => v.unwrap_or(0) == 0,
        Value::Float(v) => v.unwrap_or(0.0) == 0.0,
        Value::Double(v) => v.unwrap_or(0.0) == 0.0,
        Value::String(v) => v.as_ref().is_none_or(|s| s.is_empty()),
        Value::Char(v) => v.is_none(),
        Value::Bytes(v) => v.as_ref().is_none_or(|b| b.is_empty()),
        _ => *value == value.as_null(),
    }
}

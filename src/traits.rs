use std::fmt::Debug;
use std::hash::Hash;

use sea_orm::entity::Iterable;
use sea_orm::sea_query::Expr;
use sea_orm::ColumnTrait;
use sea_orm::Condition;
use sea_orm::EntityTrait;
use sea_orm::PrimaryKeyToColumn;
use sea_orm::Value;

use crate::error::Error;
use crate::types::Statement;
use crate::types::TimestampColumns;

pub type ModelOf<C> = <<C as EntityController>::Entity as EntityTrait>::Model;
pub type ActiveModelOf<C> = <<C as EntityController>::Entity as EntityTrait>::ActiveModel;
pub type ColumnOf<C> = <<C as EntityController>::Entity as EntityTrait>::Column;

/// Ties an entity to the key the cache indexes it by.
///
/// The default key predicates compare the first primary key column of the entity. Entities with composite primary
/// keys or keys that don't map onto a single column must override both [`key_condition`](Self::key_condition) and
/// [`keys_condition`](Self::keys_condition).
pub trait EntityController: Send + Sync + 'static {
    type Entity: EntityTrait;
    type Key: Debug + Hash + Eq + Clone + Into<Value> + Send + Sync + 'static;

    fn key_of(&self, model: &ModelOf<Self>) -> Self::Key;

    /// Predicate selecting the single row identified by `key`.
    fn key_condition(&self, key: &Self::Key) -> Condition {
        match primary_column::<Self::Entity>() {
            Some(column) => Condition::all().add(column.eq(key.clone())),
            None => never(),
        }
    }

    /// Predicate selecting all rows identified by `keys`.
    fn keys_condition(&self, keys: &[Self::Key]) -> Condition {
        match primary_column::<Self::Entity>() {
            Some(column) if !keys.is_empty() => Condition::all().add(column.is_in(keys.iter().cloned())),
            // An empty key set must not match anything.
            _ => never(),
        }
    }

    /// Columns stamped with creation/modification time on writes. `None` disables stamping.
    fn timestamp_columns(&self) -> Option<TimestampColumns<ColumnOf<Self>>> {
        None
    }
}

/// A predicate that matches no rows.
pub fn never() -> Condition {
    Condition::all().add(Expr::cust("1 = 0"))
}

pub(crate) fn primary_column<E: EntityTrait>() -> Option<E::Column> {
    E::PrimaryKey::iter().next().map(|pk| pk.into_column())
}

/// Receives notifications about gateway and cache activity. All methods default to no-op.
///
/// Callbacks are invoked synchronously, some of them with the cache lock held. They must be quick and must not call
/// back into the cache.
pub trait Observer: Send + Sync + 'static {
    /// A statement is about to be sent to the store.
    fn on_statement(&self, _statement: Statement) {}
    /// The whole relation has been loaded into the cache.
    fn on_reload(&self, _rows: usize) {}
    /// The cache lost its validity because of `error`. The next read will reload the relation.
    fn on_invalidate(&self, _error: &Error) {}
}

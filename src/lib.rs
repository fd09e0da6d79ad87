//! # wt-cache
//!
//! Write-through in-memory caching of whole relational tables, on top of a small typed CRUD facade for
//! [SeaORM](https://crates.io/crates/sea-orm).
//!
//! Think of it as a mirror of a hot table kept in the process memory: reads are served from the mirror, writes go to
//! the database first and are reflected in the mirror right after.
//!
//! # The Basics
//!
//! The crate is designed for the following use case:
//!
//! - A relation small enough to be kept in memory as a whole; e.g., settings, dictionaries, user accounts.
//! - Read-mostly access from many concurrent tasks.
//! - A single process owning the cache. There is no distributed coherence: changes made to the table by other
//!   processes become visible only after the cache is invalidated.
//!
//! The crate is layered:
//!
//! - [`Gateway`](gateway::Gateway) is a typed single-statement access layer over one entity: create, partial update,
//!   upsert, delete, first, find, count and transactions. Not-found results are `Option::None`, never errors.
//! - [`Predicate`](predicate::Predicate) builds conjunctive `WHERE` clauses out of query descriptors, i.e. structs
//!   whose fields carry comparison tags. See [`query_descriptor!`].
//! - [`Repository`](repository::Repository) is the query facade: descriptor based listing with pagination and key
//!   based CRUD, batch operations in transactions.
//! - [`EntityCache`](cache::EntityCache) is the memory image of a relation sitting in front of a repository.
//!
//! # Entity Controller
//!
//! Similar to other caching solutions, the cache itself knows nothing about the data it keeps. The knowledge is
//! provided by an [`EntityController`](traits::EntityController) implementation which tells the cache what the key
//! of a record is and how to select rows by a key or a set of keys.
//!
//! ```ignore
//! struct UserController;
//!
//! impl EntityController for UserController {
//!     type Entity = user::Entity;
//!     type Key = i32;
//!
//!     fn key_of(&self, model: &user::Model) -> i32 {
//!         model.id
//!     }
//! }
//!
//! let repository = Repository::new(Arc::new(UserController), db);
//! let cache = EntityCache::builder()
//!     .controller(UserController)
//!     .repository(repository)
//!     .build()
//!     .expect("cache");
//!
//! let ctx = Context::background();
//! cache.add(&ctx, user::Model { id: 1, name: "a".into() }).await?;
//! assert_eq!(cache.get(&ctx, &1).await?.map(|u| u.name.clone()), Some("a".into()));
//! ```
//!
//! # Consistency
//!
//! The cache keeps a validity flag. It is raised by a successful load of the whole relation and dropped whenever
//! re-reading a written row fails. A cache that is not valid reloads the relation on the next read. This is the only
//! recovery mechanism; nothing is retried.
//!
//! Every database statement runs within a [`Context`](context::Context), a cancellation scope with an optional
//! deadline.

pub mod cache;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod gateway;
#[cfg(feature = "tracing")]
pub mod logging;
pub mod predicate;
pub mod repository;
pub mod traits;
pub mod types;

#[doc(inline)]
pub use cache::EntityCache;
#[doc(inline)]
pub use error::Error;
#[doc(inline)]
pub use traits::EntityController;

pub mod prelude {
    pub use crate::cache::EntityCache;
    pub use crate::config::StoreConfig;
    pub use crate::context::Context;
    pub use crate::error::Error;
    pub use crate::gateway::Gateway;
    pub use crate::gateway::Transaction;
    pub use crate::predicate::Clause;
    pub use crate::predicate::FieldValue;
    pub use crate::predicate::Operator;
    pub use crate::predicate::Predicate;
    pub use crate::predicate::PredicateBuilder;
    pub use crate::predicate::QueryDescriptor;
    pub use crate::repository::Repository;
    pub use crate::traits::*;
    pub use crate::types::*;
}

/// Declare a query descriptor struct and implement [`QueryDescriptor`](predicate::QueryDescriptor) for it.
///
/// Every field must start with a `gq` attribute; other attributes follow it:
///
/// - `#[gq("op")]` compares the column named after the field;
/// - `#[gq("op=COLUMN")]` compares `COLUMN`;
/// - `#[gq(nested)]` appends the clauses of a nested descriptor;
/// - `#[gq(skip)]` and `#[gq("")]` exclude the field.
///
/// Operators are `eq`, `neq`, `like`, `gt`, `gte`, `lt` and `lte`; see [`predicate`] for their mapping.
///
/// ```ignore
/// wt_cache::query_descriptor! {
///     #[derive(Debug, Default)]
///     pub struct UserQuery {
///         #[gq("eq")]
///         pub id: Option<i32>,
///         #[gq("like=name")]
///         pub name_part: String,
///     }
/// }
/// ```
#[macro_export]
macro_rules! query_descriptor {
    (@field $builder:ident, $value:expr, $name:ident, nested) => {
        $builder.nested($value)?;
    };
    (@field $builder:ident, $value:expr, $name:ident, skip) => {};
    (@field $builder:ident, $value:expr, $name:ident, $tag:literal) => {
        $builder.field(stringify!($name), $tag, $value)?;
    };
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                #[gq($($gq:tt)+)]
                $(#[$fmeta:meta])*
                $fvis:vis $field:ident : $ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$fmeta])*
                $fvis $field: $ty,
            )*
        }

        impl $crate::predicate::QueryDescriptor for $name {
            fn describe(&self, builder: &mut $crate::predicate::PredicateBuilder) -> $crate::error::Result<()> {
                $(
                    $crate::query_descriptor!(@field builder, &self.$field, $field, $($gq)+);
                )*
                Ok(())
            }
        }
    };
}

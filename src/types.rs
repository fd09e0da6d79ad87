use std::fmt::Display;

use sea_orm::sea_query::Alias;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::Order;
use sea_orm::sea_query::SimpleExpr;
use sea_orm::QueryOrder;
use sea_orm::QuerySelect;
use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;

/// Pagination parameters of a list request.
///
/// `None`, zero or an empty string mean "omit".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListPage {
    pub offset: Option<u64>,
    /// Page size, applied as `LIMIT`.
    pub count:  Option<u64>,
    /// `"column [asc|desc]"`, several terms may be separated by commas.
    pub order:  String,
}

impl ListPage {
    pub fn new(offset: u64, count: u64) -> Self {
        Self {
            offset: Some(offset),
            count:  Some(count),
            order:  String::new(),
        }
    }

    pub fn ordered_by<S: Into<String>>(mut self, order: S) -> Self {
        self.order = order.into();
        self
    }

    /// Apply offset, limit and order to a query.
    pub(crate) fn apply<Q>(&self, mut query: Q) -> Result<Q>
    where
        Q: QuerySelect + QueryOrder,
    {
        if let Some(offset) = self.offset.filter(|o| *o > 0) {
            query = QuerySelect::offset(query, offset);
        }
        if let Some(count) = self.count.filter(|c| *c > 0) {
            query = QuerySelect::limit(query, count);
        }
        for (column, order) in parse_order(&self.order)? {
            let column: SimpleExpr = Expr::col(Alias::new(column)).into();
            query = query.order_by(column, order);
        }
        Ok(query)
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse a free-text order clause like `"id"`, `"name desc"` or `"age desc, id"`.
pub(crate) fn parse_order(order: &str) -> Result<Vec<(String, Order)>> {
    let mut terms = vec![];
    for term in order.split(',') {
        let mut words = term.split_whitespace();
        let Some(column) = words.next()
        else {
            if order.trim().is_empty() {
                break;
            }
            return Err(Error::invalid_input(format!("empty term in order clause '{order}'")));
        };
        if !is_identifier(column) {
            return Err(Error::invalid_input(format!("bad column name '{column}' in order clause")));
        }
        let direction = match words.next().map(|w| w.to_ascii_lowercase()) {
            None => Order::Asc,
            Some(w) if w == "asc" => Order::Asc,
            Some(w) if w == "desc" => Order::Desc,
            Some(w) => return Err(Error::invalid_input(format!("bad order direction '{w}'"))),
        };
        if let Some(extra) = words.next() {
            return Err(Error::invalid_input(format!("unexpected '{extra}' in order clause")));
        }
        terms.push((column.to_string(), direction));
    }
    Ok(terms)
}

/// Result of a paginated list request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListData<M> {
    /// Number of rows matching the predicate, regardless of pagination.
    pub total: u64,
    pub data:  Vec<M>,
}

impl<M> Default for ListData<M> {
    fn default() -> Self {
        Self { total: 0, data: vec![] }
    }
}

/// Kinds of statements a [`Gateway`](crate::gateway::Gateway) sends to the store. Reported to
/// [`Observer`](crate::traits::Observer)s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Statement {
    Insert,
    Update,
    Upsert,
    Delete,
    First,
    Find,
    Count,
    Begin,
    Commit,
    Rollback,
}

impl Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Upsert => "upsert",
            Self::Delete => "delete",
            Self::First => "first",
            Self::Find => "find",
            Self::Count => "count",
            Self::Begin => "begin",
            Self::Commit => "commit",
            Self::Rollback => "rollback",
        };
        f.write_str(name)
    }
}

/// Creation and modification timestamps, unix seconds. Meant to be embedded into entity models.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timestamps {
    pub created_at: i64,
    pub updated_at: i64,
}

impl Timestamps {
    pub fn now() -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().timestamp();
    }
}

/// Capability of records carrying creation/modification timestamps.
pub trait Timestamped {
    fn timestamps(&self) -> Timestamps;

    fn created_at(&self) -> i64 {
        self.timestamps().created_at
    }

    fn updated_at(&self) -> i64 {
        self.timestamps().updated_at
    }
}

impl Timestamped for Timestamps {
    fn timestamps(&self) -> Timestamps {
        *self
    }
}

/// Columns of an entity holding its creation and modification timestamps.
#[derive(Debug, Clone, Copy)]
pub struct TimestampColumns<COL> {
    pub created_at: COL,
    pub updated_at: COL,
}

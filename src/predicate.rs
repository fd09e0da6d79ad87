//! Translation of annotated query descriptors into conjunctive `WHERE` clauses.
//!
//! A query descriptor is a plain struct whose fields carry a `gq` tag naming the comparison operator and,
//! optionally, the column to compare against:
//!
//! ```ignore
//! wt_cache::query_descriptor! {
//!     #[derive(Debug, Default)]
//!     pub struct UserQuery {
//!         #[gq("eq")]
//!         pub id: Option<i32>,
//!         #[gq("like=name")]
//!         pub name_part: String,
//!         #[gq(nested)]
//!         pub age: AgeRange,
//!         #[gq(skip)]
//!         pub note: String,
//!     }
//! }
//! ```
//!
//! Fields holding no value (`None`, an empty string, a zero number, `false`) are skipped. A `Some` is always
//! considered a value unless it wraps an empty string. Clauses are emitted in field declaration order and joined with
//! `AND`. Fields whose tag names an unknown operator are skipped too, with a warning.
//!
//! Note that the ordering operators compare the *column* against the field: `gt` produces `` `C` < ? ``, i.e. the
//! field value is greater than the column. The same holds for `gte`, `lt` and `lte`.

use std::fmt::Display;
use std::str::FromStr;

use sea_orm::sea_query::Expr;
use sea_orm::sea_query::SimpleExpr;
use sea_orm::Condition;
use sea_orm::QueryFilter;
use sea_orm::Value;

use crate::error::Error;
use crate::error::Result;

/// Name of the field annotation understood by [`query_descriptor!`](crate::query_descriptor).
pub const TAG: &str = "gq";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Neq,
    Like,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Operator {
    pub fn sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Neq => "!=",
            Self::Like => "LIKE",
            Self::Gt => "<",
            Self::Gte => "<=",
            Self::Lt => ">",
            Self::Lte => ">=",
        }
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "eq" => Self::Eq,
            "neq" => Self::Neq,
            "like" => Self::Like,
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            _ => return Err(Error::invalid_input(format!("unknown {TAG} operator '{s}'"))),
        })
    }
}

/// Parsed `gq` annotation: `op` or `op=COLUMN`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTag {
    pub op:     Operator,
    pub column: Option<String>,
}

impl FieldTag {
    /// Parse an annotation. A field with a blank or unrecognized annotation doesn't take part in the predicate.
    pub fn parse(tag: &str) -> Option<Self> {
        let tag = tag.trim();
        if tag.is_empty() {
            return None;
        }
        match tag.parse() {
            Ok(tag) => Some(tag),
            Err(err) => {
                tracing::warn!("{TAG} tag ignored: {err}");
                None
            }
        }
    }
}

impl FromStr for FieldTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (op, column) = match s.split_once('=') {
            Some((op, column)) => {
                let column = column.trim();
                if column.is_empty() || column.contains('`') {
                    return Err(Error::invalid_input(format!("bad column in {TAG} tag '{s}'")));
                }
                (op, Some(column.to_string()))
            }
            None => (s, None),
        };
        Ok(Self {
            op: op.trim().parse()?,
            column,
        })
    }
}

/// One `` `column` op ? `` term of a predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    column: String,
    op:     Operator,
    value:  Value,
}

impl Clause {
    pub fn new<S: Into<String>, V: Into<Value>>(column: S, op: Operator, value: V) -> Self {
        Self {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn op(&self) -> Operator {
        self.op
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// SQL template of the clause with a `?` placeholder for the value.
    pub fn sql(&self) -> String {
        format!("`{}` {} ?", self.column, self.op.sql())
    }

    pub fn to_expr(&self) -> SimpleExpr {
        Expr::cust_with_values(self.sql(), [self.value.clone()])
    }
}

impl Display for Clause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "`{}` {} {}", self.column, self.op.sql(), render(&self.value))
    }
}

/// Conjunction of [`Clause`]s. An empty predicate matches every row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    clauses: Vec<Clause>,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_descriptor<D: QueryDescriptor + ?Sized>(descriptor: &D) -> Result<Self> {
        let mut builder = PredicateBuilder::default();
        descriptor.describe(&mut builder)?;
        Ok(builder.build())
    }

    pub fn and(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn condition(&self) -> Condition {
        self.clauses
            .iter()
            .fold(Condition::all(), |cond, clause| cond.add(clause.to_expr()))
    }

    pub fn apply<Q: QueryFilter>(&self, query: Q) -> Q {
        if self.is_empty() {
            query
        }
        else {
            query.filter(self.condition())
        }
    }
}

impl Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (idx, clause) in self.clauses.iter().enumerate() {
            if idx > 0 {
                f.write_str(" AND ")?;
            }
            write!(f, "{clause}")?;
        }
        Ok(())
    }
}

impl From<Predicate> for Condition {
    fn from(predicate: Predicate) -> Self {
        predicate.condition()
    }
}

impl From<&Predicate> for Condition {
    fn from(predicate: &Predicate) -> Self {
        predicate.condition()
    }
}

/// Collects clauses while a [`QueryDescriptor`] walks its fields.
#[derive(Debug, Default)]
pub struct PredicateBuilder {
    clauses: Vec<Clause>,
}

impl PredicateBuilder {
    /// Add a tagged field. `name` is the column used when the tag doesn't override it.
    pub fn field<V: FieldValue + ?Sized>(&mut self, name: &str, tag: &str, value: &V) -> Result<&mut Self> {
        let Some(tag) = FieldTag::parse(tag)
        else {
            return Ok(self);
        };
        let Some(value) = value.query_value()
        else {
            return Ok(self);
        };

        let value = if tag.op == Operator::Like {
            let Some(text) = plain(&value)
            else {
                return Err(Error::invalid_input(format!(
                    "field '{name}' can't be used with 'like': {value:?}"
                )));
            };
            Value::from(format!("%{text}%"))
        }
        else {
            value
        };

        let column = tag.column.unwrap_or_else(|| name.to_string());
        self.clauses.push(Clause::new(column, tag.op, value));
        Ok(self)
    }

    /// Walk a nested descriptor. Its clauses are appended to this predicate; the nested record is not a column.
    pub fn nested<D: QueryDescriptor + ?Sized>(&mut self, descriptor: &D) -> Result<&mut Self> {
        descriptor.describe(self)?;
        Ok(self)
    }

    pub fn clause(&mut self, clause: Clause) -> &mut Self {
        self.clauses.push(clause);
        self
    }

    pub fn build(self) -> Predicate {
        Predicate { clauses: self.clauses }
    }
}

/// A structured query, translated into a [`Predicate`] field by field.
///
/// Use [`query_descriptor!`](crate::query_descriptor) to implement it for tagged structs. `()` describes the empty
/// query.
pub trait QueryDescriptor {
    fn describe(&self, builder: &mut PredicateBuilder) -> Result<()>;
}

impl QueryDescriptor for () {
    fn describe(&self, _builder: &mut PredicateBuilder) -> Result<()> {
        Ok(())
    }
}

impl QueryDescriptor for Predicate {
    fn describe(&self, builder: &mut PredicateBuilder) -> Result<()> {
        for clause in &self.clauses {
            builder.clause(clause.clone());
        }
        Ok(())
    }
}

impl<D: QueryDescriptor> QueryDescriptor for Option<D> {
    fn describe(&self, builder: &mut PredicateBuilder) -> Result<()> {
        match self {
            Some(descriptor) => descriptor.describe(builder),
            None => Ok(()),
        }
    }
}

impl<D: QueryDescriptor + ?Sized> QueryDescriptor for &D {
    fn describe(&self, builder: &mut PredicateBuilder) -> Result<()> {
        (**self).describe(builder)
    }
}

impl<D: QueryDescriptor + ?Sized> QueryDescriptor for Box<D> {
    fn describe(&self, builder: &mut PredicateBuilder) -> Result<()> {
        (**self).describe(builder)
    }
}

/// A value a descriptor field may hold.
pub trait FieldValue {
    /// Value of a field holding `self` directly. `None` means the field is empty and must be skipped.
    fn query_value(&self) -> Option<Value>;

    /// Value of an optional field set to `self`. Only empty strings are treated as absent here.
    fn set_value(&self) -> Option<Value> {
        self.query_value()
    }
}

macro_rules! scalar_field_value {
    ($($t:ty),* $(,)?) => {
        $(
            impl FieldValue for $t {
                fn query_value(&self) -> Option<Value> {
                    (*self != <$t>::default()).then(|| Value::from(*self))
                }

                fn set_value(&self) -> Option<Value> {
                    Some(Value::from(*self))
                }
            }
        )*
    };
}

scalar_field_value!(i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, bool);

impl FieldValue for String {
    fn query_value(&self) -> Option<Value> {
        (!self.is_empty()).then(|| Value::from(self.clone()))
    }
}

impl FieldValue for str {
    fn query_value(&self) -> Option<Value> {
        (!self.is_empty()).then(|| Value::from(self))
    }
}

impl<T: FieldValue> FieldValue for Option<T> {
    fn query_value(&self) -> Option<Value> {
        self.as_ref().and_then(FieldValue::set_value)
    }
}

impl<T: FieldValue + ?Sized> FieldValue for &T {
    fn query_value(&self) -> Option<Value> {
        (**self).query_value()
    }

    fn set_value(&self) -> Option<Value> {
        (**self).set_value()
    }
}

// Textual form of scalar values, `None` for anything else.
fn plain(value: &Value) -> Option<String> {
    Some(match value {
        Value::Bool(Some(v)) => v.to_string(),
        Value::TinyInt(Some(v)) => v.to_string(),
        Value::SmallInt(Some(v)) => v.to_string(),
        Value::Int(Some(v)) => v.to_string(),
        Value::BigInt(Some(v)) => v.to_string(),
        Value::TinyUnsigned(Some(v)) => v.to_string(),
        Value::SmallUnsigned(Some(v)) => v.to_string(),
        Value::Unsigned(Some(v)) => v.to_string(),
        Value::BigUnsigned(Some(v)) => v.to_string(),
        Value::Float(Some(v)) => v.to_string(),
        Value::Double(Some(v)) => v.to_string(),
        Value::String(Some(v)) => v.to_string(),
        Value::Char(Some(v)) => v.to_string(),
        _ => return None,
    })
}

fn render(value: &Value) -> String {
    match value {
        Value::String(Some(v)) => format!("'{}'", v.replace('\'', "''")),
        Value::Char(Some(v)) => format!("'{v}'"),
        _ => plain(value).unwrap_or_else(|| "?".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::query_descriptor! {
        #[derive(Debug, Default)]
        struct Range {
            #[gq("gte=age")]
            min_age: Option<i32>,
            #[gq("lte=age")]
            max_age: Option<i32>,
        }
    }

    crate::query_descriptor! {
        #[derive(Debug, Default)]
        struct Query {
            #[gq("eq")]
            id: Option<i64>,
            #[gq("like")]
            name: String,
            #[gq(nested)]
            range: Range,
            #[gq("neq=status")]
            not_status: i32,
            #[gq(skip)]
            #[allow(dead_code)]
            comment: String,
            #[gq("")]
            #[allow(dead_code)]
            untagged: Option<i32>,
        }
    }

    #[test]
    fn test_operator_mapping() {
        let cases = [
            ("eq", "="),
            ("neq", "!="),
            ("like", "LIKE"),
            ("gt", "<"),
            ("gte", "<="),
            ("lt", ">"),
            ("lte", ">="),
        ];
        for (tag, sql) in cases {
            let op: Operator = tag.parse().unwrap();
            assert_eq!(op.sql(), sql, "operator {tag}");
        }
    }

    #[test]
    fn test_tag_parsing() {
        assert_eq!(FieldTag::parse(""), None);
        assert_eq!(
            FieldTag::parse("gt=CC"),
            Some(FieldTag {
                op:     Operator::Gt,
                column: Some("CC".to_string()),
            })
        );
        assert_eq!(
            FieldTag::parse("like"),
            Some(FieldTag {
                op:     Operator::Like,
                column: None,
            })
        );
        for bad in ["let=A", "eq=", "between", "eq=`x`"] {
            assert_eq!(FieldTag::parse(bad), None, "'{bad}' must be ignored");
            assert!(
                matches!(bad.parse::<FieldTag>(), Err(Error::InvalidInput(_))),
                "'{bad}' must not parse"
            );
        }
    }

    #[test]
    fn test_empty_descriptor_has_no_clauses() {
        let predicate = Predicate::from_descriptor(&Query::default()).unwrap();
        assert!(predicate.is_empty());
        assert_eq!(predicate.to_string(), "");

        let predicate = Predicate::from_descriptor(&()).unwrap();
        assert!(predicate.is_empty());

        let predicate = Predicate::from_descriptor(&Option::<Query>::None).unwrap();
        assert!(predicate.is_empty());
    }

    #[test]
    fn test_clause_order_and_nesting() {
        let query = Query {
            id: Some(0),
            name: "foo".to_string(),
            range: Range {
                min_age: Some(18),
                max_age: None,
            },
            not_status: 3,
            comment: "ignored".to_string(),
            untagged: Some(1),
        };
        let predicate = Predicate::from_descriptor(&query).unwrap();
        assert_eq!(
            predicate.to_string(),
            "`id` = 0 AND `name` LIKE '%foo%' AND `age` <= 18 AND `status` != 3"
        );
        assert_eq!(predicate.len(), 4);
        assert_eq!(predicate.clauses()[1].sql(), "`name` LIKE ?");
        assert_eq!(predicate.clauses()[1].value(), &Value::from("%foo%"));
    }

    #[test]
    fn test_explicit_columns() {
        crate::query_descriptor! {
            struct Abc {
                #[gq("eq=A")]
                a: i32,
                #[gq("like=B")]
                b: String,
                #[gq("gt=CC")]
                c: u64,
            }
        }

        let query = Abc {
            a: 5,
            b: "foo".to_string(),
            c: 10,
        };
        let predicate = Predicate::from_descriptor(&query).unwrap();
        assert_eq!(predicate.to_string(), "`A` = 5 AND `B` LIKE '%foo%' AND `CC` < 10");
    }

    #[test]
    fn test_optional_empty_string_is_absent() {
        let mut builder = PredicateBuilder::default();
        builder
            .field("a", "eq", &Some(String::new()))
            .unwrap()
            .field("b", "eq", &Some(false))
            .unwrap()
            .field("c", "eq", &false)
            .unwrap();
        assert_eq!(builder.build().to_string(), "`b` = false");
    }

    #[test]
    fn test_unrecognized_tag_is_skipped() {
        let mut builder = PredicateBuilder::default();
        builder
            .field("a", "let=A", &Some(1))
            .unwrap()
            .field("b", "eq=", &Some(2))
            .unwrap()
            .field("c", "gte", &Some(3))
            .unwrap();
        assert_eq!(builder.build().to_string(), "`c` <= 3");
    }

    #[test]
    fn test_string_rendering_escapes_quotes() {
        let predicate = Predicate::new().and(Clause::new("name", Operator::Eq, "O'Hara"));
        assert_eq!(predicate.to_string(), "`name` = 'O''Hara'");
    }
}

//! Parameter and row values.
//!
//! [`Value`] is the closed set of things a clause can compare against, bind as
//! a parameter, or receive back from a backend row.

use std::fmt;
use std::sync::Arc;

use crate::sql::SqlFragment;

/// A single SQL value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Integer value (i64)
    Integer(i64),
    /// Floating point value (f64)
    Float(f64),
    /// Text value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// NULL value
    #[default]
    Null,
    /// Trusted SQL text, always inlined and never bound
    Raw(String),
    /// Operand of an `IN (...)` list
    List(Vec<Value>),
    /// Rendered subquery used as an `IN (subquery)` operand or derived table
    Subquery(Box<SqlFragment>),
}

impl Value {
    /// Creates a trusted raw SQL value.
    #[inline]
    pub fn raw(text: impl Into<String>) -> Self {
        Value::Raw(text.into())
    }

    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the value as an `i64` if it holds an integer or a boolean.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Raw(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Integer(i) => Some(*i != 0),
            _ => None,
        }
    }

    /// Renders the value as trusted inline SQL text.
    ///
    /// Text is emitted verbatim: inlining is only for values the caller
    /// already trusts as SQL (column references, expressions, literals).
    pub fn to_inline_sql(&self) -> String {
        match self {
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Text(s) | Value::Raw(s) => s.clone(),
            Value::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
            Value::Null => "NULL".to_string(),
            Value::List(items) => {
                let inner: Vec<String> = items.iter().map(Value::to_inline_sql).collect();
                format!("({})", inner.join(","))
            }
            Value::Subquery(fragment) => format!("({})", fragment.to_inline_sql()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) | Value::Raw(s) => f.write_str(s),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => Ok(()),
            Value::List(_) | Value::Subquery(_) => f.write_str(&self.to_inline_sql()),
        }
    }
}

//------------------------------------------------------------------------------
// Conversions
//------------------------------------------------------------------------------

macro_rules! impl_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                #[inline]
                fn from(value: $ty) -> Self {
                    Value::Integer(i64::from(value))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Value {
    #[inline]
    fn from(value: f32) -> Self {
        Value::Float(f64::from(value))
    }
}

impl From<f64> for Value {
    #[inline]
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    #[inline]
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    #[inline]
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    #[inline]
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&String> for Value {
    #[inline]
    fn from(value: &String) -> Self {
        Value::Text(value.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::List(values.into_iter().map(Into::into).collect())
    }
}

impl From<SqlFragment> for Value {
    fn from(fragment: SqlFragment) -> Self {
        Value::Subquery(Box::new(fragment))
    }
}

//------------------------------------------------------------------------------
// Row
//------------------------------------------------------------------------------

/// One row returned by a backend cursor.
///
/// Column names are shared between all rows of the same cursor.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[inline]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Looks a value up by column name (case-insensitive).
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .and_then(|i| self.values.get(i))
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

//! SQL fragments and rendered statements.
//!
//! A [`SqlFragment`] is a flat list of text tokens and bound parameters.
//! Placeholders are only assigned when the outermost fragment is rendered
//! against a [`Dialect`], so fragments from subqueries and joins can be
//! spliced together without renumbering.

use std::borrow::Cow;
use std::fmt;

use smallvec::SmallVec;

use crate::dialect::{Binding, Dialect};
use crate::value::Value;

/// A bound parameter inside a fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParam {
    pub value: Value,
    /// Pre-assigned name, used by dialects with named binding
    pub name: Option<String>,
}

impl BoundParam {
    #[inline]
    pub fn positional(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            name: None,
        }
    }

    #[inline]
    pub fn named(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            name: Some(name.into()),
        }
    }
}

/// One piece of a fragment.
#[derive(Debug, Clone, PartialEq)]
pub enum Chunk {
    Text(Cow<'static, str>),
    Param(BoundParam),
}

/// SQL fragment builder with flat chunk storage.
///
/// Uses `SmallVec<[Chunk; 8]>` for inline storage of typical predicate
/// fragments without heap allocation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SqlFragment {
    chunks: SmallVec<[Chunk; 8]>,
}

impl SqlFragment {
    /// Creates an empty fragment
    #[inline]
    pub const fn empty() -> Self {
        Self {
            chunks: SmallVec::new_const(),
        }
    }

    /// Creates a fragment holding a single text token
    #[inline]
    pub fn text(text: impl Into<Cow<'static, str>>) -> Self {
        Self {
            chunks: smallvec::smallvec![Chunk::Text(text.into())],
        }
    }

    /// Creates a fragment holding a single bound parameter
    #[inline]
    pub fn param(param: BoundParam) -> Self {
        Self {
            chunks: smallvec::smallvec![Chunk::Param(param)],
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    #[inline]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Bound parameters in emission order
    pub fn params(&self) -> impl Iterator<Item = &BoundParam> {
        self.chunks.iter().filter_map(|chunk| match chunk {
            Chunk::Param(param) => Some(param),
            Chunk::Text(_) => None,
        })
    }

    pub(crate) fn params_mut(&mut self) -> impl Iterator<Item = &mut BoundParam> {
        self.chunks.iter_mut().filter_map(|chunk| match chunk {
            Chunk::Param(param) => Some(param),
            Chunk::Text(_) => None,
        })
    }

    #[inline]
    pub fn param_count(&self) -> usize {
        self.params().count()
    }

    #[inline]
    pub fn push_text(&mut self, text: impl Into<Cow<'static, str>>) {
        self.chunks.push(Chunk::Text(text.into()));
    }

    #[inline]
    pub fn push_param(&mut self, param: BoundParam) {
        self.chunks.push(Chunk::Param(param));
    }

    /// Append another fragment (flat extend)
    #[inline]
    pub fn append(&mut self, other: SqlFragment) {
        if self.chunks.is_empty() {
            self.chunks = other.chunks;
            return;
        }
        self.chunks.extend(other.chunks);
    }

    /// Append a copy of another fragment
    #[inline]
    pub fn append_ref(&mut self, other: &SqlFragment) {
        self.chunks.extend(other.chunks.iter().cloned());
    }

    /// Builder-style [`push_text`](Self::push_text)
    #[inline]
    pub fn with_text(mut self, text: impl Into<Cow<'static, str>>) -> Self {
        self.push_text(text);
        self
    }

    /// Wraps the fragment in parentheses
    pub fn parens(self) -> Self {
        let mut out = SqlFragment::text("(");
        out.append(self);
        out.push_text(")");
        out
    }

    /// Renders the fragment with dialect placeholders, numbering parameters
    /// from 1 in emission order.
    pub fn render(&self, dialect: &dyn Dialect) -> Statement {
        let mut sql = String::with_capacity(self.chunks.len() * 8);
        let mut params = Vec::new();
        let mut param_names = Vec::new();
        let named = dialect.binding() == Binding::Named;

        for chunk in &self.chunks {
            match chunk {
                Chunk::Text(text) => push_token(&mut sql, text),
                Chunk::Param(param) => {
                    let index = params.len() + 1;
                    let name = match (&param.name, named) {
                        (Some(name), true) => Some(Cow::Borrowed(name.as_str())),
                        (None, true) => Some(Cow::Owned(format!("p{index}"))),
                        (_, false) => None,
                    };
                    push_token(&mut sql, &dialect.placeholder(index, name.as_deref()));
                    if let Some(name) = name {
                        param_names.push(name.into_owned());
                    }
                    params.push(param.value.clone());
                }
            }
        }

        Statement {
            sql,
            params,
            param_names,
        }
    }

    /// Renders the fragment with every parameter inlined as trusted SQL text.
    pub fn to_inline_sql(&self) -> String {
        let mut sql = String::new();
        for chunk in &self.chunks {
            match chunk {
                Chunk::Text(text) => push_token(&mut sql, text),
                Chunk::Param(param) => push_token(&mut sql, &param.value.to_inline_sql()),
            }
        }
        sql
    }
}

impl From<&'static str> for SqlFragment {
    fn from(text: &'static str) -> Self {
        SqlFragment::text(text)
    }
}

impl From<String> for SqlFragment {
    fn from(text: String) -> Self {
        SqlFragment::text(text)
    }
}

impl Extend<Chunk> for SqlFragment {
    fn extend<T: IntoIterator<Item = Chunk>>(&mut self, iter: T) {
        self.chunks.extend(iter);
    }
}

/// Joins tokens with single spaces; no space is inserted before `,` or `;`.
fn push_token(sql: &mut String, token: &str) {
    if token.is_empty() {
        return;
    }
    if !sql.is_empty() && !token.starts_with([',', ';']) {
        sql.push(' ');
    }
    sql.push_str(token);
}

/// A fully rendered statement: SQL text plus its parameters in placeholder order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
    /// Parameter names, parallel to `params`; empty for positional dialects
    pub param_names: Vec<String>,
}

impl Statement {
    /// Creates a statement from raw SQL and positional parameters.
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
            param_names: Vec::new(),
        }
    }

    /// Creates a statement from raw SQL and named parameters.
    pub fn named(sql: impl Into<String>, params: Vec<(String, Value)>) -> Self {
        let (param_names, params) = params.into_iter().unzip();
        Self {
            sql: sql.into(),
            params,
            param_names,
        }
    }

    #[inline]
    pub fn is_named(&self) -> bool {
        !self.param_names.is_empty()
    }

    /// Pairs each parameter with its name; yields nothing for positional statements.
    pub fn named_params(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.param_names
            .iter()
            .map(String::as_str)
            .zip(self.params.iter())
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

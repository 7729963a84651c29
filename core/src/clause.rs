//! Clause store for WHERE and JOIN-ON predicates.
//!
//! A [`Predicate`] is an append-only sequence of [`Clause`] tokens. Nothing is
//! reordered or deduplicated; the renderer in [`crate::render`] walks the
//! tokens in order.

use crate::sql::SqlFragment;
use crate::value::Value;

// =============================================================================
// Tokens
// =============================================================================

/// Logical connector between conditions and brackets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Connector {
    #[default]
    And,
    Or,
}

impl Connector {
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Connector::And => "AND",
            Connector::Or => "OR",
        }
    }
}

/// A single `field comparator value` test.
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    pub field: String,
    pub comparator: String,
    pub value: Value,
    /// Bind the value as a parameter instead of inlining it
    pub escape: bool,
    /// Names assigned to this condition's parameters under named binding.
    /// Empty for positional binding.
    pub param_names: Vec<String>,
}

impl Condition {
    pub fn new(
        field: impl Into<String>,
        comparator: impl Into<String>,
        value: impl Into<Value>,
        escape: bool,
    ) -> Self {
        Self {
            field: field.into(),
            comparator: comparator.into(),
            value: value.into(),
            escape,
            param_names: Vec::new(),
        }
    }
}

/// One token in a predicate.
#[derive(Clone, Debug, PartialEq)]
pub enum Clause {
    Condition(Condition),
    /// Sets the connector used for every following condition or bracket
    Connector(Connector),
    BracketOpen,
    BracketClose,
}

// =============================================================================
// Parameter naming
// =============================================================================

/// Counter used to hand out `{prefix}{n}` parameter names.
///
/// A `None` prefix means positional binding: no names are assigned.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ParamNaming {
    pub prefix: Option<String>,
    pub next: usize,
}

impl ParamNaming {
    pub fn named(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            next: 0,
        }
    }

    #[inline]
    pub fn is_named(&self) -> bool {
        self.prefix.is_some()
    }

    /// Returns the next name, or `None` under positional binding.
    pub fn next_name(&mut self) -> Option<String> {
        let prefix = self.prefix.as_deref()?;
        self.next += 1;
        Some(format!("{prefix}{}", self.next))
    }
}

// =============================================================================
// Predicate
// =============================================================================

/// Ordered clause store for one WHERE or JOIN-ON expression.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Predicate {
    clauses: Vec<Clause>,
    naming: ParamNaming,
}

impl Predicate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty predicate that continues an existing naming sequence.
    pub fn with_naming(naming: ParamNaming) -> Self {
        Self {
            clauses: Vec::new(),
            naming,
        }
    }

    #[inline]
    pub fn naming(&self) -> &ParamNaming {
        &self.naming
    }

    pub(crate) fn take_naming(&mut self) -> ParamNaming {
        std::mem::take(&mut self.naming)
    }

    pub(crate) fn restore_naming(&mut self, naming: ParamNaming) {
        self.naming = naming;
    }

    /// Switches to named binding. Names already assigned are kept.
    pub fn set_param_prefix(&mut self, prefix: impl Into<String>) -> &mut Self {
        self.naming.prefix = Some(prefix.into());
        self
    }

    #[inline]
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Appends a token as-is.
    pub fn push(&mut self, clause: Clause) -> &mut Self {
        self.clauses.push(clause);
        self
    }

    /// Appends `field comparator value`. With `escape` the value is bound,
    /// otherwise it is inlined as trusted SQL. [`Value::Raw`] is inlined
    /// either way.
    pub fn where_(
        &mut self,
        field: impl Into<String>,
        comparator: impl Into<String>,
        value: impl Into<Value>,
        escape: bool,
    ) -> &mut Self {
        let mut condition = Condition::new(field, comparator, value, escape);
        if escape {
            condition.param_names = match &condition.value {
                Value::List(items) => {
                    let bound = items.iter().filter(|item| !matches!(item, Value::Raw(_)));
                    self.assign_names(bound.count())
                }
                Value::Subquery(_) | Value::Raw(_) => Vec::new(),
                _ => self.assign_names(1),
            };
        }
        if let Value::Subquery(fragment) = &mut condition.value {
            self.rename_params(fragment);
        }
        self.push(Clause::Condition(condition))
    }

    /// Alias of [`where_`](Self::where_) for join predicates.
    #[inline]
    pub fn on(
        &mut self,
        field: impl Into<String>,
        comparator: impl Into<String>,
        value: impl Into<Value>,
        escape: bool,
    ) -> &mut Self {
        self.where_(field, comparator, value, escape)
    }

    pub fn where_null(&mut self, field: impl Into<String>) -> &mut Self {
        self.push(Clause::Condition(Condition::new(field, "IS", Value::Null, false)))
    }

    pub fn where_not_null(&mut self, field: impl Into<String>) -> &mut Self {
        self.push(Clause::Condition(Condition::new(
            field,
            "IS NOT",
            Value::Null,
            false,
        )))
    }

    /// `field IN (...)`. With `escape` every element becomes its own bound
    /// parameter.
    pub fn where_in_list<V: Into<Value>>(
        &mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
        escape: bool,
    ) -> &mut Self {
        self.in_list("IN", field.into(), values, escape)
    }

    pub fn where_not_in_list<V: Into<Value>>(
        &mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
        escape: bool,
    ) -> &mut Self {
        self.in_list("NOT IN", field.into(), values, escape)
    }

    /// `field IN (subquery)`. The subquery's fragment is copied in together
    /// with its parameters.
    pub fn where_in_sub(&mut self, field: impl Into<String>, subquery: &SqlFragment) -> &mut Self {
        self.where_(field, "IN", subquery.clone(), true)
    }

    pub fn where_not_in_sub(
        &mut self,
        field: impl Into<String>,
        subquery: &SqlFragment,
    ) -> &mut Self {
        self.where_(field, "NOT IN", subquery.clone(), true)
    }

    #[inline]
    pub fn or(&mut self) -> &mut Self {
        self.push(Clause::Connector(Connector::Or))
    }

    #[inline]
    pub fn and(&mut self) -> &mut Self {
        self.push(Clause::Connector(Connector::And))
    }

    #[inline]
    pub fn open_bracket(&mut self) -> &mut Self {
        self.push(Clause::BracketOpen)
    }

    #[inline]
    pub fn close_bracket(&mut self) -> &mut Self {
        self.push(Clause::BracketClose)
    }

    fn in_list<V: Into<Value>>(
        &mut self,
        comparator: &'static str,
        field: String,
        values: impl IntoIterator<Item = V>,
        escape: bool,
    ) -> &mut Self {
        let items: Vec<Value> = values.into_iter().map(Into::into).collect();
        self.where_(field, comparator, Value::List(items), escape)
    }

    fn assign_names(&mut self, count: usize) -> Vec<String> {
        (0..count).filter_map(|_| self.naming.next_name()).collect()
    }

    /// Gives spliced subquery parameters names from this predicate's sequence
    /// so they cannot collide with names the subquery assigned on its own.
    pub(crate) fn rename_params(&mut self, fragment: &mut SqlFragment) {
        if !self.naming.is_named() {
            return;
        }
        for param in fragment.params_mut() {
            param.name = self.naming.next_name();
        }
    }
}

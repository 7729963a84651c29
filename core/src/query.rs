//! Query builder and statement assembly.
//!
//! A [`Query`] collects table, columns, joins, predicate, grouping, ordering,
//! paging and an optional write payload. Rendering (`to_select`, `to_insert`,
//! `to_update`, `to_delete`) borrows the builder and returns a fresh
//! [`Statement`] every time.

use std::fmt;
use std::str::FromStr;

use crate::clause::{ParamNaming, Predicate};
use crate::dialect::{Binding, Dialect, DialectKind};
use crate::join::{Join, JoinKind, Source};
use crate::sql::{BoundParam, SqlFragment, Statement};
use crate::value::Value;

// =============================================================================
// Ordering
// =============================================================================

/// Sort direction for ORDER BY.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("asc") {
            Ok(Direction::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Ok(Direction::Desc)
        } else {
            Err(format!("invalid sort direction '{s}'"))
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

// =============================================================================
// Write payloads
// =============================================================================

#[derive(Clone, Debug, PartialEq)]
enum Write {
    Insert {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
        escape: bool,
    },
    Update {
        assignments: Vec<(String, Value)>,
        escape: bool,
    },
}

// =============================================================================
// Query
// =============================================================================

/// Builder state for one statement.
///
/// Builder methods consume and return the query. Every identifier passed in
/// is checked against the reserved-word list and quoted by the dialect.
/// `Clone` is a deep copy: clones never share clause or join storage.
#[derive(Clone, Debug)]
pub struct Query {
    dialect: &'static dyn Dialect,
    source: Option<Source>,
    columns: Vec<String>,
    predicate: Predicate,
    joins: Vec<Join>,
    group_by: Vec<String>,
    order_by: Vec<OrderBy>,
    limit: Option<u64>,
    offset: Option<u64>,
    write: Option<Write>,
    parallel: bool,
}

impl Query {
    /// Creates an empty query. Dialects with named binding start with their
    /// default parameter prefix.
    pub fn new(dialect: &'static dyn Dialect) -> Self {
        let naming = match dialect.default_param_prefix() {
            Some(prefix) => ParamNaming::named(prefix),
            None => ParamNaming::default(),
        };
        Self {
            dialect,
            source: None,
            columns: Vec::new(),
            predicate: Predicate::with_naming(naming),
            joins: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            write: None,
            parallel: false,
        }
    }

    pub fn for_kind(kind: DialectKind) -> Self {
        Self::new(kind.dialect())
    }

    #[inline]
    pub fn dialect(&self) -> &'static dyn Dialect {
        self.dialect
    }

    #[inline]
    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    #[inline]
    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    #[inline]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[inline]
    pub fn ordering(&self) -> &[OrderBy] {
        &self.order_by
    }

    /// Whether executions of this query open their own connection.
    #[inline]
    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    #[inline]
    pub fn has_insert(&self) -> bool {
        matches!(self.write, Some(Write::Insert { .. }))
    }

    #[inline]
    pub fn has_update(&self) -> bool {
        matches!(self.write, Some(Write::Update { .. }))
    }

    /// Number of rows in the insert payload.
    pub fn insert_row_count(&self) -> usize {
        match &self.write {
            Some(Write::Insert { rows, .. }) => rows.len(),
            _ => 0,
        }
    }

    fn quote(&self, ident: &str) -> String {
        self.dialect.quote_identifier(ident).into_owned()
    }

    // -------------------------------------------------------------------------
    // Source and columns
    // -------------------------------------------------------------------------

    pub fn table(mut self, table: impl AsRef<str>) -> Self {
        self.source = Some(Source::Table(self.quote(table.as_ref())));
        self
    }

    /// Selects from a derived table `(subquery) alias`.
    pub fn table_sub(mut self, subquery: &Query, alias: impl AsRef<str>) -> Self {
        let mut fragment = subquery.select_fragment();
        self.predicate.rename_params(&mut fragment);
        self.source = Some(Source::Subquery {
            fragment,
            alias: self.quote(alias.as_ref()),
        });
        self
    }

    pub fn cols<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.columns = columns
            .into_iter()
            .map(|c| self.dialect.quote_identifier(c.as_ref()).into_owned())
            .collect();
        self
    }

    fn aggregate(&self, function: &str, column: &str, alias: &str) -> String {
        format!("{function}({}) {}", self.quote(column), self.quote(alias))
    }

    /// `COUNT(column) alias`, for use in [`cols`](Self::cols).
    pub fn count(&self, column: &str, alias: &str) -> String {
        self.aggregate("COUNT", column, alias)
    }

    pub fn sum(&self, column: &str, alias: &str) -> String {
        self.aggregate("SUM", column, alias)
    }

    pub fn avg(&self, column: &str, alias: &str) -> String {
        self.aggregate("AVG", column, alias)
    }

    pub fn max(&self, column: &str, alias: &str) -> String {
        self.aggregate("MAX", column, alias)
    }

    pub fn min(&self, column: &str, alias: &str) -> String {
        self.aggregate("MIN", column, alias)
    }

    // -------------------------------------------------------------------------
    // Joins
    // -------------------------------------------------------------------------

    fn key_join(mut self, kind: JoinKind, source: Source, primary_key: &str, foreign_key: &str) -> Self {
        let mut on = Predicate::new();
        on.on(
            self.quote(primary_key),
            "=",
            Value::Raw(self.quote(foreign_key)),
            false,
        );
        self.joins.push(Join::new(kind, source, on));
        self
    }

    /// Builds the ON predicate with `build`, continuing this query's
    /// parameter naming so join parameters never reuse a name.
    fn query_join(mut self, kind: JoinKind, source: Source, build: impl FnOnce(&mut Predicate)) -> Self {
        let mut on = Predicate::with_naming(self.predicate.take_naming());
        build(&mut on);
        self.predicate.restore_naming(on.take_naming());
        self.joins.push(Join::new(kind, source, on));
        self
    }

    fn sub_source(&mut self, subquery: &Query, alias: &str) -> Source {
        let mut fragment = subquery.select_fragment();
        self.predicate.rename_params(&mut fragment);
        Source::Subquery {
            fragment,
            alias: self.quote(alias),
        }
    }

    /// `JOIN table ON primary_key = foreign_key`
    pub fn join_table(self, table: &str, primary_key: &str, foreign_key: &str) -> Self {
        let source = Source::Table(self.quote(table));
        self.key_join(JoinKind::Inner, source, primary_key, foreign_key)
    }

    pub fn left_join_table(self, table: &str, primary_key: &str, foreign_key: &str) -> Self {
        let source = Source::Table(self.quote(table));
        self.key_join(JoinKind::Left, source, primary_key, foreign_key)
    }

    /// `JOIN (subquery) alias ON primary_key = foreign_key`
    pub fn join_sub(mut self, subquery: &Query, alias: &str, primary_key: &str, foreign_key: &str) -> Self {
        let source = self.sub_source(subquery, alias);
        self.key_join(JoinKind::Inner, source, primary_key, foreign_key)
    }

    pub fn left_join_sub(
        mut self,
        subquery: &Query,
        alias: &str,
        primary_key: &str,
        foreign_key: &str,
    ) -> Self {
        let source = self.sub_source(subquery, alias);
        self.key_join(JoinKind::Left, source, primary_key, foreign_key)
    }

    /// `JOIN table ON <predicate>`, with the predicate built by `build`.
    pub fn join_table_query(self, table: &str, build: impl FnOnce(&mut Predicate)) -> Self {
        let source = Source::Table(self.quote(table));
        self.query_join(JoinKind::Inner, source, build)
    }

    pub fn left_join_table_query(self, table: &str, build: impl FnOnce(&mut Predicate)) -> Self {
        let source = Source::Table(self.quote(table));
        self.query_join(JoinKind::Left, source, build)
    }

    pub fn join_sub_query(
        mut self,
        subquery: &Query,
        alias: &str,
        build: impl FnOnce(&mut Predicate),
    ) -> Self {
        let source = self.sub_source(subquery, alias);
        self.query_join(JoinKind::Inner, source, build)
    }

    pub fn left_join_sub_query(
        mut self,
        subquery: &Query,
        alias: &str,
        build: impl FnOnce(&mut Predicate),
    ) -> Self {
        let source = self.sub_source(subquery, alias);
        self.query_join(JoinKind::Left, source, build)
    }

    // -------------------------------------------------------------------------
    // Predicate
    // -------------------------------------------------------------------------

    pub fn where_(
        mut self,
        field: &str,
        comparator: &str,
        value: impl Into<Value>,
        escape: bool,
    ) -> Self {
        let field = self.quote(field);
        self.predicate.where_(field, comparator, value, escape);
        self
    }

    pub fn where_null(mut self, field: &str) -> Self {
        let field = self.quote(field);
        self.predicate.where_null(field);
        self
    }

    pub fn where_not_null(mut self, field: &str) -> Self {
        let field = self.quote(field);
        self.predicate.where_not_null(field);
        self
    }

    pub fn where_in_list<V: Into<Value>>(
        mut self,
        field: &str,
        values: impl IntoIterator<Item = V>,
        escape: bool,
    ) -> Self {
        let field = self.quote(field);
        self.predicate.where_in_list(field, values, escape);
        self
    }

    pub fn where_not_in_list<V: Into<Value>>(
        mut self,
        field: &str,
        values: impl IntoIterator<Item = V>,
        escape: bool,
    ) -> Self {
        let field = self.quote(field);
        self.predicate.where_not_in_list(field, values, escape);
        self
    }

    /// `field IN (subquery)`; the subquery is only read.
    pub fn where_in_sub(mut self, field: &str, subquery: &Query) -> Self {
        let field = self.quote(field);
        self.predicate.where_in_sub(field, &subquery.select_fragment());
        self
    }

    pub fn where_not_in_sub(mut self, field: &str, subquery: &Query) -> Self {
        let field = self.quote(field);
        self.predicate
            .where_not_in_sub(field, &subquery.select_fragment());
        self
    }

    pub fn or(mut self) -> Self {
        self.predicate.or();
        self
    }

    pub fn and(mut self) -> Self {
        self.predicate.and();
        self
    }

    pub fn open_bracket(mut self) -> Self {
        self.predicate.open_bracket();
        self
    }

    pub fn close_bracket(mut self) -> Self {
        self.predicate.close_bracket();
        self
    }

    // -------------------------------------------------------------------------
    // Grouping, ordering, paging
    // -------------------------------------------------------------------------

    pub fn group_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for field in fields {
            let field = self.quote(field.as_ref());
            self.group_by.push(field);
        }
        self
    }

    /// Adds an ORDER BY term. `direction` is matched case-insensitively;
    /// anything other than `ASC` or `DESC` leaves the query unchanged.
    pub fn order_by(mut self, field: &str, direction: &str) -> Self {
        if let Ok(direction) = direction.parse::<Direction>() {
            let field = self.quote(field);
            self.order_by.push(OrderBy { field, direction });
        }
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    // -------------------------------------------------------------------------
    // Write payloads
    // -------------------------------------------------------------------------

    /// Sets a single-row insert. Columns keep the order given.
    pub fn insert<K, V>(mut self, values: impl IntoIterator<Item = (K, V)>, escape: bool) -> Self
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        let (columns, row): (Vec<String>, Vec<Value>) = values
            .into_iter()
            .map(|(k, v)| (self.dialect.quote_identifier(k.as_ref()).into_owned(), v.into()))
            .unzip();
        self.write = Some(Write::Insert {
            columns,
            rows: vec![row],
            escape,
        });
        self
    }

    /// Sets a multi-row insert.
    pub fn insert_multi<C, R, V>(
        mut self,
        columns: impl IntoIterator<Item = C>,
        rows: impl IntoIterator<Item = R>,
        escape: bool,
    ) -> Self
    where
        C: AsRef<str>,
        R: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let columns = columns
            .into_iter()
            .map(|c| self.dialect.quote_identifier(c.as_ref()).into_owned())
            .collect();
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(Into::into).collect())
            .collect();
        self.write = Some(Write::Insert {
            columns,
            rows,
            escape,
        });
        self
    }

    /// Sets the assignments for an UPDATE. Columns keep the order given.
    pub fn update<K, V>(mut self, values: impl IntoIterator<Item = (K, V)>, escape: bool) -> Self
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        let assignments = values
            .into_iter()
            .map(|(k, v)| (self.dialect.quote_identifier(k.as_ref()).into_owned(), v.into()))
            .collect();
        self.write = Some(Write::Update {
            assignments,
            escape,
        });
        self
    }

    /// Switches to named parameters with the given prefix.
    pub fn set_param_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.predicate.set_param_prefix(prefix);
        self
    }

    /// Requests a dedicated connection for every execution of this query.
    pub fn run_parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    // -------------------------------------------------------------------------
    // Rendering
    // -------------------------------------------------------------------------

    /// The SELECT statement as an unrendered fragment, for embedding in
    /// another query.
    pub fn select_fragment(&self) -> SqlFragment {
        let mut out = SqlFragment::text("SELECT");
        if self.columns.is_empty() {
            out.push_text("*");
        } else {
            out.push_text(self.columns.join(","));
        }

        if let Some(source) = &self.source {
            out.push_text("FROM");
            out.append(source.to_fragment());
        }

        for join in &self.joins {
            out.append(join.to_fragment());
        }

        self.push_where(&mut out);

        if !self.group_by.is_empty() {
            out.push_text("GROUP BY");
            out.push_text(self.group_by.join(","));
        }

        if !self.order_by.is_empty() {
            let terms: Vec<String> = self
                .order_by
                .iter()
                .map(|o| format!("{} {}", o.field, o.direction))
                .collect();
            out.push_text("ORDER BY");
            out.push_text(terms.join(", "));
        }

        if let Some(paging) =
            self.dialect
                .paging_clause(self.limit, self.offset, !self.order_by.is_empty())
        {
            out.push_text(paging);
        }

        out
    }

    pub fn to_select(&self) -> Statement {
        self.select_fragment().render(self.dialect)
    }

    /// Renders the INSERT payload. Dialects that read back the inserted
    /// identity get their trailing clause appended.
    pub fn to_insert(&self) -> Statement {
        let mut out = SqlFragment::text("INSERT INTO");
        self.push_target(&mut out);

        if let Some(Write::Insert {
            columns,
            rows,
            escape,
        }) = &self.write
        {
            out.push_text("(");
            for (i, column) in columns.iter().enumerate() {
                if i > 0 {
                    out.push_text(",");
                }
                out.push_text(column.clone());
            }
            out.push_text(")");
            out.push_text("VALUES");

            let mut names = self.write_naming();
            for (r, row) in rows.iter().enumerate() {
                if r > 0 {
                    out.push_text(",");
                }
                out.push_text("(");
                for (i, value) in row.iter().enumerate() {
                    if i > 0 {
                        out.push_text(",");
                    }
                    push_value(&mut out, value, *escape, &mut names);
                }
                out.push_text(")");
            }
        }

        if let Some(clause) = self.dialect.last_insert_id_clause() {
            out.push_text(clause);
        }
        out.render(self.dialect)
    }

    pub fn to_update(&self) -> Statement {
        let mut out = SqlFragment::text("UPDATE");
        self.push_target(&mut out);
        out.push_text("SET");

        if let Some(Write::Update {
            assignments,
            escape,
        }) = &self.write
        {
            let mut names = self.write_naming();
            for (i, (column, value)) in assignments.iter().enumerate() {
                if i > 0 {
                    out.push_text(",");
                }
                out.push_text(column.clone());
                out.push_text("=");
                push_value(&mut out, value, *escape, &mut names);
            }
        }

        self.push_where(&mut out);
        out.render(self.dialect)
    }

    pub fn to_delete(&self) -> Statement {
        let mut out = SqlFragment::text("DELETE FROM");
        self.push_target(&mut out);
        self.push_where(&mut out);
        out.render(self.dialect)
    }

    fn push_target(&self, out: &mut SqlFragment) {
        if let Some(source) = &self.source {
            out.append(source.to_fragment());
        }
    }

    fn push_where(&self, out: &mut SqlFragment) {
        if !self.predicate.is_empty() {
            out.push_text("WHERE");
            out.append(self.predicate.to_fragment());
        }
    }

    /// Insert and update parameters are named `insert{n}` under named binding.
    fn write_naming(&self) -> ParamNaming {
        if self.dialect.binding() == Binding::Named && self.predicate.naming().is_named() {
            ParamNaming::named("insert")
        } else {
            ParamNaming::default()
        }
    }
}

fn push_value(out: &mut SqlFragment, value: &Value, escape: bool, names: &mut ParamNaming) {
    match value {
        Value::Raw(sql) => out.push_text(sql.clone()),
        value if escape => out.push_param(BoundParam {
            value: value.clone(),
            name: names.next_name(),
        }),
        value => out.push_text(value.to_inline_sql()),
    }
}

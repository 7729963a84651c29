//! JOIN clauses.

use crate::clause::Predicate;
use crate::sql::SqlFragment;

/// The type of JOIN operation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum JoinKind {
    #[default]
    Inner,
    Left,
}

impl JoinKind {
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            JoinKind::Inner => "JOIN",
            JoinKind::Left => "LEFT JOIN",
        }
    }
}

/// A table reference: either a named table or a derived table.
#[derive(Clone, Debug, PartialEq)]
pub enum Source {
    /// A table name, already quoted for the dialect
    Table(String),
    /// `(subquery) alias`
    Subquery { fragment: SqlFragment, alias: String },
}

impl Source {
    pub fn to_fragment(&self) -> SqlFragment {
        match self {
            Source::Table(table) => SqlFragment::text(table.clone()),
            Source::Subquery { fragment, alias } => {
                let mut out = fragment.clone().parens();
                out.push_text(alias.clone());
                out
            }
        }
    }
}

/// One JOIN with its own ON predicate.
#[derive(Clone, Debug, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub source: Source,
    pub on: Predicate,
}

impl Join {
    pub fn new(kind: JoinKind, source: Source, on: Predicate) -> Self {
        Self { kind, source, on }
    }

    /// `JOIN source ON expr`; source parameters precede ON parameters.
    pub fn to_fragment(&self) -> SqlFragment {
        let mut out = SqlFragment::text(self.kind.as_str());
        out.append(self.source.to_fragment());
        out.push_text("ON");
        out.append(self.on.to_fragment());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Postgres;
    use crate::sql::BoundParam;

    #[test]
    fn subquery_join_params_come_first() {
        let mut sub = SqlFragment::text("SELECT id FROM orders WHERE total >");
        sub.push_param(BoundParam::positional(100));

        let mut on = Predicate::new();
        on.on("o.id", "=", crate::Value::raw("u.order_id"), false)
            .on("o.status", "=", "open", true);

        let join = Join::new(
            JoinKind::Left,
            Source::Subquery {
                fragment: sub,
                alias: "o".into(),
            },
            on,
        );
        let stmt = join.to_fragment().render(&Postgres);
        assert_eq!(
            stmt.sql,
            "LEFT JOIN ( SELECT id FROM orders WHERE total > $1 ) o ON o.id = u.order_id AND o.status = $2"
        );
        assert_eq!(stmt.params, [crate::Value::Integer(100), crate::Value::from("open")]);
    }
}

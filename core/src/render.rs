//! Predicate rendering.
//!
//! Turns an ordered clause sequence into a boolean expression fragment. The
//! dialect only affects placeholder syntax, which is applied later when the
//! fragment is rendered into a [`Statement`].

use crate::clause::{Clause, Condition, Connector, Predicate};
use crate::dialect::Dialect;
use crate::sql::{BoundParam, SqlFragment, Statement};
use crate::value::Value;

/// Renders clauses into an expression fragment.
///
/// The pending connector starts as `AND` and stays in force until another
/// connector token replaces it. No connector is emitted before the first
/// condition, or directly after an opening bracket. Unbalanced brackets are
/// reproduced as given.
pub fn render_predicate(clauses: &[Clause]) -> SqlFragment {
    let mut out = SqlFragment::empty();
    let mut pending = Connector::And;
    let mut first = true;
    let mut after_open = false;

    for clause in clauses {
        match clause {
            Clause::Connector(connector) => pending = *connector,
            Clause::Condition(condition) => {
                if !first && !after_open {
                    out.push_text(pending.as_str());
                }
                render_condition(&mut out, condition);
                first = false;
                after_open = false;
            }
            Clause::BracketOpen => {
                if !first && !after_open {
                    out.push_text(pending.as_str());
                }
                out.push_text("(");
                after_open = true;
            }
            Clause::BracketClose => {
                out.push_text(")");
                after_open = false;
            }
        }
    }

    out
}

fn render_condition(out: &mut SqlFragment, condition: &Condition) {
    out.push_text(condition.field.clone());
    out.push_text(condition.comparator.clone());

    match (&condition.value, condition.escape) {
        (Value::Subquery(fragment), _) => {
            out.push_text("(");
            out.append_ref(fragment);
            out.push_text(")");
        }
        (Value::Raw(sql), _) => out.push_text(sql.clone()),
        (Value::List(items), true) => {
            let mut names = condition.param_names.iter().cloned();
            out.push_text("(");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_text(",");
                }
                match item {
                    Value::Raw(sql) => out.push_text(sql.clone()),
                    item => out.push_param(BoundParam {
                        value: item.clone(),
                        name: names.next(),
                    }),
                }
            }
            out.push_text(")");
        }
        (value, true) => out.push_param(BoundParam {
            value: value.clone(),
            name: condition.param_names.first().cloned(),
        }),
        (value, false) => out.push_text(value.to_inline_sql()),
    }
}

impl Predicate {
    /// Renders the predicate as an expression fragment.
    #[inline]
    pub fn to_fragment(&self) -> SqlFragment {
        render_predicate(self.clauses())
    }

    /// Renders the predicate into expression text with its parameters and,
    /// under named binding, their names.
    pub fn render(&self, dialect: &dyn Dialect) -> Statement {
        self.to_fragment().render(dialect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::MySql;

    #[test]
    fn empty_renders_nothing() {
        let stmt = Predicate::new().render(&MySql);
        assert_eq!(stmt.sql, "");
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn trailing_connector_has_no_effect() {
        let mut p = Predicate::new();
        p.where_("a", "=", 1, true).or();
        assert_eq!(p.render(&MySql).sql, "a = ?");
    }

    #[test]
    fn later_connector_wins() {
        let mut p = Predicate::new();
        p.where_("a", "=", 1, true).or().and().where_("b", "=", 2, true);
        assert_eq!(p.render(&MySql).sql, "a = ? AND b = ?");
    }

    #[test]
    fn inline_list() {
        let mut p = Predicate::new();
        p.where_in_list("id", [1, 2, 3], false);
        let stmt = p.render(&MySql);
        assert_eq!(stmt.sql, "id IN (1,2,3)");
        assert!(stmt.params.is_empty());
    }
}

use hedge_core::{MySql, ParamNaming, Postgres, Predicate, Query, SqlServer, Value};

fn bracketed() -> Predicate {
    let mut p = Predicate::new();
    p.where_("active", "=", 1, true)
        .open_bracket()
        .where_("name", "=", "X", true)
        .or()
        .where_("city", "=", "Y", true)
        .close_bracket();
    p
}

#[test]
fn test_bracket_scenario() {
    let stmt = bracketed().render(&MySql);
    assert_eq!(stmt.sql, "active = ? AND ( name = ? OR city = ? )");
    assert_eq!(
        stmt.params,
        vec![Value::Integer(1), Value::from("X"), Value::from("Y")]
    );
}

#[test]
fn test_rendering_is_deterministic() {
    let p = bracketed();
    assert_eq!(p.render(&MySql), p.render(&MySql));
    assert_eq!(p.render(&SqlServer), p.render(&SqlServer));
}

#[test]
fn test_connector_is_sticky() {
    let mut p = Predicate::new();
    p.where_("a", "=", 1, true)
        .or()
        .where_("b", "=", 2, true)
        .where_("c", "=", 3, true);
    assert_eq!(p.render(&MySql).sql, "a = ? OR b = ? OR c = ?");
}

#[test]
fn test_no_connector_directly_after_open_bracket() {
    let mut p = Predicate::new();
    p.where_("x", "=", 0, true)
        .open_bracket()
        .or()
        .where_("a", "=", 1, true)
        .where_("b", "=", 2, true)
        .close_bracket();
    assert_eq!(p.render(&MySql).sql, "x = ? AND ( a = ? OR b = ? )");
}

#[test]
fn test_nested_brackets() {
    let mut p = Predicate::new();
    p.where_("a", "=", 1, true)
        .open_bracket()
        .open_bracket()
        .where_("b", "=", 2, true)
        .close_bracket()
        .or()
        .where_("c", "=", 3, true)
        .close_bracket();
    assert_eq!(p.render(&MySql).sql, "a = ? AND ( ( b = ? ) OR c = ? )");
}

#[test]
fn test_unbalanced_input_is_reproduced() {
    let mut open_only = Predicate::new();
    open_only.open_bracket().where_("a", "=", 1, true);
    assert_eq!(open_only.render(&MySql).sql, "( a = ?");

    let mut close_first = Predicate::new();
    close_first.close_bracket().where_("a", "=", 1, true);
    assert_eq!(close_first.render(&MySql).sql, ") a = ?");
}

#[test]
fn test_null_checks() {
    let mut p = Predicate::new();
    p.where_null("deleted_at").or().where_not_null("archived_at");
    let stmt = p.render(&MySql);
    assert_eq!(stmt.sql, "deleted_at IS NULL OR archived_at IS NOT NULL");
    assert!(stmt.params.is_empty());
}

#[test]
fn test_escaped_null_is_bound() {
    let mut p = Predicate::new();
    p.where_("x", "=", Value::Null, true);
    let stmt = p.render(&MySql);
    assert_eq!(stmt.sql, "x = ?");
    assert_eq!(stmt.params, vec![Value::Null]);
}

#[test]
fn test_inline_values_are_not_bound() {
    let mut p = Predicate::new();
    p.where_("orders.user_id", "=", Value::raw("users.id"), false)
        .where_("orders.total", ">", 10, false);
    let stmt = p.render(&MySql);
    assert_eq!(stmt.sql, "orders.user_id = users.id AND orders.total > 10");
    assert!(stmt.params.is_empty());
}

#[test]
fn test_raw_values_are_never_bound() {
    let mut p = Predicate::with_naming(ParamNaming::named("param"));
    p.where_("orders.user_id", "=", Value::raw("users.id"), true)
        .where_in_list("status", [Value::from("open"), Value::raw("o.default_status")], true)
        .where_("orders.total", ">", 10, true);

    let stmt = p.render(&SqlServer);
    assert_eq!(
        stmt.sql,
        "orders.user_id = users.id AND status IN ( @param1, o.default_status ) AND orders.total > @param2"
    );
    assert_eq!(stmt.params, vec![Value::from("open"), Value::Integer(10)]);
    assert_eq!(stmt.param_names, ["param1", "param2"]);

    let insert = Query::new(&MySql)
        .table("t")
        .insert([("name", Value::from("ann")), ("created", Value::raw("NOW()"))], true)
        .to_insert();
    assert_eq!(insert.sql, "INSERT INTO t ( name, created ) VALUES ( ?, NOW() )");
    assert_eq!(insert.params, vec![Value::from("ann")]);
}

#[test]
fn test_placeholder_styles() {
    let mut positional = Predicate::new();
    positional
        .where_("id", "=", 1, true)
        .where_in_list("x", ["a", "b"], true);
    assert_eq!(
        positional.render(&MySql).sql,
        "id = ? AND x IN ( ?, ? )"
    );
    assert_eq!(
        positional.render(&Postgres).sql,
        "id = $1 AND x IN ( $2, $3 )"
    );

    let mut named = Predicate::with_naming(ParamNaming::named("param"));
    named
        .where_("id", "=", 1, true)
        .where_not_in_list("x", ["a", "b"], true);
    let stmt = named.render(&SqlServer);
    assert_eq!(stmt.sql, "id = @param1 AND x NOT IN ( @param2, @param3 )");
    assert_eq!(stmt.param_names, ["param1", "param2", "param3"]);
    assert_eq!(stmt.params.len(), stmt.param_names.len());
}

#[test]
fn test_params_follow_placeholder_order() {
    let sub = Query::new(&MySql)
        .table("t")
        .cols(["id"])
        .where_("a", "=", 5, true);

    let mut p = Predicate::new();
    p.where_("b", "=", 1, true)
        .where_in_sub("id", &sub.select_fragment())
        .where_("c", "=", 2, true);

    let stmt = p.render(&MySql);
    assert_eq!(
        stmt.sql,
        "b = ? AND id IN ( SELECT id FROM t WHERE a = ? ) AND c = ?"
    );
    assert_eq!(
        stmt.params,
        vec![Value::Integer(1), Value::Integer(5), Value::Integer(2)]
    );
}

#[test]
fn test_naming_is_per_predicate() {
    let mut a = Predicate::with_naming(ParamNaming::named("param"));
    a.where_("x", "=", 1, true);
    let mut b = a.clone();
    b.where_("y", "=", 2, true);
    a.where_("z", "=", 3, true);

    assert_eq!(a.render(&SqlServer).param_names, ["param1", "param2"]);
    assert_eq!(b.render(&SqlServer).param_names, ["param1", "param2"]);
    assert_eq!(a.render(&SqlServer).sql, "x = @param1 AND z = @param2");
}

use marlang::{parse_str, Builtin, Expr};
use pretty_assertions::assert_eq;

#[test]
fn reserved_name_is_a_builtin() {
    let e = parse_str("test.marl", "Natural").unwrap();
    assert_eq!(e, Expr::Builtin(Builtin::Natural));
}

#[test]
fn continued_reserved_name_is_a_variable() {
    let e = parse_str("test.marl", "Naturalism").unwrap();
    assert_eq!(e, Expr::var("Naturalism"));
}

#[test]
fn slashed_builtins_parse_whole() {
    let e = parse_str("test.marl", "Natural/show").unwrap();
    assert_eq!(e, Expr::Builtin(Builtin::NaturalShow));
    let e = parse_str("test.marl", "List/fold").unwrap();
    assert_eq!(e, Expr::Builtin(Builtin::ListFold));
}

#[test]
fn continued_slashed_builtin_is_a_variable() {
    let e = parse_str("test.marl", "Natural/showing").unwrap();
    assert_eq!(e, Expr::var("Natural/showing"));
}

#[test]
fn keyword_prefixed_labels_are_variables() {
    assert_eq!(parse_str("test.marl", "lettuce").unwrap(), Expr::var("lettuce"));
    assert_eq!(parse_str("test.marl", "iffy").unwrap(), Expr::var("iffy"));
    assert_eq!(parse_str("test.marl", "merger").unwrap(), Expr::var("merger"));
}

#[test]
fn true_and_false_are_bool_literals() {
    assert_eq!(parse_str("test.marl", "True").unwrap(), Expr::BoolLit(true));
    assert_eq!(parse_str("test.marl", "False").unwrap(), Expr::BoolLit(false));
}

#[test]
fn universes_are_builtins() {
    assert_eq!(parse_str("test.marl", "Type").unwrap(), Expr::Builtin(Builtin::Type));
    assert_eq!(parse_str("test.marl", "Kind").unwrap(), Expr::Builtin(Builtin::Kind));
    assert_eq!(parse_str("test.marl", "Sort").unwrap(), Expr::Builtin(Builtin::Sort));
}

#[test]
fn de_bruijn_indices() {
    assert_eq!(
        parse_str("test.marl", "x@2").unwrap(),
        Expr::Var { name: "x".to_string(), index: 2 }
    );
    assert_eq!(
        parse_str("test.marl", "x @ 1").unwrap(),
        Expr::Var { name: "x".to_string(), index: 1 }
    );
    assert_eq!(parse_str("test.marl", "x").unwrap(), Expr::var("x"));
}

#[test]
fn underscore_labels() {
    assert_eq!(parse_str("test.marl", "_foo").unwrap(), Expr::var("_foo"));
    assert_eq!(parse_str("test.marl", "_").unwrap(), Expr::var("_"));
}

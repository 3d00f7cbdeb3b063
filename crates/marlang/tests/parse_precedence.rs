use marlang::{parse_str, Expr, OpCode};
use pretty_assertions::assert_eq;

fn var(n: &str) -> Expr {
    Expr::var(n)
}

#[test]
fn and_binds_tighter_than_or() {
    let e = parse_str("test.marl", "a || b && c").unwrap();
    assert_eq!(
        e,
        Expr::op(OpCode::Or, var("a"), Expr::op(OpCode::And, var("b"), var("c")))
    );
}

#[test]
fn times_binds_tighter_than_plus() {
    let e = parse_str("test.marl", "a + b * c").unwrap();
    assert_eq!(
        e,
        Expr::op(OpCode::Plus, var("a"), Expr::op(OpCode::Times, var("b"), var("c")))
    );
}

#[test]
fn not_equal_binds_tighter_than_equal() {
    // the operator ladder runs `==` then `!=`, tightest last
    let e = parse_str("test.marl", "a == b != c").unwrap();
    assert_eq!(
        e,
        Expr::op(OpCode::Equal, var("a"), Expr::op(OpCode::NotEqual, var("b"), var("c")))
    );
}

#[test]
fn operators_fold_left() {
    let e = parse_str("test.marl", "a + b + c").unwrap();
    assert_eq!(
        e,
        Expr::op(OpCode::Plus, Expr::op(OpCode::Plus, var("a"), var("b")), var("c"))
    );
}

#[test]
fn application_binds_tighter_than_operators() {
    let e = parse_str("test.marl", "f x + g y").unwrap();
    assert_eq!(
        e,
        Expr::op(
            OpCode::Plus,
            Expr::app(var("f"), var("x")),
            Expr::app(var("g"), var("y")),
        )
    );
}

#[test]
fn application_folds_left() {
    let e = parse_str("test.marl", "f x y").unwrap();
    assert_eq!(e, Expr::app(Expr::app(var("f"), var("x")), var("y")));
}

#[test]
fn import_alternative_is_loosest() {
    let e = parse_str("test.marl", "a ? b || c").unwrap();
    assert_eq!(
        e,
        Expr::op(OpCode::ImportAlt, var("a"), Expr::op(OpCode::Or, var("b"), var("c")))
    );
}

#[test]
fn selection_binds_tighter_than_application() {
    let e = parse_str("test.marl", "f r.x").unwrap();
    assert_eq!(
        e,
        Expr::app(var("f"), Expr::Field { record: Box::new(var("r")), label: "x".to_string() })
    );
}

#[test]
fn selection_folds_left() {
    let e = parse_str("test.marl", "r.x.y").unwrap();
    assert_eq!(
        e,
        Expr::Field {
            record: Box::new(Expr::Field { record: Box::new(var("r")), label: "x".to_string() }),
            label: "y".to_string(),
        }
    );
}

#[test]
fn text_append_and_list_append() {
    let e = parse_str("test.marl", "a ++ b # c").unwrap();
    assert_eq!(
        e,
        Expr::op(OpCode::TextAppend, var("a"), Expr::op(OpCode::ListAppend, var("b"), var("c")))
    );
}

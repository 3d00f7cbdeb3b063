use marlang::{parse_str, Binding, Builtin, Expr, OpCode};
use pretty_assertions::assert_eq;

#[test]
fn parses_lambda() {
    let e = parse_str("test.marl", "λ(x : Natural) → x").unwrap();
    assert_eq!(
        e,
        Expr::lambda("x", Expr::Builtin(Builtin::Natural), Expr::var("x"))
    );
}

#[test]
fn parses_ascii_lambda() {
    let e = parse_str("test.marl", r"\(x : Natural) -> x").unwrap();
    assert_eq!(
        e,
        Expr::lambda("x", Expr::Builtin(Builtin::Natural), Expr::var("x"))
    );
}

#[test]
fn parses_multi_binding_let() {
    let e = parse_str("test.marl", "let x = 1 let y = 2 in x + y").unwrap();
    assert_eq!(
        e,
        Expr::Let {
            bindings: vec![
                Binding { label: "x".to_string(), annot: None, value: Expr::NaturalLit(1) },
                Binding { label: "y".to_string(), annot: None, value: Expr::NaturalLit(2) },
            ],
            body: Box::new(Expr::op(OpCode::Plus, Expr::var("x"), Expr::var("y"))),
        }
    );
}

#[test]
fn parses_let_with_annotation() {
    let e = parse_str("test.marl", "let x : Natural = 1 in x").unwrap();
    assert_eq!(
        e,
        Expr::Let {
            bindings: vec![Binding {
                label: "x".to_string(),
                annot: Some(Expr::Builtin(Builtin::Natural)),
                value: Expr::NaturalLit(1),
            }],
            body: Box::new(Expr::var("x")),
        }
    );
}

#[test]
fn parses_forall_and_arrow_sugar() {
    let e = parse_str("test.marl", "forall (a : Type) -> a -> a").unwrap();
    assert_eq!(
        e,
        Expr::pi(
            "a",
            Expr::Builtin(Builtin::Type),
            Expr::fn_type(Expr::var("a"), Expr::var("a")),
        )
    );
    let unicode = parse_str("test.marl", "∀(a : Type) → a → a").unwrap();
    assert_eq!(unicode, e);
}

#[test]
fn parses_if_then_else() {
    let e = parse_str("test.marl", "if True then 1 else 2").unwrap();
    assert_eq!(
        e,
        Expr::BoolIf {
            cond: Box::new(Expr::BoolLit(true)),
            then_branch: Box::new(Expr::NaturalLit(1)),
            else_branch: Box::new(Expr::NaturalLit(2)),
        }
    );
}

#[test]
fn parses_annotation() {
    let e = parse_str("test.marl", "3 : Natural").unwrap();
    assert_eq!(
        e,
        Expr::annot(Expr::NaturalLit(3), Expr::Builtin(Builtin::Natural))
    );
}

#[test]
fn tolerates_comments_and_whitespace() {
    let src = "
-- leading comment
{- block {- nested -} comment -}
let x = 1 -- trailing
in x
";
    let e = parse_str("test.marl", src).unwrap();
    assert_eq!(
        e,
        Expr::Let {
            bindings: vec![Binding {
                label: "x".to_string(),
                annot: None,
                value: Expr::NaturalLit(1),
            }],
            body: Box::new(Expr::var("x")),
        }
    );
}

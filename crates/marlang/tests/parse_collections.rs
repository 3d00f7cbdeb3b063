use std::collections::BTreeMap;

use marlang::{parse_str, Builtin, Expr, ParseErrorKind};
use pretty_assertions::assert_eq;

#[test]
fn non_empty_list() {
    let e = parse_str("test.marl", "[1, 2, 3]").unwrap();
    assert_eq!(
        e,
        Expr::NonEmptyList(vec![Expr::NaturalLit(1), Expr::NaturalLit(2), Expr::NaturalLit(3)])
    );
}

#[test]
fn empty_list_requires_annotation() {
    let e = parse_str("test.marl", "[]: List Natural").unwrap();
    assert_eq!(
        e,
        Expr::EmptyList {
            ty: Box::new(Expr::app(
                Expr::Builtin(Builtin::List),
                Expr::Builtin(Builtin::Natural),
            )),
        }
    );
    assert!(parse_str("test.marl", "[]").is_err());
}

#[test]
fn nested_lists() {
    let e = parse_str("test.marl", "[[1], [2]]").unwrap();
    assert_eq!(
        e,
        Expr::NonEmptyList(vec![
            Expr::NonEmptyList(vec![Expr::NaturalLit(1)]),
            Expr::NonEmptyList(vec![Expr::NaturalLit(2)]),
        ])
    );
}

#[test]
fn empty_record_type_and_literal() {
    assert_eq!(parse_str("test.marl", "{}").unwrap(), Expr::Record(BTreeMap::new()));
    assert_eq!(parse_str("test.marl", "{=}").unwrap(), Expr::RecordLit(BTreeMap::new()));
}

#[test]
fn record_literal() {
    let e = parse_str("test.marl", r#"{ a = 1, b = "x" }"#).unwrap();
    let mut fields = BTreeMap::new();
    fields.insert("a".to_string(), Expr::NaturalLit(1));
    fields.insert("b".to_string(), Expr::text("x"));
    assert_eq!(e, Expr::RecordLit(fields));
}

#[test]
fn record_type() {
    let e = parse_str("test.marl", "{ a : Natural, b : Text }").unwrap();
    let mut fields = BTreeMap::new();
    fields.insert("a".to_string(), Expr::Builtin(Builtin::Natural));
    fields.insert("b".to_string(), Expr::Builtin(Builtin::Text));
    assert_eq!(e, Expr::Record(fields));
}

#[test]
fn duplicate_record_field_is_rejected() {
    let errs = parse_str("test.marl", "{ a = 1, a = 2 }").unwrap_err();
    assert!(errs.iter().any(|e| e.kind == ParseErrorKind::DuplicateField), "{errs}");
}

#[test]
fn union_types() {
    let e = parse_str("test.marl", "< A : Natural | B | C : Text >").unwrap();
    let mut alts = BTreeMap::new();
    alts.insert("A".to_string(), Some(Expr::Builtin(Builtin::Natural)));
    alts.insert("B".to_string(), None);
    alts.insert("C".to_string(), Some(Expr::Builtin(Builtin::Text)));
    assert_eq!(e, Expr::UnionType(alts));

    assert_eq!(parse_str("test.marl", "<>").unwrap(), Expr::UnionType(BTreeMap::new()));
}

#[test]
fn duplicate_union_label_is_rejected() {
    let errs = parse_str("test.marl", "< A | A : Natural >").unwrap_err();
    assert!(errs.iter().any(|e| e.kind == ParseErrorKind::DuplicateField), "{errs}");
}

#[test]
fn merge_forms() {
    let e = parse_str("test.marl", "merge h u").unwrap();
    assert_eq!(
        e,
        Expr::Merge {
            handler: Box::new(Expr::var("h")),
            union: Box::new(Expr::var("u")),
            annot: None,
        }
    );

    let e = parse_str("test.marl", "merge h u : Bool").unwrap();
    assert_eq!(
        e,
        Expr::Merge {
            handler: Box::new(Expr::var("h")),
            union: Box::new(Expr::var("u")),
            annot: Some(Box::new(Expr::Builtin(Builtin::Bool))),
        }
    );
}

#[test]
fn merge_application_takes_more_arguments() {
    let e = parse_str("test.marl", "merge h u x").unwrap();
    assert_eq!(
        e,
        Expr::app(
            Expr::Merge {
                handler: Box::new(Expr::var("h")),
                union: Box::new(Expr::var("u")),
                annot: None,
            },
            Expr::var("x"),
        )
    );
}

#[test]
fn some_binds_one_argument() {
    let e = parse_str("test.marl", "Some 5").unwrap();
    assert_eq!(e, Expr::Some(Box::new(Expr::NaturalLit(5))));

    let e = parse_str("test.marl", "None Natural").unwrap();
    assert_eq!(
        e,
        Expr::app(Expr::Builtin(Builtin::None), Expr::Builtin(Builtin::Natural))
    );
}

#[test]
fn field_selection_of_record_literal() {
    let e = parse_str("test.marl", "{ a = 1 }.a").unwrap();
    let mut fields = BTreeMap::new();
    fields.insert("a".to_string(), Expr::NaturalLit(1));
    assert_eq!(
        e,
        Expr::Field { record: Box::new(Expr::RecordLit(fields)), label: "a".to_string() }
    );
}

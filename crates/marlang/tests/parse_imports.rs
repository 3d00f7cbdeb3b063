use marlang::{parse_str, Expr, Fetchable, Import, ImportMode, LocalKind, OpCode};
use pretty_assertions::assert_eq;

fn import(target: Fetchable, mode: ImportMode) -> Expr {
    Expr::Import(Import::new(target, mode))
}

#[test]
fn env_import_defaults_to_code() {
    let e = parse_str("test.marl", "env:FOO").unwrap();
    assert_eq!(e, import(Fetchable::env("FOO"), ImportMode::Code));
}

#[test]
fn as_text_forces_raw_mode() {
    let e = parse_str("test.marl", "env:FOO as Text").unwrap();
    assert_eq!(e, import(Fetchable::env("FOO"), ImportMode::RawText));
}

#[test]
fn posix_quoted_env_names() {
    let e = parse_str("test.marl", r#"env:"A B""#).unwrap();
    assert_eq!(e, import(Fetchable::env("A B"), ImportMode::Code));

    let e = parse_str("test.marl", r#"env:"tab\there""#).unwrap();
    assert_eq!(e, import(Fetchable::env("tab\there"), ImportMode::Code));
}

#[test]
fn local_path_kinds() {
    let e = parse_str("test.marl", "./foo/bar").unwrap();
    assert_eq!(
        e,
        import(
            Fetchable::Local { kind: LocalKind::Here, path: "foo/bar".to_string() },
            ImportMode::Code,
        )
    );

    let e = parse_str("test.marl", "../up/x").unwrap();
    assert_eq!(
        e,
        import(
            Fetchable::Local { kind: LocalKind::Parent, path: "up/x".to_string() },
            ImportMode::Code,
        )
    );

    let e = parse_str("test.marl", "~/cfg/base").unwrap();
    assert_eq!(
        e,
        import(
            Fetchable::Local { kind: LocalKind::Home, path: "cfg/base".to_string() },
            ImportMode::Code,
        )
    );

    let e = parse_str("test.marl", "/etc/settings").unwrap();
    assert_eq!(
        e,
        import(
            Fetchable::Local { kind: LocalKind::Absolute, path: "etc/settings".to_string() },
            ImportMode::Code,
        )
    );
}

#[test]
fn remote_imports() {
    let e = parse_str("test.marl", "https://example.com/pkg/prelude").unwrap();
    assert_eq!(e, import(Fetchable::remote("https://example.com/pkg/prelude"), ImportMode::Code));

    let e = parse_str("test.marl", "http://example.com:8080/a/b?x=1").unwrap();
    assert_eq!(
        e,
        import(Fetchable::remote("http://example.com:8080/a/b?x=1"), ImportMode::Code)
    );

    let e = parse_str("test.marl", "http://user:pw@example.com/x").unwrap();
    assert_eq!(e, import(Fetchable::remote("http://user:pw@example.com/x"), ImportMode::Code));
}

#[test]
fn ipv6_hosts_must_be_well_formed() {
    let e = parse_str("test.marl", "http://[2001:db8::1]/x").unwrap();
    assert_eq!(e, import(Fetchable::remote("http://[2001:db8::1]/x"), ImportMode::Code));

    assert!(parse_str("test.marl", "http://[2001:zz8::1]/x").is_err());
}

#[test]
fn integrity_digest() {
    let hex = "a".repeat(64);
    let src = format!("./pkg/a.marl sha256:{hex}");
    let e = parse_str("test.marl", &src).unwrap();
    assert_eq!(
        e,
        Expr::Import(
            Import::new(
                Fetchable::Local { kind: LocalKind::Here, path: "pkg/a.marl".to_string() },
                ImportMode::Code,
            )
            .with_digest(hex),
        )
    );
}

#[test]
fn digest_hex_is_lowercased() {
    let src = format!("env:FOO sha256:{}", "AB".repeat(32));
    let e = parse_str("test.marl", &src).unwrap();
    assert_eq!(
        e,
        Expr::Import(Import::new(Fetchable::env("FOO"), ImportMode::Code).with_digest("ab".repeat(32)))
    );
}

#[test]
fn missing_sentinel() {
    let e = parse_str("test.marl", "missing").unwrap();
    assert_eq!(e, import(Fetchable::Missing, ImportMode::Code));
}

#[test]
fn import_alternative_over_imports() {
    let e = parse_str("test.marl", "missing ? 5").unwrap();
    assert_eq!(
        e,
        Expr::op(
            OpCode::ImportAlt,
            import(Fetchable::Missing, ImportMode::Code),
            Expr::NaturalLit(5),
        )
    );
}

#[test]
fn imports_participate_in_application() {
    let e = parse_str("test.marl", "./f.marl 3").unwrap();
    assert_eq!(
        e,
        Expr::app(
            import(
                Fetchable::Local { kind: LocalKind::Here, path: "f.marl".to_string() },
                ImportMode::Code,
            ),
            Expr::NaturalLit(3),
        )
    );
}

//! Canonical text rendering of expressions.
//!
//! The output is deterministic (record and union fields in key order,
//! Unicode sigils, minimal parentheses by precedence level) and parses back
//! to the same tree, which makes it usable both as the serialisation that
//! integrity digests are computed over and as a round-trip oracle in tests.

use crate::ast::{Builtin, Expr, Import, ImportMode, TextLit};

pub fn canonical_string(e: &Expr) -> String {
    print_expr(e)
}

pub fn canonical_bytes(e: &Expr) -> Vec<u8> {
    canonical_string(e).into_bytes()
}

fn print_expr(e: &Expr) -> String {
    match e {
        Expr::Lambda { label, ty, body } => {
            format!("λ({} : {}) → {}", label, print_expr(ty), print_expr(body))
        }
        Expr::Pi { label, ty, body } if label == "_" => {
            format!("{} → {}", print_operator(ty), print_expr(body))
        }
        Expr::Pi { label, ty, body } => {
            format!("∀({} : {}) → {}", label, print_expr(ty), print_expr(body))
        }
        Expr::Let { bindings, body } => {
            let mut out = String::new();
            for b in bindings {
                out.push_str("let ");
                out.push_str(&b.label);
                if let Some(a) = &b.annot {
                    out.push_str(" : ");
                    out.push_str(&print_expr(a));
                }
                out.push_str(" = ");
                out.push_str(&print_expr(&b.value));
                out.push(' ');
            }
            out.push_str("in ");
            out.push_str(&print_expr(body));
            out
        }
        Expr::BoolIf { cond, then_branch, else_branch } => format!(
            "if {} then {} else {}",
            print_expr(cond),
            print_expr(then_branch),
            print_expr(else_branch)
        ),
        Expr::Merge { handler, union, annot: Some(a) } => format!(
            "merge {} {} : {}",
            print_selector(handler),
            print_selector(union),
            print_application(a)
        ),
        Expr::Annot { expr, ty } => {
            format!("{} : {}", print_operator(expr), print_expr(ty))
        }
        Expr::EmptyList { ty } => match ty.as_ref() {
            Expr::App { func, arg } if **func == Expr::Builtin(Builtin::List) => {
                format!("[] : List {}", print_selector(arg))
            }
            other => format!("[] : {}", print_application(other)),
        },
        _ => print_operator(e),
    }
}

fn print_operator(e: &Expr) -> String {
    match e {
        Expr::Op { op, lhs, rhs } => {
            format!("({} {} {})", print_expr(lhs), op.symbol(), print_expr(rhs))
        }
        _ => print_application(e),
    }
}

fn print_application(e: &Expr) -> String {
    match e {
        Expr::App { func, arg } => {
            format!("{} {}", print_application(func), print_selector(arg))
        }
        Expr::Merge { handler, union, annot: None } => {
            format!("merge {} {}", print_selector(handler), print_selector(union))
        }
        Expr::Some(inner) => format!("Some {}", print_selector(inner)),
        _ => print_selector(e),
    }
}

fn print_selector(e: &Expr) -> String {
    match e {
        Expr::Field { record, label } => format!("{}.{}", print_selector(record), label),
        Expr::Import(i) => print_import(i),
        _ => print_primitive(e),
    }
}

fn print_primitive(e: &Expr) -> String {
    match e {
        // operator nodes already render parenthesized
        Expr::Op { .. } => print_operator(e),
        Expr::Var { name, index: 0 } => name.clone(),
        Expr::Var { name, index } => format!("{name}@{index}"),
        Expr::Builtin(b) => b.name().to_string(),
        Expr::BoolLit(true) => "True".to_string(),
        Expr::BoolLit(false) => "False".to_string(),
        Expr::NaturalLit(n) => n.to_string(),
        Expr::IntegerLit(n) => format!("{n:+}"),
        Expr::DoubleLit(d) => print_double(*d),
        Expr::TextLit(t) => print_text(t),
        Expr::NonEmptyList(items) => {
            let inner: Vec<String> = items.iter().map(print_expr).collect();
            format!("[{}]", inner.join(", "))
        }
        Expr::Record(fields) if fields.is_empty() => "{}".to_string(),
        Expr::Record(fields) => {
            let inner: Vec<String> =
                fields.iter().map(|(k, v)| format!("{k} : {}", print_expr(v))).collect();
            format!("{{ {} }}", inner.join(", "))
        }
        Expr::RecordLit(fields) if fields.is_empty() => "{=}".to_string(),
        Expr::RecordLit(fields) => {
            let inner: Vec<String> =
                fields.iter().map(|(k, v)| format!("{k} = {}", print_expr(v))).collect();
            format!("{{ {} }}", inner.join(", "))
        }
        Expr::UnionType(alts) if alts.is_empty() => "<>".to_string(),
        Expr::UnionType(alts) => {
            let inner: Vec<String> = alts
                .iter()
                .map(|(k, t)| match t {
                    Some(ty) => format!("{k} : {}", print_expr(ty)),
                    None => k.clone(),
                })
                .collect();
            format!("< {} >", inner.join(" | "))
        }
        other => format!("({})", print_expr(other)),
    }
}

fn print_import(i: &Import) -> String {
    let mut out = i.hashed.target.to_string();
    if let Some(digest) = &i.hashed.digest {
        out.push_str(" sha256:");
        out.push_str(digest);
    }
    if i.mode == ImportMode::RawText {
        out.push_str(" as Text");
    }
    out
}

fn print_double(d: f64) -> String {
    if d.is_nan() {
        "NaN".to_string()
    } else if d == f64::INFINITY {
        "Infinity".to_string()
    } else if d == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        format!("{d:?}")
    }
}

fn print_text(t: &TextLit) -> String {
    let mut out = String::from("\"");
    for chunk in &t.chunks {
        escape_into(&chunk.prefix, &mut out);
        out.push_str("${");
        out.push_str(&print_expr(&chunk.expr));
        out.push('}');
    }
    escape_into(&t.suffix, &mut out);
    out.push('"');
    out
}

fn escape_into(s: &str, out: &mut String) {
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '$' => out.push_str("\\$"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
}

//! The Marl surface grammar and its semantic actions.
//!
//! Rule layering, loosest to tightest: Expression (binders, `if`, `let`,
//! annotated merge, arrow sugar), the operator chain (`?` `||` `+` `++` `#`
//! `&&` `*` `==` `!=`), application, import/selector, primitive. Whitespace
//! is explicit; `_` and `_1` cover spaces, line comments and nestable block
//! comments.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;

use crate::ast::{
    Binding, Builtin, Chunk, Expr, Fetchable, Import, ImportHashed, ImportMode, LocalKind, OpCode,
    TextLit,
};
use crate::peg::{
    act, alt, and, any, class, lab, lit, lit_i, not, opt, plus, r, rule, seq, star, ActionError,
    Capture, Grammar, Pat, Value,
};

static GRAMMAR: Lazy<Grammar> = Lazy::new(build);

pub fn grammar() -> &'static Grammar {
    &GRAMMAR
}

/// Reserved names, longest first so ordered choice never truncates a match.
const RESERVED: [&str; 33] = [
    "Natural/build",
    "Natural/fold",
    "Natural/isZero",
    "Natural/even",
    "Natural/odd",
    "Natural/toInteger",
    "Natural/show",
    "Integer/toDouble",
    "Integer/show",
    "Double/show",
    "List/build",
    "List/fold",
    "List/length",
    "List/head",
    "List/last",
    "List/indexed",
    "List/reverse",
    "Optional/build",
    "Optional/fold",
    "Text/show",
    "Bool",
    "True",
    "False",
    "Optional",
    "Natural",
    "Integer",
    "Double",
    "Text",
    "List",
    "None",
    "Type",
    "Kind",
    "Sort",
];

fn nth(v: Value, i: usize) -> Result<Value, ActionError> {
    let mut parts = v.into_list()?;
    if i >= parts.len() {
        return Err(ActionError::msg("malformed capture sequence"));
    }
    Ok(parts.swap_remove(i))
}

fn expr(e: Expr) -> Result<Value, ActionError> {
    Ok(Value::Expr(e))
}

/// Fold a flat `first (… op …)*` chain into left-leaning operator nodes.
/// Each rest item is a four-part sequence whose last element is the operand.
fn fold_operator(op: OpCode, c: &Capture<'_>) -> Result<Value, ActionError> {
    let mut out = c.get("first").into_expr()?;
    for item in c.get("rest").into_list()? {
        let rhs = nth(item, 3)?.into_expr()?;
        out = Expr::op(op, out, rhs);
    }
    expr(out)
}

/// Concatenate interleaved text and interpolation captures into a literal.
fn collect_text(items: Vec<Value>) -> Result<TextLit, ActionError> {
    let mut out = TextLit::default();
    let mut run = String::new();
    for item in items {
        match item {
            Value::Str(s) => run.push_str(&s),
            Value::Bytes(b) => run.push_str(&String::from_utf8_lossy(&b)),
            Value::Expr(e) => out.chunks.push(Chunk { prefix: std::mem::take(&mut run), expr: e }),
            _ => return Err(ActionError::msg("malformed text chunk")),
        }
    }
    out.suffix = run;
    Ok(out)
}

fn build_record(c: &Capture<'_>, literal: bool) -> Result<Value, ActionError> {
    let (label, value) = c.get("first").into_field()?;
    let mut fields = BTreeMap::new();
    fields.insert(label, value);
    for item in c.get("rest").into_list()? {
        let (label, value) = item.into_field()?;
        if fields.contains_key(&label) {
            return Err(ActionError::duplicate_field(&label));
        }
        fields.insert(label, value);
    }
    expr(if literal { Expr::RecordLit(fields) } else { Expr::Record(fields) })
}

fn operator_chain(
    name: &'static str,
    operand: &'static str,
    op_lit: &'static str,
    trailing_ws: &'static str,
    op: OpCode,
) -> crate::peg::Rule {
    rule(
        name,
        act(
            seq(vec![
                lab("first", r(operand)),
                lab(
                    "rest",
                    star(seq(vec![r("_"), lit(op_lit), r(trailing_ws), r(operand)])),
                ),
            ]),
            move |c| fold_operator(op, c),
        ),
    )
}

fn build() -> Grammar {
    let mut g = Vec::new();

    // entry
    g.push(rule(
        "SourceFile",
        act(seq(vec![lab("e", r("CompleteExpression")), r("EOF")]), |c| Ok(c.get("e"))),
    ));
    g.push(rule(
        "CompleteExpression",
        act(seq(vec![r("_"), lab("e", r("Expression")), r("_")]), |c| Ok(c.get("e"))),
    ));
    g.push(rule("EOF", not(any())));

    // whitespace and comments
    g.push(rule("EOL", alt(vec![lit("\n"), lit("\r\n")])));
    g.push(rule("NotEOL", class(&['\t'], &[(' ', '\u{10FFFF}')])));
    g.push(rule(
        "LineComment",
        seq(vec![lit("--"), star(r("NotEOL")), r("EOL")]),
    ));
    g.push(rule("BlockComment", seq(vec![lit("{-"), r("BlockCommentContinue")])));
    g.push(rule(
        "BlockCommentChunk",
        alt(vec![r("BlockComment"), r("EOL"), class(&['\t'], &[(' ', '\u{10FFFF}')])]),
    ));
    g.push(rule(
        "BlockCommentContinue",
        alt(vec![lit("-}"), seq(vec![r("BlockCommentChunk"), r("BlockCommentContinue")])]),
    ));
    g.push(rule(
        "WhitespaceChunk",
        alt(vec![lit(" "), lit("\t"), r("EOL"), r("LineComment"), r("BlockComment")]),
    ));
    g.push(rule("_", star(r("WhitespaceChunk"))));
    g.push(rule("_1", plus(r("WhitespaceChunk"))));

    // digits
    g.push(rule("Digit", class(&[], &[('0', '9')])));
    g.push(rule("HexDig", alt(vec![r("Digit"), class(&[], &[('a', 'f'), ('A', 'F')])])));

    // labels
    g.push(rule("SimpleLabelFirstChar", class(&['_'], &[('A', 'Z'), ('a', 'z')])));
    g.push(rule(
        "SimpleLabelNextChar",
        class(&['_', '/', '-'], &[('A', 'Z'), ('a', 'z'), ('0', '9')]),
    ));
    g.push(rule(
        "SimpleLabel",
        alt(vec![
            act(seq(vec![r("Keyword"), plus(r("SimpleLabelNextChar"))]), |c| {
                Ok(Value::Str(c.text.clone()))
            }),
            act(
                seq(vec![
                    not(r("Keyword")),
                    r("SimpleLabelFirstChar"),
                    star(r("SimpleLabelNextChar")),
                ]),
                |c| Ok(Value::Str(c.text.clone())),
            ),
        ]),
    ));
    g.push(rule("Label", act(lab("label", r("SimpleLabel")), |c| Ok(c.get("label")))));
    g.push(rule(
        "NonreservedLabel",
        alt(vec![
            act(
                seq(vec![
                    and(seq(vec![r("Reserved"), r("SimpleLabelNextChar")])),
                    lab("label", r("Label")),
                ]),
                |c| Ok(c.get("label")),
            ),
            act(seq(vec![not(r("Reserved")), lab("label", r("Label"))]), |c| Ok(c.get("label"))),
        ]),
    ));
    g.push(rule("AnyLabel", r("Label")));

    // keywords and sigils
    g.push(rule("If", lit("if")));
    g.push(rule("Then", lit("then")));
    g.push(rule("Else", lit("else")));
    g.push(rule("Let", lit("let")));
    g.push(rule("In", lit("in")));
    g.push(rule("As", lit("as")));
    g.push(rule("Using", lit("using")));
    g.push(rule("Merge", lit("merge")));
    g.push(rule("Missing", act(lit("missing"), |_| Ok(Value::Fetch(Fetchable::Missing)))));
    g.push(rule("True", lit("True")));
    g.push(rule("False", lit("False")));
    g.push(rule("Infinity", lit("Infinity")));
    g.push(rule("NaN", lit("NaN")));
    g.push(rule("Some", lit("Some")));
    g.push(rule("Text", lit("Text")));
    g.push(rule("List", lit("List")));
    g.push(rule(
        "Keyword",
        alt(vec![
            r("If"),
            r("Then"),
            r("Else"),
            r("Let"),
            r("In"),
            r("Using"),
            r("Missing"),
            r("As"),
            r("True"),
            r("False"),
            r("Infinity"),
            r("NaN"),
            r("Merge"),
            r("Some"),
        ]),
    ));
    g.push(rule("Lambda", alt(vec![lit("λ"), lit("\\")])));
    g.push(rule("Forall", alt(vec![lit("∀"), lit("forall")])));
    g.push(rule("Arrow", alt(vec![lit("→"), lit("->")])));

    g.push(rule(
        "Reserved",
        act(alt(RESERVED.iter().copied().map(lit).collect()), |c| {
            match c.text.as_str() {
                "True" => expr(Expr::BoolLit(true)),
                "False" => expr(Expr::BoolLit(false)),
                name => match Builtin::from_name(name) {
                    Some(b) => expr(Expr::Builtin(b)),
                    None => Err(ActionError::msg(format!("unknown reserved name {name}"))),
                },
            }
        }),
    ));

    // numeric literals
    g.push(rule(
        "Exponent",
        seq(vec![lit_i("e"), opt(class(&['+', '-'], &[])), plus(r("Digit"))]),
    ));
    g.push(rule(
        "NumericDoubleLiteral",
        act(
            seq(vec![
                opt(class(&['+', '-'], &[])),
                plus(r("Digit")),
                alt(vec![
                    seq(vec![lit("."), plus(r("Digit")), opt(r("Exponent"))]),
                    r("Exponent"),
                ]),
            ]),
            |c| match c.text.parse::<f64>() {
                Ok(d) => expr(Expr::DoubleLit(d)),
                Err(e) => Err(ActionError::msg(format!("invalid double literal: {e}"))),
            },
        ),
    ));
    g.push(rule(
        "DoubleLiteral",
        alt(vec![
            r("NumericDoubleLiteral"),
            act(r("Infinity"), |_| expr(Expr::DoubleLit(f64::INFINITY))),
            act(seq(vec![lit("-"), r("Infinity")]), |_| expr(Expr::DoubleLit(f64::NEG_INFINITY))),
            act(r("NaN"), |_| expr(Expr::DoubleLit(f64::NAN))),
        ]),
    ));
    g.push(rule(
        "NaturalLiteral",
        act(plus(r("Digit")), |c| match c.text.parse::<u64>() {
            Ok(n) => expr(Expr::NaturalLit(n)),
            Err(e) => Err(ActionError::msg(format!("invalid natural literal: {e}"))),
        }),
    ));
    g.push(rule(
        "IntegerLiteral",
        act(seq(vec![class(&['+', '-'], &[]), r("NaturalLiteral")]), |c| {
            match c.text.parse::<i64>() {
                Ok(n) => expr(Expr::IntegerLit(n)),
                Err(e) => Err(ActionError::msg(format!("invalid integer literal: {e}"))),
            }
        }),
    ));

    // variables
    g.push(rule(
        "DeBruijn",
        act(
            seq(vec![r("_"), lit("@"), r("_"), lab("index", r("NaturalLiteral"))]),
            |c| match c.get("index").into_expr()? {
                Expr::NaturalLit(n) => Ok(Value::Nat(n)),
                _ => Err(ActionError::msg("malformed de Bruijn index")),
            },
        ),
    ));
    g.push(rule(
        "Variable",
        act(
            seq(vec![lab("name", r("NonreservedLabel")), lab("index", opt(r("DeBruijn")))]),
            |c| {
                let name = c.get("name").into_str()?;
                let index = match c.get("index").opt() {
                    Some(v) => v.into_nat()? as usize,
                    None => 0,
                };
                expr(Expr::Var { name, index })
            },
        ),
    ));
    g.push(rule("Identifier", alt(vec![r("Variable"), r("Reserved")])));

    // text literals
    g.push(rule(
        "Interpolation",
        act(seq(vec![lit("${"), lab("e", r("CompleteExpression")), lit("}")]), |c| {
            Ok(c.get("e"))
        }),
    ));
    g.push(rule(
        "DoubleQuoteEscaped",
        alt(vec![
            lit("\""),
            lit("$"),
            lit("\\"),
            lit("/"),
            act(lit("b"), |_| Ok(Value::Str("\u{8}".to_string()))),
            act(lit("f"), |_| Ok(Value::Str("\u{c}".to_string()))),
            act(lit("n"), |_| Ok(Value::Str("\n".to_string()))),
            act(lit("r"), |_| Ok(Value::Str("\r".to_string()))),
            act(lit("t"), |_| Ok(Value::Str("\t".to_string()))),
            act(
                seq(vec![lit("u"), r("HexDig"), r("HexDig"), r("HexDig"), r("HexDig")]),
                |c| {
                    let code = u32::from_str_radix(&c.text[1..], 16)
                        .map_err(|e| ActionError::msg(format!("invalid unicode escape: {e}")))?;
                    match char::from_u32(code) {
                        Some(ch) => Ok(Value::Str(ch.to_string())),
                        None => Err(ActionError::msg("invalid unicode scalar value")),
                    }
                },
            ),
        ]),
    ));
    g.push(rule(
        "DoubleQuoteChar",
        class(&[], &[('\u{20}', '\u{21}'), ('\u{23}', '['), (']', '\u{10FFFF}')]),
    ));
    g.push(rule(
        "DoubleQuoteChunk",
        alt(vec![
            r("Interpolation"),
            act(seq(vec![lit("\\"), lab("e", r("DoubleQuoteEscaped"))]), |c| Ok(c.get("e"))),
            r("DoubleQuoteChar"),
        ]),
    ));
    g.push(rule(
        "DoubleQuoteLiteral",
        act(
            seq(vec![lit("\""), lab("chunks", star(r("DoubleQuoteChunk"))), lit("\"")]),
            |c| {
                let t = collect_text(c.get("chunks").into_list()?)?;
                expr(Expr::TextLit(t))
            },
        ),
    ));
    g.push(rule("EscapedQuotePair", act(lit("'''"), |_| Ok(Value::Str("''".to_string())))));
    g.push(rule("EscapedInterpolation", act(lit("''${"), |_| Ok(Value::Str("${".to_string())))));
    g.push(rule(
        "SingleQuoteChar",
        alt(vec![class(&['\t'], &[(' ', '\u{10FFFF}')]), r("EOL")]),
    ));
    g.push(rule(
        "SingleQuoteContinue",
        alt(vec![
            seq(vec![r("Interpolation"), r("SingleQuoteContinue")]),
            seq(vec![r("EscapedQuotePair"), r("SingleQuoteContinue")]),
            seq(vec![r("EscapedInterpolation"), r("SingleQuoteContinue")]),
            lit("''"),
            seq(vec![r("SingleQuoteChar"), r("SingleQuoteContinue")]),
        ]),
    ));
    g.push(rule(
        "SingleQuoteLiteral",
        act(
            seq(vec![lit("''"), r("EOL"), lab("content", r("SingleQuoteContinue"))]),
            |c| {
                // content is a right-nested chain of [chunk, rest] pairs
                // terminated by the closing quote token
                let mut items = Vec::new();
                let mut v = c.get("content");
                loop {
                    let pair = match v {
                        Value::List(p) => p,
                        _ => break,
                    };
                    match <[Value; 2]>::try_from(pair) {
                        Ok([head, rest]) => {
                            items.push(head);
                            v = rest;
                        }
                        Err(_) => break,
                    }
                }
                let t = collect_text(items)?;
                expr(Expr::TextLit(t.strip_common_indent()))
            },
        ),
    ));
    g.push(rule("TextLiteral", alt(vec![r("DoubleQuoteLiteral"), r("SingleQuoteLiteral")])));

    // local import paths
    g.push(rule(
        "PathCharacter",
        class(
            &['!', '*', '+', '-', '.', '=', '|', '~'],
            &[('$', '\''), ('0', ';'), ('@', 'Z'), ('^', 'z')],
        ),
    ));
    g.push(rule(
        "UnquotedPathComponent",
        act(plus(r("PathCharacter")), |c| Ok(Value::Str(c.text.clone()))),
    ));
    g.push(rule(
        "PathComponent",
        act(seq(vec![lit("/"), lab("u", r("UnquotedPathComponent"))]), |c| Ok(c.get("u"))),
    ));
    g.push(rule(
        "Path",
        act(lab("cs", plus(r("PathComponent"))), |c| {
            let mut parts = Vec::new();
            for v in c.get("cs").into_list()? {
                parts.push(v.into_str()?);
            }
            Ok(Value::Str(parts.join("/")))
        }),
    ));
    g.push(rule(
        "ParentPath",
        act(seq(vec![lit(".."), lab("p", r("Path"))]), |c| {
            Ok(Value::Fetch(Fetchable::Local { kind: LocalKind::Parent, path: c.get("p").into_str()? }))
        }),
    ));
    g.push(rule(
        "HerePath",
        act(seq(vec![lit("."), lab("p", r("Path"))]), |c| {
            Ok(Value::Fetch(Fetchable::Local { kind: LocalKind::Here, path: c.get("p").into_str()? }))
        }),
    ));
    g.push(rule(
        "HomePath",
        act(seq(vec![lit("~"), lab("p", r("Path"))]), |c| {
            Ok(Value::Fetch(Fetchable::Local { kind: LocalKind::Home, path: c.get("p").into_str()? }))
        }),
    ));
    g.push(rule(
        "AbsolutePath",
        act(lab("p", r("Path")), |c| {
            Ok(Value::Fetch(Fetchable::Local {
                kind: LocalKind::Absolute,
                path: c.get("p").into_str()?,
            }))
        }),
    ));
    g.push(rule(
        "Local",
        alt(vec![r("ParentPath"), r("HerePath"), r("HomePath"), r("AbsolutePath")]),
    ));

    // remote imports, RFC 3986 subset
    g.push(rule("Scheme", seq(vec![lit("http"), opt(lit("s"))])));
    g.push(rule(
        "HttpRaw",
        act(
            seq(vec![
                r("Scheme"),
                lit("://"),
                r("Authority"),
                r("Path"),
                opt(seq(vec![lit("?"), r("Query")])),
            ]),
            |c| match url::Url::parse(&c.text) {
                Ok(u) => Ok(Value::Fetch(Fetchable::Remote(u))),
                Err(e) => Err(ActionError::msg(format!("invalid URL: {e}"))),
            },
        ),
    ));
    g.push(rule(
        "Authority",
        seq(vec![
            opt(seq(vec![r("Userinfo"), lit("@")])),
            r("Host"),
            opt(seq(vec![lit(":"), r("Port")])),
        ]),
    ));
    g.push(rule(
        "Userinfo",
        star(alt(vec![r("Unreserved"), r("PctEncoded"), r("SubDelims"), lit(":")])),
    ));
    g.push(rule("Host", alt(vec![r("IPLiteral"), r("RegName")])));
    g.push(rule("Port", star(r("Digit"))));
    g.push(rule("IPLiteral", seq(vec![lit("["), r("IPv6address"), lit("]")])));
    g.push(rule(
        "IPv6address",
        act(
            plus(class(&[':', '.'], &[('0', '9'), ('a', 'f'), ('A', 'F')])),
            |c| match c.text.parse::<std::net::Ipv6Addr>() {
                Ok(_) => Ok(Value::Str(c.text.clone())),
                Err(_) => Err(ActionError::msg("malformed IPv6 address")),
            },
        ),
    ));
    g.push(rule(
        "RegName",
        star(alt(vec![r("Unreserved"), r("PctEncoded"), r("SubDelims")])),
    ));
    g.push(rule(
        "PChar",
        alt(vec![r("Unreserved"), r("PctEncoded"), r("SubDelims"), class(&[':', '@'], &[])]),
    ));
    g.push(rule("Query", star(alt(vec![r("PChar"), class(&['/', '?'], &[])]))));
    g.push(rule("PctEncoded", seq(vec![lit("%"), r("HexDig"), r("HexDig")])));
    g.push(rule(
        "Unreserved",
        class(&['-', '.', '_', '~'], &[('A', 'Z'), ('a', 'z'), ('0', '9')]),
    ));
    g.push(rule(
        "SubDelims",
        class(&['!', '$', '&', '\'', '(', ')', '*', '+', ',', ';', '='], &[]),
    ));
    g.push(rule("Http", act(lab("u", r("HttpRaw")), |c| Ok(c.get("u")))));

    // environment imports
    g.push(rule(
        "Env",
        act(
            seq(vec![
                lit("env:"),
                lab("v", alt(vec![r("BashEnvironmentVariable"), r("PosixEnvironmentVariable")])),
            ]),
            |c| Ok(c.get("v")),
        ),
    ));
    g.push(rule(
        "BashEnvironmentVariable",
        act(
            seq(vec![
                class(&['_'], &[('A', 'Z'), ('a', 'z')]),
                star(class(&['_'], &[('A', 'Z'), ('a', 'z'), ('0', '9')])),
            ]),
            |c| Ok(Value::Fetch(Fetchable::Env(c.text.clone()))),
        ),
    ));
    g.push(rule(
        "PosixEnvironmentVariable",
        act(
            seq(vec![lit("\""), lab("v", r("PosixEnvironmentVariableContent")), lit("\"")]),
            |c| Ok(c.get("v")),
        ),
    ));
    g.push(rule(
        "PosixEnvironmentVariableContent",
        act(lab("v", plus(r("PosixEnvironmentVariableCharacter"))), |c| {
            let mut name = String::new();
            for v in c.get("v").into_list()? {
                name.push_str(&v.into_str()?);
            }
            Ok(Value::Fetch(Fetchable::Env(name)))
        }),
    ));
    g.push(rule(
        "PosixEnvironmentVariableCharacter",
        alt(vec![
            act(lit("\\\""), |_| Ok(Value::Str("\"".to_string()))),
            act(lit("\\\\"), |_| Ok(Value::Str("\\".to_string()))),
            act(lit("\\a"), |_| Ok(Value::Str("\u{7}".to_string()))),
            act(lit("\\b"), |_| Ok(Value::Str("\u{8}".to_string()))),
            act(lit("\\f"), |_| Ok(Value::Str("\u{c}".to_string()))),
            act(lit("\\n"), |_| Ok(Value::Str("\n".to_string()))),
            act(lit("\\r"), |_| Ok(Value::Str("\r".to_string()))),
            act(lit("\\t"), |_| Ok(Value::Str("\t".to_string()))),
            act(lit("\\v"), |_| Ok(Value::Str("\u{b}".to_string()))),
            class(&[], &[('\u{20}', '\u{21}'), ('\u{23}', '['), (']', '~')]),
        ]),
    ));

    // imports
    g.push(rule("ImportType", alt(vec![r("Missing"), r("Local"), r("Http"), r("Env")])));
    g.push(rule(
        "Hash",
        act(
            seq(vec![lit("sha256:"), {
                let mut digits: Vec<Pat> = Vec::with_capacity(64);
                for _ in 0..64 {
                    digits.push(r("HexDig"));
                }
                seq(digits)
            }]),
            |c| Ok(Value::Str(c.text["sha256:".len()..].to_ascii_lowercase())),
        ),
    ));
    g.push(rule(
        "ImportHashed",
        act(
            seq(vec![lab("i", r("ImportType")), lab("h", opt(seq(vec![r("_1"), r("Hash")])))]),
            |c| {
                let target = c.get("i").into_fetch()?;
                let digest = match c.get("h").opt() {
                    Some(v) => Some(nth(v, 1)?.into_str()?),
                    None => None,
                };
                Ok(Value::Hashed(ImportHashed { target, digest }))
            },
        ),
    ));
    g.push(rule(
        "Import",
        alt(vec![
            act(
                seq(vec![lab("i", r("ImportHashed")), r("_"), r("As"), r("_1"), r("Text")]),
                |c| {
                    let hashed = c.get("i").into_hashed()?;
                    expr(Expr::Import(Import { hashed, mode: ImportMode::RawText }))
                },
            ),
            act(lab("i", r("ImportHashed")), |c| {
                let hashed = c.get("i").into_hashed()?;
                expr(Expr::Import(Import { hashed, mode: ImportMode::Code }))
            }),
        ]),
    ));

    // let bindings
    g.push(rule(
        "LetBinding",
        act(
            seq(vec![
                r("Let"),
                r("_1"),
                lab("label", r("NonreservedLabel")),
                r("_"),
                lab("a", opt(seq(vec![r("Annotation"), r("_")]))),
                lit("="),
                r("_"),
                lab("v", r("Expression")),
                r("_"),
            ]),
            |c| {
                let label = c.get("label").into_str()?;
                let annot = match c.get("a").opt() {
                    Some(v) => Some(nth(v, 0)?.into_expr()?),
                    None => None,
                };
                let value = c.get("v").into_expr()?;
                Ok(Value::Binding(Binding { label, annot, value }))
            },
        ),
    ));
    g.push(rule(
        "Annotation",
        act(seq(vec![lit(":"), r("_1"), lab("a", r("Expression"))]), |c| Ok(c.get("a"))),
    ));

    // the expression rule proper
    g.push(rule(
        "Expression",
        alt(vec![
            act(
                seq(vec![
                    r("Lambda"),
                    r("_"),
                    lit("("),
                    r("_"),
                    lab("label", r("NonreservedLabel")),
                    r("_"),
                    lit(":"),
                    r("_1"),
                    lab("t", r("Expression")),
                    r("_"),
                    lit(")"),
                    r("_"),
                    r("Arrow"),
                    r("_"),
                    lab("body", r("Expression")),
                ]),
                |c| {
                    expr(Expr::lambda(
                        c.get("label").into_str()?,
                        c.get("t").into_expr()?,
                        c.get("body").into_expr()?,
                    ))
                },
            ),
            act(
                seq(vec![
                    r("If"),
                    r("_1"),
                    lab("cond", r("Expression")),
                    r("_"),
                    r("Then"),
                    r("_1"),
                    lab("t", r("Expression")),
                    r("_"),
                    r("Else"),
                    r("_1"),
                    lab("f", r("Expression")),
                ]),
                |c| {
                    expr(Expr::BoolIf {
                        cond: Box::new(c.get("cond").into_expr()?),
                        then_branch: Box::new(c.get("t").into_expr()?),
                        else_branch: Box::new(c.get("f").into_expr()?),
                    })
                },
            ),
            act(
                seq(vec![
                    lab("bindings", plus(r("LetBinding"))),
                    r("In"),
                    r("_1"),
                    lab("b", r("Expression")),
                ]),
                |c| {
                    let mut bindings = Vec::new();
                    for v in c.get("bindings").into_list()? {
                        bindings.push(v.into_binding()?);
                    }
                    expr(Expr::Let { bindings, body: Box::new(c.get("b").into_expr()?) })
                },
            ),
            act(
                seq(vec![
                    r("Forall"),
                    r("_"),
                    lit("("),
                    r("_"),
                    lab("label", r("NonreservedLabel")),
                    r("_"),
                    lit(":"),
                    r("_1"),
                    lab("t", r("Expression")),
                    r("_"),
                    lit(")"),
                    r("_"),
                    r("Arrow"),
                    r("_"),
                    lab("body", r("Expression")),
                ]),
                |c| {
                    expr(Expr::pi(
                        c.get("label").into_str()?,
                        c.get("t").into_expr()?,
                        c.get("body").into_expr()?,
                    ))
                },
            ),
            act(
                seq(vec![
                    lab("o", r("OperatorExpression")),
                    r("_"),
                    r("Arrow"),
                    r("_"),
                    lab("e", r("Expression")),
                ]),
                |c| expr(Expr::fn_type(c.get("o").into_expr()?, c.get("e").into_expr()?)),
            ),
            act(
                seq(vec![
                    r("Merge"),
                    r("_1"),
                    lab("h", r("ImportExpression")),
                    r("_1"),
                    lab("u", r("ImportExpression")),
                    r("_"),
                    lit(":"),
                    r("_1"),
                    lab("a", r("ApplicationExpression")),
                ]),
                |c| {
                    expr(Expr::Merge {
                        handler: Box::new(c.get("h").into_expr()?),
                        union: Box::new(c.get("u").into_expr()?),
                        annot: Some(Box::new(c.get("a").into_expr()?)),
                    })
                },
            ),
            r("EmptyList"),
            r("AnnotatedExpression"),
        ]),
    ));
    g.push(rule(
        "AnnotatedExpression",
        act(
            seq(vec![
                lab("e", r("OperatorExpression")),
                lab("a", opt(seq(vec![r("_"), r("Annotation")]))),
            ]),
            |c| {
                let e = c.get("e").into_expr()?;
                match c.get("a").opt() {
                    Some(v) => expr(Expr::annot(e, nth(v, 1)?.into_expr()?)),
                    None => expr(e),
                }
            },
        ),
    ));
    g.push(rule(
        "EmptyList",
        act(
            seq(vec![
                lit("["),
                r("_"),
                lit("]"),
                r("_"),
                lit(":"),
                r("_1"),
                r("List"),
                r("_"),
                lab("a", r("ImportExpression")),
            ]),
            |c| {
                let elem = c.get("a").into_expr()?;
                expr(Expr::EmptyList {
                    ty: Box::new(Expr::app(Expr::Builtin(Builtin::List), elem)),
                })
            },
        ),
    ));

    // operator chain, loosest first
    g.push(rule("OperatorExpression", r("ImportAltExpression")));
    g.push(operator_chain("ImportAltExpression", "OrExpression", "?", "_1", OpCode::ImportAlt));
    g.push(operator_chain("OrExpression", "PlusExpression", "||", "_", OpCode::Or));
    g.push(operator_chain("PlusExpression", "TextAppendExpression", "+", "_1", OpCode::Plus));
    g.push(operator_chain(
        "TextAppendExpression",
        "ListAppendExpression",
        "++",
        "_",
        OpCode::TextAppend,
    ));
    g.push(operator_chain("ListAppendExpression", "AndExpression", "#", "_", OpCode::ListAppend));
    g.push(operator_chain("AndExpression", "TimesExpression", "&&", "_", OpCode::And));
    g.push(operator_chain("TimesExpression", "EqualExpression", "*", "_", OpCode::Times));
    g.push(operator_chain("EqualExpression", "NotEqualExpression", "==", "_", OpCode::Equal));
    g.push(operator_chain(
        "NotEqualExpression",
        "ApplicationExpression",
        "!=",
        "_",
        OpCode::NotEqual,
    ));

    // application and selection
    g.push(rule(
        "ApplicationExpression",
        act(
            seq(vec![
                lab("f", r("FirstApplicationExpression")),
                lab("rest", star(seq(vec![r("_1"), r("ImportExpression")]))),
            ]),
            |c| {
                let mut out = c.get("f").into_expr()?;
                for item in c.get("rest").into_list()? {
                    out = Expr::app(out, nth(item, 1)?.into_expr()?);
                }
                expr(out)
            },
        ),
    ));
    g.push(rule(
        "FirstApplicationExpression",
        alt(vec![
            act(
                seq(vec![
                    r("Merge"),
                    r("_1"),
                    lab("h", r("ImportExpression")),
                    r("_1"),
                    lab("u", r("ImportExpression")),
                ]),
                |c| {
                    expr(Expr::Merge {
                        handler: Box::new(c.get("h").into_expr()?),
                        union: Box::new(c.get("u").into_expr()?),
                        annot: None,
                    })
                },
            ),
            act(seq(vec![r("Some"), r("_1"), lab("e", r("ImportExpression"))]), |c| {
                expr(Expr::Some(Box::new(c.get("e").into_expr()?)))
            }),
            r("ImportExpression"),
        ]),
    ));
    g.push(rule("ImportExpression", alt(vec![r("Import"), r("SelectorExpression")])));
    g.push(rule(
        "SelectorExpression",
        act(
            seq(vec![
                lab("e", r("PrimitiveExpression")),
                lab("ls", star(seq(vec![r("_"), lit("."), r("_"), r("AnyLabel")]))),
            ]),
            |c| {
                let mut out = c.get("e").into_expr()?;
                for item in c.get("ls").into_list()? {
                    let label = nth(item, 3)?.into_str()?;
                    out = Expr::Field { record: Box::new(out), label };
                }
                expr(out)
            },
        ),
    ));

    // primitives
    g.push(rule(
        "PrimitiveExpression",
        alt(vec![
            r("DoubleLiteral"),
            r("NaturalLiteral"),
            r("IntegerLiteral"),
            r("TextLiteral"),
            act(
                seq(vec![lit("{"), r("_"), lab("rec", r("RecordTypeOrLiteral")), r("_"), lit("}")]),
                |c| Ok(c.get("rec")),
            ),
            act(seq(vec![lit("<"), r("_"), lab("u", r("UnionType")), r("_"), lit(">")]), |c| {
                Ok(c.get("u"))
            }),
            r("NonEmptyListLiteral"),
            r("Identifier"),
            act(seq(vec![lit("("), lab("e", r("CompleteExpression")), lit(")")]), |c| {
                Ok(c.get("e"))
            }),
        ]),
    ));

    // records
    g.push(rule(
        "RecordTypeOrLiteral",
        alt(vec![
            act(lit("="), |_| expr(Expr::RecordLit(BTreeMap::new()))),
            r("NonEmptyRecordType"),
            r("NonEmptyRecordLiteral"),
            act(seq(vec![]), |_| expr(Expr::Record(BTreeMap::new()))),
        ]),
    ));
    g.push(rule(
        "RecordTypeField",
        act(
            seq(vec![lab("name", r("AnyLabel")), r("_"), lit(":"), r("_1"), lab("expr", r("Expression"))]),
            |c| Ok(Value::FieldPair(c.get("name").into_str()?, c.get("expr").into_expr()?)),
        ),
    ));
    g.push(rule(
        "MoreRecordType",
        act(seq(vec![r("_"), lit(","), r("_"), lab("f", r("RecordTypeField"))]), |c| {
            Ok(c.get("f"))
        }),
    ));
    g.push(rule(
        "NonEmptyRecordType",
        act(
            seq(vec![lab("first", r("RecordTypeField")), lab("rest", star(r("MoreRecordType")))]),
            |c| build_record(c, false),
        ),
    ));
    g.push(rule(
        "RecordLiteralField",
        act(
            seq(vec![lab("name", r("AnyLabel")), r("_"), lit("="), r("_"), lab("expr", r("Expression"))]),
            |c| Ok(Value::FieldPair(c.get("name").into_str()?, c.get("expr").into_expr()?)),
        ),
    ));
    g.push(rule(
        "MoreRecordLiteral",
        act(seq(vec![r("_"), lit(","), r("_"), lab("f", r("RecordLiteralField"))]), |c| {
            Ok(c.get("f"))
        }),
    ));
    g.push(rule(
        "NonEmptyRecordLiteral",
        act(
            seq(vec![
                lab("first", r("RecordLiteralField")),
                lab("rest", star(r("MoreRecordLiteral"))),
            ]),
            |c| build_record(c, true),
        ),
    ));

    // unions
    g.push(rule("UnionType", alt(vec![r("NonEmptyUnionType"), r("EmptyUnionType")])));
    g.push(rule("EmptyUnionType", act(seq(vec![]), |_| expr(Expr::UnionType(BTreeMap::new())))));
    g.push(rule(
        "NonEmptyUnionType",
        act(
            seq(vec![
                lab("first", r("UnionVariant")),
                lab("rest", star(seq(vec![r("_"), lit("|"), r("_"), r("UnionVariant")]))),
            ]),
            |c| {
                let (label, ty) = c.get("first").into_alt()?;
                let mut alts = BTreeMap::new();
                alts.insert(label, ty);
                for item in c.get("rest").into_list()? {
                    let (label, ty) = nth(item, 3)?.into_alt()?;
                    if alts.contains_key(&label) {
                        return Err(ActionError::duplicate_field(&label));
                    }
                    alts.insert(label, ty);
                }
                expr(Expr::UnionType(alts))
            },
        ),
    ));
    g.push(rule(
        "UnionVariant",
        act(
            seq(vec![
                lab("name", r("AnyLabel")),
                lab("t", opt(seq(vec![r("_"), lit(":"), r("_1"), r("Expression")]))),
            ]),
            |c| {
                let name = c.get("name").into_str()?;
                let ty = match c.get("t").opt() {
                    Some(v) => Some(nth(v, 3)?.into_expr()?),
                    None => None,
                };
                Ok(Value::AltPair(name, ty))
            },
        ),
    ));

    // non-empty lists
    g.push(rule(
        "MoreList",
        act(seq(vec![lit(","), r("_"), lab("e", r("Expression")), r("_")]), |c| Ok(c.get("e"))),
    ));
    g.push(rule(
        "NonEmptyListLiteral",
        act(
            seq(vec![
                lit("["),
                r("_"),
                lab("first", r("Expression")),
                r("_"),
                lab("rest", star(r("MoreList"))),
                lit("]"),
            ]),
            |c| {
                let mut items = vec![c.get("first").into_expr()?];
                for v in c.get("rest").into_list()? {
                    items.push(v.into_expr()?);
                }
                expr(Expr::NonEmptyList(items))
            },
        ),
    ));

    Grammar::new(g)
}

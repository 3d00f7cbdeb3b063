use std::collections::BTreeMap;
use std::fmt;

use url::Url;

pub type Label = String;

/// Binary operator tags, ordered loosest-binding first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCode {
    ImportAlt,
    Or,
    Plus,
    TextAppend,
    ListAppend,
    And,
    Times,
    Equal,
    NotEqual,
}

impl OpCode {
    pub fn symbol(self) -> &'static str {
        match self {
            OpCode::ImportAlt => "?",
            OpCode::Or => "||",
            OpCode::Plus => "+",
            OpCode::TextAppend => "++",
            OpCode::ListAppend => "#",
            OpCode::And => "&&",
            OpCode::Times => "*",
            OpCode::Equal => "==",
            OpCode::NotEqual => "!=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Type,
    Kind,
    Sort,
    Bool,
    Natural,
    Integer,
    Double,
    Text,
    List,
    Optional,
    None,
    NaturalBuild,
    NaturalFold,
    NaturalIsZero,
    NaturalEven,
    NaturalOdd,
    NaturalToInteger,
    NaturalShow,
    IntegerToDouble,
    IntegerShow,
    DoubleShow,
    ListBuild,
    ListFold,
    ListLength,
    ListHead,
    ListLast,
    ListIndexed,
    ListReverse,
    OptionalBuild,
    OptionalFold,
    TextShow,
}

impl Builtin {
    pub fn name(self) -> &'static str {
        match self {
            Builtin::Type => "Type",
            Builtin::Kind => "Kind",
            Builtin::Sort => "Sort",
            Builtin::Bool => "Bool",
            Builtin::Natural => "Natural",
            Builtin::Integer => "Integer",
            Builtin::Double => "Double",
            Builtin::Text => "Text",
            Builtin::List => "List",
            Builtin::Optional => "Optional",
            Builtin::None => "None",
            Builtin::NaturalBuild => "Natural/build",
            Builtin::NaturalFold => "Natural/fold",
            Builtin::NaturalIsZero => "Natural/isZero",
            Builtin::NaturalEven => "Natural/even",
            Builtin::NaturalOdd => "Natural/odd",
            Builtin::NaturalToInteger => "Natural/toInteger",
            Builtin::NaturalShow => "Natural/show",
            Builtin::IntegerToDouble => "Integer/toDouble",
            Builtin::IntegerShow => "Integer/show",
            Builtin::DoubleShow => "Double/show",
            Builtin::ListBuild => "List/build",
            Builtin::ListFold => "List/fold",
            Builtin::ListLength => "List/length",
            Builtin::ListHead => "List/head",
            Builtin::ListLast => "List/last",
            Builtin::ListIndexed => "List/indexed",
            Builtin::ListReverse => "List/reverse",
            Builtin::OptionalBuild => "Optional/build",
            Builtin::OptionalFold => "Optional/fold",
            Builtin::TextShow => "Text/show",
        }
    }

    /// All reserved names, longest-prefix first so the grammar's ordered
    /// choice never truncates a match ("Natural/build" before "Natural").
    pub const ALL: [Builtin; 31] = [
        Builtin::NaturalBuild,
        Builtin::NaturalFold,
        Builtin::NaturalIsZero,
        Builtin::NaturalEven,
        Builtin::NaturalOdd,
        Builtin::NaturalToInteger,
        Builtin::NaturalShow,
        Builtin::IntegerToDouble,
        Builtin::IntegerShow,
        Builtin::DoubleShow,
        Builtin::ListBuild,
        Builtin::ListFold,
        Builtin::ListLength,
        Builtin::ListHead,
        Builtin::ListLast,
        Builtin::ListIndexed,
        Builtin::ListReverse,
        Builtin::OptionalBuild,
        Builtin::OptionalFold,
        Builtin::TextShow,
        Builtin::Bool,
        Builtin::Optional,
        Builtin::Natural,
        Builtin::Integer,
        Builtin::Double,
        Builtin::Text,
        Builtin::List,
        Builtin::None,
        Builtin::Type,
        Builtin::Kind,
        Builtin::Sort,
    ];

    pub fn from_name(name: &str) -> Option<Builtin> {
        Builtin::ALL.iter().copied().find(|b| b.name() == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub label: Label,
    pub annot: Option<Expr>,
    pub value: Expr,
}

/// One interpolated segment of a text literal: the literal text before the
/// embedded expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub prefix: String,
    pub expr: Expr,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextLit {
    pub chunks: Vec<Chunk>,
    pub suffix: String,
}

impl TextLit {
    pub fn from_suffix(suffix: impl Into<String>) -> Self {
        TextLit { chunks: Vec::new(), suffix: suffix.into() }
    }

    /// Strip the longest common space/tab prefix shared by every line that
    /// has non-whitespace content (an interpolation counts as content).
    /// Stripping is idempotent.
    pub fn strip_common_indent(self) -> TextLit {
        fn strip(s: &str, indent: &str, at_start: &mut bool) -> String {
            let mut r = String::with_capacity(s.len());
            let mut matched = 0usize;
            for c in s.chars() {
                if *at_start && matched < indent.len() && indent[matched..].starts_with(c) {
                    matched += c.len_utf8();
                    continue;
                }
                *at_start = false;
                r.push(c);
                if c == '\n' {
                    *at_start = true;
                    matched = 0;
                }
            }
            r
        }

        let indent = match self.common_indent() {
            Some(i) if !i.is_empty() => i,
            _ => return self,
        };

        let mut out = TextLit::default();
        let mut at_line_start = true;
        for chunk in &self.chunks {
            let prefix = strip(&chunk.prefix, &indent, &mut at_line_start);
            at_line_start = false;
            out.chunks.push(Chunk { prefix, expr: chunk.expr.clone() });
        }
        out.suffix = strip(&self.suffix, &indent, &mut at_line_start);
        out
    }

    fn common_indent(&self) -> Option<String> {
        struct Lines {
            indent: Option<String>,
            line_ws: String,
            at_start: bool,
            has_content: bool,
        }
        impl Lines {
            fn end_line(&mut self) {
                if self.has_content {
                    let ws = std::mem::take(&mut self.line_ws);
                    self.indent = Some(match self.indent.take() {
                        Option::None => ws,
                        Option::Some(prev) => common_prefix(&prev, &ws),
                    });
                } else {
                    self.line_ws.clear();
                }
            }
            fn text(&mut self, s: &str) {
                for c in s.chars() {
                    match c {
                        '\n' => {
                            self.end_line();
                            self.at_start = true;
                            self.has_content = false;
                        }
                        ' ' | '\t' if self.at_start => self.line_ws.push(c),
                        _ => {
                            self.at_start = false;
                            self.has_content = true;
                        }
                    }
                }
            }
        }

        let mut st = Lines {
            indent: None,
            line_ws: String::new(),
            at_start: true,
            has_content: false,
        };
        for chunk in &self.chunks {
            st.text(&chunk.prefix);
            // an interpolation makes the line non-blank
            st.at_start = false;
            st.has_content = true;
        }
        st.text(&self.suffix);
        st.end_line();
        st.indent
    }
}

fn common_prefix(a: &str, b: &str) -> String {
    a.chars()
        .zip(b.chars())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportMode {
    Code,
    RawText,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocalKind {
    Parent,
    Here,
    Home,
    Absolute,
}

/// An import target: local path, remote URL, environment variable, or the
/// always-failing `missing` sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fetchable {
    Local { kind: LocalKind, path: String },
    Remote(Url),
    Env(Label),
    Missing,
}

impl Fetchable {
    /// Classify a slash-separated path by its leading marker.
    pub fn local(path: &str) -> Fetchable {
        let (kind, rest) = if let Some(r) = path.strip_prefix("../") {
            (LocalKind::Parent, r)
        } else if let Some(r) = path.strip_prefix("./") {
            (LocalKind::Here, r)
        } else if let Some(r) = path.strip_prefix("~/") {
            (LocalKind::Home, r)
        } else if let Some(r) = path.strip_prefix('/') {
            (LocalKind::Absolute, r)
        } else {
            (LocalKind::Here, path)
        };
        Fetchable::Local { kind, path: rest.to_string() }
    }

    pub fn env(name: impl Into<Label>) -> Fetchable {
        Fetchable::Env(name.into())
    }

    /// Panics on an invalid URL; intended for fixtures and embedders with
    /// known-good addresses. The parser builds remote targets through the
    /// grammar instead.
    pub fn remote(url: &str) -> Fetchable {
        Fetchable::Remote(Url::parse(url).expect("remote import URL"))
    }
}

impl fmt::Display for Fetchable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fetchable::Local { kind: LocalKind::Parent, path } => write!(f, "../{path}"),
            Fetchable::Local { kind: LocalKind::Here, path } => write!(f, "./{path}"),
            Fetchable::Local { kind: LocalKind::Home, path } => write!(f, "~/{path}"),
            Fetchable::Local { kind: LocalKind::Absolute, path } => write!(f, "/{path}"),
            Fetchable::Remote(url) => write!(f, "{url}"),
            Fetchable::Env(name) => {
                if is_bash_name(name) {
                    write!(f, "env:{name}")
                } else {
                    write!(f, "env:\"{}\"", escape_posix_name(name))
                }
            }
            Fetchable::Missing => write!(f, "missing"),
        }
    }
}

fn is_bash_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn escape_posix_name(name: &str) -> String {
    let mut out = String::new();
    for c in name.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\x07' => out.push_str("\\a"),
            '\x08' => out.push_str("\\b"),
            '\x0c' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\x0b' => out.push_str("\\v"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImportHashed {
    pub target: Fetchable,
    /// Lowercase hex SHA-256 over the canonical bytes of the resolved
    /// expression, when the source pinned one.
    pub digest: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Import {
    pub hashed: ImportHashed,
    pub mode: ImportMode,
}

impl Import {
    pub fn new(target: Fetchable, mode: ImportMode) -> Import {
        Import { hashed: ImportHashed { target, digest: Option::None }, mode }
    }

    pub fn with_digest(mut self, digest: impl Into<String>) -> Import {
        self.hashed.digest = Some(digest.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Var { name: Label, index: usize },
    Lambda { label: Label, ty: Box<Expr>, body: Box<Expr> },
    Pi { label: Label, ty: Box<Expr>, body: Box<Expr> },
    App { func: Box<Expr>, arg: Box<Expr> },
    Let { bindings: Vec<Binding>, body: Box<Expr> },
    Annot { expr: Box<Expr>, ty: Box<Expr> },
    BoolIf { cond: Box<Expr>, then_branch: Box<Expr>, else_branch: Box<Expr> },
    Op { op: OpCode, lhs: Box<Expr>, rhs: Box<Expr> },
    BoolLit(bool),
    NaturalLit(u64),
    IntegerLit(i64),
    DoubleLit(f64),
    TextLit(TextLit),
    EmptyList { ty: Box<Expr> },
    NonEmptyList(Vec<Expr>),
    Record(BTreeMap<Label, Expr>),
    RecordLit(BTreeMap<Label, Expr>),
    UnionType(BTreeMap<Label, Option<Expr>>),
    Field { record: Box<Expr>, label: Label },
    Merge { handler: Box<Expr>, union: Box<Expr>, annot: Option<Box<Expr>> },
    Some(Box<Expr>),
    Builtin(Builtin),
    Import(Import),
}

impl From<Import> for Expr {
    fn from(i: Import) -> Expr {
        Expr::Import(i)
    }
}

impl From<Builtin> for Expr {
    fn from(b: Builtin) -> Expr {
        Expr::Builtin(b)
    }
}

impl Expr {
    pub fn var(name: impl Into<Label>) -> Expr {
        Expr::Var { name: name.into(), index: 0 }
    }

    pub fn app(func: Expr, arg: Expr) -> Expr {
        Expr::App { func: Box::new(func), arg: Box::new(arg) }
    }

    pub fn lambda(label: impl Into<Label>, ty: Expr, body: Expr) -> Expr {
        Expr::Lambda { label: label.into(), ty: Box::new(ty), body: Box::new(body) }
    }

    pub fn pi(label: impl Into<Label>, ty: Expr, body: Expr) -> Expr {
        Expr::Pi { label: label.into(), ty: Box::new(ty), body: Box::new(body) }
    }

    /// `T → U`, sugar for `∀(_ : T) → U`.
    pub fn fn_type(ty: Expr, body: Expr) -> Expr {
        Expr::pi("_", ty, body)
    }

    pub fn op(op: OpCode, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Op { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
    }

    pub fn annot(expr: Expr, ty: Expr) -> Expr {
        Expr::Annot { expr: Box::new(expr), ty: Box::new(ty) }
    }

    pub fn text(s: impl Into<String>) -> Expr {
        Expr::TextLit(TextLit::from_suffix(s))
    }

    /// True when the expression has no free variables, counting de Bruijn
    /// indices against enclosing binders of the same name.
    pub fn is_closed(&self) -> bool {
        self.closed_in(&mut Vec::new())
    }

    fn closed_in<'a>(&'a self, scope: &mut Vec<&'a str>) -> bool {
        match self {
            Expr::Var { name, index } => {
                scope.iter().filter(|&&l| l == name.as_str()).count() > *index
            }
            Expr::Lambda { label, ty, body } | Expr::Pi { label, ty, body } => {
                if !ty.closed_in(scope) {
                    return false;
                }
                scope.push(label);
                let ok = body.closed_in(scope);
                scope.pop();
                ok
            }
            Expr::App { func, arg } => func.closed_in(scope) && arg.closed_in(scope),
            Expr::Let { bindings, body } => {
                let mut pushed = 0;
                let mut ok = true;
                for b in bindings {
                    if let Some(a) = &b.annot {
                        if !a.closed_in(scope) {
                            ok = false;
                            break;
                        }
                    }
                    if !b.value.closed_in(scope) {
                        ok = false;
                        break;
                    }
                    scope.push(&b.label);
                    pushed += 1;
                }
                let ok = ok && body.closed_in(scope);
                scope.truncate(scope.len() - pushed);
                ok
            }
            Expr::Annot { expr, ty } => expr.closed_in(scope) && ty.closed_in(scope),
            Expr::BoolIf { cond, then_branch, else_branch } => {
                cond.closed_in(scope)
                    && then_branch.closed_in(scope)
                    && else_branch.closed_in(scope)
            }
            Expr::Op { lhs, rhs, .. } => lhs.closed_in(scope) && rhs.closed_in(scope),
            Expr::TextLit(t) => t.chunks.iter().all(|c| c.expr.closed_in(scope)),
            Expr::EmptyList { ty } => ty.closed_in(scope),
            Expr::NonEmptyList(items) => items.iter().all(|e| e.closed_in(scope)),
            Expr::Record(fields) | Expr::RecordLit(fields) => {
                fields.values().all(|e| e.closed_in(scope))
            }
            Expr::UnionType(alts) => {
                alts.values().all(|t| t.as_ref().map_or(true, |e| e.closed_in(scope)))
            }
            Expr::Field { record, .. } => record.closed_in(scope),
            Expr::Merge { handler, union, annot } => {
                handler.closed_in(scope)
                    && union.closed_in(scope)
                    && annot.as_ref().map_or(true, |a| a.closed_in(scope))
            }
            Expr::Some(e) => e.closed_in(scope),
            Expr::BoolLit(_)
            | Expr::NaturalLit(_)
            | Expr::IntegerLit(_)
            | Expr::DoubleLit(_)
            | Expr::Builtin(_)
            | Expr::Import(_) => true,
        }
    }
}

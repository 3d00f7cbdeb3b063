//! A small PEG interpreter.
//!
//! Grammars are trees of [`Pat`] nodes grouped into named rules. Matching
//! produces [`Value`] capture values; semantic actions turn matched text and
//! labeled captures into AST nodes. Failure of a sub-pattern rewinds the
//! scanner to its savepoint. Semantic-action errors do not rewind: they are
//! accumulated and the enclosing rule proceeds with a nil value, so a parse
//! fails iff the start rule fails to match or any error was recorded.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::ast::{Binding, Expr, Fetchable, ImportHashed, Label};
use crate::error::{ParseError, ParseErrorKind};
use crate::scan::{Pos, Savepoint, Scanner};

/// Capture values flowing between rules. A closed tagged sum: one variant
/// per intermediate AST shape plus raw text, bytes and composites.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Str(String),
    Bytes(Vec<u8>),
    Nat(u64),
    List(Vec<Value>),
    Expr(Expr),
    Binding(Binding),
    FieldPair(Label, Expr),
    AltPair(Label, Option<Expr>),
    Fetch(Fetchable),
    Hashed(ImportHashed),
}

impl Value {
    fn kind_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Str(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Nat(_) => "natural",
            Value::List(_) => "list",
            Value::Expr(_) => "expression",
            Value::Binding(_) => "binding",
            Value::FieldPair(..) => "field",
            Value::AltPair(..) => "alternative",
            Value::Fetch(_) => "import target",
            Value::Hashed(_) => "import",
        }
    }

    fn mismatch(&self, want: &str) -> ActionError {
        ActionError::msg(format!("expected {want} capture, got {}", self.kind_name()))
    }

    pub fn into_expr(self) -> Result<Expr, ActionError> {
        match self {
            Value::Expr(e) => Ok(e),
            v => Err(v.mismatch("expression")),
        }
    }

    pub fn into_str(self) -> Result<String, ActionError> {
        match self {
            Value::Str(s) => Ok(s),
            v => Err(v.mismatch("text")),
        }
    }

    pub fn into_list(self) -> Result<Vec<Value>, ActionError> {
        match self {
            Value::List(vs) => Ok(vs),
            v => Err(v.mismatch("list")),
        }
    }

    pub fn into_nat(self) -> Result<u64, ActionError> {
        match self {
            Value::Nat(n) => Ok(n),
            v => Err(v.mismatch("natural")),
        }
    }

    pub fn into_fetch(self) -> Result<Fetchable, ActionError> {
        match self {
            Value::Fetch(f) => Ok(f),
            v => Err(v.mismatch("import target")),
        }
    }

    pub fn into_hashed(self) -> Result<ImportHashed, ActionError> {
        match self {
            Value::Hashed(h) => Ok(h),
            v => Err(v.mismatch("import")),
        }
    }

    pub fn into_binding(self) -> Result<Binding, ActionError> {
        match self {
            Value::Binding(b) => Ok(b),
            v => Err(v.mismatch("binding")),
        }
    }

    pub fn into_field(self) -> Result<(Label, Expr), ActionError> {
        match self {
            Value::FieldPair(l, e) => Ok((l, e)),
            v => Err(v.mismatch("field")),
        }
    }

    pub fn into_alt(self) -> Result<(Label, Option<Expr>), ActionError> {
        match self {
            Value::AltPair(l, e) => Ok((l, e)),
            v => Err(v.mismatch("alternative")),
        }
    }

    /// `Nil` (an unmatched `?`) becomes `None`.
    pub fn opt(self) -> Option<Value> {
        match self {
            Value::Nil => None,
            v => Some(v),
        }
    }
}

/// An error raised by a semantic action. It is recorded at the action's
/// start position; parsing continues with a nil value.
#[derive(Debug)]
pub struct ActionError {
    pub kind: ParseErrorKind,
    pub message: String,
}

impl ActionError {
    pub fn msg(message: impl Into<String>) -> ActionError {
        ActionError { kind: ParseErrorKind::Syntax, message: message.into() }
    }

    pub fn duplicate_field(label: &str) -> ActionError {
        ActionError {
            kind: ParseErrorKind::DuplicateField,
            message: format!("duplicate field {label}"),
        }
    }
}

impl From<String> for ActionError {
    fn from(message: String) -> ActionError {
        ActionError::msg(message)
    }
}

impl From<&str> for ActionError {
    fn from(message: &str) -> ActionError {
        ActionError::msg(message)
    }
}

/// What a semantic action sees: the matched text, its start position, and
/// the labeled captures of the enclosing frame.
pub struct Capture<'a> {
    pub text: String,
    pub pos: Pos,
    frame: &'a Frame,
}

impl Capture<'_> {
    /// The capture bound to `name`, or `Nil`. Later bindings shadow.
    pub fn get(&self, name: &str) -> Value {
        self.frame
            .iter()
            .rev()
            .find(|(l, _)| *l == name)
            .map(|(_, v)| v.clone())
            .unwrap_or(Value::Nil)
    }
}

pub type Action = Box<dyn Fn(&Capture<'_>) -> Result<Value, ActionError> + Send + Sync>;

/// Unicode categories a character class may include.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharCat {
    Letter,
    Digit,
}

impl CharCat {
    fn contains(self, c: char) -> bool {
        match self {
            CharCat::Letter => c.is_alphabetic(),
            CharCat::Digit => c.is_numeric(),
        }
    }
}

pub enum Pat {
    /// Literal text, optionally case-insensitive.
    Lit { want: &'static str, icase: bool },
    /// Character class of single chars, inclusive ranges and categories.
    Class {
        chars: &'static [char],
        ranges: &'static [(char, char)],
        cats: &'static [CharCat],
        inverted: bool,
    },
    /// Any rune except the EOF sentinel.
    Any,
    /// Reference to a named rule.
    Ref(&'static str),
    /// All in order; fails atomically.
    Seq(Vec<Pat>),
    /// First match wins.
    Choice(Vec<Pat>),
    Star(Box<Pat>),
    Plus(Box<Pat>),
    Opt(Box<Pat>),
    /// Positive lookahead; consumes nothing.
    And(Box<Pat>),
    /// Negative lookahead; consumes nothing.
    Not(Box<Pat>),
    /// Bind the sub-pattern's value to a label in the enclosing frame.
    Label(&'static str, Box<Pat>),
    /// Run a semantic action over the matched span.
    Act(Box<Pat>, Action),
}

pub fn lit(want: &'static str) -> Pat {
    Pat::Lit { want, icase: false }
}

pub fn lit_i(want: &'static str) -> Pat {
    Pat::Lit { want, icase: true }
}

pub fn class(chars: &'static [char], ranges: &'static [(char, char)]) -> Pat {
    Pat::Class { chars, ranges, cats: &[], inverted: false }
}

pub fn any() -> Pat {
    Pat::Any
}

pub fn r(name: &'static str) -> Pat {
    Pat::Ref(name)
}

pub fn seq(pats: Vec<Pat>) -> Pat {
    Pat::Seq(pats)
}

pub fn alt(pats: Vec<Pat>) -> Pat {
    Pat::Choice(pats)
}

pub fn star(p: Pat) -> Pat {
    Pat::Star(Box::new(p))
}

pub fn plus(p: Pat) -> Pat {
    Pat::Plus(Box::new(p))
}

pub fn opt(p: Pat) -> Pat {
    Pat::Opt(Box::new(p))
}

pub fn and(p: Pat) -> Pat {
    Pat::And(Box::new(p))
}

pub fn not(p: Pat) -> Pat {
    Pat::Not(Box::new(p))
}

pub fn lab(name: &'static str, p: Pat) -> Pat {
    Pat::Label(name, Box::new(p))
}

pub fn act<F>(p: Pat, f: F) -> Pat
where
    F: Fn(&Capture<'_>) -> Result<Value, ActionError> + Send + Sync + 'static,
{
    Pat::Act(Box::new(p), Box::new(f))
}

pub struct Rule {
    pub name: &'static str,
    pub pat: Pat,
}

pub fn rule(name: &'static str, pat: Pat) -> Rule {
    Rule { name, pat }
}

pub struct Grammar {
    rules: Vec<Rule>,
    index: HashMap<&'static str, usize>,
}

impl Grammar {
    /// The first rule is the start rule.
    pub fn new(rules: Vec<Rule>) -> Grammar {
        let index = rules.iter().enumerate().map(|(i, r)| (r.name, i)).collect();
        Grammar { rules, index }
    }

    pub fn rule_name(&self, id: usize) -> &'static str {
        self.rules[id].name
    }
}

type Frame = Vec<(&'static str, Value)>;

struct MemoEntry {
    value: Value,
    matched: bool,
    end: Savepoint,
}

pub struct Engine<'g, 's> {
    grammar: &'g Grammar,
    scan: Scanner<'s>,
    filename: &'s str,
    vstack: Vec<Frame>,
    rstack: Vec<usize>,
    errors: Vec<ParseError>,
    memo: HashMap<(usize, usize), MemoEntry>,
    memoize: bool,
    debug: bool,
    recover: bool,
    depth: usize,
    /// Pattern evaluations performed; exposed so callers can observe the
    /// effect of memoisation.
    pub pat_count: usize,
}

impl<'g, 's> Engine<'g, 's> {
    pub fn new(
        grammar: &'g Grammar,
        filename: &'s str,
        input: &'s [u8],
        memoize: bool,
        debug: bool,
        recover: bool,
    ) -> Engine<'g, 's> {
        Engine {
            grammar,
            scan: Scanner::new(input),
            filename,
            vstack: Vec::new(),
            rstack: Vec::new(),
            errors: Vec::new(),
            memo: HashMap::new(),
            memoize,
            debug,
            recover,
            depth: 0,
            pat_count: 0,
        }
    }

    /// Run the start rule against the whole input.
    pub fn run(&mut self) -> Result<Value, Vec<ParseError>> {
        let outcome = if self.recover {
            let me = AssertUnwindSafe(&mut *self);
            match catch_unwind(move || {
                let me = me;
                let eng = me.0;
                eng.parse_rule(0)
            }) {
                Ok(r) => Some(r),
                Err(payload) => {
                    let message = panic_message(payload);
                    self.add_error(ParseErrorKind::Syntax, self.scan.pos(), message);
                    None
                }
            }
        } else {
            Some(self.parse_rule(0))
        };

        for pos in self.scan.take_bad_encoding() {
            self.add_error(ParseErrorKind::Encoding, pos, "invalid UTF-8 encoding".to_string());
        }

        match outcome {
            Some((value, true)) if self.errors.is_empty() => Ok(value),
            other => {
                if self.errors.is_empty() {
                    let msg = match other {
                        Some((_, false)) | None => "no match found".to_string(),
                        Some((_, true)) => unreachable!("match without errors already returned"),
                    };
                    self.add_error(ParseErrorKind::Syntax, self.scan.pos(), msg);
                }
                let mut errors = std::mem::take(&mut self.errors);
                errors.sort_by_key(|e| e.offset);
                Err(errors)
            }
        }
    }

    fn parse_rule(&mut self, id: usize) -> (Value, bool) {
        let start = self.scan.save();
        if self.memoize {
            if let Some(hit) = self.memo.get(&(start.pos.offset, id)) {
                self.scan.restore(hit.end);
                return (hit.value.clone(), hit.matched);
            }
        }

        if self.debug {
            self.trace('>', self.grammar.rule_name(id));
            self.depth += 1;
        }

        self.rstack.push(id);
        self.vstack.push(Frame::new());
        let grammar = self.grammar;
        let (value, matched) = self.parse_pat(&grammar.rules[id].pat);
        self.vstack.pop();
        self.rstack.pop();

        if self.debug {
            self.depth -= 1;
            let tag = if matched { '=' } else { '<' };
            self.trace(tag, self.grammar.rule_name(id));
        }

        if self.memoize {
            self.memo.insert(
                (start.pos.offset, id),
                MemoEntry { value: value.clone(), matched, end: self.scan.save() },
            );
        }
        (value, matched)
    }

    fn parse_pat(&mut self, pat: &'g Pat) -> (Value, bool) {
        self.pat_count += 1;
        match pat {
            Pat::Lit { want, icase } => self.parse_lit(want, *icase),
            Pat::Class { chars, ranges, cats, inverted } => {
                self.parse_class(chars, ranges, cats, *inverted)
            }
            Pat::Any => match self.scan.rune() {
                Some(c) => {
                    self.scan.read();
                    (Value::Str(c.to_string()), true)
                }
                None => (Value::Nil, false),
            },
            Pat::Ref(name) => match self.grammar.index.get(name).copied() {
                Some(id) => self.parse_rule(id),
                None => {
                    self.add_error(
                        ParseErrorKind::Syntax,
                        self.scan.pos(),
                        format!("undefined rule: {name}"),
                    );
                    (Value::Nil, false)
                }
            },
            Pat::Seq(pats) => {
                let start = self.scan.save();
                let mut values = Vec::with_capacity(pats.len());
                for p in pats {
                    let (v, ok) = self.parse_pat(p);
                    if !ok {
                        self.scan.restore(start);
                        return (Value::Nil, false);
                    }
                    values.push(v);
                }
                (Value::List(values), true)
            }
            Pat::Choice(alts) => {
                for p in alts {
                    self.vstack.push(Frame::new());
                    let (v, ok) = self.parse_pat(p);
                    self.vstack.pop();
                    if ok {
                        return (v, true);
                    }
                }
                (Value::Nil, false)
            }
            Pat::Star(p) => {
                let mut values = Vec::new();
                loop {
                    self.vstack.push(Frame::new());
                    let (v, ok) = self.parse_pat(p);
                    self.vstack.pop();
                    if !ok {
                        return (Value::List(values), true);
                    }
                    values.push(v);
                }
            }
            Pat::Plus(p) => {
                let mut values = Vec::new();
                loop {
                    self.vstack.push(Frame::new());
                    let (v, ok) = self.parse_pat(p);
                    self.vstack.pop();
                    if !ok {
                        if values.is_empty() {
                            return (Value::Nil, false);
                        }
                        return (Value::List(values), true);
                    }
                    values.push(v);
                }
            }
            Pat::Opt(p) => {
                self.vstack.push(Frame::new());
                let (v, ok) = self.parse_pat(p);
                self.vstack.pop();
                if ok {
                    (v, true)
                } else {
                    (Value::Nil, true)
                }
            }
            Pat::And(p) => {
                let start = self.scan.save();
                self.vstack.push(Frame::new());
                let (_, ok) = self.parse_pat(p);
                self.vstack.pop();
                self.scan.restore(start);
                (Value::Nil, ok)
            }
            Pat::Not(p) => {
                let start = self.scan.save();
                self.vstack.push(Frame::new());
                let (_, ok) = self.parse_pat(p);
                self.vstack.pop();
                self.scan.restore(start);
                (Value::Nil, !ok)
            }
            Pat::Label(name, p) => {
                self.vstack.push(Frame::new());
                let (v, ok) = self.parse_pat(p);
                self.vstack.pop();
                if ok {
                    if let Some(frame) = self.vstack.last_mut() {
                        frame.push((*name, v.clone()));
                    }
                }
                (v, ok)
            }
            Pat::Act(p, action) => {
                let start = self.scan.save();
                let (_, ok) = self.parse_pat(p);
                if !ok {
                    return (Value::Nil, false);
                }
                let result = {
                    let empty = Frame::new();
                    let capture = Capture {
                        text: self.scan.text_from(&start),
                        pos: start.pos,
                        frame: self.vstack.last().unwrap_or(&empty),
                    };
                    action(&capture)
                };
                match result {
                    Ok(v) => (v, true),
                    Err(e) => {
                        self.add_error(e.kind, start.pos, e.message);
                        (Value::Nil, true)
                    }
                }
            }
        }
    }

    fn parse_lit(&mut self, want: &str, icase: bool) -> (Value, bool) {
        let start = self.scan.save();
        for w in want.chars() {
            let cur = match self.scan.rune() {
                Some(c) => c,
                None => {
                    self.scan.restore(start);
                    return (Value::Nil, false);
                }
            };
            let hit = if icase { cur.eq_ignore_ascii_case(&w) } else { cur == w };
            if !hit {
                self.scan.restore(start);
                return (Value::Nil, false);
            }
            self.scan.read();
        }
        (Value::Str(self.scan.text_from(&start)), true)
    }

    fn parse_class(
        &mut self,
        chars: &[char],
        ranges: &[(char, char)],
        cats: &[CharCat],
        inverted: bool,
    ) -> (Value, bool) {
        let cur = match self.scan.rune() {
            Some(c) => c,
            None => return (Value::Nil, false),
        };
        let hit = chars.contains(&cur)
            || ranges.iter().any(|(lo, hi)| cur >= *lo && cur <= *hi)
            || cats.iter().any(|cat| cat.contains(cur));
        if hit != inverted {
            self.scan.read();
            (Value::Str(cur.to_string()), true)
        } else {
            (Value::Nil, false)
        }
    }

    fn add_error(&mut self, kind: ParseErrorKind, pos: Pos, message: String) {
        let rule = self
            .rstack
            .last()
            .map(|id| self.grammar.rule_name(*id))
            .unwrap_or_else(|| self.grammar.rule_name(0));
        self.errors.push(ParseError {
            kind,
            filename: self.filename.to_string(),
            line: pos.line,
            col: pos.col,
            offset: pos.offset,
            rule: rule.to_string(),
            message,
        });
    }

    fn trace(&self, tag: char, name: &str) {
        let pos = self.scan.pos();
        eprintln!(
            "{}{tag} {name} {}:{}:{}",
            " ".repeat(self.depth),
            pos.line,
            pos.col,
            pos.offset
        );
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic in semantic action".to_string()
    }
}

//! Import resolution: walk an expression left to right, replace every
//! import node with the expression it references, and enforce chaining,
//! cycle, origin and integrity rules along the way.
//!
//! The resolution stack of in-flight targets is task-local; only the
//! optional content cache is shared.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use marlang::canon;
use marlang::{
    Binding, Chunk, Expr, Fetchable, Import, ImportMode, LocalKind, OpCode, ParseOptions, TextLit,
};
use sha2::{Digest, Sha256};

use crate::cache::{lock_slot, Cache};
use crate::error::{ErrorKind, FetchError, ResolveError};
use crate::fetch::{EnvReader, FileReader, HttpFetcher, OsEnv, OsFiles, ReqwestFetcher};

/// Cooperative cancellation for a resolution in progress. Checked at every
/// fetch suspension point.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct LoadOptions {
    pub files: Box<dyn FileReader>,
    pub env: Box<dyn EnvReader>,
    pub http: Box<dyn HttpFetcher>,
    pub cache: Option<Cache>,
    pub max_depth: usize,
    pub timeout: Duration,
    pub cancel: CancelToken,
}

impl Default for LoadOptions {
    fn default() -> LoadOptions {
        LoadOptions {
            files: Box::new(OsFiles::default()),
            env: Box::new(OsEnv),
            http: Box::new(ReqwestFetcher::new()),
            cache: None,
            max_depth: 64,
            timeout: Duration::from_secs(30),
            cancel: CancelToken::new(),
        }
    }
}

/// Resolve every import in `expr` with default options.
pub fn load(expr: Expr) -> Result<Expr, ResolveError> {
    load_with(expr, &LoadOptions::default())
}

pub fn load_with(expr: Expr, opts: &LoadOptions) -> Result<Expr, ResolveError> {
    Task { opts, stack: Vec::new() }.walk(expr)
}

struct Task<'a> {
    opts: &'a LoadOptions,
    stack: Vec<Fetchable>,
}

impl Task<'_> {
    fn walk(&mut self, e: Expr) -> Result<Expr, ResolveError> {
        match e {
            Expr::Import(imp) => self.resolve_import(imp),
            Expr::Op { op: OpCode::ImportAlt, lhs, rhs } => match self.walk(*lhs) {
                Ok(resolved) => Ok(resolved),
                Err(err) if err.recoverable() => self.walk(*rhs),
                Err(err) => Err(err),
            },
            Expr::Lambda { label, ty, body } => Ok(Expr::Lambda {
                label,
                ty: Box::new(self.walk(*ty)?),
                body: Box::new(self.walk(*body)?),
            }),
            Expr::Pi { label, ty, body } => Ok(Expr::Pi {
                label,
                ty: Box::new(self.walk(*ty)?),
                body: Box::new(self.walk(*body)?),
            }),
            Expr::App { func, arg } => Ok(Expr::App {
                func: Box::new(self.walk(*func)?),
                arg: Box::new(self.walk(*arg)?),
            }),
            Expr::Let { bindings, body } => {
                let mut out = Vec::with_capacity(bindings.len());
                for b in bindings {
                    out.push(Binding {
                        label: b.label,
                        annot: match b.annot {
                            Some(a) => Some(self.walk(a)?),
                            None => None,
                        },
                        value: self.walk(b.value)?,
                    });
                }
                Ok(Expr::Let { bindings: out, body: Box::new(self.walk(*body)?) })
            }
            Expr::Annot { expr, ty } => Ok(Expr::Annot {
                expr: Box::new(self.walk(*expr)?),
                ty: Box::new(self.walk(*ty)?),
            }),
            Expr::BoolIf { cond, then_branch, else_branch } => Ok(Expr::BoolIf {
                cond: Box::new(self.walk(*cond)?),
                then_branch: Box::new(self.walk(*then_branch)?),
                else_branch: Box::new(self.walk(*else_branch)?),
            }),
            Expr::Op { op, lhs, rhs } => Ok(Expr::Op {
                op,
                lhs: Box::new(self.walk(*lhs)?),
                rhs: Box::new(self.walk(*rhs)?),
            }),
            Expr::TextLit(t) => {
                let mut chunks = Vec::with_capacity(t.chunks.len());
                for c in t.chunks {
                    chunks.push(Chunk { prefix: c.prefix, expr: self.walk(c.expr)? });
                }
                Ok(Expr::TextLit(TextLit { chunks, suffix: t.suffix }))
            }
            Expr::EmptyList { ty } => Ok(Expr::EmptyList { ty: Box::new(self.walk(*ty)?) }),
            Expr::NonEmptyList(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.walk(item)?);
                }
                Ok(Expr::NonEmptyList(out))
            }
            Expr::Record(fields) => {
                let mut out = std::collections::BTreeMap::new();
                for (k, v) in fields {
                    out.insert(k, self.walk(v)?);
                }
                Ok(Expr::Record(out))
            }
            Expr::RecordLit(fields) => {
                let mut out = std::collections::BTreeMap::new();
                for (k, v) in fields {
                    out.insert(k, self.walk(v)?);
                }
                Ok(Expr::RecordLit(out))
            }
            Expr::UnionType(alts) => {
                let mut out = std::collections::BTreeMap::new();
                for (k, v) in alts {
                    out.insert(
                        k,
                        match v {
                            Some(t) => Some(self.walk(t)?),
                            None => None,
                        },
                    );
                }
                Ok(Expr::UnionType(out))
            }
            Expr::Field { record, label } => {
                Ok(Expr::Field { record: Box::new(self.walk(*record)?), label })
            }
            Expr::Merge { handler, union, annot } => Ok(Expr::Merge {
                handler: Box::new(self.walk(*handler)?),
                union: Box::new(self.walk(*union)?),
                annot: match annot {
                    Some(a) => Some(Box::new(self.walk(*a)?)),
                    None => None,
                },
            }),
            Expr::Some(inner) => Ok(Expr::Some(Box::new(self.walk(*inner)?))),
            leaf @ (Expr::Var { .. }
            | Expr::BoolLit(_)
            | Expr::NaturalLit(_)
            | Expr::IntegerLit(_)
            | Expr::DoubleLit(_)
            | Expr::Builtin(_)) => Ok(leaf),
        }
    }

    fn resolve_import(&mut self, imp: Import) -> Result<Expr, ResolveError> {
        let target = self.chain(&imp.hashed.target)?;

        if self.stack.contains(&target) {
            return Err(ResolveError::new(ErrorKind::Cycle(target.to_string())));
        }
        if self.stack.len() >= self.opts.max_depth {
            return Err(ResolveError::new(ErrorKind::TooDeep(self.opts.max_depth)));
        }

        let result = match self.opts.cache.clone() {
            Some(cache) => {
                let slot = cache.slot((target.clone(), imp.hashed.digest.clone()));
                let mut guard = lock_slot(&slot);
                match &*guard {
                    Some(hit) => Ok(hit.clone()),
                    None => match self.fetch_and_decode(&target, &imp) {
                        Ok(resolved) => {
                            *guard = Some(resolved.clone());
                            Ok(resolved)
                        }
                        Err(e) => Err(e),
                    },
                }
            }
            None => self.fetch_and_decode(&target, &imp),
        };
        result.map_err(|e| e.in_import(&target))
    }

    /// Fetch the chained target, decode per import mode, recursively
    /// resolve, and verify closedness and the pinned digest.
    fn fetch_and_decode(&mut self, target: &Fetchable, imp: &Import) -> Result<Expr, ResolveError> {
        if self.opts.cancel.is_cancelled() {
            return Err(ResolveError::new(ErrorKind::Cancelled));
        }

        let parent_origin = self.parent_origin();
        let bytes = self.fetch(target, parent_origin.as_deref())?;

        let resolved = match imp.mode {
            ImportMode::RawText => {
                let text = String::from_utf8(bytes).map_err(|_| {
                    ResolveError::new(FetchError::Other(
                        "imported raw text is not valid UTF-8".to_string(),
                    ))
                })?;
                Expr::TextLit(TextLit::from_suffix(text))
            }
            ImportMode::Code => {
                let parsed =
                    marlang::parse(&target.to_string(), &bytes, &ParseOptions::default())
                        .map_err(|e| ResolveError::new(ErrorKind::Parse(e)))?;
                self.stack.push(target.clone());
                let result = self.walk(parsed);
                self.stack.pop();
                let resolved = result?;
                if !resolved.is_closed() {
                    return Err(ResolveError::new(ErrorKind::UnboundImport));
                }
                resolved
            }
        };

        if let Some(want) = &imp.hashed.digest {
            let got = hex::encode(Sha256::digest(canon::canonical_bytes(&resolved)));
            if got != *want {
                return Err(ResolveError::new(ErrorKind::Integrity {
                    want: want.clone(),
                    got,
                }));
            }
        }
        Ok(resolved)
    }

    fn fetch(&self, target: &Fetchable, parent_origin: Option<&str>) -> Result<Vec<u8>, ResolveError> {
        match target {
            Fetchable::Local { .. } => {
                let path = local_os_path(target);
                self.opts.files.read(std::path::Path::new(&path)).map_err(ResolveError::new)
            }
            Fetchable::Remote(url) => {
                let resp = self
                    .opts
                    .http
                    .get(url, parent_origin, self.opts.timeout)
                    .map_err(ResolveError::new)?;
                if let Some(parent) = parent_origin {
                    let target_origin = origin_of(url);
                    if parent != target_origin {
                        let allowed = match &resp.allow_origin {
                            Some(acao) => acao == "*" || acao == parent,
                            None => false,
                        };
                        if !allowed {
                            return Err(ResolveError::new(ErrorKind::Cors(format!(
                                "origin {parent} is not allowed to read {url}"
                            ))));
                        }
                    }
                }
                Ok(resp.body)
            }
            Fetchable::Env(name) => match self.opts.env.get(name) {
                Some(value) => Ok(value.into_bytes()),
                None => Err(ResolveError::new(FetchError::EnvUnset(name.clone()))),
            },
            Fetchable::Missing => Err(ResolveError::new(ErrorKind::Missing)),
        }
    }

    /// Re-root a relative local target against the importing document. The
    /// parent is the top of the resolution stack; absolute paths, `~`,
    /// environment variables and remote URLs ignore it. A remote parent may
    /// only reach further remote documents.
    fn chain(&self, cur: &Fetchable) -> Result<Fetchable, ResolveError> {
        let parent = match self.stack.last() {
            Some(p) => p,
            None => return Ok(cur.clone()),
        };
        match (parent, cur) {
            (
                Fetchable::Local { .. },
                Fetchable::Local { kind: LocalKind::Here | LocalKind::Parent, .. },
            ) => {
                let base = parent.to_string();
                let rel = rel_path(cur);
                let combined = clean_path(&join_path(dirname(&base), &rel));
                Ok(Fetchable::local(&combined))
            }
            (
                Fetchable::Remote(purl),
                Fetchable::Local { kind: LocalKind::Here | LocalKind::Parent, .. },
            ) => {
                let rel = rel_path(cur);
                let joined = purl.join(&rel).map_err(|e| {
                    ResolveError::new(FetchError::Other(format!(
                        "cannot chain {cur} onto {purl}: {e}"
                    )))
                })?;
                Ok(Fetchable::Remote(joined))
            }
            (Fetchable::Remote(_), Fetchable::Local { .. }) | (Fetchable::Remote(_), Fetchable::Env(_)) => {
                Err(ResolveError::new(ErrorKind::Cors(format!(
                    "remote import may not access {cur}"
                ))))
            }
            _ => Ok(cur.clone()),
        }
    }

    /// The origin of the nearest remote ancestor, or `None` for the local
    /// sentinel.
    fn parent_origin(&self) -> Option<String> {
        self.stack.iter().rev().find_map(|f| match f {
            Fetchable::Remote(url) => Some(origin_of(url)),
            _ => None,
        })
    }
}

fn origin_of(url: &url::Url) -> String {
    let host = url.host_str().unwrap_or("");
    match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    }
}

/// The target as a path relative to its parent's directory.
fn rel_path(f: &Fetchable) -> String {
    match f {
        Fetchable::Local { kind: LocalKind::Parent, path } => format!("../{path}"),
        Fetchable::Local { path, .. } => path.clone(),
        _ => f.to_string(),
    }
}

/// OS path for a local target; `~` expands through HOME.
fn local_os_path(f: &Fetchable) -> String {
    match f {
        Fetchable::Local { kind: LocalKind::Home, path } => match std::env::var("HOME") {
            Ok(home) => format!("{home}/{path}"),
            Err(_) => format!("~/{path}"),
        },
        other => other.to_string(),
    }
}

fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(i) => &path[..i],
        None => "",
    }
}

fn join_path(dir: &str, rel: &str) -> String {
    if dir.is_empty() {
        rel.to_string()
    } else {
        format!("{dir}/{rel}")
    }
}

/// Lexically normalize a slash-separated path: drop `.` segments and fold
/// `..` against preceding components, keeping any leading `..` run.
fn clean_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut stack: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => match stack.last() {
                Some(&"..") => stack.push(".."),
                Some(_) => {
                    stack.pop();
                }
                None if absolute => {}
                None => stack.push(".."),
            },
            other => stack.push(other),
        }
    }
    let joined = stack.join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

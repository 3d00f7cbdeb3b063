use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use importcore::{
    load, load_with, Cache, CancelToken, EnvReader, ErrorKind, FetchError, HttpFetcher,
    HttpResponse, LoadOptions,
};
use marlang::canon;
use marlang::{parse_str, Expr, Fetchable, Import, ImportMode, OpCode};
use pretty_assertions::assert_eq;
use sha2::{Digest, Sha256};
use url::Url;

fn digest_of(e: &Expr) -> String {
    hex::encode(Sha256::digest(canon::canonical_bytes(e)))
}

#[test]
fn matching_digest_is_accepted() {
    std::env::set_var("MARL_P1_SUM", "2 + 2");
    let want = digest_of(&Expr::op(OpCode::Plus, Expr::NaturalLit(2), Expr::NaturalLit(2)));
    let imp = Import::new(Fetchable::env("MARL_P1_SUM"), ImportMode::Code).with_digest(want);
    let resolved = load(Expr::Import(imp)).unwrap();
    assert_eq!(
        resolved,
        Expr::op(OpCode::Plus, Expr::NaturalLit(2), Expr::NaturalLit(2))
    );
}

#[test]
fn digest_mismatch_is_an_integrity_violation() {
    std::env::set_var("MARL_P2_SUM", "2 + 2");
    let imp = Import::new(Fetchable::env("MARL_P2_SUM"), ImportMode::Code)
        .with_digest("0".repeat(64));
    let err = load(Expr::Import(imp)).unwrap_err();
    match err.kind {
        ErrorKind::Integrity { want, got } => {
            assert_eq!(want, "0".repeat(64));
            assert_eq!(
                got,
                digest_of(&Expr::op(OpCode::Plus, Expr::NaturalLit(2), Expr::NaturalLit(2)))
            );
        }
        other => panic!("expected an integrity violation, got {other}"),
    }
}

#[test]
fn missing_falls_back_through_the_alternative() {
    let e = parse_str("test.marl", "missing ? 5").unwrap();
    assert_eq!(load(e).unwrap(), Expr::NaturalLit(5));
}

#[test]
fn alternative_returns_the_right_operands_failure() {
    let e = parse_str("test.marl", "missing ? missing").unwrap();
    let err = load(e).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Missing), "{err}");
}

#[test]
fn alternative_prefers_a_successful_left_operand() {
    std::env::set_var("MARL_P3_SET", "1");
    let e = parse_str("test.marl", "env:MARL_P3_SET ? 0").unwrap();
    assert_eq!(load(e).unwrap(), Expr::NaturalLit(1));
}

#[test]
fn fetch_failures_are_recoverable() {
    let e = parse_str("test.marl", "env:MARL_P4_NOT_SET ? 7").unwrap();
    assert_eq!(load(e).unwrap(), Expr::NaturalLit(7));
}

#[test]
fn cycles_are_recoverable() {
    std::env::set_var("MARL_P5_CYC", "env:MARL_P5_CYC");
    let e = parse_str("test.marl", "env:MARL_P5_CYC ? 3").unwrap();
    assert_eq!(load(e).unwrap(), Expr::NaturalLit(3));
}

#[test]
fn parse_failures_are_recoverable() {
    std::env::set_var("MARL_P6_BAD", "1 +");
    let e = parse_str("test.marl", "env:MARL_P6_BAD ? 9").unwrap();
    assert_eq!(load(e).unwrap(), Expr::NaturalLit(9));
}

#[test]
fn integrity_failures_are_recoverable() {
    std::env::set_var("MARL_P7_VAL", "1");
    let imp = Import::new(Fetchable::env("MARL_P7_VAL"), ImportMode::Code)
        .with_digest("0".repeat(64));
    let e = Expr::op(OpCode::ImportAlt, Expr::Import(imp), Expr::NaturalLit(4));
    assert_eq!(load(e).unwrap(), Expr::NaturalLit(4));
}

#[test]
fn unbound_imports_are_not_recoverable() {
    std::env::set_var("MARL_P8_FREE", "x");
    let e = parse_str("test.marl", "env:MARL_P8_FREE ? 3").unwrap();
    let err = load(e).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::UnboundImport), "{err}");
}

#[test]
fn depth_limit_stops_deep_chains() {
    std::env::set_var("MARL_P9_D1", "env:MARL_P9_D2");
    std::env::set_var("MARL_P9_D2", "env:MARL_P9_D3");
    std::env::set_var("MARL_P9_D3", "1");

    let imp = Expr::Import(Import::new(Fetchable::env("MARL_P9_D1"), ImportMode::Code));
    let opts = LoadOptions { max_depth: 2, ..LoadOptions::default() };
    let err = load_with(imp.clone(), &opts).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::TooDeep(2)), "{err}");

    let opts = LoadOptions { max_depth: 8, ..LoadOptions::default() };
    assert_eq!(load_with(imp, &opts).unwrap(), Expr::NaturalLit(1));
}

#[test]
fn cancellation_interrupts_resolution() {
    std::env::set_var("MARL_P10_VAL", "1");
    let cancel = CancelToken::new();
    cancel.cancel();
    let opts = LoadOptions { cancel, ..LoadOptions::default() };
    let err = load_with(
        Expr::Import(Import::new(Fetchable::env("MARL_P10_VAL"), ImportMode::Code)),
        &opts,
    )
    .unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Cancelled), "{err}");
}

#[test]
fn cancellation_is_not_recoverable() {
    let cancel = CancelToken::new();
    cancel.cancel();
    let opts = LoadOptions { cancel, ..LoadOptions::default() };
    std::env::set_var("MARL_P11_VAL", "1");
    let e = parse_str("test.marl", "env:MARL_P11_VAL ? 2").unwrap();
    let err = load_with(e, &opts).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Cancelled), "{err}");
}

struct CountingEnv {
    values: HashMap<String, String>,
    hits: Mutex<HashMap<String, usize>>,
}

impl CountingEnv {
    fn new(values: &[(&str, &str)]) -> CountingEnv {
        CountingEnv {
            values: values.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            hits: Mutex::new(HashMap::new()),
        }
    }
}

impl EnvReader for CountingEnv {
    fn get(&self, name: &str) -> Option<String> {
        *self.hits.lock().unwrap().entry(name.to_string()).or_insert(0) += 1;
        self.values.get(name).cloned()
    }
}

struct SharedEnv(std::sync::Arc<CountingEnv>);

impl EnvReader for SharedEnv {
    fn get(&self, name: &str) -> Option<String> {
        self.0.get(name)
    }
}

#[test]
fn cache_deduplicates_fetches() {
    let env = std::sync::Arc::new(CountingEnv::new(&[("SHARED", "7")]));
    let imp = Expr::Import(Import::new(Fetchable::env("SHARED"), ImportMode::Code));
    let twice = Expr::NonEmptyList(vec![imp.clone(), imp.clone()]);

    let opts = LoadOptions {
        env: Box::new(SharedEnv(env.clone())),
        cache: Some(Cache::new()),
        ..LoadOptions::default()
    };
    let resolved = load_with(twice.clone(), &opts).unwrap();
    assert_eq!(
        resolved,
        Expr::NonEmptyList(vec![Expr::NaturalLit(7), Expr::NaturalLit(7)])
    );
    assert_eq!(env.hits.lock().unwrap()["SHARED"], 1);

    // without a cache the same expression fetches twice
    let env = std::sync::Arc::new(CountingEnv::new(&[("SHARED", "7")]));
    let opts = LoadOptions {
        env: Box::new(SharedEnv(env.clone())),
        cache: None,
        ..LoadOptions::default()
    };
    load_with(twice, &opts).unwrap();
    assert_eq!(env.hits.lock().unwrap()["SHARED"], 2);
}

struct TimeoutHttp;

impl HttpFetcher for TimeoutHttp {
    fn get(
        &self,
        _url: &Url,
        _origin: Option<&str>,
        _timeout: Duration,
    ) -> Result<HttpResponse, FetchError> {
        Err(FetchError::Timeout)
    }
}

#[test]
fn fetch_timeouts_are_not_recoverable() {
    let opts = LoadOptions { http: Box::new(TimeoutHttp), ..LoadOptions::default() };
    let e = parse_str("test.marl", "http://slow.test/x ? 1").unwrap();
    let err = load_with(e, &opts).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::Timeout), "{err}");
}

#[test]
fn raw_text_import_never_parses() {
    std::env::set_var("MARL_P12_RAW", "this is ] not [ marl");
    let resolved = load(Expr::Import(Import::new(
        Fetchable::env("MARL_P12_RAW"),
        ImportMode::RawText,
    )))
    .unwrap();
    assert_eq!(resolved, Expr::text("this is ] not [ marl"));
}

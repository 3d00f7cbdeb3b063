use crate::ast::Expr;
use crate::error::{ParseError, ParseErrorKind, ParseErrors};
use crate::grammar;
use crate::peg::Engine;

#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Emit a rule entry/exit trace to stderr.
    pub debug: bool,
    /// Memoize rule results for linear worst-case parsing.
    pub memoize: bool,
    /// Convert panics inside semantic actions into syntax errors.
    pub recover_panics: bool,
}

impl Default for ParseOptions {
    fn default() -> ParseOptions {
        ParseOptions { debug: false, memoize: false, recover_panics: true }
    }
}

/// Parse one source file into an expression. `filename` is used only in
/// error messages. Sources are UTF-8; a byte order mark is rejected.
pub fn parse(filename: &str, input: &[u8], opts: &ParseOptions) -> Result<Expr, ParseErrors> {
    if input.starts_with(&[0xef, 0xbb, 0xbf]) {
        return Err(ParseErrors::new(vec![ParseError {
            kind: ParseErrorKind::Encoding,
            filename: filename.to_string(),
            line: 1,
            col: 1,
            offset: 0,
            rule: "SourceFile".to_string(),
            message: "byte order mark is not allowed".to_string(),
        }]));
    }

    let mut engine = Engine::new(
        grammar::grammar(),
        filename,
        input,
        opts.memoize,
        opts.debug,
        opts.recover_panics,
    );
    match engine.run() {
        Ok(value) => match value.into_expr() {
            Ok(e) => Ok(e),
            Err(err) => Err(ParseErrors::new(vec![ParseError {
                kind: err.kind,
                filename: filename.to_string(),
                line: 1,
                col: 1,
                offset: 0,
                rule: "SourceFile".to_string(),
                message: err.message,
            }])),
        },
        Err(errors) => Err(ParseErrors::new(errors)),
    }
}

pub fn parse_str(filename: &str, input: &str) -> Result<Expr, ParseErrors> {
    parse(filename, input.as_bytes(), &ParseOptions::default())
}

use crate::lexer::{self, LexerError, Token, TokenKind};
use crate::types::{KW, Symbol, Value};
use std::collections::VecDeque;
use std::fmt;
use std::io::BufRead;

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    UnexpectedToken { found: Token, expected: String },
    UnexpectedEof(String),
    LexerError(LexerError),
    Io(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnexpectedToken { found, expected } => {
                write!(
                    f,
                    "Parse Error: Unexpected token '{}', expected {}",
                    found.kind, expected
                )
            }
            ParseError::UnexpectedEof(expected) => {
                write!(
                    f,
                    "Parse Error: Unexpected end of input, expected {}",
                    expected
                )
            }
            ParseError::LexerError(lex_err) => write!(f, "Lexer Error during parse: {}", lex_err),
            ParseError::Io(msg) => write!(f, "Parse Error: could not read input: {}", msg),
        }
    }
}

// Allow ParseError to be treated as a standard Error
impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ParseError::LexerError(lex_err) => Some(lex_err),
            _ => None,
        }
    }
}

impl From<LexerError> for ParseError {
    fn from(err: LexerError) -> Self {
        ParseError::LexerError(err)
    }
}

// Result type alias for convenience
type ParseResult<T> = Result<T, ParseError>;

/// An incremental s-expression reader over a buffered text source.
///
/// The reader consumes its input one line at a time and hands out one
/// expression per [`Reader::read`] call, so a REPL can interleave reading
/// and evaluation and a multi-line expression is assembled as more lines
/// arrive. When the source is exhausted `read` returns
/// [`Value::EndOfInput`]; exhaustion in the middle of a list or right after
/// a quote shorthand is an error.
pub struct Reader<R> {
    input: R,
    tokens: VecDeque<Token>,
    source: String,
    at_eof: bool,
}

impl<R: BufRead> Reader<R> {
    pub fn new(input: R) -> Self {
        Reader {
            input,
            tokens: VecDeque::new(),
            source: String::new(),
            at_eof: false,
        }
    }

    /// The text consumed so far. Token spans index into this string.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Reads the next expression, or `Value::EndOfInput` at end of stream.
    pub fn read(&mut self) -> ParseResult<Value> {
        match self.next_token()? {
            None => Ok(Value::EndOfInput),
            Some(token) => self.parse_expr(token),
        }
    }

    /// Discards any buffered tokens. A REPL calls this after a parse error
    /// so that leftovers of the broken form don't poison the next read.
    pub fn recover(&mut self) {
        self.tokens.clear();
    }

    fn fill(&mut self) -> ParseResult<()> {
        while self.tokens.is_empty() && !self.at_eof {
            let mut line = String::new();
            let n = self
                .input
                .read_line(&mut line)
                .map_err(|e| ParseError::Io(e.to_string()))?;
            if n == 0 {
                self.at_eof = true;
                break;
            }
            let base = self.source.len();
            self.source.push_str(&line);
            self.tokens.extend(lexer::tokenize_at(&line, base)?);
        }
        Ok(())
    }

    fn next_token(&mut self) -> ParseResult<Option<Token>> {
        self.fill()?;
        Ok(self.tokens.pop_front())
    }

    fn parse_expr(&mut self, token: Token) -> ParseResult<Value> {
        match token.kind {
            TokenKind::LParen => self.parse_list(),
            TokenKind::RParen => Err(ParseError::UnexpectedToken {
                found: token,
                expected: "an expression".to_string(),
            }),
            TokenKind::Quote => self.parse_shorthand(KW.quote),
            TokenKind::Quasiquote => self.parse_shorthand(KW.quasiquote),
            TokenKind::Unquote => self.parse_shorthand(KW.unquote),
            TokenKind::UnquoteSplicing => self.parse_shorthand(KW.unquote_splicing),
            TokenKind::String(s) => Ok(Value::string(&s)),
            TokenKind::Atom(s) => Ok(classify_atom(&s)),
        }
    }

    /// Parses the elements of a list up to the closing `)`.
    fn parse_list(&mut self) -> ParseResult<Value> {
        let mut elements: Vec<Value> = Vec::new();
        loop {
            match self.next_token()? {
                None => return Err(ParseError::UnexpectedEof("')'".to_string())),
                Some(Token {
                    kind: TokenKind::RParen,
                    ..
                }) => return Ok(Value::list(elements)),
                Some(token) => elements.push(self.parse_expr(token)?),
            }
        }
    }

    /// Reads the expression following a quote-family shorthand and wraps it
    /// as `(keyword expr)`.
    fn parse_shorthand(&mut self, keyword: Symbol) -> ParseResult<Value> {
        match self.next_token()? {
            None => Err(ParseError::UnexpectedEof(format!(
                "an expression after {}",
                keyword
            ))),
            Some(token) => Ok(Value::list(vec![
                Value::Symbol(keyword),
                self.parse_expr(token)?,
            ])),
        }
    }
}

/// Classify a bare atom: `#t`/`#f`, then integer, then float, then symbol.
fn classify_atom(text: &str) -> Value {
    match text {
        "#t" => Value::Boolean(true),
        "#f" => Value::Boolean(false),
        _ => {
            if let Ok(n) = text.parse::<i64>() {
                return Value::Integer(n);
            }
            if looks_numeric(text)
                && let Ok(n) = text.parse::<f64>()
            {
                return Value::Float(n);
            }
            Value::Symbol(Symbol::new(text))
        }
    }
}

// f64::from_str accepts words like "inf" and "NaN"; restrict the float path
// to digit-bearing atoms so those stay symbols.
fn looks_numeric(text: &str) -> bool {
    text.bytes().any(|b| b.is_ascii_digit())
        && text
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'+' | b'-' | b'.' | b'e' | b'E'))
}

/// Lex and parse exactly one expression from a string (useful for tests and
/// for host code holding a complete script).
pub fn read_str(input: &str) -> ParseResult<Value> {
    let mut reader = Reader::new(std::io::Cursor::new(input));
    let expr = match reader.read()? {
        Value::EndOfInput => return Err(ParseError::UnexpectedEof("an expression".to_string())),
        expr => expr,
    };
    match reader.next_token()? {
        None => Ok(expr),
        Some(found) => Err(ParseError::UnexpectedToken {
            found,
            expected: "end of input".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::LexerErrorKind;

    // Helper for asserting successful parsing
    fn assert_parse(input: &str, expected: Value) {
        match read_str(input) {
            Ok(result) => assert_eq!(result, expected, "Input: '{}'", input),
            Err(e) => panic!("Parsing failed for input '{}': {}", input, e),
        }
    }

    // Helper for asserting parse errors by variant
    fn assert_parse_error(input: &str, expected_error_variant: &ParseError) {
        match read_str(input) {
            Ok(result) => panic!(
                "Expected parsing to fail for input '{}', but got: {:?}",
                input, result
            ),
            Err(e) => {
                assert_eq!(
                    std::mem::discriminant(&e),
                    std::mem::discriminant(expected_error_variant),
                    "Input: '{}', Expected error variant like {:?}, got: {:?}",
                    input,
                    expected_error_variant,
                    e
                );
            }
        }
    }

    fn sym(s: &str) -> Value {
        Value::symbol(s)
    }

    fn dummy_token() -> Token {
        Token {
            kind: TokenKind::RParen,
            span: crate::source::Span::default(),
        }
    }

    #[test]
    fn test_parse_atoms() {
        assert_parse("123", Value::Integer(123));
        assert_parse("-45", Value::Integer(-45));
        assert_parse("+10", Value::Integer(10));
        assert_parse("-4.5", Value::Float(-4.5));
        assert_parse("6.02e23", Value::Float(6.02e23));
        assert_parse("1e3", Value::Float(1e3));
        assert_parse("symbol", sym("symbol"));
        assert_parse("+", sym("+"));
        assert_parse("#t", Value::Boolean(true));
        assert_parse("#f", Value::Boolean(false));
        assert_parse(r#""hello world""#, Value::string("hello world"));
        assert_parse(r#""with \"quotes\"""#, Value::string("with \"quotes\""));
    }

    #[test]
    fn test_number_like_symbols() {
        // Atoms that parse as neither integer nor float stay symbols
        assert_parse("1-2", sym("1-2"));
        assert_parse("1.2.3", sym("1.2.3"));
        assert_parse("--5", sym("--5"));
        assert_parse("1e", sym("1e"));
        assert_parse("...", sym("..."));
        // Words f64::from_str would happily accept must remain symbols
        assert_parse("inf", sym("inf"));
        assert_parse("nan", sym("nan"));
        assert_parse("#true", sym("#true"));
    }

    #[test]
    fn test_parse_empty_list() {
        assert_parse("()", Value::empty_list());
        assert_parse("( )", Value::empty_list());
    }

    #[test]
    fn test_parse_simple_list() {
        assert_parse(
            "(+ 10 20)",
            Value::list(vec![sym("+"), Value::Integer(10), Value::Integer(20)]),
        );
        assert_parse(
            "(list #t \"hello\")",
            Value::list(vec![
                sym("list"),
                Value::Boolean(true),
                Value::string("hello"),
            ]),
        );
    }

    #[test]
    fn test_parse_nested_list() {
        assert_parse(
            "(a (b c) d)",
            Value::list(vec![
                sym("a"),
                Value::list(vec![sym("b"), sym("c")]),
                sym("d"),
            ]),
        );
        assert_parse(
            "(()())",
            Value::list(vec![Value::empty_list(), Value::empty_list()]),
        );
    }

    #[test]
    fn test_parse_quote_family_sugar() {
        assert_parse("'a", Value::list(vec![sym("quote"), sym("a")]));
        assert_parse(
            "'(1 2)",
            Value::list(vec![
                sym("quote"),
                Value::list(vec![Value::Integer(1), Value::Integer(2)]),
            ]),
        );
        assert_parse("`x", Value::list(vec![sym("quasiquote"), sym("x")]));
        assert_parse(",x", Value::list(vec![sym("unquote"), sym("x")]));
        assert_parse(",@x", Value::list(vec![sym("unquote-splicing"), sym("x")]));
        assert_parse(
            "`(a ,b ,@c)",
            Value::list(vec![
                sym("quasiquote"),
                Value::list(vec![
                    sym("a"),
                    Value::list(vec![sym("unquote"), sym("b")]),
                    Value::list(vec![sym("unquote-splicing"), sym("c")]),
                ]),
            ]),
        );
        assert_parse(
            "''x",
            Value::list(vec![
                sym("quote"),
                Value::list(vec![sym("quote"), sym("x")]),
            ]),
        );
    }

    #[test]
    fn test_parse_errors() {
        let unexpected = ParseError::UnexpectedToken {
            found: dummy_token(),
            expected: String::new(),
        };
        let eof = ParseError::UnexpectedEof(String::new());

        assert_parse_error("(1 2", &eof); // EOF inside list
        assert_parse_error("(", &eof);
        assert_parse_error(")", &unexpected); // unmatched close
        assert_parse_error("(1))", &unexpected); // trailing token
        assert_parse_error("(')", &unexpected); // quote then ')'
        assert_parse_error("'", &eof); // EOF after quote
        assert_parse_error("", &eof); // read_str demands one expression
    }

    #[test]
    fn test_parse_lexer_error_propagation() {
        let lexer_error = ParseError::LexerError(LexerError {
            error: LexerErrorKind::UnterminatedString,
            span: crate::source::Span::default(),
        });
        assert_parse_error("\"", &lexer_error);
        assert_parse_error("(1 \"abc", &lexer_error);
    }

    #[test]
    fn test_whitespace_and_comments_parsing() {
        assert_parse(
            " ( + 1 2 ) ; comment",
            Value::list(vec![sym("+"), Value::Integer(1), Value::Integer(2)]),
        );
        assert_parse(
            " ; comment at start\n   'symbol   ; comment at end\n ",
            Value::list(vec![sym("quote"), sym("symbol")]),
        );
    }

    #[test]
    fn test_streaming_multiple_expressions() {
        let input = "(define x 1)\nx\n";
        let mut reader = Reader::new(std::io::Cursor::new(input));
        assert_eq!(
            reader.read().unwrap(),
            Value::list(vec![sym("define"), sym("x"), Value::Integer(1)])
        );
        assert_eq!(reader.read().unwrap(), sym("x"));
        assert_eq!(reader.read().unwrap(), Value::EndOfInput);
        // EndOfInput is sticky
        assert_eq!(reader.read().unwrap(), Value::EndOfInput);
        assert_eq!(reader.source(), input);
    }

    #[test]
    fn test_streaming_expression_spanning_lines() {
        let input = "(+ 1\n   2\n   3)\n";
        let mut reader = Reader::new(std::io::Cursor::new(input));
        assert_eq!(
            reader.read().unwrap(),
            Value::list(vec![
                sym("+"),
                Value::Integer(1),
                Value::Integer(2),
                Value::Integer(3),
            ])
        );
        assert_eq!(reader.read().unwrap(), Value::EndOfInput);
    }

    #[test]
    fn test_recover_clears_pending_tokens() {
        let mut reader = Reader::new(std::io::Cursor::new(") (+ 1 2)"));
        assert!(reader.read().is_err());
        reader.recover();
        assert_eq!(reader.read().unwrap(), Value::EndOfInput);
    }
}

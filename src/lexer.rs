use crate::source::Span;
use logos::Logos;
use std::fmt;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")] // Skip whitespace
#[logos(skip r";[^\n\r]*")] // Skip comments to end of line
#[logos(error = LexerErrorKind)]
pub enum TokenKind {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("'")]
    Quote,
    #[token("`")]
    Quasiquote,
    // ",@" must outrank "," — logos resolves this by longest match.
    #[token(",@")]
    UnquoteSplicing,
    #[token(",")]
    Unquote,
    #[token("\"", string_lexer)]
    String(String),
    /// Any run of characters that is neither whitespace nor one of the
    /// structural characters. The reader classifies atoms further into
    /// booleans, integers, floats and symbols.
    #[regex(r#"[^ \t\n\r()'"`,;]+"#, |lex| lex.slice().to_string())]
    Atom(String),
}

#[derive(Logos, Debug, PartialEq, Clone)]
enum StringContext {
    #[token("\"")]
    Quote,
    #[regex(r#"\\[ntr\\"]"#)]
    EscapedChar,
    #[regex(r#"\\[^ntr\\"]"#)]
    UnknownEscapedChar,
    #[regex(r#"[^"\\\n\r]+"#)]
    Content,
}

// String literals may not span lines; the escape set is \n \t \r \" \\.
fn string_lexer(lex: &mut logos::Lexer<TokenKind>) -> Result<String, LexerErrorKind> {
    let mut result = String::new();
    let mut string_lexer = lex.clone().morph::<StringContext>();
    while let Some(Ok(token)) = string_lexer.next() {
        match token {
            StringContext::Quote => {
                *lex = string_lexer.morph();
                return Ok(result);
            }
            StringContext::EscapedChar => {
                result.push(match string_lexer.slice().chars().nth(1) {
                    Some('n') => '\n',
                    Some('r') => '\r',
                    Some('t') => '\t',
                    Some(c) => c, // '"' and '\\' stand for themselves
                    None => unreachable!("escape regex matches two characters"),
                })
            }
            StringContext::UnknownEscapedChar => {
                if let Some(c) = string_lexer.slice().chars().nth(1) {
                    return Err(LexerErrorKind::UnknownEscapeSequence(c));
                }
            }
            StringContext::Content => result.push_str(string_lexer.slice()),
        }
    }
    Err(LexerErrorKind::UnterminatedString)
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::Quote => write!(f, "'"),
            TokenKind::Quasiquote => write!(f, "`"),
            TokenKind::Unquote => write!(f, ","),
            TokenKind::UnquoteSplicing => write!(f, ",@"),
            TokenKind::String(s) => write!(f, "\"{}\"", s),
            TokenKind::Atom(s) => write!(f, "{}", s),
        }
    }
}

/// A token paired with the byte range it covers in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Default, Debug, Clone, PartialEq)]
pub enum LexerErrorKind {
    UnterminatedString,
    UnknownEscapeSequence(char),
    #[default]
    InvalidToken,
}

impl fmt::Display for LexerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexerErrorKind::UnterminatedString => write!(f, "Unterminated string literal"),
            LexerErrorKind::UnknownEscapeSequence(c) => {
                write!(f, "Unknown escape sequence: '\\{}'", c)
            }
            LexerErrorKind::InvalidToken => write!(f, "Invalid token"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LexerError {
    pub error: LexerErrorKind,
    pub span: Span,
}

impl fmt::Display for LexerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.error, self.span)
    }
}

// std::error::Error implementation allows using `?` with other error types
impl std::error::Error for LexerError {}

// Result type alias for convenience
type LexerResult<T> = Result<T, LexerError>;

/// Tokenize a complete input string.
pub fn tokenize(input: &str) -> LexerResult<Vec<Token>> {
    tokenize_at(input, 0)
}

/// Tokenize one slice of a larger source, offsetting spans by `base` so they
/// stay global to the accumulated text (used by the incremental reader).
pub fn tokenize_at(input: &str, base: usize) -> LexerResult<Vec<Token>> {
    let mut tokens = Vec::new();
    for (result, range) in TokenKind::lexer(input).spanned() {
        let span = Span::new(base + range.start, base + range.end);
        match result {
            Ok(kind) => tokens.push(Token { kind, span }),
            Err(error) => return Err(LexerError { error, span }),
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Helper to simplify testing token sequences, ignoring spans
    fn assert_tokens(input: &str, expected: Vec<TokenKind>) {
        match tokenize(input) {
            Ok(tokens) => {
                let kinds: Vec<TokenKind> = tokens.into_iter().map(|t| t.kind).collect();
                assert_eq!(kinds, expected, "Input: '{}'", input);
            }
            Err(e) => panic!("Lexing failed for input '{}': {}", input, e),
        }
    }

    // Helper to simplify testing for lexer errors
    fn assert_lexer_error(input: &str, expected_error_variant: LexerErrorKind) {
        match tokenize(input) {
            Ok(tokens) => panic!(
                "Expected lexing to fail for input '{}', but got tokens: {:?}",
                input, tokens
            ),
            Err(e) => {
                assert_eq!(
                    std::mem::discriminant(&e.error),
                    std::mem::discriminant(&expected_error_variant),
                    "Input: '{}', Expected error variant like {:?}, got: {:?}",
                    input,
                    expected_error_variant,
                    e
                );
            }
        }
    }

    fn atom(s: &str) -> TokenKind {
        TokenKind::Atom(s.to_string())
    }

    #[test]
    fn test_empty_input() {
        assert_tokens("", vec![]);
        assert_tokens("   \t\n", vec![]);
    }

    #[test]
    fn test_parentheses_and_quote_family() {
        assert_tokens("()", vec![TokenKind::LParen, TokenKind::RParen]);
        assert_tokens(" ' ", vec![TokenKind::Quote]);
        assert_tokens("`", vec![TokenKind::Quasiquote]);
        assert_tokens(",", vec![TokenKind::Unquote]);
        assert_tokens(",@", vec![TokenKind::UnquoteSplicing]);
        assert_tokens(
            "`(,a ,@b)",
            vec![
                TokenKind::Quasiquote,
                TokenKind::LParen,
                TokenKind::Unquote,
                atom("a"),
                TokenKind::UnquoteSplicing,
                atom("b"),
                TokenKind::RParen,
            ],
        );
    }

    #[test]
    fn test_atoms() {
        assert_tokens("foo", vec![atom("foo")]);
        assert_tokens("+", vec![atom("+")]);
        assert_tokens("123", vec![atom("123")]);
        assert_tokens("45.67", vec![atom("45.67")]);
        assert_tokens("#t #f", vec![atom("#t"), atom("#f")]);
        assert_tokens("a-symbol-with-hyphens", vec![atom("a-symbol-with-hyphens")]);
        assert_tokens("1.2.3", vec![atom("1.2.3")]);
        // Quote characters terminate an atom
        assert_tokens("ab'cd", vec![atom("ab"), TokenKind::Quote, atom("cd")]);
    }

    #[test]
    fn test_strings() {
        assert_tokens(r#""hello""#, vec![TokenKind::String("hello".to_string())]);
        assert_tokens(
            r#""with space""#,
            vec![TokenKind::String("with space".to_string())],
        );
        assert_tokens(
            r#""esc \" \n \t \\""#,
            vec![TokenKind::String("esc \" \n \t \\".to_string())],
        );
        assert_tokens(
            r#""a,b;c'd""#,
            vec![TokenKind::String("a,b;c'd".to_string())],
        );
    }

    #[test]
    fn test_sequences_and_whitespace() {
        assert_tokens(
            "  ( define x 10 )  ",
            vec![
                TokenKind::LParen,
                atom("define"),
                atom("x"),
                atom("10"),
                TokenKind::RParen,
            ],
        );
    }

    #[test]
    fn test_comments() {
        let input = "
            (define x 10) ; Define x
            ; Another comment line
              (+ x 5)  ; Add 5 to x
              ; Final comment";
        assert_tokens(
            input,
            vec![
                TokenKind::LParen,
                atom("define"),
                atom("x"),
                atom("10"),
                TokenKind::RParen,
                TokenKind::LParen,
                atom("+"),
                atom("x"),
                atom("5"),
                TokenKind::RParen,
            ],
        );
        assert_tokens("; only comment", vec![]);
        assert_tokens(";", vec![]);
    }

    #[test]
    fn test_spans() {
        let tokens = tokenize("(ab 1)").unwrap();
        assert_eq!(tokens[0].span, Span::new(0, 1));
        assert_eq!(tokens[1].span, Span::new(1, 3));
        assert_eq!(tokens[2].span, Span::new(4, 5));
        assert_eq!(tokens[3].span, Span::new(5, 6));

        // tokenize_at shifts spans into the global text
        let shifted = tokenize_at("(ab 1)", 100).unwrap();
        assert_eq!(shifted[1].span, Span::new(101, 103));
    }

    #[test]
    fn test_unterminated_string() {
        assert_lexer_error(r#""hello"#, LexerErrorKind::UnterminatedString);
        assert_lexer_error(r#""hello\""#, LexerErrorKind::UnterminatedString);
    }

    #[test]
    fn test_invalid_escape() {
        assert_lexer_error(r#""hello \a""#, LexerErrorKind::UnknownEscapeSequence('a'));
    }
}

use crate::reader::ParseError;
use ariadne::{Label, Report, ReportKind, Source};

impl ParseError {
    /// Renders a source-annotated report for a reader failure to stderr.
    /// `input` must be the text the offending spans index into (the
    /// reader's accumulated source).
    pub fn pretty_print(&self, input: &str) {
        let report = match self {
            ParseError::UnexpectedToken { found, expected } => {
                Report::build(ReportKind::Error, ("REPL", found.span.to_range()))
                    .with_message(format!("Unexpected token: {}", found.kind))
                    .with_label(
                        Label::new(("REPL", found.span.to_range()))
                            .with_message(format!("Expected {expected}")),
                    )
            }
            ParseError::UnexpectedEof(expected) => {
                let at = if input.is_empty() {
                    0..0
                } else {
                    input.len() - 1..input.len()
                };
                Report::build(ReportKind::Error, ("REPL", at.clone()))
                    .with_message("Unexpected end of input")
                    .with_label(Label::new(("REPL", at)).with_message(format!("Expected {expected}")))
            }
            ParseError::LexerError(lex_err) => {
                Report::build(ReportKind::Error, ("REPL", lex_err.span.to_range()))
                    .with_message("Lexer Error")
                    .with_label(
                        Label::new(("REPL", lex_err.span.to_range()))
                            .with_message(lex_err.error.to_string()),
                    )
            }
            ParseError::Io(message) => Report::build(ReportKind::Error, ("REPL", 0..0))
                .with_message(format!("Could not read input: {message}")),
        };
        if report.finish().eprint(("REPL", Source::from(input))).is_err() {
            // Fall back to the plain message if the terminal rejects us
            eprintln!("{}", self);
        }
    }
}

use rustyline::error::ReadlineError;
use rustyline::highlight::MatchingBracketHighlighter;
use rustyline::validate::MatchingBracketValidator;
use rustyline::{Cmd, Editor, EventHandler, KeyCode, KeyEvent, Modifiers};
use rustyline::{Completer, Helper, Highlighter, Hinter, Validator};
use schemelet::{Interpreter, ReadOnlyFileSystem, Reader, Value};
use std::io::Cursor;
use std::rc::Rc;

#[derive(Completer, Helper, Highlighter, Hinter, Validator)]
struct InputValidator {
    #[rustyline(Validator)]
    brackets: MatchingBracketValidator,
    #[rustyline(Highlighter)]
    highlighter: MatchingBracketHighlighter,
}

fn main() -> rustyline::Result<()> {
    println!("schemelet REPL v{}", env!("CARGO_PKG_VERSION"));
    println!("Type 'exit' or press Ctrl-D to quit.");

    let interpreter =
        Interpreter::with_extensions(Vec::new(), Some(Rc::new(ReadOnlyFileSystem)));
    let h = InputValidator {
        brackets: MatchingBracketValidator::new(),
        highlighter: MatchingBracketHighlighter::new(),
    };
    let mut rl = Editor::new()?;
    rl.set_helper(Some(h));
    rl.bind_sequence(
        KeyEvent(KeyCode::Char('s'), Modifiers::CTRL),
        EventHandler::Simple(Cmd::Newline),
    );
    if rl.load_history("schemelet_history.txt").is_err() {
        println!("No previous history.");
    }

    loop {
        let readline = rl.readline("schemelet> ");
        match readline {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let trimmed_input = line.trim();
                if trimmed_input.is_empty() {
                    continue;
                }
                if trimmed_input.eq_ignore_ascii_case("exit") {
                    break;
                }

                // The bracket validator delivers balanced input, but one
                // entry may still hold several expressions.
                let mut reader = Reader::new(Cursor::new(line.as_str()));
                loop {
                    match reader.read() {
                        Ok(Value::EndOfInput) => break,
                        Ok(expr) => match interpreter.expand_and_evaluate(expr) {
                            Ok(Value::Unit) => {}
                            Ok(value) => println!("{}", value),
                            Err(e) => eprintln!("{}", e),
                        },
                        Err(parse_err) => {
                            parse_err.pretty_print(reader.source());
                            break;
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl-C
                println!("Interrupted. Type 'exit' or Ctrl-D to quit.");
            }
            Err(ReadlineError::Eof) => {
                // Ctrl-D
                println!("\nExiting.");
                break;
            }
            Err(err) => {
                eprintln!("Readline Error: {:?}", err);
                break;
            }
        }
    }
    rl.save_history("schemelet_history.txt")
}

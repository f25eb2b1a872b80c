use schemelet::{Interpreter, ReadOnlyFileSystem, Value};
use std::io::{BufReader, Write};
use std::rc::Rc;

// With one argument: evaluate that file and print its last value. With
// none: a plain REPL over stdin/stdout.
fn main() {
    let mut args = std::env::args().skip(1);
    let interpreter =
        Interpreter::with_extensions(Vec::new(), Some(Rc::new(ReadOnlyFileSystem)));

    match args.next() {
        Some(path) => {
            let stream = match interpreter.accessor().open_read(&path) {
                Ok(stream) => stream,
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(1);
                }
            };
            match interpreter.evaluate(BufReader::new(stream)) {
                Ok(Value::Unit) => {}
                Ok(value) => println!("{}", value),
                Err(e) => {
                    eprintln!("{}", e);
                    std::process::exit(1);
                }
            }
        }
        None => {
            let stdin = std::io::stdin();
            let mut stdout = std::io::stdout();
            let headers = [concat!("schemelet v", env!("CARGO_PKG_VERSION"))];
            if let Err(e) =
                interpreter.repl(stdin.lock(), &mut stdout, Some("> "), &headers)
            {
                let _ = writeln!(std::io::stderr(), "{}", e);
                std::process::exit(1);
            }
        }
    }
}

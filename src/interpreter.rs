use crate::environment::Environment;
use crate::evaluator::{self, EvalError};
use crate::expander::{self, MacroTable};
use crate::host::{DisabledFileSystem, FileSystemAccessor, native1};
use crate::primitives;
use crate::reader::{ParseError, Reader};
use crate::types::{Symbol, Value};
use std::cell::RefCell;
use std::fmt;
use std::io::{BufRead, Cursor, Read, Write};
use std::rc::Rc;

/// The bootstrap script embedded as a resource; it defines `let`, `cond`
/// and the other pure-script conveniences.
const BOOTSTRAP: &str = include_str!("init.ss");

/// Optional host-side bootstrap, discovered next to the host executable.
const HOST_INIT_FILE: &str = ".init.ss";

// --- Top-level error ---

/// Any failure a session driver can surface: a reader failure or an
/// expansion/evaluation failure.
#[derive(Debug)]
pub enum Error {
    Parse(ParseError),
    Eval(EvalError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse(e) => write!(f, "{}", e),
            Error::Eval(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Parse(e) => Some(e),
            Error::Eval(e) => Some(e),
        }
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::Parse(err)
    }
}

impl From<EvalError> for Error {
    fn from(err: EvalError) -> Self {
        Error::Eval(err)
    }
}

// --- Extensions ---

/// What an extension factory sees of the interpreter under construction.
pub struct ExtensionContext<'a> {
    pub accessor: &'a Rc<dyn FileSystemAccessor>,
    /// The environment the new layer will enclose.
    pub env: &'a Rc<RefCell<Environment>>,
}

/// A host extension factory: returns the bindings of one environment layer.
pub type Extension = Box<dyn Fn(&ExtensionContext) -> Vec<(Symbol, Value)>>;

// --- Interpreter ---

/// An embeddable interpreter instance: an environment chain seeded with the
/// built-ins and host layers, a macro table, and a file-system accessor.
///
/// A single instance is not thread-safe; hosts needing concurrency must
/// serialize calls or keep one interpreter per worker. Symbol identity is
/// the only state shared across instances.
pub struct Interpreter {
    global: Rc<RefCell<Environment>>,
    macros: Rc<RefCell<MacroTable>>,
    accessor: Rc<dyn FileSystemAccessor>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Interpreter::new()
    }
}

impl Interpreter {
    /// An interpreter with the built-ins only and all file access rejected.
    pub fn new() -> Self {
        Interpreter::with_extensions(Vec::new(), None)
    }

    /// Builds the environment chain: empty root, built-ins layer, then one
    /// layer per extension, in order. The innermost layer is the global
    /// environment user definitions land in. Afterwards the embedded
    /// bootstrap is evaluated, then `.init.ss` next to the host executable
    /// if the accessor can open it.
    pub fn with_extensions(
        extensions: Vec<Extension>,
        accessor: Option<Rc<dyn FileSystemAccessor>>,
    ) -> Self {
        let accessor: Rc<dyn FileSystemAccessor> =
            accessor.unwrap_or_else(|| Rc::new(DisabledFileSystem));

        let root = Environment::new();
        let builtins = Environment::new_enclosed(root);
        primitives::populate(&mut builtins.borrow_mut());

        let mut global = builtins;
        for extension in &extensions {
            let bindings = extension(&ExtensionContext {
                accessor: &accessor,
                env: &global,
            });
            let layer = Environment::new_enclosed(global);
            {
                let mut frame = layer.borrow_mut();
                for (name, value) in bindings {
                    frame.define(name, value);
                }
            }
            global = layer;
        }

        let interpreter = Interpreter {
            global,
            macros: Rc::new(RefCell::new(MacroTable::new())),
            accessor,
        };
        interpreter.install_load();
        interpreter
            .evaluate_str(BOOTSTRAP)
            .expect("embedded init.ss must evaluate cleanly");
        interpreter.load_host_init();
        interpreter
    }

    /// Reads, expands and evaluates expressions until end of input,
    /// returning the last result. The first error stops the batch.
    pub fn evaluate<R: BufRead>(&self, input: R) -> Result<Value, Error> {
        let mut reader = Reader::new(input);
        run_reader(&mut reader, &self.global, &self.macros)
    }

    /// [`Interpreter::evaluate`] over an in-memory script.
    pub fn evaluate_str(&self, text: &str) -> Result<Value, Error> {
        self.evaluate(Cursor::new(text))
    }

    /// The interactive loop: prints `headers`, then repeatedly prompts,
    /// reads one expression, evaluates it and prints the result. Errors are
    /// printed and the loop continues with the same environment and macro
    /// table. Terminates at end of input.
    pub fn repl<R: BufRead, W: Write>(
        &self,
        input: R,
        output: &mut W,
        prompt: Option<&str>,
        headers: &[&str],
    ) -> std::io::Result<()> {
        for header in headers {
            writeln!(output, "{}", header)?;
        }
        let mut reader = Reader::new(input);
        loop {
            if let Some(prompt) = prompt {
                write!(output, "{}", prompt)?;
                output.flush()?;
            }
            match reader.read() {
                Ok(Value::EndOfInput) => return Ok(()),
                Ok(expr) => match self.expand_and_evaluate(expr) {
                    // Unit prints as the empty string; skip the blank line
                    Ok(Value::Unit) => {}
                    Ok(value) => writeln!(output, "{}", value)?,
                    Err(e) => writeln!(output, "{}", e)?,
                },
                Err(e) => {
                    writeln!(output, "{}", e)?;
                    reader.recover();
                }
            }
        }
    }

    /// Expands and evaluates a single already-read expression at top level.
    pub fn expand_and_evaluate(&self, expr: Value) -> Result<Value, Error> {
        let expanded = expander::expand(&expr, &self.global, &self.macros, true)?;
        Ok(evaluator::evaluate(expanded, self.global.clone())?)
    }

    /// Injects or overwrites a top-level binding.
    pub fn define_global(&self, name: Symbol, value: Value) {
        self.global.borrow_mut().define(name, value);
    }

    /// The global environment (the innermost layer of the chain).
    pub fn global_env(&self) -> Rc<RefCell<Environment>> {
        self.global.clone()
    }

    pub fn accessor(&self) -> Rc<dyn FileSystemAccessor> {
        self.accessor.clone()
    }

    // `load` needs the interpreter's own pieces, so it is installed here
    // rather than with the other built-ins. The captures are weak to avoid
    // tying the environment chain into a cycle with itself.
    fn install_load(&self) {
        let global = Rc::downgrade(&self.global);
        let macros = Rc::downgrade(&self.macros);
        let accessor = Rc::clone(&self.accessor);
        let load = native1("load", move |path: String| {
            let mut stream = accessor.open_read(&path)?;
            let mut text = String::new();
            stream
                .read_to_string(&mut text)
                .map_err(|e| EvalError::Io(format!("cannot read '{}': {}", path, e)))?;
            let (Some(global), Some(macros)) = (global.upgrade(), macros.upgrade()) else {
                return Err(EvalError::Io(
                    "interpreter was dropped while loading".to_string(),
                ));
            };
            run_reader(&mut Reader::new(Cursor::new(text)), &global, &macros).map_err(
                |e| match e {
                    // Reader failures inside a loaded file surface as
                    // syntax errors of the load call
                    Error::Parse(p) => EvalError::Syntax(format!("in '{}': {}", path, p)),
                    Error::Eval(e) => e,
                },
            )
        });
        self.global.borrow_mut().define(Symbol::new("load"), load);
    }

    fn load_host_init(&self) {
        let Some(path) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(HOST_INIT_FILE)))
        else {
            return;
        };
        let Some(path) = path.to_str() else { return };
        // Absent file (or an accessor that rejects reads) simply skips the
        // host bootstrap.
        let Ok(mut stream) = self.accessor.open_read(path) else {
            return;
        };
        let mut text = String::new();
        if stream.read_to_string(&mut text).is_err() {
            return;
        }
        if let Err(e) = run_reader(&mut Reader::new(Cursor::new(text)), &self.global, &self.macros)
        {
            eprintln!("error evaluating {}: {}", HOST_INIT_FILE, e);
        }
    }
}

/// The session loop shared by `evaluate`, `load` and the bootstraps: read,
/// expand, evaluate until end of input, in source order.
fn run_reader<R: BufRead>(
    reader: &mut Reader<R>,
    env: &Rc<RefCell<Environment>>,
    macros: &Rc<RefCell<MacroTable>>,
) -> Result<Value, Error> {
    let mut last = Value::empty_list();
    loop {
        let expr = reader.read()?;
        if matches!(expr, Value::EndOfInput) {
            return Ok(last);
        }
        let expanded = expander::expand(&expr, env, macros, true)?;
        last = evaluator::evaluate(expanded, env.clone())?;
    }
}

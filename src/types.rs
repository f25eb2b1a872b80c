use crate::environment::Environment;
use crate::evaluator::{EvalError, EvalResult};
use internment::Intern;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::LazyLock;

/// An interned identifier. Symbols with equal names share one entry in a
/// process-wide table, so equality and hashing are pointer-based and two
/// interpreter instances agree on symbol identity. The table never shrinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol(Intern<String>);

impl Symbol {
    pub fn new(name: &str) -> Self {
        Symbol(Intern::from_ref(name))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Symbol::new(name)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The form keywords, interned once up front so the reader, expander and
/// evaluator can compare by identity without re-interning.
pub(crate) struct Keywords {
    pub quote: Symbol,
    pub quasiquote: Symbol,
    pub unquote: Symbol,
    pub unquote_splicing: Symbol,
    pub if_: Symbol,
    pub set: Symbol,
    pub define: Symbol,
    pub define_macro: Symbol,
    pub lambda: Symbol,
    pub begin: Symbol,
    pub append: Symbol,
    pub cons: Symbol,
}

pub(crate) static KW: LazyLock<Keywords> = LazyLock::new(|| Keywords {
    quote: Symbol::new("quote"),
    quasiquote: Symbol::new("quasiquote"),
    unquote: Symbol::new("unquote"),
    unquote_splicing: Symbol::new("unquote-splicing"),
    if_: Symbol::new("if"),
    set: Symbol::new("set!"),
    define: Symbol::new("define"),
    define_macro: Symbol::new("define-macro"),
    lambda: Symbol::new("lambda"),
    begin: Symbol::new("begin"),
    append: Symbol::new("append"),
    cons: Symbol::new("cons"),
});

/// A runtime value. Programs and data share this representation: the reader
/// produces `Value` trees, the expander rewrites them, and the evaluator
/// consumes them.
#[derive(Debug, Clone)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Str(Rc<str>),
    Symbol(Symbol),
    /// A proper list. The empty list is the canonical null value.
    List(Rc<Vec<Value>>),
    /// A script-defined closure.
    Procedure(Rc<Lambda>),
    /// A host-supplied callable.
    Native(Rc<NativeProcedure>),
    /// The result of side-effecting forms (`define`, `set!`, `(begin)`,
    /// `if` with no alternate and a false test).
    Unit,
    /// Returned by the reader when the input source is exhausted. Never
    /// appears inside user data.
    EndOfInput,
}

/// The parameter shape of a script-defined procedure.
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    /// A single symbol binding the whole argument list.
    Variadic(Symbol),
    /// Positional parameters; argument count must match exactly.
    Fixed(Vec<Symbol>),
}

impl Params {
    /// Derive a parameter shape from a `lambda` parameter expression.
    pub fn from_expr(expr: &Value) -> Result<Params, EvalError> {
        match expr {
            Value::Symbol(s) => Ok(Params::Variadic(*s)),
            Value::List(items) => {
                let mut params = Vec::with_capacity(items.len());
                for item in items.iter() {
                    match item {
                        Value::Symbol(s) => {
                            if params.contains(s) {
                                return Err(EvalError::Syntax(format!(
                                    "duplicate parameter name `{s}`"
                                )));
                            }
                            params.push(*s);
                        }
                        other => {
                            return Err(EvalError::Syntax(format!(
                                "lambda parameter must be a symbol, got {other}"
                            )));
                        }
                    }
                }
                Ok(Params::Fixed(params))
            }
            other => Err(EvalError::Syntax(format!(
                "lambda parameters must be a symbol or a list of symbols, got {other}"
            ))),
        }
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Params::Variadic(s) => write!(f, "{s}"),
            Params::Fixed(params) => {
                write!(f, "(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A closure: parameter shape, body expression and the environment captured
/// at the definition site.
#[derive(Debug)]
pub struct Lambda {
    pub params: Params,
    pub body: Value,
    pub env: Rc<RefCell<Environment>>,
}

/// An opaque host-provided callable with a name for display and diagnostics.
pub struct NativeProcedure {
    pub name: String,
    pub func: Box<dyn Fn(&[Value]) -> EvalResult>,
}

impl fmt::Debug for NativeProcedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeProcedure({})", self.name)
    }
}

impl Value {
    pub fn string(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    pub fn symbol(name: &str) -> Value {
        Value::Symbol(Symbol::new(name))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(items))
    }

    pub fn empty_list() -> Value {
        Value::List(Rc::new(Vec::new()))
    }

    /// Only the boolean false is falsey; every other value, including the
    /// empty list, zero and the empty string, is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Boolean(false))
    }

    pub fn is_empty_list(&self) -> bool {
        matches!(self, Value::List(items) if items.is_empty())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Boolean(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::List(_) => "list",
            Value::Procedure(_) => "procedure",
            Value::Native(_) => "native procedure",
            Value::Unit => "unit",
            Value::EndOfInput => "end of input",
        }
    }

    /// Identity equality (`eq?`). Symbols compare by intern identity, lists
    /// and procedures by allocation; the empty list is identical to every
    /// other empty list.
    pub fn is_identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b),
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b) || (a.is_empty() && b.is_empty()),
            (Value::Procedure(a), Value::Procedure(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::Unit, Value::Unit) => true,
            (Value::EndOfInput, Value::EndOfInput) => true,
            _ => false,
        }
    }

}

/// Structural equality (`equal?`): values of different variants are unequal,
/// lists compare element-wise, procedures compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Procedure(a), Value::Procedure(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::Unit, Value::Unit) => true,
            (Value::EndOfInput, Value::EndOfInput) => true,
            _ => false,
        }
    }
}

fn write_escaped(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    write!(f, "\"")?;
    for c in s.chars() {
        match c {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\r' => write!(f, "\\r")?,
            '\t' => write!(f, "\\t")?,
            c => write!(f, "{c}")?,
        }
    }
    write!(f, "\"")
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Value::Integer(n) => write!(f, "{n}"),
            Value::Float(n) => {
                // Keep a decimal point so the printed form reads back as a
                // float rather than an integer.
                if n.is_finite() && n.fract() == 0.0 {
                    write!(f, "{n:.1}")
                } else {
                    write!(f, "{n}")
                }
            }
            Value::Str(s) => write_escaped(f, s),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            Value::Procedure(lambda) => {
                write!(f, "(lambda {} {})", lambda.params, lambda.body)
            }
            Value::Native(native) => write!(f, "#<NativeProcedure:{}>", native.name),
            Value::Unit => Ok(()),
            Value::EndOfInput => write!(f, "#<eof>"),
        }
    }
}

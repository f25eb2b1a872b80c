//! The bridge between host code and the interpreter: typed adapters that
//! lift plain Rust functions into callable values, and the sandboxed
//! file-system accessor every I/O primitive funnels through.

use crate::evaluator::{EvalError, EvalResult};
use crate::types::{NativeProcedure, Symbol, Value};
use std::fs::File;
use std::io::{Read, Write};
use std::rc::Rc;

// --- Typed argument conversion ---

/// Extraction of a typed argument from a `Value`. Numeric conversions widen
/// between Integer and Float; everything else must match its variant.
pub trait FromValue: Sized {
    /// Type description used in error messages.
    const EXPECTED: &'static str;

    fn from_value(value: &Value) -> Result<Self, EvalError>;
}

fn mismatch<T>(expected: &'static str, found: &Value) -> Result<T, EvalError> {
    Err(EvalError::TypeMismatch {
        expected,
        found: found.clone(),
    })
}

impl FromValue for i64 {
    const EXPECTED: &'static str = "integer";

    fn from_value(value: &Value) -> Result<Self, EvalError> {
        match value {
            Value::Integer(n) => Ok(*n),
            // A float narrows to an integer only when it is one
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => Ok(*f as i64),
            other => mismatch(Self::EXPECTED, other),
        }
    }
}

impl FromValue for f64 {
    const EXPECTED: &'static str = "number";

    fn from_value(value: &Value) -> Result<Self, EvalError> {
        match value {
            Value::Integer(n) => Ok(*n as f64),
            Value::Float(f) => Ok(*f),
            other => mismatch(Self::EXPECTED, other),
        }
    }
}

impl FromValue for bool {
    const EXPECTED: &'static str = "boolean";

    fn from_value(value: &Value) -> Result<Self, EvalError> {
        match value {
            Value::Boolean(b) => Ok(*b),
            other => mismatch(Self::EXPECTED, other),
        }
    }
}

impl FromValue for String {
    const EXPECTED: &'static str = "string";

    fn from_value(value: &Value) -> Result<Self, EvalError> {
        match value {
            Value::Str(s) => Ok(s.to_string()),
            other => mismatch(Self::EXPECTED, other),
        }
    }
}

impl FromValue for Symbol {
    const EXPECTED: &'static str = "symbol";

    fn from_value(value: &Value) -> Result<Self, EvalError> {
        match value {
            Value::Symbol(s) => Ok(*s),
            other => mismatch(Self::EXPECTED, other),
        }
    }
}

impl FromValue for Vec<Value> {
    const EXPECTED: &'static str = "list";

    fn from_value(value: &Value) -> Result<Self, EvalError> {
        match value {
            Value::List(items) => Ok(items.as_ref().clone()),
            other => mismatch(Self::EXPECTED, other),
        }
    }
}

impl FromValue for Value {
    const EXPECTED: &'static str = "value";

    fn from_value(value: &Value) -> Result<Self, EvalError> {
        Ok(value.clone())
    }
}

/// Conversion of a typed host result back into a `Value`.
pub trait IntoValue {
    fn into_value(self) -> Value;
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl IntoValue for i64 {
    fn into_value(self) -> Value {
        Value::Integer(self)
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> Value {
        Value::Float(self)
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Boolean(self)
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::string(&self)
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::string(self)
    }
}

impl IntoValue for () {
    fn into_value(self) -> Value {
        Value::Unit
    }
}

impl IntoValue for Vec<Value> {
    fn into_value(self) -> Value {
        Value::list(self)
    }
}

// --- Native procedure constructors ---

/// Wraps an erased function over the evaluated argument slice.
pub fn native<F>(name: &str, func: F) -> Value
where
    F: Fn(&[Value]) -> EvalResult + 'static,
{
    Value::Native(Rc::new(NativeProcedure {
        name: name.to_string(),
        func: Box::new(func),
    }))
}

/// Wraps an erased variadic function, enforcing a minimum argument count.
pub fn native_variadic<F>(name: &str, min_args: usize, func: F) -> Value
where
    F: Fn(&[Value]) -> EvalResult + 'static,
{
    let name_owned = name.to_string();
    native(name, move |args| {
        if args.len() < min_args {
            return Err(EvalError::Arity {
                name: name_owned.clone(),
                expected: format!("at least {}", min_args),
                got: args.len(),
            });
        }
        func(args)
    })
}

fn check_arity(name: &str, expected: usize, args: &[Value]) -> Result<(), EvalError> {
    if args.len() != expected {
        return Err(EvalError::Arity {
            name: name.to_string(),
            expected: expected.to_string(),
            got: args.len(),
        });
    }
    Ok(())
}

/// Lifts a zero-parameter host function into a callable value.
pub fn native0<R, F>(name: &str, func: F) -> Value
where
    R: IntoValue,
    F: Fn() -> Result<R, EvalError> + 'static,
{
    let name_owned = name.to_string();
    native(name, move |args| {
        check_arity(&name_owned, 0, args)?;
        func().map(IntoValue::into_value)
    })
}

/// Lifts a one-parameter host function, checking arity and coercing the
/// argument to the expected variant.
pub fn native1<A, R, F>(name: &str, func: F) -> Value
where
    A: FromValue,
    R: IntoValue,
    F: Fn(A) -> Result<R, EvalError> + 'static,
{
    let name_owned = name.to_string();
    native(name, move |args| {
        check_arity(&name_owned, 1, args)?;
        func(A::from_value(&args[0])?).map(IntoValue::into_value)
    })
}

/// Two-parameter variant of [`native1`].
pub fn native2<A, B, R, F>(name: &str, func: F) -> Value
where
    A: FromValue,
    B: FromValue,
    R: IntoValue,
    F: Fn(A, B) -> Result<R, EvalError> + 'static,
{
    let name_owned = name.to_string();
    native(name, move |args| {
        check_arity(&name_owned, 2, args)?;
        func(A::from_value(&args[0])?, B::from_value(&args[1])?).map(IntoValue::into_value)
    })
}

/// Three-parameter variant of [`native1`].
pub fn native3<A, B, C, R, F>(name: &str, func: F) -> Value
where
    A: FromValue,
    B: FromValue,
    C: FromValue,
    R: IntoValue,
    F: Fn(A, B, C) -> Result<R, EvalError> + 'static,
{
    let name_owned = name.to_string();
    native(name, move |args| {
        check_arity(&name_owned, 3, args)?;
        func(
            A::from_value(&args[0])?,
            B::from_value(&args[1])?,
            C::from_value(&args[2])?,
        )
        .map(IntoValue::into_value)
    })
}

// --- File-system accessor ---

/// Mediates every file-system touch the interpreter makes. The interpreter
/// holds exactly one accessor for its lifetime; `load` and host-defined I/O
/// primitives must funnel through it. Streams are closed by the caller that
/// opened them (dropping the box).
pub trait FileSystemAccessor {
    fn open_read(&self, path: &str) -> Result<Box<dyn Read>, EvalError>;
    fn open_write(&self, path: &str) -> Result<Box<dyn Write>, EvalError>;
}

/// The default accessor: all file access is rejected.
pub struct DisabledFileSystem;

impl FileSystemAccessor for DisabledFileSystem {
    fn open_read(&self, path: &str) -> Result<Box<dyn Read>, EvalError> {
        Err(EvalError::Io(format!(
            "file system access is disabled: cannot read '{}'",
            path
        )))
    }

    fn open_write(&self, path: &str) -> Result<Box<dyn Write>, EvalError> {
        Err(EvalError::Io(format!(
            "file system access is disabled: cannot write '{}'",
            path
        )))
    }
}

/// Delegates reads to the host file system and rejects writes.
pub struct ReadOnlyFileSystem;

impl FileSystemAccessor for ReadOnlyFileSystem {
    fn open_read(&self, path: &str) -> Result<Box<dyn Read>, EvalError> {
        match File::open(path) {
            Ok(file) => Ok(Box::new(file)),
            Err(e) => Err(EvalError::Io(format!("cannot read '{}': {}", path, e))),
        }
    }

    fn open_write(&self, path: &str) -> Result<Box<dyn Write>, EvalError> {
        Err(EvalError::Io(format!(
            "file system is read-only: cannot write '{}'",
            path
        )))
    }
}

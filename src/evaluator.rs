use crate::environment::{EnvError, Environment};
use crate::types::{KW, Lambda, Params, Value};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

// --- Evaluation Error ---
#[derive(Debug, Clone)]
pub enum EvalError {
    Env(EnvError),
    NotAProcedure(Value),
    TypeMismatch { expected: &'static str, found: Value },
    Arity { name: String, expected: String, got: usize },
    Syntax(String),
    Macro(String),
    AssertionFailed(String),
    Arithmetic(String),
    Io(String),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::Env(env_err) => write!(f, "{}", env_err),
            EvalError::NotAProcedure(value) => write!(
                f,
                "Evaluation Error: Expected a procedure, but got: {}",
                value
            ),
            EvalError::TypeMismatch { expected, found } => write!(
                f,
                "Type Error: Expected {}, but got {}: {}",
                expected,
                found.type_name(),
                found
            ),
            EvalError::Arity {
                name,
                expected,
                got,
            } => write!(
                f,
                "Arity Error: '{}' expects {} arguments, got {}",
                name, expected, got
            ),
            EvalError::Syntax(msg) => write!(f, "Syntax Error: {}", msg),
            EvalError::Macro(msg) => write!(f, "Macro Error: {}", msg),
            EvalError::AssertionFailed(msg) => write!(f, "Assertion failed: {}", msg),
            EvalError::Arithmetic(msg) => write!(f, "Arithmetic Error: {}", msg),
            EvalError::Io(msg) => write!(f, "IO Error: {}", msg),
        }
    }
}

impl std::error::Error for EvalError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EvalError::Env(env_err) => Some(env_err),
            _ => None,
        }
    }
}

// Allow easy conversion from EnvError
impl From<EnvError> for EvalError {
    fn from(err: EnvError) -> Self {
        EvalError::Env(err)
    }
}

// Result type alias for convenience
pub type EvalResult<T = Value> = Result<T, EvalError>;

/// One step of the trampoline: either a finished value, or the next
/// expression/environment pair to evaluate in tail position.
enum Trampoline {
    Done(Value),
    Continue(Value, Rc<RefCell<Environment>>),
}

/// Evaluates an expanded expression within the given environment.
///
/// Tail positions (the chosen branch of `if`, the last expression of a
/// `begin`, the body of a procedure called in tail position) rebind the
/// loop variables instead of recursing, so iterative scripts run in
/// constant stack space.
pub fn evaluate(expr: Value, env: Rc<RefCell<Environment>>) -> EvalResult {
    let mut expr = expr;
    let mut env = env;
    loop {
        match eval_step(expr, env)? {
            Trampoline::Done(value) => return Ok(value),
            Trampoline::Continue(next_expr, next_env) => {
                expr = next_expr;
                env = next_env;
            }
        }
    }
}

fn eval_step(expr: Value, env: Rc<RefCell<Environment>>) -> EvalResult<Trampoline> {
    match &expr {
        // Symbols: look up in the environment, walking outward
        Value::Symbol(name) => {
            let value = env.borrow().get(*name)?;
            Ok(Trampoline::Done(value))
        }

        // Lists: special forms or combinations
        Value::List(elements) => match &elements[..] {
            [] => Err(EvalError::Syntax(
                "cannot evaluate the empty list ()".to_string(),
            )),
            [Value::Symbol(s), rest @ ..] if *s == KW.quote => match rest {
                [operand] => Ok(Trampoline::Done(operand.clone())),
                _ => Err(EvalError::Syntax(format!(
                    "quote expects exactly one operand: {}",
                    expr
                ))),
            },
            [Value::Symbol(s), rest @ ..] if *s == KW.if_ => eval_if(rest, env, &expr),
            [Value::Symbol(s), rest @ ..] if *s == KW.define => eval_define(rest, &env, &expr),
            [Value::Symbol(s), rest @ ..] if *s == KW.set => eval_set(rest, &env, &expr),
            [Value::Symbol(s), rest @ ..] if *s == KW.lambda => eval_lambda(rest, &env, &expr),
            [Value::Symbol(s), rest @ ..] if *s == KW.begin => eval_begin(rest, env),
            [operator, operands @ ..] => {
                let procedure = evaluate(operator.clone(), env.clone())?;
                let mut args = Vec::with_capacity(operands.len());
                for operand in operands {
                    args.push(evaluate(operand.clone(), env.clone())?);
                }
                match procedure {
                    Value::Native(native) => (native.func)(&args).map(Trampoline::Done),
                    Value::Procedure(lambda) => {
                        let call_env = bind_call_env(&lambda, args)?;
                        Ok(Trampoline::Continue(lambda.body.clone(), call_env))
                    }
                    other => Err(EvalError::NotAProcedure(other)),
                }
            }
        },

        // Everything else is self-evaluating
        other => Ok(Trampoline::Done(other.clone())),
    }
}

fn eval_if(
    operands: &[Value],
    env: Rc<RefCell<Environment>>,
    form: &Value,
) -> EvalResult<Trampoline> {
    match operands {
        [test, consequent, alternate] => {
            // The test is not a tail position; the chosen branch is.
            let condition = evaluate(test.clone(), env.clone())?;
            let branch = if condition.is_truthy() {
                consequent
            } else {
                alternate
            };
            Ok(Trampoline::Continue(branch.clone(), env))
        }
        // The expander normalizes two-operand `if`, but evaluate() is a
        // public entry point, so handle the raw shape as well.
        [test, consequent] => {
            let condition = evaluate(test.clone(), env.clone())?;
            if condition.is_truthy() {
                Ok(Trampoline::Continue(consequent.clone(), env))
            } else {
                Ok(Trampoline::Done(Value::Unit))
            }
        }
        _ => Err(EvalError::Syntax(format!(
            "if expects a test, a consequent and an optional alternate: {}",
            form
        ))),
    }
}

fn eval_define(
    operands: &[Value],
    env: &Rc<RefCell<Environment>>,
    form: &Value,
) -> EvalResult<Trampoline> {
    match operands {
        [Value::Symbol(name), value_expr] => {
            let value = evaluate(value_expr.clone(), env.clone())?;
            env.borrow_mut().define(*name, value);
            Ok(Trampoline::Done(Value::Unit))
        }
        _ => Err(EvalError::Syntax(format!(
            "define expects a symbol and a value: {}",
            form
        ))),
    }
}

fn eval_set(
    operands: &[Value],
    env: &Rc<RefCell<Environment>>,
    form: &Value,
) -> EvalResult<Trampoline> {
    match operands {
        [Value::Symbol(name), value_expr] => {
            let value = evaluate(value_expr.clone(), env.clone())?;
            env.borrow_mut().set(*name, value)?;
            Ok(Trampoline::Done(Value::Unit))
        }
        _ => Err(EvalError::Syntax(format!(
            "set! expects a symbol and a value: {}",
            form
        ))),
    }
}

fn eval_lambda(
    operands: &[Value],
    env: &Rc<RefCell<Environment>>,
    form: &Value,
) -> EvalResult<Trampoline> {
    match operands {
        [params_expr, body] => {
            let params = Params::from_expr(params_expr)?;
            Ok(Trampoline::Done(Value::Procedure(Rc::new(Lambda {
                params,
                body: body.clone(),
                env: env.clone(),
            }))))
        }
        _ => Err(EvalError::Syntax(format!(
            "lambda expects a parameter shape and a body: {}",
            form
        ))),
    }
}

fn eval_begin(operands: &[Value], env: Rc<RefCell<Environment>>) -> EvalResult<Trampoline> {
    match operands {
        [] => Ok(Trampoline::Done(Value::Unit)),
        [leading @ .., last] => {
            for expr in leading {
                evaluate(expr.clone(), env.clone())?;
            }
            Ok(Trampoline::Continue(last.clone(), env))
        }
    }
}

/// Builds the call environment for a procedure: a fresh frame enclosed in
/// the captured environment, with parameters bound to arguments. A variadic
/// shape binds its single symbol to the whole argument list.
pub fn bind_call_env(
    lambda: &Lambda,
    args: Vec<Value>,
) -> EvalResult<Rc<RefCell<Environment>>> {
    let call_env = Environment::new_enclosed(lambda.env.clone());
    match &lambda.params {
        Params::Variadic(name) => {
            call_env.borrow_mut().define(*name, Value::list(args));
        }
        Params::Fixed(params) => {
            if params.len() != args.len() {
                return Err(EvalError::Arity {
                    name: "procedure".to_string(),
                    expected: params.len().to_string(),
                    got: args.len(),
                });
            }
            let mut frame = call_env.borrow_mut();
            for (param, arg) in params.iter().zip(args) {
                frame.define(*param, arg);
            }
        }
    }
    Ok(call_env)
}

/// Applies a callable to already-evaluated arguments. This is the non-tail
/// application path shared by `apply`, `map` and macro-transformer
/// invocation during expansion.
pub fn apply_procedure(callable: &Value, args: Vec<Value>) -> EvalResult {
    match callable {
        Value::Native(native) => (native.func)(&args),
        Value::Procedure(lambda) => {
            let call_env = bind_call_env(lambda, args)?;
            evaluate(lambda.body.clone(), call_env)
        }
        other => Err(EvalError::NotAProcedure(other.clone())),
    }
}

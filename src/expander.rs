use crate::environment::Environment;
use crate::evaluator::{self, EvalError, EvalResult};
use crate::types::{KW, Lambda, Symbol, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Macro transformers registered by top-level `define-macro` forms. The
/// table is per-interpreter and consulted only by the expander.
#[derive(Debug, Default)]
pub struct MacroTable {
    transformers: HashMap<Symbol, Rc<Lambda>>,
}

impl MacroTable {
    pub fn new() -> Self {
        MacroTable::default()
    }

    pub fn define(&mut self, name: Symbol, transformer: Rc<Lambda>) {
        self.transformers.insert(name, transformer);
    }

    pub fn get(&self, name: Symbol) -> Option<Rc<Lambda>> {
        self.transformers.get(&name).cloned()
    }

    pub fn contains(&self, name: Symbol) -> bool {
        self.transformers.contains_key(&name)
    }
}

/// The pre-evaluation rewrite pass: validates core forms, desugars
/// function-definition and multi-body shapes, expands quasiquotation, and
/// dispatches macro transformers by running them through the evaluator.
///
/// `top_level` tracks whether the expression sits at the outermost source
/// context (directly, or inside a `begin` whose own context is top level);
/// `define-macro` is only legal there.
pub fn expand(
    expr: &Value,
    env: &Rc<RefCell<Environment>>,
    macros: &Rc<RefCell<MacroTable>>,
    top_level: bool,
) -> EvalResult {
    let elements = match expr {
        Value::List(elements) => elements,
        // Atoms pass through unchanged
        _ => return Ok(expr.clone()),
    };

    match &elements[..] {
        [] => Err(EvalError::Syntax(
            "cannot expand the empty list ()".to_string(),
        )),
        [Value::Symbol(s), rest @ ..] if *s == KW.quote => match rest {
            [_] => Ok(expr.clone()),
            _ => Err(EvalError::Syntax(format!(
                "quote expects exactly one operand: {}",
                expr
            ))),
        },
        [Value::Symbol(s), rest @ ..] if *s == KW.if_ => expand_if(rest, env, macros, expr),
        [Value::Symbol(s), rest @ ..] if *s == KW.set => expand_set(rest, env, macros, expr),
        [Value::Symbol(s), rest @ ..] if *s == KW.define || *s == KW.define_macro => {
            expand_define(*s, rest, env, macros, top_level, expr)
        }
        [Value::Symbol(s), rest @ ..] if *s == KW.begin => {
            if rest.is_empty() {
                return Ok(Value::Unit);
            }
            // A begin preserves the top-level status of its context
            let mut expanded = Vec::with_capacity(rest.len() + 1);
            expanded.push(Value::Symbol(KW.begin));
            for sub in rest {
                expanded.push(expand(sub, env, macros, top_level)?);
            }
            Ok(Value::list(expanded))
        }
        [Value::Symbol(s), rest @ ..] if *s == KW.lambda => {
            expand_lambda(rest, env, macros, expr)
        }
        [Value::Symbol(s), rest @ ..] if *s == KW.quasiquote => match rest {
            [template] => {
                let constructed = expand_quasiquote(template)?;
                expand(&constructed, env, macros, false)
            }
            _ => Err(EvalError::Syntax(format!(
                "quasiquote expects exactly one template: {}",
                expr
            ))),
        },
        [Value::Symbol(s), ..] if *s == KW.unquote || *s == KW.unquote_splicing => {
            Err(EvalError::Syntax(format!(
                "{} is only meaningful inside quasiquote: {}",
                s, expr
            )))
        }
        [Value::Symbol(s), rest @ ..] if macros.borrow().contains(*s) => {
            expand_macro_call(*s, rest, env, macros, top_level)
        }
        _ => {
            // Ordinary combination: expand every sub-expression
            let mut expanded = Vec::with_capacity(elements.len());
            for sub in elements.iter() {
                expanded.push(expand(sub, env, macros, false)?);
            }
            Ok(Value::list(expanded))
        }
    }
}

fn expand_if(
    operands: &[Value],
    env: &Rc<RefCell<Environment>>,
    macros: &Rc<RefCell<MacroTable>>,
    form: &Value,
) -> EvalResult {
    match operands {
        // (if t c) gains Unit as its alternate
        [test, consequent] => Ok(Value::list(vec![
            Value::Symbol(KW.if_),
            expand(test, env, macros, false)?,
            expand(consequent, env, macros, false)?,
            Value::Unit,
        ])),
        [test, consequent, alternate] => Ok(Value::list(vec![
            Value::Symbol(KW.if_),
            expand(test, env, macros, false)?,
            expand(consequent, env, macros, false)?,
            expand(alternate, env, macros, false)?,
        ])),
        _ => Err(EvalError::Syntax(format!(
            "if expects a test, a consequent and an optional alternate: {}",
            form
        ))),
    }
}

fn expand_set(
    operands: &[Value],
    env: &Rc<RefCell<Environment>>,
    macros: &Rc<RefCell<MacroTable>>,
    form: &Value,
) -> EvalResult {
    match operands {
        [Value::Symbol(name), value_expr] => Ok(Value::list(vec![
            Value::Symbol(KW.set),
            Value::Symbol(*name),
            expand(value_expr, env, macros, false)?,
        ])),
        [_, _] => Err(EvalError::Syntax(format!(
            "set! requires a symbol as its first operand: {}",
            form
        ))),
        _ => Err(EvalError::Syntax(format!(
            "set! expects a symbol and a value: {}",
            form
        ))),
    }
}

fn expand_define(
    keyword: Symbol,
    operands: &[Value],
    env: &Rc<RefCell<Environment>>,
    macros: &Rc<RefCell<MacroTable>>,
    top_level: bool,
    form: &Value,
) -> EvalResult {
    match operands {
        // (define (f p…) body…) desugars to (define f (lambda (p…) body…))
        [Value::List(header), body @ ..] if !body.is_empty() => {
            let [Value::Symbol(name), params @ ..] = &header[..] else {
                return Err(EvalError::Syntax(format!(
                    "{} function shape needs a symbol to name: {}",
                    keyword, form
                )));
            };
            let mut lambda_form = Vec::with_capacity(body.len() + 2);
            lambda_form.push(Value::Symbol(KW.lambda));
            lambda_form.push(Value::list(params.to_vec()));
            lambda_form.extend(body.iter().cloned());
            let desugared = Value::list(vec![
                Value::Symbol(keyword),
                Value::Symbol(*name),
                Value::list(lambda_form),
            ]);
            expand(&desugared, env, macros, top_level)
        }
        [Value::Symbol(name), value_expr] => {
            let expanded_value = expand(value_expr, env, macros, false)?;
            if keyword == KW.define_macro {
                if !top_level {
                    return Err(EvalError::Macro(format!(
                        "define-macro is only allowed at top level: {}",
                        form
                    )));
                }
                // The transformer is realized immediately so it is available
                // to every later top-level form.
                let transformer = evaluator::evaluate(expanded_value, env.clone())?;
                let Value::Procedure(lambda) = transformer else {
                    return Err(EvalError::Macro(format!(
                        "define-macro for '{}' must yield a procedure, got {}",
                        name,
                        transformer.type_name()
                    )));
                };
                macros.borrow_mut().define(*name, lambda);
                Ok(Value::Unit)
            } else {
                Ok(Value::list(vec![
                    Value::Symbol(KW.define),
                    Value::Symbol(*name),
                    expanded_value,
                ]))
            }
        }
        [_, _] => Err(EvalError::Syntax(format!(
            "{} requires a symbol as its first operand: {}",
            keyword, form
        ))),
        _ => Err(EvalError::Syntax(format!(
            "{} expects a symbol and a value: {}",
            keyword, form
        ))),
    }
}

fn expand_lambda(
    operands: &[Value],
    env: &Rc<RefCell<Environment>>,
    macros: &Rc<RefCell<MacroTable>>,
    form: &Value,
) -> EvalResult {
    match operands {
        [params, body @ ..] if !body.is_empty() => {
            // Validate the parameter shape early so a malformed lambda is a
            // syntax error rather than a runtime surprise.
            crate::types::Params::from_expr(params)?;
            let body_expr = if let [single] = body {
                single.clone()
            } else {
                let mut wrapped = Vec::with_capacity(body.len() + 1);
                wrapped.push(Value::Symbol(KW.begin));
                wrapped.extend(body.iter().cloned());
                Value::list(wrapped)
            };
            Ok(Value::list(vec![
                Value::Symbol(KW.lambda),
                params.clone(),
                expand(&body_expr, env, macros, false)?,
            ]))
        }
        _ => Err(EvalError::Syntax(format!(
            "lambda expects a parameter shape and at least one body expression: {}",
            form
        ))),
    }
}

fn expand_macro_call(
    name: Symbol,
    operands: &[Value],
    env: &Rc<RefCell<Environment>>,
    macros: &Rc<RefCell<MacroTable>>,
    top_level: bool,
) -> EvalResult {
    let transformer = macros
        .borrow()
        .get(name)
        .expect("caller checked the macro table");
    // The transformer runs on the unevaluated operand forms; errors inside
    // it surface as expander errors.
    let expansion = evaluator::apply_procedure(
        &Value::Procedure(transformer),
        operands.to_vec(),
    )
    .map_err(|e| EvalError::Macro(format!("while expanding ({} …): {}", name, e)))?;
    // The result is itself subject to expansion at the same level
    expand(&expansion, env, macros, top_level)
}

/// Rewrites a quasiquote template into code that constructs it at runtime.
fn expand_quasiquote(template: &Value) -> EvalResult {
    let items = match template {
        Value::List(items) if !items.is_empty() => items,
        // Atoms and the empty list quote themselves
        _ => {
            return Ok(Value::list(vec![
                Value::Symbol(KW.quote),
                template.clone(),
            ]));
        }
    };

    // (unquote Y) — evaluate Y in place
    if let [Value::Symbol(s), rest @ ..] = &items[..] {
        if *s == KW.unquote {
            return match rest {
                [expr] => Ok(expr.clone()),
                _ => Err(EvalError::Syntax(format!(
                    "unquote expects exactly one operand: {}",
                    template
                ))),
            };
        }
        if *s == KW.unquote_splicing {
            return Err(EvalError::Syntax(format!(
                "unquote-splicing cannot appear at the head of a quasiquote template: {}",
                template
            )));
        }
    }

    let tail = Value::list(items[1..].to_vec());

    // ((unquote-splicing Y) …rest) — splice Y into the constructed tail
    if let Value::List(head_items) = &items[0]
        && let [Value::Symbol(s), splice_rest @ ..] = &head_items[..]
        && *s == KW.unquote_splicing
    {
        return match splice_rest {
            [expr] => Ok(Value::list(vec![
                Value::Symbol(KW.append),
                expr.clone(),
                expand_quasiquote(&tail)?,
            ])),
            _ => Err(EvalError::Syntax(format!(
                "unquote-splicing expects exactly one operand: {}",
                items[0]
            ))),
        };
    }

    Ok(Value::list(vec![
        Value::Symbol(KW.cons),
        expand_quasiquote(&items[0])?,
        expand_quasiquote(&tail)?,
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::evaluate;
    use crate::primitives;
    use crate::reader::read_str;

    struct Fixture {
        env: Rc<RefCell<Environment>>,
        macros: Rc<RefCell<MacroTable>>,
    }

    fn fixture() -> Fixture {
        let env = Environment::new();
        primitives::populate(&mut env.borrow_mut());
        Fixture {
            env,
            macros: Rc::new(RefCell::new(MacroTable::new())),
        }
    }

    impl Fixture {
        fn expand_str(&self, input: &str) -> EvalResult {
            let expr = read_str(input).expect("test input must parse");
            expand(&expr, &self.env, &self.macros, true)
        }

        // Expand then evaluate, as the session drivers do.
        fn run(&self, input: &str) -> EvalResult {
            let expanded = self.expand_str(input)?;
            evaluate(expanded, self.env.clone())
        }
    }

    fn assert_expands_to(fx: &Fixture, input: &str, expected: &str) {
        let expanded = fx.expand_str(input).expect("expansion should succeed");
        let expected = read_str(expected).expect("expected form must parse");
        assert_eq!(expanded, expected, "Input: '{}'", input);
    }

    #[test]
    fn test_atoms_pass_through() {
        let fx = fixture();
        assert_eq!(fx.expand_str("42").unwrap(), Value::Integer(42));
        assert_eq!(fx.expand_str("sym").unwrap(), Value::symbol("sym"));
        assert_eq!(fx.expand_str("\"s\"").unwrap(), Value::string("s"));
    }

    #[test]
    fn test_empty_list_is_syntax_error() {
        let fx = fixture();
        assert!(matches!(
            fx.expand_str("()").unwrap_err(),
            EvalError::Syntax(_)
        ));
    }

    #[test]
    fn test_quote_is_left_alone() {
        let fx = fixture();
        assert_expands_to(&fx, "'(if x)", "(quote (if x))");
        assert!(fx.expand_str("(quote a b)").is_err());
    }

    #[test]
    fn test_if_gains_unit_alternate() {
        let fx = fixture();
        let expanded = fx.expand_str("(if #t 1)").unwrap();
        let Value::List(items) = &expanded else {
            panic!("expected a list, got {expanded:?}");
        };
        assert_eq!(items.len(), 4);
        assert_eq!(items[3], Value::Unit);
    }

    #[test]
    fn test_define_function_shape_desugars() {
        let fx = fixture();
        assert_expands_to(
            &fx,
            "(define (sq x) (* x x))",
            "(define sq (lambda (x) (* x x)))",
        );
        // Multi-expression bodies gain a begin
        assert_expands_to(
            &fx,
            "(define (f x) (display x) x)",
            "(define f (lambda (x) (begin (display x) x)))",
        );
    }

    #[test]
    fn test_lambda_multi_body_wraps_in_begin() {
        let fx = fixture();
        assert_expands_to(&fx, "(lambda (x) 1 2)", "(lambda (x) (begin 1 2))");
        assert!(fx.expand_str("(lambda (x))").is_err());
        assert!(fx.expand_str("(lambda (x 1) x)").is_err());
        assert!(fx.expand_str("(lambda (x x) x)").is_err());
    }

    #[test]
    fn test_set_requires_symbol() {
        let fx = fixture();
        assert!(matches!(
            fx.expand_str("(set! 1 2)").unwrap_err(),
            EvalError::Syntax(_)
        ));
    }

    #[test]
    fn test_begin_collapse_and_propagation() {
        let fx = fixture();
        assert_eq!(fx.expand_str("(begin)").unwrap(), Value::Unit);
        // define-macro is legal inside a top-level begin…
        fx.expand_str("(begin (define-macro (noop x) x))").unwrap();
        assert!(fx.macros.borrow().contains(Symbol::new("noop")));
        // …but not inside a nested lambda body
        let err = fx
            .expand_str("(lambda (x) (define-macro (m y) y))")
            .unwrap_err();
        assert!(matches!(err, EvalError::Macro(_)));
    }

    #[test]
    fn test_define_macro_requires_procedure() {
        let fx = fixture();
        let err = fx.expand_str("(define-macro m 42)").unwrap_err();
        assert!(matches!(err, EvalError::Macro(_)));
    }

    #[test]
    fn test_macro_expansion_and_reexpansion() {
        let fx = fixture();
        // A `swap` macro that flips its two operand forms
        fx.expand_str(
            "(define-macro (swap a b) (list b a))",
        )
        .unwrap();
        assert_expands_to(&fx, "(swap 2 +)", "(+ 2)");
        assert_eq!(fx.run("(swap 2 +)").unwrap(), Value::Integer(2));

        // The expansion result is itself expanded: a macro producing an
        // unnormalized (if t c) form gains the Unit alternate.
        fx.expand_str("(define-macro (when-true t c) (list 'if t c))")
            .unwrap();
        let expanded = fx.expand_str("(when-true #t 5)").unwrap();
        let Value::List(items) = &expanded else {
            panic!("expected list");
        };
        assert_eq!(items.len(), 4);
    }

    #[test]
    fn test_macro_idempotence() {
        let fx = fixture();
        fx.expand_str("(define-macro (twice e) (list 'begin e e))")
            .unwrap();
        let expanded = fx.expand_str("(twice (twice 1))").unwrap();

        // Fully expanded code contains no macro heads anywhere
        fn assert_no_macro_heads(expr: &Value, macros: &MacroTable) {
            if let Value::List(items) = expr {
                if let Some(Value::Symbol(s)) = items.first() {
                    assert!(!macros.contains(*s), "unexpanded macro head {s}");
                }
                for item in items.iter() {
                    assert_no_macro_heads(item, macros);
                }
            }
        }
        assert_no_macro_heads(&expanded, &fx.macros.borrow());
    }

    #[test]
    fn test_macro_error_surfaces_as_expander_error() {
        let fx = fixture();
        fx.expand_str("(define-macro (broken x) (car '()))")
            .unwrap();
        let err = fx.expand_str("(broken 1)").unwrap_err();
        assert!(matches!(err, EvalError::Macro(_)));
    }

    #[test]
    fn test_quasiquote_plain_template_quotes() {
        let fx = fixture();
        assert_eq!(fx.run("`x").unwrap(), Value::symbol("x"));
        assert_eq!(fx.run("`7").unwrap(), Value::Integer(7));
        assert_eq!(fx.run("`()").unwrap(), Value::empty_list());
        assert_eq!(
            fx.run("`(1 2)").unwrap(),
            Value::list(vec![Value::Integer(1), Value::Integer(2)])
        );
    }

    #[test]
    fn test_quasiquote_unquote() {
        let fx = fixture();
        assert_eq!(fx.run("`(1 ,(+ 1 1) 3)").unwrap(), {
            Value::list(vec![
                Value::Integer(1),
                Value::Integer(2),
                Value::Integer(3),
            ])
        });
        // Unquote in nested position
        assert_eq!(
            fx.run("`(a (b ,(+ 2 3)))").unwrap(),
            Value::list(vec![
                Value::symbol("a"),
                Value::list(vec![Value::symbol("b"), Value::Integer(5)]),
            ])
        );
    }

    #[test]
    fn test_quasiquote_splicing() {
        let fx = fixture();
        assert_eq!(
            fx.run("`(1 ,@(list 2 3) 4)").unwrap(),
            Value::list(vec![
                Value::Integer(1),
                Value::Integer(2),
                Value::Integer(3),
                Value::Integer(4),
            ])
        );
        // Splicing at the head of the whole template is a syntax error
        assert!(fx.expand_str("`,@(list 1 2)").is_err());
    }

    #[test]
    fn test_unquote_outside_quasiquote_is_error() {
        let fx = fixture();
        assert!(matches!(
            fx.expand_str(",x").unwrap_err(),
            EvalError::Syntax(_)
        ));
        assert!(matches!(
            fx.expand_str(",@x").unwrap_err(),
            EvalError::Syntax(_)
        ));
    }
}

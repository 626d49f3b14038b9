use proptest::prelude::*;

use langexpr::expr::format::format_expr;
use langexpr::expr::lexer::tokenize;
use langexpr::expr::parser::parse;
use langexpr::{Engine, EngineError, Value};

/// Source text for arithmetic, comparison and logical expressions over
/// literals and the variable `x`.
fn expression() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        (0u32..1000).prop_map(|n| n.to_string()),
        (0u32..100, 1u32..10).prop_map(|(a, b)| format!("{a}.{b}")),
        Just("x".to_string()),
        Just("'s'".to_string()),
        Just("true".to_string()),
    ];
    leaf.prop_recursive(4, 32, 3, |inner| {
        prop_oneof![
            (
                inner.clone(),
                prop::sample::select(vec![
                    "+", "-", "*", "/", "%", "^", "==", "!=", "<", ">", "<=", ">=", "and", "or",
                ]),
                inner.clone(),
            )
                .prop_map(|(a, op, b)| format!("{a} {op} {b}")),
            inner.clone().prop_map(|a| format!("({a})")),
            inner.clone().prop_map(|a| format!("-{a}")),
            inner.clone().prop_map(|a| format!("not {a}")),
            (inner.clone(), inner.clone(), inner)
                .prop_map(|(c, a, b)| format!("({c} ? {a} : {b})")),
        ]
    })
}

fn engine() -> Engine {
    let mut e = Engine::new();
    e.set_variable("x", 3).unwrap();
    e
}

/// Outcome with NaN made comparable and errors reduced to their message.
fn outcome(result: Result<Value, EngineError>) -> Result<String, String> {
    match result {
        Ok(Value::Float(f)) if f.is_nan() => Ok("NaN".to_string()),
        Ok(v) => Ok(format!("{}:{v}", v.type_name())),
        Err(e) => Err(e
            .eval_error()
            .map(ToString::to_string)
            .unwrap_or_else(|| e.to_string())),
    }
}

proptest! {
    /// Arbitrary input yields `Ok` or `Err`, never a panic.
    #[test]
    fn parser_does_not_panic(s in "\\PC*") {
        let _ = parse(&s);
    }

    /// Every token position lies within the source.
    #[test]
    fn token_positions_in_bounds(s in "[ -~]{0,64}") {
        if let Ok(tokens) = tokenize(&s) {
            prop_assert!(!tokens.is_empty());
            for t in &tokens {
                prop_assert!(t.position <= s.len());
            }
        }
    }

    /// Formatting then re-parsing preserves meaning.
    #[test]
    fn formatted_source_evaluates_the_same(src in expression(), pretty in any::<bool>()) {
        // `name < a > (b)` reads as a generic call; such sources may not parse.
        let Ok(tree) = parse(&src) else { return Ok(()) };
        let text = format_expr(&tree, pretty);
        let expected = outcome(engine().evaluate(&src));
        let actual = outcome(engine().evaluate(&text));
        prop_assert_eq!(expected, actual, "formatted as {:?}", text);
    }

    /// Formatting is a fixed point after one pass.
    #[test]
    fn formatting_is_stable(src in expression()) {
        let Ok(tree) = parse(&src) else { return Ok(()) };
        let once = format_expr(&tree, false);
        let twice = format_expr(&parse(&once).unwrap(), false);
        prop_assert_eq!(once, twice);
    }

    /// A variable with `n` uses reads exactly `n` times.
    #[test]
    fn use_budget_is_exact(n in 1i64..20) {
        let mut e = Engine::new();
        e.set_variable_uses("v", 1, n).unwrap();
        for _ in 0..n {
            prop_assert!(e.evaluate("v").is_ok());
        }
        prop_assert!(e.evaluate("v").unwrap_err().is_variable_error());
        prop_assert_eq!(e.peek_variable("v"), Some(Value::Int(1)));
    }
}

//! Translators every relational provider shares.

use std::sync::Arc;

use super::{MethodCallTranslator, expect_arguments, expect_object};
use crate::error::QueryResult;
use crate::expression::{BinaryOp, Expression, MethodCallExpression};
use crate::value::Value;

const LIKE_ESCAPE: char = '\\';

pub(super) fn translators() -> Vec<Arc<dyn MethodCallTranslator>> {
    vec![
        Arc::new(StartsWithTranslator),
        Arc::new(EndsWithTranslator),
        Arc::new(ContainsTranslator),
        Arc::new(EqualsTranslator),
    ]
}

/// Where a LIKE pattern may match.
#[derive(Clone, Copy)]
enum Anchor {
    Start,
    End,
    Anywhere,
}

fn like(call: &MethodCallExpression, anchor: Anchor) -> QueryResult<Option<Expression>> {
    expect_arguments(call, 1..=1)?;
    let operand = expect_object(call)?.clone();
    let argument = &call.arguments[0];

    let (pattern, escape) = match argument.as_constant() {
        Some(Value::String(text)) => {
            let escaped = escape_like(text);
            let escape = (escaped.len() != text.len()).then_some(LIKE_ESCAPE);
            let pattern = match anchor {
                Anchor::Start => format!("{}%", escaped),
                Anchor::End => format!("%{}", escaped),
                Anchor::Anywhere => format!("%{}%", escaped),
            };
            (Expression::constant(pattern), escape)
        }
        Some(_) => return Ok(None),
        None => {
            let escaped = escape_like_sql(argument.clone());
            let wildcard = || Expression::constant("%");
            let pattern = match anchor {
                Anchor::Start => Expression::binary(BinaryOp::Concat, escaped, wildcard()),
                Anchor::End => Expression::binary(BinaryOp::Concat, wildcard(), escaped),
                Anchor::Anywhere => Expression::binary(
                    BinaryOp::Concat,
                    Expression::binary(BinaryOp::Concat, wildcard(), escaped),
                    wildcard(),
                ),
            };
            (pattern, Some(LIKE_ESCAPE))
        }
    };

    Ok(Some(Expression::Like {
        operand: Box::new(operand),
        pattern: Box::new(pattern),
        escape,
    }))
}

fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | LIKE_ESCAPE) {
            escaped.push(LIKE_ESCAPE);
        }
        escaped.push(c);
    }
    escaped
}

/// Escape LIKE wildcards in a value only known to the store.
fn escape_like_sql(argument: Expression) -> Expression {
    ['\\', '%', '_'].into_iter().fold(argument, |inner, c| {
        Expression::function(
            "replace",
            vec![
                inner,
                Expression::constant(c.to_string()),
                Expression::constant(format!("{}{}", LIKE_ESCAPE, c)),
            ],
        )
    })
}

/// `string.starts_with(prefix)` as `LIKE 'prefix%'`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StartsWithTranslator;

impl MethodCallTranslator for StartsWithTranslator {
    fn translate(&self, call: &MethodCallExpression) -> QueryResult<Option<Expression>> {
        if !call.is("string", "starts_with") {
            return Ok(None);
        }
        like(call, Anchor::Start)
    }
}

/// `string.ends_with(suffix)` as `LIKE '%suffix'`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EndsWithTranslator;

impl MethodCallTranslator for EndsWithTranslator {
    fn translate(&self, call: &MethodCallExpression) -> QueryResult<Option<Expression>> {
        if !call.is("string", "ends_with") {
            return Ok(None);
        }
        like(call, Anchor::End)
    }
}

/// `string.contains(text)` as `LIKE '%text%'`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainsTranslator;

impl MethodCallTranslator for ContainsTranslator {
    fn translate(&self, call: &MethodCallExpression) -> QueryResult<Option<Expression>> {
        if !call.is("string", "contains") {
            return Ok(None);
        }
        like(call, Anchor::Anywhere)
    }
}

/// `object.equals(other)` as `=`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EqualsTranslator;

impl MethodCallTranslator for EqualsTranslator {
    fn translate(&self, call: &MethodCallExpression) -> QueryResult<Option<Expression>> {
        if call.method.name != "equals" {
            return Ok(None);
        }
        let (left, right) = match (&call.object, call.arguments.as_slice()) {
            (Some(object), [other]) => ((**object).clone(), other.clone()),
            (None, [left, right]) => (left.clone(), right.clone()),
            _ => {
                expect_arguments(call, if call.object.is_some() { 1..=1 } else { 2..=2 })?;
                return Ok(None);
            }
        };
        Ok(Some(left.equal(right)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn string_call(name: &str, argument: Expression) -> MethodCallExpression {
        match Expression::column("c", "Name").call("string", name, vec![argument]) {
            Expression::MethodCall(call) => call,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_starts_with_constant() {
        let translated = StartsWithTranslator
            .translate(&string_call("starts_with", "ab".into()))
            .unwrap()
            .unwrap();
        assert_eq!(
            translated,
            Expression::Like {
                operand: Box::new(Expression::column("c", "Name")),
                pattern: Box::new(Expression::constant("ab%")),
                escape: None,
            }
        );
    }

    #[test]
    fn test_wildcards_are_escaped() {
        let translated = ContainsTranslator
            .translate(&string_call("contains", "50%".into()))
            .unwrap()
            .unwrap();
        match translated {
            Expression::Like { pattern, escape, .. } => {
                assert_eq!(*pattern, Expression::constant("%50\\%%"));
                assert_eq!(escape, Some('\\'));
            }
            other => panic!("unexpected {}", other),
        }
    }

    #[test]
    fn test_parameter_pattern_is_escaped() {
        let translated = EndsWithTranslator
            .translate(&string_call("ends_with", Expression::parameter("suffix")))
            .unwrap()
            .unwrap();
        let replace = |inner: Expression, from: &str, to: &str| {
            Expression::function("replace", vec![inner, Expression::constant(from), Expression::constant(to)])
        };
        let escaped = replace(
            replace(replace(Expression::parameter("suffix"), "\\", "\\\\"), "%", "\\%"),
            "_",
            "\\_",
        );
        assert_eq!(
            translated,
            Expression::Like {
                operand: Box::new(Expression::column("c", "Name")),
                pattern: Box::new(Expression::binary(BinaryOp::Concat, Expression::constant("%"), escaped)),
                escape: Some('\\'),
            }
        );
    }

    #[test]
    fn test_other_methods_are_not_handled() {
        assert!(
            StartsWithTranslator
                .translate(&string_call("ends_with", "x".into()))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_instance_equals() {
        let translated = EqualsTranslator
            .translate(&string_call("equals", Expression::constant(3)))
            .unwrap()
            .unwrap();
        assert_eq!(translated, Expression::column("c", "Name").equal(3));
    }
}

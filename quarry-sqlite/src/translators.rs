//! SQLite method-call translators.
//!
//! [`composite`] puts these ahead of the relational set, so a SQLite
//! translation shadows a generic one for the same method.

use std::sync::Arc;

use quarry_query::error::QueryResult;
use quarry_query::expression::{BinaryOp, Expression, MethodCallExpression};
use quarry_query::translators::{
    CompositeMethodCallTranslator, MethodCallTranslator, expect_arguments, expect_object,
};
use quarry_query::value::Value;

/// The SQLite translator set.
pub fn translators() -> Vec<Arc<dyn MethodCallTranslator>> {
    vec![
        Arc::new(MathAbsTranslator),
        Arc::new(IsNullOrWhitespaceTranslator),
        Arc::new(StringCaseTranslator),
        Arc::new(TrimTranslator),
    ]
}

/// The relational set with the SQLite set prepended.
pub fn composite() -> CompositeMethodCallTranslator {
    let mut composite = CompositeMethodCallTranslator::relational();
    composite.prepend_translators(translators());
    composite
}

/// `math.abs(x)` as `abs(x)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MathAbsTranslator;

impl MethodCallTranslator for MathAbsTranslator {
    fn translate(&self, call: &MethodCallExpression) -> QueryResult<Option<Expression>> {
        if !call.is("math", "abs") {
            return Ok(None);
        }
        expect_arguments(call, 1..=1)?;
        Ok(Some(Expression::function("abs", call.arguments.clone())))
    }
}

/// `string.is_null_or_whitespace(x)` as `x IS NULL OR trim(x) = ''`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsNullOrWhitespaceTranslator;

impl MethodCallTranslator for IsNullOrWhitespaceTranslator {
    fn translate(&self, call: &MethodCallExpression) -> QueryResult<Option<Expression>> {
        if !call.is("string", "is_null_or_whitespace") {
            return Ok(None);
        }
        expect_arguments(call, 1..=1)?;
        let operand = call.arguments[0].clone();
        let blank = Expression::function("trim", vec![operand.clone()]).equal("");
        Ok(Some(Expression::binary(BinaryOp::Or, operand.is_null(), blank)))
    }
}

/// `string.to_lower()` / `string.to_upper()` as `lower` / `upper`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringCaseTranslator;

impl MethodCallTranslator for StringCaseTranslator {
    fn translate(&self, call: &MethodCallExpression) -> QueryResult<Option<Expression>> {
        let function = if call.is("string", "to_lower") {
            "lower"
        } else if call.is("string", "to_upper") {
            "upper"
        } else {
            return Ok(None);
        };
        expect_arguments(call, 0..=0)?;
        let operand = expect_object(call)?.clone();
        Ok(Some(Expression::function(function, vec![operand])))
    }
}

/// `string.trim([chars])`, `trim_start`, `trim_end` as `trim`, `ltrim`, `rtrim`.
///
/// The optional argument is the set of characters to strip and must be a
/// constant string.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrimTranslator;

impl MethodCallTranslator for TrimTranslator {
    fn translate(&self, call: &MethodCallExpression) -> QueryResult<Option<Expression>> {
        let function = if call.is("string", "trim") {
            "trim"
        } else if call.is("string", "trim_start") {
            "ltrim"
        } else if call.is("string", "trim_end") {
            "rtrim"
        } else {
            return Ok(None);
        };
        expect_arguments(call, 0..=1)?;
        let operand = expect_object(call)?.clone();

        let mut arguments = vec![operand];
        if let Some(characters) = call.arguments.first() {
            match characters.as_constant() {
                Some(Value::String(_)) => arguments.push(characters.clone()),
                // A computed character set stays a method call for in-process evaluation.
                _ => return Ok(None),
            }
        }
        Ok(Some(Expression::function(function, arguments)))
    }
}

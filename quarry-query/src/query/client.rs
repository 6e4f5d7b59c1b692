//! In-process evaluation of the parts of a query the store cannot run.
//!
//! Rows are fed through a [`RowGrouper`] (when several rows form one result
//! element) and then through a [`ClientPipeline`] of filters, sorts and
//! skip/take stages. Expressions are evaluated by a [`ClientEvaluator`]
//! against the fetched columns.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use smol_str::SmolStr;

use super::shaper::RowLayout;
use crate::error::{QueryError, QueryResult};
use crate::expression::{BinaryOp, Expression, MethodInfo};
use crate::metadata::Model;
use crate::types::SortOrder;
use crate::value::{Row, Value};

/// An in-process method implementation: `(receiver, arguments) -> result`.
pub type ClientMethod = Arc<dyn Fn(Option<&Value>, &[Value]) -> QueryResult<Value> + Send + Sync>;

/// Methods available to in-process evaluation.
#[derive(Clone, Default)]
pub struct ClientMethodRegistry {
    methods: HashMap<(SmolStr, SmolStr), ClientMethod>,
}

impl ClientMethodRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The string and math methods.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register("string", "starts_with", |s, args| {
                string_predicate(s, args, |s, a| s.starts_with(a))
            })
            .register("string", "ends_with", |s, args| {
                string_predicate(s, args, |s, a| s.ends_with(a))
            })
            .register("string", "contains", |s, args| {
                string_predicate(s, args, |s, a| s.contains(a))
            })
            .register("string", "to_lower", |s, _| string_map(s, |s| s.to_lowercase()))
            .register("string", "to_upper", |s, _| string_map(s, |s| s.to_uppercase()))
            .register("string", "reverse", |s, _| string_map(s, |s| s.chars().rev().collect()))
            .register("string", "len", |s, _| {
                Ok(match s.and_then(Value::as_str) {
                    Some(s) => Value::Int(s.chars().count() as i64),
                    None => Value::Null,
                })
            })
            .register("string", "trim", |s, args| trim(s, args, |s, set| s.trim_matches(set).to_string()))
            .register("string", "trim_start", |s, args| {
                trim(s, args, |s, set| s.trim_start_matches(set).to_string())
            })
            .register("string", "trim_end", |s, args| {
                trim(s, args, |s, set| s.trim_end_matches(set).to_string())
            })
            .register("string", "is_null_or_whitespace", |_, args| {
                Ok(Value::Bool(match args.first() {
                    Some(Value::String(s)) => s.trim().is_empty(),
                    Some(Value::Null) | None => true,
                    Some(_) => false,
                }))
            })
            .register("math", "abs", |_, args| {
                Ok(match args.first() {
                    Some(Value::Int(i)) => Value::Int(i.abs()),
                    Some(Value::Float(f)) => Value::Float(f.abs()),
                    _ => Value::Null,
                })
            })
            .register("object", "equals", |object, args| {
                let (left, right) = match (object, args) {
                    (Some(object), [other]) => (object, other),
                    (None, [left, right]) => (left, right),
                    _ => return Err(QueryError::client_evaluation("equals expects two operands")),
                };
                Ok(Value::Bool(left.loose_eq(right)))
            });
        registry
    }

    /// Register (or replace) a method.
    pub fn register<F>(&mut self, declaring_type: &str, name: &str, method: F) -> &mut Self
    where
        F: Fn(Option<&Value>, &[Value]) -> QueryResult<Value> + Send + Sync + 'static,
    {
        self.methods
            .insert((SmolStr::new(declaring_type), SmolStr::new(name)), Arc::new(method));
        self
    }

    /// Whether a method is available. `equals` resolves on any declaring type.
    pub fn contains(&self, method: &MethodInfo) -> bool {
        self.lookup(method).is_some()
    }

    /// Invoke a method.
    pub fn invoke(&self, method: &MethodInfo, object: Option<&Value>, arguments: &[Value]) -> QueryResult<Value> {
        let implementation = self.lookup(method).ok_or_else(|| {
            QueryError::client_evaluation(format!("'{}' has no in-process implementation", method))
        })?;
        implementation(object, arguments)
    }

    fn lookup(&self, method: &MethodInfo) -> Option<&ClientMethod> {
        self.methods
            .get(&(method.declaring_type.clone(), method.name.clone()))
            .or_else(|| {
                (method.name == "equals")
                    .then(|| self.methods.get(&(SmolStr::new("object"), SmolStr::new("equals"))))
                    .flatten()
            })
    }
}

impl fmt::Debug for ClientMethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.methods.keys().map(|(t, n)| format!("{}.{}", t, n)).collect();
        names.sort();
        f.debug_struct("ClientMethodRegistry").field("methods", &names).finish()
    }
}

fn string_predicate(
    object: Option<&Value>,
    arguments: &[Value],
    f: impl Fn(&str, &str) -> bool,
) -> QueryResult<Value> {
    let argument = arguments
        .first()
        .ok_or_else(|| QueryError::client_evaluation("Missing string argument"))?;
    Ok(match (object.and_then(Value::as_str), argument.as_str()) {
        (Some(s), Some(a)) => Value::Bool(f(s, a)),
        _ => Value::Null,
    })
}

fn string_map(object: Option<&Value>, f: impl Fn(&str) -> String) -> QueryResult<Value> {
    Ok(match object.and_then(Value::as_str) {
        Some(s) => Value::String(f(s)),
        None => Value::Null,
    })
}

fn trim(object: Option<&Value>, arguments: &[Value], f: impl Fn(&str, &[char]) -> String) -> QueryResult<Value> {
    let set: Vec<char> = match arguments.first().and_then(Value::as_str) {
        Some(chars) => chars.chars().collect(),
        None => vec![' ', '\t', '\n', '\r'],
    };
    string_map(object, |s| f(s, &set))
}

/// Evaluates expressions against fetched rows.
#[derive(Clone)]
pub struct ClientEvaluator {
    model: Arc<Model>,
    layout: Arc<RowLayout>,
    methods: Arc<ClientMethodRegistry>,
}

impl ClientEvaluator {
    /// Create an evaluator over a row layout.
    pub fn new(model: Arc<Model>, layout: Arc<RowLayout>, methods: Arc<ClientMethodRegistry>) -> Self {
        Self { model, layout, methods }
    }

    /// Evaluate `expression` for `row`.
    pub fn evaluate(
        &self,
        expression: &Expression,
        row: &[Value],
        parameters: &HashMap<SmolStr, Value>,
    ) -> QueryResult<Value> {
        match expression {
            Expression::Member { source, member } => {
                let index = self
                    .layout
                    .member_index(&self.model, source, member)
                    .ok_or_else(|| QueryError::member_not_found(source.as_str(), member.as_str()))?;
                Ok(row.get(index).cloned().unwrap_or(Value::Null))
            }
            Expression::Column { table, column } => {
                let index = self
                    .layout
                    .column_index(&self.model, table, column)
                    .ok_or_else(|| QueryError::member_not_found(table.as_str(), column.as_str()))?;
                Ok(row.get(index).cloned().unwrap_or(Value::Null))
            }
            Expression::Constant(value) => Ok(value.clone()),
            Expression::Parameter(name) => parameters
                .get(name)
                .cloned()
                .ok_or_else(|| QueryError::parameter_missing(name.as_str())),
            Expression::Binary { op, left, right } => {
                let left = self.evaluate(left, row, parameters)?;
                match op {
                    BinaryOp::And if !left.is_truthy() => return Ok(Value::Bool(false)),
                    BinaryOp::Or if left.is_truthy() => return Ok(Value::Bool(true)),
                    _ => {}
                }
                let right = self.evaluate(right, row, parameters)?;
                binary(*op, &left, &right)
            }
            Expression::Not(inner) => {
                let value = self.evaluate(inner, row, parameters)?;
                Ok(match value.as_bool() {
                    Some(b) => Value::Bool(!b),
                    None => Value::Null,
                })
            }
            Expression::IsNull(inner) => Ok(Value::Bool(self.evaluate(inner, row, parameters)?.is_null())),
            Expression::MethodCall(call) => {
                let object = match &call.object {
                    Some(object) => Some(self.evaluate(object, row, parameters)?),
                    None => None,
                };
                let arguments = call
                    .arguments
                    .iter()
                    .map(|a| self.evaluate(a, row, parameters))
                    .collect::<QueryResult<Vec<_>>>()?;
                self.methods.invoke(&call.method, object.as_ref(), &arguments)
            }
            Expression::SqlFunction { .. } | Expression::Like { .. } => Err(QueryError::client_evaluation(
                format!("'{}' can only be evaluated by the store", expression),
            )),
        }
    }
}

impl fmt::Debug for ClientEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientEvaluator")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> QueryResult<Value> {
    let comparison = |accept: fn(Ordering) -> bool| {
        if left.is_null() || right.is_null() {
            Value::Bool(false)
        } else {
            Value::Bool(accept(left.compare(right)))
        }
    };
    Ok(match op {
        BinaryOp::Equal => Value::Bool(left.loose_eq(right)),
        BinaryOp::NotEqual => Value::Bool(!left.loose_eq(right)),
        BinaryOp::LessThan => comparison(|o| o == Ordering::Less),
        BinaryOp::LessThanOrEqual => comparison(|o| o != Ordering::Greater),
        BinaryOp::GreaterThan => comparison(|o| o == Ordering::Greater),
        BinaryOp::GreaterThanOrEqual => comparison(|o| o != Ordering::Less),
        BinaryOp::And => Value::Bool(left.is_truthy() && right.is_truthy()),
        BinaryOp::Or => Value::Bool(left.is_truthy() || right.is_truthy()),
        BinaryOp::Concat => match (left, right) {
            (Value::Null, _) | (_, Value::Null) => Value::Null,
            (l, r) => Value::String(format!("{}{}", text(l), text(r))),
        },
        BinaryOp::Add | BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide => arithmetic(op, left, right)?,
    })
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> QueryResult<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    if let (Value::Int(a), Value::Int(b)) = (left, right) {
        let result = match op {
            BinaryOp::Add => a.checked_add(*b),
            BinaryOp::Subtract => a.checked_sub(*b),
            BinaryOp::Multiply => a.checked_mul(*b),
            _ => a.checked_div(*b),
        };
        return result
            .map(Value::Int)
            .ok_or_else(|| QueryError::client_evaluation(format!("Arithmetic overflow in {} {} {}", a, op.as_sql(), b)));
    }
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => Ok(Value::Float(match op {
            BinaryOp::Add => a + b,
            BinaryOp::Subtract => a - b,
            BinaryOp::Multiply => a * b,
            _ => a / b,
        })),
        _ => Err(QueryError::client_evaluation(format!(
            "Cannot apply '{}' to {} and {}",
            op.as_sql(),
            left.type_name(),
            right.type_name()
        ))),
    }
}

/// A query operator evaluated in process, in query order.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientOperator {
    /// Keep elements whose predicate holds.
    Filter(Expression),
    /// Stable sort by keys, primary key first.
    OrderBy(Vec<(Expression, SortOrder)>),
    /// Drop the first elements.
    Skip(u64),
    /// Keep only the first elements.
    Take(u64),
}

/// One result element: its rows, the first representing it.
pub type Element = Vec<Row>;

enum Stage {
    Filter(Expression),
    Sort {
        keys: Vec<(Expression, SortOrder)>,
        buffer: Vec<Element>,
    },
    Skip(u64),
    Take(u64),
}

/// Runs client operators over result elements as they arrive.
///
/// Filters and skip/take stream; a sort holds everything until the input
/// ends.
pub struct ClientPipeline {
    stages: Vec<Stage>,
}

impl ClientPipeline {
    /// Create stages for the operators.
    pub fn new(operators: &[ClientOperator]) -> Self {
        let stages = operators
            .iter()
            .map(|op| match op {
                ClientOperator::Filter(e) => Stage::Filter(e.clone()),
                ClientOperator::OrderBy(keys) => Stage::Sort {
                    keys: keys.clone(),
                    buffer: Vec::new(),
                },
                ClientOperator::Skip(n) => Stage::Skip(*n),
                ClientOperator::Take(n) => Stage::Take(*n),
            })
            .collect();
        Self { stages }
    }

    /// Feed one element; returns the elements that passed every stage.
    pub fn push(
        &mut self,
        evaluator: &ClientEvaluator,
        parameters: &HashMap<SmolStr, Value>,
        element: Element,
    ) -> QueryResult<Vec<Element>> {
        let mut out = Vec::new();
        self.run(0, element, evaluator, parameters, &mut out)?;
        Ok(out)
    }

    /// Flush buffered sorts at the end of input.
    pub fn finish(
        &mut self,
        evaluator: &ClientEvaluator,
        parameters: &HashMap<SmolStr, Value>,
    ) -> QueryResult<Vec<Element>> {
        let mut out = Vec::new();
        for index in 0..self.stages.len() {
            let (keys, buffered) = match &mut self.stages[index] {
                Stage::Sort { keys, buffer } => (keys.clone(), std::mem::take(buffer)),
                _ => continue,
            };
            for element in sort(evaluator, parameters, &keys, buffered)? {
                self.run(index + 1, element, evaluator, parameters, &mut out)?;
            }
        }
        Ok(out)
    }

    /// Whether no further element can pass (a take is exhausted before any sort).
    pub fn is_exhausted(&self) -> bool {
        for stage in &self.stages {
            match stage {
                Stage::Sort { .. } => return false,
                Stage::Take(0) => return true,
                _ => {}
            }
        }
        false
    }

    fn run(
        &mut self,
        from: usize,
        element: Element,
        evaluator: &ClientEvaluator,
        parameters: &HashMap<SmolStr, Value>,
        out: &mut Vec<Element>,
    ) -> QueryResult<()> {
        for stage in self.stages.iter_mut().skip(from) {
            match stage {
                Stage::Filter(predicate) => {
                    let Some(row) = element.first() else {
                        return Ok(());
                    };
                    if !evaluator.evaluate(predicate, row, parameters)?.is_truthy() {
                        return Ok(());
                    }
                }
                Stage::Sort { buffer, .. } => {
                    buffer.push(element);
                    return Ok(());
                }
                Stage::Skip(remaining) => {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Ok(());
                    }
                }
                Stage::Take(remaining) => {
                    if *remaining == 0 {
                        return Ok(());
                    }
                    *remaining -= 1;
                }
            }
        }
        out.push(element);
        Ok(())
    }
}

impl fmt::Debug for ClientPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientPipeline")
            .field("stages", &self.stages.len())
            .finish()
    }
}

fn sort(
    evaluator: &ClientEvaluator,
    parameters: &HashMap<SmolStr, Value>,
    keys: &[(Expression, SortOrder)],
    elements: Vec<Element>,
) -> QueryResult<Vec<Element>> {
    let mut keyed = elements
        .into_iter()
        .map(|element| {
            let values = match element.first() {
                Some(row) => keys
                    .iter()
                    .map(|(key, _)| evaluator.evaluate(key, row, parameters))
                    .collect::<QueryResult<Vec<_>>>()?,
                None => Vec::new(),
            };
            Ok((values, element))
        })
        .collect::<QueryResult<Vec<_>>>()?;

    keyed.sort_by(|(a, _), (b, _)| {
        for ((x, y), (_, order)) in a.iter().zip(b).zip(keys) {
            let ordering = match order {
                SortOrder::Asc => x.compare(y),
                SortOrder::Desc => y.compare(x),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    Ok(keyed.into_iter().map(|(_, element)| element).collect())
}

/// Collects consecutive rows that share a group key into one element.
#[derive(Debug, Clone)]
pub struct RowGrouper {
    key_indices: Vec<usize>,
    current: Option<(Vec<Value>, Element)>,
}

impl RowGrouper {
    /// Group on the values at these column indices.
    pub fn new(key_indices: Vec<usize>) -> Self {
        Self {
            key_indices,
            current: None,
        }
    }

    /// Add a row; returns the previous group once a new key starts.
    pub fn push(&mut self, row: Row) -> Option<Element> {
        let key: Vec<Value> = self
            .key_indices
            .iter()
            .map(|i| row.get(*i).cloned().unwrap_or(Value::Null))
            .collect();

        if let Some((current_key, rows)) = &mut self.current {
            if current_key.len() == key.len() && current_key.iter().zip(&key).all(|(a, b)| a.loose_eq(b)) {
                rows.push(row);
                return None;
            }
        }
        self.current
            .replace((key, vec![row]))
            .map(|(_, rows)| rows)
    }

    /// The last group, at the end of input.
    pub fn finish(&mut self) -> Option<Element> {
        self.current.take().map(|(_, rows)| rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::order_model;
    use pretty_assertions::assert_eq;

    fn evaluator() -> ClientEvaluator {
        let mut layout = RowLayout::default();
        layout.add_entity("o".into(), "Order".into(), 2, false);
        ClientEvaluator::new(
            order_model(),
            Arc::new(layout),
            Arc::new(ClientMethodRegistry::with_defaults()),
        )
    }

    fn order(id: i64, customer: &str) -> Element {
        vec![vec![Value::Int(id), Value::from(customer)]]
    }

    #[test]
    fn test_evaluate_method_call_on_member() {
        let evaluator = evaluator();
        let expr = Expression::member("o", "Customer")
            .call("string", "reverse", vec![])
            .equal("ada");
        let params = HashMap::new();

        assert_eq!(
            evaluator.evaluate(&expr, &order(1, "ada")[0], &params).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            evaluator.evaluate(&expr, &order(1, "bob")[0], &params).unwrap(),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_null_semantics() {
        let evaluator = evaluator();
        let params = HashMap::new();
        let row = vec![Value::Int(1), Value::Null];

        let eq_null = Expression::member("o", "Customer").equal(Value::Null);
        assert_eq!(evaluator.evaluate(&eq_null, &row, &params).unwrap(), Value::Bool(true));

        let gt = Expression::member("o", "Customer").greater_than("a");
        assert_eq!(evaluator.evaluate(&gt, &row, &params).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_unknown_method_fails() {
        let evaluator = evaluator();
        let expr = Expression::member("o", "Customer").call("string", "soundex", vec![]);
        let err = evaluator.evaluate(&expr, &order(1, "a")[0], &HashMap::new()).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::ClientEvaluationFailed);
    }

    #[test]
    fn test_pipeline_filter_sort_take() {
        let evaluator = evaluator();
        let params = HashMap::new();
        let mut pipeline = ClientPipeline::new(&[
            ClientOperator::Filter(Expression::member("o", "Id").greater_than(1)),
            ClientOperator::OrderBy(vec![(Expression::member("o", "Customer"), SortOrder::Desc)]),
            ClientOperator::Take(2),
        ]);

        let mut out = Vec::new();
        for (id, customer) in [(1, "a"), (2, "b"), (3, "d"), (4, "c")] {
            out.extend(pipeline.push(&evaluator, &params, order(id, customer)).unwrap());
        }
        assert!(out.is_empty());
        out.extend(pipeline.finish(&evaluator, &params).unwrap());

        let ids: Vec<_> = out.iter().map(|e| e[0][0].clone()).collect();
        assert_eq!(ids, vec![Value::Int(3), Value::Int(4)]);
    }

    #[test]
    fn test_pipeline_skip_take_streams() {
        let evaluator = evaluator();
        let params = HashMap::new();
        let mut pipeline = ClientPipeline::new(&[ClientOperator::Skip(1), ClientOperator::Take(1)]);

        assert!(pipeline.push(&evaluator, &params, order(1, "a")).unwrap().is_empty());
        assert_eq!(pipeline.push(&evaluator, &params, order(2, "b")).unwrap().len(), 1);
        assert!(pipeline.is_exhausted());
    }

    #[test]
    fn test_grouper_groups_consecutive_rows() {
        let mut grouper = RowGrouper::new(vec![0]);
        assert!(grouper.push(vec![Value::Int(1), Value::Int(10)]).is_none());
        assert!(grouper.push(vec![Value::Int(1), Value::Int(11)]).is_none());
        let first = grouper.push(vec![Value::Int(2), Value::Int(12)]).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(grouper.finish().unwrap().len(), 1);
        assert!(grouper.finish().is_none());
    }
}

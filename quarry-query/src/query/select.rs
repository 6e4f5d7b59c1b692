//! The relational command tree produced by the compiler.

use smol_str::SmolStr;

use crate::expression::Expression;
use crate::types::SortOrder;

/// Join flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// `INNER JOIN`
    Inner,
    /// `LEFT JOIN`
    Left,
}

impl JoinKind {
    /// SQL keyword.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
        }
    }
}

/// A table reference in `FROM` or a join.
#[derive(Debug, Clone, PartialEq)]
pub struct TableExpression {
    /// Alias used by column references.
    pub alias: SmolStr,
    /// Table name.
    pub table: SmolStr,
    /// Entity type mapped to the table.
    pub entity_type: SmolStr,
    /// Join kind and condition; `None` for the `FROM` table.
    pub join: Option<(JoinKind, Expression)>,
}

/// One projected column.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionColumn {
    /// Translated expression.
    pub expression: Expression,
    /// Output name for computed columns.
    pub alias: Option<SmolStr>,
}

/// One ordering key.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderingExpression {
    /// Translated key.
    pub expression: Expression,
    /// Direction.
    pub order: SortOrder,
}

/// `SELECT` command tree.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectExpression {
    /// `FROM` table first, then joins in order.
    pub tables: Vec<TableExpression>,
    /// Projected columns.
    pub projection: Vec<ProjectionColumn>,
    /// `WHERE` predicate.
    pub predicate: Option<Expression>,
    /// `ORDER BY` keys.
    pub orderings: Vec<OrderingExpression>,
    /// `LIMIT`
    pub limit: Option<u64>,
    /// `OFFSET`
    pub offset: Option<u64>,
}

impl SelectExpression {
    /// Select from one table.
    pub fn new(alias: impl Into<SmolStr>, table: impl Into<SmolStr>, entity_type: impl Into<SmolStr>) -> Self {
        Self {
            tables: vec![TableExpression {
                alias: alias.into(),
                table: table.into(),
                entity_type: entity_type.into(),
                join: None,
            }],
            projection: Vec::new(),
            predicate: None,
            orderings: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// AND a predicate into `WHERE`.
    pub fn add_predicate(&mut self, predicate: Expression) {
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
    }

    /// Add a joined table.
    pub fn add_join(&mut self, mut table: TableExpression, kind: JoinKind, on: Expression) {
        table.join = Some((kind, on));
        self.tables.push(table);
    }

    /// Add an ordering key unless the same key is already present.
    pub fn add_ordering(&mut self, expression: Expression, order: SortOrder) {
        if !self.orderings.iter().any(|o| o.expression == expression) {
            self.orderings.push(OrderingExpression { expression, order });
        }
    }

    /// Whether a `LIMIT` or `OFFSET` is set.
    pub fn is_paginated(&self) -> bool {
        self.limit.is_some() || self.offset.is_some()
    }

    /// Compose another skip/take on top of the current one.
    pub fn paginate(&mut self, skip: Option<u64>, take: Option<u64>) {
        let skip = skip.unwrap_or(0);
        let offset = self.offset.unwrap_or(0) + skip;
        self.offset = (offset > 0).then_some(offset);
        let remaining = self.limit.map(|limit| limit.saturating_sub(skip));
        self.limit = match (remaining, take) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
    }

    /// The table bound to `alias`.
    pub fn table(&self, alias: &str) -> Option<&TableExpression> {
        self.tables.iter().find(|t| t.alias == alias)
    }
}

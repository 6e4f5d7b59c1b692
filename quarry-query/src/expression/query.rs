//! Query operator trees and the fluent builder that composes them.

use smol_str::SmolStr;

use super::Expression;
use crate::types::SortOrder;

/// Shape of the values a query yields.
#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// The entity of a source.
    Entity(SmolStr),
    /// A computed scalar.
    Scalar(Expression),
    /// Named fields.
    Record(Vec<(SmolStr, Projection)>),
    /// A group-join result: the outer entity and its matching inner entities.
    Grouping {
        /// Outer source alias.
        outer: SmolStr,
        /// Inner source alias.
        inner: SmolStr,
    },
}

impl Projection {
    /// Whether the projection materializes the entity of `alias`.
    pub fn materializes(&self, alias: &str) -> bool {
        match self {
            Self::Entity(a) => a == alias,
            Self::Scalar(_) => false,
            Self::Record(fields) => fields.iter().any(|(_, p)| p.materializes(alias)),
            Self::Grouping { outer, inner } => outer == alias || inner == alias,
        }
    }

    /// Every scalar expression in the projection.
    pub fn expressions(&self) -> Vec<&Expression> {
        match self {
            Self::Scalar(expr) => vec![expr],
            Self::Record(fields) => fields.iter().flat_map(|(_, p)| p.expressions()).collect(),
            Self::Entity(_) | Self::Grouping { .. } => Vec::new(),
        }
    }
}

/// Composed query operators.
///
/// Consecutive `OrderBy` operators add ordering keys (the later one is a
/// secondary key).
#[derive(Debug, Clone, PartialEq)]
pub enum QueryExpression {
    /// All rows of an entity type, bound to an alias.
    Source {
        /// Entity type name.
        entity_type: SmolStr,
        /// Alias used by expressions.
        alias: SmolStr,
    },
    /// Keep elements satisfying a predicate.
    Filter {
        /// Input.
        source: Box<QueryExpression>,
        /// Predicate.
        predicate: Expression,
    },
    /// Shape the result.
    Select {
        /// Input.
        source: Box<QueryExpression>,
        /// Result shape.
        projection: Projection,
    },
    /// Inner join on key equality.
    Join {
        /// Outer input.
        outer: Box<QueryExpression>,
        /// Inner input.
        inner: Box<QueryExpression>,
        /// Key over the outer sources.
        outer_key: Expression,
        /// Key over the inner source.
        inner_key: Expression,
    },
    /// Outer elements paired with their matching inner elements.
    GroupJoin {
        /// Outer input.
        outer: Box<QueryExpression>,
        /// Inner input.
        inner: Box<QueryExpression>,
        /// Key over the outer sources.
        outer_key: Expression,
        /// Key over the inner source.
        inner_key: Expression,
    },
    /// Order by a key.
    OrderBy {
        /// Input.
        source: Box<QueryExpression>,
        /// Key.
        key: Expression,
        /// Direction.
        order: SortOrder,
    },
    /// Skip and take.
    Paginate {
        /// Input.
        source: Box<QueryExpression>,
        /// Elements to skip.
        skip: Option<u64>,
        /// Elements to take.
        take: Option<u64>,
    },
    /// Eager load a navigation path from the root source of the input.
    Include {
        /// Input.
        source: Box<QueryExpression>,
        /// Navigation names, outermost first.
        path: Vec<SmolStr>,
    },
    /// Return entities detached.
    AsNoTracking(Box<QueryExpression>),
    /// Track returned entities.
    AsTracking(Box<QueryExpression>),
}

impl QueryExpression {
    /// A source operator.
    pub fn source(entity_type: impl Into<SmolStr>, alias: impl Into<SmolStr>) -> Self {
        Self::Source {
            entity_type: entity_type.into(),
            alias: alias.into(),
        }
    }

    /// Alias of the leftmost source.
    pub fn root_alias(&self) -> &str {
        match self {
            Self::Source { alias, .. } => alias,
            Self::Filter { source, .. }
            | Self::Select { source, .. }
            | Self::OrderBy { source, .. }
            | Self::Paginate { source, .. }
            | Self::Include { source, .. } => source.root_alias(),
            Self::Join { outer, .. } | Self::GroupJoin { outer, .. } => outer.root_alias(),
            Self::AsNoTracking(source) | Self::AsTracking(source) => source.root_alias(),
        }
    }

    /// Operator name used in messages.
    pub fn operator_name(&self) -> &'static str {
        match self {
            Self::Source { .. } => "source",
            Self::Filter { .. } => "filter",
            Self::Select { .. } => "select",
            Self::Join { .. } => "join",
            Self::GroupJoin { .. } => "group join",
            Self::OrderBy { .. } => "order by",
            Self::Paginate { .. } => "paginate",
            Self::Include { .. } => "include",
            Self::AsNoTracking(_) => "as no tracking",
            Self::AsTracking(_) => "as tracking",
        }
    }
}

/// Fluent composition of a [`QueryExpression`].
#[derive(Debug, Clone)]
pub struct Query {
    expression: QueryExpression,
}

impl Query {
    /// Start from an entity type bound to `alias`.
    pub fn from(entity_type: impl Into<SmolStr>, alias: impl Into<SmolStr>) -> Self {
        Self {
            expression: QueryExpression::source(entity_type, alias),
        }
    }

    fn wrap(self, f: impl FnOnce(Box<QueryExpression>) -> QueryExpression) -> Self {
        Self {
            expression: f(Box::new(self.expression)),
        }
    }

    /// Add a filter.
    pub fn filter(self, predicate: Expression) -> Self {
        self.wrap(|source| QueryExpression::Filter { source, predicate })
    }

    /// Project the result.
    pub fn select(self, projection: Projection) -> Self {
        self.wrap(|source| QueryExpression::Select { source, projection })
    }

    /// Inner join another query.
    pub fn join(self, inner: Query, outer_key: Expression, inner_key: Expression) -> Self {
        self.wrap(|outer| QueryExpression::Join {
            outer,
            inner: Box::new(inner.expression),
            outer_key,
            inner_key,
        })
    }

    /// Group join another query.
    pub fn group_join(self, inner: Query, outer_key: Expression, inner_key: Expression) -> Self {
        self.wrap(|outer| QueryExpression::GroupJoin {
            outer,
            inner: Box::new(inner.expression),
            outer_key,
            inner_key,
        })
    }

    /// Order ascending (adds a key after any previous ordering).
    pub fn order_by(self, key: Expression) -> Self {
        self.wrap(|source| QueryExpression::OrderBy {
            source,
            key,
            order: SortOrder::Asc,
        })
    }

    /// Order descending (adds a key after any previous ordering).
    pub fn order_by_desc(self, key: Expression) -> Self {
        self.wrap(|source| QueryExpression::OrderBy {
            source,
            key,
            order: SortOrder::Desc,
        })
    }

    /// Skip elements.
    pub fn skip(self, count: u64) -> Self {
        self.wrap(|source| QueryExpression::Paginate {
            source,
            skip: Some(count),
            take: None,
        })
    }

    /// Take elements.
    pub fn take(self, count: u64) -> Self {
        self.wrap(|source| QueryExpression::Paginate {
            source,
            skip: None,
            take: Some(count),
        })
    }

    /// Eager load a navigation path.
    pub fn include(self, path: &[&str]) -> Self {
        let path = path.iter().map(|segment| SmolStr::new(segment)).collect();
        self.wrap(|source| QueryExpression::Include { source, path })
    }

    /// Return detached entities.
    pub fn as_no_tracking(self) -> Self {
        self.wrap(QueryExpression::AsNoTracking)
    }

    /// Track returned entities.
    pub fn as_tracking(self) -> Self {
        self.wrap(QueryExpression::AsTracking)
    }

    /// Finish composition.
    pub fn build(self) -> QueryExpression {
        self.expression
    }
}

impl From<Query> for QueryExpression {
    fn from(query: Query) -> Self {
        query.expression
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_nests_operators() {
        let query = Query::from("Order", "o")
            .filter(Expression::member("o", "Id").equal(1))
            .take(5)
            .build();

        match &query {
            QueryExpression::Paginate { source, take, .. } => {
                assert_eq!(*take, Some(5));
                assert!(matches!(**source, QueryExpression::Filter { .. }));
            }
            other => panic!("unexpected operator {}", other.operator_name()),
        }
        assert_eq!(query.root_alias(), "o");
    }

    #[test]
    fn test_projection_materializes() {
        let projection = Projection::Record(vec![
            ("order".into(), Projection::Entity("o".into())),
            ("total".into(), Projection::Scalar(Expression::member("o", "Total"))),
        ]);
        assert!(projection.materializes("o"));
        assert!(!projection.materializes("l"));
        assert_eq!(projection.expressions().len(), 1);
    }
}

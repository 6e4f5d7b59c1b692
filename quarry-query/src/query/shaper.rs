//! Turning fetched rows into result items.

use std::collections::HashSet;

use indexmap::IndexMap;
use smol_str::SmolStr;

use super::client::ClientEvaluator;
use super::context::QueryContext;
use crate::error::{QueryError, QueryResult};
use crate::expression::Expression;
use crate::metadata::Model;
use crate::tracking::{EntityKey, EntityRef};
use crate::value::{Row, Value};

/// Where one entity's columns sit in a row, and how to materialize it.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityMaterializer {
    /// Source alias.
    pub alias: SmolStr,
    /// Entity type name.
    pub entity_type: SmolStr,
    /// Index of the first column.
    pub offset: usize,
    /// Number of columns, one per property.
    pub width: usize,
    /// Whether instances are registered with the unit of work.
    pub requires_tracking: bool,
}

impl EntityMaterializer {
    /// The entity's values in property order.
    pub fn values<'r>(&self, row: &'r [Value]) -> QueryResult<&'r [Value]> {
        row.get(self.offset..self.offset + self.width).ok_or_else(|| {
            QueryError::internal(format!(
                "Row has {} column(s), '{}' needs columns {}..{}",
                row.len(),
                self.alias,
                self.offset,
                self.offset + self.width
            ))
        })
    }

    /// Identity key of the entity in `row`, `None` when absent.
    pub fn key(&self, model: &Model, row: &[Value]) -> QueryResult<Option<EntityKey>> {
        let entity_type = model.require_entity_type(&self.entity_type)?;
        Ok(EntityKey::from_row(entity_type, self.values(row)?))
    }

    /// Resolve the entity in `row` through the query buffer.
    pub fn materialize(&self, context: &QueryContext, row: &[Value]) -> QueryResult<Option<EntityRef>> {
        let model = context.model().clone();
        let entity_type = model.require_entity_type(&self.entity_type)?;
        context
            .buffer()
            .get_entity(context, entity_type, self.values(row)?, self.requires_tracking)
    }
}

/// Column layout of the rows a compiled query fetches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowLayout {
    entities: Vec<EntityMaterializer>,
    width: usize,
}

impl RowLayout {
    /// Reserve columns for an entity; returns its slot index.
    pub fn add_entity(&mut self, alias: SmolStr, entity_type: SmolStr, width: usize, requires_tracking: bool) -> usize {
        self.entities.push(EntityMaterializer {
            alias,
            entity_type,
            offset: self.width,
            width,
            requires_tracking,
        });
        self.width += width;
        self.entities.len() - 1
    }

    /// Reserve one computed column; returns its column index.
    pub fn add_column(&mut self) -> usize {
        self.width += 1;
        self.width - 1
    }

    /// Total number of columns.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Entity slots in column order.
    pub fn entities(&self) -> &[EntityMaterializer] {
        &self.entities
    }

    /// Slot index of a source alias.
    pub fn slot_of(&self, alias: &str) -> Option<usize> {
        self.entities.iter().position(|e| e.alias == alias)
    }

    /// The slot at an index.
    pub fn slot(&self, index: usize) -> Option<&EntityMaterializer> {
        self.entities.get(index)
    }

    /// Column index of `alias.member`.
    pub fn member_index(&self, model: &Model, alias: &str, member: &str) -> Option<usize> {
        let slot = self.entities.iter().find(|e| e.alias == alias)?;
        let index = model.entity_type(&slot.entity_type)?.property_index(member)?;
        Some(slot.offset + index)
    }

    /// Column index of the mapped column `alias.column`.
    pub fn column_index(&self, model: &Model, alias: &str, column: &str) -> Option<usize> {
        let slot = self.entities.iter().find(|e| e.alias == alias)?;
        let index = model
            .entity_type(&slot.entity_type)?
            .properties()
            .iter()
            .position(|p| p.column == column)?;
        Some(slot.offset + index)
    }

    /// Column indices of the primary key of `alias`.
    pub fn key_indices(&self, model: &Model, alias: &str) -> Option<Vec<usize>> {
        let slot = self.entities.iter().find(|e| e.alias == alias)?;
        let entity_type = model.entity_type(&slot.entity_type)?;
        Some(
            entity_type
                .primary_key_indices()
                .iter()
                .map(|i| slot.offset + i)
                .collect(),
        )
    }
}

/// A value produced by a query.
#[derive(Debug, Clone)]
pub enum QueryItem {
    /// An entity instance.
    Entity(EntityRef),
    /// A scalar value (null also stands for an absent entity).
    Scalar(Value),
    /// Named fields.
    Record(IndexMap<SmolStr, QueryItem>),
    /// A group-join element.
    Grouping {
        /// The outer entity.
        key: EntityRef,
        /// Matching inner entities, in row order.
        elements: Vec<EntityRef>,
    },
}

impl QueryItem {
    /// The entity, if this item is one.
    pub fn as_entity(&self) -> Option<&EntityRef> {
        match self {
            Self::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    /// Consume into the entity, if this item is one.
    pub fn into_entity(self) -> Option<EntityRef> {
        match self {
            Self::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    /// The scalar, if this item is one.
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Self::Scalar(value) => Some(value),
            _ => None,
        }
    }

    /// A field of a record.
    pub fn field(&self, name: &str) -> Option<&QueryItem> {
        match self {
            Self::Record(fields) => fields.get(name),
            _ => None,
        }
    }
}

/// Where a projected scalar comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarSource {
    /// A column computed by the store.
    Column(usize),
    /// An expression evaluated in process.
    Client(Expression),
}

/// Shape of the result, bound to a row layout.
#[derive(Debug, Clone, PartialEq)]
pub enum ShaperNode {
    /// Entity in the slot at this index.
    Entity(usize),
    /// Scalar value.
    Scalar(ScalarSource),
    /// Named fields.
    Record(Vec<(SmolStr, ShaperNode)>),
    /// Outer slot plus inner slot of a group join.
    Grouping {
        /// Outer slot index.
        outer: usize,
        /// Inner slot index.
        inner: usize,
    },
}

/// Builds result items from the rows of one result element.
#[derive(Debug, Clone, PartialEq)]
pub struct Shaper {
    root: ShaperNode,
}

impl Shaper {
    /// Create from a shape.
    pub fn new(root: ShaperNode) -> Self {
        Self { root }
    }

    /// The shape.
    pub fn root(&self) -> &ShaperNode {
        &self.root
    }

    /// Build the item for `rows` (the first row represents the element).
    ///
    /// Every entity materialized along the way is appended to `materialized`
    /// with its slot index, in materialization order.
    pub fn shape(
        &self,
        context: &QueryContext,
        layout: &RowLayout,
        evaluator: &ClientEvaluator,
        rows: &[Row],
        materialized: &mut Vec<(usize, EntityRef)>,
    ) -> QueryResult<QueryItem> {
        let first = rows
            .first()
            .ok_or_else(|| QueryError::internal("Cannot shape an empty result element"))?;
        self.shape_node(&self.root, context, layout, evaluator, rows, first, materialized)
    }

    #[allow(clippy::too_many_arguments)]
    fn shape_node(
        &self,
        node: &ShaperNode,
        context: &QueryContext,
        layout: &RowLayout,
        evaluator: &ClientEvaluator,
        rows: &[Row],
        first: &Row,
        materialized: &mut Vec<(usize, EntityRef)>,
    ) -> QueryResult<QueryItem> {
        match node {
            ShaperNode::Entity(slot) => {
                let materializer = slot_at(layout, *slot)?;
                Ok(match materializer.materialize(context, first)? {
                    Some(entity) => {
                        materialized.push((*slot, entity.clone()));
                        QueryItem::Entity(entity)
                    }
                    None => QueryItem::Scalar(Value::Null),
                })
            }
            ShaperNode::Scalar(ScalarSource::Column(index)) => Ok(QueryItem::Scalar(
                first.get(*index).cloned().unwrap_or(Value::Null),
            )),
            ShaperNode::Scalar(ScalarSource::Client(expression)) => Ok(QueryItem::Scalar(
                evaluator.evaluate(expression, first, context.parameters())?,
            )),
            ShaperNode::Record(fields) => {
                let mut record = IndexMap::with_capacity(fields.len());
                for (name, field) in fields {
                    let item = self.shape_node(field, context, layout, evaluator, rows, first, materialized)?;
                    record.insert(name.clone(), item);
                }
                Ok(QueryItem::Record(record))
            }
            ShaperNode::Grouping { outer, inner } => {
                let outer_materializer = slot_at(layout, *outer)?;
                let key = outer_materializer.materialize(context, first)?.ok_or_else(|| {
                    QueryError::internal(format!("Group join row has no '{}' entity", outer_materializer.alias))
                })?;
                materialized.push((*outer, key.clone()));

                let inner_materializer = slot_at(layout, *inner)?;
                let model = context.model().clone();
                let mut seen = HashSet::new();
                let mut elements = Vec::new();
                for row in rows {
                    let Some(entity_key) = inner_materializer.key(&model, row)? else {
                        continue;
                    };
                    if !seen.insert(entity_key) {
                        continue;
                    }
                    if let Some(element) = inner_materializer.materialize(context, row)? {
                        materialized.push((*inner, element.clone()));
                        elements.push(element);
                    }
                }
                Ok(QueryItem::Grouping { key, elements })
            }
        }
    }
}

fn slot_at(layout: &RowLayout, index: usize) -> QueryResult<&EntityMaterializer> {
    layout
        .slot(index)
        .ok_or_else(|| QueryError::internal(format!("No entity slot {}", index)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::order_model;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_layout_indices() {
        let model = order_model();
        let mut layout = RowLayout::default();
        layout.add_entity("o".into(), "Order".into(), 2, true);
        layout.add_entity("l".into(), "OrderLine".into(), 3, true);
        let computed = layout.add_column();

        assert_eq!(layout.width(), 6);
        assert_eq!(computed, 5);
        assert_eq!(layout.member_index(&model, "l", "OrderId"), Some(3));
        assert_eq!(layout.column_index(&model, "l", "order_id"), Some(3));
        assert_eq!(layout.key_indices(&model, "l"), Some(vec![2]));
        assert_eq!(layout.slot_of("l"), Some(1));
        assert_eq!(layout.member_index(&model, "x", "Id"), None);
    }

    #[test]
    fn test_materializer_rejects_short_rows() {
        let materializer = EntityMaterializer {
            alias: "o".into(),
            entity_type: "Order".into(),
            offset: 1,
            width: 2,
            requires_tracking: false,
        };
        assert!(materializer.values(&[Value::Int(1)]).is_err());
        assert_eq!(
            materializer.values(&[Value::Null, Value::Int(1), Value::from("a")]).unwrap(),
            &[Value::Int(1), Value::from("a")]
        );
    }
}

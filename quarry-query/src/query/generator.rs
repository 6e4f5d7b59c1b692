//! SQL text generation from a [`SelectExpression`].

use crate::error::{QueryError, QueryResult};
use crate::expression::{BinaryOp, Expression};
use crate::sql::{CommandParameter, DatabaseType, RelationalCommand, SqlBuilder};
use crate::value::Value;

use super::select::SelectExpression;

/// Renders command trees for one dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlGenerator {
    db_type: DatabaseType,
}

impl SqlGenerator {
    /// Create a generator for a dialect.
    pub fn new(db_type: DatabaseType) -> Self {
        Self { db_type }
    }

    /// The target dialect.
    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    /// Render a `SELECT`.
    pub fn generate(&self, select: &SelectExpression) -> QueryResult<RelationalCommand> {
        let mut builder = SqlBuilder::new(self.db_type);
        builder.push("SELECT ");

        if select.projection.is_empty() {
            builder.push("1");
        }
        for (i, column) in select.projection.iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            self.visit(&mut builder, &column.expression)?;
            if let Some(alias) = &column.alias {
                builder.push(" AS ").push_identifier(alias);
            }
        }

        for table in &select.tables {
            match &table.join {
                None => {
                    builder.push(" FROM ");
                }
                Some((kind, _)) => {
                    builder.push(" ").push(kind.as_sql()).push(" ");
                }
            }
            builder
                .push_identifier(&table.table)
                .push(" AS ")
                .push_identifier(&table.alias);
            if let Some((_, on)) = &table.join {
                builder.push(" ON ");
                self.visit(&mut builder, on)?;
            }
        }

        if let Some(predicate) = &select.predicate {
            builder.push(" WHERE ");
            self.visit(&mut builder, predicate)?;
        }

        if !select.orderings.is_empty() {
            builder.push(" ORDER BY ");
            for (i, ordering) in select.orderings.iter().enumerate() {
                if i > 0 {
                    builder.push(", ");
                }
                self.visit(&mut builder, &ordering.expression)?;
                builder.push(" ").push(ordering.order.as_sql());
            }
        }

        builder.push(self.db_type.limit_offset(select.limit, select.offset));
        Ok(builder.build())
    }

    /// Render one translated expression.
    pub fn visit(&self, builder: &mut SqlBuilder, expression: &Expression) -> QueryResult<()> {
        match expression {
            Expression::Column { table, column } => {
                builder.push_column(table, column);
            }
            Expression::Constant(Value::Null) => {
                builder.push("NULL");
            }
            Expression::Constant(value) => {
                builder.push_value(value.clone());
            }
            Expression::Parameter(name) => {
                builder.push_param(CommandParameter::Named(name.clone()));
            }
            Expression::Binary {
                op: BinaryOp::Concat,
                left,
                right,
            } => {
                let (open, separator, close) = self.db_type.concat_parts();
                builder.push(open);
                self.visit(builder, left)?;
                builder.push(separator);
                self.visit(builder, right)?;
                builder.push(close);
            }
            Expression::Binary { op, left, right } => {
                builder.push("(");
                self.visit(builder, left)?;
                builder.push(" ").push(op.as_sql()).push(" ");
                self.visit(builder, right)?;
                builder.push(")");
            }
            Expression::Not(inner) => {
                builder.push("NOT (");
                self.visit(builder, inner)?;
                builder.push(")");
            }
            Expression::IsNull(inner) => {
                builder.push("(");
                self.visit(builder, inner)?;
                builder.push(" IS NULL)");
            }
            Expression::SqlFunction { name, arguments } => {
                builder.push(name).push("(");
                for (i, argument) in arguments.iter().enumerate() {
                    if i > 0 {
                        builder.push(", ");
                    }
                    self.visit(builder, argument)?;
                }
                builder.push(")");
            }
            Expression::Like {
                operand,
                pattern,
                escape,
            } => {
                builder.push("(");
                self.visit(builder, operand)?;
                builder.push(" LIKE ");
                self.visit(builder, pattern)?;
                if let Some(escape) = escape {
                    builder.push(format!(" ESCAPE '{}'", escape));
                }
                builder.push(")");
            }
            Expression::Member { .. } | Expression::MethodCall(_) => {
                return Err(QueryError::internal(format!(
                    "Untranslated expression '{}' reached SQL generation",
                    expression
                )));
            }
        }
        Ok(())
    }
}

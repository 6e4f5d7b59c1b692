//! SQL text utilities: dialects, the text builder and relational commands.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::{QueryError, QueryResult};
use crate::value::Value;

/// Escape an identifier with double quotes.
pub fn escape_identifier(name: &str) -> String {
    let escaped = name.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

/// SQL dialect targeted by the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// PostgreSQL uses $1, $2, etc.
    PostgreSQL,
    /// MySQL uses ?, ?, etc.
    MySQL,
    /// SQLite uses ?, ?, etc.
    #[default]
    SQLite,
}

impl DatabaseType {
    /// Get the parameter placeholder for this database type.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Self::PostgreSQL => format!("${}", index),
            Self::MySQL | Self::SQLite => "?".to_string(),
        }
    }

    /// Quote an identifier for this dialect.
    pub fn quote(&self, name: &str) -> String {
        match self {
            Self::MySQL => format!("`{}`", name.replace('`', "``")),
            Self::PostgreSQL | Self::SQLite => escape_identifier(name),
        }
    }

    /// Opening text, separator and closing text of a string concatenation.
    pub fn concat_parts(&self) -> (&'static str, &'static str, &'static str) {
        match self {
            Self::MySQL => ("CONCAT(", ", ", ")"),
            Self::PostgreSQL | Self::SQLite => ("(", " || ", ")"),
        }
    }

    /// Render the row-limiting clause, or an empty string.
    pub fn limit_offset(&self, limit: Option<u64>, offset: Option<u64>) -> String {
        match (limit, offset) {
            (None, None) => String::new(),
            (Some(limit), None) => format!(" LIMIT {}", limit),
            (Some(limit), Some(offset)) => format!(" LIMIT {} OFFSET {}", limit, offset),
            (None, Some(offset)) => match self {
                Self::PostgreSQL => format!(" OFFSET {}", offset),
                Self::SQLite => format!(" LIMIT -1 OFFSET {}", offset),
                Self::MySQL => format!(" LIMIT 18446744073709551615 OFFSET {}", offset),
            },
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PostgreSQL => write!(f, "postgresql"),
            Self::MySQL => write!(f, "mysql"),
            Self::SQLite => write!(f, "sqlite"),
        }
    }
}

/// Source of one positional parameter of a command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandParameter {
    /// A constant lifted out of the query tree.
    Value(Value),
    /// A value supplied per execution under this name.
    Named(SmolStr),
}

/// A SQL builder for constructing commands.
#[derive(Debug, Clone)]
pub struct SqlBuilder {
    db_type: DatabaseType,
    sql: String,
    params: Vec<CommandParameter>,
}

impl SqlBuilder {
    /// Create a new SQL builder.
    pub fn new(db_type: DatabaseType) -> Self {
        Self {
            db_type,
            sql: String::with_capacity(128),
            params: Vec::new(),
        }
    }

    /// The dialect being written.
    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    /// Push a literal SQL string.
    pub fn push(&mut self, sql: impl AsRef<str>) -> &mut Self {
        self.sql.push_str(sql.as_ref());
        self
    }

    /// Push a placeholder bound to a constant.
    pub fn push_value(&mut self, value: Value) -> &mut Self {
        self.push_param(CommandParameter::Value(value))
    }

    /// Push a placeholder for a parameter slot.
    pub fn push_param(&mut self, param: CommandParameter) -> &mut Self {
        let index = self.params.len() + 1;
        self.sql.push_str(&self.db_type.placeholder(index));
        self.params.push(param);
        self
    }

    /// Push a quoted identifier.
    pub fn push_identifier(&mut self, name: &str) -> &mut Self {
        let quoted = self.db_type.quote(name);
        self.sql.push_str(&quoted);
        self
    }

    /// Push `alias.column` with both parts quoted.
    pub fn push_column(&mut self, table: &str, column: &str) -> &mut Self {
        self.push_identifier(table).push(".").push_identifier(column)
    }

    /// Get the current SQL string.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Build the final command.
    pub fn build(self) -> RelationalCommand {
        RelationalCommand {
            sql: self.sql,
            parameters: self.params,
        }
    }
}

/// Generated SQL text plus the source of each positional parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationalCommand {
    /// The SQL text.
    pub sql: String,
    /// Positional parameters in placeholder order.
    pub parameters: Vec<CommandParameter>,
}

impl RelationalCommand {
    /// Resolve named parameters against the values supplied for one execution.
    pub fn bind(&self, values: &HashMap<SmolStr, Value>) -> QueryResult<BoundCommand> {
        let values = self
            .parameters
            .iter()
            .map(|param| match param {
                CommandParameter::Value(value) => Ok(value.clone()),
                CommandParameter::Named(name) => values
                    .get(name)
                    .cloned()
                    .ok_or_else(|| QueryError::parameter_missing(name.as_str()).with_sql(&self.sql)),
            })
            .collect::<QueryResult<Vec<_>>>()?;

        Ok(BoundCommand {
            sql: self.sql.clone(),
            parameters: values,
        })
    }
}

impl fmt::Display for RelationalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)
    }
}

/// A command ready to hand to an executor.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundCommand {
    /// The SQL text.
    pub sql: String,
    /// Parameter values in placeholder order.
    pub parameters: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_escape_identifier() {
        assert_eq!(escape_identifier("order"), "\"order\"");
        assert_eq!(escape_identifier("has\"quote"), "\"has\"\"quote\"");
    }

    #[test]
    fn test_database_placeholder() {
        assert_eq!(DatabaseType::PostgreSQL.placeholder(5), "$5");
        assert_eq!(DatabaseType::MySQL.placeholder(1), "?");
        assert_eq!(DatabaseType::SQLite.placeholder(1), "?");
    }

    #[test]
    fn test_offset_without_limit_per_dialect() {
        assert_eq!(DatabaseType::SQLite.limit_offset(None, Some(5)), " LIMIT -1 OFFSET 5");
        assert_eq!(DatabaseType::PostgreSQL.limit_offset(None, Some(5)), " OFFSET 5");
        assert_eq!(
            DatabaseType::MySQL.limit_offset(None, Some(5)),
            " LIMIT 18446744073709551615 OFFSET 5"
        );
        assert_eq!(DatabaseType::SQLite.limit_offset(Some(2), Some(5)), " LIMIT 2 OFFSET 5");
        assert_eq!(DatabaseType::SQLite.limit_offset(None, None), "");
    }

    #[test]
    fn test_sql_builder() {
        let mut builder = SqlBuilder::new(DatabaseType::PostgreSQL);
        builder
            .push("SELECT * FROM ")
            .push_identifier("order")
            .push(" WHERE ")
            .push_column("o", "id")
            .push(" = ")
            .push_value(Value::Int(42))
            .push(" AND ")
            .push_column("o", "status")
            .push(" = ")
            .push_param(CommandParameter::Named("status".into()));

        let command = builder.build();
        assert_eq!(
            command.sql,
            "SELECT * FROM \"order\" WHERE \"o\".\"id\" = $1 AND \"o\".\"status\" = $2"
        );
        assert_eq!(command.parameters.len(), 2);
    }

    #[test]
    fn test_bind_resolves_named_parameters() {
        let mut builder = SqlBuilder::new(DatabaseType::SQLite);
        builder
            .push("SELECT ")
            .push_value(Value::Int(1))
            .push(", ")
            .push_param(CommandParameter::Named("p".into()));
        let command = builder.build();

        let mut values = HashMap::new();
        values.insert(SmolStr::new("p"), Value::from("x"));
        let bound = command.bind(&values).unwrap();
        assert_eq!(bound.parameters, vec![Value::Int(1), Value::from("x")]);

        let err = command.bind(&HashMap::new()).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::ParameterMissing);
    }
}

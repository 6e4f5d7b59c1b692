//! Common option types used when compiling and running queries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sort order for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortOrder {
    /// Ascending order (A-Z, 0-9, oldest first).
    #[default]
    Asc,
    /// Descending order (Z-A, 9-0, newest first).
    Desc,
}

impl SortOrder {
    /// Get the SQL keyword for this sort order.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

/// What to do with an expression the provider cannot translate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientEvaluationBehavior {
    /// Fail at translation time.
    Throw,
    /// Emit a client evaluation diagnostic and evaluate in process.
    #[default]
    Warn,
    /// Evaluate in process without a diagnostic.
    Silent,
}

/// Whether materialized entities are registered with the unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingBehavior {
    /// Track every entity a query materializes.
    #[default]
    TrackAll,
    /// Return detached entities.
    NoTracking,
}

/// Strategy used to load included navigations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncludeStrategy {
    /// Issue one secondary command per principal key.
    #[default]
    Correlated,
    /// Join related rows into the primary command and slice them per result.
    PreJoined,
}

impl IncludeStrategy {
    /// Check if this strategy issues secondary commands.
    pub fn is_correlated(&self) -> bool {
        matches!(self, Self::Correlated)
    }

    /// Check if this strategy joins related rows up front.
    pub fn is_pre_joined(&self) -> bool {
        matches!(self, Self::PreJoined)
    }
}
